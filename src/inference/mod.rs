pub mod tta;

pub use tta::{flip, flip_axes, flip_axes_for, TtaPredictor};
