pub mod config;
pub mod data;
pub mod error;
pub mod inference;
pub mod model;
pub mod training;

pub use config::{Dim, RunArgs, TaskConfig};
pub use error::{UnetError, UnetResult};
pub use model::planner::{plan, StagePlan, UnetParams};
