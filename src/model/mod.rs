pub mod layout;
pub mod planner;

pub use layout::{filter_permutation, layout_2d, permute_filters_4d, permute_filters_5d};
pub use planner::{
    plan, StagePlan, UnetParams, MAX_DOWNSAMPLING_STAGES, MAX_SPACING_RATIO, MIN_DOWNSAMPLE_SIZE,
};
