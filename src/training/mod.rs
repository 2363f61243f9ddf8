pub mod checkpoint;
pub mod logger;

pub use checkpoint::{
    find_latest_backup, load_checkpoint, resume_checkpoint_path, save_checkpoint,
    PeriodicCheckpoint, PeriodicCheckpointConfig,
};
pub use logger::{dice_metrics, log_dice, Metrics, MetricsLogger, Step, DEFAULT_LOGNAME};
