use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;

use super::Dim;
use crate::error::{UnetError, UnetResult};

pub const DEFAULT_DATA_DIR: &str = "/data";
pub const DEFAULT_RESULTS_DIR: &str = "/results";

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ExecMode {
    Train,
    Evaluate,
    Predict,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum Backend {
    Ndarray,
    Wgpu,
    Candle,
}

impl Backend {
    pub fn supports_gpus(self) -> bool {
        !matches!(self, Backend::Ndarray)
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Ndarray => write!(f, "ndarray"),
            Backend::Wgpu => write!(f, "wgpu"),
            Backend::Candle => write!(f, "candle"),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum Optimizer {
    Sgd,
    Radam,
    Adam,
    Adamw,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum Scheduler {
    None,
    Multistep,
    Cosine,
    Plateau,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum Norm {
    Instance,
    Batch,
    Group,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum Blend {
    Gaussian,
    Constant,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum Affinity {
    Socket,
    Single,
    SingleUnique,
    SocketUniqueInterleaved,
    SocketUniqueContinuous,
    Disabled,
}

pub fn positive_int(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(format!(
            "Argparse error. Expected positive integer but got {value}"
        )),
    }
}

pub fn non_negative_int(value: &str) -> Result<usize, String> {
    value.parse::<usize>().map_err(|_| {
        format!("Argparse error. Expected non-negative integer but got {value}")
    })
}

pub fn float_0_1(value: &str) -> Result<f64, String> {
    match value.parse::<f64>() {
        Ok(v) if (0.0..=1.0).contains(&v) => Ok(v),
        _ => Err(format!(
            "Argparse error. Expected float to be in range (0, 1), but got {value}"
        )),
    }
}

/// Anything other than a case-insensitive `true` disables the flag.
fn true_string(value: &str) -> Result<bool, String> {
    Ok(value.eq_ignore_ascii_case("true"))
}

#[derive(Parser, Debug, Clone)]
#[command(about = "U-Net segmentation training utilities")]
pub struct RunArgs {
    /// Execution mode to run the model
    #[arg(long, value_enum, default_value_t = ExecMode::Train)]
    pub exec_mode: ExecMode,

    /// Path to data directory
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    pub data: PathBuf,

    /// Path to results directory
    #[arg(long, default_value = DEFAULT_RESULTS_DIR)]
    pub results: PathBuf,

    /// Name of the metrics log file
    #[arg(long)]
    pub logname: Option<String>,

    /// Task number. MSD uses numbers 01-10
    #[arg(long)]
    pub task: Option<String>,

    /// Compute backend
    #[arg(long, value_enum, default_value_t = Backend::Ndarray)]
    pub backend: Backend,

    /// Number of gpus
    #[arg(long, default_value_t = 0, value_parser = non_negative_int)]
    pub gpus: usize,

    #[arg(long, default_value_t = 0.001)]
    pub learning_rate: f64,

    /// Gradient clipping norm value
    #[arg(long, default_value_t = 0.0)]
    pub gradient_clip_val: f64,

    /// Negative slope for LeakyReLU
    #[arg(long, default_value_t = 0.01)]
    pub negative_slope: f64,

    /// Enable test time augmentation
    #[arg(long)]
    pub tta: bool,

    /// Enable automatic mixed precision
    #[arg(long)]
    pub amp: bool,

    /// Run model benchmarking
    #[arg(long)]
    pub benchmark: bool,

    #[arg(long)]
    pub deep_supervision: bool,

    #[arg(long)]
    pub drop_block: bool,

    /// Enable attention in decoder
    #[arg(long)]
    pub attention: bool,

    /// Enable residual block in encoder
    #[arg(long)]
    pub residual: bool,

    /// Use focal loss instead of cross entropy
    #[arg(long)]
    pub focal: bool,

    #[arg(long)]
    pub sync_batchnorm: bool,

    #[arg(long)]
    pub save_ckpt: bool,

    /// Number of cross-validation folds
    #[arg(long, default_value_t = 5, value_parser = positive_int)]
    pub nfolds: usize,

    #[arg(long, default_value_t = 1)]
    pub seed: u64,

    /// Skip the evaluation for the first n epochs.
    #[arg(long, default_value_t = 0, value_parser = non_negative_int)]
    pub skip_first_n_eval: usize,

    /// Path to checkpoint
    #[arg(long)]
    pub ckpt_path: Option<PathBuf>,

    #[arg(long, default_value_t = 0, value_parser = non_negative_int)]
    pub fold: usize,

    /// Early stopping patience
    #[arg(long, default_value_t = 100, value_parser = positive_int)]
    pub patience: usize,

    /// Patience for ReduceLROnPlateau scheduler
    #[arg(long, default_value_t = 70, value_parser = positive_int)]
    pub lr_patience: usize,

    #[arg(long, default_value_t = 2, value_parser = positive_int)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 4, value_parser = positive_int)]
    pub val_batch_size: usize,

    /// Steps for multistep scheduler
    #[arg(long, num_args = 1.., value_parser = positive_int)]
    pub steps: Vec<usize>,

    #[arg(long)]
    pub profile: bool,

    #[arg(long, default_value_t = 0.99)]
    pub momentum: f64,

    /// Weight decay (L2 penalty)
    #[arg(long, default_value_t = 0.0001)]
    pub weight_decay: f64,

    #[arg(long)]
    pub save_preds: bool,

    /// UNet dimension
    #[arg(long, value_enum, default_value_t = Dim::Three)]
    pub dim: Dim,

    /// Resume training from the last checkpoint
    #[arg(long)]
    pub resume_training: bool,

    /// Scheduler factor
    #[arg(long, default_value_t = 0.3)]
    pub factor: f64,

    /// Number of worker threads to use for data loading
    #[arg(long, default_value_t = 8, value_parser = non_negative_int)]
    pub num_workers: usize,

    /// Force training for at least these many epochs
    #[arg(long, default_value_t = 30, value_parser = non_negative_int)]
    pub min_epochs: usize,

    /// Stop training after this number of epochs
    #[arg(long, default_value_t = 10000, value_parser = non_negative_int)]
    pub max_epochs: usize,

    /// Warmup iterations before collecting statistics
    #[arg(long, default_value_t = 5, value_parser = non_negative_int)]
    pub warmup: usize,

    #[arg(long, value_enum, default_value_t = Norm::Instance)]
    pub norm: Norm,

    /// Number of volumes which come into single batch size for 2D model
    #[arg(long, default_value_t = 1, value_parser = positive_int)]
    pub nvol: usize,

    /// Whether input is channels last format. Any value other than True disables channels-last
    #[arg(long, default_value = "True", value_parser = true_string, action = ArgAction::Set)]
    pub channels_last: bool,

    /// Input data dimension for 2d model
    #[arg(long, value_enum, default_value_t = Dim::Three)]
    pub data2d_dim: Dim,

    /// Probability of crop to have some region with positive label
    #[arg(long, default_value_t = 0.33, value_parser = float_0_1)]
    pub oversampling: f64,

    /// Amount of overlap between scans during sliding window inference
    #[arg(long, default_value_t = 0.5, value_parser = float_0_1)]
    pub overlap: f64,

    #[arg(long, value_enum, default_value_t = Affinity::Disabled)]
    pub affinity: Affinity,

    #[arg(long, value_enum, default_value_t = Scheduler::None)]
    pub scheduler: Scheduler,

    #[arg(long, value_enum, default_value_t = Optimizer::Adamw)]
    pub optimizer: Optimizer,

    /// How to blend output of overlapping windows
    #[arg(long, value_enum, default_value_t = Blend::Gaussian)]
    pub blend: Blend,

    /// Limit number of batches for training (benchmarking mode only)
    #[arg(long, default_value_t = 0, value_parser = non_negative_int)]
    pub train_batches: usize,

    /// Limit number of batches for inference (benchmarking mode only)
    #[arg(long, default_value_t = 0, value_parser = non_negative_int)]
    pub test_batches: usize,

    /// Backup checkpoint every n epochs
    #[arg(long, value_parser = positive_int)]
    pub ckpt_every: Option<usize>,

    /// Set seed in data augmentation functions
    #[arg(long)]
    pub set_aug_seed: bool,

    #[arg(long = "no-augment", action = ArgAction::SetFalse)]
    pub augment: bool,
}

impl RunArgs {
    /// Cross-field checks that clap cannot express.
    pub fn validate(&self) -> UnetResult<()> {
        if self.gpus > 0 && !self.backend.supports_gpus() {
            return Err(UnetError::InvalidArgument(format!(
                "--gpus {} requires a GPU backend, got {}",
                self.gpus, self.backend
            )));
        }
        if self.scheduler == Scheduler::Multistep && self.steps.is_empty() {
            return Err(UnetError::InvalidArgument(
                "--steps is required with --scheduler multistep".to_string(),
            ));
        }
        if self.min_epochs > self.max_epochs {
            return Err(UnetError::InvalidArgument(format!(
                "--min-epochs {} exceeds --max-epochs {}",
                self.min_epochs, self.max_epochs
            )));
        }
        if self.fold >= self.nfolds {
            return Err(UnetError::InvalidArgument(format!(
                "--fold {} out of range for {} folds",
                self.fold, self.nfolds
            )));
        }
        Ok(())
    }

    pub fn uses_default_data_dir(&self) -> bool {
        self.data.as_os_str() == DEFAULT_DATA_DIR
    }

    pub fn task_code(&self) -> UnetResult<String> {
        let task = self
            .task
            .as_deref()
            .ok_or_else(|| UnetError::InvalidArgument("--task is required".to_string()))?;
        Ok(crate::data::task_code(task, self.dim))
    }
}
