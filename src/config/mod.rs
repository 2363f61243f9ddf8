use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{UnetError, UnetResult};

pub mod args;
pub mod runtime;

pub use args::*;
pub use runtime::*;

/// Spatial dimensionality of the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Dim {
    #[value(name = "2")]
    Two,
    #[value(name = "3")]
    Three,
}

impl Dim {
    pub fn as_usize(self) -> usize {
        match self {
            Dim::Two => 2,
            Dim::Three => 3,
        }
    }
}

impl TryFrom<usize> for Dim {
    type Error = UnetError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(Dim::Two),
            3 => Ok(Dim::Three),
            other => Err(UnetError::UnsupportedDim(other)),
        }
    }
}

impl std::fmt::Display for Dim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_usize())
    }
}

/// Per-task metadata written by preprocessing and read before building the network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskConfig {
    pub patch_size: Vec<usize>,
    pub spacings: Vec<f64>,
    #[serde(default = "default_in_channels")]
    pub in_channels: usize,
    #[serde(default = "default_n_class")]
    pub n_class: usize,
}

fn default_in_channels() -> usize {
    1
}
fn default_n_class() -> usize {
    2
}

impl TaskConfig {
    pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> UnetResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(UnetError::MissingConfig(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        let config: TaskConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_yaml<P: AsRef<Path>>(&self, path: P) -> UnetResult<()> {
        let content = serde_yaml::to_string(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn dim(&self) -> UnetResult<Dim> {
        Dim::try_from(self.patch_size.len())
    }

    /// Brain-tumour style volumetric task: 4 modalities, isotropic 1mm voxels.
    pub fn example_3d() -> Self {
        TaskConfig {
            patch_size: vec![128, 128, 128],
            spacings: vec![1.0, 1.0, 1.0],
            in_channels: 4,
            n_class: 4,
        }
    }

    pub fn example_2d() -> Self {
        TaskConfig {
            patch_size: vec![512, 512],
            spacings: vec![0.8, 0.8],
            in_channels: 1,
            n_class: 2,
        }
    }

    /// Thick-slice acquisition where the through-plane axis is much coarser.
    pub fn example_anisotropic() -> Self {
        TaskConfig {
            patch_size: vec![192, 160, 64],
            spacings: vec![0.8, 0.8, 3.0],
            in_channels: 1,
            n_class: 3,
        }
    }
}
