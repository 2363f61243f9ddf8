//! Per-stage kernel and stride planning for the encoder.
//!
//! Axes whose spacing is more than twice the finest spacing are left alone
//! (stride 1, kernel 1) until downsampling the finer axes has closed the gap.
//! Every axis stops halving once its extent drops below
//! [`MIN_DOWNSAMPLE_SIZE`].

use crate::config::TaskConfig;
use crate::error::{UnetError, UnetResult};

/// Axes smaller than this are never halved again.
pub const MIN_DOWNSAMPLE_SIZE: f64 = 8.0;
/// Spacing ratio (to the finest axis) above which an axis is treated as coarse.
pub const MAX_SPACING_RATIO: f64 = 2.0;
pub const MAX_DOWNSAMPLING_STAGES: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    pub kernels: Vec<Vec<usize>>,
    pub strides: Vec<Vec<usize>>,
}

impl StagePlan {
    /// Number of stages that actually reduce resolution.
    pub fn num_downsamplings(&self) -> usize {
        self.strides.len().saturating_sub(1)
    }

    /// Total reduction factor per axis across all stages.
    pub fn total_stride(&self) -> Vec<usize> {
        let n = self.strides.first().map_or(0, Vec::len);
        (0..n)
            .map(|axis| self.strides.iter().map(|s| s[axis]).product())
            .collect()
    }
}

struct Stage {
    kernel: Vec<usize>,
    stride: Vec<usize>,
}

impl Stage {
    fn derive(sizes: &[f64], spacings: &[f64]) -> Self {
        let min_spacing = spacings.iter().copied().fold(f64::INFINITY, f64::min);
        let fine: Vec<bool> = spacings
            .iter()
            .map(|s| s / min_spacing <= MAX_SPACING_RATIO)
            .collect();

        let stride = fine
            .iter()
            .zip(sizes)
            .map(|(&fine, &size)| {
                if fine && size >= MIN_DOWNSAMPLE_SIZE {
                    2
                } else {
                    1
                }
            })
            .collect();
        let kernel = fine.iter().map(|&fine| if fine { 3 } else { 1 }).collect();

        Stage { kernel, stride }
    }

    fn downsamples(&self) -> bool {
        self.stride.iter().any(|&s| s != 1)
    }
}

fn validate(patch_size: &[usize], spacings: &[f64]) -> UnetResult<()> {
    if patch_size.len() != spacings.len() {
        return Err(UnetError::LengthMismatch {
            patch: patch_size.len(),
            spacings: spacings.len(),
        });
    }
    if !(2..=3).contains(&patch_size.len()) {
        return Err(UnetError::UnsupportedDim(patch_size.len()));
    }
    if patch_size.iter().any(|&p| p == 0) {
        return Err(UnetError::InvalidArgument(format!(
            "patch size must be positive, got {:?}",
            patch_size
        )));
    }
    if spacings.iter().any(|&s| !s.is_finite() || s <= 0.0) {
        return Err(UnetError::InvalidArgument(format!(
            "spacings must be positive and finite, got {:?}",
            spacings
        )));
    }
    Ok(())
}

pub fn plan(patch_size: &[usize], spacings: &[f64]) -> UnetResult<StagePlan> {
    validate(patch_size, spacings)?;
    let n = patch_size.len();

    let mut sizes: Vec<f64> = patch_size.iter().map(|&p| p as f64).collect();
    let mut spacings = spacings.to_vec();
    let mut kernels = Vec::with_capacity(MAX_DOWNSAMPLING_STAGES + 1);
    let mut strides = Vec::with_capacity(MAX_DOWNSAMPLING_STAGES + 1);
    strides.push(vec![1; n]);

    for _ in 0..MAX_DOWNSAMPLING_STAGES {
        let stage = Stage::derive(&sizes, &spacings);
        if !stage.downsamples() {
            break;
        }
        for (axis, &s) in stage.stride.iter().enumerate() {
            sizes[axis] /= s as f64;
            spacings[axis] *= s as f64;
        }
        kernels.push(stage.kernel);
        strides.push(stage.stride);
    }

    kernels.push(vec![3; n]);
    Ok(StagePlan { kernels, strides })
}

/// Everything the network constructor needs from a task record.
#[derive(Debug, Clone, PartialEq)]
pub struct UnetParams {
    pub in_channels: usize,
    pub n_class: usize,
    pub kernels: Vec<Vec<usize>>,
    pub strides: Vec<Vec<usize>>,
    pub patch_size: Vec<usize>,
}

impl UnetParams {
    pub fn from_task_config(config: &TaskConfig) -> UnetResult<Self> {
        let StagePlan { kernels, strides } = plan(&config.patch_size, &config.spacings)?;
        Ok(UnetParams {
            in_channels: config.in_channels,
            n_class: config.n_class,
            kernels,
            strides,
            patch_size: config.patch_size.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isotropic_3d() {
        let plan = plan(&[128, 128, 128], &[1.0, 1.0, 1.0]).unwrap();
        // 128 -> 64 -> 32 -> 16 -> 8 -> 4
        assert_eq!(plan.num_downsamplings(), 5);
        assert_eq!(plan.strides[0], vec![1, 1, 1]);
        for stride in &plan.strides[1..] {
            assert_eq!(stride, &vec![2, 2, 2]);
        }
        for kernel in &plan.kernels {
            assert_eq!(kernel, &vec![3, 3, 3]);
        }
        assert_eq!(plan.total_stride(), vec![32, 32, 32]);
    }

    #[test]
    fn test_small_patch_stops_at_floor() {
        // 32 -> 16 -> 8 -> 4; 4 < 8 so no further stage.
        let plan = plan(&[32, 32], &[1.0, 1.0]).unwrap();
        assert_eq!(plan.num_downsamplings(), 3);
        assert_eq!(plan.kernels.len(), plan.strides.len());
    }

    #[test]
    fn test_patch_below_floor_has_no_downsampling() {
        let plan = plan(&[4, 4, 4], &[1.0, 1.0, 1.0]).unwrap();
        assert_eq!(plan.strides, vec![vec![1, 1, 1]]);
        assert_eq!(plan.kernels, vec![vec![3, 3, 3]]);
    }

    #[test]
    fn test_anisotropic_axis_catches_up() {
        // Axis 2 starts 3x coarser: it is skipped until the others have been
        // halved once, after which the ratio is 1.5 and all axes downsample.
        let plan = plan(&[192, 160, 64], &[0.8, 0.8, 2.4]).unwrap();
        assert_eq!(plan.strides[1], vec![2, 2, 1]);
        assert_eq!(plan.kernels[0], vec![3, 3, 1]);
        assert_eq!(plan.strides[2], vec![2, 2, 2]);
        assert_eq!(plan.kernels[1], vec![3, 3, 3]);
    }

    #[test]
    fn test_axes_hit_floor_independently() {
        // 12 -> 6 falls under the floor after one stage; 64 keeps going.
        let plan = plan(&[12, 64], &[1.0, 1.0]).unwrap();
        assert_eq!(plan.strides[1], vec![2, 2]);
        assert_eq!(plan.strides[2], vec![1, 2]);
    }

    #[test]
    fn test_strongly_anisotropic_axis_never_downsamples() {
        let plan = plan(&[256, 256, 32], &[1.0, 1.0, 100.0]).unwrap();
        assert_eq!(plan.num_downsamplings(), 5);
        for (kernel, stride) in plan.kernels.iter().zip(&plan.strides[1..]) {
            assert_eq!(kernel, &vec![3, 3, 1]);
            assert_eq!(stride, &vec![2, 2, 1]);
        }
        assert_eq!(plan.kernels.last(), Some(&vec![3, 3, 3]));
    }

    #[test]
    fn test_stage_cap() {
        let plan = plan(&[1024, 1024], &[1.0, 1.0]).unwrap();
        assert_eq!(plan.num_downsamplings(), MAX_DOWNSAMPLING_STAGES);
        assert_eq!(plan.kernels.len(), MAX_DOWNSAMPLING_STAGES + 1);
    }

    #[test]
    fn test_plan_is_deterministic() {
        let a = plan(&[160, 192, 80], &[0.7, 0.7, 1.5]).unwrap();
        let b = plan(&[160, 192, 80], &[0.7, 0.7, 1.5]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_coarse_axis_rejoins_after_two_stages() {
        // 5 / 1 and then 5 / 2 stay above the ratio cap; 5 / 4 does not.
        let plan = plan(&[128, 128, 128], &[1.0, 1.0, 5.0]).unwrap();
        assert_eq!(
            plan.kernels,
            vec![
                vec![3, 3, 1],
                vec![3, 3, 1],
                vec![3, 3, 3],
                vec![3, 3, 3],
                vec![3, 3, 3],
                vec![3, 3, 3],
            ]
        );
        assert_eq!(
            plan.strides,
            vec![
                vec![1, 1, 1],
                vec![2, 2, 1],
                vec![2, 2, 1],
                vec![2, 2, 2],
                vec![2, 2, 2],
                vec![2, 2, 2],
            ]
        );
        assert_eq!(plan.total_stride(), vec![32, 32, 8]);
    }

    #[test]
    fn test_rejects_malformed_input() {
        assert!(matches!(
            plan(&[64, 64], &[1.0, 1.0, 1.0]),
            Err(UnetError::LengthMismatch {
                patch: 2,
                spacings: 3
            })
        ));
        assert!(matches!(
            plan(&[64], &[1.0]),
            Err(UnetError::UnsupportedDim(1))
        ));
        assert!(matches!(
            plan(&[64, 0], &[1.0, 1.0]),
            Err(UnetError::InvalidArgument(_))
        ));
        assert!(matches!(
            plan(&[64, 64], &[1.0, -1.0]),
            Err(UnetError::InvalidArgument(_))
        ));
        assert!(matches!(
            plan(&[64, 64], &[1.0, f64::NAN]),
            Err(UnetError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_unet_params_from_task_config() {
        let config = TaskConfig::example_3d();
        let params = UnetParams::from_task_config(&config).unwrap();
        assert_eq!(params.in_channels, 4);
        assert_eq!(params.n_class, 4);
        assert_eq!(params.patch_size, vec![128, 128, 128]);
        assert_eq!(params.kernels.len(), params.strides.len());
    }
}
