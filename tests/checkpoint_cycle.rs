use burn::backend::NdArray;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::prelude::*;
use clap::Parser;

use seg_unet::config::{Dim, RunArgs};
use seg_unet::inference::TtaPredictor;
use seg_unet::model::{permute_filters_4d, plan};
use seg_unet::training::checkpoint::CHECKPOINT_SUBDIR;
use seg_unet::training::{
    find_latest_backup, load_checkpoint, resume_checkpoint_path, PeriodicCheckpointConfig,
};

type TestBackend = NdArray<f32>;

fn conv_for_first_stage(
    device: &<TestBackend as burn::tensor::backend::Backend>::Device,
) -> Conv2d<TestBackend> {
    let stages = plan(&[64, 64], &[1.0, 1.0]).unwrap();
    let kernel = &stages.kernels[0];
    Conv2dConfig::new([1, 4], [kernel[0], kernel[1]])
        .with_padding(burn::nn::PaddingConfig2d::Same)
        .init(device)
}

#[test]
fn periodic_backups_and_resume() {
    let tmp = tempfile::tempdir().unwrap();
    let device = Default::default();
    let conv = conv_for_first_stage(&device);

    let args = RunArgs::try_parse_from([
        "seg-unet",
        "--results",
        tmp.path().to_str().unwrap(),
        "--ckpt-every",
        "3",
        "--resume-training",
    ])
    .unwrap();

    let ckpt = PeriodicCheckpointConfig::from_args(&args)
        .with_first_n(1)
        .init(tmp.path().join(CHECKPOINT_SUBDIR));
    for epoch in 0..8 {
        ckpt.on_validation_end::<TestBackend, _>(&conv, epoch).unwrap();
    }

    // Backups at 0 (first_n) and every third epoch.
    let (epoch, backup) = find_latest_backup(ckpt.dirpath()).unwrap();
    assert_eq!(epoch, 6);
    assert!(backup.exists());
    assert!(!ckpt.backup_path(7).exists());
    assert!(ckpt.backup_path(3).exists());

    let resume = resume_checkpoint_path(&args.results, args.resume_training, None).unwrap();
    assert_eq!(resume, ckpt.last_path());

    let restored = load_checkpoint::<TestBackend, _>(
        conv_for_first_stage(&device),
        &resume,
        &device,
    )
    .unwrap();
    assert_eq!(
        restored.weight.val().into_data().to_vec::<f32>().unwrap(),
        conv.weight.val().into_data().to_vec::<f32>().unwrap()
    );
    assert_eq!(restored.num_params(), conv.num_params());
}

#[test]
fn conv_weights_permute_to_filters_last() {
    let device = Default::default();
    let conv = conv_for_first_stage(&device);
    // KCRS = [4, 1, 3, 3]
    let weight = conv.weight.val();
    assert_eq!(weight.dims(), [4, 1, 3, 3]);
    assert_eq!(permute_filters_4d(weight, true).dims(), [3, 3, 1, 4]);
}

#[test]
fn tta_with_flip_equivariant_conv() {
    // A 1x1 convolution only mixes channels, so it commutes with spatial flips
    // and averaging over the flipped views reproduces the plain prediction.
    let device = Default::default();
    let conv: Conv2d<TestBackend> = Conv2dConfig::new([2, 3], [1, 1]).init(&device);
    let input = Tensor::<TestBackend, 1, Int>::arange(0..2 * 2 * 4 * 4, &device)
        .float()
        .reshape([2, 2, 4, 4]);

    let plain = conv.forward(input.clone());
    let averaged = TtaPredictor::new(Dim::Two)
        .predict(input, |x| conv.forward(x))
        .unwrap();
    assert_eq!(averaged.dims(), [2, 3, 4, 4]);

    let plain = plain.into_data().to_vec::<f32>().unwrap();
    let averaged = averaged.into_data().to_vec::<f32>().unwrap();
    for (a, p) in averaged.iter().zip(&plain) {
        assert!((a - p).abs() < 1e-4, "{} vs {}", a, p);
    }
}
