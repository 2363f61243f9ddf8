use burn::backend::candle::{Candle, CandleDevice};
use burn::backend::ndarray::NdArray;
use burn::backend::wgpu::{Wgpu, WgpuDevice};
use burn::tensor::backend::Backend as BurnBackend;
use clap::{Parser, Subcommand};

use seg_unet::config::{
    canonical_path, is_main_process, seed_everything, set_visible_devices, Backend, Dim, ExecMode,
    RunArgs, TaskConfig,
};
use seg_unet::data::{data_path, load_task_config, test_fnames};
use seg_unet::inference::flip_axes;
use seg_unet::model::{plan, UnetParams};
use seg_unet::training::checkpoint::CHECKPOINT_SUBDIR;
use seg_unet::training::{
    resume_checkpoint_path, Metrics, MetricsLogger, PeriodicCheckpointConfig, Step,
    DEFAULT_LOGNAME,
};
use seg_unet::UnetResult;

type NdArrayBackend = NdArray<f32>;
type WgpuBackend = Wgpu;
type CandleBackend = Candle;

#[derive(Parser)]
#[command(name = "seg-unet")]
#[command(about = "U-Net segmentation - plan networks, folds and checkpoints")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve data paths and derive the network plan for a task
    Plan(RunArgs),
    /// List the test-time-augmentation flip subsets
    Flips {
        #[arg(long, value_enum, default_value_t = Dim::Three)]
        dim: Dim,
    },
    /// Write an example task config
    InitConfig {
        #[arg(long, short, default_value = "config.yaml")]
        output: String,

        #[arg(long, default_value = "3d")]
        template: String,
    },
    Backends,
}

fn print_device_info(backend: Backend) {
    match backend {
        Backend::Ndarray => log::info!("Backend: NdArray (CPU)"),
        Backend::Wgpu => {
            let device: WgpuDevice = Default::default();
            let accel = match &device {
                WgpuDevice::DiscreteGpu(idx) => format!("Discrete GPU #{}", idx),
                WgpuDevice::IntegratedGpu(idx) => format!("Integrated GPU #{}", idx),
                WgpuDevice::VirtualGpu(idx) => format!("Virtual GPU #{}", idx),
                WgpuDevice::Cpu => "CPU (software rendering)".to_string(),
                WgpuDevice::DefaultDevice => "Default GPU".to_string(),
                _ => "WebGPU Device".to_string(),
            };
            log::info!("Backend: WGPU ({})", accel);
        }
        Backend::Candle => {
            let device: CandleDevice = Default::default();
            let accel = match &device {
                CandleDevice::Cpu => "CPU".to_string(),
                CandleDevice::Cuda(cuda_dev) => format!("CUDA GPU #{}", cuda_dev.index),
                CandleDevice::Metal(metal_dev) => format!("Metal GPU #{}", metal_dev.index),
            };
            log::info!("Backend: Candle ({})", accel);
        }
    }
}

fn print_backends() {
    println!("=== seg-unet ===\n");
    println!("Supported backends:\n");
    println!("  ndarray  - CPU backend using ndarray (default)");
    println!("  wgpu     - GPU backend using WebGPU (Vulkan/Metal/DX12)");
    println!("  candle   - GPU backend using Candle (CUDA/Metal)\n");
    println!("Usage:");
    println!("  seg-unet init-config --output /data/01_3d/config.yaml");
    println!("  seg-unet plan --task 01 --dim 3");
    println!("  seg-unet plan --data /scratch/task01 --exec-mode predict --tta");
    println!("  seg-unet flips --dim 2\n");
    println!("Run 'seg-unet <command> --help' for more options.");
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> UnetResult<()> {
    match cli.command {
        None | Some(Commands::Backends) => {
            print_backends();
            Ok(())
        }
        Some(Commands::Flips { dim }) => {
            for axes in flip_axes(dim) {
                println!("{:?}", axes);
            }
            Ok(())
        }
        Some(Commands::InitConfig { output, template }) => init_config(&output, &template),
        Some(Commands::Plan(args)) => {
            print_device_info(args.backend);
            match args.backend {
                Backend::Ndarray => run_plan::<NdArrayBackend>(&args),
                Backend::Wgpu => run_plan::<WgpuBackend>(&args),
                Backend::Candle => run_plan::<CandleBackend>(&args),
            }
        }
    }
}

fn init_config(output: &str, template: &str) -> UnetResult<()> {
    let config = match template {
        "2d" => TaskConfig::example_2d(),
        "anisotropic" => TaskConfig::example_anisotropic(),
        _ => TaskConfig::example_3d(),
    };
    if let Some(parent) = std::path::Path::new(output).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    config.save_to_yaml(output)?;
    println!("Task config created: {}", output);
    println!("\nPoint --data at its directory and run:");
    println!("  seg-unet plan --data <dir>");
    Ok(())
}

fn run_plan<B: BurnBackend>(args: &RunArgs) -> UnetResult<()> {
    args.validate()?;
    if args.gpus > 0 {
        let visible = set_visible_devices(args.gpus);
        log::info!("Visible devices: {}", visible);
    }
    seed_everything::<B>(args.seed);

    let data_dir = data_path(args)?;
    let results = canonical_path(&args.results.to_string_lossy())?;
    log::info!("Data: {}", data_dir.display());
    log::info!("Results: {}", results.display());

    let task = load_task_config(args)?;
    let params = UnetParams::from_task_config(&task)?;
    let stages = plan(&task.patch_size, &task.spacings)?;

    println!("=== U-Net Plan ===");
    println!("Patch size: {:?}", params.patch_size);
    println!("Spacings: {:?}", task.spacings);
    println!("In channels: {}  Classes: {}", params.in_channels, params.n_class);
    for (i, (kernel, stride)) in stages.kernels.iter().zip(&stages.strides).enumerate() {
        println!("  stage {}: kernel {:?} stride {:?}", i, kernel, stride);
    }
    println!(
        "Downsamplings: {}  Total stride: {:?}",
        stages.num_downsamplings(),
        stages.total_stride()
    );
    println!("==================\n");

    let ckpt_path = resume_checkpoint_path(
        &results,
        args.resume_training,
        args.ckpt_path.as_deref(),
    );
    match &ckpt_path {
        Some(path) => log::info!("Starting from checkpoint {}", path.display()),
        None => log::info!("No checkpoint, starting from scratch"),
    }

    if args.save_ckpt {
        let checkpoint =
            PeriodicCheckpointConfig::from_args(args).init(results.join(CHECKPOINT_SUBDIR));
        let upcoming: Vec<usize> = (0..args.max_epochs.min(50))
            .filter(|&epoch| checkpoint.should_backup(epoch))
            .collect();
        log::info!(
            "Checkpoints in {} (backups at epochs {:?})",
            checkpoint.dirpath().display(),
            upcoming
        );
    }

    if args.exec_mode == ExecMode::Predict {
        let (test_imgs, _) = test_fnames::<String>(args, &data_dir, None)?;
        log::info!("{} volumes to predict", test_imgs.len());
    }

    if args.tta {
        log::info!(
            "TTA enabled: {} flipped views per volume",
            flip_axes(args.dim).len()
        );
    }

    if is_main_process() {
        let logname = args.logname.as_deref().unwrap_or(DEFAULT_LOGNAME);
        let mut logger = MetricsLogger::new(&results, logname)?;
        let mut summary = Metrics::new();
        summary.insert("stages".to_string(), params.strides.len() as f64);
        summary.insert("in_channels".to_string(), params.in_channels as f64);
        summary.insert("n_class".to_string(), params.n_class as f64);
        logger.log(Step::Summary, &summary)?;
        logger.flush()?;
    }

    Ok(())
}
