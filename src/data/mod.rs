pub mod folds;

pub use folds::{get_split, KFold, Split, DEFAULT_FOLD_SEED};

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{Dim, ExecMode, RunArgs, TaskConfig};
use crate::error::{UnetError, UnetResult};

pub const TASK_CONFIG_FILE: &str = "config.yaml";
pub const IMAGE_SUFFIX: &str = "_x.npy";

pub fn task_code(task: &str, dim: Dim) -> String {
    format!("{}_{}d", task, dim)
}

/// A non-default `--data` points straight at a preprocessed task directory;
/// the default root holds one directory per task code.
pub fn config_path(args: &RunArgs) -> UnetResult<PathBuf> {
    if args.uses_default_data_dir() {
        Ok(args.data.join(args.task_code()?).join(TASK_CONFIG_FILE))
    } else {
        Ok(args.data.join(TASK_CONFIG_FILE))
    }
}

/// Loads the task record and checks it was preprocessed for `--dim`.
pub fn load_task_config(args: &RunArgs) -> UnetResult<TaskConfig> {
    let path = config_path(args)?;
    log::debug!("Loading task config from {}", path.display());
    let config = TaskConfig::load_from_yaml(&path)?;
    let dim = config.dim()?;
    if dim != args.dim {
        return Err(UnetError::InvalidArgument(format!(
            "{} holds a {}-D patch but --dim is {}",
            path.display(),
            dim,
            args.dim
        )));
    }
    Ok(config)
}

pub fn data_path(args: &RunArgs) -> UnetResult<PathBuf> {
    if !args.uses_default_data_dir() {
        return Ok(args.data.clone());
    }
    let path = args.data.join(args.task_code()?);
    if args.exec_mode == ExecMode::Predict && !args.benchmark {
        Ok(path.join("test"))
    } else {
        Ok(path)
    }
}

/// Sorted paths in `dir` whose file name ends with `suffix`.
pub fn load_data(dir: &Path, suffix: &str) -> UnetResult<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.ends_with(suffix))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Volumes to run inference on. Predicting on a validation directory keeps
/// only the current fold's held-out volumes so scores match training.
pub fn test_fnames<T: Clone + Ord>(
    args: &RunArgs,
    data_path: &Path,
    meta: Option<Vec<T>>,
) -> UnetResult<(Vec<PathBuf>, Option<Vec<T>>)> {
    let mut test_imgs = load_data(data_path, IMAGE_SUFFIX)?;
    let mut meta = meta;

    let is_val_dir = data_path.to_string_lossy().contains("val");
    if args.exec_mode == ExecMode::Predict && is_val_dir {
        let split = KFold::new(args.nfolds)?.fold(test_imgs.len(), args.fold)?;
        test_imgs = get_split(&test_imgs, &split.val);
        test_imgs.sort();
        meta = meta.map(|m| {
            let mut selected = get_split(&m, &split.val);
            selected.sort();
            selected
        });
    }

    Ok((test_imgs, meta))
}
