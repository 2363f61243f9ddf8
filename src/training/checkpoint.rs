use burn::config::Config;
use burn::module::Module;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::Backend;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{is_main_process, RunArgs};
use crate::error::UnetResult;

pub type DefaultRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

pub const CHECKPOINT_SUBDIR: &str = "checkpoints";
pub const LAST_CHECKPOINT: &str = "last";
const BACKUP_PREFIX: &str = "backup_epoch_";
const CHECKPOINT_EXT: &str = "mpk";

pub fn default_recorder() -> DefaultRecorder {
    NamedMpkFileRecorder::<FullPrecisionSettings>::new()
}

/// `results/checkpoints/last.mpk` when resuming and it exists, otherwise the
/// explicit `--ckpt-path` (if any).
pub fn resume_checkpoint_path(
    results: &Path,
    resume_training: bool,
    ckpt_path: Option<&Path>,
) -> Option<PathBuf> {
    let resume_path = results
        .join(CHECKPOINT_SUBDIR)
        .join(LAST_CHECKPOINT)
        .with_extension(CHECKPOINT_EXT);
    if resume_training && resume_path.exists() {
        Some(resume_path)
    } else {
        ckpt_path.map(Path::to_path_buf)
    }
}

pub fn save_checkpoint<B: Backend, M: Module<B>>(model: &M, path: &Path) -> UnetResult<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let path = path.with_extension("");
    model.clone().save_file(&path, &default_recorder())?;
    let written = path.with_extension(CHECKPOINT_EXT);
    log::info!("Saved checkpoint: {}", written.display());
    Ok(written)
}

pub fn load_checkpoint<B: Backend, M: Module<B>>(
    model: M,
    checkpoint_path: &Path,
    device: &B::Device,
) -> UnetResult<M> {
    let path_without_ext = checkpoint_path.with_extension("");
    let model = model.load_file(path_without_ext, &default_recorder(), device)?;
    log::info!("Loaded checkpoint: {}", checkpoint_path.display());
    Ok(model)
}

#[derive(Config, Debug)]
pub struct PeriodicCheckpointConfig {
    /// Backup interval in epochs; 0 disables backups.
    #[config(default = 10)]
    pub every_n: usize,

    /// Every epoch below this one is backed up regardless of the interval.
    #[config(default = 10)]
    pub first_n: usize,
}

impl PeriodicCheckpointConfig {
    /// Backups follow `--ckpt-every`; without it only `last` is kept.
    pub fn from_args(args: &RunArgs) -> Self {
        PeriodicCheckpointConfig::new().with_every_n(args.ckpt_every.unwrap_or(0))
    }

    pub fn init<P: Into<PathBuf>>(&self, dirpath: P) -> PeriodicCheckpoint {
        PeriodicCheckpoint {
            dirpath: dirpath.into(),
            every_n: self.every_n,
            first_n: self.first_n,
            main_process: is_main_process(),
        }
    }
}

/// Writes `last` after every validation pass plus numbered backups on a
/// schedule. Only the main process writes.
#[derive(Debug, Clone)]
pub struct PeriodicCheckpoint {
    dirpath: PathBuf,
    every_n: usize,
    first_n: usize,
    main_process: bool,
}

impl PeriodicCheckpoint {
    pub fn dirpath(&self) -> &Path {
        &self.dirpath
    }

    pub fn should_backup(&self, epoch: usize) -> bool {
        self.every_n > 0 && (epoch < self.first_n || epoch % self.every_n == 0)
    }

    pub fn backup_path(&self, epoch: usize) -> PathBuf {
        self.dirpath
            .join(format!("{}{}", BACKUP_PREFIX, epoch))
            .with_extension(CHECKPOINT_EXT)
    }

    pub fn last_path(&self) -> PathBuf {
        self.dirpath
            .join(LAST_CHECKPOINT)
            .with_extension(CHECKPOINT_EXT)
    }

    pub fn on_validation_end<B: Backend, M: Module<B>>(
        &self,
        model: &M,
        epoch: usize,
    ) -> UnetResult<Vec<PathBuf>> {
        if !self.main_process {
            return Ok(Vec::new());
        }

        let mut written = vec![save_checkpoint::<B, M>(model, &self.last_path())?];
        if self.should_backup(epoch) {
            written.push(save_checkpoint::<B, M>(model, &self.backup_path(epoch))?);
        }
        Ok(written)
    }
}

pub fn find_latest_backup(checkpoint_dir: &Path) -> Option<(usize, PathBuf)> {
    if !checkpoint_dir.exists() {
        return None;
    }

    fs::read_dir(checkpoint_dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let path = entry.path();
            let epoch: usize = path
                .file_stem()?
                .to_str()?
                .strip_prefix(BACKUP_PREFIX)?
                .parse()
                .ok()?;
            Some((epoch, path))
        })
        .max_by_key(|(epoch, _)| *epoch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::nn::{Linear, LinearConfig};

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_backup_policy() {
        let ckpt = PeriodicCheckpointConfig::new()
            .with_every_n(5)
            .with_first_n(3)
            .init("unused");
        let backed_up: Vec<usize> = (0..21).filter(|&e| ckpt.should_backup(e)).collect();
        assert_eq!(backed_up, vec![0, 1, 2, 5, 10, 15, 20]);

        let disabled = PeriodicCheckpointConfig::new().with_every_n(0).init("unused");
        assert!((0..50).all(|e| !disabled.should_backup(e)));
    }

    #[test]
    fn test_backup_paths() {
        let ckpt = PeriodicCheckpointConfig::new().init("/results/checkpoints");
        assert_eq!(
            ckpt.backup_path(7),
            PathBuf::from("/results/checkpoints/backup_epoch_7.mpk")
        );
        assert_eq!(
            ckpt.last_path(),
            PathBuf::from("/results/checkpoints/last.mpk")
        );
    }

    #[test]
    fn test_save_and_find_backups() {
        let tmp = tempfile::tempdir().unwrap();
        let device = Default::default();
        let model: Linear<TestBackend> = LinearConfig::new(4, 2).init(&device);
        let ckpt = PeriodicCheckpointConfig::new()
            .with_every_n(2)
            .with_first_n(0)
            .init(tmp.path());

        assert_eq!(ckpt.on_validation_end::<TestBackend, _>(&model, 1).unwrap().len(), 1);
        assert_eq!(ckpt.on_validation_end::<TestBackend, _>(&model, 4).unwrap().len(), 2);
        assert_eq!(ckpt.on_validation_end::<TestBackend, _>(&model, 6).unwrap().len(), 2);
        assert!(ckpt.last_path().exists());

        let (epoch, path) = find_latest_backup(tmp.path()).unwrap();
        assert_eq!(epoch, 6);
        assert_eq!(path, ckpt.backup_path(6));

        let fresh: Linear<TestBackend> = LinearConfig::new(4, 2).init(&device);
        let restored = load_checkpoint::<TestBackend, _>(fresh, &path, &device).unwrap();
        assert_eq!(
            restored.weight.val().into_data().to_vec::<f32>().unwrap(),
            model.weight.val().into_data().to_vec::<f32>().unwrap()
        );
    }

    #[test]
    fn test_secondary_rank_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let device = Default::default();
        let model: Linear<TestBackend> = LinearConfig::new(4, 2).init(&device);
        let ckpt = PeriodicCheckpoint {
            main_process: false,
            ..PeriodicCheckpointConfig::new().with_every_n(1).init(tmp.path())
        };

        for epoch in 0..3 {
            let written = ckpt.on_validation_end::<TestBackend, _>(&model, epoch).unwrap();
            assert!(written.is_empty());
        }
        assert!(!ckpt.last_path().exists());
        assert!(find_latest_backup(tmp.path()).is_none());
    }

    #[test]
    fn test_resume_checkpoint_path() {
        let tmp = tempfile::tempdir().unwrap();
        let explicit = PathBuf::from("/models/pretrained.mpk");
        assert_eq!(
            resume_checkpoint_path(tmp.path(), true, Some(explicit.as_path())),
            Some(explicit.clone())
        );

        let ckpt_dir = tmp.path().join(CHECKPOINT_SUBDIR);
        fs::create_dir_all(&ckpt_dir).unwrap();
        fs::write(ckpt_dir.join("last.mpk"), b"").unwrap();
        assert_eq!(
            resume_checkpoint_path(tmp.path(), true, Some(explicit.as_path())),
            Some(ckpt_dir.join("last.mpk"))
        );
        assert_eq!(resume_checkpoint_path(tmp.path(), false, None), None);
    }
}
