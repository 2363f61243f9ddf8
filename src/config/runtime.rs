use burn::tensor::backend::Backend;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::UnetResult;

pub const VISIBLE_DEVICES_VAR: &str = "CUDA_VISIBLE_DEVICES";
pub const LOCAL_RANK_VAR: &str = "LOCAL_RANK";

/// Expand `~` and `$VAR`/`${VAR}`, then make the path absolute.
///
/// Existing paths are canonicalised (symlinks resolved). Unknown variables are
/// left in place, like a shell without `nounset`.
pub fn canonical_path(name: &str) -> UnetResult<PathBuf> {
    let expanded = expand_vars(&expand_home(name));
    let path = PathBuf::from(expanded);
    let absolute = if path.is_absolute() {
        path
    } else {
        env::current_dir()?.join(path)
    };
    if absolute.exists() {
        Ok(fs::canonicalize(&absolute)?)
    } else {
        Ok(absolute)
    }
}

fn expand_home(name: &str) -> String {
    if name == "~" || name.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{}", home.display(), &name[1..]);
        }
    }
    name.to_string()
}

fn expand_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };
        match env::var(name) {
            Ok(value) if !name.is_empty() => out.push_str(&value),
            _ => {
                out.push('$');
                out.push_str(&after[..consumed]);
            }
        }
        rest = &after[consumed..];
    }
    out.push_str(rest);
    out
}

/// Rank 0 (or a launch without `LOCAL_RANK`) owns logging and checkpoint writes.
pub fn is_main_process() -> bool {
    is_main_rank(env::var(LOCAL_RANK_VAR).ok().as_deref())
}

fn is_main_rank(local_rank: Option<&str>) -> bool {
    local_rank
        .and_then(|rank| rank.trim().parse::<usize>().ok())
        .unwrap_or(0)
        == 0
}

pub fn visible_devices(gpus: usize) -> String {
    (0..gpus)
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Restricts device visibility to the first `gpus` devices unless the caller
/// already pinned them. Returns the effective value.
pub fn set_visible_devices(gpus: usize) -> String {
    match env::var(VISIBLE_DEVICES_VAR) {
        Ok(existing) => existing,
        Err(_) => {
            let list = visible_devices(gpus);
            env::set_var(VISIBLE_DEVICES_VAR, &list);
            log::debug!("{}={}", VISIBLE_DEVICES_VAR, list);
            list
        }
    }
}

/// Seeds the backend RNG used for parameter init and random tensors.
pub fn seed_everything<B: Backend>(seed: u64) {
    B::seed(seed);
    log::info!("Global seed set to {}", seed);
}

pub fn make_empty_dir<P: AsRef<Path>>(path: P) -> UnetResult<()> {
    let path = path.as_ref();
    if path.exists() {
        fs::remove_dir_all(path)?;
    }
    fs::create_dir_all(path)?;
    Ok(())
}
