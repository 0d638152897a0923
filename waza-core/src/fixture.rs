//! Fixture Manager: stages per-trial working directories
//! and guarantees their cleanup on every exit path.

use crate::error::TrialError;
use crate::spec::model::{BenchmarkSpec, FileSource, TaskDefinition};
use std::path::{Path, PathBuf};
use tracing::{instrument, warn};

/// Owns a staged working directory for exactly one trial. Released on
/// drop regardless of how the trial ended (success, error, cancellation,
/// or panic unwinding through it).
pub struct FixtureGuard {
    root: PathBuf,
    _tempdir: tempfile::TempDir,
}

impl FixtureGuard {
    pub fn path(&self) -> &Path {
        &self.root
    }
}

/// Stages fixtures for trials. Two concurrent calls to [`stage`] never
/// share a directory: each gets its own `tempfile::TempDir`.
pub struct FixtureManager {
    /// Benchmark-level context directories copied into every trial,
    /// resolved relative to the spec directory.
    context_dirs: Vec<PathBuf>,
}

impl FixtureManager {
    pub fn new(spec: &BenchmarkSpec, spec_dir: &Path) -> Self {
        let context_dirs = spec
            .config
            .skill_paths
            .iter()
            .map(|p| {
                if p.is_absolute() {
                    p.clone()
                } else {
                    spec_dir.join(p)
                }
            })
            .collect();
        Self { context_dirs }
    }

    /// Stage a fresh working directory for one trial of `task`: copies the
    /// benchmark-level context dirs, then the task's own reference files
    /// (which may overwrite context-dir paths — task files take priority).
    #[instrument(skip(self, task), fields(task_id = %task.id))]
    pub fn stage(&self, task: &TaskDefinition) -> Result<FixtureGuard, TrialError> {
        let tempdir = tempfile::Builder::new()
            .prefix("waza-trial-")
            .tempdir()
            .map_err(|e| TrialError::FixtureStagingFailed(e.to_string()))?;
        let root = tempdir.path().to_path_buf();

        for dir in &self.context_dirs {
            copy_dir_contents(dir, &root)
                .map_err(|e| TrialError::FixtureStagingFailed(format!(
                    "copying context dir {}: {e}",
                    dir.display()
                )))?;
        }

        for file in &task.files {
            let dest = root.join(&file.logical_path);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| TrialError::FixtureStagingFailed(e.to_string()))?;
            }
            match &file.source {
                FileSource::Inline { content } => {
                    std::fs::write(&dest, content)
                        .map_err(|e| TrialError::FixtureStagingFailed(e.to_string()))?;
                }
                FileSource::OnDisk { path } => {
                    std::fs::copy(path, &dest)
                        .map_err(|e| TrialError::FixtureStagingFailed(format!(
                            "copying {} -> {}: {e}",
                            path.display(),
                            dest.display()
                        )))?;
                }
            }
        }

        Ok(FixtureGuard {
            root,
            _tempdir: tempdir,
        })
    }
}

fn copy_dir_contents(src: &Path, dst: &Path) -> std::io::Result<()> {
    if !src.exists() {
        warn!(dir = %src.display(), "context dir does not exist, skipping");
        return Ok(());
    }
    for entry in walkdir::WalkDir::new(src).min_depth(1) {
        let entry = entry.map_err(std::io::Error::other)?;
        let rel = entry.path().strip_prefix(src).expect("walkdir under src");
        let dest = dst.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&dest)?;
        } else {
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}
