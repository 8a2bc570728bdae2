use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const PROBLEM_PREFIX: &str = "blocklp-problem-";
pub const PROBLEM_SUFFIX: &str = ".lp";
pub const BLOCKS_PREFIX: &str = "blocklp-blocks-";

/// Where writers place output when the caller gives no destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    pub solver_dir: PathBuf,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            solver_dir: std::env::temp_dir(),
        }
    }
}

impl WriterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_solver_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.solver_dir = dir.into();
        self
    }

    /// Fresh, currently unused problem file path inside `solver_dir`.
    pub(crate) fn fresh_problem_path(&self) -> Result<PathBuf> {
        let file = tempfile::Builder::new()
            .prefix(PROBLEM_PREFIX)
            .suffix(PROBLEM_SUFFIX)
            .tempfile_in(&self.solver_dir)
            .map_err(|e| Error::fs(&self.solver_dir, e))?;
        // the placeholder is removed on drop; the writer recreates the file
        Ok(file.path().to_path_buf())
    }

    /// Fresh, currently unused directory path inside `solver_dir`.
    pub(crate) fn fresh_blocks_dir(&self) -> Result<PathBuf> {
        let dir = tempfile::Builder::new()
            .prefix(BLOCKS_PREFIX)
            .tempdir_in(&self.solver_dir)
            .map_err(|e| Error::fs(&self.solver_dir, e))?;
        Ok(dir.path().to_path_buf())
    }

    pub(crate) fn resolve(
        destination: Option<&Path>,
        fresh: impl FnOnce() -> Result<PathBuf>,
    ) -> Result<PathBuf> {
        match destination {
            Some(p) => Ok(p.to_path_buf()),
            None => fresh(),
        }
    }
}
