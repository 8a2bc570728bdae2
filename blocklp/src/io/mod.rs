mod assemble;
mod block_files;
mod blocks;
mod codec;
mod config;
mod lp;
mod snapshot;

pub use assemble::{and, any_over_axis, apply_mask, join, reduce_over_axis, write_lines, Fragment};
pub use block_files::{block_dir, write_blocks};
pub use blocks::{is_first_stage, Bucket, ConstraintRows, Partition, TermRows, VariableRows};
pub use codec::{float_token, float_tokens, int_token, int_tokens};
pub use config::{WriterConfig, BLOCKS_PREFIX, PROBLEM_PREFIX, PROBLEM_SUFFIX};
pub use lp::{write_problem, write_sections};
pub use snapshot::{
    key, load, save, Dataset, Field, FieldData, Scalar, CONSTRAINTS, CONSTRAINT_ATTRS, META_ATTRS,
    OBJECTIVE_ATTRS, VARIABLES, VARIABLE_ATTRS,
};

use crate::error::Result;
use crate::model::Model;
use std::path::{Path, PathBuf};

impl Model {
    /// Writes the model as an LP file. See [`write_problem`].
    pub fn to_file(&self, destination: Option<&Path>, config: &WriterConfig) -> Result<PathBuf> {
        write_problem(self, destination, config)
    }

    /// Writes the block-structured binary files. See [`write_blocks`].
    pub fn to_block_files(&self, destination: Option<&Path>, config: &WriterConfig) -> Result<PathBuf> {
        write_blocks(self, destination, config)
    }

    pub fn to_snapshot(&self, path: &Path) -> Result<()> {
        save(self, path)
    }

    pub fn from_snapshot(path: &Path) -> Result<Model> {
        load(path)
    }
}
