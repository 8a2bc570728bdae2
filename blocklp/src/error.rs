//! Error type shared by the writers and the snapshot codec.
//!
//! Null values and sentinel labels are never errors; they are absences and
//! are dropped from the output. Everything here is structural (bad shapes,
//! missing block assignments, schema mismatches) or an I/O failure.

use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Flat data does not fill the declared shape.
    #[error("array of shape {shape:?} needs {expected} elements, got {actual}")]
    Shape {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
    /// Two arrays that must be aligned have different shapes.
    #[error("{what}: expected shape {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("axis {axis} is out of range for an array with {ndim} dimensions")]
    Axis { axis: usize, ndim: usize },
    #[error("unknown constraint sign `{0}`")]
    UnknownSign(String),
    /// Block files need a block id for every variable group.
    #[error("variable `{0}` has no block assignment")]
    MissingBlocks(String),
    #[error("`{group}` is assigned to negative block {block}")]
    NegativeBlock { group: String, block: i64 },
    #[error("snapshot is missing field `{0}`")]
    MissingField(String),
    #[error("snapshot is missing attribute `{0}`")]
    MissingAttr(String),
    #[error("snapshot entry `{key}` is not of kind {expected}")]
    FieldType { key: String, expected: &'static str },
    /// File-system failure on a known path.
    #[error("i/o error on `{}`: {source}", .path.display())]
    FileSystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn fs(path: &Path, source: io::Error) -> Self {
        Error::FileSystem {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
