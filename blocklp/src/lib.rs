//! Writers for linear optimization models.
//!
//! A [`Model`] is a set of flat parallel arrays (labels, bounds, coefficients,
//! signs, right-hand sides, block ids). This crate turns it into
//!
//! * an LP text file ([`io::write_problem`]),
//! * a directory of per-block binary arrays for decomposition solvers
//!   ([`io::write_blocks`]),
//! * a JSON snapshot that restores the model ([`io::save`] / [`io::load`]).
//!
//! Building models from expressions is left to the caller.

pub mod array;
pub mod error;
pub mod io;
pub mod model;

pub use array::NdArray;
pub use error::{Error, Result};
pub use io::WriterConfig;
pub use model::{is_active, is_null, Constraint, Groups, Model, ModelMeta, Objective, Sign, Variable, SENTINEL};
