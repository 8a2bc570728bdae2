//! LP text writer.
//!
//! Emits the four sections in fixed order to one buffered file:
//!
//! ```text
//! min
//! obj:
//! +2.000000 x0
//!
//!
//! s.t.
//!
//! c0:
//! +1.000000 x0
//! >=
//! +0.000000
//!
//!
//! bounds
//! -inf <= x0 <= +inf
//!
//! binary
//! x1
//! end
//! ```
//!
//! Each section builds its lines as token arrays (see `codec` and `assemble`)
//! and masks out sentinel labels and absent terms before linearizing.

use crate::array::NdArray;
use crate::error::{Error, Result};
use crate::io::assemble::{and, any_over_axis, apply_mask, join, reduce_over_axis, write_lines, Fragment};
use crate::io::codec::{float_tokens, int_tokens};
use crate::io::config::WriterConfig;
use crate::model::{is_active, is_null, Constraint, Model, Objective, Variable};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Writes `model` as an LP file and returns its path.
///
/// Without a destination a fresh file is created in `config.solver_dir`. An
/// existing file at the destination is removed first. On failure the file is
/// left as it is and must be discarded by the caller.
pub fn write_problem(model: &Model, destination: Option<&Path>, config: &WriterConfig) -> Result<PathBuf> {
    let path = WriterConfig::resolve(destination, || config.fresh_problem_path())?;

    if path.exists() {
        fs::remove_file(&path).map_err(|e| Error::fs(&path, e))?;
    }
    let file = File::create(&path).map_err(|e| Error::fs(&path, e))?;
    let mut out = BufWriter::new(file);

    let start = Instant::now();
    write_sections(model, &mut out).map_err(|e| match e {
        Error::Io(source) => Error::fs(&path, source),
        other => other,
    })?;
    out.flush().map_err(|e| Error::fs(&path, e))?;

    info!(
        path = %path.display(),
        "writing time: {:.2}s",
        start.elapsed().as_secs_f64()
    );
    Ok(path)
}

/// All sections plus the terminal `end` line, in order.
pub fn write_sections<W: Write>(model: &Model, out: &mut W) -> Result<()> {
    objective_to_file(&model.objective, out)?;
    constraints_to_file(model.constraints.iter(), out)?;
    bounds_to_file(model.variables.iter(), out)?;
    binaries_to_file(model.variables.iter(), out)?;
    out.write_all(b"end\n")?;
    Ok(())
}

fn objective_to_file<W: Write>(objective: &Objective, out: &mut W) -> Result<()> {
    out.write_all(b"min\nobj:\n")?;

    let coeffs = objective.coeffs();
    let vars = objective.vars();
    let valid = term_mask(coeffs, vars)?;

    let coeff_tok = float_tokens(coeffs);
    let var_tok = int_tokens(vars);
    let lines = join(&[
        Fragment::Cells(&coeff_tok),
        Fragment::Lit(" x"),
        Fragment::Cells(&var_tok),
        Fragment::Lit("\n"),
    ])?;
    let n = write_lines(out, &apply_mask(lines, &valid)?)?;
    debug!(section = "objective", bytes = n, "section written");
    Ok(())
}

fn constraints_to_file<'a, W: Write>(
    constraints: impl Iterator<Item = (&'a String, &'a Constraint)>,
    out: &mut W,
) -> Result<()> {
    out.write_all(b"\n\ns.t.\n\n")?;

    for (name, con) in constraints {
        let term_axis = con.coeffs().ndim() - 1;

        let valid_terms = term_mask(con.coeffs(), con.vars())?;
        let coeff_tok = float_tokens(con.coeffs());
        let var_tok = int_tokens(con.vars());
        let term_lines = join(&[
            Fragment::Cells(&coeff_tok),
            Fragment::Lit(" x"),
            Fragment::Cells(&var_tok),
            Fragment::Lit("\n"),
        ])?;
        let lhs = reduce_over_axis(&apply_mask(term_lines, &valid_terms)?, term_axis)?;

        let has_terms = any_over_axis(&valid_terms, term_axis)?;
        let complete = con
            .labels()
            .zip_map(con.sign(), |l, s| is_active(*l) && s.is_some())?
            .zip_map(con.rhs(), |ok, r| *ok && !is_null(*r))?;
        let valid = and(&has_terms, &complete)?;

        let label_tok = int_tokens(con.labels());
        let sign_tok = con.sign().map(|s| s.map_or_else(String::new, |s| s.as_str().to_string()));
        let rhs_tok = float_tokens(con.rhs());
        let lines = join(&[
            Fragment::Lit("c"),
            Fragment::Cells(&label_tok),
            Fragment::Lit(": \n"),
            Fragment::Cells(&lhs),
            Fragment::Cells(&sign_tok),
            Fragment::Lit("\n"),
            Fragment::Cells(&rhs_tok),
            Fragment::Lit("\n\n"),
        ])?;
        let n = write_lines(out, &apply_mask(lines, &valid)?)?;
        debug!(section = "constraints", group = %name, bytes = n, "group written");
    }
    Ok(())
}

fn bounds_to_file<'a, W: Write>(
    variables: impl Iterator<Item = (&'a String, &'a Variable)>,
    out: &mut W,
) -> Result<()> {
    out.write_all(b"\nbounds\n")?;

    for (name, var) in variables {
        let bounded = var
            .lower()
            .zip_map(var.upper(), |lo, up| !is_null(*lo) && !is_null(*up))?;
        let continuous = var
            .labels()
            .zip_map(var.binary_flags(), |l, b| is_active(*l) && !*b)?;
        let valid = and(&bounded, &continuous)?;

        let lower_tok = float_tokens(var.lower());
        let label_tok = int_tokens(var.labels());
        let upper_tok = float_tokens(var.upper());
        let lines = join(&[
            Fragment::Cells(&lower_tok),
            Fragment::Lit(" <= x"),
            Fragment::Cells(&label_tok),
            Fragment::Lit(" <= "),
            Fragment::Cells(&upper_tok),
            Fragment::Lit("\n"),
        ])?;
        let n = write_lines(out, &apply_mask(lines, &valid)?)?;
        debug!(section = "bounds", group = %name, bytes = n, "group written");
    }
    Ok(())
}

fn binaries_to_file<'a, W: Write>(
    variables: impl Iterator<Item = (&'a String, &'a Variable)>,
    out: &mut W,
) -> Result<()> {
    out.write_all(b"\nbinary\n")?;

    for (name, var) in variables {
        let valid = var
            .labels()
            .zip_map(var.binary_flags(), |l, b| is_active(*l) && *b)?;
        let label_tok = int_tokens(var.labels());
        let lines = join(&[Fragment::Lit("x"), Fragment::Cells(&label_tok), Fragment::Lit("\n")])?;
        let n = write_lines(out, &apply_mask(lines, &valid)?)?;
        debug!(section = "binaries", group = %name, bytes = n, "group written");
    }
    Ok(())
}

/// A term is written when its coefficient is present and it references a
/// variable.
fn term_mask(coeffs: &NdArray<Option<f64>>, vars: &NdArray<i64>) -> Result<NdArray<bool>> {
    coeffs.zip_map(vars, |c, v| !is_null(*c) && is_active(*v))
}
