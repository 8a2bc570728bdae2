//! Block-angular partition of a model.
//!
//! Variables carry their block id. Constraint blocks are taken as given when a
//! group supplies them and derived from the blocks of the referenced variables
//! otherwise. Every active entity ends up in exactly one block of `0..=N`;
//! block `0` is the first stage for variables and block `N` the linking stage
//! for constraints.
//!
//! Terms are routed through [`Bucket`]. A term can land in several buckets
//! when `n` is `0` or `N`; that overlap is kept as is.

use crate::array::NdArray;
use crate::error::{Error, Result};
use crate::model::{is_active, is_null, Model, Sign};
use std::collections::BTreeSet;

/// Variable `b` is first stage when it sits in block 0.
pub fn is_first_stage(block: i64) -> bool {
    block == 0
}

/// Structural class of a constraint term relative to block `n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    /// Constraint and variable both in block `n`.
    Diagonal,
    /// Constraint in block `n`, variable in the first stage.
    FirstStageCoupling,
    /// Constraint in the linking block `N`, variable in block `n`.
    LastStageCoupling,
}

impl Bucket {
    pub const ALL: [Bucket; 3] = [
        Bucket::Diagonal,
        Bucket::FirstStageCoupling,
        Bucket::LastStageCoupling,
    ];

    pub fn contains(self, con_block: i64, var_block: i64, n: i64, last: i64) -> bool {
        match self {
            Bucket::Diagonal => con_block == n && var_block == n,
            Bucket::FirstStageCoupling => con_block == n && is_first_stage(var_block),
            Bucket::LastStageCoupling => con_block == last && var_block == n,
        }
    }

    /// File name prefix for equality / inequality rows of this bucket.
    pub fn file_prefix(self, equality: bool) -> &'static str {
        match (self, equality) {
            (Bucket::Diagonal, true) => "B",
            (Bucket::Diagonal, false) => "D",
            (Bucket::FirstStageCoupling, true) => "A",
            (Bucket::FirstStageCoupling, false) => "C",
            (Bucket::LastStageCoupling, true) => "BL",
            (Bucket::LastStageCoupling, false) => "DL",
        }
    }
}

/// Active variables, flattened group after group. Null bounds become NaN.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableRows {
    pub labels: Vec<i64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    pub blocks: Vec<i64>,
}

/// Active constraints, flattened group after group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstraintRows {
    pub labels: Vec<i64>,
    pub rhs: Vec<f64>,
    pub sign: Vec<Option<Sign>>,
    pub blocks: Vec<i64>,
}

/// Present terms of active constraints, in constraint order then term order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TermRows {
    /// Label of the owning constraint.
    pub labels: Vec<i64>,
    pub coeffs: Vec<f64>,
    pub vars: Vec<i64>,
    pub con_blocks: Vec<i64>,
    /// Block of the referenced variable; `-1` when the label is unknown.
    pub var_blocks: Vec<i64>,
    pub equality: Vec<bool>,
}

impl TermRows {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    last: i64,
    variables: VariableRows,
    constraints: ConstraintRows,
    terms: TermRows,
    objective: Vec<f64>,
}

impl Partition {
    pub fn new(model: &Model) -> Result<Self> {
        let variables = variable_rows(model)?;

        let mut last = variables.blocks.iter().copied().max().unwrap_or(0);
        for (name, con) in &model.constraints {
            if let Some(blocks) = con.blocks() {
                let max = checked_max(name, con.labels(), blocks)?;
                last = last.max(max);
            }
        }

        let block_of = label_lookup(&variables.labels, &variables.blocks);
        let objective = objective_rows(model, &variables.labels);

        let mut constraints = ConstraintRows::default();
        let mut terms = TermRows::default();
        for con in model.constraints.values() {
            let n_terms = con.n_terms();
            let coeffs = con.coeffs().as_slice();
            let vars = con.vars().as_slice();

            for (i, &label) in con.labels().as_slice().iter().enumerate() {
                if !is_active(label) {
                    continue;
                }
                let row = i * n_terms..(i + 1) * n_terms;
                let present: Vec<(f64, i64, i64)> = coeffs[row.clone()]
                    .iter()
                    .zip(&vars[row])
                    .filter(|(c, v)| !is_null(**c) && is_active(**v))
                    .map(|(c, &v)| (c.unwrap_or(0.0), v, lookup(&block_of, v)))
                    .collect();

                let block = match con.blocks() {
                    Some(blocks) => blocks.as_slice()[i],
                    None => derive_block(present.iter().map(|t| t.2), last),
                };
                let sign = con.sign().as_slice()[i];
                let equality = sign == Some(Sign::Eq);

                constraints.labels.push(label);
                constraints.rhs.push(con.rhs().as_slice()[i].unwrap_or(f64::NAN));
                constraints.sign.push(sign);
                constraints.blocks.push(block);

                for (coeff, var, var_block) in present {
                    terms.labels.push(label);
                    terms.coeffs.push(coeff);
                    terms.vars.push(var);
                    terms.con_blocks.push(block);
                    terms.var_blocks.push(var_block);
                    terms.equality.push(equality);
                }
            }
        }

        Ok(Self {
            last,
            variables,
            constraints,
            terms,
            objective,
        })
    }

    /// Index `N` of the last block.
    pub fn last_block(&self) -> i64 {
        self.last
    }

    pub fn block_count(&self) -> usize {
        // `last` is never negative
        self.last as usize + 1
    }

    pub fn variables(&self) -> &VariableRows {
        &self.variables
    }

    pub fn constraints(&self) -> &ConstraintRows {
        &self.constraints
    }

    pub fn terms(&self) -> &TermRows {
        &self.terms
    }

    /// Objective coefficient of every active variable, aligned with
    /// [`VariableRows`].
    pub fn objective(&self) -> &[f64] {
        &self.objective
    }
}

/// Block of a constraint without a supplied id: the single non-first-stage
/// block its terms touch, otherwise the linking block.
fn derive_block(var_blocks: impl Iterator<Item = i64>, last: i64) -> i64 {
    let touched: BTreeSet<i64> = var_blocks.filter(|&b| b > 0).collect();
    match touched.len() {
        1 => touched.into_iter().next().unwrap_or(last),
        _ => last,
    }
}

fn variable_rows(model: &Model) -> Result<VariableRows> {
    let mut rows = VariableRows::default();
    for (name, var) in &model.variables {
        let blocks = var
            .blocks()
            .ok_or_else(|| Error::MissingBlocks(name.clone()))?;
        checked_max(name, var.labels(), blocks)?;

        let cells = var
            .labels()
            .as_slice()
            .iter()
            .zip(var.lower().as_slice())
            .zip(var.upper().as_slice())
            .zip(blocks.as_slice());
        for (((&label, lower), upper), &block) in cells {
            if !is_active(label) {
                continue;
            }
            rows.labels.push(label);
            rows.lower.push(lower.unwrap_or(f64::NAN));
            rows.upper.push(upper.unwrap_or(f64::NAN));
            rows.blocks.push(block);
        }
    }
    Ok(rows)
}

/// Largest block id over active cells; negative ids are rejected.
fn checked_max(group: &str, labels: &NdArray<i64>, blocks: &NdArray<i64>) -> Result<i64> {
    let mut max = 0;
    for (&label, &block) in labels.as_slice().iter().zip(blocks.as_slice()) {
        if !is_active(label) {
            continue;
        }
        if block < 0 {
            return Err(Error::NegativeBlock {
                group: group.to_string(),
                block,
            });
        }
        max = max.max(block);
    }
    Ok(max)
}

/// Dense `label -> value` table over the label space, `-1` for holes.
fn label_lookup(labels: &[i64], values: &[i64]) -> Vec<i64> {
    let size = labels.iter().max().map_or(0, |&l| l as usize + 1);
    let mut table = vec![-1; size];
    for (&label, &value) in labels.iter().zip(values) {
        table[label as usize] = value;
    }
    table
}

fn lookup(table: &[i64], label: i64) -> i64 {
    usize::try_from(label)
        .ok()
        .and_then(|l| table.get(l).copied())
        .unwrap_or(-1)
}

/// Scatters objective coefficients by variable label, then gathers them for
/// each active variable. Repeated labels add up.
fn objective_rows(model: &Model, labels: &[i64]) -> Vec<f64> {
    let size = labels.iter().max().map_or(0, |&l| l as usize + 1);
    let mut dense = vec![0.0; size];
    let objective = &model.objective;
    for (coeff, &var) in objective.coeffs().as_slice().iter().zip(objective.vars().as_slice()) {
        if is_null(*coeff) || !is_active(var) {
            continue;
        }
        if let Some(slot) = dense.get_mut(var as usize) {
            *slot += coeff.unwrap_or(0.0);
        }
    }
    labels.iter().map(|&l| dense[l as usize]).collect()
}
