use crate::array::NdArray;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Label marking an inactive slot in an otherwise dense array.
pub const SENTINEL: i64 = -1;

/// Whether a variable/constraint label (or a term's variable reference) names
/// a live entity. Labels are non-negative; `-1` and anything below it are slots
/// without an entity.
pub fn is_active(label: i64) -> bool {
    label >= 0
}

/// Numeric null: an absent value or a NaN.
pub fn is_null(value: Option<f64>) -> bool {
    value.map_or(true, f64::is_nan)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sign {
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "==")]
    Eq,
}

impl Sign {
    pub fn as_str(self) -> &'static str {
        match self {
            Sign::Le => "<=",
            Sign::Ge => ">=",
            Sign::Eq => "==",
        }
    }
}

impl fmt::Display for Sign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sign {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "<=" => Ok(Sign::Le),
            ">=" => Ok(Sign::Ge),
            "==" | "=" => Ok(Sign::Eq),
            other => Err(Error::UnknownSign(other.to_string())),
        }
    }
}

/// One named group of variables; every array has the same shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    labels: NdArray<i64>,
    lower: NdArray<Option<f64>>,
    upper: NdArray<Option<f64>>,
    binary: NdArray<bool>,
    blocks: Option<NdArray<i64>>,
}

impl Variable {
    /// Continuous variables with the given bounds (`None` = unbounded side
    /// left unset).
    pub fn new(
        labels: NdArray<i64>,
        lower: NdArray<Option<f64>>,
        upper: NdArray<Option<f64>>,
    ) -> Result<Self> {
        lower.ensure_shape("variable lower bounds", labels.shape())?;
        upper.ensure_shape("variable upper bounds", labels.shape())?;
        let binary = NdArray::full(labels.shape().to_vec(), false);
        Ok(Self {
            labels,
            lower,
            upper,
            binary,
            blocks: None,
        })
    }

    /// Binary variables: bounds `[0, 1]`, flagged for the binaries section.
    pub fn binary(labels: NdArray<i64>) -> Self {
        let shape = labels.shape().to_vec();
        Self {
            lower: NdArray::full(shape.clone(), Some(0.0)),
            upper: NdArray::full(shape.clone(), Some(1.0)),
            binary: NdArray::full(shape, true),
            labels,
            blocks: None,
        }
    }

    pub fn with_binary(mut self, binary: NdArray<bool>) -> Result<Self> {
        binary.ensure_shape("variable binary flags", self.labels.shape())?;
        self.binary = binary;
        Ok(self)
    }

    pub fn with_blocks(mut self, blocks: NdArray<i64>) -> Result<Self> {
        blocks.ensure_shape("variable blocks", self.labels.shape())?;
        self.blocks = Some(blocks);
        Ok(self)
    }

    pub fn shape(&self) -> &[usize] {
        self.labels.shape()
    }

    pub fn labels(&self) -> &NdArray<i64> {
        &self.labels
    }

    pub fn lower(&self) -> &NdArray<Option<f64>> {
        &self.lower
    }

    pub fn upper(&self) -> &NdArray<Option<f64>> {
        &self.upper
    }

    pub fn binary_flags(&self) -> &NdArray<bool> {
        &self.binary
    }

    pub fn blocks(&self) -> Option<&NdArray<i64>> {
        self.blocks.as_ref()
    }
}

/// One named group of constraints. `coeffs` and `vars` carry one extra
/// trailing axis: the terms of each constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    labels: NdArray<i64>,
    coeffs: NdArray<Option<f64>>,
    vars: NdArray<i64>,
    sign: NdArray<Option<Sign>>,
    rhs: NdArray<Option<f64>>,
    blocks: Option<NdArray<i64>>,
}

impl Constraint {
    pub fn new(
        labels: NdArray<i64>,
        coeffs: NdArray<Option<f64>>,
        vars: NdArray<i64>,
        sign: NdArray<Option<Sign>>,
        rhs: NdArray<Option<f64>>,
    ) -> Result<Self> {
        let Some(&n_terms) = coeffs.shape().last() else {
            return Err(Error::ShapeMismatch {
                what: "constraint coefficients need a term axis".to_string(),
                expected: labels.shape().iter().copied().chain([0]).collect(),
                actual: coeffs.shape().to_vec(),
            });
        };
        let mut term_shape = labels.shape().to_vec();
        term_shape.push(n_terms);
        coeffs.ensure_shape("constraint coefficients", &term_shape)?;
        vars.ensure_shape("constraint variables", &term_shape)?;
        sign.ensure_shape("constraint signs", labels.shape())?;
        rhs.ensure_shape("constraint right-hand sides", labels.shape())?;
        Ok(Self {
            labels,
            coeffs,
            vars,
            sign,
            rhs,
            blocks: None,
        })
    }

    pub fn with_blocks(mut self, blocks: NdArray<i64>) -> Result<Self> {
        blocks.ensure_shape("constraint blocks", self.labels.shape())?;
        self.blocks = Some(blocks);
        Ok(self)
    }

    pub fn shape(&self) -> &[usize] {
        self.labels.shape()
    }

    /// Length of the term axis.
    pub fn n_terms(&self) -> usize {
        self.coeffs.shape().last().copied().unwrap_or(0)
    }

    pub fn labels(&self) -> &NdArray<i64> {
        &self.labels
    }

    pub fn coeffs(&self) -> &NdArray<Option<f64>> {
        &self.coeffs
    }

    pub fn vars(&self) -> &NdArray<i64> {
        &self.vars
    }

    pub fn sign(&self) -> &NdArray<Option<Sign>> {
        &self.sign
    }

    pub fn rhs(&self) -> &NdArray<Option<f64>> {
        &self.rhs
    }

    pub fn blocks(&self) -> Option<&NdArray<i64>> {
        self.blocks.as_ref()
    }
}

/// Linear objective as a flat term array.
#[derive(Debug, Clone, PartialEq)]
pub struct Objective {
    coeffs: NdArray<Option<f64>>,
    vars: NdArray<i64>,
}

impl Objective {
    pub fn new(coeffs: NdArray<Option<f64>>, vars: NdArray<i64>) -> Result<Self> {
        vars.ensure_shape("objective variables", coeffs.shape())?;
        Ok(Self { coeffs, vars })
    }

    pub fn coeffs(&self) -> &NdArray<Option<f64>> {
        &self.coeffs
    }

    pub fn vars(&self) -> &NdArray<i64> {
        &self.vars
    }
}

impl Default for Objective {
    fn default() -> Self {
        Self {
            coeffs: NdArray::from_vec(vec![]),
            vars: NdArray::from_vec(vec![]),
        }
    }
}

/// Named groups, iterated in name order. Flattening a collection concatenates
/// its groups in that order.
pub type Groups<T> = BTreeMap<String, T>;

/// Scalar attributes carried along with the arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelMeta {
    pub name: String,
    /// Next free variable label.
    pub var_counter: i64,
    /// Next free constraint label.
    pub con_counter: i64,
    pub status: String,
    pub termination_condition: String,
    pub objective_value: Option<f64>,
    pub solved: bool,
}

impl Default for ModelMeta {
    fn default() -> Self {
        Self {
            name: String::new(),
            var_counter: 0,
            con_counter: 0,
            status: "initialized".to_string(),
            termination_condition: String::new(),
            objective_value: None,
            solved: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Model {
    pub variables: Groups<Variable>,
    pub constraints: Groups<Constraint>,
    pub objective: Objective,
    /// Free-form numeric parameters; only the snapshot codec looks at them.
    pub parameters: Groups<NdArray<f64>>,
    pub meta: ModelMeta,
}

impl Model {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            meta: ModelMeta {
                name: name.into(),
                ..ModelMeta::default()
            },
            ..Self::default()
        }
    }

    /// Registers a variable group and advances the label counter past its
    /// labels.
    pub fn add_variables(&mut self, name: impl Into<String>, var: Variable) {
        let next = var.labels().as_slice().iter().max().map_or(0, |l| l + 1);
        self.meta.var_counter = self.meta.var_counter.max(next);
        self.variables.insert(name.into(), var);
    }

    /// Registers a constraint group and advances the label counter past its
    /// labels.
    pub fn add_constraints(&mut self, name: impl Into<String>, con: Constraint) {
        let next = con.labels().as_slice().iter().max().map_or(0, |l| l + 1);
        self.meta.con_counter = self.meta.con_counter.max(next);
        self.constraints.insert(name.into(), con);
    }

    pub fn set_objective(&mut self, objective: Objective) {
        self.objective = objective;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_parse() {
        assert_eq!("<=".parse::<Sign>().unwrap(), Sign::Le);
        assert_eq!(">=".parse::<Sign>().unwrap(), Sign::Ge);
        assert_eq!("=".parse::<Sign>().unwrap(), Sign::Eq);
        assert_eq!("==".parse::<Sign>().unwrap(), Sign::Eq);
        assert!("<".parse::<Sign>().is_err());
        assert!("=<".parse::<Sign>().is_err());
        assert_eq!(Sign::Ge.to_string().parse::<Sign>().unwrap(), Sign::Ge);
    }

    #[test]
    fn test_null_and_active() {
        assert!(is_null(None));
        assert!(is_null(Some(f64::NAN)));
        assert!(!is_null(Some(f64::INFINITY)));
        assert!(!is_active(SENTINEL));
        assert!(is_active(0));
    }

    #[test]
    fn test_constraint_shapes() {
        let labels = NdArray::from_vec(vec![0, 1]);
        let coeffs = NdArray::new(vec![2, 2], vec![Some(1.0); 4]).unwrap();
        let vars = NdArray::new(vec![2, 2], vec![0, 1, 0, -1]).unwrap();
        let sign = NdArray::from_vec(vec![Some(Sign::Le); 2]);
        let rhs = NdArray::from_vec(vec![Some(1.0); 2]);
        let c = Constraint::new(labels.clone(), coeffs.clone(), vars, sign.clone(), rhs.clone()).unwrap();
        assert_eq!(c.n_terms(), 2);

        let bad_vars = NdArray::new(vec![2, 1], vec![0, 1]).unwrap();
        assert!(Constraint::new(labels, coeffs, bad_vars, sign, rhs).is_err());
    }

    #[test]
    fn test_add_variables_advances_counter() {
        let mut m = Model::new("m");
        m.add_variables("x", Variable::binary(NdArray::from_vec(vec![0, 1, -1, 4])));
        assert_eq!(m.meta.var_counter, 5);
        m.add_variables("y", Variable::binary(NdArray::from_vec(vec![-1])));
        assert_eq!(m.meta.var_counter, 5);
    }
}
