//! Model snapshots.
//!
//! A snapshot is one flat `Dataset`: every array of the model stored under a
//! namespaced key, plus the scalar metadata. Keys follow
//! `<section>_<attribute>-<group>` for variables and constraints
//! (`variables_lower-x`, `constraints_rhs-con0`) and `<attribute>-<field>` for
//! top-level arrays (`objective-coeffs`, `parameters-demand`), so groups of
//! different sections never collide.
//!
//! The dataset is stored as JSON. Non-finite floats are written as the
//! strings `"inf"`, `"-inf"` and `"nan"` so nothing is lost on the way back.

use crate::array::NdArray;
use crate::error::{Error, Result};
use crate::model::{Constraint, Model, ModelMeta, Objective, Sign, Variable};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

pub const VARIABLES: &str = "variables_";
pub const CONSTRAINTS: &str = "constraints_";

/// Attributes stored per variable group, with whether a snapshot must
/// contain them.
pub const VARIABLE_ATTRS: [(&str, bool); 5] = [
    ("labels", true),
    ("lower", true),
    ("upper", true),
    ("binary", true),
    ("blocks", false),
];

/// Attributes stored per constraint group, with whether a snapshot must
/// contain them.
pub const CONSTRAINT_ATTRS: [(&str, bool); 6] = [
    ("labels", true),
    ("coeffs", true),
    ("vars", true),
    ("sign", true),
    ("rhs", true),
    ("blocks", false),
];

pub const OBJECTIVE_ATTRS: [&str; 2] = ["coeffs", "vars"];

pub const META_ATTRS: [&str; 7] = [
    "name",
    "var_counter",
    "con_counter",
    "status",
    "termination_condition",
    "objective_value",
    "solved",
];

pub fn key(prefix: &str, attr: &str, field: &str) -> String {
    format!("{}{}-{}", prefix, attr, field)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub shape: Vec<usize>,
    pub data: FieldData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dtype", content = "values", rename_all = "lowercase")]
pub enum FieldData {
    Int(Vec<i64>),
    Float(#[serde(with = "float_cells")] Vec<Option<f64>>),
    Bool(Vec<bool>),
    Sign(Vec<Option<Sign>>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scalar {
    Int(i64),
    Float(#[serde(with = "float_cell")] f64),
    Str(String),
    Null,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub fields: BTreeMap<String, Field>,
    pub attrs: BTreeMap<String, Scalar>,
}

impl Field {
    fn int(a: &NdArray<i64>) -> Self {
        Self {
            shape: a.shape().to_vec(),
            data: FieldData::Int(a.as_slice().to_vec()),
        }
    }

    fn float(a: &NdArray<Option<f64>>) -> Self {
        Self {
            shape: a.shape().to_vec(),
            data: FieldData::Float(a.as_slice().to_vec()),
        }
    }

    fn bool(a: &NdArray<bool>) -> Self {
        Self {
            shape: a.shape().to_vec(),
            data: FieldData::Bool(a.as_slice().to_vec()),
        }
    }

    fn sign(a: &NdArray<Option<Sign>>) -> Self {
        Self {
            shape: a.shape().to_vec(),
            data: FieldData::Sign(a.as_slice().to_vec()),
        }
    }

    fn into_int(self, key: &str) -> Result<NdArray<i64>> {
        match self.data {
            FieldData::Int(v) => NdArray::new(self.shape, v),
            _ => Err(mistyped(key, "int")),
        }
    }

    fn into_float(self, key: &str) -> Result<NdArray<Option<f64>>> {
        match self.data {
            FieldData::Float(v) => NdArray::new(self.shape, v),
            _ => Err(mistyped(key, "float")),
        }
    }

    fn into_bool(self, key: &str) -> Result<NdArray<bool>> {
        match self.data {
            FieldData::Bool(v) => NdArray::new(self.shape, v),
            _ => Err(mistyped(key, "bool")),
        }
    }

    fn into_sign(self, key: &str) -> Result<NdArray<Option<Sign>>> {
        match self.data {
            FieldData::Sign(v) => NdArray::new(self.shape, v),
            _ => Err(mistyped(key, "sign")),
        }
    }
}

fn mistyped(key: &str, expected: &'static str) -> Error {
    Error::FieldType {
        key: key.to_string(),
        expected,
    }
}

fn variable_field(var: &Variable, attr: &str) -> Option<Field> {
    match attr {
        "labels" => Some(Field::int(var.labels())),
        "lower" => Some(Field::float(var.lower())),
        "upper" => Some(Field::float(var.upper())),
        "binary" => Some(Field::bool(var.binary_flags())),
        "blocks" => var.blocks().map(Field::int),
        _ => None,
    }
}

fn constraint_field(con: &Constraint, attr: &str) -> Option<Field> {
    match attr {
        "labels" => Some(Field::int(con.labels())),
        "coeffs" => Some(Field::float(con.coeffs())),
        "vars" => Some(Field::int(con.vars())),
        "sign" => Some(Field::sign(con.sign())),
        "rhs" => Some(Field::float(con.rhs())),
        "blocks" => con.blocks().map(Field::int),
        _ => None,
    }
}

fn objective_field(obj: &Objective, attr: &str) -> Option<Field> {
    match attr {
        "coeffs" => Some(Field::float(obj.coeffs())),
        "vars" => Some(Field::int(obj.vars())),
        _ => None,
    }
}

impl Dataset {
    pub fn from_model(model: &Model) -> Self {
        let mut ds = Dataset::default();

        for (name, var) in &model.variables {
            for (attr, _) in VARIABLE_ATTRS {
                if let Some(field) = variable_field(var, attr) {
                    ds.fields.insert(key(VARIABLES, attr, name), field);
                }
            }
        }
        for (name, con) in &model.constraints {
            for (attr, _) in CONSTRAINT_ATTRS {
                if let Some(field) = constraint_field(con, attr) {
                    ds.fields.insert(key(CONSTRAINTS, attr, name), field);
                }
            }
        }
        for attr in OBJECTIVE_ATTRS {
            if let Some(field) = objective_field(&model.objective, attr) {
                ds.fields.insert(key("", "objective", attr), field);
            }
        }
        for (name, values) in &model.parameters {
            let values = values.map(|v| Some(*v));
            ds.fields.insert(key("", "parameters", name), Field::float(&values));
        }

        let meta = &model.meta;
        let attrs = [
            ("name", Scalar::Str(meta.name.clone())),
            ("var_counter", Scalar::Int(meta.var_counter)),
            ("con_counter", Scalar::Int(meta.con_counter)),
            ("status", Scalar::Str(meta.status.clone())),
            ("termination_condition", Scalar::Str(meta.termination_condition.clone())),
            ("objective_value", meta.objective_value.map_or(Scalar::Null, Scalar::Float)),
            // booleans are stored as integers
            ("solved", Scalar::Int(i64::from(meta.solved))),
        ];
        for (k, v) in attrs {
            ds.attrs.insert(k.to_string(), v);
        }
        ds
    }

    pub fn into_model(mut self) -> Result<Model> {
        let mut model = Model::default();

        for name in self.groups(VARIABLES, &VARIABLE_ATTRS) {
            self.require(VARIABLES, &VARIABLE_ATTRS, &name)?;
            let k = |attr: &str| key(VARIABLES, attr, &name);
            let labels = self.take(&k("labels"))?.into_int(&k("labels"))?;
            let lower = self.take(&k("lower"))?.into_float(&k("lower"))?;
            let upper = self.take(&k("upper"))?.into_float(&k("upper"))?;
            let binary = self.take(&k("binary"))?.into_bool(&k("binary"))?;
            let mut var = Variable::new(labels, lower, upper)?.with_binary(binary)?;
            if let Some(blocks) = self.fields.remove(&k("blocks")) {
                var = var.with_blocks(blocks.into_int(&k("blocks"))?)?;
            }
            model.variables.insert(name, var);
        }

        for name in self.groups(CONSTRAINTS, &CONSTRAINT_ATTRS) {
            self.require(CONSTRAINTS, &CONSTRAINT_ATTRS, &name)?;
            let k = |attr: &str| key(CONSTRAINTS, attr, &name);
            let labels = self.take(&k("labels"))?.into_int(&k("labels"))?;
            let coeffs = self.take(&k("coeffs"))?.into_float(&k("coeffs"))?;
            let vars = self.take(&k("vars"))?.into_int(&k("vars"))?;
            let sign = self.take(&k("sign"))?.into_sign(&k("sign"))?;
            let rhs = self.take(&k("rhs"))?.into_float(&k("rhs"))?;
            let mut con = Constraint::new(labels, coeffs, vars, sign, rhs)?;
            if let Some(blocks) = self.fields.remove(&k("blocks")) {
                con = con.with_blocks(blocks.into_int(&k("blocks"))?)?;
            }
            model.constraints.insert(name, con);
        }

        let coeffs_key = key("", "objective", "coeffs");
        let vars_key = key("", "objective", "vars");
        let coeffs = self.take(&coeffs_key)?.into_float(&coeffs_key)?;
        let vars = self.take(&vars_key)?.into_int(&vars_key)?;
        model.objective = Objective::new(coeffs, vars)?;

        let prefix = key("", "parameters", "");
        let names: Vec<String> = self
            .fields
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
            .collect();
        for name in names {
            let k = key("", "parameters", &name);
            let values = self.take(&k)?.into_float(&k)?;
            model.parameters.insert(name, values.map(|v| v.unwrap_or(f64::NAN)));
        }

        model.meta = self.meta()?;
        Ok(model)
    }

    /// Group names of a section: every group with at least one entry under
    /// any of the section's attributes.
    fn groups(&self, section: &str, attrs: &[(&str, bool)]) -> BTreeSet<String> {
        let prefixes: Vec<String> = attrs.iter().map(|(attr, _)| key(section, attr, "")).collect();
        self.fields
            .keys()
            .filter_map(|k| prefixes.iter().find_map(|p| k.strip_prefix(p.as_str())))
            .map(str::to_string)
            .collect()
    }

    /// Fails on the first required attribute of group `name` that is absent.
    fn require(&self, section: &str, attrs: &[(&str, bool)], name: &str) -> Result<()> {
        for &(attr, required) in attrs {
            let k = key(section, attr, name);
            if required && !self.fields.contains_key(&k) {
                return Err(Error::MissingField(k));
            }
        }
        Ok(())
    }

    fn take(&mut self, key: &str) -> Result<Field> {
        self.fields
            .remove(key)
            .ok_or_else(|| Error::MissingField(key.to_string()))
    }

    fn attr(&mut self, key: &str) -> Result<Scalar> {
        self.attrs
            .remove(key)
            .ok_or_else(|| Error::MissingAttr(key.to_string()))
    }

    fn str_attr(&mut self, key: &str) -> Result<String> {
        match self.attr(key)? {
            Scalar::Str(s) => Ok(s),
            _ => Err(mistyped(key, "str")),
        }
    }

    fn int_attr(&mut self, key: &str) -> Result<i64> {
        match self.attr(key)? {
            Scalar::Int(i) => Ok(i),
            _ => Err(mistyped(key, "int")),
        }
    }

    fn meta(&mut self) -> Result<ModelMeta> {
        let objective_value = match self.attr("objective_value")? {
            Scalar::Float(v) => Some(v),
            Scalar::Int(i) => Some(i as f64),
            Scalar::Null => None,
            Scalar::Str(_) => return Err(mistyped("objective_value", "float")),
        };
        Ok(ModelMeta {
            name: self.str_attr("name")?,
            var_counter: self.int_attr("var_counter")?,
            con_counter: self.int_attr("con_counter")?,
            status: self.str_attr("status")?,
            termination_condition: self.str_attr("termination_condition")?,
            objective_value,
            solved: self.int_attr("solved")? != 0,
        })
    }
}

/// Writes a snapshot of `model` to `path`, replacing any existing file.
pub fn save(model: &Model, path: &Path) -> Result<()> {
    let ds = Dataset::from_model(model);
    let file = File::create(path).map_err(|e| Error::fs(path, e))?;
    let mut out = BufWriter::new(file);
    serde_json::to_writer(&mut out, &ds)?;
    out.flush().map_err(|e| Error::fs(path, e))?;
    info!(path = %path.display(), fields = ds.fields.len(), "snapshot saved");
    Ok(())
}

/// Reads a model back from a snapshot written by [`save`].
pub fn load(path: &Path) -> Result<Model> {
    let file = File::open(path).map_err(|e| Error::fs(path, e))?;
    let ds: Dataset = serde_json::from_reader(BufReader::new(file))?;
    ds.into_model()
}

/// JSON form of one float: a number, or a tag for values JSON cannot hold.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum Cell {
    Finite(f64),
    Special(Special),
}

#[derive(Serialize, Deserialize)]
enum Special {
    #[serde(rename = "inf")]
    Inf,
    #[serde(rename = "-inf")]
    NegInf,
    #[serde(rename = "nan")]
    NaN,
}

impl Cell {
    fn encode(v: f64) -> Self {
        if v.is_nan() {
            Cell::Special(Special::NaN)
        } else if v == f64::INFINITY {
            Cell::Special(Special::Inf)
        } else if v == f64::NEG_INFINITY {
            Cell::Special(Special::NegInf)
        } else {
            Cell::Finite(v)
        }
    }

    fn decode(self) -> f64 {
        match self {
            Cell::Finite(v) => v,
            Cell::Special(Special::Inf) => f64::INFINITY,
            Cell::Special(Special::NegInf) => f64::NEG_INFINITY,
            Cell::Special(Special::NaN) => f64::NAN,
        }
    }
}

mod float_cells {
    use super::Cell;
    use serde::{Deserialize, Deserializer, Serializer};

    // NaN and None are the same null; both go out as `null`
    pub fn serialize<S: Serializer>(values: &[Option<f64>], s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(
            values
                .iter()
                .map(|v| v.filter(|x| !x.is_nan()).map(Cell::encode)),
        )
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Option<f64>>, D::Error> {
        let cells = Vec::<Option<Cell>>::deserialize(d)?;
        Ok(cells.into_iter().map(|c| c.map(Cell::decode)).collect())
    }
}

mod float_cell {
    use super::Cell;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, s: S) -> Result<S::Ok, S::Error> {
        Cell::encode(*value).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Cell::deserialize(d).map(Cell::decode)
    }
}
