//! Numeric tokens for the LP text format.
//!
//! Floats always carry an explicit sign and six fractional digits so term
//! lines line up for fixed-width parsers; nulls encode as zero.

use crate::array::NdArray;

pub fn float_token(value: Option<f64>) -> String {
    let v = match value {
        Some(v) if !v.is_nan() => v,
        _ => 0.0,
    };
    format!("{:+.6}", v)
}

pub fn int_token(value: Option<i64>) -> String {
    value.unwrap_or(0).to_string()
}

/// Elementwise `float_token`, shape preserved.
pub fn float_tokens(values: &NdArray<Option<f64>>) -> NdArray<String> {
    values.par_map(|v| float_token(*v))
}

/// Elementwise `int_token`, shape preserved.
pub fn int_tokens(values: &NdArray<i64>) -> NdArray<String> {
    values.par_map(|v| int_token(Some(*v)))
}
