//! Masked assembly of text lines from aligned token arrays.

use crate::array::NdArray;
use crate::error::Result;
use rayon::prelude::*;
use std::io::Write;

/// One piece of a composite line.
#[derive(Debug, Clone, Copy)]
pub enum Fragment<'a> {
    /// Same text in every cell.
    Lit(&'a str),
    /// Cell-aligned text.
    Cells(&'a NdArray<String>),
}

/// Concatenates the fragments cell by cell, left to right. All `Cells`
/// fragments must share one shape; with only literals the result is a scalar.
pub fn join(fragments: &[Fragment<'_>]) -> Result<NdArray<String>> {
    let shape = fragments
        .iter()
        .find_map(|f| match f {
            Fragment::Cells(c) => Some(c.shape().to_vec()),
            Fragment::Lit(_) => None,
        })
        .unwrap_or_default();
    for f in fragments {
        if let Fragment::Cells(c) = f {
            c.ensure_shape("line fragment", &shape)?;
        }
    }

    let len = shape.iter().product::<usize>();
    let data = (0..len)
        .into_par_iter()
        .map(|i| {
            let mut line = String::new();
            for f in fragments {
                match f {
                    Fragment::Lit(s) => line.push_str(s),
                    Fragment::Cells(c) => line.push_str(&c.as_slice()[i]),
                }
            }
            line
        })
        .collect();
    NdArray::new(shape, data)
}

/// Blanks every line whose mask cell is false.
pub fn apply_mask(lines: NdArray<String>, mask: &NdArray<bool>) -> Result<NdArray<String>> {
    mask.ensure_shape("line mask", lines.shape())?;
    let (shape, data) = lines.into_parts();
    let data = data
        .into_iter()
        .zip(mask.as_slice())
        .map(|(line, &keep)| if keep { line } else { String::new() })
        .collect();
    NdArray::new(shape, data)
}

/// Concatenates lines along `axis`, keeping their order on that axis.
pub fn reduce_over_axis(lines: &NdArray<String>, axis: usize) -> Result<NdArray<String>> {
    lines.reduce_axis(axis, String::new, |acc, s| acc.push_str(s))
}

/// True where at least one cell along `axis` is true.
pub fn any_over_axis(mask: &NdArray<bool>, axis: usize) -> Result<NdArray<bool>> {
    mask.reduce_axis(axis, || false, |acc, &b| *acc |= b)
}

/// Elementwise logical and of two masks.
pub fn and(a: &NdArray<bool>, b: &NdArray<bool>) -> Result<NdArray<bool>> {
    a.zip_map(b, |x, y| *x && *y)
}

/// Writes the lines in row-major order. Blank cells add nothing.
pub fn write_lines<W: Write>(out: &mut W, lines: &NdArray<String>) -> std::io::Result<usize> {
    let mut written = 0;
    for line in lines.as_slice() {
        out.write_all(line.as_bytes())?;
        written += line.len();
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(v: &[&str]) -> NdArray<String> {
        NdArray::from_vec(v.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_join_order() {
        let a = cells(&["+1.000000", "-2.000000"]);
        let b = cells(&["0", "3"]);
        let lines = join(&[Fragment::Cells(&a), Fragment::Lit(" x"), Fragment::Cells(&b), Fragment::Lit("\n")]).unwrap();
        assert_eq!(lines.as_slice(), &["+1.000000 x0\n", "-2.000000 x3\n"]);
    }

    #[test]
    fn test_join_rejects_misaligned() {
        let a = cells(&["a", "b"]);
        let b = cells(&["c"]);
        assert!(join(&[Fragment::Cells(&a), Fragment::Cells(&b)]).is_err());
    }

    #[test]
    fn test_join_literals_only() {
        let lines = join(&[Fragment::Lit("a"), Fragment::Lit("b")]).unwrap();
        assert_eq!(lines.shape(), &[] as &[usize]);
        assert_eq!(lines.as_slice(), &["ab"]);
    }

    #[test]
    fn test_mask_keeps_shape() {
        let lines = cells(&["a", "b", "c"]);
        let mask = NdArray::from_vec(vec![true, false, true]);
        let out = apply_mask(lines, &mask).unwrap();
        assert_eq!(out.shape(), &[3]);
        assert_eq!(out.as_slice(), &["a", "", "c"]);
    }

    #[test]
    fn test_reduce_keeps_term_order() {
        let lines = NdArray::new(
            vec![2, 3],
            ["a", "", "c", "d", "e", ""].iter().map(|s| s.to_string()).collect(),
        )
        .unwrap();
        let out = reduce_over_axis(&lines, 1).unwrap();
        assert_eq!(out.as_slice(), &["ac", "de"]);
    }

    #[test]
    fn test_any_over_axis() {
        let mask = NdArray::new(vec![2, 2], vec![false, false, false, true]).unwrap();
        assert_eq!(any_over_axis(&mask, 1).unwrap().as_slice(), &[false, true]);
    }

    #[test]
    fn test_write_lines_skips_blanks() {
        let lines = cells(&["a\n", "", "b\n"]);
        let mut buf = Vec::new();
        assert_eq!(write_lines(&mut buf, &lines).unwrap(), 4);
        assert_eq!(buf, b"a\nb\n");
    }
}
