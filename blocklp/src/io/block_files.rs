//! Block-structured binary output.
//!
//! Layout under the destination directory:
//!
//! ```text
//! block<n>/x  xl  xu  c          variables of block n (labels, bounds, objective)
//! block<n>/b  dl  du             right-hand sides of block n
//! block<n>/{B,D,A,C,BL,DL}_{row,data,col}
//! ```
//!
//! Every file is a bare native-endian dump: `i64` for labels and variable
//! references, `f64` for everything else. No headers, no length prefixes.

use crate::error::{Error, Result};
use crate::io::blocks::{Bucket, Partition};
use crate::io::config::WriterConfig;
use crate::model::{Model, Sign};
use bytemuck::Pod;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Writes the block files of `model` and returns the root directory.
///
/// The partition is computed before the destination is touched, so a model
/// without block assignments leaves an existing directory alone. After that
/// the directory is wiped and rebuilt; a failure part way leaves it
/// incomplete.
pub fn write_blocks(model: &Model, destination: Option<&Path>, config: &WriterConfig) -> Result<PathBuf> {
    let root = WriterConfig::resolve(destination, || config.fresh_blocks_dir())?;
    let partition = Partition::new(model)?;

    let start = Instant::now();
    reset_dir(&root, partition.block_count())?;

    write_variables(&root, &partition)?;
    write_objective(&root, &partition)?;
    write_rhs(&root, &partition)?;
    write_terms(&root, &partition)?;

    info!(
        path = %root.display(),
        blocks = partition.block_count(),
        "writing time: {:.2}s",
        start.elapsed().as_secs_f64()
    );
    Ok(root)
}

pub fn block_dir(root: &Path, n: i64) -> PathBuf {
    root.join(format!("block{}", n))
}

fn reset_dir(root: &Path, blocks: usize) -> Result<()> {
    if root.exists() {
        fs::remove_dir_all(root).map_err(|e| Error::fs(root, e))?;
    }
    fs::create_dir_all(root).map_err(|e| Error::fs(root, e))?;
    for n in 0..blocks {
        let dir = block_dir(root, n as i64);
        fs::create_dir(&dir).map_err(|e| Error::fs(&dir, e))?;
    }
    Ok(())
}

fn dump<T: Pod>(path: &Path, values: &[T]) -> Result<()> {
    fs::write(path, bytemuck::cast_slice::<T, u8>(values)).map_err(|e| Error::fs(path, e))
}

fn select<T: Copy>(values: &[T], keep: impl Fn(usize) -> bool) -> Vec<T> {
    values
        .iter()
        .enumerate()
        .filter(|(i, _)| keep(*i))
        .map(|(_, v)| *v)
        .collect()
}

/// Runs `f` once per block on the rayon pool.
fn each_block(partition: &Partition, f: impl Fn(i64) -> Result<()> + Sync + Send) -> Result<()> {
    (0..=partition.last_block()).into_par_iter().try_for_each(f)
}

fn write_variables(root: &Path, partition: &Partition) -> Result<()> {
    let vars = partition.variables();
    each_block(partition, |n| {
        let dir = block_dir(root, n);
        let in_block = |i: usize| vars.blocks[i] == n;
        let labels = select(&vars.labels, in_block);
        dump(&dir.join("x"), &labels)?;
        dump(&dir.join("xl"), &select(&vars.lower, in_block))?;
        dump(&dir.join("xu"), &select(&vars.upper, in_block))?;
        debug!(section = "variables", block = n, rows = labels.len(), "block written");
        Ok(())
    })
}

fn write_objective(root: &Path, partition: &Partition) -> Result<()> {
    let vars = partition.variables();
    let coeffs = partition.objective();
    each_block(partition, |n| {
        let c = select(coeffs, |i| vars.blocks[i] == n);
        dump(&block_dir(root, n).join("c"), &c)?;
        debug!(section = "objective", block = n, rows = c.len(), "block written");
        Ok(())
    })
}

fn write_rhs(root: &Path, partition: &Partition) -> Result<()> {
    let cons = partition.constraints();
    each_block(partition, |n| {
        let dir = block_dir(root, n);
        let in_block = |i: usize| cons.blocks[i] == n;
        let is_eq = |i: usize| cons.sign[i] == Some(Sign::Eq);

        dump(&dir.join("b"), &select(&cons.rhs, |i| in_block(i) && is_eq(i)))?;

        let mut lower = Vec::new();
        let mut upper = Vec::new();
        for i in (0..cons.labels.len()).filter(|&i| in_block(i) && !is_eq(i)) {
            let rhs = cons.rhs[i];
            match cons.sign[i] {
                Some(Sign::Ge) => {
                    lower.push(rhs);
                    upper.push(f64::INFINITY);
                }
                Some(Sign::Le) => {
                    lower.push(f64::NEG_INFINITY);
                    upper.push(rhs);
                }
                _ => {
                    lower.push(f64::NEG_INFINITY);
                    upper.push(f64::INFINITY);
                }
            }
        }
        dump(&dir.join("dl"), &lower)?;
        dump(&dir.join("du"), &upper)?;
        debug!(section = "rhs", block = n, inequalities = lower.len(), "block written");
        Ok(())
    })
}

fn write_terms(root: &Path, partition: &Partition) -> Result<()> {
    let terms = partition.terms();
    let last = partition.last_block();
    each_block(partition, |n| {
        let dir = block_dir(root, n);
        for bucket in Bucket::ALL {
            for equality in [true, false] {
                let keep = |i: usize| {
                    terms.equality[i] == equality
                        && bucket.contains(terms.con_blocks[i], terms.var_blocks[i], n, last)
                };
                let prefix = bucket.file_prefix(equality);
                let rows = select(&terms.labels, keep);
                dump(&dir.join(format!("{}_row", prefix)), &rows)?;
                dump(&dir.join(format!("{}_data", prefix)), &select(&terms.coeffs, keep))?;
                dump(&dir.join(format!("{}_col", prefix)), &select(&terms.vars, keep))?;
                debug!(section = "terms", block = n, file = prefix, rows = rows.len(), "block written");
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::NdArray;
    use crate::model::{Constraint, Objective, Variable};
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn read_i64(path: &Path) -> Vec<i64> {
        let bytes = fs::read(path).unwrap();
        bytes
            .chunks_exact(8)
            .map(|c| i64::from_ne_bytes(c.try_into().unwrap()))
            .collect()
    }

    fn read_f64(path: &Path) -> Vec<f64> {
        let bytes = fs::read(path).unwrap();
        bytes
            .chunks_exact(8)
            .map(|c| f64::from_ne_bytes(c.try_into().unwrap()))
            .collect()
    }

    /// Two-stage model: x0 first stage, x1 in block 1, x2 in block 2.
    ///   c0: x0 + x1 >= 1   (block 1)
    ///   c1: x2 == 2        (block 2)
    ///   c2: 2 x1 + 3 x2 <= 3   (linking, block 2)
    fn two_stage() -> Model {
        let mut m = Model::new("two-stage");
        let x = Variable::new(
            NdArray::from_vec(vec![0, 1, 2]),
            NdArray::from_vec(vec![Some(0.0), Some(0.0), None]),
            NdArray::from_vec(vec![Some(10.0), Some(5.0), Some(4.0)]),
        )
        .unwrap()
        .with_blocks(NdArray::from_vec(vec![0, 1, 2]))
        .unwrap();
        m.add_variables("x", x);

        let c = Constraint::new(
            NdArray::from_vec(vec![0, 1, 2]),
            NdArray::new(vec![3, 2], vec![Some(1.0), Some(1.0), Some(1.0), None, Some(2.0), Some(3.0)]).unwrap(),
            NdArray::new(vec![3, 2], vec![0, 1, 2, -1, 1, 2]).unwrap(),
            NdArray::from_vec(vec![Some(Sign::Ge), Some(Sign::Eq), Some(Sign::Le)]),
            NdArray::from_vec(vec![Some(1.0), Some(2.0), Some(3.0)]),
        )
        .unwrap();
        m.add_constraints("c", c);
        m.set_objective(
            Objective::new(
                NdArray::from_vec(vec![Some(1.0), Some(-2.0)]),
                NdArray::from_vec(vec![0, 2]),
            )
            .unwrap(),
        );
        m
    }

    fn snapshot_dir(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
        let mut files = BTreeMap::new();
        for block in fs::read_dir(root).unwrap() {
            let block = block.unwrap().path();
            for f in fs::read_dir(&block).unwrap() {
                let f = f.unwrap().path();
                files.insert(f.strip_prefix(root).unwrap().to_path_buf(), fs::read(&f).unwrap());
            }
        }
        files
    }

    #[test]
    fn test_layout_and_variable_files() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("blocks");
        write_blocks(&two_stage(), Some(&root), &WriterConfig::default()).unwrap();

        for n in 0..3 {
            assert!(block_dir(&root, n).is_dir());
        }
        assert!(!block_dir(&root, 3).exists());

        assert_eq!(read_i64(&root.join("block0/x")), vec![0]);
        assert_eq!(read_i64(&root.join("block2/x")), vec![2]);
        assert_eq!(read_f64(&root.join("block1/xu")), vec![5.0]);
        assert!(read_f64(&root.join("block2/xl"))[0].is_nan());
        assert_eq!(read_f64(&root.join("block0/c")), vec![1.0]);
        assert_eq!(read_f64(&root.join("block1/c")), vec![0.0]);
        assert_eq!(read_f64(&root.join("block2/c")), vec![-2.0]);
    }

    #[test]
    fn test_rhs_files() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("blocks");
        write_blocks(&two_stage(), Some(&root), &WriterConfig::default()).unwrap();

        // block 1: c0 (>=)
        assert!(read_f64(&root.join("block1/b")).is_empty());
        assert_eq!(read_f64(&root.join("block1/dl")), vec![1.0]);
        assert_eq!(read_f64(&root.join("block1/du")), vec![f64::INFINITY]);
        // block 2: c1 (==) and c2 (<=)
        assert_eq!(read_f64(&root.join("block2/b")), vec![2.0]);
        assert_eq!(read_f64(&root.join("block2/dl")), vec![f64::NEG_INFINITY]);
        assert_eq!(read_f64(&root.join("block2/du")), vec![3.0]);
    }

    #[test]
    fn test_term_routing() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("blocks");
        write_blocks(&two_stage(), Some(&root), &WriterConfig::default()).unwrap();

        // c0 in block 1: x1 diagonal, x0 first-stage coupling
        assert_eq!(read_i64(&root.join("block1/D_col")), vec![1]);
        assert_eq!(read_i64(&root.join("block1/C_col")), vec![0]);
        assert_eq!(read_i64(&root.join("block1/C_row")), vec![0]);
        // c1 in block 2 (equality, x2): diagonal and, since block 2 is the
        // linking block, last-stage coupling as well
        assert_eq!(read_i64(&root.join("block2/B_col")), vec![2]);
        assert_eq!(read_i64(&root.join("block2/BL_col")), vec![2]);
        // c2 linking: x1 -> block1 DL, x2 -> block2 D and DL
        assert_eq!(read_i64(&root.join("block1/DL_col")), vec![1]);
        assert_eq!(read_f64(&root.join("block1/DL_data")), vec![2.0]);
        assert_eq!(read_i64(&root.join("block2/D_col")), vec![2]);
        assert_eq!(read_i64(&root.join("block2/DL_row")), vec![2]);
        assert!(read_i64(&root.join("block0/A_row")).is_empty());
    }

    #[test]
    fn test_rewrite_is_byte_identical() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("blocks");
        let m = two_stage();
        write_blocks(&m, Some(&root), &WriterConfig::default()).unwrap();
        let first = snapshot_dir(&root);

        fs::write(root.join("block0/stale"), b"left over").unwrap();
        write_blocks(&m, Some(&root), &WriterConfig::default()).unwrap();
        assert_eq!(first, snapshot_dir(&root));
    }

    #[test]
    fn test_missing_blocks_leaves_destination_alone() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("blocks");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("keep"), b"x").unwrap();

        let mut m = Model::new("m");
        m.add_variables("x", Variable::binary(NdArray::from_vec(vec![0])));
        assert!(write_blocks(&m, Some(&root), &WriterConfig::default()).is_err());
        assert!(root.join("keep").exists());
    }

    #[test]
    fn test_fresh_directory_in_solver_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = WriterConfig::new().with_solver_dir(tmp.path());
        let root = write_blocks(&two_stage(), None, &cfg).unwrap();
        assert!(root.starts_with(tmp.path()));
        assert!(block_dir(&root, 0).join("x").exists());
    }

    #[test]
    fn test_sentinel_only_model_writes_empty_files() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("blocks");

        let mut m = Model::new("m");
        let x = Variable::new(
            NdArray::from_vec(vec![-1, -1]),
            NdArray::from_vec(vec![Some(0.0); 2]),
            NdArray::from_vec(vec![Some(1.0); 2]),
        )
        .unwrap()
        .with_blocks(NdArray::from_vec(vec![3, 1]))
        .unwrap();
        m.add_variables("x", x);
        let c = Constraint::new(
            NdArray::new(vec![], vec![-1]).unwrap(),
            NdArray::from_vec(vec![Some(1.0)]),
            NdArray::from_vec(vec![0]),
            NdArray::new(vec![], vec![Some(Sign::Eq)]).unwrap(),
            NdArray::new(vec![], vec![Some(1.0)]).unwrap(),
        )
        .unwrap();
        m.add_constraints("c", c);
        m.set_objective(Objective::new(NdArray::from_vec(vec![None]), NdArray::from_vec(vec![-1])).unwrap());

        write_blocks(&m, Some(&root), &WriterConfig::default()).unwrap();

        assert!(block_dir(&root, 0).is_dir());
        assert!(!block_dir(&root, 1).exists());
        let files = snapshot_dir(&root);
        // x xl xu c b dl du, plus row/data/col for six prefixes
        assert_eq!(files.len(), 7 + 6 * 3);
        for (path, bytes) in &files {
            assert!(bytes.is_empty(), "{} is not empty", path.display());
        }
    }

    /// Model with variables `0..blocks.len()` in the given blocks and one
    /// constraint per row; a row lists variable indices and whether it is an
    /// equality.
    fn routed_model(blocks: Vec<i64>, rows: &[(Vec<usize>, bool)]) -> Model {
        let n_vars = blocks.len();
        let mut m = Model::new("routing");
        let x = Variable::new(
            NdArray::from_vec((0..n_vars as i64).collect()),
            NdArray::from_vec(vec![Some(0.0); n_vars]),
            NdArray::from_vec(vec![Some(1.0); n_vars]),
        )
        .unwrap()
        .with_blocks(NdArray::from_vec(blocks))
        .unwrap();
        m.add_variables("x", x);

        let width = rows.iter().map(|(r, _)| r.len()).max().unwrap_or(1);
        let mut coeffs = Vec::new();
        let mut vars = Vec::new();
        for (row, _) in rows {
            for t in 0..width {
                match row.get(t) {
                    Some(&v) => {
                        coeffs.push(Some(1.0 + t as f64));
                        vars.push((v % n_vars) as i64);
                    }
                    None => {
                        coeffs.push(None);
                        vars.push(-1);
                    }
                }
            }
        }
        let n = rows.len();
        let signs = rows
            .iter()
            .map(|(_, eq)| Some(if *eq { Sign::Eq } else { Sign::Le }))
            .collect();
        let c = Constraint::new(
            NdArray::from_vec((0..n as i64).collect()),
            NdArray::new(vec![n, width], coeffs).unwrap(),
            NdArray::new(vec![n, width], vars).unwrap(),
            NdArray::from_vec(signs),
            NdArray::from_vec(vec![Some(1.0); n]),
        )
        .unwrap();
        m.add_constraints("c", c);
        m
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_term_files_match_bucket_landings(
            blocks in prop::collection::vec(0i64..4, 1..10),
            rows in prop::collection::vec(
                (prop::collection::vec(0usize..64, 1..4), any::<bool>()),
                1..8,
            ),
        ) {
            let m = routed_model(blocks, &rows);
            let partition = Partition::new(&m).unwrap();
            let last = partition.last_block();
            let terms = partition.terms();

            let mut expected: BTreeMap<&str, usize> = BTreeMap::new();
            for i in 0..terms.len() {
                for n in 0..=last {
                    for bucket in Bucket::ALL {
                        if bucket.contains(terms.con_blocks[i], terms.var_blocks[i], n, last) {
                            *expected.entry(bucket.file_prefix(terms.equality[i])).or_default() += 1;
                        }
                    }
                }
            }

            let tmp = tempfile::tempdir().unwrap();
            let root = tmp.path().join("blocks");
            write_blocks(&m, Some(&root), &WriterConfig::default()).unwrap();

            let mut written: BTreeMap<&str, usize> = BTreeMap::new();
            for n in 0..=last {
                let dir = block_dir(&root, n);
                for bucket in Bucket::ALL {
                    for equality in [true, false] {
                        let prefix = bucket.file_prefix(equality);
                        let n_rows = read_i64(&dir.join(format!("{}_row", prefix))).len();
                        let n_cols = read_i64(&dir.join(format!("{}_col", prefix))).len();
                        let n_data = read_f64(&dir.join(format!("{}_data", prefix))).len();
                        prop_assert_eq!(n_rows, n_cols);
                        prop_assert_eq!(n_rows, n_data);
                        if n_rows > 0 {
                            *written.entry(prefix).or_default() += n_rows;
                        }
                    }
                }
            }
            prop_assert_eq!(written, expected);
        }
    }
}
