//! Two-stage capacity model written in all three formats.
//!
//! `cargo run --example two_stage [out_dir]`, `RUST_LOG=debug` for per-block
//! progress.

use std::path::PathBuf;

use blocklp::{Constraint, Model, NdArray, Objective, Sign, Variable, WriterConfig};
use tracing_subscriber::EnvFilter;

fn build() -> blocklp::Result<Model> {
    let mut m = Model::new("two_stage");

    // first stage: capacity z (label 0), block 0
    let z = Variable::new(
        NdArray::from_vec(vec![0]),
        NdArray::from_vec(vec![Some(0.0)]),
        NdArray::from_vec(vec![Some(100.0)]),
    )?
    .with_blocks(NdArray::from_vec(vec![0]))?;
    m.add_variables("capacity", z);

    // second stage: production per scenario (labels 1, 2), blocks 1 and 2
    let x = Variable::new(
        NdArray::from_vec(vec![1, 2]),
        NdArray::from_vec(vec![Some(0.0), Some(0.0)]),
        NdArray::from_vec(vec![None, None]),
    )?
    .with_blocks(NdArray::from_vec(vec![1, 2]))?;
    m.add_variables("production", x);

    // scenario switch, one per scenario, binary
    let on = Variable::binary(NdArray::from_vec(vec![3, 4]))
        .with_blocks(NdArray::from_vec(vec![1, 2]))?;
    m.add_variables("open", on);

    // x_s - z <= 0
    let cap = Constraint::new(
        NdArray::from_vec(vec![0, 1]),
        NdArray::new(vec![2, 2], vec![Some(1.0), Some(-1.0), Some(1.0), Some(-1.0)])?,
        NdArray::new(vec![2, 2], vec![1, 0, 2, 0])?,
        NdArray::from_vec(vec![Some(Sign::Le); 2]),
        NdArray::from_vec(vec![Some(0.0); 2]),
    )?;
    m.add_constraints("capacity_limit", cap);

    // x_s - 50 open_s == demand_s
    let demand = Constraint::new(
        NdArray::from_vec(vec![2, 3]),
        NdArray::new(vec![2, 2], vec![Some(1.0), Some(-50.0), Some(1.0), Some(-50.0)])?,
        NdArray::new(vec![2, 2], vec![1, 3, 2, 4])?,
        NdArray::from_vec(vec![Some(Sign::Eq); 2]),
        NdArray::from_vec(vec![Some(20.0), Some(35.0)]),
    )?;
    m.add_constraints("demand", demand);

    // x_1 + x_2 >= 40, couples the scenarios
    let total = Constraint::new(
        NdArray::new(vec![], vec![4])?,
        NdArray::from_vec(vec![Some(1.0), Some(1.0)]),
        NdArray::from_vec(vec![1, 2]),
        NdArray::new(vec![], vec![Some(Sign::Ge)])?,
        NdArray::new(vec![], vec![Some(40.0)])?,
    )?;
    m.add_constraints("total", total);

    m.set_objective(Objective::new(
        NdArray::from_vec(vec![Some(5.0), Some(1.0), Some(1.0), Some(10.0), Some(10.0)]),
        NdArray::from_vec(vec![0, 1, 2, 3, 4]),
    )?);
    Ok(m)
}

fn main() -> blocklp::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let out = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir);
    std::fs::create_dir_all(&out)?;
    let config = WriterConfig::new().with_solver_dir(&out);

    let model = build()?;
    let lp = model.to_file(None, &config)?;
    println!("{}", std::fs::read_to_string(&lp)?);

    let blocks = model.to_block_files(Some(&out.join("two_stage_blocks")), &config)?;
    eprintln!("wrote {} and {}", lp.display(), blocks.display());

    let snapshot = out.join("two_stage.json");
    model.to_snapshot(&snapshot)?;
    let restored = Model::from_snapshot(&snapshot)?;
    assert_eq!(restored, model);
    eprintln!("snapshot {} round-trips", snapshot.display());
    Ok(())
}
