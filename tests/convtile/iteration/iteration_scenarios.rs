use anyhow::Result;
use convtile::{IterationOrder, Level, Operand};

use crate::common;

#[test]
fn reduction_100_splits_into_40_40_20_then_16s() -> Result<()> {
    let plan = common::builder(common::conv(1, 100, 4, 4, 16, 1))
        .m_tiles(16, 16)
        .n_tiles(16, 16)
        .k_tiles(40, 16)
        .order(IterationOrder::RowFirst)
        .build(&common::limits());
    assert_eq!(plan.loop_counts.k, 3);

    let steps = common::walk(&plan)?;
    let k0: Vec<u32> = steps.iter().map(|s| s.state.k0.extent).collect();
    let k1: Vec<u32> = steps.iter().map(|s| s.state.k1.extent).collect();
    let tails: Vec<bool> = steps.iter().map(|s| s.state.k0.tail).collect();
    assert_eq!(k0, vec![16, 16, 8, 16, 16, 8, 16, 4]);
    assert_eq!(k1, vec![40, 40, 40, 40, 40, 40, 20, 20]);
    assert_eq!(tails, vec![false, false, true, false, false, true, false, true]);
    assert!(steps[7].state.k1.tail);

    let starts: Vec<u32> = steps.iter().map(|s| s.state.k0.start).collect();
    assert_eq!(starts, vec![0, 16, 32, 40, 56, 72, 80, 96]);
    assert!(steps[0].first_k && !steps[0].last_k);
    assert!(steps[7].last_k && !steps[7].first_k);
    Ok(())
}

#[test]
fn refill_follows_level_one_moves() -> Result<()> {
    let plan = common::builder(common::conv(1, 100, 4, 4, 16, 1))
        .k_tiles(40, 16)
        .build(&common::limits());
    let refills: Vec<(bool, bool)> = common::walk(&plan)?
        .iter()
        .map(|s| (s.refill.get(Operand::Activation), s.refill.get(Operand::Weight)))
        .collect();
    assert_eq!(
        refills,
        vec![
            (true, true),
            (false, false),
            (false, false),
            (true, true),
            (false, false),
            (false, false),
            (true, true),
            (false, false),
        ]
    );
    Ok(())
}

#[test]
fn rows_30_with_tile_32_is_a_single_tail_tile() -> Result<()> {
    let plan = common::builder(common::conv(1, 16, 5, 6, 16, 1))
        .m_tiles(32, 32)
        .build(&common::limits());
    assert_eq!(plan.m_total(), 30);
    assert_eq!(plan.loop_counts.m, 1);

    let steps = common::walk(&plan)?;
    assert_eq!(steps.len(), 1);
    let m1 = steps[0].state.m1;
    assert_eq!(m1.max, 0);
    assert_eq!(m1.extent, 30);
    assert!(m1.tail);
    assert_eq!(steps[0].state.m_pad_account, 2);
    assert_eq!(steps[0].state.m_aligned(), 32);
    Ok(())
}

#[test]
fn row_first_keeps_weight_resident() -> Result<()> {
    let shape = common::conv(1, 16, 8, 8, 48, 1);
    let row_first = common::builder(shape)
        .m_tiles(16, 16)
        .n_tiles(16, 16)
        .order(IterationOrder::RowFirst)
        .build(&common::limits());
    let column_first = common::builder(shape)
        .m_tiles(16, 16)
        .n_tiles(16, 16)
        .order(IterationOrder::ColumnFirst)
        .build(&common::limits());

    let count = |steps: &[convtile::TileStep], operand: Operand| {
        steps.iter().filter(|s| s.refill.get(operand)).count()
    };
    let rows = common::walk(&row_first)?;
    let cols = common::walk(&column_first)?;
    assert_eq!(rows.len(), cols.len());
    assert_eq!(count(&rows, Operand::Weight), 3);
    assert_eq!(count(&rows, Operand::Activation), 12);
    assert_eq!(count(&cols, Operand::Activation), 4);
    assert_eq!(count(&cols, Operand::Weight), 12);

    assert_eq!(rows[1].state.m1.index, 1);
    assert_eq!(rows[1].state.n1.index, 0);
    assert_eq!(cols[1].state.n1.index, 1);
    assert_eq!(cols[1].state.m1.index, 0);
    Ok(())
}

#[test]
fn level_zero_nests_inside_level_one() -> Result<()> {
    let plan = common::builder(common::conv(1, 16, 6, 6, 16, 1))
        .m_tiles(32, 16)
        .build(&common::limits());
    let driver = convtile::IterationDriver::init(&plan, &common::limits())?;
    assert_eq!(driver.bounds().active, vec![Level::M1, Level::M0]);
    let extents: Vec<(u32, u32)> = driver
        .map(|s| (s.state.m1.extent, s.state.m0.extent))
        .collect();
    assert_eq!(extents, vec![(32, 16), (32, 16), (4, 4)]);
    Ok(())
}
