use std::sync::Arc;

use anyhow::{anyhow, Result};
use convtile::{
    HardwareLimits, IterationDriver, LayoutMode, LoadStrategy, MemoryLevel, Operand, PadValue,
    TransferKind,
};

use crate::common;

#[test]
fn direct_activation_copies_channel_planes() -> Result<()> {
    let plan = common::builder(common::conv(1, 20, 6, 6, 32, 1))
        .m_tiles(36, 36)
        .n_tiles(24, 16)
        .k_tiles(20, 16)
        .build(&common::limits());
    let tasks = common::first_fill(&plan, Operand::Activation)?;
    assert_eq!(tasks.len(), 2);

    let copy = &tasks[0];
    assert_eq!((copy.src, copy.dst), (MemoryLevel::Global, MemoryLevel::Staging));
    assert_eq!(copy.pattern.burst_len, 6);
    assert_eq!(copy.pattern.burst_count, 6);
    assert_eq!(copy.pattern.block_count, 20);
    assert_eq!(copy.pattern.src_block_stride, 36);

    let spare = &tasks[1];
    assert_eq!(spare.kind, TransferKind::Fill);
    assert_eq!(spare.dst_offset, 20 * 36);
    assert_eq!(spare.pattern.elements(), 12 * 36);
    Ok(())
}

#[test]
fn direct_weight_pads_to_block_with_zero() -> Result<()> {
    let plan = common::builder(common::conv(1, 20, 6, 6, 32, 1))
        .m_tiles(36, 36)
        .n_tiles(24, 16)
        .k_tiles(20, 16)
        .pad_value(PadValue::Neutral(3))
        .build(&common::limits());
    let tasks = common::first_fill(&plan, Operand::Weight)?;
    assert_eq!(tasks.len(), 1);
    let weight = &tasks[0];
    assert_eq!(weight.pattern.burst_len, 24);
    assert_eq!(weight.pattern.burst_count, 20);
    assert_eq!(weight.pattern.src_stride, 32);
    assert_eq!(weight.pattern.dst_stride, 32);
    assert_eq!(weight.pad.right, 8);
    assert_eq!(weight.pad_value, PadValue::Zero);
    Ok(())
}

#[test]
fn near_load_expands_window_with_pad_account() -> Result<()> {
    let plan = common::builder(common::conv(1, 16, 5, 6, 16, 1))
        .m_tiles(32, 32)
        .build(&common::limits());
    let state = common::first_state(&plan)?;
    let strategy = common::strategy(&plan);
    let staging = common::slot(Operand::Activation);
    let near = strategy.load_near(Operand::Activation, &state, &staging, 0);
    assert_eq!(near.len(), 1);
    assert_eq!(
        near[0].kind,
        TransferKind::Img2Col {
            m_origin: 0,
            k_origin: 0
        }
    );
    assert_eq!(near[0].dst, MemoryLevel::NearCompute);
    assert_eq!(near[0].pad.bottom, 2);
    assert_eq!(near[0].pattern.burst_count, 30);

    let weight = strategy.load_near(Operand::Weight, &state, &common::slot(Operand::Weight), 1);
    let map = strategy.context().map;
    assert_eq!(weight[0].dst_offset, map.near_base(Operand::Weight, 1));
    assert_eq!(weight[0].pad.right, 0);

    let writeback = strategy.writeback(&state);
    assert_eq!(writeback.operand, Operand::Output);
    assert_eq!((writeback.src, writeback.dst), (MemoryLevel::Accumulator, MemoryLevel::Global));
    assert_eq!(writeback.pattern.burst_count, 30);
    Ok(())
}

#[test]
fn near_load_origin_is_relative_to_staged_window() -> Result<()> {
    // out_w = 6, taps = 9: level-1 tiles start mid-row and mid-channel.
    let plan = common::builder(common::conv(1, 4, 8, 8, 16, 3))
        .m_tiles(16, 16)
        .k_tiles(16, 16)
        .build(&common::limits());
    let strategy = common::strategy(&plan);
    let staging = common::slot(Operand::Activation);
    let mut shifted = 0;
    for step in common::walk(&plan)? {
        let state = &step.state;
        let near = strategy.load_near(Operand::Activation, state, &staging, 0);
        let m_origin = state.m0.start - state.m1.start / 6 * 6;
        let k_origin = state.k0.start - state.k1.start / 9 * 9;
        assert_eq!(
            near[0].kind,
            TransferKind::Img2Col { m_origin, k_origin },
            "step {}",
            state.step
        );
        if state.m1.start == 16 && state.k1.start == 16 {
            assert_eq!(
                near[0].kind,
                TransferKind::Img2Col {
                    m_origin: 4,
                    k_origin: 7
                }
            );
        }
        if (m_origin, k_origin) != (0, 0) {
            shifted += 1;
        }
    }
    assert!(shifted >= 6);
    Ok(())
}

#[test]
fn small_channel_near_load_uses_absolute_reduction_index() -> Result<()> {
    let plan = small_channel_plan();
    let strategy = common::strategy(&plan);
    let staging = common::slot(Operand::Activation);
    let mut later_slices = 0;
    for step in common::walk(&plan)? {
        let state = &step.state;
        let near = strategy.load_near(Operand::Activation, state, &staging, 0);
        let TransferKind::Img2Col { m_origin, k_origin } = near[0].kind else {
            unreachable!("raw-window layouts expand with img2col");
        };
        assert_eq!(m_origin, state.m0.start - state.m1.start / 6 * 6);
        assert_eq!(k_origin, state.k0.start);
        if state.k1.index > 0 {
            later_slices += 1;
        }
    }
    assert!(later_slices > 0);
    Ok(())
}

fn small_channel_plan() -> convtile::TilingPlan {
    common::builder(common::conv(1, 3, 8, 8, 32, 3))
        .layout(LayoutMode::SmallChannelPack)
        .k_tiles(16, 16)
        .build(&common::limits())
}

#[test]
fn small_channel_zeroes_spare_channels_once() -> Result<()> {
    let plan = small_channel_plan();
    let state = common::first_state(&plan)?;
    let LoadStrategy::SmallChannelPack(strategy) = common::strategy(&plan) else {
        unreachable!("small-channel plan builds a small-channel strategy");
    };
    let slot = common::slot(Operand::Weight);

    let first = strategy.weight(&state, &slot, 0);
    let kinds: Vec<TransferKind> = first.iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![TransferKind::Fill, TransferKind::Copy, TransferKind::Gather, TransferKind::Copy]
    );
    assert_eq!(first[0].dst, MemoryLevel::VectorScratch);
    assert_eq!(first[0].dst_offset, 3 * 16 * 9);
    assert_eq!(first[0].pattern.elements(), 16 * 9);

    let later = strategy.weight(&state, &slot, 1);
    assert!(later.iter().all(|t| t.kind != TransferKind::Fill));
    assert_eq!(later.len(), 3);
    Ok(())
}

#[test]
fn small_channel_index_table_is_built_once() -> Result<()> {
    let plan = small_channel_plan();
    let limits = common::limits();
    let LoadStrategy::SmallChannelPack(strategy) = common::strategy(&plan) else {
        unreachable!("small-channel plan builds a small-channel strategy");
    };
    let table = strategy.index_table();
    assert_eq!(table.len(), 16);
    assert_eq!(strategy.taps_per_group(), 4);
    assert_eq!(table[1], 16 * 9);
    assert_eq!(table[4], 1);

    let slot = common::slot(Operand::Weight);
    let mut gathers = 0;
    for (fill, step) in IterationDriver::init(&plan, &limits)?
        .filter(|s| s.refill.weight)
        .enumerate()
    {
        for task in strategy.weight(&step.state, &slot, fill as u64) {
            if let Some(index) = &task.index {
                assert!(Arc::ptr_eq(&index.table, &table));
                gathers += 1;
            }
        }
    }
    assert!(gathers >= 3);
    Ok(())
}

#[test]
fn small_channel_tail_group_uses_partial_lanes() -> Result<()> {
    let plan = small_channel_plan();
    let step = common::walk(&plan)?
        .into_iter()
        .find(|s| s.state.k1.index == 2)
        .ok_or_else(|| anyhow!("no third reduction slice"))?;
    assert_eq!(step.state.k1.extent, 4);
    let slot = common::slot(Operand::Weight);
    let tasks = common::strategy(&plan).load(Operand::Weight, &step.state, &slot, 2);
    let gathers: Vec<_> = tasks.iter().filter_map(|t| t.index.as_ref()).collect();
    assert_eq!(gathers.len(), 1);
    assert_eq!(gathers[0].lanes, 4);
    Ok(())
}

#[test]
fn transpose_splits_output_channels_into_chunks() -> Result<()> {
    let limits = HardwareLimits {
        vector_scratch_bytes: 8192,
        ..common::limits()
    };
    let plan = common::builder(common::conv(1, 16, 4, 4, 48, 3))
        .layout(LayoutMode::WeightOnChipTranspose)
        .n_tiles(40, 16)
        .k_tiles(64, 16)
        .build(&limits);
    let state = IterationDriver::init(&plan, &limits)?
        .next()
        .ok_or_else(|| anyhow!("plan yields no steps"))?
        .state;
    let strategy = LoadStrategy::for_plan(Arc::new(plan), limits);
    assert_eq!(strategy.context().map.vec_block_n, 32);

    let tasks = strategy.load(Operand::Weight, &state, &common::slot(Operand::Weight), 0);
    let kinds: Vec<TransferKind> = tasks.iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TransferKind::Copy,
            TransferKind::Gather,
            TransferKind::Copy,
            TransferKind::Copy,
            TransferKind::Gather,
            TransferKind::Copy,
        ]
    );
    let lanes: Vec<u32> = tasks.iter().filter_map(|t| t.index.as_ref()).map(|i| i.lanes).collect();
    assert_eq!(lanes, vec![32, 8]);
    let LoadStrategy::WeightOnChipTranspose(transpose) = &strategy else {
        unreachable!("transpose plan builds a transpose strategy");
    };
    let table = transpose.index_table();
    assert_eq!(table[1], 64);
    assert_eq!(tasks[2].pad.right, 0);
    assert_eq!(tasks[5].pad.right, 8);
    assert_eq!(tasks[5].dst_offset, 32);
    Ok(())
}
