use std::sync::Arc;

use crate::config::HardwareLimits;
use crate::iteration::IterationState;
use crate::plan::{LayoutMode, Operand, TilingPlan};
use crate::sync::BufferSlot;

mod buffers;
mod direct;
mod gather;
mod small_channel;
mod task;
mod transpose;
mod window;

pub use buffers::BufferMap;
pub use direct::DirectLoad;
pub use gather::{GatherWithPadding, TapWindow};
pub use small_channel::SmallChannelPack;
pub use task::{EdgePad, GatherIndex, LoadTask, MemoryLevel, StridePattern, TransferKind};
pub use transpose::WeightOnChipTranspose;
pub use window::{
    clip_axis, direct_window, row_segments, tap_span, AxisClip, DirectWindow, GatherPitch,
    RowSegment, TapSpan,
};

/// Read-only inputs every strategy addresses against.
#[derive(Debug, Clone)]
pub struct LoadContext {
    pub plan: Arc<TilingPlan>,
    pub limits: HardwareLimits,
    pub map: BufferMap,
}

impl LoadContext {
    pub fn new(plan: Arc<TilingPlan>, limits: HardwareLimits) -> Self {
        let map = BufferMap::derive(&plan, &limits);
        Self { plan, limits, map }
    }
}

/// Staging-fill strategy of an invocation, fixed by `TilingPlan::layout`.
#[derive(Debug)]
pub enum LoadStrategy {
    Direct(DirectLoad),
    GatherWithPadding(GatherWithPadding),
    SmallChannelPack(SmallChannelPack),
    WeightOnChipTranspose(WeightOnChipTranspose),
}

impl LoadStrategy {
    pub fn for_plan(plan: Arc<TilingPlan>, limits: HardwareLimits) -> Self {
        let ctx = LoadContext::new(plan, limits);
        match ctx.plan.layout {
            LayoutMode::Direct => LoadStrategy::Direct(DirectLoad::new(ctx)),
            LayoutMode::GatherWithPadding => {
                LoadStrategy::GatherWithPadding(GatherWithPadding::new(ctx))
            }
            LayoutMode::SmallChannelPack => {
                LoadStrategy::SmallChannelPack(SmallChannelPack::new(ctx))
            }
            LayoutMode::WeightOnChipTranspose => {
                LoadStrategy::WeightOnChipTranspose(WeightOnChipTranspose::new(ctx))
            }
        }
    }

    pub fn context(&self) -> &LoadContext {
        match self {
            LoadStrategy::Direct(s) => &s.ctx,
            LoadStrategy::GatherWithPadding(s) => &s.direct.ctx,
            LoadStrategy::SmallChannelPack(s) => &s.direct.ctx,
            LoadStrategy::WeightOnChipTranspose(s) => &s.direct.ctx,
        }
    }

    pub fn layout(&self) -> LayoutMode {
        self.context().plan.layout
    }

    /// Tasks that fill `slot` with `operand`'s level-1 tile for `state`.
    /// `fill_index` counts earlier fills of the operand in this invocation.
    pub fn load(
        &self,
        operand: Operand,
        state: &IterationState,
        slot: &BufferSlot,
        fill_index: u64,
    ) -> Vec<LoadTask> {
        match (self, operand) {
            (LoadStrategy::Direct(s), Operand::Activation) => s.activation(state, slot),
            (LoadStrategy::Direct(s), Operand::Weight) => s.weight(state, slot),
            (LoadStrategy::GatherWithPadding(s), Operand::Activation) => s.activation(state, slot),
            (LoadStrategy::GatherWithPadding(s), Operand::Weight) => s.weight(state, slot),
            (LoadStrategy::SmallChannelPack(s), Operand::Activation) => s.activation(state, slot),
            (LoadStrategy::SmallChannelPack(s), Operand::Weight) => {
                s.weight(state, slot, fill_index)
            }
            (LoadStrategy::WeightOnChipTranspose(s), Operand::Activation) => {
                s.activation(state, slot)
            }
            (LoadStrategy::WeightOnChipTranspose(s), Operand::Weight) => s.weight(state, slot),
            (_, Operand::Output) => Vec::new(),
        }
    }

    /// Staging to near-compute loads of the level-0 tile in `state`.
    pub fn load_near(
        &self,
        operand: Operand,
        state: &IterationState,
        staging: &BufferSlot,
        l0_side: u8,
    ) -> Vec<LoadTask> {
        let ctx = self.context();
        match operand {
            Operand::Weight => vec![near_weight(ctx, state, staging, l0_side)],
            Operand::Output => Vec::new(),
            Operand::Activation => match self {
                LoadStrategy::GatherWithPadding(s) => near_expanded(s, state, staging, l0_side),
                _ => vec![near_window(ctx, state, staging, l0_side)],
            },
        }
    }

    /// Accumulator to global-memory copy of a finished output tile.
    pub fn writeback(&self, state: &IterationState) -> LoadTask {
        let plan = &self.context().plan;
        let n_total = plan.n_total() as u64;
        let dst = (state.batch.index as u64 * plan.m_total() as u64 + state.m0.start as u64)
            * n_total
            + state.n0.start as u64;
        LoadTask::copy(
            Operand::Output,
            MemoryLevel::Accumulator,
            MemoryLevel::Global,
            0,
            dst,
            StridePattern::rows(
                state.n0.extent,
                state.m0.extent,
                state.n_aligned() as u64,
                n_total,
            ),
        )
    }
}

/// Img2Col origins of the level-0 tile inside the raw window the level-1
/// fill staged. The window starts at a whole output row and, for channel-major
/// reductions, at the first channel the K slice touches.
fn img2col_origin(ctx: &LoadContext, state: &IterationState) -> (u32, u32) {
    let plan = &ctx.plan;
    let window = direct_window(
        plan,
        &ctx.limits,
        state.m1.start,
        state.m1.extent,
        state.k1.start,
        state.k1.extent,
    );
    let m_origin = state.m0.start - window.out_row * plan.shape.out_w();
    let k_origin = match plan.layout {
        LayoutMode::SmallChannelPack => state.k0.start,
        _ => state.k0.start - window.channel_start * plan.shape.taps(),
    };
    (m_origin, k_origin)
}

fn near_window(
    ctx: &LoadContext,
    state: &IterationState,
    staging: &BufferSlot,
    side: u8,
) -> LoadTask {
    let k_aligned = ctx.limits.align_block(state.k0.extent);
    let (m_origin, k_origin) = img2col_origin(ctx, state);
    let pad = EdgePad {
        bottom: state.m_pad_account,
        right: k_aligned - state.k0.extent,
        ..EdgePad::none()
    };
    LoadTask {
        kind: TransferKind::Img2Col { m_origin, k_origin },
        operand: Operand::Activation,
        src: MemoryLevel::Staging,
        dst: MemoryLevel::NearCompute,
        src_offset: staging.base,
        dst_offset: ctx.map.near_base(Operand::Activation, side),
        pattern: StridePattern::rows(state.k0.extent, state.m0.extent, 0, k_aligned as u64),
        pad,
        pad_value: ctx.plan.pad_value,
        index: None,
    }
}

/// One copy per kernel tap the level-0 reduction slice crosses.
fn near_expanded(
    strategy: &GatherWithPadding,
    state: &IterationState,
    staging: &BufferSlot,
    side: u8,
) -> Vec<LoadTask> {
    let ctx = &strategy.direct.ctx;
    let pitch = GatherPitch::new(&ctx.plan, &ctx.limits);
    let span = strategy.span(state);
    let channels = ctx.plan.shape.in_channels;
    let k_aligned = ctx.limits.align_block(state.k0.extent) as u64;
    let m_local = (state.m0.start - state.m1.start) as u64;
    let dst_base = ctx.map.near_base(Operand::Activation, side);
    let mut tasks = Vec::new();
    let mut k = state.k0.start;
    while k < state.k0.end() {
        let tap = k / channels;
        let channel = k % channels;
        let run = (channels - channel).min(state.k0.end() - k);
        let src = staging.base
            + (tap - span.tap_start) as u64 * pitch.tap_stride()
            + m_local * pitch.channel as u64
            + (channel - span.channel_start) as u64;
        let dst = dst_base + (k - state.k0.start) as u64;
        tasks.push(
            LoadTask::copy(
                Operand::Activation,
                MemoryLevel::Staging,
                MemoryLevel::NearCompute,
                src,
                dst,
                StridePattern::rows(run, state.m0.extent, pitch.channel as u64, k_aligned),
            )
            .with_pad(
                EdgePad {
                    bottom: state.m_pad_account,
                    ..EdgePad::none()
                },
                ctx.plan.pad_value,
            ),
        );
        k += run;
    }
    tasks
}

fn near_weight(
    ctx: &LoadContext,
    state: &IterationState,
    staging: &BufferSlot,
    side: u8,
) -> LoadTask {
    let n_pitch = window::weight_pitch(&ctx.plan, &ctx.limits) as u64;
    let src = staging.base
        + (state.k0.start - state.k1.start) as u64 * n_pitch
        + (state.n0.start - state.n1.start) as u64;
    LoadTask::copy(
        Operand::Weight,
        MemoryLevel::Staging,
        MemoryLevel::NearCompute,
        src,
        ctx.map.near_base(Operand::Weight, side),
        StridePattern::rows(
            state.n0.extent,
            state.k0.extent,
            n_pitch,
            state.n_aligned() as u64,
        ),
    )
    .with_pad(
        EdgePad {
            right: state.n_pad_account,
            ..EdgePad::none()
        },
        crate::plan::PadValue::Zero,
    )
}
