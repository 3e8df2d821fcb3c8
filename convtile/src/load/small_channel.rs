use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::iteration::IterationState;
use crate::load::direct::DirectLoad;
use crate::load::task::{EdgePad, GatherIndex, LoadTask, MemoryLevel, StridePattern};
use crate::load::window::{tap_span, weight_pitch};
use crate::load::LoadContext;
use crate::plan::{Operand, PadValue};
use crate::sync::BufferSlot;

/// Widens every kernel tap to `small_channel_width` channels.
///
/// The weight is over-read from its natural `[n][c][tap]` layout into the
/// vector scratch as `[c][n][tap]`, the missing channels stay zero, and a
/// gather repacks it into `[tap * width + c][n]` rows. The activation side is
/// a [`DirectLoad`] with the channel pitch set to the same width.
#[derive(Debug)]
pub struct SmallChannelPack {
    pub(crate) direct: DirectLoad,
    table: OnceCell<Arc<[u32]>>,
}

impl SmallChannelPack {
    pub fn new(ctx: LoadContext) -> Self {
        Self {
            direct: DirectLoad::new(ctx),
            table: OnceCell::new(),
        }
    }

    fn ctx(&self) -> &LoadContext {
        &self.direct.ctx
    }

    fn width(&self) -> u32 {
        self.ctx().limits.small_channel_width
    }

    /// Taps one gather group covers; a group fills exactly one block of rows.
    pub fn taps_per_group(&self) -> u32 {
        self.ctx().limits.block_size / self.width()
    }

    /// Built on first use and shared by every later fill.
    pub fn index_table(&self) -> Arc<[u32]> {
        self.table
            .get_or_init(|| {
                let ctx = self.ctx();
                let width = self.width();
                let channel_stride = ctx.map.vec_block_n * ctx.plan.shape.taps();
                let mut table = Vec::with_capacity(ctx.limits.block_size as usize);
                for tap in 0..self.taps_per_group() {
                    for channel in 0..width {
                        table.push(channel * channel_stride + tap);
                    }
                }
                table.into()
            })
            .clone()
    }

    pub fn activation(&self, state: &IterationState, slot: &BufferSlot) -> Vec<LoadTask> {
        self.direct.activation(state, slot)
    }

    pub fn weight(
        &self,
        state: &IterationState,
        slot: &BufferSlot,
        fill_index: u64,
    ) -> Vec<LoadTask> {
        let ctx = self.ctx();
        let shape = &ctx.plan.shape;
        let width = self.width();
        let taps = shape.taps();
        let channels = shape.in_channels;
        let vec_n = ctx.map.vec_block_n;
        let packed = ctx.map.scratch_packed_base;
        let n_pitch = weight_pitch(&ctx.plan, &ctx.limits);
        let span = tap_span(width, state.k1.start, state.k1.extent);
        let group_taps = self.taps_per_group();
        let full_groups = span.taps / group_taps;
        let tail_taps = span.taps % group_taps;
        let channel_plane = vec_n as u64 * taps as u64;
        let row_offset = (state.k1.start - span.tap_start * width) as u64;
        let table = self.index_table();
        let mut tasks = Vec::new();

        if fill_index == 0 && channels < width {
            tasks.push(LoadTask::fill(
                Operand::Weight,
                MemoryLevel::VectorScratch,
                channels as u64 * channel_plane,
                StridePattern::contiguous((width - channels) as u64 * channel_plane),
                PadValue::Zero,
            ));
        }

        let mut chunk_start = 0;
        while chunk_start < state.n1.extent {
            let chunk = vec_n.min(state.n1.extent - chunk_start);
            let n = (state.n1.start + chunk_start) as u64;
            let row = channels as u64 * taps as u64;
            tasks.push(LoadTask::copy(
                Operand::Weight,
                MemoryLevel::Global,
                MemoryLevel::VectorScratch,
                n * row,
                0,
                StridePattern::rows(taps, chunk, row, taps as u64).blocks(
                    channels,
                    taps as u64,
                    channel_plane,
                ),
            ));

            let group_pattern = |groups: u32| {
                StridePattern::rows(table.len() as u32, chunk, taps as u64, 1).blocks(
                    groups,
                    group_taps as u64,
                    ctx.limits.block_size as u64 * vec_n as u64,
                )
            };
            if full_groups > 0 {
                tasks.push(LoadTask::gather(
                    Operand::Weight,
                    MemoryLevel::VectorScratch,
                    span.tap_start as u64,
                    packed,
                    group_pattern(full_groups),
                    GatherIndex {
                        table: table.clone(),
                        lanes: table.len() as u32,
                        dst_lane_stride: vec_n as u64,
                    },
                ));
            }
            if tail_taps > 0 {
                let done = full_groups as u64;
                tasks.push(LoadTask::gather(
                    Operand::Weight,
                    MemoryLevel::VectorScratch,
                    span.tap_start as u64 + done * group_taps as u64,
                    packed + done * ctx.limits.block_size as u64 * vec_n as u64,
                    group_pattern(1),
                    GatherIndex {
                        table: table.clone(),
                        lanes: tail_taps * width,
                        dst_lane_stride: vec_n as u64,
                    },
                ));
            }

            let last = chunk_start + chunk == state.n1.extent;
            let pad = EdgePad {
                right: if last { n_pitch - state.n1.extent } else { 0 },
                ..EdgePad::none()
            };
            tasks.push(
                LoadTask::copy(
                    Operand::Weight,
                    MemoryLevel::VectorScratch,
                    MemoryLevel::Staging,
                    packed + row_offset * vec_n as u64,
                    slot.base + chunk_start as u64,
                    StridePattern::rows(chunk, state.k1.extent, vec_n as u64, n_pitch as u64),
                )
                .with_pad(pad, PadValue::Zero),
            );
            chunk_start += chunk;
        }
        tasks
    }
}
