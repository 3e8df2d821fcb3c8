use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::iteration::IterationState;
use crate::load::direct::DirectLoad;
use crate::load::task::{EdgePad, GatherIndex, LoadTask, MemoryLevel, StridePattern};
use crate::load::window::weight_pitch;
use crate::load::LoadContext;
use crate::plan::{Operand, PadValue};
use crate::sync::BufferSlot;

/// Reads the weight in its natural `[n][k]` layout and transposes it on chip.
///
/// Per N chunk: copy `[chunk][k]` into the scratch with a block-aligned row
/// pitch, gather each `k` row across the chunk into the packed half, then copy
/// the packed rows into the staging slot.
#[derive(Debug)]
pub struct WeightOnChipTranspose {
    pub(crate) direct: DirectLoad,
    table: OnceCell<Arc<[u32]>>,
}

impl WeightOnChipTranspose {
    pub fn new(ctx: LoadContext) -> Self {
        Self {
            direct: DirectLoad::new(ctx),
            table: OnceCell::new(),
        }
    }

    fn ctx(&self) -> &LoadContext {
        &self.direct.ctx
    }

    fn k_pitch(&self) -> u32 {
        self.ctx().limits.align_block(self.ctx().plan.tiles.k.l1)
    }

    /// One lane per output channel of a full chunk; narrower chunks use a
    /// prefix.
    pub fn index_table(&self) -> Arc<[u32]> {
        self.table
            .get_or_init(|| {
                let k_pitch = self.k_pitch();
                (0..self.ctx().map.vec_block_n)
                    .map(|lane| lane * k_pitch)
                    .collect::<Vec<_>>()
                    .into()
            })
            .clone()
    }

    pub fn activation(&self, state: &IterationState, slot: &BufferSlot) -> Vec<LoadTask> {
        self.direct.activation(state, slot)
    }

    pub fn weight(&self, state: &IterationState, slot: &BufferSlot) -> Vec<LoadTask> {
        let ctx = self.ctx();
        let k_total = ctx.plan.k_total(&ctx.limits) as u64;
        let k_pitch = self.k_pitch() as u64;
        let vec_n = ctx.map.vec_block_n;
        let packed = ctx.map.scratch_packed_base;
        let n_pitch = weight_pitch(&ctx.plan, &ctx.limits);
        let table = self.index_table();
        let mut tasks = Vec::new();

        let mut chunk_start = 0;
        while chunk_start < state.n1.extent {
            let chunk = vec_n.min(state.n1.extent - chunk_start);
            let n = (state.n1.start + chunk_start) as u64;
            tasks.push(LoadTask::copy(
                Operand::Weight,
                MemoryLevel::Global,
                MemoryLevel::VectorScratch,
                n * k_total + state.k1.start as u64,
                0,
                StridePattern::rows(state.k1.extent, chunk, k_total, k_pitch),
            ));
            tasks.push(LoadTask::gather(
                Operand::Weight,
                MemoryLevel::VectorScratch,
                0,
                packed,
                StridePattern::rows(chunk, state.k1.extent, 1, vec_n as u64),
                GatherIndex {
                    table: table.clone(),
                    lanes: chunk,
                    dst_lane_stride: 1,
                },
            ));
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
                    packed,
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
