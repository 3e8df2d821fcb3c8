use crate::iteration::IterationState;
use crate::load::task::{EdgePad, LoadTask, MemoryLevel, StridePattern};
use crate::load::window::{direct_window, weight_pitch, DirectWindow};
use crate::load::LoadContext;
use crate::plan::{Operand, PadValue, SourceFormat};
use crate::sync::BufferSlot;

/// Straight copies from global memory. The activation fill is the raw input
/// window of the M tile; the weight fill is a `[k][n]` tile of a weight that
/// the planner stored reduction-major.
#[derive(Debug)]
pub struct DirectLoad {
    pub(crate) ctx: LoadContext,
}

impl DirectLoad {
    pub fn new(ctx: LoadContext) -> Self {
        Self { ctx }
    }

    pub fn window(&self, state: &IterationState) -> DirectWindow {
        direct_window(
            &self.ctx.plan,
            &self.ctx.limits,
            state.m1.start,
            state.m1.extent,
            state.k1.start,
            state.k1.extent,
        )
    }

    pub fn activation(&self, state: &IterationState, slot: &BufferSlot) -> Vec<LoadTask> {
        let plan = &self.ctx.plan;
        let shape = &plan.shape;
        let window = self.window(state);
        let rows = window.row_count();
        let pad_value = plan.pad_value;

        if window.rows.is_empty() {
            return vec![LoadTask::fill(
                Operand::Activation,
                MemoryLevel::Staging,
                slot.base,
                StridePattern::contiguous(window.elements()),
                pad_value,
            )];
        }

        let first_row = (window.in_row + window.rows.lead as i64) as u64;
        let pad = EdgePad {
            top: window.rows.lead,
            bottom: window.rows.trail,
            left: shape.pad_left,
            right: shape.pad_right,
        };
        let in_h = shape.in_h as u64;
        let in_w = shape.in_w as u64;
        let channels = shape.in_channels as u64;
        let batch = state.batch.index as u64;
        let row_pitch = window.row_pitch as u64;
        let channel_pitch = window.channel_pitch as u64;
        let spare_channels = window.channel_pitch - window.channels;
        let mut tasks = Vec::with_capacity(2);

        match plan.activation_format {
            SourceFormat::ChannelMajor => {
                let plane = rows as u64 * row_pitch;
                let src =
                    ((batch * channels + window.channel_start as u64) * in_h + first_row) * in_w;
                let dst = slot.base + window.rows.lead as u64 * row_pitch + shape.pad_left as u64;
                let pattern = StridePattern::rows(shape.in_w, window.rows.valid, in_w, row_pitch)
                    .blocks(window.channels, in_h * in_w, plane);
                tasks.push(
                    LoadTask::copy(
                        Operand::Activation,
                        MemoryLevel::Global,
                        MemoryLevel::Staging,
                        src,
                        dst,
                        pattern,
                    )
                    .with_pad(pad, pad_value),
                );
                if spare_channels > 0 {
                    tasks.push(LoadTask::fill(
                        Operand::Activation,
                        MemoryLevel::Staging,
                        slot.base + window.channels as u64 * plane,
                        StridePattern::contiguous(spare_channels as u64 * plane),
                        pad_value,
                    ));
                }
            }
            SourceFormat::SpatialMajor => {
                let src =
                    (batch * in_h + first_row) * in_w * channels + window.channel_start as u64;
                let dst = slot.base
                    + (window.rows.lead as u64 * row_pitch + shape.pad_left as u64) * channel_pitch;
                let pattern =
                    StridePattern::rows(window.channels, shape.in_w, channels, channel_pitch)
                        .blocks(window.rows.valid, in_w * channels, row_pitch * channel_pitch);
                tasks.push(
                    LoadTask::copy(
                        Operand::Activation,
                        MemoryLevel::Global,
                        MemoryLevel::Staging,
                        src,
                        dst,
                        pattern,
                    )
                    .with_pad(pad, pad_value),
                );
                if spare_channels > 0 {
                    tasks.push(LoadTask::fill(
                        Operand::Activation,
                        MemoryLevel::Staging,
                        slot.base + window.channels as u64,
                        StridePattern::rows(
                            spare_channels,
                            rows * window.row_pitch,
                            channel_pitch,
                            channel_pitch,
                        ),
                        pad_value,
                    ));
                }
            }
        }
        tasks
    }

    pub fn weight(&self, state: &IterationState, slot: &BufferSlot) -> Vec<LoadTask> {
        let plan = &self.ctx.plan;
        let n_total = plan.n_total() as u64;
        let n_pitch = weight_pitch(plan, &self.ctx.limits);
        let src = state.k1.start as u64 * n_total + state.n1.start as u64;
        let pattern =
            StridePattern::rows(state.n1.extent, state.k1.extent, n_total, n_pitch as u64);
        let pad = EdgePad {
            right: n_pitch - state.n1.extent,
            ..EdgePad::none()
        };
        vec![LoadTask::copy(
            Operand::Weight,
            MemoryLevel::Global,
            MemoryLevel::Staging,
            src,
            slot.base,
            pattern,
        )
        .with_pad(pad, PadValue::Zero)]
    }
}
