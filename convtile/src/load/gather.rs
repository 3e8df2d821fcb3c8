use crate::iteration::IterationState;
use crate::load::direct::DirectLoad;
use crate::load::task::{EdgePad, LoadTask, MemoryLevel, StridePattern};
use crate::load::window::{clip_axis, row_segments, tap_span, GatherPitch, RowSegment, TapSpan};
use crate::load::LoadContext;
use crate::plan::Operand;
use crate::sync::BufferSlot;

/// Pre-expands the activation window per kernel tap, reading the input in
/// pixel bursts and clipping every window against the tensor edges.
///
/// Staging layout is `[tap][position][channel]` with block-aligned position
/// and channel pitches. The weight side is a plain [`DirectLoad`].
#[derive(Debug)]
pub struct GatherWithPadding {
    pub(crate) direct: DirectLoad,
}

/// A single kernel-tap window over one row segment of the M tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapWindow {
    pub tap: u32,
    pub segment: RowSegment,
    /// First input row and column of the nominal window; may be negative.
    pub in_row: i64,
    pub in_col: i64,
}

impl GatherWithPadding {
    pub fn new(ctx: LoadContext) -> Self {
        Self {
            direct: DirectLoad::new(ctx),
        }
    }

    fn ctx(&self) -> &LoadContext {
        &self.direct.ctx
    }

    pub fn span(&self, state: &IterationState) -> TapSpan {
        tap_span(self.ctx().plan.shape.in_channels, state.k1.start, state.k1.extent)
    }

    /// Every (tap, segment) window the fill of `state` covers, in issue order.
    pub fn windows(&self, state: &IterationState) -> Vec<TapWindow> {
        let shape = &self.ctx().plan.shape;
        let span = self.span(state);
        let segments = row_segments(state.m1.start, state.m1.extent, shape.out_w());
        let mut windows = Vec::with_capacity(span.taps as usize * segments.len());
        for tap in span.tap_start..span.tap_start + span.taps {
            let kh = tap / shape.kernel_w;
            let kw = tap % shape.kernel_w;
            for segment in &segments {
                windows.push(TapWindow {
                    tap,
                    segment: *segment,
                    in_row: segment.out_row as i64 * shape.stride_h as i64 - shape.pad_top as i64
                        + (kh * shape.dilation_h) as i64,
                    in_col: segment.out_col as i64 * shape.stride_w as i64
                        - shape.pad_left as i64
                        + (kw * shape.dilation_w) as i64,
                });
            }
        }
        windows
    }

    pub fn activation(&self, state: &IterationState, slot: &BufferSlot) -> Vec<LoadTask> {
        let ctx = self.ctx();
        let plan = &ctx.plan;
        let shape = &plan.shape;
        let pitch = GatherPitch::new(plan, &ctx.limits);
        let span = self.span(state);
        let channel_pitch = pitch.channel as u64;
        let out_w = shape.out_w() as u64;
        let channels = shape.in_channels as u64;
        let batch = state.batch.index as u64;
        let mut tasks = Vec::new();

        for window in self.windows(state) {
            let segment = window.segment;
            let rows = clip_axis(window.in_row, segment.rows, shape.stride_h, shape.in_h);
            let cols = clip_axis(window.in_col, segment.cols, shape.stride_w, shape.in_w);
            let tap_base = slot.base + (window.tap - span.tap_start) as u64 * pitch.tap_stride();
            let segment_base = tap_base + segment.local as u64 * channel_pitch;

            if rows.is_empty() || cols.is_empty() {
                let pattern = StridePattern::rows(
                    segment.cols * pitch.channel,
                    segment.rows,
                    0,
                    out_w * channel_pitch,
                );
                tasks.push(LoadTask::fill(
                    Operand::Activation,
                    MemoryLevel::Staging,
                    segment_base,
                    pattern,
                    plan.pad_value,
                ));
                continue;
            }

            let first_row = (window.in_row + (rows.lead * shape.stride_h) as i64) as u64;
            let first_col = (window.in_col + (cols.lead * shape.stride_w) as i64) as u64;
            let src = ((batch * shape.in_h as u64 + first_row) * shape.in_w as u64 + first_col)
                * channels
                + span.channel_start as u64;
            let dst = segment_base + (rows.lead as u64 * out_w + cols.lead as u64) * channel_pitch;
            let pattern = StridePattern::rows(
                span.channels,
                cols.valid,
                shape.stride_w as u64 * channels,
                channel_pitch,
            )
            .blocks(
                rows.valid,
                shape.stride_h as u64 * shape.in_w as u64 * channels,
                out_w * channel_pitch,
            );
            let pad = EdgePad {
                top: rows.lead,
                bottom: rows.trail,
                left: cols.lead,
                right: cols.trail,
            };
            tasks.push(
                LoadTask::copy(
                    Operand::Activation,
                    MemoryLevel::Global,
                    MemoryLevel::Staging,
                    src,
                    dst,
                    pattern,
                )
                .with_pad(pad, plan.pad_value),
            );
        }

        if pitch.channel > span.channels {
            tasks.push(LoadTask::fill(
                Operand::Activation,
                MemoryLevel::Staging,
                slot.base + span.channels as u64,
                StridePattern::rows(
                    pitch.channel - span.channels,
                    span.taps * pitch.position,
                    channel_pitch,
                    channel_pitch,
                ),
                plan.pad_value,
            ));
        }
        tasks
    }

    pub fn weight(&self, state: &IterationState, slot: &BufferSlot) -> Vec<LoadTask> {
        self.direct.weight(state, slot)
    }
}
