//! Geometry shared by the load strategies: how an M tile maps onto input rows
//! and columns, and how a nominal window is clipped against the tensor.

use crate::config::{align_up, ceil_div, HardwareLimits};
use crate::plan::{LayoutMode, TilingPlan};

/// Result of clipping a strided run of positions against `[0, limit)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxisClip {
    /// Positions before the tensor start.
    pub lead: u32,
    /// Positions inside the tensor.
    pub valid: u32,
    /// Positions past the tensor end.
    pub trail: u32,
}

impl AxisClip {
    pub fn is_empty(&self) -> bool {
        self.valid == 0
    }
}

/// Clips the positions `start + i * step` for `i` in `0..count`.
pub fn clip_axis(start: i64, count: u32, step: u32, limit: u32) -> AxisClip {
    let step = step.max(1) as i64;
    let count_i = count as i64;
    let lead = if start >= 0 {
        0
    } else {
        ((-start + step - 1) / step).min(count_i)
    };
    let first_past = if start >= limit as i64 {
        0
    } else {
        (limit as i64 - start + step - 1) / step
    };
    let trail = (count_i - first_past.min(count_i)).min(count_i - lead);
    AxisClip {
        lead: lead as u32,
        valid: (count_i - lead - trail) as u32,
        trail: trail as u32,
    }
}

/// A rectangle of output positions: `rows` consecutive output rows sharing the
/// column range `[out_col, out_col + cols)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowSegment {
    pub out_row: u32,
    pub out_col: u32,
    pub rows: u32,
    pub cols: u32,
    /// Index of the first position relative to the start of the M tile.
    pub local: u32,
}

/// Cuts the flattened position range `[m_start, m_start + m_len)` into a head
/// partial row, a block of full rows and a tail partial row. Absent pieces are
/// skipped.
pub fn row_segments(m_start: u32, m_len: u32, out_w: u32) -> Vec<RowSegment> {
    let mut segments = Vec::with_capacity(3);
    let end = m_start + m_len;
    let mut pos = m_start;
    let col = pos % out_w;
    if pos < end && (col != 0 || end - pos < out_w) {
        let cols = (out_w - col).min(end - pos);
        segments.push(RowSegment {
            out_row: pos / out_w,
            out_col: col,
            rows: 1,
            cols,
            local: pos - m_start,
        });
        pos += cols;
    }
    let full = (end - pos) / out_w;
    if full > 0 {
        segments.push(RowSegment {
            out_row: pos / out_w,
            out_col: 0,
            rows: full,
            cols: out_w,
            local: pos - m_start,
        });
        pos += full * out_w;
    }
    if pos < end {
        segments.push(RowSegment {
            out_row: pos / out_w,
            out_col: 0,
            rows: 1,
            cols: end - pos,
            local: pos - m_start,
        });
    }
    segments
}

/// Input rows and channels a raw-window fill must cover for one M tile and
/// reduction slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectWindow {
    pub out_row: u32,
    pub out_rows: u32,
    /// First input row, negative inside the top padding.
    pub in_row: i64,
    pub rows: AxisClip,
    pub channel_start: u32,
    pub channels: u32,
    /// Channel count after alignment; the channels past `channels` are filled.
    pub channel_pitch: u32,
    /// Row width in staging, including the left and right padding columns.
    pub row_pitch: u32,
}

impl DirectWindow {
    pub fn row_count(&self) -> u32 {
        self.rows.lead + self.rows.valid + self.rows.trail
    }

    pub fn elements(&self) -> u64 {
        self.channel_pitch as u64 * self.row_count() as u64 * self.row_pitch as u64
    }
}

pub fn direct_window(
    plan: &TilingPlan,
    limits: &HardwareLimits,
    m_start: u32,
    m_len: u32,
    k_start: u32,
    k_len: u32,
) -> DirectWindow {
    let shape = &plan.shape;
    let out_w = shape.out_w();
    let out_row = m_start / out_w;
    let last_row = (m_start + m_len - 1) / out_w;
    let out_rows = last_row - out_row + 1;
    let in_row = out_row as i64 * shape.stride_h as i64 - shape.pad_top as i64;
    let rows = clip_axis(in_row, shape.input_rows_for(out_rows), 1, shape.in_h);
    let (channel_start, channels, channel_pitch) = match plan.layout {
        LayoutMode::SmallChannelPack => (0, shape.in_channels, limits.small_channel_width),
        _ => {
            let taps = shape.taps();
            let first = k_start / taps;
            let last = ceil_div(k_start + k_len, taps);
            let channels = last - first;
            (first, channels, limits.align_block(channels))
        }
    };
    DirectWindow {
        out_row,
        out_rows,
        in_row,
        rows,
        channel_start,
        channels,
        channel_pitch,
        row_pitch: shape.pad_left + shape.in_w + shape.pad_right,
    }
}

/// Kernel taps and channels a tap-major reduction slice touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapSpan {
    pub tap_start: u32,
    pub taps: u32,
    pub channel_start: u32,
    pub channels: u32,
}

pub fn tap_span(channels_per_tap: u32, k_start: u32, k_len: u32) -> TapSpan {
    let tap_start = k_start / channels_per_tap;
    let tap_end = ceil_div(k_start + k_len, channels_per_tap);
    let taps = tap_end - tap_start;
    if taps == 1 {
        TapSpan {
            tap_start,
            taps,
            channel_start: k_start % channels_per_tap,
            channels: k_len,
        }
    } else {
        TapSpan {
            tap_start,
            taps,
            channel_start: 0,
            channels: channels_per_tap,
        }
    }
}

/// Pitches of the pre-expanded `[tap][position][channel]` gather layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatherPitch {
    pub position: u32,
    pub channel: u32,
}

impl GatherPitch {
    pub fn new(plan: &TilingPlan, limits: &HardwareLimits) -> Self {
        Self {
            position: limits.align_block(plan.tiles.m.l1),
            channel: limits.align_block(plan.shape.in_channels),
        }
    }

    pub fn tap_stride(&self) -> u64 {
        self.position as u64 * self.channel as u64
    }
}

/// Row pitch of every weight staging slot: `[k][n_pitch]`.
pub fn weight_pitch(plan: &TilingPlan, limits: &HardwareLimits) -> u32 {
    align_up(plan.tiles.n.l1, limits.block_size)
}
