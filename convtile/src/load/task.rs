use std::fmt;
use std::sync::Arc;

use crate::plan::{Operand, PadValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryLevel {
    Global,
    VectorScratch,
    Staging,
    NearCompute,
    Accumulator,
}

impl fmt::Display for MemoryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MemoryLevel::Global => "GM",
            MemoryLevel::VectorScratch => "UB",
            MemoryLevel::Staging => "L1",
            MemoryLevel::NearCompute => "L0",
            MemoryLevel::Accumulator => "L0C",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Copy,
    /// Writes the pad value over the destination pattern; reads nothing.
    Fill,
    /// Index-driven read, see [`GatherIndex`].
    Gather,
    /// Expands a raw input window into contraction rows. The origin is the
    /// tile's first position and reduction index relative to the window.
    Img2Col { m_origin: u32, k_origin: u32 },
}

/// Two nested strided loops: `block_count` blocks of `burst_count` bursts of
/// `burst_len` contiguous elements. Strides are in elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StridePattern {
    pub burst_len: u32,
    pub burst_count: u32,
    pub src_stride: u64,
    pub dst_stride: u64,
    pub block_count: u32,
    pub src_block_stride: u64,
    pub dst_block_stride: u64,
}

impl StridePattern {
    pub fn contiguous(len: u64) -> Self {
        Self::rows(len as u32, 1, len, len)
    }

    pub fn rows(burst_len: u32, burst_count: u32, src_stride: u64, dst_stride: u64) -> Self {
        Self {
            burst_len,
            burst_count,
            src_stride,
            dst_stride,
            block_count: 1,
            src_block_stride: 0,
            dst_block_stride: 0,
        }
    }

    pub fn blocks(
        mut self,
        block_count: u32,
        src_block_stride: u64,
        dst_block_stride: u64,
    ) -> Self {
        self.block_count = block_count;
        self.src_block_stride = src_block_stride;
        self.dst_block_stride = dst_block_stride;
        self
    }

    /// Elements moved (or filled) by one pass over the pattern.
    pub fn elements(&self) -> u64 {
        self.burst_len as u64 * self.burst_count as u64 * self.block_count as u64
    }
}

/// Padding written around the moved rectangle, per edge, in destination
/// positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EdgePad {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
}

impl EdgePad {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_none(&self) -> bool {
        self.top == 0 && self.bottom == 0 && self.left == 0 && self.right == 0
    }
}

/// Gather table: lane `j` of burst `i` in block `b` reads
/// `src_offset + b * src_block_stride + i * src_stride + table[j]` and writes
/// `dst_offset + b * dst_block_stride + i * dst_stride + j * dst_lane_stride`.
/// Only the first `lanes` entries are active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatherIndex {
    pub table: Arc<[u32]>,
    pub lanes: u32,
    pub dst_lane_stride: u64,
}

/// One resolved data-movement primitive call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTask {
    pub kind: TransferKind,
    pub operand: Operand,
    pub src: MemoryLevel,
    pub dst: MemoryLevel,
    pub src_offset: u64,
    pub dst_offset: u64,
    pub pattern: StridePattern,
    pub pad: EdgePad,
    pub pad_value: PadValue,
    pub index: Option<GatherIndex>,
}

impl LoadTask {
    pub fn copy(
        operand: Operand,
        src: MemoryLevel,
        dst: MemoryLevel,
        src_offset: u64,
        dst_offset: u64,
        pattern: StridePattern,
    ) -> Self {
        Self {
            kind: TransferKind::Copy,
            operand,
            src,
            dst,
            src_offset,
            dst_offset,
            pattern,
            pad: EdgePad::none(),
            pad_value: PadValue::Zero,
            index: None,
        }
    }

    pub fn fill(
        operand: Operand,
        dst: MemoryLevel,
        dst_offset: u64,
        pattern: StridePattern,
        pad_value: PadValue,
    ) -> Self {
        Self {
            kind: TransferKind::Fill,
            operand,
            src: dst,
            dst,
            src_offset: 0,
            dst_offset,
            pattern,
            pad: EdgePad::none(),
            pad_value,
            index: None,
        }
    }

    pub fn gather(
        operand: Operand,
        level: MemoryLevel,
        src_offset: u64,
        dst_offset: u64,
        pattern: StridePattern,
        index: GatherIndex,
    ) -> Self {
        Self {
            kind: TransferKind::Gather,
            operand,
            src: level,
            dst: level,
            src_offset,
            dst_offset,
            pattern,
            pad: EdgePad::none(),
            pad_value: PadValue::Zero,
            index: Some(index),
        }
    }

    pub fn with_pad(mut self, pad: EdgePad, value: PadValue) -> Self {
        self.pad = pad;
        self.pad_value = value;
        self
    }

    pub fn reads_source(&self) -> bool {
        self.kind != TransferKind::Fill
    }
}

impl fmt::Display for LoadTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            TransferKind::Copy => "copy".to_string(),
            TransferKind::Fill => "fill".to_string(),
            TransferKind::Gather => "gather".to_string(),
            TransferKind::Img2Col { m_origin, k_origin } => {
                format!("img2col@({m_origin},{k_origin})")
            }
        };
        let p = &self.pattern;
        write!(
            f,
            "{} {} {}+{} -> {}+{} [{}x{}x{}]",
            self.operand,
            kind,
            self.src,
            self.src_offset,
            self.dst,
            self.dst_offset,
            p.block_count,
            p.burst_count,
            p.burst_len
        )?;
        if !self.pad.is_none() {
            write!(
                f,
                " pad(t{} b{} l{} r{})",
                self.pad.top, self.pad.bottom, self.pad.left, self.pad.right
            )?;
        }
        if let Some(index) = &self.index {
            write!(f, " lanes {}/{}", index.lanes, index.table.len())?;
        }
        Ok(())
    }
}
