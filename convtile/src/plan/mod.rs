use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{ceil_div, HardwareLimits};

mod binary;
mod builder;
mod serde_json_io;
mod validation;

pub use binary::{decode_plan, encode_plan, PlanLoader, RawPlan, PLAN_MAGIC, PLAN_VERSION};
pub use builder::PlanBuilder;
pub use serde_json_io::{PlanDeserialize, PlanSerialize};
pub(crate) use validation::validate_plan;

/// Tensors a transfer belongs to. Only the two inputs pass through staging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operand {
    Activation,
    Weight,
    Output,
}

impl Operand {
    /// Operands that own staging slots.
    pub const ALL: [Operand; 2] = [Operand::Activation, Operand::Weight];

    pub fn index(self) -> usize {
        match self {
            Operand::Activation => 0,
            Operand::Weight => 1,
            Operand::Output => 2,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Activation => write!(f, "activation"),
            Operand::Weight => write!(f, "weight"),
            Operand::Output => write!(f, "output"),
        }
    }
}

/// Which output-tile axis advances fastest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IterationOrder {
    /// Output positions advance fastest; the weight tile stays resident.
    RowFirst,
    /// Output channels advance fastest; the activation tile stays resident.
    ColumnFirst,
}

/// How staging-buffer fills are composed. Chosen once per invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayoutMode {
    Direct,
    GatherWithPadding,
    SmallChannelPack,
    WeightOnChipTranspose,
}

/// Order of (channel, kernel tap) pairs along the reduction axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReductionOrder {
    /// `k = channel * taps + tap`
    ChannelMajor,
    /// `k = tap * channels + channel`
    TapMajor,
}

impl LayoutMode {
    pub fn supports(self, order: IterationOrder) -> bool {
        match self {
            LayoutMode::Direct | LayoutMode::GatherWithPadding => true,
            // The repacked weight tile is addressed as the stationary operand.
            LayoutMode::SmallChannelPack | LayoutMode::WeightOnChipTranspose => {
                order == IterationOrder::RowFirst
            }
        }
    }

    pub fn reduction_order(self) -> ReductionOrder {
        match self {
            LayoutMode::Direct | LayoutMode::WeightOnChipTranspose => ReductionOrder::ChannelMajor,
            LayoutMode::GatherWithPadding | LayoutMode::SmallChannelPack => {
                ReductionOrder::TapMajor
            }
        }
    }
}

/// Global-memory layout of the activation tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceFormat {
    /// NCHW
    ChannelMajor,
    /// NHWC
    SpatialMajor,
}

/// Value written wherever a transfer pads instead of reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PadValue {
    #[default]
    Zero,
    /// Zero point of quantized data.
    Neutral(i32),
}

impl PadValue {
    pub fn raw(self) -> i32 {
        match self {
            PadValue::Zero => 0,
            PadValue::Neutral(value) => value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvShape {
    pub batch: u32,
    pub in_channels: u32,
    pub in_h: u32,
    pub in_w: u32,
    pub out_channels: u32,
    pub kernel_h: u32,
    pub kernel_w: u32,
    #[serde(default = "one")]
    pub stride_h: u32,
    #[serde(default = "one")]
    pub stride_w: u32,
    #[serde(default = "one")]
    pub dilation_h: u32,
    #[serde(default = "one")]
    pub dilation_w: u32,
    #[serde(default)]
    pub pad_top: u32,
    #[serde(default)]
    pub pad_bottom: u32,
    #[serde(default)]
    pub pad_left: u32,
    #[serde(default)]
    pub pad_right: u32,
}

fn one() -> u32 {
    1
}

fn output_extent(input: u32, pad: u64, kernel: u32, stride: u32, dilation: u32) -> Option<u32> {
    if stride == 0 || kernel == 0 {
        return Some(0);
    }
    let span = (kernel as u64 - 1) * dilation as u64 + 1;
    let padded = input as u64 + pad;
    if padded < span {
        return Some(0);
    }
    u32::try_from((padded - span) / stride as u64 + 1).ok()
}

impl ConvShape {
    /// `None` when the output height does not fit in `u32`.
    pub fn checked_out_h(&self) -> Option<u32> {
        output_extent(
            self.in_h,
            self.pad_top as u64 + self.pad_bottom as u64,
            self.kernel_h,
            self.stride_h,
            self.dilation_h,
        )
    }

    pub fn checked_out_w(&self) -> Option<u32> {
        output_extent(
            self.in_w,
            self.pad_left as u64 + self.pad_right as u64,
            self.kernel_w,
            self.stride_w,
            self.dilation_w,
        )
    }

    pub fn out_h(&self) -> u32 {
        self.checked_out_h().unwrap_or(u32::MAX)
    }

    pub fn out_w(&self) -> u32 {
        self.checked_out_w().unwrap_or(u32::MAX)
    }

    /// Number of kernel taps (`kernel_h * kernel_w`).
    pub fn taps(&self) -> u32 {
        self.kernel_h.saturating_mul(self.kernel_w)
    }

    /// Input rows touched by `out_rows` consecutive output rows.
    pub fn input_rows_for(&self, out_rows: u32) -> u32 {
        if out_rows == 0 {
            return 0;
        }
        (out_rows - 1) * self.stride_h + (self.kernel_h - 1) * self.dilation_h + 1
    }
}

/// Level-1 (staging) and level-0 (near-compute) tile of one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileShape {
    pub l1: u32,
    pub l0: u32,
}

impl TileShape {
    pub fn new(l1: u32, l0: u32) -> Self {
        Self { l1, l0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileSizes {
    /// Output positions (`out_h * out_w`, flattened row-major).
    pub m: TileShape,
    /// Output channels.
    pub n: TileShape,
    /// Reduction.
    pub k: TileShape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BufferConfig {
    pub activation_double_buffer: bool,
    pub weight_double_buffer: bool,
    #[serde(default)]
    pub l0_double_buffer: bool,
}

impl BufferConfig {
    pub fn double_buffered(&self, operand: Operand) -> bool {
        match operand {
            Operand::Activation => self.activation_double_buffer,
            Operand::Weight => self.weight_double_buffer,
            Operand::Output => false,
        }
    }

    pub fn slots(&self, operand: Operand) -> u32 {
        if self.double_buffered(operand) {
            2
        } else {
            1
        }
    }

    pub fn l0_slots(&self) -> u32 {
        if self.l0_double_buffer {
            2
        } else {
            1
        }
    }
}

/// Level-1 loop counts as computed by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopCounts {
    pub batch: u32,
    pub m: u32,
    pub n: u32,
    pub k: u32,
}

/// Immutable per-invocation parameters produced by the tiling planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TilingPlan {
    pub shape: ConvShape,
    pub tiles: TileSizes,
    #[serde(default)]
    pub buffers: BufferConfig,
    pub order: IterationOrder,
    pub layout: LayoutMode,
    pub activation_format: SourceFormat,
    #[serde(default)]
    pub pad_value: PadValue,
    #[serde(default = "default_element_bytes")]
    pub element_bytes: u32,
    pub loop_counts: LoopCounts,
}

fn default_element_bytes() -> u32 {
    2
}

impl TilingPlan {
    pub fn builder(shape: ConvShape) -> PlanBuilder {
        PlanBuilder::new(shape)
    }

    /// Saturates at `u32::MAX`; Init rejects such plans.
    pub fn m_total(&self) -> u32 {
        self.shape.out_h().saturating_mul(self.shape.out_w())
    }

    pub fn n_total(&self) -> u32 {
        self.shape.out_channels
    }

    /// Channels each kernel tap contributes to the reduction.
    pub fn reduction_channels(&self, limits: &HardwareLimits) -> u32 {
        match self.layout {
            LayoutMode::SmallChannelPack => limits.small_channel_width,
            _ => self.shape.in_channels,
        }
    }

    pub fn k_total(&self, limits: &HardwareLimits) -> u32 {
        self.reduction_channels(limits).saturating_mul(self.shape.taps())
    }

    /// Loop counts implied by the shape and tile sizes.
    pub fn derived_loop_counts(&self, limits: &HardwareLimits) -> LoopCounts {
        LoopCounts {
            batch: self.shape.batch,
            m: count(self.m_total(), self.tiles.m.l1),
            n: count(self.n_total(), self.tiles.n.l1),
            k: count(self.k_total(limits), self.tiles.k.l1),
        }
    }
}

fn count(total: u32, tile: u32) -> u32 {
    if tile == 0 {
        0
    } else {
        ceil_div(total, tile)
    }
}

impl fmt::Display for TilingPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.shape;
        write!(
            f,
            "conv n{} c{} {}x{} -> k{} {}x{} (kernel {}x{}, stride {}x{}) tiles m{}/{} n{}/{} k{}/{} {:?} {:?}",
            s.batch,
            s.in_channels,
            s.in_h,
            s.in_w,
            s.out_channels,
            s.out_h(),
            s.out_w(),
            s.kernel_h,
            s.kernel_w,
            s.stride_h,
            s.stride_w,
            self.tiles.m.l1,
            self.tiles.m.l0,
            self.tiles.n.l1,
            self.tiles.n.l0,
            self.tiles.k.l1,
            self.tiles.k.l0,
            self.layout,
            self.order
        )
    }
}
