use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use bytemuck::{Pod, Zeroable};
use memmap2::Mmap;

use crate::error::PlanError;
use crate::plan::{
    BufferConfig, ConvShape, IterationOrder, LayoutMode, LoopCounts, PadValue, SourceFormat,
    TileShape, TileSizes, TilingPlan,
};

pub const PLAN_MAGIC: &[u8; 4] = b"CTPL";
pub const PLAN_VERSION: u32 = 1;

const HEADER_SIZE: usize = 8;

const FLAG_ACTIVATION_DOUBLE: u32 = 1 << 0;
const FLAG_WEIGHT_DOUBLE: u32 = 1 << 1;
const FLAG_L0_DOUBLE: u32 = 1 << 2;

/// Fixed little-endian record that follows the `CTPL` header.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct RawPlan {
    pub batch: u32,
    pub in_channels: u32,
    pub in_h: u32,
    pub in_w: u32,
    pub out_channels: u32,
    pub kernel_h: u32,
    pub kernel_w: u32,
    pub stride_h: u32,
    pub stride_w: u32,
    pub dilation_h: u32,
    pub dilation_w: u32,
    pub pad_top: u32,
    pub pad_bottom: u32,
    pub pad_left: u32,
    pub pad_right: u32,
    pub m_l1: u32,
    pub m_l0: u32,
    pub n_l1: u32,
    pub n_l0: u32,
    pub k_l1: u32,
    pub k_l0: u32,
    pub loops_batch: u32,
    pub loops_m: u32,
    pub loops_n: u32,
    pub loops_k: u32,
    pub buffer_flags: u32,
    pub order: u32,
    pub layout: u32,
    pub activation_format: u32,
    pub element_bytes: u32,
    pub pad_kind: u32,
    pub pad_value: i32,
}

pub const RAW_PLAN_SIZE: usize = std::mem::size_of::<RawPlan>();

impl RawPlan {
    pub fn from_plan(plan: &TilingPlan) -> Self {
        let s = &plan.shape;
        let mut buffer_flags = 0;
        if plan.buffers.activation_double_buffer {
            buffer_flags |= FLAG_ACTIVATION_DOUBLE;
        }
        if plan.buffers.weight_double_buffer {
            buffer_flags |= FLAG_WEIGHT_DOUBLE;
        }
        if plan.buffers.l0_double_buffer {
            buffer_flags |= FLAG_L0_DOUBLE;
        }
        let (pad_kind, pad_value) = match plan.pad_value {
            PadValue::Zero => (0, 0),
            PadValue::Neutral(value) => (1, value),
        };
        Self {
            batch: s.batch,
            in_channels: s.in_channels,
            in_h: s.in_h,
            in_w: s.in_w,
            out_channels: s.out_channels,
            kernel_h: s.kernel_h,
            kernel_w: s.kernel_w,
            stride_h: s.stride_h,
            stride_w: s.stride_w,
            dilation_h: s.dilation_h,
            dilation_w: s.dilation_w,
            pad_top: s.pad_top,
            pad_bottom: s.pad_bottom,
            pad_left: s.pad_left,
            pad_right: s.pad_right,
            m_l1: plan.tiles.m.l1,
            m_l0: plan.tiles.m.l0,
            n_l1: plan.tiles.n.l1,
            n_l0: plan.tiles.n.l0,
            k_l1: plan.tiles.k.l1,
            k_l0: plan.tiles.k.l0,
            loops_batch: plan.loop_counts.batch,
            loops_m: plan.loop_counts.m,
            loops_n: plan.loop_counts.n,
            loops_k: plan.loop_counts.k,
            buffer_flags,
            order: match plan.order {
                IterationOrder::RowFirst => 0,
                IterationOrder::ColumnFirst => 1,
            },
            layout: match plan.layout {
                LayoutMode::Direct => 0,
                LayoutMode::GatherWithPadding => 1,
                LayoutMode::SmallChannelPack => 2,
                LayoutMode::WeightOnChipTranspose => 3,
            },
            activation_format: match plan.activation_format {
                SourceFormat::ChannelMajor => 0,
                SourceFormat::SpatialMajor => 1,
            },
            element_bytes: plan.element_bytes,
            pad_kind,
            pad_value,
        }
    }

    pub fn to_plan(&self) -> Result<TilingPlan, PlanError> {
        let order = match self.order {
            0 => IterationOrder::RowFirst,
            1 => IterationOrder::ColumnFirst,
            value => {
                return Err(PlanError::InvalidField {
                    field: "order",
                    value,
                })
            }
        };
        let layout = match self.layout {
            0 => LayoutMode::Direct,
            1 => LayoutMode::GatherWithPadding,
            2 => LayoutMode::SmallChannelPack,
            3 => LayoutMode::WeightOnChipTranspose,
            value => {
                return Err(PlanError::InvalidField {
                    field: "layout",
                    value,
                })
            }
        };
        let activation_format = match self.activation_format {
            0 => SourceFormat::ChannelMajor,
            1 => SourceFormat::SpatialMajor,
            value => {
                return Err(PlanError::InvalidField {
                    field: "activation_format",
                    value,
                })
            }
        };
        let pad_value = match self.pad_kind {
            0 => PadValue::Zero,
            1 => PadValue::Neutral(self.pad_value),
            value => {
                return Err(PlanError::InvalidField {
                    field: "pad_kind",
                    value,
                })
            }
        };
        let known = FLAG_ACTIVATION_DOUBLE | FLAG_WEIGHT_DOUBLE | FLAG_L0_DOUBLE;
        if self.buffer_flags & !known != 0 {
            return Err(PlanError::InvalidField {
                field: "buffer_flags",
                value: self.buffer_flags,
            });
        }
        Ok(TilingPlan {
            shape: ConvShape {
                batch: self.batch,
                in_channels: self.in_channels,
                in_h: self.in_h,
                in_w: self.in_w,
                out_channels: self.out_channels,
                kernel_h: self.kernel_h,
                kernel_w: self.kernel_w,
                stride_h: self.stride_h,
                stride_w: self.stride_w,
                dilation_h: self.dilation_h,
                dilation_w: self.dilation_w,
                pad_top: self.pad_top,
                pad_bottom: self.pad_bottom,
                pad_left: self.pad_left,
                pad_right: self.pad_right,
            },
            tiles: TileSizes {
                m: TileShape::new(self.m_l1, self.m_l0),
                n: TileShape::new(self.n_l1, self.n_l0),
                k: TileShape::new(self.k_l1, self.k_l0),
            },
            buffers: BufferConfig {
                activation_double_buffer: self.buffer_flags & FLAG_ACTIVATION_DOUBLE != 0,
                weight_double_buffer: self.buffer_flags & FLAG_WEIGHT_DOUBLE != 0,
                l0_double_buffer: self.buffer_flags & FLAG_L0_DOUBLE != 0,
            },
            order,
            layout,
            activation_format,
            pad_value,
            element_bytes: self.element_bytes,
            loop_counts: LoopCounts {
                batch: self.loops_batch,
                m: self.loops_m,
                n: self.loops_n,
                k: self.loops_k,
            },
        })
    }
}

/// Serializes `plan` into the `CTPL` binary form.
pub fn encode_plan(plan: &TilingPlan) -> Vec<u8> {
    let raw = RawPlan::from_plan(plan);
    let mut out = Vec::with_capacity(HEADER_SIZE + RAW_PLAN_SIZE);
    out.extend_from_slice(PLAN_MAGIC);
    out.extend_from_slice(&PLAN_VERSION.to_le_bytes());
    out.extend_from_slice(bytemuck::bytes_of(&raw));
    out
}

/// Parses a `CTPL` record. Trailing bytes are ignored.
pub fn decode_plan(data: &[u8]) -> Result<TilingPlan, PlanError> {
    let expected = HEADER_SIZE + RAW_PLAN_SIZE;
    if data.len() < HEADER_SIZE {
        return Err(PlanError::Truncated {
            expected,
            actual: data.len(),
        });
    }
    let mut cursor = 0usize;
    let magic = read_bytes(data, &mut cursor, PLAN_MAGIC.len())?;
    if magic != PLAN_MAGIC {
        return Err(PlanError::BadMagic);
    }
    let version = read_u32(data, &mut cursor)?;
    if version != PLAN_VERSION {
        return Err(PlanError::UnsupportedVersion(version));
    }
    let record = read_bytes(data, &mut cursor, RAW_PLAN_SIZE)?;
    let raw: RawPlan = bytemuck::pod_read_unaligned(record);
    raw.to_plan()
}

fn read_bytes<'a>(data: &'a [u8], cursor: &mut usize, len: usize) -> Result<&'a [u8], PlanError> {
    if *cursor + len > data.len() {
        return Err(PlanError::Truncated {
            expected: *cursor + len,
            actual: data.len(),
        });
    }
    let out = &data[*cursor..*cursor + len];
    *cursor += len;
    Ok(out)
}

fn read_u32(data: &[u8], cursor: &mut usize) -> Result<u32, PlanError> {
    let bytes = read_bytes(data, cursor, 4)?;
    let mut word = [0u8; 4];
    word.copy_from_slice(bytes);
    Ok(u32::from_le_bytes(word))
}

/// Memory-mapped plan file.
#[derive(Debug)]
pub struct PlanLoader {
    path: PathBuf,
    mmap: Mmap,
}

impl PlanLoader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).with_context(|| format!("open plan file {}", path.display()))?;
        let mmap = unsafe { Mmap::map(&file).with_context(|| "mmap plan file")? };
        if mmap.len() < HEADER_SIZE {
            return Err(anyhow!("file too small for CTPL header"));
        }
        Ok(Self { path, mmap })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn plan(&self) -> Result<TilingPlan> {
        decode_plan(&self.mmap[..]).with_context(|| format!("decode {}", self.path.display()))
    }

    pub fn write(path: impl AsRef<Path>, plan: &TilingPlan) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, encode_plan(plan))
            .with_context(|| format!("write plan file {}", path.display()))
    }
}
