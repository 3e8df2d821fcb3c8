use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

mod generated {
    include!(concat!(env!("OUT_DIR"), "/hw_config.rs"));
}

/// Capacities and granularities of the target core.
///
/// Defaults come from `settings.json` at build time; a JSON document with the
/// same keys may override any subset of them at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareLimits {
    /// Fractal edge of the contraction unit, in elements.
    pub block_size: u32,
    /// Channel count the small-channel pack widens every pixel to.
    pub small_channel_width: u32,
    pub element_bytes: u32,
    pub accumulator_element_bytes: u32,
    pub staging_bytes: u64,
    pub near_compute_a_bytes: u64,
    pub near_compute_b_bytes: u64,
    pub accumulator_bytes: u64,
    pub vector_scratch_bytes: u64,
}

impl Default for HardwareLimits {
    fn default() -> Self {
        Self {
            block_size: generated::BLOCK_SIZE as u32,
            small_channel_width: generated::SMALL_CHANNEL_WIDTH as u32,
            element_bytes: generated::ELEMENT_BYTES as u32,
            accumulator_element_bytes: generated::ACCUMULATOR_ELEMENT_BYTES as u32,
            staging_bytes: generated::STAGING_BYTES,
            near_compute_a_bytes: generated::NEAR_COMPUTE_A_BYTES,
            near_compute_b_bytes: generated::NEAR_COMPUTE_B_BYTES,
            accumulator_bytes: generated::ACCUMULATOR_BYTES,
            vector_scratch_bytes: generated::VECTOR_SCRATCH_BYTES,
        }
    }
}

impl HardwareLimits {
    pub fn from_json(value: Value) -> Result<Self> {
        serde_json::from_value(value).with_context(|| "parse hardware limits")
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text).with_context(|| "parse hardware limits")?;
        Self::from_json(value)
    }

    /// Rounds `value` up to the contraction block.
    pub fn align_block(&self, value: u32) -> u32 {
        align_up(value, self.block_size)
    }

    pub(crate) fn elements(&self, bytes: u64, element_bytes: u32) -> u64 {
        bytes / element_bytes.max(1) as u64
    }
}

pub(crate) fn ceil_div(value: u32, divisor: u32) -> u32 {
    value.div_ceil(divisor)
}

pub(crate) fn align_up(value: u32, align: u32) -> u32 {
    if align == 0 {
        return value;
    }
    ceil_div(value, align) * align
}

pub(crate) fn align_down(value: u64, align: u64) -> u64 {
    if align == 0 {
        return value;
    }
    value / align * align
}
