use crate::config::{align_down, align_up, HardwareLimits};
use crate::error::PlanError;
use crate::load::window::{direct_window, tap_span, weight_pitch, GatherPitch};
use crate::plan::{LayoutMode, Operand, TilingPlan};

/// Element offsets of every on-chip buffer an invocation touches.
///
/// Staging holds the activation slots first, then the weight slots. Slot
/// sizes are the largest fill any tile of the plan produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferMap {
    pub activation_slot: u64,
    pub weight_slot: u64,
    pub activation_slots: u32,
    pub weight_slots: u32,
    pub near_a_slot: u64,
    pub near_b_slot: u64,
    pub l0_slots: u32,
    /// Output channels the vector engine repacks per pass; zero when the
    /// layout does not use the vector scratch.
    pub vec_block_n: u32,
    /// Start of the repacked half of the vector scratch.
    pub scratch_packed_base: u64,
}

impl BufferMap {
    pub fn derive(plan: &TilingPlan, limits: &HardwareLimits) -> Self {
        let bytes = plan.element_bytes;
        let l0_slots = plan.buffers.l0_slots();
        let scratch_half = limits.elements(limits.vector_scratch_bytes, bytes) / 2;
        Self {
            activation_slot: activation_slot_elements(plan, limits),
            weight_slot: align_up(plan.tiles.k.l1, limits.block_size) as u64
                * weight_pitch(plan, limits) as u64,
            activation_slots: plan.buffers.slots(Operand::Activation),
            weight_slots: plan.buffers.slots(Operand::Weight),
            near_a_slot: limits.elements(limits.near_compute_a_bytes, bytes) / l0_slots as u64,
            near_b_slot: limits.elements(limits.near_compute_b_bytes, bytes) / l0_slots as u64,
            l0_slots,
            vec_block_n: vec_block_n(plan, limits, scratch_half),
            scratch_packed_base: scratch_half,
        }
    }

    pub fn slot_base(&self, operand: Operand, side: u8) -> u64 {
        match operand {
            Operand::Activation => side as u64 * self.activation_slot,
            Operand::Weight => {
                self.activation_slot * self.activation_slots as u64
                    + side as u64 * self.weight_slot
            }
            Operand::Output => 0,
        }
    }

    pub fn near_base(&self, operand: Operand, side: u8) -> u64 {
        match operand {
            Operand::Activation => side as u64 * self.near_a_slot,
            Operand::Weight => side as u64 * self.near_b_slot,
            Operand::Output => 0,
        }
    }

    pub fn staging_elements(&self) -> u64 {
        self.activation_slot * self.activation_slots as u64
            + self.weight_slot * self.weight_slots as u64
    }

    /// Rejects plans whose tiles do not fit the hardware buffers.
    pub fn check(&self, plan: &TilingPlan, limits: &HardwareLimits) -> Result<(), PlanError> {
        let bytes = plan.element_bytes as u64;
        let m0 = limits.align_block(plan.tiles.m.l0) as u64;
        let n0 = limits.align_block(plan.tiles.n.l0) as u64;
        let k0 = limits.align_block(plan.tiles.k.l0) as u64;
        fits("staging buffer", self.staging_elements() * bytes, limits.staging_bytes)?;
        fits(
            "near-compute activation buffer",
            m0 * k0 * bytes * self.l0_slots as u64,
            limits.near_compute_a_bytes,
        )?;
        fits(
            "near-compute weight buffer",
            k0 * n0 * bytes * self.l0_slots as u64,
            limits.near_compute_b_bytes,
        )?;
        fits(
            "accumulator",
            m0 * n0 * limits.accumulator_element_bytes as u64,
            limits.accumulator_bytes,
        )?;
        if uses_vector_scratch(plan.layout) && self.vec_block_n < limits.block_size {
            return Err(PlanError::CapacityExceeded {
                buffer: "vector scratch",
                required: 2 * scratch_row(plan, limits) * limits.block_size as u64 * bytes,
                available: limits.vector_scratch_bytes,
            });
        }
        Ok(())
    }
}

fn fits(buffer: &'static str, required: u64, available: u64) -> Result<(), PlanError> {
    if required > available {
        return Err(PlanError::CapacityExceeded {
            buffer,
            required,
            available,
        });
    }
    Ok(())
}

pub(crate) fn uses_vector_scratch(layout: LayoutMode) -> bool {
    matches!(
        layout,
        LayoutMode::SmallChannelPack | LayoutMode::WeightOnChipTranspose
    )
}

/// Scratch elements one output channel occupies in each scratch half.
fn scratch_row(plan: &TilingPlan, limits: &HardwareLimits) -> u64 {
    match plan.layout {
        LayoutMode::SmallChannelPack => {
            limits.align_block(limits.small_channel_width * plan.shape.taps()) as u64
        }
        _ => limits.align_block(plan.tiles.k.l1) as u64,
    }
}

fn vec_block_n(plan: &TilingPlan, limits: &HardwareLimits, scratch_half: u64) -> u32 {
    if !uses_vector_scratch(plan.layout) {
        return 0;
    }
    let row = scratch_row(plan, limits).max(1);
    let fit = align_down(scratch_half / row, limits.block_size as u64);
    fit.min(weight_pitch(plan, limits) as u64) as u32
}

fn tile_ranges(total: u32, tile: u32) -> impl Iterator<Item = (u32, u32)> {
    (0..total)
        .step_by(tile.max(1) as usize)
        .map(move |start| (start, tile.min(total - start)))
}

fn activation_slot_elements(plan: &TilingPlan, limits: &HardwareLimits) -> u64 {
    let m_total = plan.m_total();
    let k_total = plan.k_total(limits);
    let mut largest = 0u64;
    match plan.layout {
        LayoutMode::GatherWithPadding => {
            let pitch = GatherPitch::new(plan, limits);
            for (k_start, k_len) in tile_ranges(k_total, plan.tiles.k.l1) {
                let span = tap_span(plan.shape.in_channels, k_start, k_len);
                largest = largest.max(span.taps as u64 * pitch.tap_stride());
            }
        }
        _ => {
            for (m_start, m_len) in tile_ranges(m_total, plan.tiles.m.l1) {
                for (k_start, k_len) in tile_ranges(k_total, plan.tiles.k.l1) {
                    let window = direct_window(plan, limits, m_start, m_len, k_start, k_len);
                    largest = largest.max(window.elements());
                }
            }
        }
    }
    largest
}
