use crate::config::HardwareLimits;
use crate::error::PlanError;
use crate::load::BufferMap;
use crate::plan::{LayoutMode, LoopCounts, Operand, SourceFormat, TilingPlan};

fn nonzero(dim: &'static str, value: u32) -> Result<(), PlanError> {
    if value == 0 {
        return Err(PlanError::ZeroDimension { dim });
    }
    Ok(())
}

fn check_shape(plan: &TilingPlan) -> Result<(), PlanError> {
    let s = &plan.shape;
    nonzero("batch", s.batch)?;
    nonzero("in_channels", s.in_channels)?;
    nonzero("in_h", s.in_h)?;
    nonzero("in_w", s.in_w)?;
    nonzero("out_channels", s.out_channels)?;
    nonzero("kernel_h", s.kernel_h)?;
    nonzero("kernel_w", s.kernel_w)?;
    nonzero("stride_h", s.stride_h)?;
    nonzero("stride_w", s.stride_w)?;
    nonzero("dilation_h", s.dilation_h)?;
    nonzero("dilation_w", s.dilation_w)?;
    nonzero("element_bytes", plan.element_bytes)?;
    if s.out_h() == 0 {
        return Err(PlanError::EmptyOutput { dim: "out_h" });
    }
    if s.out_w() == 0 {
        return Err(PlanError::EmptyOutput { dim: "out_w" });
    }
    Ok(())
}

fn check_tiles(plan: &TilingPlan) -> Result<(), PlanError> {
    let tiles = [
        ("m", plan.tiles.m),
        ("n", plan.tiles.n),
        ("k", plan.tiles.k),
    ];
    for (dim, tile) in tiles {
        if tile.l1 == 0 || tile.l0 == 0 {
            return Err(PlanError::ZeroDimension { dim });
        }
        if tile.l0 > tile.l1 {
            return Err(PlanError::TileNesting {
                dim,
                l1: tile.l1,
                l0: tile.l0,
            });
        }
    }
    Ok(())
}

fn fits_u32(quantity: &'static str, value: Option<u32>) -> Result<u32, PlanError> {
    value.ok_or(PlanError::Overflow { quantity })
}

fn aligned(quantity: &'static str, value: u32, align: u32) -> Result<u32, PlanError> {
    if align == 0 {
        return Ok(value);
    }
    fits_u32(quantity, value.div_ceil(align).checked_mul(align))
}

/// Every extent the driver and the load strategies derive in `u32`,
/// including its block-aligned form, must fit without wrapping.
fn check_extents(plan: &TilingPlan, limits: &HardwareLimits) -> Result<(), PlanError> {
    let s = &plan.shape;
    let block = limits.block_size;
    fits_u32(
        "padded in_h",
        s.in_h.checked_add(s.pad_top).and_then(|v| v.checked_add(s.pad_bottom)),
    )?;
    fits_u32(
        "padded in_w",
        s.in_w.checked_add(s.pad_left).and_then(|v| v.checked_add(s.pad_right)),
    )?;
    let out_h = fits_u32("out_h", s.checked_out_h())?;
    let out_w = fits_u32("out_w", s.checked_out_w())?;
    let m_total = fits_u32("m", out_h.checked_mul(out_w))?;
    let taps = fits_u32("taps", s.kernel_h.checked_mul(s.kernel_w))?;
    let k_total = fits_u32("k", plan.reduction_channels(limits).checked_mul(taps))?;
    aligned("m", m_total, block)?;
    aligned("n", s.out_channels, block)?;
    aligned("k", k_total, block)?;
    aligned("in_channels", s.in_channels, block)?;
    aligned("m tile", plan.tiles.m.l1, block)?;
    aligned("n tile", plan.tiles.n.l1, block)?;
    aligned("k tile", plan.tiles.k.l1, block)?;
    Ok(())
}

fn check_layout(plan: &TilingPlan, limits: &HardwareLimits) -> Result<(), PlanError> {
    if !plan.layout.supports(plan.order) {
        return Err(PlanError::OrderingMismatch {
            order: plan.order,
            layout: plan.layout,
        });
    }
    if plan.layout == LayoutMode::GatherWithPadding
        && plan.activation_format != SourceFormat::SpatialMajor
    {
        return Err(PlanError::UnsupportedFormat {
            layout: plan.layout,
            format: plan.activation_format,
        });
    }
    if plan.layout == LayoutMode::SmallChannelPack
        && plan.shape.in_channels > limits.small_channel_width
    {
        return Err(PlanError::SmallChannelOverflow {
            channels: plan.shape.in_channels,
            width: limits.small_channel_width,
        });
    }
    Ok(())
}

fn check_loop_counts(planned: LoopCounts, derived: LoopCounts) -> Result<(), PlanError> {
    let pairs = [
        ("batch", planned.batch, derived.batch),
        ("m", planned.m, derived.m),
        ("n", planned.n, derived.n),
        ("k", planned.k, derived.k),
    ];
    for (dim, planned, derived) in pairs {
        if planned == 0 {
            return Err(PlanError::DegenerateLoopCount { dim });
        }
        if planned != derived {
            return Err(PlanError::LoopCountMismatch {
                dim,
                planned,
                derived,
            });
        }
    }
    Ok(())
}

fn warn_idle_double_buffer(plan: &TilingPlan, derived: LoopCounts) {
    let refills = |operand: Operand| match operand {
        Operand::Activation => derived.batch as u64 * derived.m as u64 * derived.k as u64,
        Operand::Weight => derived.n as u64 * derived.k as u64,
        Operand::Output => 0,
    };
    for operand in Operand::ALL {
        if plan.buffers.double_buffered(operand) && refills(operand) <= 1 {
            crate::warning!(
                "{} is double buffered but filled at most once; second slot stays idle",
                operand
            );
        }
    }
}

/// Checks every plan contract the iteration driver relies on.
pub(crate) fn validate_plan(plan: &TilingPlan, limits: &HardwareLimits) -> Result<(), PlanError> {
    check_shape(plan)?;
    check_tiles(plan)?;
    check_extents(plan, limits)?;
    check_layout(plan, limits)?;
    let derived = plan.derived_loop_counts(limits);
    check_loop_counts(plan.loop_counts, derived)?;
    BufferMap::derive(plan, limits).check(plan, limits)?;
    warn_idle_double_buffer(plan, derived);
    Ok(())
}
