#![allow(dead_code)]

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use convtile::{
    BufferSlot, ConvShape, DispatchReport, Dispatcher, HardwareLimits, IterationDriver,
    IterationOrder, IterationState, LayoutMode, LoadStrategy, LoadTask, Operand, PlanBuilder,
    SourceFormat, TileStep, TilingPlan,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const SWEEP_SEED: u64 = 0x5eed_c0de;

pub fn limits() -> HardwareLimits {
    HardwareLimits::default()
}

/// Unit-stride convolution without padding.
pub fn conv(
    batch: u32,
    in_channels: u32,
    in_h: u32,
    in_w: u32,
    out_channels: u32,
    kernel: u32,
) -> ConvShape {
    ConvShape {
        batch,
        in_channels,
        in_h,
        in_w,
        out_channels,
        kernel_h: kernel,
        kernel_w: kernel,
        stride_h: 1,
        stride_w: 1,
        dilation_h: 1,
        dilation_w: 1,
        pad_top: 0,
        pad_bottom: 0,
        pad_left: 0,
        pad_right: 0,
    }
}

pub fn padded(mut shape: ConvShape, pad: u32) -> ConvShape {
    shape.pad_top = pad;
    shape.pad_bottom = pad;
    shape.pad_left = pad;
    shape.pad_right = pad;
    shape
}

pub fn builder(shape: ConvShape) -> PlanBuilder {
    TilingPlan::builder(shape)
}

pub fn walk(plan: &TilingPlan) -> Result<Vec<TileStep>> {
    Ok(IterationDriver::init(plan, &limits())?.collect())
}

pub fn first_state(plan: &TilingPlan) -> Result<IterationState> {
    let mut driver = IterationDriver::init(plan, &limits())?;
    driver
        .step()
        .map(|step| step.state)
        .ok_or_else(|| anyhow!("plan yields no steps"))
}

pub fn slot(operand: Operand) -> BufferSlot {
    BufferSlot {
        operand,
        side: 0,
        base: 0,
        first_use: true,
        fill: 0,
    }
}

pub fn strategy(plan: &TilingPlan) -> LoadStrategy {
    LoadStrategy::for_plan(Arc::new(plan.clone()), limits())
}

pub fn first_fill(plan: &TilingPlan, operand: Operand) -> Result<Vec<LoadTask>> {
    let state = first_state(plan)?;
    Ok(strategy(plan).load(operand, &state, &slot(operand), 0))
}

pub fn dispatch(plan: TilingPlan) -> Result<DispatchReport> {
    Dispatcher::new(plan, limits())?.run()
}

pub fn temp_path(name: &str) -> PathBuf {
    env::temp_dir().join(format!("convtile-{}-{}", std::process::id(), name))
}

pub fn sweep_rng() -> StdRng {
    StdRng::seed_from_u64(SWEEP_SEED)
}

fn pick<T: Copy>(rng: &mut StdRng, items: &[T]) -> T {
    items[rng.gen_range(0..items.len())]
}

/// Small direct-layout plan with random shape, tiles and buffering.
pub fn random_plan(rng: &mut StdRng) -> TilingPlan {
    let in_h = rng.gen_range(1..=12);
    let in_w = rng.gen_range(1..=12);
    let kernel = rng.gen_range(1..=in_h.min(in_w).min(3));
    let shape = padded(
        conv(
            rng.gen_range(1..=3),
            rng.gen_range(1..=40),
            in_h,
            in_w,
            rng.gen_range(1..=40),
            kernel,
        ),
        rng.gen_range(0..=1),
    );
    let split = |rng: &mut StdRng, l1s: &[u32]| {
        let l1 = pick(rng, l1s);
        let l0 = pick(rng, &[8, 16, 32, 64]).min(l1);
        (l1, l0)
    };
    let (m1, m0) = split(rng, &[8, 16, 32, 64]);
    let (n1, n0) = split(rng, &[8, 16, 32]);
    let (k1, k0) = split(rng, &[16, 32, 48]);
    let order = pick(rng, &[IterationOrder::RowFirst, IterationOrder::ColumnFirst]);
    let format = pick(rng, &[SourceFormat::ChannelMajor, SourceFormat::SpatialMajor]);
    builder(shape)
        .m_tiles(m1, m0)
        .n_tiles(n1, n0)
        .k_tiles(k1, k0)
        .double_buffer(rng.gen_bool(0.5), rng.gen_bool(0.5))
        .l0_double_buffer(rng.gen_bool(0.5))
        .order(order)
        .layout(LayoutMode::Direct)
        .activation_format(format)
        .build(&limits())
}
