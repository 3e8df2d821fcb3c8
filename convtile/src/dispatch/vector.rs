use std::sync::Arc;

use anyhow::Result;

use crate::config::HardwareLimits;
use crate::dispatch::ops::{EngineOp, OpSink};
use crate::iteration::IterationDriver;
use crate::load::LoadStrategy;
use crate::plan::{Operand, TilingPlan};
use crate::sync::{BufferSlotManager, Engine, SyncController};

/// Producer stream: staging fills for every refill the driver reports.
/// Returns the number of steps walked.
pub fn run_vector_stream(
    plan: Arc<TilingPlan>,
    limits: HardwareLimits,
    sync: Arc<SyncController>,
    sink: &mut dyn OpSink,
) -> Result<u64> {
    let driver = IterationDriver::init(&plan, &limits)?;
    let strategy = LoadStrategy::for_plan(Arc::clone(&plan), limits);
    let mut slots = BufferSlotManager::new(Engine::Vector, &plan, strategy.context().map, sync);
    let mut steps = 0u64;

    for step in driver {
        for operand in Operand::ALL {
            if !step.refill.get(operand) {
                continue;
            }
            let slot = slots.acquire_for_fill(operand);
            for task in strategy.load(operand, &step.state, &slot, slot.fill) {
                sink.record(&step.state, EngineOp::Load(task));
            }
            slots.publish_and_toggle(operand);
        }
        steps += 1;
    }

    slots.drain();
    crate::trace!("vector stream finished after {steps} steps");
    Ok(steps)
}
