use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::config::HardwareLimits;
use crate::dispatch::ops::{Contraction, EngineOp, OpSink};
use crate::iteration::IterationDriver;
use crate::load::LoadStrategy;
use crate::plan::{Operand, TilingPlan};
use crate::sync::{BufferSlotManager, Engine, SyncController};

/// Consumer stream: near-compute loads, contractions and write-backs.
///
/// Per step, every operand flagged for refill first hands its previous fill
/// back and then waits for the next one. Level-0 tiles alternate between the
/// near-compute halves when `l0_double_buffer` is set. Returns the number of
/// steps walked.
pub fn run_matrix_stream(
    plan: Arc<TilingPlan>,
    limits: HardwareLimits,
    sync: Arc<SyncController>,
    sink: &mut dyn OpSink,
) -> Result<u64> {
    let driver = IterationDriver::init(&plan, &limits)?;
    let strategy = LoadStrategy::for_plan(Arc::clone(&plan), limits);
    let mut slots = BufferSlotManager::new(Engine::Matrix, &plan, strategy.context().map, sync);
    let l0_sides = plan.buffers.l0_slots() as u8;
    let mut l0_side = 0u8;
    let mut steps = 0u64;

    for step in driver {
        for operand in Operand::ALL {
            if step.refill.get(operand) {
                slots.release(operand);
                slots.acquire_for_read(operand);
            }
        }
        for operand in Operand::ALL {
            let staging = slots
                .held(operand)
                .ok_or_else(|| anyhow!("no {operand} fill held at step {}", step.state.step))?;
            for task in strategy.load_near(operand, &step.state, &staging, l0_side) {
                sink.record(&step.state, EngineOp::Load(task));
            }
        }
        let state = &step.state;
        sink.record(
            state,
            EngineOp::Contract(Contraction {
                m: state.m_aligned(),
                n: state.n_aligned(),
                k: limits.align_block(state.k0.extent),
                accumulate: !step.first_k,
                l0_side,
            }),
        );
        if step.last_k {
            sink.record(state, EngineOp::Load(strategy.writeback(state)));
        }
        l0_side = (l0_side + 1) % l0_sides;
        steps += 1;
    }

    for operand in Operand::ALL {
        slots.release(operand);
    }
    crate::trace!("matrix stream finished after {steps} steps");
    Ok(steps)
}
