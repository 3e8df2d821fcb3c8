use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::HardwareLimits;
use crate::iteration::IterationDriver;
use crate::plan::TilingPlan;
use crate::sync::{Engine, SyncController, SyncRecord};
use crate::timer::Timer;

mod matrix;
mod ops;
mod trace;
mod vector;

pub use matrix::run_matrix_stream;
pub use ops::{Contraction, EngineOp, OpSink, RecordingSink};
pub use trace::{format_step_line, TraceEvent, TraceEventKind};
pub use vector::run_vector_stream;

/// What one engine did during an invocation.
#[derive(Debug, Clone)]
pub struct EngineReport {
    pub engine: Engine,
    pub ops: Vec<EngineOp>,
    pub trace: Vec<TraceEvent>,
    pub steps: u64,
    pub elapsed_ns: Option<u128>,
}

#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub invocation: Uuid,
    pub matrix: EngineReport,
    pub vector: EngineReport,
    pub sync_log: Vec<SyncRecord>,
}

impl DispatchReport {
    pub fn engine(&self, engine: Engine) -> &EngineReport {
        match engine {
            Engine::Matrix => &self.matrix,
            Engine::Vector => &self.vector,
        }
    }

    pub fn trace_json(&self) -> Value {
        json!({
            "invocation": self.invocation,
            "matrix": {
                "steps": self.matrix.steps,
                "trace": self.matrix.trace,
            },
            "vector": {
                "steps": self.vector.steps,
                "trace": self.vector.trace,
            },
            "sync": self.sync_log,
        })
    }

    pub fn trace_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.trace_json())?)
    }
}

/// Runs the matrix and vector streams of one convolution invocation on two
/// named threads that share nothing but a `SyncController`.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    plan: Arc<TilingPlan>,
    limits: HardwareLimits,
    trace_enabled: bool,
    timer_enabled: bool,
}

impl Dispatcher {
    /// Rejects the plan before any thread is started.
    pub fn new(plan: impl Into<Arc<TilingPlan>>, limits: HardwareLimits) -> Result<Self> {
        let plan = plan.into();
        if let Err(err) = IterationDriver::init(&plan, &limits) {
            crate::error!("plan rejected: {err}");
            return Err(err.into());
        }
        Ok(Self {
            plan,
            limits,
            trace_enabled: false,
            timer_enabled: false,
        })
    }

    pub fn with_trace(mut self) -> Self {
        self.trace_enabled = true;
        self
    }

    pub fn with_timer(mut self) -> Self {
        self.timer_enabled = true;
        self
    }

    pub fn plan(&self) -> &TilingPlan {
        &self.plan
    }

    pub fn run(&self) -> Result<DispatchReport> {
        let invocation = Uuid::new_v4();
        let sync = Arc::new(SyncController::new());
        crate::trace!("invocation {invocation}: {}", self.plan);

        let matrix = self.spawn(Engine::Matrix, "matrix-engine", Arc::clone(&sync))?;
        let vector = self.spawn(Engine::Vector, "vector-engine", Arc::clone(&sync))?;
        let (matrix, vector) = join_engines(matrix, vector)?;

        if matrix.steps != vector.steps {
            return Err(anyhow!(
                "engines walked different step counts: matrix {} vector {}",
                matrix.steps,
                vector.steps
            ));
        }
        Ok(DispatchReport {
            invocation,
            matrix,
            vector,
            sync_log: sync.records(),
        })
    }

    fn spawn(
        &self,
        engine: Engine,
        name: &str,
        sync: Arc<SyncController>,
    ) -> Result<thread::JoinHandle<Result<EngineReport>>> {
        let plan = Arc::clone(&self.plan);
        let limits = self.limits;
        let trace_enabled = self.trace_enabled;
        let timer_enabled = self.timer_enabled;
        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut sink = RecordingSink::new(engine);
                if trace_enabled {
                    sink = sink.with_trace();
                }
                if timer_enabled {
                    sink = sink.with_timer();
                    Timer::set_enabled(engine.id(), true);
                    Timer::start(engine.id());
                }
                let steps = match engine {
                    Engine::Matrix => run_matrix_stream(plan, limits, sync, &mut sink)?,
                    Engine::Vector => run_vector_stream(plan, limits, sync, &mut sink)?,
                };
                let elapsed_ns = if timer_enabled {
                    Timer::stop(engine.id());
                    Timer::elapsed(engine.id())
                } else {
                    None
                };
                let (ops, trace) = sink.into_parts();
                Ok(EngineReport {
                    engine,
                    ops,
                    trace,
                    steps,
                    elapsed_ns,
                })
            })
            .with_context(|| format!("spawn {name}"))
    }
}

/// Joins the matrix stream first. A failed consumer leaves the producer
/// blocked on the handshake, so its error is returned without waiting for
/// the vector thread, which is left detached.
pub fn join_engines(
    matrix: thread::JoinHandle<Result<EngineReport>>,
    vector: thread::JoinHandle<Result<EngineReport>>,
) -> Result<(EngineReport, EngineReport)> {
    let matrix = join(Engine::Matrix, matrix)?;
    let vector = join(Engine::Vector, vector)?;
    Ok((matrix, vector))
}

fn join(engine: Engine, handle: thread::JoinHandle<Result<EngineReport>>) -> Result<EngineReport> {
    match handle.join() {
        Ok(Ok(report)) => Ok(report),
        Ok(Err(err)) => {
            crate::error!("{engine} engine failed: {err:#}");
            Err(err.context(format!("{engine} engine failed")))
        }
        Err(_) => {
            crate::critical!("{engine} engine panicked");
            Err(anyhow!("{engine} engine panicked"))
        }
    }
}
