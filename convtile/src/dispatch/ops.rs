use std::fmt;

use crate::dispatch::trace::TraceEvent;
use crate::iteration::IterationState;
use crate::load::LoadTask;
use crate::sync::Engine;
use crate::timer::Timer;

/// One trigger of the hardware contraction on the current level-0 tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contraction {
    pub m: u32,
    pub n: u32,
    pub k: u32,
    /// `false` on the first reduction step: the accumulator is overwritten.
    pub accumulate: bool,
    pub l0_side: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOp {
    Load(LoadTask),
    Contract(Contraction),
}

impl EngineOp {
    pub fn as_load(&self) -> Option<&LoadTask> {
        match self {
            EngineOp::Load(task) => Some(task),
            EngineOp::Contract(_) => None,
        }
    }

    pub fn as_contraction(&self) -> Option<&Contraction> {
        match self {
            EngineOp::Contract(c) => Some(c),
            EngineOp::Load(_) => None,
        }
    }
}

impl fmt::Display for EngineOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineOp::Load(task) => write!(f, "{task}"),
            EngineOp::Contract(c) => write!(
                f,
                "mmad {}x{}x{}{} l0#{}",
                c.m,
                c.n,
                c.k,
                if c.accumulate { " +=" } else { "" },
                c.l0_side
            ),
        }
    }
}

/// Receives the ops an engine stream issues, in issue order.
pub trait OpSink {
    fn record(&mut self, state: &IterationState, op: EngineOp);
}

impl OpSink for Vec<EngineOp> {
    fn record(&mut self, _state: &IterationState, op: EngineOp) {
        self.push(op);
    }
}

/// Keeps every op and, when tracing, one `TraceEvent` per op.
#[derive(Debug, Clone)]
pub struct RecordingSink {
    engine: Engine,
    ops: Vec<EngineOp>,
    trace: Option<Vec<TraceEvent>>,
    timed: bool,
}

impl RecordingSink {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            ops: Vec::new(),
            trace: None,
            timed: false,
        }
    }

    pub fn with_trace(mut self) -> Self {
        self.trace = Some(Vec::new());
        self
    }

    /// Stamps trace events with the engine's running `Timer` lap.
    pub fn with_timer(mut self) -> Self {
        self.timed = true;
        self
    }

    pub fn engine(&self) -> Engine {
        self.engine
    }

    pub fn ops(&self) -> &[EngineOp] {
        &self.ops
    }

    pub fn trace(&self) -> &[TraceEvent] {
        self.trace.as_deref().unwrap_or(&[])
    }

    pub fn into_parts(self) -> (Vec<EngineOp>, Vec<TraceEvent>) {
        (self.ops, self.trace.unwrap_or_default())
    }
}

impl OpSink for RecordingSink {
    fn record(&mut self, state: &IterationState, op: EngineOp) {
        if let Some(trace) = self.trace.as_mut() {
            trace.push(TraceEvent::new(
                self.engine,
                state,
                &op,
                self.timed.then(|| Timer::lap(self.engine.id())).flatten(),
            ));
        }
        self.ops.push(op);
    }
}
