use std::fmt;

use serde::ser::{SerializeStruct, Serializer};

use crate::dispatch::EngineOp;
use crate::iteration::IterationState;
use crate::load::MemoryLevel;
use crate::plan::Operand;
use crate::sync::Engine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum TraceEventKind {
    StagingFill,
    NearLoad,
    Contract,
    Writeback,
}

impl fmt::Display for TraceEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEventKind::StagingFill => write!(f, "StagingFill"),
            TraceEventKind::NearLoad => write!(f, "NearLoad"),
            TraceEventKind::Contract => write!(f, "Contract"),
            TraceEventKind::Writeback => write!(f, "Writeback"),
        }
    }
}

impl TraceEventKind {
    pub fn of(op: &EngineOp) -> Self {
        match op {
            EngineOp::Contract(_) => TraceEventKind::Contract,
            EngineOp::Load(task) if task.operand == Operand::Output => TraceEventKind::Writeback,
            EngineOp::Load(task) if task.dst == MemoryLevel::NearCompute => {
                TraceEventKind::NearLoad
            }
            EngineOp::Load(_) => TraceEventKind::StagingFill,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TraceEvent {
    pub kind: TraceEventKind,
    pub engine: Engine,
    pub step: u64,
    pub operand: Option<Operand>,
    pub state_desc: String,
    pub op_desc: String,
    pub micros: String,
    pub micros_parts: [u64; 3],
}

impl TraceEvent {
    pub(crate) fn new(
        engine: Engine,
        state: &IterationState,
        op: &EngineOp,
        lap_ns: Option<u128>,
    ) -> Self {
        let (micros, micros_parts) = lap_ns
            .map(format_duration_ns)
            .unwrap_or_else(|| (String::new(), [0, 0, 0]));
        let operand = match op {
            EngineOp::Load(task) => Some(task.operand),
            EngineOp::Contract(_) => None,
        };
        Self {
            kind: TraceEventKind::of(op),
            engine,
            step: state.step,
            operand,
            state_desc: state.to_string(),
            op_desc: op.to_string(),
            micros,
            micros_parts,
        }
    }
}

pub(crate) fn format_duration_ns(ns: u128) -> (String, [u64; 3]) {
    let ms = (ns / 1_000_000) as u64;
    let rem_ms = (ns % 1_000_000) as u64;
    let us = rem_ms / 1_000;
    let ns = rem_ms % 1_000;
    (format!("{}ms {}us {}ns", ms, us, ns), [ms, us, ns])
}

pub fn format_step_line(event: &TraceEvent) -> String {
    if event.micros.is_empty() {
        format!(
            "{} [{}] {} -- {}",
            event.engine, event.kind, event.state_desc, event.op_desc
        )
    } else {
        format!(
            "{} [{}] {} -- {} -- ({})",
            event.engine, event.kind, event.state_desc, event.op_desc, event.micros
        )
    }
}

impl serde::Serialize for TraceEvent {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("TraceEvent", 7)?;
        state.serialize_field("engine", &self.engine)?;
        state.serialize_field("step", &self.step)?;
        state.serialize_field("kind", &self.kind)?;
        state.serialize_field("operand", &self.operand)?;
        state.serialize_field("state", &self.state_desc)?;
        state.serialize_field("op", &self.op_desc)?;
        state.serialize_field("micros", &self.micros_parts)?;
        state.end()
    }
}
