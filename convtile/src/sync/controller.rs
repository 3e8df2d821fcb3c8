use std::fmt;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use crate::plan::Operand;
use crate::sync::token::{Engine, SyncToken, TOKEN_COUNT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SyncAction {
    SignalReady,
    WaitReady,
    SignalConsumed,
    WaitConsumed,
    AcquireForFill,
    Publish,
    AcquireForRead,
    Release,
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncAction::SignalReady => "SignalReady",
            SyncAction::WaitReady => "WaitReady",
            SyncAction::SignalConsumed => "SignalConsumed",
            SyncAction::WaitConsumed => "WaitConsumed",
            SyncAction::AcquireForFill => "AcquireForFill",
            SyncAction::Publish => "Publish",
            SyncAction::AcquireForRead => "AcquireForRead",
            SyncAction::Release => "Release",
        };
        write!(f, "{name}")
    }
}

/// One entry of the ordered handshake log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncRecord {
    pub seq: u64,
    pub engine: Engine,
    pub action: SyncAction,
    pub token: SyncToken,
    pub operand: Operand,
    pub side: u8,
    /// Per-operand fill number the action belongs to.
    pub fill: u64,
}

/// Fill identity attached to a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRef {
    pub operand: Operand,
    pub side: u8,
    pub fill: u64,
}

struct Handshake {
    tx: SyncSender<()>,
    rx: Mutex<Receiver<()>>,
}

impl Handshake {
    fn new() -> Self {
        let (tx, rx) = mpsc::sync_channel(1);
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    fn signal(&self) {
        if self.tx.send(()).is_err() {
            crate::critical!("handshake channel closed while signalling");
        }
    }

    fn wait(&self) {
        let rx = self.rx.lock().unwrap_or_else(PoisonError::into_inner);
        if rx.recv().is_err() {
            crate::critical!("handshake channel closed while waiting");
        }
    }
}

/// Ready and consumed channels for every token, shared by both engines.
///
/// Signals are logged before they are sent and waits after they return, so a
/// wait never precedes its matching signal in [`SyncController::records`].
pub struct SyncController {
    ready: Vec<Handshake>,
    consumed: Vec<Handshake>,
    log: Mutex<Vec<SyncRecord>>,
}

impl fmt::Debug for SyncController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncController")
            .field("tokens", &self.ready.len())
            .finish()
    }
}

impl Default for SyncController {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncController {
    pub fn new() -> Self {
        Self {
            ready: (0..TOKEN_COUNT).map(|_| Handshake::new()).collect(),
            consumed: (0..TOKEN_COUNT).map(|_| Handshake::new()).collect(),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Vector engine: the slot named by `token` holds a complete fill.
    pub fn signal_ready(&self, engine: Engine, token: SyncToken, slot: SlotRef) {
        self.note(engine, SyncAction::SignalReady, token, slot);
        self.ready[token.slot_index()].signal();
    }

    /// Matrix engine: blocks until the slot named by `token` is filled.
    pub fn wait_ready(&self, engine: Engine, token: SyncToken, slot: SlotRef) {
        self.ready[token.slot_index()].wait();
        self.note(engine, SyncAction::WaitReady, token, slot);
    }

    /// Matrix engine: the slot named by `token` may be overwritten.
    pub fn signal_consumed(&self, engine: Engine, token: SyncToken, slot: SlotRef) {
        self.note(engine, SyncAction::SignalConsumed, token, slot);
        self.consumed[token.slot_index()].signal();
    }

    /// Vector engine: blocks until the previous occupant of the slot is read.
    pub fn wait_consumed(&self, engine: Engine, token: SyncToken, slot: SlotRef) {
        self.consumed[token.slot_index()].wait();
        self.note(engine, SyncAction::WaitConsumed, token, slot);
    }

    pub fn note(&self, engine: Engine, action: SyncAction, token: SyncToken, slot: SlotRef) {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        let seq = log.len() as u64;
        crate::sync_trace!(
            "{seq} {engine} {action} {token} fill {} side {}",
            slot.fill,
            slot.side
        );
        log.push(SyncRecord {
            seq,
            engine,
            action,
            token,
            operand: slot.operand,
            side: slot.side,
            fill: slot.fill,
        });
    }

    pub fn records(&self) -> Vec<SyncRecord> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
