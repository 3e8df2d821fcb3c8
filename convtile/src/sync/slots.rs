use std::sync::Arc;

use crate::load::BufferMap;
use crate::plan::{Operand, TilingPlan};
use crate::sync::controller::{SlotRef, SyncAction, SyncController};
use crate::sync::token::{Engine, SyncToken, TokenPolicy};

/// A staging-buffer region handed to a producer or consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSlot {
    pub operand: Operand,
    /// Ping/pong side, 0 or 1.
    pub side: u8,
    /// Element offset of the region in the staging buffer.
    pub base: u64,
    /// No earlier fill has used this side, so nothing has to drain first.
    pub first_use: bool,
    /// Fill number of the operand this slot holds.
    pub fill: u64,
}

impl BufferSlot {
    fn slot_ref(&self) -> SlotRef {
        SlotRef {
            operand: self.operand,
            side: self.side,
            fill: self.fill,
        }
    }
}

#[derive(Debug, Clone)]
struct OperandSlots {
    operand: Operand,
    sides: u8,
    policy: TokenPolicy,
    next_side: u8,
    used: [bool; 2],
    fills: u64,
    held: Option<BufferSlot>,
}

impl OperandSlots {
    fn new(plan: &TilingPlan, operand: Operand) -> Self {
        Self {
            operand,
            sides: plan.buffers.slots(operand) as u8,
            policy: TokenPolicy::for_operand(plan, operand),
            next_side: 0,
            used: [false; 2],
            fills: 0,
            held: None,
        }
    }

    fn token(&self, side: u8) -> SyncToken {
        SyncToken::for_slot(self.operand, side, self.policy)
    }

    fn advance(&mut self) {
        self.fills += 1;
        self.next_side = (self.next_side + 1) % self.sides;
    }
}

/// Per-engine view of the staging slots of both operands.
///
/// Each engine owns one manager and walks it in step order; the two managers
/// stay in agreement only through the handshakes in [`SyncController`].
#[derive(Debug)]
pub struct BufferSlotManager {
    engine: Engine,
    map: BufferMap,
    operands: [OperandSlots; 2],
    sync: Arc<SyncController>,
}

impl BufferSlotManager {
    pub fn new(
        engine: Engine,
        plan: &TilingPlan,
        map: BufferMap,
        sync: Arc<SyncController>,
    ) -> Self {
        Self {
            engine,
            map,
            operands: [
                OperandSlots::new(plan, Operand::Activation),
                OperandSlots::new(plan, Operand::Weight),
            ],
            sync,
        }
    }

    fn slots(&mut self, operand: Operand) -> &mut OperandSlots {
        &mut self.operands[operand.index()]
    }

    pub fn policy(&self, operand: Operand) -> TokenPolicy {
        self.operands[operand.index()].policy
    }

    /// Fills published (producer) or released (consumer) so far.
    pub fn fills(&self, operand: Operand) -> u64 {
        self.operands[operand.index()].fills
    }

    pub fn held(&self, operand: Operand) -> Option<BufferSlot> {
        self.operands[operand.index()].held
    }

    /// Producer: the slot the next fill of `operand` goes to. Waits until the
    /// previous occupant of that side has been consumed, except on the side's
    /// first use.
    pub fn acquire_for_fill(&mut self, operand: Operand) -> BufferSlot {
        let engine = self.engine;
        let base_map = self.map;
        let sync = Arc::clone(&self.sync);
        let slots = self.slots(operand);
        let side = slots.next_side;
        let slot = BufferSlot {
            operand,
            side,
            base: base_map.slot_base(operand, side),
            first_use: !slots.used[side as usize],
            fill: slots.fills,
        };
        let token = slots.token(side);
        if !slot.first_use {
            sync.wait_consumed(engine, token, slot.slot_ref());
        }
        slots.used[side as usize] = true;
        slots.held = Some(slot);
        sync.note(engine, SyncAction::AcquireForFill, token, slot.slot_ref());
        slot
    }

    /// Producer: marks the held slot ready, signals the consumer and flips to
    /// the other side.
    pub fn publish_and_toggle(&mut self, operand: Operand) -> Option<BufferSlot> {
        let engine = self.engine;
        let sync = Arc::clone(&self.sync);
        let slots = self.slots(operand);
        let slot = slots.held.take()?;
        let token = slots.token(slot.side);
        sync.note(engine, SyncAction::Publish, token, slot.slot_ref());
        sync.signal_ready(engine, token, slot.slot_ref());
        slots.advance();
        Some(slot)
    }

    /// Consumer: waits for the next fill of `operand` and holds its slot.
    pub fn acquire_for_read(&mut self, operand: Operand) -> BufferSlot {
        let engine = self.engine;
        let base_map = self.map;
        let sync = Arc::clone(&self.sync);
        let slots = self.slots(operand);
        let side = slots.next_side;
        let slot = BufferSlot {
            operand,
            side,
            base: base_map.slot_base(operand, side),
            first_use: !slots.used[side as usize],
            fill: slots.fills,
        };
        let token = slots.token(side);
        sync.wait_ready(engine, token, slot.slot_ref());
        slots.used[side as usize] = true;
        slots.held = Some(slot);
        sync.note(engine, SyncAction::AcquireForRead, token, slot.slot_ref());
        slot
    }

    /// Consumer: hands the held slot back to the producer.
    pub fn release(&mut self, operand: Operand) -> Option<BufferSlot> {
        let engine = self.engine;
        let sync = Arc::clone(&self.sync);
        let slots = self.slots(operand);
        let slot = slots.held.take()?;
        let token = slots.token(slot.side);
        sync.note(engine, SyncAction::Release, token, slot.slot_ref());
        sync.signal_consumed(engine, token, slot.slot_ref());
        slots.advance();
        Some(slot)
    }

    /// Producer: waits for the consumer to release the last fill of every
    /// side that was used. Leaves every handshake channel empty.
    pub fn drain(&mut self) {
        let engine = self.engine;
        let sync = Arc::clone(&self.sync);
        for slots in self.operands.iter_mut() {
            for side in 0..slots.sides {
                if !slots.used[side as usize] {
                    continue;
                }
                let outstanding = SlotRef {
                    operand: slots.operand,
                    side,
                    fill: last_fill_on_side(slots.fills, slots.sides, side),
                };
                sync.wait_consumed(engine, slots.token(side), outstanding);
                slots.used[side as usize] = false;
            }
        }
    }
}

/// Highest fill number below `fills` that landed on `side`.
fn last_fill_on_side(fills: u64, sides: u8, side: u8) -> u64 {
    let sides = sides as u64;
    let side = side as u64;
    let last = fills.saturating_sub(1);
    last.saturating_sub((last + sides - side) % sides)
}
