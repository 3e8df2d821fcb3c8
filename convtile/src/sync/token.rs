use std::fmt;

use serde::Serialize;

use crate::plan::{Operand, TilingPlan};

/// The two execution streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Engine {
    Matrix,
    Vector,
}

impl Engine {
    pub fn id(self) -> u32 {
        match self {
            Engine::Matrix => 0,
            Engine::Vector => 1,
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Engine::Matrix => write!(f, "matrix"),
            Engine::Vector => write!(f, "vector"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EnginePair {
    MatrixVector,
}

/// How an operand's slots map onto handshake channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TokenPolicy {
    /// Single-buffered: both sides collapse onto one discriminator and the two
    /// engines serialize on the only slot.
    Shared,
    /// Double-buffered: each side has its own discriminator.
    PerSlot,
}

impl TokenPolicy {
    pub fn for_operand(plan: &TilingPlan, operand: Operand) -> Self {
        if plan.buffers.double_buffered(operand) {
            TokenPolicy::PerSlot
        } else {
            TokenPolicy::Shared
        }
    }
}

/// Names one handshake channel between the engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SyncToken {
    pub pair: EnginePair,
    pub discriminator: u8,
}

/// Discriminators per operand; one per slot side.
const SIDES: u8 = 2;

pub(crate) const TOKEN_COUNT: usize = 2 * SIDES as usize;

impl SyncToken {
    pub fn for_slot(operand: Operand, side: u8, policy: TokenPolicy) -> Self {
        let side = match policy {
            TokenPolicy::Shared => 0,
            TokenPolicy::PerSlot => side % SIDES,
        };
        Self {
            pair: EnginePair::MatrixVector,
            discriminator: operand.index() as u8 * SIDES + side,
        }
    }

    pub fn operand(&self) -> Operand {
        if self.discriminator / SIDES == 0 {
            Operand::Activation
        } else {
            Operand::Weight
        }
    }

    pub fn side(&self) -> u8 {
        self.discriminator % SIDES
    }

    pub(crate) fn slot_index(&self) -> usize {
        self.discriminator as usize
    }
}

impl fmt::Display for SyncToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.operand(), self.side())
    }
}
