use std::fmt;

use crate::config::align_up;
use crate::iteration::bounds::{AxisBounds, DerivedBounds, Level};

/// Position of one loop level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LevelIndex {
    pub index: u32,
    pub max: u32,
    /// Absolute element offset of the tile along its dimension.
    pub start: u32,
    pub extent: u32,
    pub tail: bool,
}

impl LevelIndex {
    fn at(bounds: &AxisBounds, index: u32, base: u32) -> Self {
        Self {
            index,
            max: bounds.max_index(),
            start: base + index * bounds.tile,
            extent: bounds.extent(index),
            tail: bounds.is_tail(index),
        }
    }

    pub fn end(&self) -> u32 {
        self.start + self.extent
    }
}

/// Counters of every loop level plus the values derived from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IterationState {
    pub step: u64,
    pub batch: LevelIndex,
    pub m1: LevelIndex,
    pub n1: LevelIndex,
    pub m0: LevelIndex,
    pub n0: LevelIndex,
    pub k1: LevelIndex,
    pub k0: LevelIndex,
    /// Filler positions appended to `m0` to reach the hardware block.
    pub m_pad_account: u32,
    /// Filler channels appended to `n0` to reach the hardware block.
    pub n_pad_account: u32,
}

impl IterationState {
    pub(crate) fn initial(bounds: &DerivedBounds) -> Self {
        let mut state = Self::default();
        state.refresh(bounds);
        state
    }

    pub fn level(&self, level: Level) -> &LevelIndex {
        match level {
            Level::Batch => &self.batch,
            Level::M1 => &self.m1,
            Level::N1 => &self.n1,
            Level::M0 => &self.m0,
            Level::N0 => &self.n0,
            Level::K1 => &self.k1,
            Level::K0 => &self.k0,
        }
    }

    pub(crate) fn level_mut(&mut self, level: Level) -> &mut LevelIndex {
        match level {
            Level::Batch => &mut self.batch,
            Level::M1 => &mut self.m1,
            Level::N1 => &mut self.n1,
            Level::M0 => &mut self.m0,
            Level::N0 => &mut self.n0,
            Level::K1 => &mut self.k1,
            Level::K0 => &mut self.k0,
        }
    }

    /// Recomputes bounds, extents and pad accounts from the current indices.
    pub(crate) fn refresh(&mut self, bounds: &DerivedBounds) {
        self.batch = LevelIndex::at(&bounds.batch, self.batch.index, 0);
        self.m1 = LevelIndex::at(&bounds.m.outer, self.m1.index, 0);
        self.n1 = LevelIndex::at(&bounds.n.outer, self.n1.index, 0);
        self.k1 = LevelIndex::at(&bounds.k.outer, self.k1.index, 0);
        self.m0 = LevelIndex::at(bounds.m.inner(self.m1.index), self.m0.index, self.m1.start);
        self.n0 = LevelIndex::at(bounds.n.inner(self.n1.index), self.n0.index, self.n1.start);
        self.k0 = LevelIndex::at(bounds.k.inner(self.k1.index), self.k0.index, self.k1.start);
        self.m_pad_account = align_up(self.m0.extent, bounds.block) - self.m0.extent;
        self.n_pad_account = align_up(self.n0.extent, bounds.block) - self.n0.extent;
    }

    /// `m0` extent realigned to the hardware block.
    pub fn m_aligned(&self) -> u32 {
        self.m0.extent + self.m_pad_account
    }

    pub fn n_aligned(&self) -> u32 {
        self.n0.extent + self.n_pad_account
    }

    pub fn is_first_k(&self) -> bool {
        self.k1.index == 0 && self.k0.index == 0
    }

    pub fn is_last_k(&self) -> bool {
        self.k1.index == self.k1.max && self.k0.index == self.k0.max
    }
}

impl fmt::Display for IterationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} b{} m{}.{}[{}] n{}.{}[{}] k{}.{}[{}]",
            self.step,
            self.batch.index,
            self.m1.index,
            self.m0.index,
            self.m0.extent,
            self.n1.index,
            self.n0.index,
            self.n0.extent,
            self.k1.index,
            self.k0.index,
            self.k0.extent
        )
    }
}
