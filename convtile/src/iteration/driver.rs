use crate::config::HardwareLimits;
use crate::error::PlanError;
use crate::iteration::bounds::DerivedBounds;
use crate::iteration::state::IterationState;
use crate::plan::{validate_plan, Operand, TilingPlan};

/// Which staging buffers must be refilled before this step's contraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Refill {
    pub activation: bool,
    pub weight: bool,
}

impl Refill {
    pub fn get(&self, operand: Operand) -> bool {
        match operand {
            Operand::Activation => self.activation,
            Operand::Weight => self.weight,
            Operand::Output => false,
        }
    }

    fn between(prev: &IterationState, next: &IterationState) -> Self {
        let k_moved = prev.k1.index != next.k1.index;
        Self {
            activation: k_moved
                || prev.batch.index != next.batch.index
                || prev.m1.index != next.m1.index,
            weight: k_moved || prev.n1.index != next.n1.index,
        }
    }
}

/// One tile-ready event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileStep {
    pub state: IterationState,
    pub refill: Refill,
    /// First reduction step of the output tile: the accumulator starts fresh.
    pub first_k: bool,
    /// Last reduction step of the output tile: the accumulator is written back.
    pub last_k: bool,
}

/// Odometer over the tile nest of a plan.
#[derive(Debug, Clone)]
pub struct IterationDriver {
    bounds: DerivedBounds,
    state: IterationState,
    started: bool,
    exhausted: bool,
}

impl IterationDriver {
    pub fn init(plan: &TilingPlan, limits: &HardwareLimits) -> Result<Self, PlanError> {
        validate_plan(plan, limits)?;
        let bounds = DerivedBounds::derive(plan, limits);
        let state = IterationState::initial(&bounds);
        Ok(Self {
            bounds,
            state,
            started: false,
            exhausted: false,
        })
    }

    pub fn bounds(&self) -> &DerivedBounds {
        &self.bounds
    }

    pub fn state(&self) -> &IterationState {
        &self.state
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Yields the initial state first, then one advanced state per call.
    /// Returns `None` once the outermost active level overflows.
    pub fn step(&mut self) -> Option<TileStep> {
        if self.exhausted {
            return None;
        }
        if !self.started {
            self.started = true;
            return Some(self.tile_step(Refill {
                activation: true,
                weight: true,
            }));
        }
        let prev = self.state;
        if !self.advance() {
            self.exhausted = true;
            return None;
        }
        self.state.step = prev.step + 1;
        let refill = Refill::between(&prev, &self.state);
        Some(self.tile_step(refill))
    }

    fn tile_step(&self, refill: Refill) -> TileStep {
        TileStep {
            state: self.state,
            refill,
            first_k: self.state.is_first_k(),
            last_k: self.state.is_last_k(),
        }
    }

    fn advance(&mut self) -> bool {
        for &level in self.bounds.active.iter().rev() {
            let slot = self.state.level_mut(level);
            if slot.index < slot.max {
                slot.index += 1;
                self.state.refresh(&self.bounds);
                return true;
            }
            slot.index = 0;
        }
        self.state.refresh(&self.bounds);
        false
    }
}

impl Iterator for IterationDriver {
    type Item = TileStep;

    fn next(&mut self) -> Option<Self::Item> {
        self.step()
    }
}
