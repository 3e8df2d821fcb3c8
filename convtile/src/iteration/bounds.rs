use std::fmt;

use crate::config::{ceil_div, HardwareLimits};
use crate::plan::{IterationOrder, TileShape, TilingPlan};

/// One loop level of the tile nest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Batch,
    M1,
    N1,
    M0,
    N0,
    K1,
    K0,
}

impl Level {
    pub const ALL: [Level; 7] = [
        Level::Batch,
        Level::M1,
        Level::N1,
        Level::M0,
        Level::N0,
        Level::K1,
        Level::K0,
    ];

    /// Loop nest for `order`, outermost first.
    pub fn nest(order: IterationOrder) -> [Level; 7] {
        match order {
            IterationOrder::RowFirst => [
                Level::Batch,
                Level::N1,
                Level::M1,
                Level::N0,
                Level::M0,
                Level::K1,
                Level::K0,
            ],
            IterationOrder::ColumnFirst => [
                Level::Batch,
                Level::M1,
                Level::N1,
                Level::M0,
                Level::N0,
                Level::K1,
                Level::K0,
            ],
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Batch => "batch",
            Level::M1 => "m1",
            Level::N1 => "n1",
            Level::M0 => "m0",
            Level::N0 => "n0",
            Level::K1 => "k1",
            Level::K0 => "k0",
        };
        write!(f, "{name}")
    }
}

/// Loop count and tail of a single split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisBounds {
    pub total: u32,
    pub tile: u32,
    pub count: u32,
    pub tail_extent: u32,
}

impl AxisBounds {
    pub fn new(total: u32, tile: u32) -> Self {
        let count = ceil_div(total, tile);
        Self {
            total,
            tile,
            count,
            tail_extent: total - (count - 1) * tile,
        }
    }

    pub fn max_index(&self) -> u32 {
        self.count - 1
    }

    pub fn extent(&self, index: u32) -> u32 {
        if index == self.max_index() {
            self.tail_extent
        } else {
            self.tile
        }
    }

    pub fn has_tail(&self) -> bool {
        self.total % self.tile != 0
    }

    pub fn is_tail(&self, index: u32) -> bool {
        index == self.max_index() && self.has_tail()
    }
}

/// Level-1 split of a dimension and the level-0 split inside each level-1
/// tile. The inner split differs only for the level-1 tail, so both variants
/// are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NestedBounds {
    pub outer: AxisBounds,
    pub inner_full: AxisBounds,
    pub inner_tail: AxisBounds,
}

impl NestedBounds {
    pub fn new(total: u32, tile: TileShape) -> Self {
        let outer = AxisBounds::new(total, tile.l1);
        Self {
            outer,
            inner_full: AxisBounds::new(tile.l1, tile.l0),
            inner_tail: AxisBounds::new(outer.tail_extent, tile.l0),
        }
    }

    pub fn inner(&self, outer_index: u32) -> &AxisBounds {
        if outer_index == self.outer.max_index() {
            &self.inner_tail
        } else {
            &self.inner_full
        }
    }

    pub fn outer_collapsed(&self) -> bool {
        self.outer.count == 1
    }

    pub fn inner_collapsed(&self) -> bool {
        let tail_single = self.inner_tail.count == 1;
        if self.outer.count == 1 {
            tail_single
        } else {
            tail_single && self.inner_full.count == 1
        }
    }
}

/// Everything `IterationDriver::init` derives from a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedBounds {
    pub order: IterationOrder,
    pub batch: AxisBounds,
    pub m: NestedBounds,
    pub n: NestedBounds,
    pub k: NestedBounds,
    /// Levels the odometer advances, outermost first. Collapsed levels are
    /// left out.
    pub active: Vec<Level>,
    pub block: u32,
}

impl DerivedBounds {
    /// Assumes a validated plan.
    pub(crate) fn derive(plan: &TilingPlan, limits: &HardwareLimits) -> Self {
        let batch = AxisBounds::new(plan.shape.batch, 1);
        let m = NestedBounds::new(plan.m_total(), plan.tiles.m);
        let n = NestedBounds::new(plan.n_total(), plan.tiles.n);
        let k = NestedBounds::new(plan.k_total(limits), plan.tiles.k);
        let mut bounds = Self {
            order: plan.order,
            batch,
            m,
            n,
            k,
            active: Vec::new(),
            block: limits.block_size,
        };
        bounds.active = Level::nest(plan.order)
            .into_iter()
            .filter(|level| !bounds.is_collapsed(*level))
            .collect();
        bounds
    }

    pub fn is_collapsed(&self, level: Level) -> bool {
        match level {
            Level::Batch => self.batch.count == 1,
            Level::M1 => self.m.outer_collapsed(),
            Level::N1 => self.n.outer_collapsed(),
            Level::K1 => self.k.outer_collapsed(),
            Level::M0 => self.m.inner_collapsed(),
            Level::N0 => self.n.inner_collapsed(),
            Level::K0 => self.k.inner_collapsed(),
        }
    }

    /// Number of steps a full walk yields.
    pub fn total_steps(&self) -> u64 {
        let inner_sum = |dim: &NestedBounds| -> u64 {
            let full = (dim.outer.count - 1) as u64 * dim.inner_full.count as u64;
            full + dim.inner_tail.count as u64
        };
        self.batch.count as u64 * inner_sum(&self.m) * inner_sum(&self.n) * inner_sum(&self.k)
    }
}
