mod bounds;
mod driver;
mod state;

pub use bounds::{AxisBounds, DerivedBounds, Level, NestedBounds};
pub use driver::{IterationDriver, Refill, TileStep};
pub use state::{IterationState, LevelIndex};
