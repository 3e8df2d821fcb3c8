use thiserror::Error;

use crate::plan::{IterationOrder, LayoutMode, SourceFormat};

/// Plan contract violations. All of them are detected before the first step
/// and abort the invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("dimension `{dim}` has zero size")]
    ZeroDimension { dim: &'static str },

    #[error("convolution produces an empty output along `{dim}`")]
    EmptyOutput { dim: &'static str },

    #[error("level-0 tile of `{dim}` ({l0}) exceeds its level-1 tile ({l1})")]
    TileNesting { dim: &'static str, l1: u32, l0: u32 },

    #[error("{order:?} iteration is not supported by the {layout:?} address composition")]
    OrderingMismatch {
        order: IterationOrder,
        layout: LayoutMode,
    },

    #[error("{layout:?} cannot read a {format:?} activation")]
    UnsupportedFormat {
        layout: LayoutMode,
        format: SourceFormat,
    },

    #[error("small-channel pack holds at most {width} channels, plan has {channels}")]
    SmallChannelOverflow { channels: u32, width: u32 },

    #[error("`{quantity}` overflows the 32-bit index range")]
    Overflow { quantity: &'static str },

    #[error("planned loop count for `{dim}` is zero")]
    DegenerateLoopCount { dim: &'static str },

    #[error("planned loop count for `{dim}` is {planned}, tiling derives {derived}")]
    LoopCountMismatch {
        dim: &'static str,
        planned: u32,
        derived: u32,
    },

    #[error("{buffer} needs {required} bytes, only {available} available")]
    CapacityExceeded {
        buffer: &'static str,
        required: u64,
        available: u64,
    },

    #[error("invalid plan magic")]
    BadMagic,

    #[error("unsupported plan version {0}")]
    UnsupportedVersion(u32),

    #[error("plan record truncated: need {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("plan field `{field}` has invalid value {value}")]
    InvalidField { field: &'static str, value: u32 },
}
