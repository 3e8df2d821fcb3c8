pub mod logging;

mod config;
mod dispatch;
mod error;
mod iteration;
mod load;
mod plan;
mod sync;
mod timer;

pub use config::HardwareLimits;
pub use dispatch::{
    format_step_line, join_engines, run_matrix_stream, run_vector_stream, Contraction,
    DispatchReport, Dispatcher, EngineOp, EngineReport, OpSink, RecordingSink, TraceEvent,
    TraceEventKind,
};
pub use error::PlanError;
pub use iteration::{
    AxisBounds, DerivedBounds, IterationDriver, IterationState, Level, LevelIndex, NestedBounds,
    Refill, TileStep,
};
pub use load::{
    clip_axis, direct_window, row_segments, tap_span, AxisClip, BufferMap, DirectLoad,
    DirectWindow, EdgePad, GatherIndex, GatherPitch, GatherWithPadding, LoadContext, LoadStrategy,
    LoadTask, MemoryLevel, RowSegment, SmallChannelPack, StridePattern, TapSpan, TapWindow,
    TransferKind, WeightOnChipTranspose,
};
pub use plan::{
    decode_plan, encode_plan, BufferConfig, ConvShape, IterationOrder, LayoutMode, LoopCounts,
    Operand, PadValue, PlanBuilder, PlanDeserialize, PlanLoader, PlanSerialize, RawPlan,
    ReductionOrder, SourceFormat, TileShape, TileSizes, TilingPlan, PLAN_MAGIC, PLAN_VERSION,
};
pub use sync::{
    BufferSlot, BufferSlotManager, Engine, EnginePair, SlotRef, SyncAction, SyncController,
    SyncRecord, SyncToken, TokenPolicy,
};
pub use timer::Timer;
