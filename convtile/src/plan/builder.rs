use crate::config::HardwareLimits;
use crate::plan::{
    BufferConfig, ConvShape, IterationOrder, LayoutMode, LoopCounts, PadValue, SourceFormat,
    TileShape, TileSizes, TilingPlan,
};

/// Assembles a [`TilingPlan`] from hand-picked tile sizes and fills in the
/// loop counts a planner would have written.
#[derive(Debug, Clone)]
pub struct PlanBuilder {
    shape: ConvShape,
    tiles: TileSizes,
    buffers: BufferConfig,
    order: IterationOrder,
    layout: LayoutMode,
    activation_format: SourceFormat,
    pad_value: PadValue,
    element_bytes: u32,
    loop_counts: Option<LoopCounts>,
}

impl PlanBuilder {
    pub fn new(shape: ConvShape) -> Self {
        let tile = TileShape::new(16, 16);
        Self {
            shape,
            tiles: TileSizes {
                m: tile,
                n: tile,
                k: tile,
            },
            buffers: BufferConfig::default(),
            order: IterationOrder::RowFirst,
            layout: LayoutMode::Direct,
            activation_format: SourceFormat::ChannelMajor,
            pad_value: PadValue::Zero,
            element_bytes: 2,
            loop_counts: None,
        }
    }

    pub fn m_tiles(mut self, l1: u32, l0: u32) -> Self {
        self.tiles.m = TileShape::new(l1, l0);
        self
    }

    pub fn n_tiles(mut self, l1: u32, l0: u32) -> Self {
        self.tiles.n = TileShape::new(l1, l0);
        self
    }

    pub fn k_tiles(mut self, l1: u32, l0: u32) -> Self {
        self.tiles.k = TileShape::new(l1, l0);
        self
    }

    pub fn double_buffer(mut self, activation: bool, weight: bool) -> Self {
        self.buffers.activation_double_buffer = activation;
        self.buffers.weight_double_buffer = weight;
        self
    }

    pub fn l0_double_buffer(mut self, enabled: bool) -> Self {
        self.buffers.l0_double_buffer = enabled;
        self
    }

    pub fn order(mut self, order: IterationOrder) -> Self {
        self.order = order;
        self
    }

    pub fn layout(mut self, layout: LayoutMode) -> Self {
        self.layout = layout;
        self
    }

    pub fn activation_format(mut self, format: SourceFormat) -> Self {
        self.activation_format = format;
        self
    }

    pub fn pad_value(mut self, value: PadValue) -> Self {
        self.pad_value = value;
        self
    }

    pub fn element_bytes(mut self, bytes: u32) -> Self {
        self.element_bytes = bytes;
        self
    }

    /// Overrides the planner loop counts instead of deriving them.
    pub fn loop_counts(mut self, counts: LoopCounts) -> Self {
        self.loop_counts = Some(counts);
        self
    }

    pub fn build(self, limits: &HardwareLimits) -> TilingPlan {
        let mut plan = TilingPlan {
            shape: self.shape,
            tiles: self.tiles,
            buffers: self.buffers,
            order: self.order,
            layout: self.layout,
            activation_format: self.activation_format,
            pad_value: self.pad_value,
            element_bytes: self.element_bytes,
            loop_counts: LoopCounts {
                batch: 0,
                m: 0,
                n: 0,
                k: 0,
            },
        };
        plan.loop_counts = match self.loop_counts {
            Some(counts) => counts,
            None => plan.derived_loop_counts(limits),
        };
        plan
    }
}
