use anyhow::{Context, Result};
use serde_json::Value;

use crate::plan::TilingPlan;

pub struct PlanSerialize;

impl PlanSerialize {
    pub fn json(plan: &TilingPlan) -> Result<Value> {
        Ok(serde_json::to_value(plan)?)
    }

    pub fn json_string(plan: &TilingPlan) -> Result<String> {
        Ok(serde_json::to_string_pretty(plan)?)
    }
}

pub struct PlanDeserialize;

impl PlanDeserialize {
    pub fn from_json(value: Value) -> Result<TilingPlan> {
        serde_json::from_value(value).with_context(|| "decode tiling plan")
    }

    pub fn from_json_str(text: &str) -> Result<TilingPlan> {
        serde_json::from_str(text).with_context(|| "decode tiling plan")
    }
}
