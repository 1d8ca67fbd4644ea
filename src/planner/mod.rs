//! Planner contract
//!
//! The planner turns a natural-language instruction into a raw JSON plan.
//! How it does that is outside the core; typically an LLM call. Raw output
//! must still pass structural validation before preflight accepts it.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Produces a raw plan document from an instruction.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, instruction: &str) -> Result<Value>;
}

/// Test double that replays canned plans in order.
#[derive(Debug, Default)]
pub struct ScriptedPlanner {
    responses: std::sync::Mutex<std::collections::VecDeque<Value>>,
}

impl ScriptedPlanner {
    pub fn new(responses: Vec<Value>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into()),
        }
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn plan(&self, _instruction: &str) -> Result<Value> {
        self.responses
            .lock()
            .map_err(|_| anyhow::anyhow!("scripted planner poisoned"))?
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("scripted planner exhausted"))
    }
}
