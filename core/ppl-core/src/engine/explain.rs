//! Explain output.

use super::plan::CompiledQuery;
use crate::error::PplResult;
use crate::ppl::planner::cost::{estimate_cost, estimated_rows};
use crate::ppl::planner::{COMMAND_PUSHDOWN, Cost, CostModel, PushdownDecision};
use serde::Serialize;

/// Push-down class of one pipeline command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandClass {
    pub command: &'static str,
    pub pushable: bool,
}

/// Compiled plans and push-down classification of a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explain {
    pub query: String,
    pub logical: String,
    pub physical: String,
    pub commands: Vec<CommandClass>,
    pub decisions: Vec<PushdownDecision>,
    pub cost: Cost,
    pub total_cost: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_rows: Option<f64>,
}

impl Explain {
    pub(crate) fn new(compiled: &CompiledQuery) -> Self {
        let commands = compiled
            .commands
            .iter()
            .map(|&command| CommandClass {
                command,
                pushable: COMMAND_PUSHDOWN
                    .iter()
                    .any(|&(name, pushable)| name == command && pushable),
            })
            .collect();
        let cost = estimate_cost(&compiled.logical);
        Self {
            query: compiled.text.clone(),
            logical: compiled.logical.display_indent(),
            physical: compiled.physical.display_indent(),
            commands,
            decisions: compiled.decisions.clone(),
            total_cost: cost.total(&CostModel::default()),
            cost,
            estimated_rows: estimated_rows(&compiled.logical),
        }
    }

    /// Operators that stayed on the coordinator.
    pub fn local_operators(&self) -> Vec<&str> {
        self.decisions
            .iter()
            .filter(|d| !d.pushed)
            .map(|d| d.operator.as_str())
            .collect()
    }

    pub fn to_json(&self) -> PplResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
