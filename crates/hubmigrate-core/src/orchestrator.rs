//! Top-level workflow driver: find the resume point, then push every
//! remaining stage through the gate in order.

use crate::error::Result;
use crate::gate::{GateLoop, StageReport};
use crate::target::TargetContext;
use crate::workflow::Workflow;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub workflow: String,
    pub target: String,
    /// Index of the first stage this run executed (or `total` if none).
    pub resumed_from: usize,
    pub total: usize,
    /// Stages passed during this run.
    pub stages: Vec<StageReport>,
}

impl RunSummary {
    pub fn was_already_complete(&self) -> bool {
        self.stages.is_empty() && self.resumed_from == self.total
    }
}

pub struct Orchestrator<'a> {
    gate: GateLoop<'a>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(gate: GateLoop<'a>) -> Self {
        Self { gate }
    }

    /// Run `workflow` on `target` from its resume point to the end.
    /// `restart` resets the ledger first. Stops at the first `Err`; every
    /// stage passed before that stays recorded.
    pub fn run(
        &mut self,
        workflow: &Workflow,
        target: &mut TargetContext,
        restart: bool,
    ) -> Result<RunSummary> {
        workflow.validate()?;
        let ledger = workflow.ledger();
        let total = workflow.len();

        if restart {
            ledger.reset(target)?;
            self.gate.operator().notify(&format!(
                "Restarting {} on {} from the first stage",
                workflow.name,
                target.alias()
            ));
        }

        let start = workflow.resume_point(ledger.current_stage(target)?)?;
        let mut summary = RunSummary {
            workflow: workflow.name.to_string(),
            target: target.alias().to_string(),
            resumed_from: start,
            total,
            stages: Vec::new(),
        };

        if start == total {
            self.gate.operator().notify(&format!(
                "{} on {} is already complete ({total}/{total} stages)",
                workflow.name,
                target.alias()
            ));
            return Ok(summary);
        }
        if start > 0 {
            self.gate.operator().notify(&format!(
                "Resuming {} on {} at stage {}/{total}",
                workflow.name,
                target.alias(),
                start + 1
            ));
        }

        for stage in &workflow.stages[start..] {
            self.gate.operator().notify(&format!(
                "[{}/{total}] {}: {}",
                stage.index + 1,
                stage.name,
                stage.description
            ));
            tracing::info!(
                workflow = workflow.name,
                alias = target.alias(),
                stage = stage.name,
                index = stage.index,
                "stage started"
            );
            let report = self.gate.run_stage(workflow, stage, target)?;
            summary.stages.push(report);
        }

        self.gate.operator().notify(&format!(
            "{} on {} complete",
            workflow.name,
            target.alias()
        ));
        Ok(summary)
    }
}
