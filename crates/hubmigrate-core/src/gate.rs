//! The per-stage gate: run, judge, then advance or wait for the operator.
//!
//! ```text
//! Pending ──▶ Running ──▶ Advanced
//!    ▲           │
//!    └── AwaitingOperator(reason)
//! ```
//!
//! Operator-recoverable failures (non-zero exit, error envelope, orphaned
//! entities) loop through `AwaitingOperator` without bound. Engine faults
//! leave the loop immediately as `Err`.

use crate::envelope::{scan_output, EnvelopeCodec, OutputLine, OutputScan};
use crate::error::{MigrateError, Result};
use crate::fanout::{scan_orphans, OrphanScan};
use crate::invoker::OperationInvoker;
use crate::target::{PlatformKind, TargetContext, TargetResolver};
use crate::workflow::{StageDescriptor, StageScope, Workflow};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Operator
// ---------------------------------------------------------------------------

/// The human at the console.
pub trait Operator {
    /// Pass through a line of operation output. `source` names the fleet
    /// member it came from, if any.
    fn echo(&mut self, source: Option<&str>, line: &str);
    fn notify(&mut self, message: &str);
    fn warn(&mut self, message: &str);
    fn report_error(&mut self, message: &str);
    /// Yes/no question. `Err` only when no answer can be read.
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
    /// Block until the operator says to go on.
    fn acknowledge(&mut self, prompt: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// GateState / StageOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    Pending,
    Running,
    AwaitingOperator { reason: String },
    Advanced,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Passed,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub index: usize,
    pub name: String,
    /// Runs needed to pass, 1 when the first run passed.
    pub attempts: u32,
}

// ---------------------------------------------------------------------------
// GateLoop
// ---------------------------------------------------------------------------

pub struct GateLoop<'a> {
    invoker: &'a dyn OperationInvoker,
    codec: &'a dyn EnvelopeCodec,
    resolver: &'a dyn TargetResolver,
    operator: &'a mut dyn Operator,
}

impl<'a> GateLoop<'a> {
    pub fn new(
        invoker: &'a dyn OperationInvoker,
        codec: &'a dyn EnvelopeCodec,
        resolver: &'a dyn TargetResolver,
        operator: &'a mut dyn Operator,
    ) -> Self {
        Self {
            invoker,
            codec,
            resolver,
            operator,
        }
    }

    pub fn operator(&mut self) -> &mut dyn Operator {
        &mut *self.operator
    }

    /// Drive `stage` until it passes, then record it on the ledger.
    pub fn run_stage(
        &mut self,
        workflow: &Workflow,
        stage: &StageDescriptor,
        target: &mut TargetContext,
    ) -> Result<StageReport> {
        if stage.requires_confirmation {
            let prompt = format!(
                "Stage '{}' on {}: {}. Continue?",
                stage.name,
                target.alias(),
                stage.description
            );
            if !self.operator.confirm(&prompt)? {
                return Err(MigrateError::OperatorDeclined(stage.name.to_string()));
            }
        }

        let mut attempts = 0u32;
        let mut state = GateState::Pending;
        loop {
            tracing::debug!(workflow = workflow.name, stage = stage.name, ?state, "gate");
            state = match state {
                GateState::Pending => GateState::Running,
                GateState::Running => {
                    attempts += 1;
                    match self.attempt(stage, target)? {
                        StageOutcome::Passed => GateState::Advanced,
                        StageOutcome::Failed { reason } => GateState::AwaitingOperator { reason },
                    }
                }
                GateState::AwaitingOperator { reason } => {
                    tracing::info!(stage = stage.name, attempts, %reason, "stage failed");
                    self.operator
                        .report_error(&format!("Stage '{}' failed: {reason}", stage.name));
                    self.operator.acknowledge(&format!(
                        "Fix the problem, then press Enter to retry '{}'",
                        stage.name
                    ))?;
                    GateState::Pending
                }
                GateState::Advanced => {
                    workflow.ledger().advance(target, stage.index + 1)?;
                    return Ok(StageReport {
                        index: stage.index,
                        name: stage.name.to_string(),
                        attempts,
                    });
                }
            };
        }
    }

    fn attempt(&mut self, stage: &StageDescriptor, target: &TargetContext) -> Result<StageOutcome> {
        match stage.scope {
            StageScope::Target => self.run_on_target(stage, target),
            StageScope::FanOut => self.run_fan_out(stage, target),
        }
    }

    /// Operations run in order; the first failing one ends the attempt.
    fn run_on_target(&mut self, stage: &StageDescriptor, target: &TargetContext) -> Result<StageOutcome> {
        for op in stage.operations {
            let name = op.for_platform(target.platform());
            let result = self.invoker.invoke(name, Some(target), &op.invocation_args())?;
            let scan = scan_output(self.codec, &result.raw_output);
            self.surface(None, &scan);

            if !result.succeeded() {
                return Ok(StageOutcome::Failed {
                    reason: format!("'{name}' exited with status {}", result.exit_status),
                });
            }
            let errors = scan.error_messages().count();
            if errors > 0 {
                return Ok(StageOutcome::Failed {
                    reason: format!("'{name}' reported {errors} error(s)"),
                });
            }
        }
        Ok(StageOutcome::Passed)
    }

    fn run_fan_out(&mut self, stage: &StageDescriptor, target: &TargetContext) -> Result<StageOutcome> {
        let Some(op) = stage.operations.first() else {
            return Ok(StageOutcome::Passed);
        };
        let members = self.resolver.members(target)?;
        let name = op.for_platform(PlatformKind::Site);
        let scan = scan_orphans(
            self.invoker,
            self.codec,
            name,
            &members,
            &op.invocation_args(),
        )?;
        report_orphan_scan(&mut *self.operator, &scan);
        Ok(judge_orphan_scan(name, &scan))
    }

    fn surface(&mut self, source: Option<&str>, scan: &OutputScan) {
        surface_output(&mut *self.operator, source, scan);
    }
}

/// Echo text lines and report error envelopes, in output order.
pub fn surface_output(operator: &mut dyn Operator, source: Option<&str>, scan: &OutputScan) {
    for line in &scan.lines {
        match line {
            OutputLine::Text(text) => operator.echo(source, text),
            OutputLine::Envelope(env) => {
                if let Some(message) = env.error_message() {
                    match source {
                        Some(alias) => operator.report_error(&format!("{alias}: {message}")),
                        None => operator.report_error(message),
                    }
                }
            }
        }
    }
}

/// Show every member's output and the under-reporting warnings.
pub fn report_member_output(operator: &mut dyn Operator, scan: &OrphanScan) {
    for member in &scan.members {
        surface_output(operator, Some(&member.alias), &member.output);
    }
    for (alias, reason) in scan.unparseable_members() {
        operator.warn(&format!(
            "{alias}: result could not be read ({reason}); it counts as an empty list, \
             so no entity can be reported as orphaned fleet-wide"
        ));
    }
}

/// [`report_member_output`], then the orphaned entities.
pub fn report_orphan_scan(operator: &mut dyn Operator, scan: &OrphanScan) {
    report_member_output(operator, scan);
    if scan.orphans.is_empty() {
        operator.notify(&format!(
            "No entity is orphaned on all {} member(s)",
            scan.members.len()
        ));
    } else {
        operator.notify(&format!(
            "{} entit(ies) orphaned on all {} member(s):",
            scan.orphans.len(),
            scan.members.len()
        ));
        for orphan in &scan.orphans {
            operator.notify(&format!("  {}", orphan.label()));
        }
    }
}

fn judge_orphan_scan(operation: &str, scan: &OrphanScan) -> StageOutcome {
    if let Some(reason) = scan.member_fault(operation) {
        return StageOutcome::Failed { reason };
    }
    if !scan.orphans.is_empty() {
        return StageOutcome::Failed {
            reason: format!(
                "{} orphaned entit(ies) must be removed first",
                scan.orphans.len()
            ),
        };
    }
    StageOutcome::Passed
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
