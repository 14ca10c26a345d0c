use crate::cmd::open_target;
use crate::output::{print_json, print_table};
use anyhow::Context;
use chrono::{DateTime, Utc};
use hubmigrate_core::target::TargetContext;
use hubmigrate_core::workflow::{self, Workflow};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct TargetStatus {
    target: String,
    platform: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    members: Vec<String>,
    workflows: Vec<WorkflowStatus>,
}

#[derive(Serialize)]
struct WorkflowStatus {
    workflow: &'static str,
    ledger_key: String,
    /// Raw ledger value; `None` when never started.
    recorded: Option<usize>,
    passed: usize,
    total: usize,
    next_stage: Option<&'static str>,
    updated_at: Option<DateTime<Utc>>,
    stages: Vec<StageStatus>,
}

#[derive(Serialize)]
struct StageStatus {
    index: usize,
    name: &'static str,
    state: &'static str,
}

pub fn run(root: &Path, alias: &str, json: bool) -> anyhow::Result<()> {
    let (_, _, target) = open_target(root, alias)?;

    let workflows = workflow::all()
        .into_iter()
        .map(|wf| workflow_status(wf, &target))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let status = TargetStatus {
        target: target.alias().to_string(),
        platform: target.platform().to_string(),
        members: target.members().to_vec(),
        workflows,
    };

    if json {
        return print_json(&status);
    }

    if status.members.is_empty() {
        println!("Target: {} ({})", status.target, status.platform);
    } else {
        println!(
            "Target: {} ({}: {})",
            status.target,
            status.platform,
            status.members.join(", ")
        );
    }
    for wf in &status.workflows {
        println!();
        let progress = match (wf.recorded, wf.next_stage) {
            (None, _) => "not started".to_string(),
            (Some(_), None) => "complete".to_string(),
            (Some(_), Some(next)) => format!("next: {next}"),
        };
        let updated = wf
            .updated_at
            .map(|t| format!(", updated {}", t.format("%Y-%m-%d %H:%M UTC")))
            .unwrap_or_default();
        println!(
            "{}: {}/{} stages passed, {progress}{updated}",
            wf.workflow, wf.passed, wf.total
        );
        let rows = wf
            .stages
            .iter()
            .map(|s| vec![s.index.to_string(), s.name.to_string(), s.state.to_string()])
            .collect();
        print_table(&["#", "STAGE", "STATUS"], rows);
    }
    Ok(())
}

fn workflow_status(wf: &Workflow, target: &TargetContext) -> anyhow::Result<WorkflowStatus> {
    let ledger = wf.ledger();
    let recorded = ledger
        .current_stage(target)
        .with_context(|| format!("failed to read {}", ledger.key()))?;
    let passed = wf.resume_point(recorded)?;
    let stages = wf
        .stages
        .iter()
        .map(|stage| StageStatus {
            index: stage.index,
            name: stage.name,
            state: match stage.index {
                i if i < passed => "done",
                i if i == passed => "next",
                _ => "pending",
            },
        })
        .collect();
    Ok(WorkflowStatus {
        workflow: wf.name,
        ledger_key: ledger.key().to_string(),
        recorded,
        passed,
        total: wf.len(),
        next_stage: wf.stage(passed).map(|s| s.name),
        updated_at: ledger.updated_at(target)?,
        stages,
    })
}
