use crate::cmd::open_target;
use crate::operator::ConsoleOperator;
use crate::output::{print_json, print_table};
use anyhow::Context;
use hubmigrate_core::aggregate::MemberRecords;
use hubmigrate_core::envelope::JsonLineCodec;
use hubmigrate_core::fanout::scan_orphans;
use hubmigrate_core::gate::report_member_output;
use hubmigrate_core::invoker::RegistryInvoker;
use hubmigrate_core::script::ConfigRegistry;
use hubmigrate_core::target::{PlatformKind, TargetResolver};
use hubmigrate_core::workflow::LIST_ORPHANS;
use serde_json::{json, Value};
use std::path::Path;

/// Standalone orphaned-entity scan across a target's members.
pub fn run(root: &Path, alias: &str, json: bool) -> anyhow::Result<()> {
    let (config, resolver, target) = open_target(root, alias)?;
    let members = resolver
        .members(&target)
        .with_context(|| format!("failed to open the members of '{alias}'"))?;
    let invoker = RegistryInvoker::new(ConfigRegistry::new(root, config));
    let operation = LIST_ORPHANS.for_platform(PlatformKind::Site);

    let scan = scan_orphans(
        &invoker,
        &JsonLineCodec,
        operation,
        &members,
        &LIST_ORPHANS.invocation_args(),
    )?;

    let mut operator = ConsoleOperator::new(std::io::empty(), json);
    report_member_output(&mut operator, &scan);

    if json {
        let members: Vec<Value> = scan
            .members
            .iter()
            .map(|m| {
                let (entities, unparseable) = match &m.records {
                    MemberRecords::Parsed(records) => (Some(records.len()), None),
                    MemberRecords::Unparseable { reason } => (None, Some(reason.as_str())),
                };
                json!({
                    "alias": m.alias,
                    "exit_status": m.exit_status,
                    "entities": entities,
                    "unparseable": unparseable,
                })
            })
            .collect();
        print_json(&json!({
            "target": target.alias(),
            "operation": operation,
            "members": members,
            "orphans": scan.orphans,
        }))?;
    } else if scan.orphans.is_empty() {
        println!("No entity is orphaned on all {} member(s).", scan.members.len());
    } else {
        let rows = scan
            .orphans
            .iter()
            .map(|o| {
                let kind = o
                    .payload
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("-")
                    .to_string();
                let mut rest = o.payload.clone();
                rest.remove("type");
                let details = if rest.is_empty() {
                    String::new()
                } else {
                    Value::Object(rest).to_string()
                };
                vec![o.id.clone(), kind, details]
            })
            .collect();
        print_table(&["ID", "TYPE", "DETAILS"], rows);
    }

    if let Some(reason) = scan.member_fault(operation) {
        anyhow::bail!(reason);
    }
    Ok(())
}
