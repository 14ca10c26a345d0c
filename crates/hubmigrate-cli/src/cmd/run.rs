use crate::cmd::open_target;
use crate::operator::ConsoleOperator;
use crate::output::print_json;
use anyhow::Context;
use hubmigrate_core::envelope::JsonLineCodec;
use hubmigrate_core::gate::GateLoop;
use hubmigrate_core::invoker::RegistryInvoker;
use hubmigrate_core::orchestrator::Orchestrator;
use hubmigrate_core::script::ConfigRegistry;
use hubmigrate_core::workflow::Workflow;
use std::path::Path;

/// `hubmigrate migrate` / `hubmigrate upgrade`.
pub fn run(
    root: &Path,
    workflow: &Workflow,
    alias: &str,
    restart: bool,
    json: bool,
) -> anyhow::Result<()> {
    let (config, resolver, mut target) = open_target(root, alias)?;
    let invoker = RegistryInvoker::new(ConfigRegistry::new(root, config));
    let codec = JsonLineCodec;
    let mut operator = ConsoleOperator::new(std::io::stdin().lock(), json);

    let gate = GateLoop::new(&invoker, &codec, &resolver, &mut operator);
    let summary = Orchestrator::new(gate)
        .run(workflow, &mut target, restart)
        .with_context(|| format!("{} of '{alias}' stopped", workflow.name))?;

    if json {
        print_json(&summary)?;
    }
    Ok(())
}
