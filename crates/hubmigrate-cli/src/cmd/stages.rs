use crate::output::{print_json, print_table};
use hubmigrate_core::workflow::{self, StageScope};

pub fn run(json: bool) -> anyhow::Result<()> {
    let workflows = workflow::all();
    if json {
        return print_json(&workflows);
    }

    for (i, wf) in workflows.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("{} (ledger key: {})", wf.name, wf.ledger().key());
        let rows = wf
            .stages
            .iter()
            .map(|stage| {
                let operations: Vec<String> = stage
                    .operations
                    .iter()
                    .map(|op| match op.fleet {
                        Some(fleet) => format!("{} (fleet: {fleet})", op.name),
                        None => op.name.to_string(),
                    })
                    .collect();
                vec![
                    stage.index.to_string(),
                    stage.name.to_string(),
                    match stage.scope {
                        StageScope::Target => "target".to_string(),
                        StageScope::FanOut => "fan-out".to_string(),
                    },
                    if stage.requires_confirmation { "yes" } else { "" }.to_string(),
                    operations.join(", "),
                ]
            })
            .collect();
        print_table(&["#", "STAGE", "SCOPE", "CONFIRM", "OPERATIONS"], rows);
    }
    Ok(())
}
