use anyhow::Context;
use hubmigrate_core::{config::Config, io, paths};
use std::path::Path;

pub fn run(root: &Path) -> anyhow::Result<()> {
    println!("Initializing hubmigrate in: {}", root.display());

    for dir in [paths::HUBMIGRATE_DIR, paths::TARGETS_DIR] {
        let p = root.join(dir);
        io::ensure_dir(&p).with_context(|| format!("failed to create {}", p.display()))?;
    }

    let config_path = paths::config_path(root);
    if !config_path.exists() {
        Config::new()
            .save(root)
            .context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
    } else {
        println!("  exists:  {}", paths::CONFIG_FILE);
    }

    println!();
    println!("Next: declare targets and operations in {}, then run 'hubmigrate config validate'.", paths::CONFIG_FILE);
    Ok(())
}
