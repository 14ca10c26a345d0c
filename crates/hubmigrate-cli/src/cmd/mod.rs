pub mod config;
pub mod init;
pub mod orphans;
pub mod run;
pub mod stages;
pub mod status;

use anyhow::Context;
use hubmigrate_core::config::Config;
use hubmigrate_core::target::{FileTargetResolver, TargetContext, TargetResolver};
use std::path::Path;

/// Load the config and open `alias` against it.
pub(crate) fn open_target(
    root: &Path,
    alias: &str,
) -> anyhow::Result<(Config, FileTargetResolver, TargetContext)> {
    let config = Config::load(root).context("failed to load config")?;
    let resolver = FileTargetResolver::new(root, config.clone());
    let target = resolver
        .resolve(alias)
        .with_context(|| format!("failed to open target '{alias}'"))?;
    Ok((config, resolver, target))
}
