use crate::error::{MigrateError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const HUBMIGRATE_DIR: &str = ".hubmigrate";
pub const TARGETS_DIR: &str = ".hubmigrate/targets";
pub const CONFIG_FILE: &str = ".hubmigrate/config.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn hubmigrate_dir(root: &Path) -> PathBuf {
    root.join(HUBMIGRATE_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn targets_dir(root: &Path) -> PathBuf {
    root.join(TARGETS_DIR)
}

/// Per-target key/value store backing the stage ledger.
pub fn target_store_path(root: &Path, alias: &str) -> PathBuf {
    targets_dir(root).join(format!("{alias}.yaml"))
}

// ---------------------------------------------------------------------------
// Alias validation
// ---------------------------------------------------------------------------

static ALIAS_RE: OnceLock<Regex> = OnceLock::new();

fn alias_re() -> &'static Regex {
    ALIAS_RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9][a-z0-9\-.]*[a-z0-9]$|^[a-z0-9]$").expect("static alias regex")
    })
}

/// Target aliases become file names, so they are restricted to a safe charset.
pub fn validate_alias(alias: &str) -> Result<()> {
    if alias.is_empty()
        || alias.len() > 64
        || alias.contains("..")
        || !alias_re().is_match(alias)
    {
        return Err(MigrateError::InvalidAlias(alias.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_aliases() {
        for alias in ["prod-fleet", "a", "site-01", "acme.prod"] {
            validate_alias(alias).unwrap_or_else(|_| panic!("expected valid: {alias}"));
        }
    }

    #[test]
    fn invalid_aliases() {
        for alias in ["", "-dash", "dash-", "has space", "UPPER", "../etc", "a..b"] {
            assert!(validate_alias(alias).is_err(), "expected invalid: {alias}");
        }
    }

    #[test]
    fn path_helpers() {
        let root = Path::new("/tmp/proj");
        assert_eq!(
            config_path(root),
            PathBuf::from("/tmp/proj/.hubmigrate/config.yaml")
        );
        assert_eq!(
            target_store_path(root, "site-a"),
            PathBuf::from("/tmp/proj/.hubmigrate/targets/site-a.yaml")
        );
    }
}
