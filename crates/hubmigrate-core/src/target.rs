//! Target contexts: the deployment units a workflow acts on.
//!
//! A [`TargetContext`] pairs an alias and a [`PlatformKind`] with a
//! key/value [`ConfigStore`]. The engine reads and writes only its own
//! dotted keys (`migration.stage`, `upgrade.stage`, ...) on the store.

use crate::config::Config;
use crate::error::{MigrateError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// PlatformKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformKind {
    /// A single hosted site.
    Site,
    /// A group of sites migrated together.
    Fleet,
}

impl PlatformKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformKind::Site => "site",
            PlatformKind::Fleet => "fleet",
        }
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ConfigStore
// ---------------------------------------------------------------------------

/// Key/value configuration attached to a target.
///
/// `set` only stages a value; `save` makes every staged value durable.
/// Implementations must give read-your-writes within one process.
pub trait ConfigStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>>;
    fn set(&mut self, key: &str, value: Value) -> Result<()>;
    fn save(&mut self) -> Result<()>;
}

/// A YAML file of dotted keys, e.g. `.hubmigrate/targets/site-a.yaml`.
#[derive(Debug)]
pub struct FileStore {
    alias: String,
    path: PathBuf,
    values: BTreeMap<String, Value>,
}

impl FileStore {
    /// Open the store at `path`. A missing file is an empty store; an
    /// unreadable or corrupt one is an error.
    pub fn open(alias: &str, path: PathBuf) -> Result<Self> {
        let values = if path.exists() {
            let data = std::fs::read_to_string(&path).map_err(|e| store_error(alias, &path, e))?;
            if data.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_yaml::from_str(&data).map_err(|e| store_error(alias, &path, e))?
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            alias: alias.to_string(),
            path,
            values,
        })
    }
}

fn store_error(alias: &str, path: &Path, e: impl fmt::Display) -> MigrateError {
    MigrateError::StoreUnavailable {
        alias: alias.to_string(),
        reason: format!("{}: {e}", path.display()),
    }
}

impl ConfigStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        let data =
            serde_yaml::to_string(&self.values).map_err(|e| store_error(&self.alias, &self.path, e))?;
        crate::io::atomic_write(&self.path, data.as_bytes())
            .map_err(|e| store_error(&self.alias, &self.path, e))
    }
}

// ---------------------------------------------------------------------------
// TargetContext
// ---------------------------------------------------------------------------

pub struct TargetContext {
    alias: String,
    platform: PlatformKind,
    members: Vec<String>,
    store: Box<dyn ConfigStore>,
}

impl fmt::Debug for TargetContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetContext")
            .field("alias", &self.alias)
            .field("platform", &self.platform)
            .field("members", &self.members)
            .finish_non_exhaustive()
    }
}

impl TargetContext {
    pub fn new(
        alias: impl Into<String>,
        platform: PlatformKind,
        members: Vec<String>,
        store: Box<dyn ConfigStore>,
    ) -> Self {
        Self {
            alias: alias.into(),
            platform,
            members,
            store,
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn platform(&self) -> PlatformKind {
        self.platform
    }

    /// Member aliases. Empty for a site.
    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        self.store.get(key)
    }

    pub fn set(&mut self, key: &str, value: Value) -> Result<&mut Self> {
        self.store.set(key, value)?;
        Ok(self)
    }

    pub fn save(&mut self) -> Result<()> {
        self.store.save()
    }
}

// ---------------------------------------------------------------------------
// TargetResolver
// ---------------------------------------------------------------------------

pub trait TargetResolver {
    fn resolve(&self, alias: &str) -> Result<TargetContext>;

    /// Contexts for every member of `target`. A site is its own only member;
    /// a fleet without members is an error.
    fn members(&self, target: &TargetContext) -> Result<Vec<TargetContext>> {
        match target.platform() {
            PlatformKind::Fleet if target.members().is_empty() => {
                Err(MigrateError::EmptyFleet(target.alias().to_string()))
            }
            PlatformKind::Fleet => target.members().iter().map(|m| self.resolve(m)).collect(),
            PlatformKind::Site => Ok(vec![self.resolve(target.alias())?]),
        }
    }
}

/// Resolves aliases against `config.yaml`; stores live under
/// `.hubmigrate/targets/`.
pub struct FileTargetResolver {
    root: PathBuf,
    config: Config,
}

impl FileTargetResolver {
    pub fn new(root: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }
}

impl TargetResolver for FileTargetResolver {
    fn resolve(&self, alias: &str) -> Result<TargetContext> {
        paths::validate_alias(alias)?;
        let (platform, members) = if let Some(def) = self.config.target(alias) {
            (def.platform, def.members.clone())
        } else if self.config.fleet_of(alias).is_some() {
            (PlatformKind::Site, Vec::new())
        } else {
            return Err(MigrateError::TargetNotFound(alias.to_string()));
        };
        let store = FileStore::open(alias, paths::target_store_path(&self.root, alias))?;
        Ok(TargetContext::new(alias, platform, members, Box::new(store)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetDef;
    use serde_json::json;
    use tempfile::TempDir;

    fn config() -> Config {
        let mut cfg = Config::new();
        cfg.targets.push(TargetDef {
            alias: "prod-fleet".into(),
            platform: PlatformKind::Fleet,
            members: vec!["site-a".into(), "site-b".into()],
            description: None,
        });
        cfg.targets.push(TargetDef {
            alias: "marketing".into(),
            platform: PlatformKind::Site,
            members: Vec::new(),
            description: None,
        });
        cfg
    }

    #[test]
    fn file_store_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = paths::target_store_path(dir.path(), "site-a");
        let mut store = FileStore::open("site-a", path.clone()).unwrap();
        store.set("migration.stage", json!(3)).unwrap();
        assert_eq!(store.get("migration.stage").unwrap(), Some(json!(3)));
        store.save().unwrap();

        let reopened = FileStore::open("site-a", path).unwrap();
        assert_eq!(reopened.get("migration.stage").unwrap(), Some(json!(3)));
    }

    #[test]
    fn file_store_unsaved_values_are_lost() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.yaml");
        let mut store = FileStore::open("t", path.clone()).unwrap();
        store.set("upgrade.stage", json!(1)).unwrap();
        drop(store);
        let reopened = FileStore::open("t", path).unwrap();
        assert_eq!(reopened.get("upgrade.stage").unwrap(), None);
    }

    #[test]
    fn corrupt_store_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "- just\n- a list\n").unwrap();
        assert!(matches!(
            FileStore::open("bad", path),
            Err(MigrateError::StoreUnavailable { .. })
        ));
    }

    #[test]
    fn resolver_builds_fleet_and_members() {
        let dir = TempDir::new().unwrap();
        let resolver = FileTargetResolver::new(dir.path(), config());
        let fleet = resolver.resolve("prod-fleet").unwrap();
        assert_eq!(fleet.platform(), PlatformKind::Fleet);

        let members = resolver.members(&fleet).unwrap();
        let aliases: Vec<&str> = members.iter().map(|m| m.alias()).collect();
        assert_eq!(aliases, vec!["site-a", "site-b"]);
        assert!(members.iter().all(|m| m.platform() == PlatformKind::Site));
    }

    #[test]
    fn site_is_its_own_member() {
        let dir = TempDir::new().unwrap();
        let resolver = FileTargetResolver::new(dir.path(), config());
        let site = resolver.resolve("marketing").unwrap();
        let members = resolver.members(&site).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].alias(), "marketing");
    }

    #[test]
    fn unknown_alias_is_not_found() {
        let dir = TempDir::new().unwrap();
        let resolver = FileTargetResolver::new(dir.path(), config());
        assert!(matches!(
            resolver.resolve("nowhere"),
            Err(MigrateError::TargetNotFound(_))
        ));
        assert!(matches!(
            resolver.resolve("../escape"),
            Err(MigrateError::InvalidAlias(_))
        ));
    }
}
