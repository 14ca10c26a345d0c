use crate::error::{MigrateError, Result};
use crate::paths;
use crate::target::PlatformKind;
use crate::workflow;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// TargetDef
// ---------------------------------------------------------------------------

/// A deployment target: a single site, or a fleet of member sites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetDef {
    pub alias: String,
    pub platform: PlatformKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// OperationDef
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgSpec {
    pub name: String,
    #[serde(default)]
    pub required: bool,
}

/// An external executable the engine can invoke by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperationDef {
    /// Path relative to the project root (if it contains a `/`) or a
    /// program name looked up on `PATH`.
    pub command: String,
    #[serde(default)]
    pub description: String,
    /// Declared argument contract. Anything not listed is rejected.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<ArgSpec>,
    /// Arguments passed on every invocation.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub defaults: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub targets: Vec<TargetDef>,
    #[serde(default)]
    pub operations: BTreeMap<String, OperationDef>,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            version: 1,
            targets: Vec::new(),
            operations: BTreeMap::new(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(MigrateError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn target(&self, alias: &str) -> Option<&TargetDef> {
        self.targets.iter().find(|t| t.alias == alias)
    }

    /// The fleet that lists `alias` as a member, if any.
    pub fn fleet_of(&self, alias: &str) -> Option<&TargetDef> {
        self.targets
            .iter()
            .find(|t| t.platform == PlatformKind::Fleet && t.members.iter().any(|m| m == alias))
    }

    pub fn operation(&self, name: &str) -> Option<&OperationDef> {
        self.operations.get(name)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut seen = HashSet::new();

        for target in &self.targets {
            if paths::validate_alias(&target.alias).is_err() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("target alias '{}' is not a valid alias", target.alias),
                });
            }
            if !seen.insert(target.alias.as_str()) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("target alias '{}' is defined more than once", target.alias),
                });
            }
            match target.platform {
                PlatformKind::Fleet if target.members.is_empty() => {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Error,
                        message: format!("fleet '{}' has no members", target.alias),
                    });
                }
                PlatformKind::Site if !target.members.is_empty() => {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Warning,
                        message: format!(
                            "site '{}' lists members; members are only used by fleets",
                            target.alias
                        ),
                    });
                }
                _ => {}
            }
            for member in &target.members {
                if paths::validate_alias(member).is_err() {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Error,
                        message: format!(
                            "member '{}' of '{}' is not a valid alias",
                            member, target.alias
                        ),
                    });
                }
            }
        }

        for (name, op) in &self.operations {
            if op.command.trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("operation '{name}' has an empty command"),
                });
            }
            for key in op.defaults.keys() {
                if !op.args.iter().any(|a| &a.name == key) {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Warning,
                        message: format!(
                            "operation '{name}' has a default for undeclared argument '{key}'"
                        ),
                    });
                }
            }
        }

        // Every operation a workflow can reach must be declared.
        let mut missing: Vec<(&str, &str)> = Vec::new();
        for wf in workflow::all() {
            for stage in wf.stages {
                for op in stage.operations {
                    for name in op.names() {
                        let Some(def) = self.operations.get(name) else {
                            if !missing.iter().any(|(_, n)| *n == name) {
                                missing.push((wf.name, name));
                            }
                            continue;
                        };
                        for (arg, _) in op.args {
                            if !def.args.iter().any(|a| a.name == *arg) {
                                warnings.push(ConfigWarning {
                                    level: WarnLevel::Error,
                                    message: format!(
                                        "operation '{name}' must declare argument '{arg}' \
                                         (passed by stage '{}' of '{}')",
                                        stage.name, wf.name
                                    ),
                                });
                            }
                        }
                    }
                }
            }
        }
        for (wf, name) in missing {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!("operation '{name}' used by workflow '{wf}' is not configured"),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
