//! Declarative stage tables.
//!
//! Each workflow is one ordered, fixed table of [`StageDescriptor`]s. Stage
//! indices, confirmation gates and operation references are declared here
//! once and iterated by the orchestrator; nothing else hard-codes a stage
//! number.

use crate::error::{MigrateError, Result};
use crate::invoker::Args;
use crate::ledger::StageLedger;
use crate::target::PlatformKind;
use serde::Serialize;

// ---------------------------------------------------------------------------
// OperationRef
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OperationRef {
    pub name: &'static str,
    /// Replacement operation when the target is a fleet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fleet: Option<&'static str>,
    /// Fixed arguments passed on every invocation from this stage.
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    pub args: &'static [(&'static str, &'static str)],
}

impl OperationRef {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            fleet: None,
            args: &[],
        }
    }

    pub const fn fleet(self, fleet: &'static str) -> Self {
        Self {
            fleet: Some(fleet),
            ..self
        }
    }

    pub const fn with_args(self, args: &'static [(&'static str, &'static str)]) -> Self {
        Self { args, ..self }
    }

    pub fn for_platform(&self, platform: PlatformKind) -> &'static str {
        match (platform, self.fleet) {
            (PlatformKind::Fleet, Some(fleet)) => fleet,
            _ => self.name,
        }
    }

    /// Every operation name this reference can select.
    pub fn names(&self) -> impl Iterator<Item = &'static str> {
        std::iter::once(self.name).chain(self.fleet)
    }

    pub fn invocation_args(&self) -> Args {
        self.args
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// StageDescriptor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageScope {
    /// Run against the target itself.
    Target,
    /// Run against every fleet member, join, then aggregate entity results.
    FanOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageDescriptor {
    pub index: usize,
    pub name: &'static str,
    pub description: &'static str,
    pub operations: &'static [OperationRef],
    pub scope: StageScope,
    /// Ask the operator before the stage runs.
    pub requires_confirmation: bool,
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Workflow {
    pub name: &'static str,
    /// Ledger keys live under `<ledger_prefix>.`
    pub ledger_prefix: &'static str,
    pub stages: &'static [StageDescriptor],
}

impl Workflow {
    pub fn ledger(&self) -> StageLedger {
        StageLedger::new(self.ledger_prefix)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage(&self, index: usize) -> Option<&'static StageDescriptor> {
        self.stages.get(index)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| MigrateError::InvalidWorkflow {
            workflow: self.name.to_string(),
            reason,
        };
        if self.stages.is_empty() {
            return Err(invalid("no stages".into()));
        }
        for (position, stage) in self.stages.iter().enumerate() {
            if stage.index != position {
                return Err(invalid(format!(
                    "stage '{}' has index {} at position {position}",
                    stage.name, stage.index
                )));
            }
            if stage.operations.is_empty() {
                return Err(invalid(format!("stage '{}' has no operations", stage.name)));
            }
            if stage.scope == StageScope::FanOut && stage.operations.len() != 1 {
                return Err(invalid(format!(
                    "fan-out stage '{}' must have exactly one operation",
                    stage.name
                )));
            }
        }
        Ok(())
    }

    /// First stage to run given the ledger value. `None` and `Some(0)` both
    /// start from the top; `Some(len)` means the workflow is complete.
    pub fn resume_point(&self, current: Option<usize>) -> Result<usize> {
        match current {
            None => Ok(0),
            Some(k) if k <= self.len() => Ok(k),
            Some(k) => Err(MigrateError::LedgerCorrupt {
                key: self.ledger().key().to_string(),
                value: format!("{k} (workflow has {} stages)", self.len()),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Stage tables
// ---------------------------------------------------------------------------

const CHECK_ENVIRONMENT: OperationRef = OperationRef::new("check-environment");
/// The fan-out scan shared by both workflows and `hubmigrate orphans`.
pub const LIST_ORPHANS: OperationRef = OperationRef::new("list-orphaned-entities");
const ENQUEUE_EXPORT: OperationRef = OperationRef::new("enqueue-export");

pub const MIGRATION: Workflow = Workflow {
    name: "migration",
    ledger_prefix: "migration",
    stages: &[
        StageDescriptor {
            index: 0,
            name: "preflight",
            description: "Verify credentials, module versions and site reachability",
            operations: &[CHECK_ENVIRONMENT],
            scope: StageScope::Target,
            requires_confirmation: false,
        },
        StageDescriptor {
            index: 1,
            name: "backup",
            description: "Snapshot the current subscription settings",
            operations: &[OperationRef::new("export-subscription")],
            scope: StageScope::Target,
            requires_confirmation: false,
        },
        StageDescriptor {
            index: 2,
            name: "orphan-scan",
            description: "Find entities orphaned on every member",
            operations: &[LIST_ORPHANS],
            scope: StageScope::FanOut,
            requires_confirmation: false,
        },
        StageDescriptor {
            index: 3,
            name: "purge",
            description: "Purge the subscription on the syndication service",
            operations: &[OperationRef::new("purge-subscription")],
            scope: StageScope::Target,
            requires_confirmation: true,
        },
        StageDescriptor {
            index: 4,
            name: "deploy-code",
            description: "Deploy the new integration code, then verify the module version",
            operations: &[OperationRef::new("verify-module-version").with_args(&[("expect", "2")])],
            scope: StageScope::Target,
            requires_confirmation: true,
        },
        StageDescriptor {
            index: 5,
            name: "enable-modules",
            description: "Enable the new integration modules",
            operations: &[OperationRef::new("enable-modules").fleet("enable-modules-fleet")],
            scope: StageScope::Target,
            requires_confirmation: false,
        },
        StageDescriptor {
            index: 6,
            name: "register-webhooks",
            description: "Register webhooks and confirm the service can reach them",
            operations: &[
                OperationRef::new("register-webhooks"),
                OperationRef::new("verify-webhooks"),
            ],
            scope: StageScope::Target,
            requires_confirmation: false,
        },
        StageDescriptor {
            index: 7,
            name: "republish",
            description: "Queue every syndicated entity for export",
            operations: &[ENQUEUE_EXPORT],
            scope: StageScope::Target,
            requires_confirmation: false,
        },
    ],
};

pub const UPGRADE: Workflow = Workflow {
    name: "upgrade",
    ledger_prefix: "upgrade",
    stages: &[
        StageDescriptor {
            index: 0,
            name: "preflight",
            description: "Verify credentials, module versions and site reachability",
            operations: &[CHECK_ENVIRONMENT],
            scope: StageScope::Target,
            requires_confirmation: false,
        },
        StageDescriptor {
            index: 1,
            name: "deploy-code",
            description: "Deploy the upgraded integration code, then verify the module version",
            operations: &[OperationRef::new("verify-module-version").with_args(&[("expect", "2")])],
            scope: StageScope::Target,
            requires_confirmation: true,
        },
        StageDescriptor {
            index: 2,
            name: "database-updates",
            description: "Run pending database updates",
            operations: &[OperationRef::new("run-database-updates").fleet("run-database-updates-fleet")],
            scope: StageScope::Target,
            requires_confirmation: false,
        },
        StageDescriptor {
            index: 3,
            name: "orphan-scan",
            description: "Find entities orphaned on every member",
            operations: &[LIST_ORPHANS],
            scope: StageScope::FanOut,
            requires_confirmation: false,
        },
        StageDescriptor {
            index: 4,
            name: "reindex",
            description: "Queue every syndicated entity for export",
            operations: &[ENQUEUE_EXPORT],
            scope: StageScope::Target,
            requires_confirmation: false,
        },
    ],
};

pub fn all() -> [&'static Workflow; 2] {
    [&MIGRATION, &UPGRADE]
}
