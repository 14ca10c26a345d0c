//! Named operation invocation with captured output.
//!
//! An [`Operation`] is an opaque executable unit resolved by name through an
//! [`OperationRegistry`]. The [`OperationInvoker`] enforces the operation's
//! argument contract, runs it against an optional target, and hands back its
//! exit status plus everything it wrote to stdout.

use crate::config::ArgSpec;
use crate::error::Result;
use crate::target::TargetContext;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

/// Argument map passed to an operation (`name -> value`).
pub type Args = BTreeMap<String, String>;

/// Exit status reported when the argument contract rejects a call.
pub const ARGUMENT_ERROR_STATUS: i32 = 2;

// ---------------------------------------------------------------------------
// CapturedInvocation
// ---------------------------------------------------------------------------

/// Result of one invocation. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedInvocation {
    pub exit_status: i32,
    pub raw_output: String,
}

impl CapturedInvocation {
    pub fn succeeded(&self) -> bool {
        self.exit_status == 0
    }
}

// ---------------------------------------------------------------------------
// Operation / OperationRegistry
// ---------------------------------------------------------------------------

pub trait Operation: Send + Sync {
    fn name(&self) -> &str;

    /// Declared argument contract.
    fn args(&self) -> &[ArgSpec];

    /// Arguments applied before the caller's own.
    fn defaults(&self) -> Args {
        Args::new()
    }

    /// Run to completion, writing normal output to `out`.
    ///
    /// `Err` is reserved for "could not run at all"; a failing run is a
    /// non-zero status.
    fn run(&self, target: Option<&TargetContext>, args: &Args, out: &mut dyn Write) -> Result<i32>;
}

pub trait OperationRegistry: Send + Sync {
    fn resolve(&self, name: &str) -> Result<Arc<dyn Operation>>;
}

// ---------------------------------------------------------------------------
// Argument contract
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgViolation {
    Unknown(String),
    Missing(String),
}

impl fmt::Display for ArgViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgViolation::Unknown(name) => write!(f, "unknown argument '{name}'"),
            ArgViolation::Missing(name) => write!(f, "missing required argument '{name}'"),
        }
    }
}

/// Check `args` against `specs`. Returns every violation found.
pub fn check_args(specs: &[ArgSpec], args: &Args) -> Vec<ArgViolation> {
    let mut violations: Vec<ArgViolation> = args
        .keys()
        .filter(|k| !specs.iter().any(|s| &s.name == *k))
        .map(|k| ArgViolation::Unknown(k.clone()))
        .collect();
    violations.extend(
        specs
            .iter()
            .filter(|s| s.required && !args.contains_key(&s.name))
            .map(|s| ArgViolation::Missing(s.name.clone())),
    );
    violations
}

// ---------------------------------------------------------------------------
// OperationInvoker
// ---------------------------------------------------------------------------

pub trait OperationInvoker: Send + Sync {
    /// Run `operation`. `target == None` runs it locally, without a target.
    fn invoke(
        &self,
        operation: &str,
        target: Option<&TargetContext>,
        args: &Args,
    ) -> Result<CapturedInvocation>;
}

/// Resolves operations through a registry and captures their output in a
/// per-call buffer.
pub struct RegistryInvoker<R> {
    registry: R,
}

impl<R: OperationRegistry> RegistryInvoker<R> {
    pub fn new(registry: R) -> Self {
        Self { registry }
    }
}

impl<R: OperationRegistry> OperationInvoker for RegistryInvoker<R> {
    fn invoke(
        &self,
        operation: &str,
        target: Option<&TargetContext>,
        args: &Args,
    ) -> Result<CapturedInvocation> {
        let op = self.registry.resolve(operation)?;

        let mut effective = op.defaults();
        effective.extend(args.iter().map(|(k, v)| (k.clone(), v.clone())));

        let violations = check_args(op.args(), &effective);
        if !violations.is_empty() {
            let detail = violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(operation, "rejected before dispatch: {detail}");
            return Ok(CapturedInvocation {
                exit_status: ARGUMENT_ERROR_STATUS,
                raw_output: String::new(),
            });
        }

        let target_alias = target.map(|t| t.alias()).unwrap_or("local");
        tracing::debug!(operation, alias = target_alias, "invoking");

        let mut sink: Vec<u8> = Vec::new();
        let exit_status = op.run(target, &effective, &mut sink)?;

        tracing::debug!(
            operation,
            alias = target_alias,
            exit_status,
            bytes = sink.len(),
            "invocation finished"
        );
        Ok(CapturedInvocation {
            exit_status,
            raw_output: String::from_utf8_lossy(&sink).into_owned(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
