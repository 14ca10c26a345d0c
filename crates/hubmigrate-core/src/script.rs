//! Operations backed by external executables declared in `config.yaml`.
//!
//! # Protocol
//! - Each argument is passed as `--name=value`.
//! - `HUBMIGRATE_ROOT` is always set. When running against a target,
//!   `HUBMIGRATE_TARGET`, `HUBMIGRATE_PLATFORM` and `HUBMIGRATE_MEMBERS`
//!   (comma-separated) describe it; local runs have them removed.
//! - Stdout is captured and returned to the engine. Stderr flows through to
//!   the terminal so progress output stays visible.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use crate::config::{ArgSpec, Config, OperationDef};
use crate::error::{MigrateError, Result};
use crate::invoker::{Args, Operation, OperationRegistry};
use crate::target::TargetContext;

const TARGET_ENV: [&str; 3] = [
    "HUBMIGRATE_TARGET",
    "HUBMIGRATE_PLATFORM",
    "HUBMIGRATE_MEMBERS",
];

// ---------------------------------------------------------------------------
// ScriptOperation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ScriptOperation {
    name: String,
    program: PathBuf,
    root: PathBuf,
    def: OperationDef,
}

impl ScriptOperation {
    /// Locate the executable for `def`. Commands containing a `/` are
    /// relative to `root`; bare names are looked up on `PATH`.
    pub fn resolve(root: &Path, name: &str, def: &OperationDef) -> Result<Self> {
        let command = def.command.trim();
        let unresolvable = |reason: String| MigrateError::OperationUnresolvable {
            name: name.to_string(),
            reason,
        };
        if command.is_empty() {
            return Err(unresolvable("command is empty".into()));
        }

        let program = if command.contains('/') {
            let path = root.join(command);
            if !path.is_file() {
                return Err(unresolvable(format!("{} does not exist", path.display())));
            }
            path
        } else {
            which::which(command).map_err(|e| unresolvable(format!("'{command}': {e}")))?
        };

        Ok(Self {
            name: name.to_string(),
            program,
            root: root.to_path_buf(),
            def: def.clone(),
        })
    }

    fn build_command(&self, target: Option<&TargetContext>, args: &Args) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(args.iter().map(|(k, v)| format!("--{k}={v}")));
        cmd.env("HUBMIGRATE_ROOT", &self.root);
        cmd.current_dir(&self.root);
        match target {
            Some(t) => {
                cmd.env("HUBMIGRATE_TARGET", t.alias());
                cmd.env("HUBMIGRATE_PLATFORM", t.platform().as_str());
                cmd.env("HUBMIGRATE_MEMBERS", t.members().join(","));
            }
            None => {
                for var in TARGET_ENV {
                    cmd.env_remove(var);
                }
            }
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::inherit());
        cmd
    }
}

impl Operation for ScriptOperation {
    fn name(&self) -> &str {
        &self.name
    }

    fn args(&self) -> &[ArgSpec] {
        &self.def.args
    }

    fn defaults(&self) -> Args {
        self.def.defaults.clone()
    }

    fn run(&self, target: Option<&TargetContext>, args: &Args, out: &mut dyn Write) -> Result<i32> {
        let output = self
            .build_command(target, args)
            .output()
            .map_err(|e| MigrateError::OperationUnresolvable {
                name: self.name.clone(),
                reason: format!("failed to spawn {}: {e}", self.program.display()),
            })?;

        out.write_all(&output.stdout)?;

        // Killed by a signal: no code, report as a generic failure.
        Ok(output.status.code().unwrap_or(-1))
    }
}

// ---------------------------------------------------------------------------
// ConfigRegistry
// ---------------------------------------------------------------------------

/// Registry over the `operations:` table of `config.yaml`.
pub struct ConfigRegistry {
    root: PathBuf,
    config: Config,
}

impl ConfigRegistry {
    pub fn new(root: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }
}

impl OperationRegistry for ConfigRegistry {
    fn resolve(&self, name: &str) -> Result<Arc<dyn Operation>> {
        let def = self
            .config
            .operation(name)
            .ok_or_else(|| MigrateError::OperationNotFound(name.to_string()))?;
        Ok(Arc::new(ScriptOperation::resolve(&self.root, name, def)?))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
