//! In-memory doubles shared by the unit tests.

use crate::config::ArgSpec;
use crate::error::{MigrateError, Result};
use crate::gate::Operator;
use crate::invoker::{Args, Operation, OperationRegistry};
use crate::target::{ConfigStore, PlatformKind, TargetContext, TargetResolver};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Stores and targets
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStore {
    values: BTreeMap<String, Value>,
    saves: Option<Arc<AtomicUsize>>,
    fail_saves: bool,
}

impl ConfigStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        if self.fail_saves {
            return Err(MigrateError::StoreUnavailable {
                alias: "memory".into(),
                reason: "disk full".into(),
            });
        }
        if let Some(saves) = &self.saves {
            saves.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

pub fn memory_target(alias: &str, platform: PlatformKind) -> TargetContext {
    memory_target_with_members(alias, platform, &[])
}

pub fn memory_target_with_members(
    alias: &str,
    platform: PlatformKind,
    members: &[&str],
) -> TargetContext {
    TargetContext::new(
        alias,
        platform,
        members.iter().map(|m| m.to_string()).collect(),
        Box::new(MemoryStore::default()),
    )
}

/// A site whose store accepts writes but never saves.
pub fn failing_target(alias: &str) -> TargetContext {
    let store = MemoryStore {
        fail_saves: true,
        ..MemoryStore::default()
    };
    TargetContext::new(alias, PlatformKind::Site, Vec::new(), Box::new(store))
}

/// A site plus a counter of successful saves.
pub fn counting_target(alias: &str) -> (TargetContext, Arc<AtomicUsize>) {
    let saves = Arc::new(AtomicUsize::new(0));
    let store = MemoryStore {
        saves: Some(Arc::clone(&saves)),
        ..MemoryStore::default()
    };
    let target = TargetContext::new(alias, PlatformKind::Site, Vec::new(), Box::new(store));
    (target, saves)
}

/// Resolves any alias to a fresh in-memory site.
#[derive(Default)]
pub struct MemoryResolver;

impl TargetResolver for MemoryResolver {
    fn resolve(&self, alias: &str) -> Result<TargetContext> {
        Ok(memory_target(alias, PlatformKind::Site))
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

pub fn arg(name: &str, required: bool) -> ArgSpec {
    ArgSpec {
        name: name.to_string(),
        required,
    }
}

type RunFn = dyn Fn(Option<&TargetContext>, &Args, &mut dyn Write) -> i32 + Send + Sync;

pub struct FnOperation {
    name: String,
    args: Vec<ArgSpec>,
    run: Box<RunFn>,
}

impl FnOperation {
    pub fn new<F>(name: &str, args: Vec<ArgSpec>, run: F) -> Self
    where
        F: Fn(Option<&TargetContext>, &Args, &mut dyn Write) -> i32 + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            args,
            run: Box::new(run),
        }
    }
}

impl Operation for FnOperation {
    fn name(&self) -> &str {
        &self.name
    }

    fn args(&self) -> &[ArgSpec] {
        &self.args
    }

    fn run(&self, target: Option<&TargetContext>, args: &Args, out: &mut dyn Write) -> Result<i32> {
        Ok((self.run)(target, args, out))
    }
}

#[derive(Default)]
pub struct MapRegistry {
    ops: HashMap<String, Arc<dyn Operation>>,
}

impl MapRegistry {
    pub fn insert(&mut self, op: FnOperation) {
        self.ops.insert(op.name().to_string(), Arc::new(op));
    }
}

impl OperationRegistry for MapRegistry {
    fn resolve(&self, name: &str) -> Result<Arc<dyn Operation>> {
        self.ops
            .get(name)
            .cloned()
            .ok_or_else(|| MigrateError::OperationNotFound(name.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Operator
// ---------------------------------------------------------------------------

/// Scripted operator. Confirmations are answered from a queue; an empty
/// queue or exhausted acknowledgment budget behaves like closed input.
#[derive(Default)]
pub struct RecordingOperator {
    pub events: Vec<String>,
    pub confirmations: usize,
    pub acknowledgments: usize,
    answers: VecDeque<bool>,
    ack_limit: Option<usize>,
}

impl RecordingOperator {
    pub fn with_confirms(answers: &[bool]) -> Self {
        Self {
            answers: answers.iter().copied().collect(),
            ..Self::default()
        }
    }

    pub fn ack_limit(mut self, limit: usize) -> Self {
        self.ack_limit = Some(limit);
        self
    }

    pub fn has_event(&self, event: &str) -> bool {
        self.events.iter().any(|e| e == event)
    }
}

impl Operator for RecordingOperator {
    fn echo(&mut self, source: Option<&str>, line: &str) {
        match source {
            Some(source) => self.events.push(format!("echo {source}: {line}")),
            None => self.events.push(format!("echo: {line}")),
        }
    }

    fn notify(&mut self, message: &str) {
        self.events.push(format!("notify: {message}"));
    }

    fn warn(&mut self, message: &str) {
        self.events.push(format!("warn: {message}"));
    }

    fn report_error(&mut self, message: &str) {
        self.events.push(format!("error: {message}"));
    }

    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        self.events.push(format!("confirm: {prompt}"));
        let answer = self
            .answers
            .pop_front()
            .ok_or_else(|| MigrateError::OperatorInputClosed(prompt.to_string()))?;
        self.confirmations += 1;
        Ok(answer)
    }

    fn acknowledge(&mut self, prompt: &str) -> Result<()> {
        self.events.push(format!("ack: {prompt}"));
        if self.ack_limit.is_some_and(|limit| self.acknowledgments >= limit) {
            return Err(MigrateError::OperatorInputClosed(prompt.to_string()));
        }
        self.acknowledgments += 1;
        Ok(())
    }
}
