use crate::error::{MigrateError, Result};
use crate::target::TargetContext;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

/// Persisted stage progress for one workflow on one target.
///
/// The value under `<prefix>.stage` is the index of the next stage to run:
/// `k` means stages `0..k` have passed. Absent means the workflow has never
/// started. Only ever moves forward, except for an explicit [`reset`].
///
/// [`reset`]: StageLedger::reset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageLedger {
    key: String,
    updated_key: String,
}

impl StageLedger {
    pub fn new(prefix: &str) -> Self {
        Self {
            key: format!("{prefix}.stage"),
            updated_key: format!("{prefix}.updated_at"),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn current_stage(&self, target: &TargetContext) -> Result<Option<usize>> {
        let Some(value) = target.get(&self.key)? else {
            return Ok(None);
        };
        let stage = match &value {
            Value::Null => return Ok(None),
            Value::Number(n) => n.as_u64(),
            // Hand-edited stores sometimes quote the number.
            Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        };
        stage
            .and_then(|s| usize::try_from(s).ok())
            .map(Some)
            .ok_or_else(|| MigrateError::LedgerCorrupt {
                key: self.key.clone(),
                value: value.to_string(),
            })
    }

    pub fn updated_at(&self, target: &TargetContext) -> Result<Option<DateTime<Utc>>> {
        let value = target.get(&self.updated_key)?;
        Ok(value
            .as_ref()
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc)))
    }

    /// Record that every stage before `to` has passed. Re-recording the
    /// current value writes nothing.
    pub fn advance(&self, target: &mut TargetContext, to: usize) -> Result<()> {
        match self.current_stage(target)? {
            Some(current) if current == to => {
                tracing::debug!(key = %self.key, stage = to, "ledger already at stage");
                return Ok(());
            }
            Some(current) if to < current => {
                return Err(MigrateError::LedgerRegression {
                    key: self.key.clone(),
                    current,
                    requested: to,
                });
            }
            _ => {}
        }
        self.write(target, to)?;
        tracing::info!(alias = target.alias(), key = %self.key, stage = to, "ledger advanced");
        Ok(())
    }

    /// Explicit restart: the next run begins at the first stage.
    pub fn reset(&self, target: &mut TargetContext) -> Result<()> {
        let previous = self.current_stage(target).ok().flatten();
        self.write(target, 0)?;
        tracing::warn!(
            alias = target.alias(),
            key = %self.key,
            previous = ?previous,
            "ledger reset to stage 0"
        );
        Ok(())
    }

    fn write(&self, target: &mut TargetContext, stage: usize) -> Result<()> {
        target
            .set(&self.key, json!(stage))?
            .set(&self.updated_key, json!(Utc::now().to_rfc3339()))?
            .save()
    }
}
