//! Fan-out dispatch over fleet members, joined before aggregation.

use crate::aggregate::{aggregate, member_records, EntityRecord, MemberRecords};
use crate::envelope::{scan_output, EnvelopeCodec, OutputScan};
use crate::error::Result;
use crate::invoker::{Args, CapturedInvocation, OperationInvoker};
use crate::target::TargetContext;

#[derive(Debug, Clone)]
pub struct MemberInvocation {
    pub alias: String,
    pub result: CapturedInvocation,
}

/// Invoke `operation` against every member concurrently and wait for all of
/// them. Results come back in member order regardless of completion order.
/// The first engine fault wins once every member has finished.
pub fn fan_out(
    invoker: &dyn OperationInvoker,
    operation: &str,
    members: &[TargetContext],
    args: &Args,
) -> Result<Vec<MemberInvocation>> {
    std::thread::scope(|s| {
        let handles: Vec<_> = members
            .iter()
            .map(|member| {
                let handle = s.spawn(move || invoker.invoke(operation, Some(member), args));
                (member.alias(), handle)
            })
            .collect();

        let joined: Vec<_> = handles
            .into_iter()
            .map(|(alias, handle)| {
                let result = handle
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
                (alias, result)
            })
            .collect();

        joined
            .into_iter()
            .map(|(alias, result)| {
                Ok(MemberInvocation {
                    alias: alias.to_string(),
                    result: result?,
                })
            })
            .collect()
    })
}

// ---------------------------------------------------------------------------
// Orphan scan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MemberScan {
    pub alias: String,
    pub exit_status: i32,
    pub output: OutputScan,
    pub records: MemberRecords,
}

#[derive(Debug, Clone)]
pub struct OrphanScan {
    pub members: Vec<MemberScan>,
    /// Entities reported by every member.
    pub orphans: Vec<EntityRecord>,
}

impl OrphanScan {
    pub fn failed_members(&self) -> impl Iterator<Item = &MemberScan> {
        self.members.iter().filter(|m| m.exit_status != 0)
    }

    pub fn unparseable_members(&self) -> impl Iterator<Item = (&str, &str)> {
        self.members.iter().filter_map(|m| match &m.records {
            MemberRecords::Unparseable { reason } => Some((m.alias.as_str(), reason.as_str())),
            MemberRecords::Parsed(_) => None,
        })
    }

    /// Why the members' results cannot be trusted: a non-zero exit or an
    /// error envelope from any member.
    pub fn member_fault(&self, operation: &str) -> Option<String> {
        let failed: Vec<String> = self
            .failed_members()
            .map(|m| format!("{} (status {})", m.alias, m.exit_status))
            .collect();
        if !failed.is_empty() {
            return Some(format!("'{operation}' failed on {}", failed.join(", ")));
        }
        let errors: usize = self
            .members
            .iter()
            .map(|m| m.output.error_messages().count())
            .sum();
        (errors > 0).then(|| format!("'{operation}' reported {errors} error(s)"))
    }
}

/// Fan `operation` out to `members`, then intersect their entity lists.
pub fn scan_orphans(
    invoker: &dyn OperationInvoker,
    codec: &dyn EnvelopeCodec,
    operation: &str,
    members: &[TargetContext],
    args: &Args,
) -> Result<OrphanScan> {
    let invocations = fan_out(invoker, operation, members, args)?;

    let members: Vec<MemberScan> = invocations
        .into_iter()
        .map(|inv| {
            let output = scan_output(codec, &inv.result.raw_output);
            let records = member_records(&output);
            if let MemberRecords::Unparseable { reason } = &records {
                tracing::warn!(member = %inv.alias, %reason, "member result counted as empty");
            }
            MemberScan {
                alias: inv.alias,
                exit_status: inv.result.exit_status,
                output,
                records,
            }
        })
        .collect();

    let lists: Vec<Vec<EntityRecord>> = members
        .iter()
        .map(|m| m.records.records().to_vec())
        .collect();
    let orphans = aggregate(&lists);
    tracing::info!(
        operation,
        members = members.len(),
        orphans = orphans.len(),
        "orphan scan aggregated"
    );
    Ok(OrphanScan { members, orphans })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::JsonLineCodec;
    use crate::error::MigrateError;
    use crate::invoker::RegistryInvoker;
    use crate::target::PlatformKind;
    use crate::testing::{memory_target, FnOperation, MapRegistry};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn entities_line(ids: &[&str]) -> String {
        let items: Vec<String> = ids.iter().map(|id| format!(r#"{{"id":"{id}"}}"#)).collect();
        format!(
            r#"{{"success":true,"data":{{"entities":[{}]}}}}"#,
            items.join(",")
        )
    }

    fn members(n: usize) -> Vec<TargetContext> {
        (0..n)
            .map(|i| memory_target(&format!("site-{i}"), PlatformKind::Site))
            .collect()
    }

    #[test]
    fn join_waits_for_the_slowest_member() {
        let finished: Arc<Mutex<Vec<String>>> = Arc::default();
        let log = Arc::clone(&finished);
        let mut reg = MapRegistry::default();
        reg.insert(FnOperation::new("list-orphans", vec![], move |target, _, out| {
            let alias = target.unwrap().alias().to_string();
            if alias == "site-2" {
                std::thread::sleep(Duration::from_millis(150));
            }
            let ids: &[&str] = if alias == "site-2" { &["x"] } else { &["x", "y"] };
            writeln!(out, "{}", entities_line(ids)).unwrap();
            log.lock().unwrap().push(alias);
            0
        }));
        let invoker = RegistryInvoker::new(reg);
        let members = members(3);

        let scan = scan_orphans(&invoker, &JsonLineCodec, "list-orphans", &members, &Args::new())
            .unwrap();

        // All three completed before aggregation, the slow one last.
        let done = finished.lock().unwrap().clone();
        assert_eq!(done.len(), 3);
        assert_eq!(done.last().map(String::as_str), Some("site-2"));
        // `y` is excluded only because the slow member's result was waited for.
        let ids: Vec<&str> = scan.orphans.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["x"]);
        let order: Vec<&str> = scan.members.iter().map(|m| m.alias.as_str()).collect();
        assert_eq!(order, vec!["site-0", "site-1", "site-2"]);
    }

    #[test]
    fn unparseable_member_empties_the_aggregate() {
        let mut reg = MapRegistry::default();
        reg.insert(FnOperation::new("list-orphans", vec![], |target, _, out| {
            if target.unwrap().alias() == "site-1" {
                writeln!(out, "Fatal error: database unavailable").unwrap();
                return 1;
            }
            writeln!(out, "{}", entities_line(&["x"])).unwrap();
            0
        }));
        let invoker = RegistryInvoker::new(reg);
        let scan = scan_orphans(&invoker, &JsonLineCodec, "list-orphans", &members(2), &Args::new())
            .unwrap();
        assert!(scan.orphans.is_empty());
        assert_eq!(scan.failed_members().count(), 1);
        let unparseable: Vec<_> = scan.unparseable_members().map(|(a, _)| a).collect();
        assert_eq!(unparseable, vec!["site-1"]);
    }

    #[test]
    fn error_envelope_from_a_zero_exit_member_is_a_fault() {
        let mut reg = MapRegistry::default();
        reg.insert(FnOperation::new("list-orphans", vec![], |target, _, out| {
            if target.unwrap().alias() == "site-1" {
                writeln!(out, r#"{{"success":false,"error":{{"message":"no db"}}}}"#).unwrap();
            } else {
                writeln!(out, "{}", entities_line(&["x"])).unwrap();
            }
            0
        }));
        let invoker = RegistryInvoker::new(reg);
        let scan = scan_orphans(&invoker, &JsonLineCodec, "list-orphans", &members(2), &Args::new())
            .unwrap();
        assert_eq!(scan.failed_members().count(), 0);
        assert_eq!(
            scan.member_fault("list-orphans").as_deref(),
            Some("'list-orphans' reported 1 error(s)")
        );
    }

    #[test]
    fn clean_members_have_no_fault() {
        let mut reg = MapRegistry::default();
        reg.insert(FnOperation::new("list-orphans", vec![], |_, _, out| {
            writeln!(out, "{}", entities_line(&["x"])).unwrap();
            0
        }));
        let invoker = RegistryInvoker::new(reg);
        let scan = scan_orphans(&invoker, &JsonLineCodec, "list-orphans", &members(2), &Args::new())
            .unwrap();
        assert_eq!(scan.member_fault("list-orphans"), None);
        assert_eq!(scan.orphans.len(), 1);
    }

    #[test]
    fn fan_out_propagates_engine_faults() {
        let invoker = RegistryInvoker::new(MapRegistry::default());
        let err = fan_out(&invoker, "missing", &members(2), &Args::new()).unwrap_err();
        assert!(matches!(err, MigrateError::OperationNotFound(_)));
    }

    #[test]
    fn fan_out_over_no_members_is_empty() {
        let invoker = RegistryInvoker::new(MapRegistry::default());
        assert!(fan_out(&invoker, "anything", &[], &Args::new())
            .unwrap()
            .is_empty());
    }
}
