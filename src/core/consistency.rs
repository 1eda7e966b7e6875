use crate::domain::keys::ContractKey;
use crate::domain::model::{EnrichedRecord, StatusSetKind, StatusSnapshot};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueLevel {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsistencyIssue {
    /// Same contract in both awaiting and reconciled.
    AwaitingAndReconciled { key: ContractKey },
    /// More than one reconciliation row for an eligible contract.
    DuplicateReconciliation { key: ContractKey, matches: usize },
    /// Status entry for a contract that is not in the eligible ledger.
    OrphanStatusKey { key: ContractKey, set: StatusSetKind },
}

impl ConsistencyIssue {
    pub fn level(&self) -> IssueLevel {
        match self {
            ConsistencyIssue::AwaitingAndReconciled { .. } => IssueLevel::Error,
            ConsistencyIssue::DuplicateReconciliation { .. }
            | ConsistencyIssue::OrphanStatusKey { .. } => IssueLevel::Warning,
        }
    }
}

impl fmt::Display for ConsistencyIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsistencyIssue::AwaitingAndReconciled { key } => {
                write!(f, "{} is both awaiting and reconciled", key)
            }
            ConsistencyIssue::DuplicateReconciliation { key, matches } => write!(
                f,
                "{} has {} reconciliation rows, the first one was used",
                key, matches
            ),
            ConsistencyIssue::OrphanStatusKey { key, set } => {
                write!(f, "{} in '{}' is not in the eligible ledger", key, set)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsistencyReport {
    pub generated_at: DateTime<Utc>,
    pub issues: Vec<ConsistencyIssue>,
}

impl ConsistencyReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.level() == IssueLevel::Error)
    }

    pub fn torn_keys(&self) -> Vec<&ContractKey> {
        self.issues
            .iter()
            .filter_map(|i| match i {
                ConsistencyIssue::AwaitingAndReconciled { key } => Some(key),
                _ => None,
            })
            .collect()
    }
}

/// 檢查狀態集合與帳冊是否一致，不做任何修改
pub fn check_consistency(status: &StatusSnapshot, enriched: &[EnrichedRecord]) -> ConsistencyReport {
    let mut issues: Vec<ConsistencyIssue> = status
        .awaiting
        .intersection(&status.reconciled)
        .map(|key| ConsistencyIssue::AwaitingAndReconciled { key: key.clone() })
        .collect();

    let mut ledger_keys: HashSet<ContractKey> = HashSet::with_capacity(enriched.len());
    for record in enriched {
        let key = record.key();
        if record.match_count > 1 && !ledger_keys.contains(&key) {
            issues.push(ConsistencyIssue::DuplicateReconciliation {
                key: key.clone(),
                matches: record.match_count,
            });
        }
        ledger_keys.insert(key);
    }

    for (set, keys) in [
        (StatusSetKind::Awaiting, &status.awaiting),
        (StatusSetKind::Reconciled, &status.reconciled),
    ] {
        issues.extend(
            keys.iter()
                .filter(|key| !ledger_keys.contains(*key))
                .map(|key| ConsistencyIssue::OrphanStatusKey {
                    key: key.clone(),
                    set,
                }),
        );
    }

    for issue in &issues {
        match issue.level() {
            IssueLevel::Error => tracing::warn!("❌ {}", issue),
            IssueLevel::Warning => tracing::debug!("⚠️ {}", issue),
        }
    }

    ConsistencyReport {
        generated_at: Utc::now(),
        issues,
    }
}
