//! Status transitions (active → awaiting → reconciled) on top of a
//! [`StatusStore`], with a read-through cache per status set.
//!
//! Every write starts from a fresh store read. Transient store failures are
//! retried with backoff; a detected concurrent write causes one re-read and
//! re-application before it is surfaced. Methods take `&mut self`, so one
//! book never runs two transitions at once.

use crate::domain::keys::{ContractKey, TaxpayerId};
use crate::domain::model::{MarkOutcome, StatusSetKind, StatusSnapshot};
use crate::domain::ports::StatusStore;
use crate::utils::error::{ReconError, Result};
use crate::utils::retry::{with_backoff, RetryPolicy};
use std::collections::BTreeSet;

/// 每個狀態集合各自一格快取，只在該集合被寫入時失效
#[derive(Debug, Default)]
pub struct StatusCache {
    active: Option<BTreeSet<TaxpayerId>>,
    awaiting: Option<BTreeSet<ContractKey>>,
    reconciled: Option<BTreeSet<ContractKey>>,
}

impl StatusCache {
    pub fn invalidate(&mut self, kind: StatusSetKind) {
        tracing::debug!("Invalidating cached '{}'", kind);
        match kind {
            StatusSetKind::Active => self.active = None,
            StatusSetKind::Awaiting => self.awaiting = None,
            StatusSetKind::Reconciled => self.reconciled = None,
        }
    }

    pub fn invalidate_all(&mut self) {
        for kind in StatusSetKind::ALL {
            self.invalidate(kind);
        }
    }

    pub fn is_cached(&self, kind: StatusSetKind) -> bool {
        match kind {
            StatusSetKind::Active => self.active.is_some(),
            StatusSetKind::Awaiting => self.awaiting.is_some(),
            StatusSetKind::Reconciled => self.reconciled.is_some(),
        }
    }
}

pub struct StatusBook<S: StatusStore> {
    store: S,
    retry: RetryPolicy,
    cache: StatusCache,
}

impl<S: StatusStore> StatusBook<S> {
    pub fn new(store: S, retry: RetryPolicy) -> Self {
        Self {
            store,
            retry,
            cache: StatusCache::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &StatusCache {
        &self.cache
    }

    /// Drops every cached set; the next snapshot re-reads the store.
    pub fn refresh(&mut self) {
        self.cache.invalidate_all();
    }

    pub async fn snapshot(&mut self) -> Result<StatusSnapshot> {
        if self.cache.active.is_none() {
            self.cache.active = Some(self.fetch_active().await?);
        }
        if self.cache.awaiting.is_none() {
            self.cache.awaiting = Some(self.fetch_keys(StatusSetKind::Awaiting).await?);
        }
        if self.cache.reconciled.is_none() {
            self.cache.reconciled = Some(self.fetch_keys(StatusSetKind::Reconciled).await?);
        }

        Ok(StatusSnapshot {
            active: self.cache.active.clone().unwrap_or_default(),
            awaiting: self.cache.awaiting.clone().unwrap_or_default(),
            reconciled: self.cache.reconciled.clone().unwrap_or_default(),
        })
    }

    pub async fn mark_active(&mut self, raw_taxpayer_id: &str) -> Result<MarkOutcome> {
        let taxpayer_id = TaxpayerId::parse(raw_taxpayer_id)?;
        let outcome = self
            .update_active(|set| {
                if set.insert(taxpayer_id.clone()) {
                    Ok(MarkOutcome::Inserted)
                } else {
                    Ok(MarkOutcome::AlreadyMarked)
                }
            })
            .await?;

        log_outcome("consulta ativa", &taxpayer_id, outcome);
        Ok(outcome)
    }

    pub async fn clear_active(&mut self, raw_taxpayer_id: &str) -> Result<MarkOutcome> {
        let taxpayer_id = TaxpayerId::parse(raw_taxpayer_id)?;
        let outcome = self
            .update_active(|set| {
                if set.remove(&taxpayer_id) {
                    Ok(MarkOutcome::Removed)
                } else {
                    Ok(MarkOutcome::NotPresent)
                }
            })
            .await?;

        log_outcome("consulta ativa", &taxpayer_id, outcome);
        Ok(outcome)
    }

    /// Refuses keys that are already reconciled so the two contract sets stay
    /// disjoint.
    pub async fn mark_awaiting(&mut self, raw_taxpayer_id: &str, raw_contract_id: &str) -> Result<MarkOutcome> {
        let key = ContractKey::parse(raw_taxpayer_id, raw_contract_id)?;

        let reconciled = self.fetch_keys(StatusSetKind::Reconciled).await?;
        self.cache.reconciled = Some(reconciled);
        if self.is_reconciled_cached(&key) {
            tracing::warn!("⚠️ {} is already reconciled, not marking it awaiting", key);
            return Err(ReconError::TransitionConflict {
                key: key.to_string(),
                reason: "contract is already reconciled".to_string(),
            });
        }

        let outcome = self
            .update_keys(StatusSetKind::Awaiting, |set| {
                if set.insert(key.clone()) {
                    Ok(MarkOutcome::Inserted)
                } else {
                    Ok(MarkOutcome::AlreadyMarked)
                }
            })
            .await?;

        log_outcome("aguardando", &key, outcome);
        Ok(outcome)
    }

    pub async fn clear_awaiting(&mut self, raw_taxpayer_id: &str, raw_contract_id: &str) -> Result<MarkOutcome> {
        let key = ContractKey::parse(raw_taxpayer_id, raw_contract_id)?;
        let outcome = self
            .update_keys(StatusSetKind::Awaiting, |set| {
                if set.remove(&key) {
                    Ok(MarkOutcome::Removed)
                } else {
                    Ok(MarkOutcome::NotPresent)
                }
            })
            .await?;

        log_outcome("aguardando", &key, outcome);
        Ok(outcome)
    }

    /// Inserts into reconciled and removes from awaiting as one logical step.
    ///
    /// Returns `Repaired` when the key was already reconciled and only a
    /// leftover awaiting entry had to be removed.
    ///
    /// The store has no transactions, so the removal is retried until a fresh
    /// read shows the key gone from awaiting and present in reconciled. If
    /// that never happens within `verify_attempts`, the result is
    /// `PartialCompletion`.
    pub async fn mark_reconciled(&mut self, raw_taxpayer_id: &str, raw_contract_id: &str) -> Result<MarkOutcome> {
        let key = ContractKey::parse(raw_taxpayer_id, raw_contract_id)?;

        let inserted = self
            .update_keys(StatusSetKind::Reconciled, |set| {
                if set.insert(key.clone()) {
                    Ok(MarkOutcome::Inserted)
                } else {
                    Ok(MarkOutcome::AlreadyMarked)
                }
            })
            .await?;

        let attempts = self.retry.verify_attempts.max(1);
        let mut removed_any = false;
        for attempt in 1..=attempts {
            let removal = self
                .update_keys(StatusSetKind::Awaiting, |set| {
                    if set.remove(&key) {
                        Ok(MarkOutcome::Removed)
                    } else {
                        Ok(MarkOutcome::NotPresent)
                    }
                })
                .await;

            match removal {
                Ok(outcome) => removed_any |= outcome.changed(),
                Err(e) => {
                    tracing::warn!(
                        "🔄 Removing {} from aguardando failed on attempt {}/{}: {}",
                        key,
                        attempt,
                        attempts,
                        e
                    );
                    continue;
                }
            }

            match self.verify_reconciled(&key).await {
                Ok(true) => {
                    let outcome = match (inserted.changed(), removed_any) {
                        (true, _) => MarkOutcome::Inserted,
                        (false, true) => MarkOutcome::Repaired,
                        (false, false) => MarkOutcome::AlreadyMarked,
                    };
                    log_outcome("tombado", &key, outcome);
                    return Ok(outcome);
                }
                Ok(false) => {
                    tracing::warn!(
                        "🔄 {} still awaiting after attempt {}/{}",
                        key,
                        attempt,
                        attempts
                    );
                }
                Err(e) => {
                    tracing::warn!("🔄 Verification read for {} failed: {}", key, e);
                }
            }
        }

        tracing::error!("❌ {} reconciled but still awaiting after {} attempts", key, attempts);
        Err(ReconError::PartialCompletion {
            key: key.to_string(),
            attempts,
        })
    }

    async fn verify_reconciled(&mut self, key: &ContractKey) -> Result<bool> {
        let awaiting = self.fetch_keys(StatusSetKind::Awaiting).await?;
        let reconciled = self.fetch_keys(StatusSetKind::Reconciled).await?;
        let ok = !awaiting.contains(key) && reconciled.contains(key);

        self.cache.awaiting = Some(awaiting);
        self.cache.reconciled = Some(reconciled);
        Ok(ok)
    }

    fn is_reconciled_cached(&self, key: &ContractKey) -> bool {
        self.cache
            .reconciled
            .as_ref()
            .map(|set| set.contains(key))
            .unwrap_or(false)
    }

    /// Fresh read, apply `mutate`, write back if anything changed. A
    /// `StoreConflict` on write gets one re-read and re-application.
    async fn update_active<F>(&mut self, mut mutate: F) -> Result<MarkOutcome>
    where
        F: FnMut(&mut BTreeSet<TaxpayerId>) -> Result<MarkOutcome>,
    {
        let mut conflict_retried = false;
        loop {
            self.cache.invalidate(StatusSetKind::Active);
            let mut set = self.fetch_active().await?;
            let outcome = mutate(&mut set)?;
            if !outcome.changed() {
                self.cache.active = Some(set);
                return Ok(outcome);
            }

            let store = &self.store;
            let written = &set;
            let result = with_backoff(&self.retry, "write consulta_ativa", move || {
                store.write_active(written)
            })
            .await;

            match result {
                Ok(()) => return Ok(outcome),
                Err(ReconError::StoreConflict { set: name }) if !conflict_retried => {
                    tracing::warn!("⚠️ Concurrent write on '{}', re-reading once", name);
                    conflict_retried = true;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn update_keys<F>(&mut self, kind: StatusSetKind, mut mutate: F) -> Result<MarkOutcome>
    where
        F: FnMut(&mut BTreeSet<ContractKey>) -> Result<MarkOutcome>,
    {
        let mut conflict_retried = false;
        loop {
            self.cache.invalidate(kind);
            let mut set = self.fetch_keys(kind).await?;
            let outcome = mutate(&mut set)?;
            if !outcome.changed() {
                self.store_keys_in_cache(kind, set);
                return Ok(outcome);
            }

            let result = self.write_keys(kind, &set).await;
            match result {
                Ok(()) => return Ok(outcome),
                Err(ReconError::StoreConflict { set: name }) if !conflict_retried => {
                    tracing::warn!("⚠️ Concurrent write on '{}', re-reading once", name);
                    conflict_retried = true;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn store_keys_in_cache(&mut self, kind: StatusSetKind, set: BTreeSet<ContractKey>) {
        match kind {
            StatusSetKind::Awaiting => self.cache.awaiting = Some(set),
            StatusSetKind::Reconciled => self.cache.reconciled = Some(set),
            StatusSetKind::Active => {}
        }
    }

    async fn fetch_active(&self) -> Result<BTreeSet<TaxpayerId>> {
        let store = &self.store;
        let set = with_backoff(&self.retry, "read consulta_ativa", move || store.read_active()).await?;
        tracing::debug!("Read {} entries from '{}'", set.len(), StatusSetKind::Active);
        Ok(set)
    }

    async fn fetch_keys(&self, kind: StatusSetKind) -> Result<BTreeSet<ContractKey>> {
        let store = &self.store;
        let what = format!("read {}", kind);
        let set = match kind {
            StatusSetKind::Awaiting => {
                with_backoff(&self.retry, &what, move || store.read_awaiting()).await?
            }
            StatusSetKind::Reconciled => {
                with_backoff(&self.retry, &what, move || store.read_reconciled()).await?
            }
            StatusSetKind::Active => {
                return Err(ReconError::ConfigError {
                    message: "consulta_ativa holds taxpayer ids, not contract keys".to_string(),
                })
            }
        };
        tracing::debug!("Read {} entries from '{}'", set.len(), kind);
        Ok(set)
    }

    async fn write_keys(&self, kind: StatusSetKind, set: &BTreeSet<ContractKey>) -> Result<()> {
        let store = &self.store;
        let what = format!("write {}", kind);
        tracing::debug!("Writing {} entries to '{}'", set.len(), kind);
        match kind {
            StatusSetKind::Awaiting => {
                with_backoff(&self.retry, &what, move || store.write_awaiting(set)).await
            }
            StatusSetKind::Reconciled => {
                with_backoff(&self.retry, &what, move || store.write_reconciled(set)).await
            }
            StatusSetKind::Active => Err(ReconError::ConfigError {
                message: "consulta_ativa holds taxpayer ids, not contract keys".to_string(),
            }),
        }
    }
}

fn log_outcome(set: &str, subject: &impl std::fmt::Display, outcome: MarkOutcome) {
    match outcome {
        MarkOutcome::Inserted => tracing::info!("✅ {} marked as {}", subject, set),
        MarkOutcome::AlreadyMarked => tracing::info!("ℹ️ {} was already marked as {}", subject, set),
        MarkOutcome::Removed => tracing::info!("✅ {} removed from {}", subject, set),
        MarkOutcome::NotPresent => tracing::info!("ℹ️ {} was not marked as {}", subject, set),
        MarkOutcome::Repaired => {
            tracing::info!("🔧 {} was already {}, stale aguardando entry removed", subject, set)
        }
    }
}
