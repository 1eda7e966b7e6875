use crate::core::aggregate::summarize;
use crate::core::candidates::{CandidateRules, CandidateSelector, TaxpayerCandidate};
use crate::core::classify::{active_worklist, awaiting_list, classify_all, contracts_of, reconciled_list};
use crate::core::consistency::{check_consistency, ConsistencyReport};
use crate::core::eligibility::{filter_eligible, EligibilityRules};
use crate::core::enrichment::enrich;
use crate::core::workflow::StatusBook;
use crate::domain::keys::TaxpayerId;
use crate::domain::model::{ClassifiedRecord, CounterpartySummary, Ledger, MarkOutcome, StatusSnapshot};
use crate::domain::ports::{ImageRecognizer, LedgerSource, StatusStore};
use crate::utils::error::{ReconError, Result};

/// Everything one screen of the dashboard needs, computed in one pass.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub classified: Vec<ClassifiedRecord>,
    pub summary: Vec<CounterpartySummary>,
    pub consistency: ConsistencyReport,
    pub status: StatusSnapshot,
    pub ledger_loans: usize,
    pub skipped_rows: usize,
}

impl SessionReport {
    pub fn eligible_count(&self) -> usize {
        self.classified.len()
    }

    pub fn worklist(&self) -> Vec<&ClassifiedRecord> {
        active_worklist(&self.classified)
    }

    pub fn awaiting(&self) -> Vec<&ClassifiedRecord> {
        awaiting_list(&self.classified)
    }

    pub fn reconciled(&self) -> Vec<&ClassifiedRecord> {
        reconciled_list(&self.classified)
    }

    pub fn lookup(&self, taxpayer_id: &TaxpayerId) -> Vec<&ClassifiedRecord> {
        contracts_of(&self.classified, taxpayer_id)
    }
}

/// 一次操作階段：帳冊只載入一次，狀態集合經由快取讀取
pub struct ReconciliationSession<L: LedgerSource, S: StatusStore> {
    ledger_source: L,
    book: StatusBook<S>,
    rules: EligibilityRules,
    selector: CandidateSelector,
    ledger: Option<Ledger>,
}

impl<L: LedgerSource, S: StatusStore> ReconciliationSession<L, S> {
    pub fn new(ledger_source: L, book: StatusBook<S>, rules: EligibilityRules) -> Self {
        Self {
            ledger_source,
            book,
            rules,
            selector: CandidateSelector::new(CandidateRules::default()),
            ledger: None,
        }
    }

    pub fn with_candidate_rules(mut self, rules: CandidateRules) -> Self {
        self.selector = CandidateSelector::new(rules);
        self
    }

    pub fn rules(&self) -> &EligibilityRules {
        &self.rules
    }

    pub fn book(&self) -> &StatusBook<S> {
        &self.book
    }

    /// Re-reads both tables, e.g. after new spreadsheets were dropped in.
    pub async fn reload_ledger(&mut self) -> Result<&Ledger> {
        tracing::info!("📂 Loading ledger...");
        let ledger = self.ledger_source.load_ledger().await?;
        tracing::info!(
            "📂 Loaded {} loans and {} reconciliation rows ({} rows skipped)",
            ledger.loans.len(),
            ledger.reconciliation.len(),
            ledger.skipped_rows
        );
        Ok(self.ledger.insert(ledger))
    }

    async fn ensure_ledger(&mut self) -> Result<()> {
        if self.ledger.is_none() {
            self.reload_ledger().await?;
        }
        Ok(())
    }

    pub async fn report(&mut self) -> Result<SessionReport> {
        self.ensure_ledger().await?;
        let status = self.book.snapshot().await?;
        let Some(ledger) = self.ledger.as_ref() else {
            return Err(ReconError::ledger_unavailable("session", "ledger not loaded"));
        };

        let eligible = filter_eligible(&ledger.loans, &self.rules);
        let enriched = enrich(&eligible, &ledger.reconciliation);
        let classified = classify_all(&enriched, &status);
        let summary = summarize(&classified);
        let consistency = check_consistency(&status, &enriched);

        tracing::info!(
            "📊 {} eligible contracts across {} counterparties, {} consistency issues",
            classified.len(),
            summary.len(),
            consistency.issues.len()
        );

        Ok(SessionReport {
            classified,
            summary,
            consistency,
            status,
            ledger_loans: ledger.loans.len(),
            skipped_rows: ledger.skipped_rows,
        })
    }

    pub async fn mark_active(&mut self, taxpayer_id: &str) -> Result<MarkOutcome> {
        self.book.mark_active(taxpayer_id).await
    }

    pub async fn clear_active(&mut self, taxpayer_id: &str) -> Result<MarkOutcome> {
        self.book.clear_active(taxpayer_id).await
    }

    pub async fn mark_awaiting(&mut self, taxpayer_id: &str, contract_id: &str) -> Result<MarkOutcome> {
        self.book.mark_awaiting(taxpayer_id, contract_id).await
    }

    pub async fn clear_awaiting(&mut self, taxpayer_id: &str, contract_id: &str) -> Result<MarkOutcome> {
        self.book.clear_awaiting(taxpayer_id, contract_id).await
    }

    pub async fn mark_reconciled(&mut self, taxpayer_id: &str, contract_id: &str) -> Result<MarkOutcome> {
        self.book.mark_reconciled(taxpayer_id, contract_id).await
    }

    /// Reads taxpayer ids off an image and marks each accepted one active
    /// through the ordinary `mark_active` path.
    pub async fn mark_active_from_image<R: ImageRecognizer>(
        &mut self,
        recognizer: &R,
        image: &[u8],
    ) -> Result<Vec<(TaxpayerCandidate, MarkOutcome)>> {
        let recognized = recognizer.recognize(image).await?;
        let candidates = self.selector.select(&recognized);
        tracing::info!(
            "🔍 {} text lines recognized, {} taxpayer ids accepted",
            recognized.len(),
            candidates.len()
        );

        let mut marked = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let outcome = self.book.mark_active(candidate.taxpayer_id.as_str()).await?;
            marked.push((candidate, outcome));
        }
        Ok(marked)
    }
}
