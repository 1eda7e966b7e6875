use crate::domain::keys::ContractKey;
use crate::domain::model::{Counterparty, EnrichedRecord, LoanRecord, ReconciliationRecord};
use std::collections::HashMap;

/// Left join of eligible loans against the reconciliation table on
/// `(taxpayer_id, contract_id)`.
///
/// The first reconciliation row for a key wins. Loans without a match get the
/// `CONSULTE SISBR` counterparty. Output has one record per input loan.
pub fn enrich(loans: &[LoanRecord], reconciliation: &[ReconciliationRecord]) -> Vec<EnrichedRecord> {
    // 每個鍵記下第一筆對應列與總筆數
    let mut index: HashMap<ContractKey, (&ReconciliationRecord, usize)> = HashMap::new();
    for row in reconciliation {
        index
            .entry(row.key())
            .and_modify(|(_, count)| *count += 1)
            .or_insert((row, 1));
    }

    let enriched: Vec<EnrichedRecord> = loans
        .iter()
        .map(|loan| match index.get(&loan.key()) {
            Some((row, count)) => EnrichedRecord {
                loan: loan.clone(),
                counterparty: Counterparty::new(
                    row.counterparty_tax_id.clone(),
                    row.counterparty_name.clone(),
                ),
                match_count: *count,
            },
            None => EnrichedRecord {
                loan: loan.clone(),
                counterparty: Counterparty::unknown(),
                match_count: 0,
            },
        })
        .collect();

    let unmatched = enriched.iter().filter(|r| r.match_count == 0).count();
    tracing::debug!(
        "Enriched {} loans against {} reconciliation rows ({} without counterpart)",
        enriched.len(),
        reconciliation.len(),
        unmatched
    );
    enriched
}
