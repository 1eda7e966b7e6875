use crate::domain::keys::TaxpayerId;
use crate::domain::model::{ClassifiedRecord, Counterparty, CounterpartySummary};
use std::collections::{BTreeMap, HashSet};

#[derive(Default)]
struct GroupTotals<'a> {
    taxpayers: HashSet<&'a TaxpayerId>,
    contracts: usize,
    active: usize,
    reconciled: usize,
    awaiting: usize,
}

/// Group by counterparty (the sentinel is an ordinary group) and count
/// taxpayers, contracts and each status. Sorted by counterparty.
pub fn summarize(records: &[ClassifiedRecord]) -> Vec<CounterpartySummary> {
    let mut groups: BTreeMap<&Counterparty, GroupTotals> = BTreeMap::new();

    for r in records {
        let entry = groups.entry(&r.record.counterparty).or_default();
        entry.taxpayers.insert(&r.record.loan.taxpayer_id);
        entry.contracts += 1;
        entry.active += r.status.is_active as usize;
        entry.reconciled += r.status.is_reconciled as usize;
        entry.awaiting += r.status.is_awaiting as usize;
    }

    groups
        .into_iter()
        .map(|(counterparty, totals)| CounterpartySummary {
            counterparty: counterparty.clone(),
            distinct_taxpayers: totals.taxpayers.len(),
            total_contracts: totals.contracts,
            active_count: totals.active,
            reconciled_count: totals.reconciled,
            awaiting_count: totals.awaiting,
        })
        .collect()
}
