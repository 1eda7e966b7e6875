use crate::domain::keys::TaxpayerId;
use crate::domain::model::{ClassifiedRecord, EnrichedRecord, StatusFlags, StatusSnapshot};

/// Three independent membership tests. Exclusivity is not enforced here;
/// the consistency check reports contracts that are both awaiting and
/// reconciled.
pub fn classify(record: &EnrichedRecord, status: &StatusSnapshot) -> StatusFlags {
    let key = record.key();
    StatusFlags {
        is_active: status.active.contains(&record.loan.taxpayer_id),
        is_awaiting: status.awaiting.contains(&key),
        is_reconciled: status.reconciled.contains(&key),
    }
}

pub fn classify_all(records: &[EnrichedRecord], status: &StatusSnapshot) -> Vec<ClassifiedRecord> {
    records
        .iter()
        .map(|record| ClassifiedRecord {
            record: record.clone(),
            status: classify(record, status),
        })
        .collect()
}

/// 仍需處理的主動查詢：已標記、尚未送出也尚未完成
pub fn active_worklist(records: &[ClassifiedRecord]) -> Vec<&ClassifiedRecord> {
    records
        .iter()
        .filter(|r| r.status.is_active && !r.status.is_awaiting && !r.status.is_reconciled)
        .collect()
}

pub fn awaiting_list(records: &[ClassifiedRecord]) -> Vec<&ClassifiedRecord> {
    records.iter().filter(|r| r.status.is_awaiting).collect()
}

pub fn reconciled_list(records: &[ClassifiedRecord]) -> Vec<&ClassifiedRecord> {
    records.iter().filter(|r| r.status.is_reconciled).collect()
}

pub fn contracts_of<'a>(records: &'a [ClassifiedRecord], taxpayer_id: &TaxpayerId) -> Vec<&'a ClassifiedRecord> {
    records
        .iter()
        .filter(|r| &r.record.loan.taxpayer_id == taxpayer_id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::eligibility::tests::payroll_loan;
    use crate::core::enrichment::enrich;
    use crate::domain::keys::ContractKey;

    fn snapshot(active: &[&str], awaiting: &[(&str, &str)], reconciled: &[(&str, &str)]) -> StatusSnapshot {
        StatusSnapshot {
            active: active.iter().map(|c| TaxpayerId::parse(c).unwrap()).collect(),
            awaiting: awaiting
                .iter()
                .map(|(c, n)| ContractKey::parse(c, n).unwrap())
                .collect(),
            reconciled: reconciled
                .iter()
                .map(|(c, n)| ContractKey::parse(c, n).unwrap())
                .collect(),
        }
    }

    #[test]
    fn test_active_is_per_taxpayer_awaiting_is_per_contract() {
        let enriched = enrich(
            &[
                payroll_loan("01234567890", "55", 1),
                payroll_loan("01234567890", "56", 1),
            ],
            &[],
        );
        let status = snapshot(&["01234567890"], &[("01234567890", "55")], &[]);
        let classified = classify_all(&enriched, &status);

        assert!(classified[0].status.is_active && classified[0].status.is_awaiting);
        assert!(classified[1].status.is_active && !classified[1].status.is_awaiting);
    }

    #[test]
    fn test_inherited_torn_state_reports_both_flags() {
        let enriched = enrich(&[payroll_loan("01234567890", "55", 1)], &[]);
        let status = snapshot(&[], &[("01234567890", "55")], &[("01234567890", "55")]);
        let flags = classify(&enriched[0], &status);

        assert!(flags.is_awaiting);
        assert!(flags.is_reconciled);
    }

    #[test]
    fn test_worklist_excludes_contracts_already_in_progress() {
        let enriched = enrich(
            &[
                payroll_loan("01234567890", "1", 1),
                payroll_loan("01234567890", "2", 1),
                payroll_loan("01234567890", "3", 1),
                payroll_loan("11111111111", "4", 1),
            ],
            &[],
        );
        let status = snapshot(
            &["01234567890"],
            &[("01234567890", "2")],
            &[("01234567890", "3")],
        );
        let classified = classify_all(&enriched, &status);

        let worklist: Vec<&str> = active_worklist(&classified)
            .iter()
            .map(|r| r.record.loan.contract_id.as_str())
            .collect();
        assert_eq!(worklist, vec!["1"]);
        assert_eq!(awaiting_list(&classified).len(), 1);
        assert_eq!(reconciled_list(&classified).len(), 1);
        assert_eq!(
            contracts_of(&classified, &TaxpayerId::parse("01234567890").unwrap()).len(),
            3
        );
    }
}
