use crate::domain::keys::{ContractId, ContractKey, TaxpayerId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Placeholder used when a loan has no counterpart in the reconciliation table.
pub const UNKNOWN_COUNTERPARTY: &str = "CONSULTE SISBR";

/// 新貸款帳冊的一列
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanRecord {
    pub taxpayer_id: TaxpayerId,
    pub contract_id: ContractId,
    pub client_name: String,
    pub submodality_code: String,
    pub debit_criterion: String,
    pub credit_line_code: i64,
    pub open_installments_count: Option<u32>,
    pub operation_rate_percent: Option<f64>,
    pub commercial_name: String,
}

impl LoanRecord {
    pub fn key(&self) -> ContractKey {
        ContractKey::new(self.taxpayer_id.clone(), self.contract_id.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationRecord {
    pub taxpayer_id: TaxpayerId,
    pub contract_id: ContractId,
    pub counterparty_tax_id: String,
    pub counterparty_name: String,
}

impl ReconciliationRecord {
    pub fn key(&self) -> ContractKey {
        ContractKey::new(self.taxpayer_id.clone(), self.contract_id.clone())
    }
}

/// Both tables as loaded by a ledger source.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    pub loans: Vec<LoanRecord>,
    pub reconciliation: Vec<ReconciliationRecord>,
    /// Rows dropped at load because their taxpayer id could not be canonicalized.
    pub skipped_rows: usize,
}

/// 代扣薪資的雇主（對帳方）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Counterparty {
    pub tax_id: String,
    pub name: String,
}

impl Counterparty {
    pub fn new(tax_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            tax_id: tax_id.into(),
            name: name.into(),
        }
    }

    pub fn unknown() -> Self {
        Self::new(UNKNOWN_COUNTERPARTY, UNKNOWN_COUNTERPARTY)
    }

    pub fn is_unknown(&self) -> bool {
        self.tax_id == UNKNOWN_COUNTERPARTY && self.name == UNKNOWN_COUNTERPARTY
    }
}

impl fmt::Display for Counterparty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.tax_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedRecord {
    pub loan: LoanRecord,
    pub counterparty: Counterparty,
    /// Reconciliation rows sharing this key; 0 means the sentinel was used.
    pub match_count: usize,
}

impl EnrichedRecord {
    pub fn key(&self) -> ContractKey {
        self.loan.key()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatusFlags {
    pub is_active: bool,
    pub is_awaiting: bool,
    pub is_reconciled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedRecord {
    pub record: EnrichedRecord,
    pub status: StatusFlags,
}

/// 三個狀態集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusSetKind {
    Active,
    Awaiting,
    Reconciled,
}

impl StatusSetKind {
    pub const ALL: [StatusSetKind; 3] = [
        StatusSetKind::Active,
        StatusSetKind::Awaiting,
        StatusSetKind::Reconciled,
    ];

    /// Name used for files, remote sheets and log lines.
    pub fn store_name(&self) -> &'static str {
        match self {
            StatusSetKind::Active => "consulta_ativa",
            StatusSetKind::Awaiting => "aguardando",
            StatusSetKind::Reconciled => "tombados",
        }
    }
}

impl fmt::Display for StatusSetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.store_name())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub active: BTreeSet<TaxpayerId>,
    pub awaiting: BTreeSet<ContractKey>,
    pub reconciled: BTreeSet<ContractKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterpartySummary {
    pub counterparty: Counterparty,
    pub distinct_taxpayers: usize,
    pub total_contracts: usize,
    pub active_count: usize,
    pub reconciled_count: usize,
    pub awaiting_count: usize,
}

/// Result of a mark/clear operation that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    Inserted,
    AlreadyMarked,
    Removed,
    NotPresent,
    /// Already reconciled; a leftover awaiting entry was removed.
    Repaired,
}

impl MarkOutcome {
    pub fn changed(&self) -> bool {
        matches!(
            self,
            MarkOutcome::Inserted | MarkOutcome::Removed | MarkOutcome::Repaired
        )
    }
}

/// One line of text read from an image, with the recognizer's confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedText {
    pub text: String,
    pub confidence: f32,
}
