pub mod aggregate;
pub mod candidates;
pub mod classify;
pub mod consistency;
pub mod eligibility;
pub mod enrichment;
pub mod session;
pub mod workflow;

pub use crate::domain::keys::{ContractId, ContractKey, TaxpayerId};
pub use crate::domain::model::{
    ClassifiedRecord, Counterparty, CounterpartySummary, EnrichedRecord, Ledger, LoanRecord,
    MarkOutcome, ReconciliationRecord, StatusFlags, StatusSnapshot,
};
pub use crate::domain::ports::{ImageRecognizer, LedgerSource, StatusStore, Storage};
pub use crate::utils::error::Result;
