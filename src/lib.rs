pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::{
    csv_ledger::CsvLedgerSource, export::ReportExporter, http_store::HttpStatusStore,
    json_store::JsonStatusStore, local_storage::LocalStorage,
};
pub use config::ReconConfig;
pub use core::session::{ReconciliationSession, SessionReport};
pub use core::workflow::StatusBook;
pub use utils::error::{ReconError, Result};
