use crate::domain::keys::{ContractKey, TaxpayerId};
use crate::domain::model::{Ledger, RecognizedText};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    fn exists(&self, path: &str) -> impl std::future::Future<Output = Result<bool>> + Send;
}

/// Yields both tables with canonical keys, or `LedgerUnavailable`.
#[async_trait]
pub trait LedgerSource: Send + Sync {
    async fn load_ledger(&self) -> Result<Ledger>;
}

/// Persistence for the three status sets. Implementations report
/// `StoreUnavailable` for transient failures and `StoreConflict` when they can
/// detect a concurrent writer.
#[async_trait]
pub trait StatusStore: Send + Sync {
    fn name(&self) -> &str;

    async fn read_active(&self) -> Result<BTreeSet<TaxpayerId>>;
    async fn read_awaiting(&self) -> Result<BTreeSet<ContractKey>>;
    async fn read_reconciled(&self) -> Result<BTreeSet<ContractKey>>;

    async fn write_active(&self, set: &BTreeSet<TaxpayerId>) -> Result<()>;
    async fn write_awaiting(&self, set: &BTreeSet<ContractKey>) -> Result<()>;
    async fn write_reconciled(&self, set: &BTreeSet<ContractKey>) -> Result<()>;
}

#[async_trait]
pub trait ImageRecognizer: Send + Sync {
    async fn recognize(&self, image: &[u8]) -> Result<Vec<RecognizedText>>;
}
