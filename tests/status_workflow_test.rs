use anyhow::Result;
use loan_recon::core::consistency::{check_consistency, ConsistencyIssue};
use loan_recon::domain::keys::{ContractKey, TaxpayerId};
use loan_recon::domain::model::{Counterparty, EnrichedRecord, LoanRecord, MarkOutcome};
use loan_recon::domain::ports::StatusStore;
use loan_recon::utils::retry::RetryPolicy;
use loan_recon::{JsonStatusStore, LocalStorage, ReconError, StatusBook};
use std::collections::BTreeSet;
use tempfile::TempDir;
use tokio_test::assert_ok;

fn store(dir: &TempDir) -> JsonStatusStore<LocalStorage> {
    JsonStatusStore::new(LocalStorage::new(dir.path().to_str().unwrap().to_string()))
}

fn book(dir: &TempDir) -> StatusBook<JsonStatusStore<LocalStorage>> {
    StatusBook::new(store(dir), RetryPolicy::immediate(3))
}

fn key(cpf: &str, contract: &str) -> ContractKey {
    ContractKey::parse(cpf, contract).unwrap()
}

fn enriched(cpf: &str, contract: &str) -> EnrichedRecord {
    let key = key(cpf, contract);
    EnrichedRecord {
        loan: LoanRecord {
            taxpayer_id: key.taxpayer_id.clone(),
            contract_id: key.contract_id.clone(),
            client_name: "Cliente".to_string(),
            submodality_code: "CRÉDITO PESSOAL - COM CONSIGNAÇÃO EM FOLHA DE PAGAM.".to_string(),
            debit_criterion: "FOLHA DE PAGAMENTO".to_string(),
            credit_line_code: 999999,
            open_installments_count: Some(12),
            operation_rate_percent: Some(1.85),
            commercial_name: "CONSIGNADO PRIVADO".to_string(),
        },
        counterparty: Counterparty::unknown(),
        match_count: 0,
    }
}

#[tokio::test]
async fn test_mark_active_grows_set_once() -> Result<()> {
    let dir = TempDir::new()?;
    let mut book = book(&dir);

    assert_eq!(book.mark_active("012.345.678-90").await?, MarkOutcome::Inserted);
    assert_eq!(book.mark_active("01234567890").await?, MarkOutcome::AlreadyMarked);

    // 另一個實例重新讀取檔案
    let active = store(&dir).read_active().await?;
    assert_eq!(active.len(), 1);
    assert!(active.contains(&TaxpayerId::parse("1234567890")?));
    Ok(())
}

#[tokio::test]
async fn test_mark_reconciled_is_visible_to_a_fresh_reader() -> Result<()> {
    let dir = TempDir::new()?;
    let mut book = book(&dir);
    let k = key("01234567890", "55");

    assert_ok!(book.mark_awaiting("01234567890", "55").await);
    assert_eq!(book.mark_reconciled("01234567890", "55").await?, MarkOutcome::Inserted);

    let reader = store(&dir);
    assert!(!reader.read_awaiting().await?.contains(&k));
    assert!(reader.read_reconciled().await?.contains(&k));

    let err = book.mark_awaiting("01234567890", "55").await.unwrap_err();
    assert!(matches!(err, ReconError::TransitionConflict { .. }));
    assert_ne!(err.severity().exit_code(), 0);
    Ok(())
}

#[tokio::test]
async fn test_inherited_torn_state_is_flagged_then_repaired() -> Result<()> {
    let dir = TempDir::new()?;
    let k = key("52998224725", "77");
    let torn: BTreeSet<ContractKey> = [k.clone()].into_iter().collect();

    // 舊資料同時存在於兩個集合
    let writer = store(&dir);
    writer.write_awaiting(&torn).await?;
    writer.write_reconciled(&torn).await?;

    let mut book = book(&dir);
    let records = vec![enriched("52998224725", "77")];

    let report = check_consistency(&book.snapshot().await?, &records);
    assert!(report.has_errors());
    assert_eq!(report.torn_keys(), vec![&k]);
    assert!(report
        .issues
        .contains(&ConsistencyIssue::AwaitingAndReconciled { key: k.clone() }));

    assert_eq!(book.mark_reconciled("52998224725", "77").await?, MarkOutcome::Repaired);

    let report = check_consistency(&book.snapshot().await?, &records);
    assert!(report.is_clean());
    Ok(())
}

#[tokio::test]
async fn test_clear_operations_persist() -> Result<()> {
    let dir = TempDir::new()?;
    let mut book = book(&dir);

    book.mark_active("01234567890").await?;
    book.mark_awaiting("01234567890", "55").await?;

    assert_eq!(book.clear_active("01234567890").await?, MarkOutcome::Removed);
    assert_eq!(book.clear_awaiting("01234567890", "55").await?, MarkOutcome::Removed);
    assert_eq!(book.clear_awaiting("01234567890", "55").await?, MarkOutcome::NotPresent);

    let reader = store(&dir);
    assert!(reader.read_active().await?.is_empty());
    assert!(reader.read_awaiting().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_malformed_taxpayer_id_is_rejected() -> Result<()> {
    let dir = TempDir::new()?;
    let mut book = book(&dir);

    let err = book.mark_active("not-a-number").await.unwrap_err();
    assert!(matches!(err, ReconError::ValidationError { .. }));
    assert_ne!(err.severity().exit_code(), 0);
    assert!(!dir.path().join("consulta_ativa.json").exists());
    Ok(())
}
