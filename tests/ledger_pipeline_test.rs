use anyhow::Result;
use loan_recon::adapters::export::{ANALYTIC_FILE, CONSISTENCY_FILE, SUMMARY_FILE};
use loan_recon::core::eligibility::EligibilityRules;
use loan_recon::domain::keys::TaxpayerId;
use loan_recon::domain::model::UNKNOWN_COUNTERPARTY;
use loan_recon::utils::retry::RetryPolicy;
use loan_recon::{
    CsvLedgerSource, JsonStatusStore, LocalStorage, ReconError, ReconciliationSession, ReportExporter,
    StatusBook,
};
use std::io::Read;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

const PAYROLL: &str = "CRÉDITO PESSOAL - COM CONSIGNAÇÃO EM FOLHA DE PAGAM.";

fn loans_csv() -> String {
    let header = "Número CPF/CNPJ;Nome Cliente;Número Contrato Crédito;Submodalidade Bacen;Critério Débito;Código Linha Crédito;Quantidade Parcelas Abertas;% Taxa Operação;Nome Comercial";
    let rows = [
        // 有對帳資料的合格貸款
        format!("012.345.678-90;Ana Souza;100;{};FOLHA DE PAGAMENTO;999999;24;1,85;CONSIGNADO PRIVADO", PAYROLL),
        // 排除的信貸線
        format!("529.982.247-25;Bruno Lima;200;{};FOLHA DE PAGAMENTO;140073;12;2,10;CONSIGNADO PRIVADO", PAYROLL),
        // 合格但沒有對帳資料
        format!("529.982.247-25;Bruno Lima;201;{};FOLHA DE PAGAMENTO;555.0;36;1,99%;CONSIGNADO PRIVADO", PAYROLL),
        // 其他子類別
        "111.444.777-35;Carla Dias;300;CHEQUE ESPECIAL;CONTA CORRENTE;1;;;CHEQUE".to_string(),
        // 法人統編無法正規化
        format!("12.345.678/0001-95;Empresa SA;400;{};FOLHA DE PAGAMENTO;999999;10;1,50;CONSIGNADO PRIVADO", PAYROLL),
    ];
    format!("{}\n{}\n", header, rows.join("\n"))
}

fn reconciliation_csv() -> String {
    [
        "CPF Tomador,Número Contrato,CNPJ Empresa Consignante,Empresa Consignante",
        "01234567890,100,11.222.333/0001-81,PREFEITURA MUNICIPAL",
        "52998224725,200,11.222.333/0001-81,PREFEITURA MUNICIPAL",
    ]
    .join("\n")
}

fn write_ledger(dir: &TempDir) -> Result<()> {
    std::fs::write(dir.path().join("NovoEmprestimo.csv"), loans_csv())?;
    std::fs::write(dir.path().join("Tombamento.csv"), reconciliation_csv())?;
    Ok(())
}

fn session(dir: &TempDir) -> ReconciliationSession<CsvLedgerSource<LocalStorage>, JsonStatusStore<LocalStorage>> {
    let base = dir.path().to_str().unwrap().to_string();
    let ledger = CsvLedgerSource::with_default_files(LocalStorage::new(base.clone()));
    let book = StatusBook::new(
        JsonStatusStore::new(LocalStorage::new(base)),
        RetryPolicy::immediate(3),
    );
    ReconciliationSession::new(
        ledger,
        book,
        EligibilityRules::payroll([140073, 138358, 141011, 101014, 137510]),
    )
}

#[tokio::test]
async fn test_report_from_csv_ledger() -> Result<()> {
    let dir = TempDir::new()?;
    write_ledger(&dir)?;
    let mut session = session(&dir);

    let report = session.report().await?;

    assert_eq!(report.ledger_loans, 4);
    assert_eq!(report.skipped_rows, 1);
    assert_eq!(report.eligible_count(), 2);

    let contracts: Vec<&str> = report
        .classified
        .iter()
        .map(|r| r.record.loan.contract_id.as_str())
        .collect();
    assert_eq!(contracts, vec!["100", "201"]);

    // 沒有對帳資料的合約歸到佔位的對帳方
    let unmatched = &report.classified[1];
    assert_eq!(unmatched.record.counterparty.name, UNKNOWN_COUNTERPARTY);
    assert_eq!(unmatched.record.loan.operation_rate_percent, Some(1.99));

    let total: usize = report.summary.iter().map(|s| s.total_contracts).sum();
    assert_eq!(total, report.eligible_count());
    assert_eq!(report.summary.len(), 2);
    assert_eq!(report.summary[0].counterparty.name, "PREFEITURA MUNICIPAL");
    assert!(report.summary[1].counterparty.is_unknown());

    assert!(report.consistency.is_clean());
    Ok(())
}

#[tokio::test]
async fn test_marks_flow_into_views() -> Result<()> {
    let dir = TempDir::new()?;
    write_ledger(&dir)?;
    let mut session = session(&dir);

    assert!(session.report().await?.worklist().is_empty());

    assert_ok!(session.mark_active("012.345.678-90").await);
    assert_ok!(session.mark_awaiting("52998224725", "201").await);

    let report = session.report().await?;
    assert_eq!(report.worklist().len(), 1);
    assert_eq!(report.awaiting().len(), 1);
    assert!(report.reconciled().is_empty());

    session.mark_reconciled("52998224725", "201").await?;
    let report = session.report().await?;
    assert!(report.awaiting().is_empty());
    assert_eq!(report.reconciled().len(), 1);

    let bruno = TaxpayerId::parse("529.982.247-25")?;
    let contracts = report.lookup(&bruno);
    assert_eq!(contracts.len(), 1);
    assert!(contracts[0].status.is_reconciled);

    let summary = &report.summary[1];
    assert_eq!(summary.reconciled_count, 1);
    assert_eq!(summary.awaiting_count, 0);
    Ok(())
}

#[tokio::test]
async fn test_export_bundle_is_written() -> Result<()> {
    let dir = TempDir::new()?;
    let out = TempDir::new()?;
    write_ledger(&dir)?;
    let mut session = session(&dir);
    let report = session.report().await?;

    let exporter = ReportExporter::new(LocalStorage::new(out.path().to_str().unwrap().to_string()));
    let name = exporter.export(&report, Some("conciliacao.zip")).await?;
    assert_eq!(name, "conciliacao.zip");

    let bytes = std::fs::read(out.path().join(&name))?;
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))?;
    let names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).map(|f| f.name().to_string()))
        .collect::<std::result::Result<_, _>>()?;
    assert_eq!(names, vec![ANALYTIC_FILE, SUMMARY_FILE, CONSISTENCY_FILE]);

    let mut analytic = String::new();
    archive.by_name(ANALYTIC_FILE)?.read_to_string(&mut analytic)?;
    assert_eq!(analytic.lines().count(), 3);
    assert!(analytic.contains("PREFEITURA MUNICIPAL"));
    assert!(analytic.contains(UNKNOWN_COUNTERPARTY));

    let mut summary = String::new();
    archive.by_name(SUMMARY_FILE)?.read_to_string(&mut summary)?;
    assert!(summary.starts_with("CNPJ Empresa Consignante,Empresa Consignante,Total_Cooperados"));

    let mut consistency = String::new();
    archive.by_name(CONSISTENCY_FILE)?.read_to_string(&mut consistency)?;
    let json: serde_json::Value = serde_json::from_str(&consistency)?;
    assert_eq!(json["issues"].as_array().map(|a| a.len()), Some(0));
    Ok(())
}

#[tokio::test]
async fn test_missing_ledger_file_is_reported() -> Result<()> {
    let dir = TempDir::new()?;
    std::fs::write(dir.path().join("NovoEmprestimo.csv"), loans_csv())?;
    let mut session = session(&dir);

    let err = assert_err!(session.report().await);
    assert!(matches!(err, ReconError::LedgerUnavailable { .. }));
    Ok(())
}
