use clap::Parser;
use loan_recon::config::cli::{CliArgs, Command};
use loan_recon::config::StoreType;
use loan_recon::core::StatusStore;
use loan_recon::domain::keys::TaxpayerId;
use loan_recon::domain::model::ClassifiedRecord;
use loan_recon::utils::{logger, validation::Validate};
use loan_recon::{
    CsvLedgerSource, HttpStatusStore, JsonStatusStore, LocalStorage, ReconConfig, ReconError,
    ReconciliationSession, ReportExporter, Result, StatusBook,
};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    if args.json_logs {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("Starting loan-recon CLI");
    tracing::debug!("CLI args: {:?}", args);

    let exit_code = match run(&args).await {
        Ok(code) => code,
        Err(e) => report_failure(&e),
    };

    if exit_code > 0 {
        std::process::exit(exit_code);
    }
}

async fn run(args: &CliArgs) -> Result<i32> {
    let config = ReconConfig::from_file(&args.config)?;
    config.validate()?;

    let ledger = CsvLedgerSource::new(
        LocalStorage::new(config.ledger.directory.clone()),
        config.loans_file(),
        config.reconciliation_file(),
    );

    // 兩種儲存各自具現化同一段流程
    match config.store.r#type {
        StoreType::Json => {
            let directory = config.store.directory.clone().unwrap_or_default();
            let store = JsonStatusStore::new(LocalStorage::new(directory));
            execute(args, &config, ledger, store).await
        }
        StoreType::Http => {
            let endpoint = config.store.endpoint.clone().unwrap_or_default();
            let store = HttpStatusStore::new(&endpoint, config.store_timeout())?;
            execute(args, &config, ledger, store).await
        }
    }
}

async fn execute<S: StatusStore>(
    args: &CliArgs,
    config: &ReconConfig,
    ledger: CsvLedgerSource<LocalStorage>,
    store: S,
) -> Result<i32> {
    tracing::debug!("Using '{}' status store", store.name());
    let book = StatusBook::new(store, config.retry_policy());
    let mut session = ReconciliationSession::new(ledger, book, config.eligibility_rules())
        .with_candidate_rules(config.candidate_rules());

    match &args.command {
        Command::Summary => {
            let report = session.report().await?;
            println!(
                "{:<20} {:<40} {:>10} {:>10} {:>8} {:>10} {:>10}",
                "CNPJ", "Empresa", "Cooperados", "Contratos", "Ativa", "Tombados", "Aguardando"
            );
            for s in &report.summary {
                println!(
                    "{:<20} {:<40} {:>10} {:>10} {:>8} {:>10} {:>10}",
                    s.counterparty.tax_id,
                    s.counterparty.name,
                    s.distinct_taxpayers,
                    s.total_contracts,
                    s.active_count,
                    s.reconciled_count,
                    s.awaiting_count
                );
            }
            println!(
                "📊 {} eligible of {} ledger loans ({} rows skipped)",
                report.eligible_count(),
                report.ledger_loans,
                report.skipped_rows
            );
        }
        Command::Worklist => print_records(&session.report().await?.worklist()),
        Command::Awaiting => print_records(&session.report().await?.awaiting()),
        Command::Reconciled => print_records(&session.report().await?.reconciled()),
        Command::Lookup { taxpayer_id } => {
            let taxpayer_id = TaxpayerId::parse(taxpayer_id)?;
            let report = session.report().await?;
            let contracts = report.lookup(&taxpayer_id);
            if contracts.is_empty() {
                println!("No eligible contracts for {}", taxpayer_id);
            }
            print_records(&contracts);
        }
        Command::Check => {
            let report = session.report().await?;
            let consistency = &report.consistency;
            if consistency.is_clean() {
                println!("✅ Status sets are consistent with the ledger");
                return Ok(0);
            }
            for issue in &consistency.issues {
                tracing::warn!("⚠️ {}", issue);
                println!("{:?}: {}", issue.level(), issue);
            }
            return Ok(2);
        }
        Command::Export { file } => {
            let report = session.report().await?;
            let exporter = ReportExporter::new(LocalStorage::new(config.output_path().to_string()));
            let name = exporter.export(&report, file.as_deref()).await?;
            println!("📁 Export saved to: {}/{}", config.output_path(), name);
        }
        Command::MarkActive { taxpayer_id } => {
            let outcome = session.mark_active(taxpayer_id).await?;
            println!("{:?}", outcome);
        }
        Command::ClearActive { taxpayer_id } => {
            let outcome = session.clear_active(taxpayer_id).await?;
            println!("{:?}", outcome);
        }
        Command::MarkAwaiting { taxpayer_id, contract_id } => {
            let outcome = session.mark_awaiting(taxpayer_id, contract_id).await?;
            println!("{:?}", outcome);
        }
        Command::ClearAwaiting { taxpayer_id, contract_id } => {
            let outcome = session.clear_awaiting(taxpayer_id, contract_id).await?;
            println!("{:?}", outcome);
        }
        Command::MarkReconciled { taxpayer_id, contract_id } => {
            let outcome = session.mark_reconciled(taxpayer_id, contract_id).await?;
            println!("{:?}", outcome);
        }
    }

    Ok(0)
}

fn print_records(records: &[&ClassifiedRecord]) {
    for r in records {
        let loan = &r.record.loan;
        println!(
            "{}  {:<12} {:<40} {}",
            loan.taxpayer_id, loan.contract_id, loan.client_name, r.record.counterparty
        );
    }
    println!("{} contracts", records.len());
}

fn report_failure(e: &ReconError) -> i32 {
    tracing::error!(
        "❌ Command failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());

    e.severity().exit_code()
}
