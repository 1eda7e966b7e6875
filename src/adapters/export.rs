use crate::core::session::SessionReport;
use crate::domain::model::{ClassifiedRecord, CounterpartySummary};
use crate::domain::ports::Storage;
use crate::utils::error::{ReconError, Result};
use std::io::Write;
use zip::write::{FileOptions, ZipWriter};

pub const ANALYTIC_FILE: &str = "relacao_analitica.csv";
pub const SUMMARY_FILE: &str = "resumo.csv";
pub const CONSISTENCY_FILE: &str = "consistencia.json";

pub const ANALYTIC_HEADERS: [&str; 12] = [
    "Número CPF/CNPJ",
    "Nome Cliente",
    "Número Contrato Crédito",
    "Quantidade Parcelas Abertas",
    "% Taxa Operação",
    "Código Linha Crédito",
    "Nome Comercial",
    "CNPJ Empresa Consignante",
    "Empresa Consignante",
    "Consulta Ativa",
    "Aguardando",
    "Tombado",
];

pub const SUMMARY_HEADERS: [&str; 7] = [
    "CNPJ Empresa Consignante",
    "Empresa Consignante",
    "Total_Cooperados",
    "Total_de_Contratos",
    "Total_Consulta_Ativa",
    "Total_Tombados",
    "Total_Aguardando",
];

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Sim"
    } else {
        "Não"
    }
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>> {
    writer
        .into_inner()
        .map_err(|e| ReconError::IoError(e.into_error()))
}

/// Flat, comma-delimited UTF-8 listing of any set of classified contracts.
pub fn analytic_csv<'a>(records: impl IntoIterator<Item = &'a ClassifiedRecord>) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(ANALYTIC_HEADERS)?;

    for r in records {
        let loan = &r.record.loan;
        let installments = loan
            .open_installments_count
            .map(|n| n.to_string())
            .unwrap_or_default();
        let rate = loan
            .operation_rate_percent
            .map(|rate| rate.to_string())
            .unwrap_or_default();
        let credit_line = loan.credit_line_code.to_string();

        writer.write_record([
            loan.taxpayer_id.as_str(),
            loan.client_name.as_str(),
            loan.contract_id.as_str(),
            installments.as_str(),
            rate.as_str(),
            credit_line.as_str(),
            loan.commercial_name.as_str(),
            r.record.counterparty.tax_id.as_str(),
            r.record.counterparty.name.as_str(),
            yes_no(r.status.is_active),
            yes_no(r.status.is_awaiting),
            yes_no(r.status.is_reconciled),
        ])?;
    }

    finish(writer)
}

pub fn summary_csv(summary: &[CounterpartySummary]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(SUMMARY_HEADERS)?;

    for s in summary {
        writer.write_record([
            s.counterparty.tax_id.clone(),
            s.counterparty.name.clone(),
            s.distinct_taxpayers.to_string(),
            s.total_contracts.to_string(),
            s.active_count.to_string(),
            s.reconciled_count.to_string(),
            s.awaiting_count.to_string(),
        ])?;
    }

    finish(writer)
}

/// ZIP with the analytic listing, the per-counterparty summary and the
/// consistency report.
pub fn export_bundle(report: &SessionReport) -> Result<Vec<u8>> {
    let analytic = analytic_csv(&report.classified)?;
    let summary = summary_csv(&report.summary)?;
    let consistency = serde_json::to_vec_pretty(&report.consistency)?;

    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));

    zip.start_file::<_, ()>(ANALYTIC_FILE, FileOptions::default())?;
    zip.write_all(&analytic)?;

    zip.start_file::<_, ()>(SUMMARY_FILE, FileOptions::default())?;
    zip.write_all(&summary)?;

    zip.start_file::<_, ()>(CONSISTENCY_FILE, FileOptions::default())?;
    zip.write_all(&consistency)?;

    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

pub struct ReportExporter<S: Storage> {
    storage: S,
}

impl<S: Storage> ReportExporter<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Writes the bundle and returns the file name it was stored under.
    pub async fn export(&self, report: &SessionReport, file_name: Option<&str>) -> Result<String> {
        let file_name = file_name.map(str::to_string).unwrap_or_else(|| {
            format!(
                "conciliacao_{}.zip",
                report.consistency.generated_at.format("%Y%m%d_%H%M%S")
            )
        });

        let bundle = export_bundle(report)?;
        tracing::debug!("Writing export bundle ({} bytes) to storage", bundle.len());
        self.storage.write_file(&file_name, &bundle).await?;

        tracing::info!("📁 Export saved as {}", file_name);
        Ok(file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::eligibility::tests::payroll_loan;
    use crate::domain::model::{Counterparty, EnrichedRecord, StatusFlags};

    fn classified(active: bool) -> ClassifiedRecord {
        ClassifiedRecord {
            record: EnrichedRecord {
                loan: payroll_loan("01234567890", "55", 999999),
                counterparty: Counterparty::new("11.222.333/0001-81", "PREFEITURA, X"),
                match_count: 1,
            },
            status: StatusFlags {
                is_active: active,
                is_awaiting: false,
                is_reconciled: true,
            },
        }
    }

    #[test]
    fn test_analytic_csv_columns_and_flags() {
        let records = vec![classified(true)];
        let csv = String::from_utf8(analytic_csv(&records).unwrap()).unwrap();
        let mut lines = csv.lines();

        assert_eq!(lines.next().unwrap(), ANALYTIC_HEADERS.join(","));
        let row = lines.next().unwrap();
        assert!(row.starts_with("01234567890,Cliente 01234567890,55,12,1.85,999999,"));
        assert!(row.contains("\"PREFEITURA, X\""));
        assert!(row.ends_with("Sim,Não,Sim"));
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_summary_csv() {
        let summary = vec![CounterpartySummary {
            counterparty: Counterparty::unknown(),
            distinct_taxpayers: 2,
            total_contracts: 3,
            active_count: 1,
            reconciled_count: 0,
            awaiting_count: 1,
        }];
        let csv = String::from_utf8(summary_csv(&summary).unwrap()).unwrap();
        assert!(csv.contains("CONSULTE SISBR,CONSULTE SISBR,2,3,1,0,1"));
    }
}
