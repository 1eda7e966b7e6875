//! Ledger source over the two CSV exports of the loan system.
//!
//! Column headers are the ones the exports carry. Missing files, missing
//! columns and unparsable credit line codes make the whole ledger
//! unavailable; rows whose CPF or contract number cannot be canonicalized are
//! skipped and counted.

use crate::domain::keys::{ContractId, TaxpayerId};
use crate::domain::model::{Ledger, LoanRecord, ReconciliationRecord};
use crate::domain::ports::{LedgerSource, Storage};
use crate::utils::error::{ReconError, Result};
use async_trait::async_trait;
use csv::{ReaderBuilder, StringRecord};

pub const DEFAULT_LOANS_FILE: &str = "NovoEmprestimo.csv";
pub const DEFAULT_RECONCILIATION_FILE: &str = "Tombamento.csv";

pub mod loan_columns {
    pub const TAXPAYER_ID: &str = "Número CPF/CNPJ";
    pub const CONTRACT_ID: &str = "Número Contrato Crédito";
    pub const CLIENT_NAME: &str = "Nome Cliente";
    pub const SUBMODALITY: &str = "Submodalidade Bacen";
    pub const DEBIT_CRITERION: &str = "Critério Débito";
    pub const CREDIT_LINE: &str = "Código Linha Crédito";
    pub const OPEN_INSTALLMENTS: &str = "Quantidade Parcelas Abertas";
    pub const RATE: &str = "% Taxa Operação";
    pub const COMMERCIAL_NAME: &str = "Nome Comercial";
}

pub mod reconciliation_columns {
    pub const TAXPAYER_ID: &str = "CPF Tomador";
    pub const CONTRACT_ID: &str = "Número Contrato";
    pub const COUNTERPARTY_TAX_ID: &str = "CNPJ Empresa Consignante";
    pub const COUNTERPARTY_NAME: &str = "Empresa Consignante";
}

pub struct CsvLedgerSource<S: Storage> {
    storage: S,
    loans_file: String,
    reconciliation_file: String,
}

impl<S: Storage> CsvLedgerSource<S> {
    pub fn new(storage: S, loans_file: String, reconciliation_file: String) -> Self {
        Self {
            storage,
            loans_file,
            reconciliation_file,
        }
    }

    pub fn with_default_files(storage: S) -> Self {
        Self::new(
            storage,
            DEFAULT_LOANS_FILE.to_string(),
            DEFAULT_RECONCILIATION_FILE.to_string(),
        )
    }

    async fn read_table(&self, file: &str) -> Result<Table> {
        if !self.storage.exists(file).await? {
            return Err(ReconError::ledger_unavailable(file, "file not found"));
        }
        let bytes = self
            .storage
            .read_file(file)
            .await
            .map_err(|e| ReconError::ledger_unavailable(file, e.to_string()))?;
        Table::parse(file, &bytes)
    }
}

#[async_trait]
impl<S: Storage> LedgerSource for CsvLedgerSource<S> {
    async fn load_ledger(&self) -> Result<Ledger> {
        let loans_table = self.read_table(&self.loans_file).await?;
        let recon_table = self.read_table(&self.reconciliation_file).await?;

        let (loans, skipped_loans) = parse_loans(&loans_table)?;
        let (reconciliation, skipped_recon) = parse_reconciliation(&recon_table)?;

        Ok(Ledger {
            loans,
            reconciliation,
            skipped_rows: skipped_loans + skipped_recon,
        })
    }
}

struct Table {
    name: String,
    headers: StringRecord,
    rows: Vec<StringRecord>,
}

impl Table {
    fn parse(name: &str, bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ReconError::ledger_unavailable(name, format!("not UTF-8: {}", e)))?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        // 匯出檔有時以分號分隔
        let header_line = text.lines().next().unwrap_or_default();
        let delimiter = if header_line.contains(';') && !header_line.contains(',') {
            b';'
        } else {
            b','
        };

        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| ReconError::ledger_unavailable(name, e.to_string()))?
            .clone();
        let rows = reader
            .records()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ReconError::ledger_unavailable(name, e.to_string()))?;

        tracing::debug!("Parsed {} rows from {}", rows.len(), name);
        Ok(Self {
            name: name.to_string(),
            headers,
            rows,
        })
    }

    fn column(&self, header: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h == header)
            .ok_or_else(|| {
                ReconError::ledger_unavailable(&self.name, format!("missing column '{}'", header))
            })
    }
}

fn field(row: &StringRecord, index: usize) -> &str {
    row.get(index).unwrap_or_default()
}

fn parse_loans(table: &Table) -> Result<(Vec<LoanRecord>, usize)> {
    use loan_columns::*;

    let taxpayer_col = table.column(TAXPAYER_ID)?;
    let contract_col = table.column(CONTRACT_ID)?;
    let name_col = table.column(CLIENT_NAME)?;
    let submodality_col = table.column(SUBMODALITY)?;
    let debit_col = table.column(DEBIT_CRITERION)?;
    let line_col = table.column(CREDIT_LINE)?;
    let installments_col = table.column(OPEN_INSTALLMENTS)?;
    let rate_col = table.column(RATE)?;
    let commercial_col = table.column(COMMERCIAL_NAME)?;

    let mut loans = Vec::with_capacity(table.rows.len());
    let mut skipped = 0;

    for (i, row) in table.rows.iter().enumerate() {
        let line = i + 2;
        let (taxpayer_id, contract_id) =
            match parse_key(field(row, taxpayer_col), field(row, contract_col)) {
                Ok(key) => key,
                Err(e) => {
                    tracing::warn!("⚠️ {} line {}: skipping row ({})", table.name, line, e);
                    skipped += 1;
                    continue;
                }
            };

        let credit_line_code = parse_integer(field(row, line_col)).ok_or_else(|| {
            ReconError::ledger_unavailable(
                &table.name,
                format!(
                    "line {}: invalid {} '{}'",
                    line,
                    CREDIT_LINE,
                    field(row, line_col)
                ),
            )
        })?;

        loans.push(LoanRecord {
            taxpayer_id,
            contract_id,
            client_name: field(row, name_col).to_string(),
            submodality_code: field(row, submodality_col).to_string(),
            debit_criterion: field(row, debit_col).to_string(),
            credit_line_code,
            open_installments_count: parse_integer(field(row, installments_col))
                .and_then(|n| u32::try_from(n).ok()),
            operation_rate_percent: parse_decimal(field(row, rate_col)),
            commercial_name: field(row, commercial_col).to_string(),
        });
    }

    Ok((loans, skipped))
}

fn parse_reconciliation(table: &Table) -> Result<(Vec<ReconciliationRecord>, usize)> {
    use reconciliation_columns::*;

    let taxpayer_col = table.column(TAXPAYER_ID)?;
    let contract_col = table.column(CONTRACT_ID)?;
    let cnpj_col = table.column(COUNTERPARTY_TAX_ID)?;
    let name_col = table.column(COUNTERPARTY_NAME)?;

    let mut rows = Vec::with_capacity(table.rows.len());
    let mut skipped = 0;

    for (i, row) in table.rows.iter().enumerate() {
        match parse_key(field(row, taxpayer_col), field(row, contract_col)) {
            Ok((taxpayer_id, contract_id)) => rows.push(ReconciliationRecord {
                taxpayer_id,
                contract_id,
                counterparty_tax_id: field(row, cnpj_col).to_string(),
                counterparty_name: field(row, name_col).to_string(),
            }),
            Err(e) => {
                tracing::warn!("⚠️ {} line {}: skipping row ({})", table.name, i + 2, e);
                skipped += 1;
            }
        }
    }

    Ok((rows, skipped))
}

fn parse_key(raw_taxpayer_id: &str, raw_contract_id: &str) -> Result<(TaxpayerId, ContractId)> {
    Ok((
        TaxpayerId::parse(raw_taxpayer_id)?,
        ContractId::parse(raw_contract_id)?,
    ))
}

/// Accepts `140073` and the `140073.0` that spreadsheet exports produce.
fn parse_integer(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<i64>() {
        return Some(n);
    }
    let value = raw.parse::<f64>().ok()?;
    (value.fract() == 0.0 && value.is_finite()).then_some(value as i64)
}

fn parse_decimal(raw: &str) -> Option<f64> {
    let raw = raw.trim().trim_end_matches('%').trim();
    if raw.is_empty() {
        return None;
    }
    raw.replace(',', ".").parse().ok()
}
