use crate::domain::model::LoanRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const PAYROLL_SUBMODALITY: &str = "CRÉDITO PESSOAL - COM CONSIGNAÇÃO EM FOLHA DE PAGAM.";
pub const PAYROLL_DEBIT_CRITERION: &str = "FOLHA DE PAGAMENTO";

/// 篩選代扣薪資貸款的條件；排除的信貸線一律由設定提供
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityRules {
    pub submodality: String,
    pub debit_criterion: String,
    pub excluded_credit_lines: BTreeSet<i64>,
}

impl EligibilityRules {
    /// Payroll-deducted personal credit, minus the given credit lines.
    pub fn payroll(excluded_credit_lines: impl IntoIterator<Item = i64>) -> Self {
        Self {
            submodality: PAYROLL_SUBMODALITY.to_string(),
            debit_criterion: PAYROLL_DEBIT_CRITERION.to_string(),
            excluded_credit_lines: excluded_credit_lines.into_iter().collect(),
        }
    }

    pub fn is_eligible(&self, loan: &LoanRecord) -> bool {
        loan.submodality_code == self.submodality
            && loan.debit_criterion == self.debit_criterion
            && !self.excluded_credit_lines.contains(&loan.credit_line_code)
    }
}

/// Keeps the loans that pass every predicate, in ledger order.
pub fn filter_eligible(loans: &[LoanRecord], rules: &EligibilityRules) -> Vec<LoanRecord> {
    let eligible: Vec<LoanRecord> = loans
        .iter()
        .filter(|loan| rules.is_eligible(loan))
        .cloned()
        .collect();

    tracing::debug!(
        "Eligibility filter kept {} of {} loans ({} credit lines excluded)",
        eligible.len(),
        loans.len(),
        rules.excluded_credit_lines.len()
    );
    eligible
}
