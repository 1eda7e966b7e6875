//! Canonical identifiers shared by the ledger, the reconciliation table and
//! every status set.
//!
//! `TaxpayerId` and `ContractId` can only be built through `parse`, which is
//! the one place normalization happens. Everything downstream compares the
//! canonical strings as-is.

use crate::utils::error::{ReconError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const TAXPAYER_ID_LEN: usize = 11;

/// 11 位數字的 CPF，左側補零
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaxpayerId(String);

impl TaxpayerId {
    /// Strips every non-digit and left-pads with zeros to 11 characters.
    /// `"012.345.678-90"`, `"12345678090"` and `" 12345678090 "` all map to
    /// `"01234567890"`.
    pub fn parse(raw: &str) -> Result<Self> {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

        if digits.is_empty() {
            return Err(ReconError::validation(
                "taxpayer_id",
                raw,
                "no digits found",
            ));
        }
        if digits.len() > TAXPAYER_ID_LEN {
            return Err(ReconError::validation(
                "taxpayer_id",
                raw,
                format!(
                    "{} digits, at most {} allowed",
                    digits.len(),
                    TAXPAYER_ID_LEN
                ),
            ));
        }

        Ok(Self(format!("{:0>width$}", digits, width = TAXPAYER_ID_LEN)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the two CPF check digits match the first nine digits.
    pub fn has_valid_check_digits(&self) -> bool {
        let digits: Vec<u32> = self.0.chars().filter_map(|c| c.to_digit(10)).collect();
        if digits.iter().all(|d| *d == digits[0]) {
            return false;
        }

        let check = |len: usize| -> u32 {
            let sum: u32 = digits[..len]
                .iter()
                .zip((2..=len as u32 + 1).rev())
                .map(|(d, w)| d * w)
                .sum();
            match sum % 11 {
                0 | 1 => 0,
                r => 11 - r,
            }
        };

        check(9) == digits[9] && check(10) == digits[10]
    }
}

impl TryFrom<String> for TaxpayerId {
    type Error = ReconError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<TaxpayerId> for String {
    fn from(value: TaxpayerId) -> Self {
        value.0
    }
}

impl fmt::Display for TaxpayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 契約編號以字串比對，僅去除前後空白
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContractId(String);

impl ContractId {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ReconError::validation(
                "contract_id",
                raw,
                "contract number cannot be empty",
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ContractId {
    type Error = ReconError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ContractId> for String {
    fn from(value: ContractId) -> Self {
        value.0
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContractKey {
    pub taxpayer_id: TaxpayerId,
    pub contract_id: ContractId,
}

impl ContractKey {
    pub fn new(taxpayer_id: TaxpayerId, contract_id: ContractId) -> Self {
        Self {
            taxpayer_id,
            contract_id,
        }
    }

    pub fn parse(raw_taxpayer_id: &str, raw_contract_id: &str) -> Result<Self> {
        Ok(Self::new(
            TaxpayerId::parse(raw_taxpayer_id)?,
            ContractId::parse(raw_contract_id)?,
        ))
    }
}

impl fmt::Display for ContractKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.taxpayer_id, self.contract_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxpayer_id_normalization() {
        assert_eq!(TaxpayerId::parse("012.345.678-90").unwrap().as_str(), "01234567890");
        assert_eq!(TaxpayerId::parse("1234567890").unwrap().as_str(), "01234567890");
        assert_eq!(TaxpayerId::parse(" 42 ").unwrap().as_str(), "00000000042");
    }

    #[test]
    fn test_taxpayer_id_rejects_malformed_input() {
        assert!(matches!(
            TaxpayerId::parse("abc"),
            Err(ReconError::ValidationError { .. })
        ));
        assert!(TaxpayerId::parse("").is_err());
        // CNPJ has 14 digits
        assert!(TaxpayerId::parse("12.345.678/0001-95").is_err());
    }

    #[test]
    fn test_check_digits() {
        assert!(TaxpayerId::parse("01234567890").unwrap().has_valid_check_digits());
        assert!(TaxpayerId::parse("529.982.247-25").unwrap().has_valid_check_digits());
        assert!(!TaxpayerId::parse("529.982.247-26").unwrap().has_valid_check_digits());
        assert!(!TaxpayerId::parse("11111111111").unwrap().has_valid_check_digits());
    }

    #[test]
    fn test_contract_id_is_trimmed_but_not_reinterpreted() {
        assert_eq!(ContractId::parse(" 0055 ").unwrap().as_str(), "0055");
        assert_ne!(ContractId::parse("0055").unwrap(), ContractId::parse("55").unwrap());
        assert!(ContractId::parse("   ").is_err());
    }

    #[test]
    fn test_keys_deserialize_through_canonicalization() {
        let key: ContractKey =
            serde_json::from_str(r#"{"taxpayer_id":"123.456.789-0","contract_id":" 55"}"#).unwrap();
        assert_eq!(key, ContractKey::parse("01234567890", "55").unwrap());

        let bad: std::result::Result<ContractKey, _> =
            serde_json::from_str(r#"{"taxpayer_id":"x","contract_id":"55"}"#);
        assert!(bad.is_err());
    }
}
