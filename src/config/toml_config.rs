use crate::core::candidates::{default_substitutions, CandidateRules};
use crate::core::eligibility::EligibilityRules;
use crate::utils::error::{ReconError, Result};
use crate::utils::retry::RetryPolicy;
use crate::utils::validation::{
    validate_file_extension, validate_path, validate_range, validate_required_field, validate_url, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconConfig {
    pub ledger: LedgerConfig,
    pub eligibility: EligibilityConfig,
    pub store: StoreConfig,
    pub export: Option<ExportConfig>,
    pub ocr: Option<OcrConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub directory: String,
    pub loans_file: Option<String>,
    pub reconciliation_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityConfig {
    pub submodality: Option<String>,
    pub debit_criterion: Option<String>,
    /// 必填：排除清單屬於營運設定，不寫死在程式裡
    pub excluded_credit_lines: Vec<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreType {
    Json,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub r#type: StoreType,
    pub directory: Option<String>,
    pub endpoint: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub max_retry_delay_ms: Option<u64>,
    pub verify_attempts: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    pub output_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    pub min_confidence: Option<f32>,
    pub substitutions: Option<BTreeMap<String, String>>,
}

impl ReconConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| ReconError::ConfigError {
            message: format!("cannot read {}: {}", path.as_ref().display(), e),
        })?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| ReconError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${STATUS_ENDPOINT})，未設定的保留原樣
    fn substitute_env_vars(content: &str) -> String {
        let re = Regex::new(r"\$\{([^}]+)\}").expect("valid env var pattern");

        re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        })
        .into_owned()
    }

    pub fn validate_config(&self) -> Result<()> {
        validate_path("ledger.directory", &self.ledger.directory)?;
        validate_file_extension("ledger.loans_file", &self.loans_file(), &["csv"])?;
        validate_file_extension("ledger.reconciliation_file", &self.reconciliation_file(), &["csv"])?;

        match self.store.r#type {
            StoreType::Json => {
                let directory = validate_required_field("store.directory", &self.store.directory)?;
                validate_path("store.directory", directory)?;
            }
            StoreType::Http => {
                let endpoint = validate_required_field("store.endpoint", &self.store.endpoint)?;
                validate_url("store.endpoint", endpoint)?;
            }
        }

        if let Some(attempts) = self.store.retry_attempts {
            validate_range("store.retry_attempts", attempts, 1, 10)?;
        }
        if let Some(attempts) = self.store.verify_attempts {
            validate_range("store.verify_attempts", attempts, 1, 10)?;
        }

        if let Some(export) = &self.export {
            validate_path("export.output_path", &export.output_path)?;
        }

        if let Some(ocr) = &self.ocr {
            if let Some(confidence) = ocr.min_confidence {
                validate_range("ocr.min_confidence", confidence, 0.0, 1.0)?;
            }
            if let Some(substitutions) = &ocr.substitutions {
                for (from, to) in substitutions {
                    if from.chars().count() != 1 || to.chars().count() != 1 {
                        return Err(ReconError::InvalidConfigValueError {
                            field: "ocr.substitutions".to_string(),
                            value: format!("{} = {}", from, to),
                            reason: "Substitutions map one character to one character".to_string(),
                        });
                    }
                }
            }
        }

        Ok(())
    }

    pub fn loans_file(&self) -> String {
        self.ledger
            .loans_file
            .clone()
            .unwrap_or_else(|| crate::adapters::csv_ledger::DEFAULT_LOANS_FILE.to_string())
    }

    pub fn reconciliation_file(&self) -> String {
        self.ledger
            .reconciliation_file
            .clone()
            .unwrap_or_else(|| crate::adapters::csv_ledger::DEFAULT_RECONCILIATION_FILE.to_string())
    }

    pub fn eligibility_rules(&self) -> EligibilityRules {
        let mut rules = EligibilityRules::payroll(self.eligibility.excluded_credit_lines.iter().copied());
        if let Some(submodality) = &self.eligibility.submodality {
            rules.submodality = submodality.clone();
        }
        if let Some(criterion) = &self.eligibility.debit_criterion {
            rules.debit_criterion = criterion.clone();
        }
        rules
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            max_attempts: self.store.retry_attempts.unwrap_or(defaults.max_attempts),
            base_delay: self
                .store
                .retry_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_delay),
            max_delay: self
                .store
                .max_retry_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
            verify_attempts: self.store.verify_attempts.unwrap_or(defaults.verify_attempts),
        }
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store.timeout_seconds.unwrap_or(30))
    }

    /// 設定檔的替換表會覆蓋預設表中相同的字元
    pub fn candidate_rules(&self) -> CandidateRules {
        let mut rules = CandidateRules::default();
        if let Some(ocr) = &self.ocr {
            if let Some(confidence) = ocr.min_confidence {
                rules.min_confidence = confidence;
            }
            if let Some(substitutions) = &ocr.substitutions {
                let mut table = default_substitutions();
                for (from, to) in substitutions {
                    if let (Some(from), Some(to)) = (from.chars().next(), to.chars().next()) {
                        table.insert(from, to);
                    }
                }
                rules.substitutions = table;
            }
        }
        rules
    }

    pub fn output_path(&self) -> &str {
        self.export
            .as_ref()
            .map(|e| e.output_path.as_str())
            .unwrap_or("./output")
    }
}

impl Validate for ReconConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::eligibility::{PAYROLL_DEBIT_CRITERION, PAYROLL_SUBMODALITY};
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BASIC: &str = r#"
[ledger]
directory = "./data"

[eligibility]
excluded_credit_lines = [140073, 138358, 141011, 101014, 137510]

[store]
type = "json"
directory = "./data"
"#;

    #[test]
    fn test_parse_basic_toml_config() {
        let config = ReconConfig::from_toml_str(BASIC).unwrap();

        assert_eq!(config.ledger.directory, "./data");
        assert_eq!(config.loans_file(), "NovoEmprestimo.csv");
        assert_eq!(config.reconciliation_file(), "Tombamento.csv");
        assert_eq!(config.store.r#type, StoreType::Json);
        assert_eq!(config.output_path(), "./output");
        assert!(config.validate().is_ok());

        let rules = config.eligibility_rules();
        assert_eq!(rules.submodality, PAYROLL_SUBMODALITY);
        assert_eq!(rules.debit_criterion, PAYROLL_DEBIT_CRITERION);
        assert!(rules.excluded_credit_lines.contains(&140073));
        assert_eq!(rules.excluded_credit_lines.len(), 5);

        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_exclusion_list_is_required() {
        let toml_content = r#"
[ledger]
directory = "./data"

[eligibility]

[store]
type = "json"
directory = "./data"
"#;
        assert!(matches!(
            ReconConfig::from_toml_str(toml_content),
            Err(ReconError::ConfigError { .. })
        ));
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("RECON_TEST_STATUS_ENDPOINT", "https://sheets.example.com/status");

        let toml_content = r#"
[ledger]
directory = "./data"

[eligibility]
excluded_credit_lines = []

[store]
type = "http"
endpoint = "${RECON_TEST_STATUS_ENDPOINT}"
retry_attempts = 5
retry_delay_ms = 50
"#;

        let config = ReconConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(
            config.store.endpoint.as_deref(),
            Some("https://sheets.example.com/status")
        );
        assert!(config.validate().is_ok());

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(50));

        std::env::remove_var("RECON_TEST_STATUS_ENDPOINT");
    }

    #[test]
    fn test_config_validation() {
        let missing_endpoint = BASIC.replace("type = \"json\"", "type = \"http\"");
        let config = ReconConfig::from_toml_str(&missing_endpoint).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ReconError::MissingConfigError { .. })
        ));

        let too_many_retries = format!("{}retry_attempts = 20\n", BASIC);
        let config = ReconConfig::from_toml_str(&too_many_retries).unwrap();
        assert!(config.validate().is_err());

        let bad_confidence = format!("{}\n[ocr]\nmin_confidence = 1.5\n", BASIC);
        let config = ReconConfig::from_toml_str(&bad_confidence).unwrap();
        assert!(config.validate().is_err());

        let bad_ledger = BASIC.replace(
            "directory = \"./data\"\n\n[eligibility]",
            "directory = \"./data\"\nloans_file = \"NovoEmprestimo.xlsx\"\n\n[eligibility]",
        );
        let config = ReconConfig::from_toml_str(&bad_ledger).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ocr_substitutions_override_defaults() {
        let toml_content = format!(
            "{}\n[ocr]\nmin_confidence = 0.8\nsubstitutions = {{ O = \"0\", T = \"7\" }}\n",
            BASIC
        );
        let config = ReconConfig::from_toml_str(&toml_content).unwrap();
        assert!(config.validate().is_ok());

        let rules = config.candidate_rules();
        assert_eq!(rules.min_confidence, 0.8);
        assert_eq!(rules.substitutions.get(&'T'), Some(&'7'));
        assert_eq!(rules.substitutions.get(&'B'), Some(&'8'));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(BASIC.as_bytes()).unwrap();

        let config = ReconConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.eligibility.excluded_credit_lines[0], 140073);
    }

    #[test]
    fn test_missing_file_is_a_config_error() {
        assert!(matches!(
            ReconConfig::from_file("/nonexistent/recon-config.toml"),
            Err(ReconError::ConfigError { .. })
        ));
    }
}
