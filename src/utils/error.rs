use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconError {
    #[error("Ledger source '{source_name}' unavailable: {reason}")]
    LedgerUnavailable { source_name: String, reason: String },

    #[error("Status store '{store}' unavailable: {reason}")]
    StoreUnavailable { store: String, reason: String },

    #[error("Concurrent write detected on status set '{set}'")]
    StoreConflict { set: String },

    #[error("Invalid {field} '{value}': {reason}")]
    ValidationError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Transition refused for {key}: {reason}")]
    TransitionConflict { key: String, reason: String },

    #[error("{key} was reconciled but is still awaiting after {attempts} verification attempts")]
    PartialCompletion { key: String, attempts: u32 },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid configuration value for {field} ('{value}'): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ReconError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Ledger,
    Store,
    Validation,
    Workflow,
    Configuration,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    /// 根據錯誤嚴重程度決定 CLI 退出碼，失敗一律非零
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorSeverity::Medium => 2, // 可重試
            ErrorSeverity::High => 1,   // 輸入或處理錯誤
            ErrorSeverity::Critical => 3,
        }
    }
}

impl ReconError {
    pub fn validation(field: &str, value: &str, reason: impl Into<String>) -> Self {
        ReconError::ValidationError {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub fn ledger_unavailable(source_name: &str, reason: impl Into<String>) -> Self {
        ReconError::LedgerUnavailable {
            source_name: source_name.to_string(),
            reason: reason.into(),
        }
    }

    pub fn store_unavailable(store: &str, reason: impl Into<String>) -> Self {
        ReconError::StoreUnavailable {
            store: store.to_string(),
            reason: reason.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ReconError::LedgerUnavailable { .. } | ReconError::CsvError(_) => ErrorCategory::Ledger,
            ReconError::StoreUnavailable { .. }
            | ReconError::StoreConflict { .. }
            | ReconError::HttpError(_) => ErrorCategory::Store,
            ReconError::ValidationError { .. } => ErrorCategory::Validation,
            ReconError::TransitionConflict { .. } | ReconError::PartialCompletion { .. } => {
                ErrorCategory::Workflow
            }
            ReconError::ConfigError { .. }
            | ReconError::InvalidConfigValueError { .. }
            | ReconError::MissingConfigError { .. } => ErrorCategory::Configuration,
            ReconError::ZipError(_)
            | ReconError::IoError(_)
            | ReconError::SerializationError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ReconError::StoreUnavailable { .. }
            | ReconError::StoreConflict { .. }
            | ReconError::HttpError(_) => ErrorSeverity::Medium,
            ReconError::ValidationError { .. }
            | ReconError::TransitionConflict { .. }
            | ReconError::LedgerUnavailable { .. }
            | ReconError::CsvError(_)
            | ReconError::ConfigError { .. }
            | ReconError::InvalidConfigValueError { .. }
            | ReconError::MissingConfigError { .. } => ErrorSeverity::High,
            ReconError::PartialCompletion { .. }
            | ReconError::ZipError(_)
            | ReconError::IoError(_)
            | ReconError::SerializationError(_) => ErrorSeverity::Critical,
        }
    }

    /// 只有暫時性的儲存錯誤值得以退避重試
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReconError::StoreUnavailable { .. })
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Ledger => {
                "Check that NovoEmprestimo and Tombamento exist with the expected columns, then retry"
            }
            ErrorCategory::Store => "Check connectivity to the status store and retry the command",
            ErrorCategory::Validation => {
                "CPF must contain up to 11 digits and the contract number cannot be empty"
            }
            ErrorCategory::Workflow => {
                "Run `check` to inspect the status sets, fix them and repeat the operation"
            }
            ErrorCategory::Configuration => "Review the TOML configuration file",
            ErrorCategory::System => "Check file permissions and available disk space",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            ReconError::LedgerUnavailable { source_name, .. } => {
                format!("Could not load the ledger '{}'", source_name)
            }
            ReconError::StoreUnavailable { store, .. } => {
                format!("The status store '{}' is not reachable", store)
            }
            ReconError::StoreConflict { set } => {
                format!("Someone else changed '{}' at the same time", set)
            }
            ReconError::PartialCompletion { key, .. } => {
                format!("{} was reconciled but could not be removed from awaiting", key)
            }
            other => other.to_string(),
        }
    }
}
