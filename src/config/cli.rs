use clap::{Parser, Subcommand};

#[derive(Debug, Clone, Parser)]
#[command(name = "loan-recon")]
#[command(about = "Payroll loan reconciliation: worklists, status marks and exports")]
pub struct CliArgs {
    #[arg(long, default_value = "recon-config.toml", help = "TOML configuration file")]
    pub config: String,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Per-counterparty totals
    Summary,
    /// Contracts under active query, not yet awaiting or reconciled
    Worklist,
    /// Contracts waiting for counterparty confirmation
    Awaiting,
    /// Contracts already taken over
    Reconciled,
    /// Every eligible contract of one taxpayer
    Lookup { taxpayer_id: String },
    /// Cross-check status sets against the ledger
    Check,
    /// Write the ZIP bundle to the export directory
    Export {
        #[arg(long)]
        file: Option<String>,
    },
    MarkActive { taxpayer_id: String },
    ClearActive { taxpayer_id: String },
    MarkAwaiting { taxpayer_id: String, contract_id: String },
    ClearAwaiting { taxpayer_id: String, contract_id: String },
    MarkReconciled { taxpayer_id: String, contract_id: String },
}
