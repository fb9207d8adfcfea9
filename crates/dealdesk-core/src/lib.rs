pub mod app_config;
pub mod calc;
mod config;
pub mod contacts;
pub mod leads;

pub use app_config::{AiSettings, AppConfig, Environment};
pub use calc::{
    aggregate_status_counts, compute_profit_and_roi, map_pins, summarize_dashboard,
    DashboardSummary, MapPin, ProfitAndRoi,
};
pub use config::{load_app_config, load_app_config_from_env};
pub use contacts::{Contact, NewContact};
pub use leads::{
    Analysis, ComparableSale, Coordinates, CountyRecord, GeneratedLead, Lead, LeadSource,
    LeadStatus, NewLead,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid lead status: {0}")]
    InvalidStatus(String),

    #[error("{0} is out of range for decimal arithmetic")]
    Overflow(&'static str),
}
