//! # YieldLens Core
//!
//! Core library for YieldLens, a manufacturing yield analytics dashboard.
//! Provides tabular ingestion, the model gateway and providers, the response
//! normalizer and result merger, dashboard session state, configuration,
//! and fundamental types.

pub mod config;
pub mod error;
pub mod gateway;
pub mod ingestion;
pub mod merger;
pub mod normalizer;
pub mod parameters;
pub mod prompts;
pub mod providers;
pub mod session;
pub mod shell;
pub mod types;

// Re-export commonly used types at the crate root.
pub use config::{AppConfig, LlmConfig, LoggingConfig, ServerConfig, load_config};
pub use error::{
    ConfigError, IngestError, LlmError, NormalizeError, Result, ValidationError, YieldLensError,
};
pub use gateway::ModelGateway;
pub use merger::{MERGE_RULES, MergeRule, merge};
pub use normalizer::{normalize, normalize_with_trace};
pub use parameters::{HypotheticalInputs, InputValue, PREDICTION_PARAMETERS, ProcessParameter};
pub use providers::{LlmProvider, MockLlmProvider};
pub use session::{FlowTicket, Phase, Session, SessionStore, SessionView, SharedSession};
pub use shell::DashboardShell;
pub use types::{
    AnalysisResult, ChartData, ChartKind, FlowKind, NOT_PREDICTED, PartialAnalysisResult, Point,
    PointSeries, ResultField, ValueSeries, Visualization,
};
