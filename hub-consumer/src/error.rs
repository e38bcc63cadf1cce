use hub_common::report::DiagnosticCode;
use rdkafka::error::KafkaError;
use thiserror::Error;

/// Why routing produced no destinations. A fetch failure is a distinct
/// condition from "rules exist but none matched", and both are distinct
/// from "no rules configured at all"; operators triage them differently.
#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("failed to fetch routing rules: {0}")]
    Fetch(String),
    #[error("zero active rules configured for this organization")]
    NoRules,
    #[error("rules fetched but none matched this document")]
    NoMatch,
}

impl RoutingError {
    pub fn code(&self) -> DiagnosticCode {
        match self {
            RoutingError::Fetch(_) => DiagnosticCode::RuleFetchFailed,
            RoutingError::NoRules => DiagnosticCode::NoRulesConfigured,
            RoutingError::NoMatch => DiagnosticCode::NoRuleMatched,
        }
    }

    /// True when rules were fetched successfully but yielded no route,
    /// which warrants an advisory alert in addition to the status writes.
    pub fn is_no_route(&self) -> bool {
        matches!(self, RoutingError::NoRules | RoutingError::NoMatch)
    }
}

/// A single destination delivery that did not succeed.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("request to destination failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("destination returned status {0}")]
    ErrorStatus(reqwest::StatusCode),
}

/// Errors raised by status store calls. Callers catch and report these;
/// they never abort the pipeline.
#[derive(Error, Debug)]
pub enum StatusStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Bootstrap errors that prevent the consumer from starting at all.
#[derive(Error, Debug)]
pub enum HubError {
    #[error("invalid configuration: {0}")]
    Config(#[from] envconfig::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("kafka error: {0}")]
    Kafka(#[from] KafkaError),
}
