//! Coded diagnostic reporting for the event pipeline.
//!
//! Every error path in the pipeline emits exactly one structured diagnostic
//! through [`emit`] before the ack/nack decision is made. The decision itself
//! (proceed, abort, ack, nack) is always taken by the caller alongside the
//! report; nothing inspects a diagnostic to drive control flow.

use tracing::error;

use crate::metrics::DIAGNOSTICS_EMITTED;

/// Stable numeric codes for every diagnostic the pipeline can raise.
///
/// Codes are grouped by concern: 1xxx envelope, 2xxx routing, 3xxx delivery,
/// 4xxx persistence side channels, 5xxx broker. Operators alert on these, so
/// existing values must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum DiagnosticCode {
    MissingOrganizationId = 1001,
    MissingContentType = 1002,
    MissingContentEncoding = 1003,
    MissingEventId = 1004,
    MissingClientId = 1005,
    EmptyBody = 1006,
    MalformedBody = 1007,
    RuleFetchFailed = 2001,
    NoRulesConfigured = 2002,
    NoRuleMatched = 2003,
    DeliveryFailed = 3001,
    StatusWriteFailed = 4001,
    SearchUpdateFailed = 4002,
    AlertSendFailed = 4003,
    DisplayNameLookupFailed = 4004,
    DeadLetterPublishFailed = 5001,
    BrokerUnavailable = 5002,
}

impl DiagnosticCode {
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Short label used for metric tags and log grepping.
    pub fn label(&self) -> &'static str {
        match self {
            Self::MissingOrganizationId => "missing_organization_id",
            Self::MissingContentType => "missing_content_type",
            Self::MissingContentEncoding => "missing_content_encoding",
            Self::MissingEventId => "missing_event_id",
            Self::MissingClientId => "missing_client_id",
            Self::EmptyBody => "empty_body",
            Self::MalformedBody => "malformed_body",
            Self::RuleFetchFailed => "rule_fetch_failed",
            Self::NoRulesConfigured => "no_rules_configured",
            Self::NoRuleMatched => "no_rule_matched",
            Self::DeliveryFailed => "delivery_failed",
            Self::StatusWriteFailed => "status_write_failed",
            Self::SearchUpdateFailed => "search_update_failed",
            Self::AlertSendFailed => "alert_send_failed",
            Self::DisplayNameLookupFailed => "display_name_lookup_failed",
            Self::DeadLetterPublishFailed => "dead_letter_publish_failed",
            Self::BrokerUnavailable => "broker_unavailable",
        }
    }
}

/// A single emitted diagnostic, kept around by callers that need to collect
/// several before deciding a message's fate (envelope validation does).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub message: String,
}

impl Diagnostic {
    pub fn new(code: DiagnosticCode, detail: impl Into<String>) -> Self {
        Diagnostic {
            code,
            message: detail.into(),
        }
    }
}

/// Log a coded diagnostic and bump its counter, returning the formatted
/// message for callers that persist it (e.g. as destination response text).
pub fn emit(code: DiagnosticCode, event_id: Option<&str>, detail: &str) -> String {
    let message = format!("EVTHUB-{} {}: {}", code.code(), code.label(), detail);
    error!(
        code = code.code(),
        event_id = event_id.unwrap_or("unknown"),
        "{message}"
    );
    metrics::counter!(DIAGNOSTICS_EMITTED, "code" => code.label()).increment(1);
    message
}

/// Emit a previously collected [`Diagnostic`].
pub fn emit_diagnostic(diagnostic: &Diagnostic, event_id: Option<&str>) -> String {
    emit(diagnostic.code, event_id, &diagnostic.message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_formats_code_and_label() {
        let message = emit(DiagnosticCode::EmptyBody, Some("E1"), "body was empty");
        assert_eq!(message, "EVTHUB-1006 empty_body: body was empty");
    }

    #[test]
    fn test_codes_are_unique() {
        let all = [
            DiagnosticCode::MissingOrganizationId,
            DiagnosticCode::MissingContentType,
            DiagnosticCode::MissingContentEncoding,
            DiagnosticCode::MissingEventId,
            DiagnosticCode::MissingClientId,
            DiagnosticCode::EmptyBody,
            DiagnosticCode::MalformedBody,
            DiagnosticCode::RuleFetchFailed,
            DiagnosticCode::NoRulesConfigured,
            DiagnosticCode::NoRuleMatched,
            DiagnosticCode::DeliveryFailed,
            DiagnosticCode::StatusWriteFailed,
            DiagnosticCode::SearchUpdateFailed,
            DiagnosticCode::AlertSendFailed,
            DiagnosticCode::DisplayNameLookupFailed,
            DiagnosticCode::DeadLetterPublishFailed,
            DiagnosticCode::BrokerUnavailable,
        ];
        let mut codes: Vec<u16> = all.iter().map(|c| c.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }
}
