//! The event envelope: metadata attached to a queued event message.

use std::collections::HashMap;

use crate::report::{Diagnostic, DiagnosticCode};

pub const DEFAULT_CONTENT_TYPE: &str = "application/json";
pub const DEFAULT_CONTENT_ENCODING: &str = "utf-8";

/// Message property (header) names, shared with producers.
pub const PROPERTY_EVENT_ID: &str = "event_id";
pub const PROPERTY_CLIENT_ID: &str = "client_id";
pub const PROPERTY_ORGANIZATION_ID: &str = "organization_id";
pub const PROPERTY_CONTENT_TYPE: &str = "content_type";
pub const PROPERTY_CONTENT_ENCODING: &str = "content_encoding";

/// A delivery as handed over by the broker layer: string properties plus the
/// raw body. Broker-independent so the pipeline can be driven in tests
/// without a running broker.
#[derive(Debug, Clone, Default)]
pub struct InboundMessage {
    pub properties: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl InboundMessage {
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }
}

/// Validated envelope metadata for one queued event. Read-only once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub content_type: String,
    pub content_encoding: String,
    pub event_id: String,
    pub client_id: String,
    pub organization_id: String,
    pub body: Vec<u8>,
}

/// Outcome of envelope validation. Diagnostics are collected for every
/// failed check, including the non-fatal ones, even when an earlier fatal
/// check has already doomed the message; `envelope` is `Some` only when no
/// fatal check failed.
#[derive(Debug)]
pub struct ValidationOutcome {
    pub diagnostics: Vec<Diagnostic>,
    pub envelope: Option<Envelope>,
}

impl Envelope {
    /// Validate a delivery against the envelope contract.
    ///
    /// Missing organization id, event id, client id, or an empty body are
    /// fatal. A missing content type or content encoding is reported but the
    /// message proceeds with defaults assumed.
    pub fn validate(message: &InboundMessage) -> ValidationOutcome {
        let mut diagnostics = Vec::new();
        let mut fatal = false;

        let organization_id = message.property(PROPERTY_ORGANIZATION_ID);
        if organization_id.is_none() {
            diagnostics.push(Diagnostic::new(
                DiagnosticCode::MissingOrganizationId,
                "message has no organization_id property",
            ));
            fatal = true;
        }

        let content_type = message.property(PROPERTY_CONTENT_TYPE);
        if content_type.is_none() {
            diagnostics.push(Diagnostic::new(
                DiagnosticCode::MissingContentType,
                format!("message has no content type, assuming {DEFAULT_CONTENT_TYPE}"),
            ));
        }

        let content_encoding = message.property(PROPERTY_CONTENT_ENCODING);
        if content_encoding.is_none() {
            diagnostics.push(Diagnostic::new(
                DiagnosticCode::MissingContentEncoding,
                format!("message has no content encoding, assuming {DEFAULT_CONTENT_ENCODING}"),
            ));
        }

        let event_id = message.property(PROPERTY_EVENT_ID);
        if event_id.is_none() {
            diagnostics.push(Diagnostic::new(
                DiagnosticCode::MissingEventId,
                "message has no event_id property",
            ));
            fatal = true;
        }

        let client_id = message.property(PROPERTY_CLIENT_ID);
        if client_id.is_none() {
            diagnostics.push(Diagnostic::new(
                DiagnosticCode::MissingClientId,
                "message has no client_id property",
            ));
            fatal = true;
        }

        if message.body.is_empty() {
            diagnostics.push(Diagnostic::new(
                DiagnosticCode::EmptyBody,
                "message body is missing or empty",
            ));
            fatal = true;
        }

        let envelope = if fatal {
            None
        } else {
            Some(Envelope {
                content_type: content_type.unwrap_or(DEFAULT_CONTENT_TYPE).to_owned(),
                content_encoding: content_encoding
                    .unwrap_or(DEFAULT_CONTENT_ENCODING)
                    .to_owned(),
                // Unwraps guarded by the fatal flag above.
                event_id: event_id.unwrap_or_default().to_owned(),
                client_id: client_id.unwrap_or_default().to_owned(),
                organization_id: organization_id.unwrap_or_default().to_owned(),
                body: message.body.clone(),
            })
        };

        ValidationOutcome {
            diagnostics,
            envelope,
        }
    }
}
