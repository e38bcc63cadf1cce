//! Sequential delivery of one event to its resolved destination adapters.

use std::collections::HashMap;
use std::sync::Arc;

use hub_common::envelope::Envelope;
use hub_common::metrics::{DELIVERIES_ATTEMPTED, DELIVERIES_FAILED};
use hub_common::report::{self, DiagnosticCode};
use serde_json::{json, Value};

use crate::error::DeliveryError;
use crate::search::SearchIndexNotifier;
use crate::status::{DestinationStatus, StatusStore};

/// Resolves a destination identifier to its ingestion endpoint.
///
/// An explicit override configured for the identifier wins; otherwise the
/// address is derived from the identifier by naming convention.
pub struct AdapterRegistry {
    overrides: HashMap<String, String>,
    default_port: u16,
}

impl AdapterRegistry {
    /// `overrides_spec` is a comma-separated list of `identifier=base_url`
    /// pairs; identifiers are matched case-insensitively. Malformed entries
    /// are skipped.
    pub fn new(overrides_spec: &str, default_port: u16) -> Self {
        let overrides = overrides_spec
            .split(',')
            .filter_map(|entry| {
                let (id, url) = entry.split_once('=')?;
                let id = id.trim();
                let url = url.trim();
                if id.is_empty() || url.is_empty() {
                    return None;
                }
                Some((id.to_lowercase(), url.trim_end_matches('/').to_owned()))
            })
            .collect();

        Self {
            overrides,
            default_port,
        }
    }

    pub fn ingestion_url(&self, service_id: &str) -> String {
        match self.overrides.get(&service_id.to_lowercase()) {
            Some(base) => format!("{base}/adapter/event"),
            None => format!(
                "http://{}:{}/adapter/event",
                service_id, self.default_port
            ),
        }
    }
}

#[derive(Debug)]
pub struct DeliveryOutcome {
    pub destination: String,
    pub succeeded: bool,
}

pub struct DeliveryDispatcher<S> {
    client: reqwest::Client,
    registry: AdapterRegistry,
    status: Arc<S>,
    search: SearchIndexNotifier,
}

impl<S: StatusStore> DeliveryDispatcher<S> {
    pub fn new(
        client: reqwest::Client,
        registry: AdapterRegistry,
        status: Arc<S>,
        search: SearchIndexNotifier,
    ) -> Self {
        Self {
            client,
            registry,
            status,
            search,
        }
    }

    /// Deliver the event to each destination in turn. A failing destination
    /// never aborts delivery to the remaining ones; every destination is
    /// attempted and its outcome recorded independently.
    pub async fn dispatch(
        &self,
        envelope: &Envelope,
        document: &Value,
        destinations: &[String],
    ) -> Vec<DeliveryOutcome> {
        let mut outcomes = Vec::with_capacity(destinations.len());

        for destination in destinations {
            metrics::counter!(DELIVERIES_ATTEMPTED, "destination" => destination.clone())
                .increment(1);

            match self.deliver(envelope, document, destination).await {
                Ok(()) => outcomes.push(DeliveryOutcome {
                    destination: destination.clone(),
                    succeeded: true,
                }),
                Err(error) => {
                    metrics::counter!(DELIVERIES_FAILED, "destination" => destination.clone())
                        .increment(1);
                    self.record_delivery_failure(envelope, destination, &error)
                        .await;
                    outcomes.push(DeliveryOutcome {
                        destination: destination.clone(),
                        succeeded: false,
                    });
                }
            }
        }

        outcomes
    }

    async fn deliver(
        &self,
        envelope: &Envelope,
        document: &Value,
        destination: &str,
    ) -> Result<(), DeliveryError> {
        let url = self.registry.ingestion_url(destination);

        let response = self
            .client
            .post(url)
            .json(&json!({
                "eventId": envelope.event_id,
                "organizationId": envelope.organization_id,
                "document": document,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::ErrorStatus(status));
        }

        Ok(())
    }

    /// Bookkeeping for one failed destination: report, resolve the display
    /// name (falling back to the raw identifier), then write the status
    /// rows and the search index entry. Each write is best-effort on its
    /// own; a failing write is reported and the others still happen.
    async fn record_delivery_failure(
        &self,
        envelope: &Envelope,
        destination: &str,
        error: &DeliveryError,
    ) {
        let event_id = envelope.event_id.as_str();
        let detail = report::emit(
            DiagnosticCode::DeliveryFailed,
            Some(event_id),
            &format!("delivery to {destination} failed: {error}"),
        );

        let display_name = match self.status.destination_display_name(destination).await {
            Ok(Some(name)) => name,
            Ok(None) => destination.to_owned(),
            Err(lookup_error) => {
                report::emit(
                    DiagnosticCode::DisplayNameLookupFailed,
                    Some(event_id),
                    &lookup_error.to_string(),
                );
                destination.to_owned()
            }
        };

        if let Err(write_error) = self.status.record_failure(event_id).await {
            report::emit(
                DiagnosticCode::StatusWriteFailed,
                Some(event_id),
                &write_error.to_string(),
            );
        }

        if let Err(write_error) = self
            .status
            .record_destination_outcome(event_id, &display_name, DestinationStatus::Failed, &detail)
            .await
        {
            report::emit(
                DiagnosticCode::StatusWriteFailed,
                Some(event_id),
                &write_error.to_string(),
            );
        }

        if let Err(search_error) = self.search.record_failed(event_id, &display_name).await {
            report::emit(
                DiagnosticCode::SearchUpdateFailed,
                Some(event_id),
                &search_error.to_string(),
            );
        }
    }
}
