//! Best-effort mirror of terminal event status into the search index.
//!
//! A failure here is reported and otherwise ignored; it never changes the
//! ack/nack decision or blocks later pipeline steps.

use serde_json::json;

/// Destination label recorded when an event never reached dispatch.
pub const NO_ROUTE_DESTINATION: &str = "No Route Found";

#[derive(Clone)]
pub struct SearchIndexNotifier {
    client: reqwest::Client,
    base_url: String,
}

impl SearchIndexNotifier {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    /// Mark the event failed in the search index, labeled with the
    /// destination (or [`NO_ROUTE_DESTINATION`]) that failed it.
    pub async fn record_failed(
        &self,
        event_id: &str,
        destination: &str,
    ) -> Result<(), reqwest::Error> {
        self.client
            .patch(format!("{}/event/{}", self.base_url, event_id))
            .json(&json!({
                "status": "failed",
                "destination": destination,
            }))
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}
