//! Fire-and-forget advisory alerts towards the alerting service.

use serde_json::json;

#[derive(Clone)]
pub struct AlertClient {
    client: reqwest::Client,
    base_url: String,
}

impl AlertClient {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    /// Advise the tenant that an event could not be routed anywhere.
    pub async fn no_route_found(
        &self,
        organization_id: &str,
        event_id: &str,
        detail: &str,
    ) -> Result<(), reqwest::Error> {
        self.client
            .post(format!(
                "{}/organization/{}/alerts",
                self.base_url, organization_id
            ))
            .json(&json!({
                "eventId": event_id,
                "message": detail,
            }))
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}
