//! Routing resolution: fetch the organization's active rule set and reduce
//! it to an ordered, de-duplicated list of destination identifiers.

use hub_common::rules::{RoutingRule, RuleStatus};
use serde_json::Value;

use crate::error::RoutingError;
use crate::token::TokenCache;

/// Client for the routing-rule service.
pub struct RuleServiceClient {
    client: reqwest::Client,
    base_url: String,
    token_cache: Option<TokenCache>,
}

impl RuleServiceClient {
    pub fn new(
        client: reqwest::Client,
        base_url: String,
        token_cache: Option<TokenCache>,
    ) -> Self {
        Self {
            client,
            base_url,
            token_cache,
        }
    }

    /// Fetch the organization's rule set, ordered by the service. A 404 is
    /// the same as an empty set; transport and server errors are fetch
    /// failures, which callers must keep distinct from "no rules".
    pub async fn rules(&self, organization_id: &str) -> Result<Vec<RoutingRule>, RoutingError> {
        let mut request = self.client.get(format!(
            "{}/organization/{}/routingrules",
            self.base_url, organization_id
        ));

        if let Some(cache) = &self.token_cache {
            let token = cache
                .bearer_token(&self.client)
                .await
                .map_err(|error| RoutingError::Fetch(format!("token refresh failed: {error}")))?;
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|error| RoutingError::Fetch(error.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        let response = response
            .error_for_status()
            .map_err(|error| RoutingError::Fetch(error.to_string()))?;

        response
            .json()
            .await
            .map_err(|error| RoutingError::Fetch(format!("malformed rule payload: {error}")))
    }
}

pub struct RoutingResolver {
    rules: RuleServiceClient,
}

impl RoutingResolver {
    pub fn new(rules: RuleServiceClient) -> Self {
        Self { rules }
    }

    /// Resolve the destinations for one document.
    ///
    /// Rules are evaluated in ascending `order`; the destination lists of
    /// matching rules are concatenated with first-seen-wins de-duplication,
    /// so a destination named by several matching rules is delivered to
    /// once, at the position of the first rule that named it.
    pub async fn resolve(
        &self,
        organization_id: &str,
        document: &Value,
    ) -> Result<Vec<String>, RoutingError> {
        let mut rules = self.rules.rules(organization_id).await?;
        rules.retain(|rule| rule.status == RuleStatus::Active);

        if rules.is_empty() {
            return Err(RoutingError::NoRules);
        }

        // The service returns rules ordered, but the evaluation order is
        // part of the routing contract, so sort rather than trust it.
        rules.sort_by_key(|rule| rule.order);

        let mut destinations: Vec<String> = Vec::new();
        for rule in &rules {
            if rule.matches(document) {
                for destination in &rule.destinations {
                    if !destinations.contains(destination) {
                        destinations.push(destination.clone());
                    }
                }
            }
        }

        if destinations.is_empty() {
            return Err(RoutingError::NoMatch);
        }

        Ok(destinations)
    }
}
