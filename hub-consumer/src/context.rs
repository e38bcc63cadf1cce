use std::sync::Arc;

use hub_common::health::HealthRegistry;
use reqwest::header;
use sqlx::postgres::PgPoolOptions;

use crate::alert::AlertClient;
use crate::config::Config;
use crate::dispatch::{AdapterRegistry, DeliveryDispatcher};
use crate::error::HubError;
use crate::pipeline::Pipeline;
use crate::routing::{RoutingResolver, RuleServiceClient};
use crate::search::SearchIndexNotifier;
use crate::status::PgStatusStore;
use crate::token::{TokenCache, TokenConfig};

pub struct AppContext {
    pub config: Config,
    pub health_registry: HealthRegistry,
    pub pipeline: Pipeline<PgStatusStore>,
}

impl AppContext {
    pub async fn new(config: &Config) -> Result<Self, HubError> {
        let health_registry = HealthRegistry::new("liveness");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_pg_connections)
            .connect(&config.database_url)
            .await?;
        let status = Arc::new(PgStatusStore::new(pool));

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent("EPCIS Event Hub")
            .timeout(config.request_timeout.0)
            .build()
            .expect("failed to construct reqwest client for the hub consumer");

        let token_cache = match (
            &config.token_url,
            &config.token_client_id,
            &config.token_client_secret,
        ) {
            (Some(url), Some(client_id), Some(client_secret)) => Some(TokenCache::new(TokenConfig {
                url: url.clone(),
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
            })),
            _ => None,
        };

        let resolver = RoutingResolver::new(RuleServiceClient::new(
            client.clone(),
            config.rules_service_url.clone(),
            token_cache,
        ));
        let search = SearchIndexNotifier::new(client.clone(), config.search_service_url.clone());
        let alerts = AlertClient::new(client.clone(), config.alert_service_url.clone());
        let registry = AdapterRegistry::new(
            &config.adapter_url_overrides,
            config.adapter_default_port,
        );
        let dispatcher =
            DeliveryDispatcher::new(client, registry, status.clone(), search.clone());

        let pipeline = Pipeline::new(resolver, dispatcher, status, search, alerts);

        Ok(Self {
            config: config.clone(),
            health_registry,
            pipeline,
        })
    }
}
