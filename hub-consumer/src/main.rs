//! Consume queued EPCIS event documents, route them per organization rules
//! and fan them out to downstream adapter services.

use envconfig::Envconfig;
use hub_common::metrics::{serve, setup_service_router};
use hub_consumer::config::Config;
use hub_consumer::context::AppContext;
use hub_consumer::error::HubError;
use hub_consumer::pipeline;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

fn setup_tracing() {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

#[tokio::main]
async fn main() -> Result<(), HubError> {
    setup_tracing();
    info!("starting event routing hub consumer");

    let config = Config::init_from_env()?;
    let context = AppContext::new(&config).await?;

    let liveness = context
        .health_registry
        .register("consumer", time::Duration::seconds(60));

    let router = setup_service_router(context.health_registry.clone());
    let bind = config.bind();
    tokio::task::spawn(async move {
        serve(router, &bind)
            .await
            .expect("failed to start serving metrics");
    });

    pipeline::run(&context.config, &context.pipeline, &liveness).await;

    Ok(())
}
