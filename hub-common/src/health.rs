//! Liveness reporting for the long-running loops of the consumer.
//!
//! The process can only be trusted with events while its consumer loop is
//! actually running, so each loop registers a component and must report
//! healthy more often than its deadline. The probe endpoint combines the
//! component statuses: any unhealthy or stalled component fails the probe.

use std::collections::HashMap;
use std::ops::Add;
use std::sync::{Arc, RwLock};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use time::{Duration, OffsetDateTime};
use tracing::warn;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ComponentStatus {
    /// Set when a component is newly registered, counts as healthy.
    Starting,
    /// Recently reported healthy, must report again before the instant.
    HealthyUntil(OffsetDateTime),
    /// Reported unhealthy explicitly.
    Unhealthy,
}

#[derive(Default, Debug)]
pub struct HealthStatus {
    pub healthy: bool,
    pub components: HashMap<String, ComponentStatus>,
}

impl IntoResponse for HealthStatus {
    fn into_response(self) -> Response {
        let body = format!("{:?}", self);
        match self.healthy {
            true => (StatusCode::OK, body),
            false => (StatusCode::INTERNAL_SERVER_ERROR, body),
        }
        .into_response()
    }
}

#[derive(Clone)]
pub struct HealthRegistry {
    name: String,
    components: Arc<RwLock<HashMap<String, ComponentStatus>>>,
}

impl HealthRegistry {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            components: Default::default(),
        }
    }

    /// Register a component. The returned handle is given to the component
    /// so it can report its status as it runs.
    pub fn register(&self, component: &str, deadline: Duration) -> HealthHandle {
        if let Ok(mut map) = self.components.write() {
            map.insert(component.to_owned(), ComponentStatus::Starting);
        }
        HealthHandle {
            component: component.to_owned(),
            deadline,
            components: self.components.clone(),
        }
    }

    /// Combined status of all registered components at this instant.
    pub fn get_status(&self) -> HealthStatus {
        let now = OffsetDateTime::now_utc();
        let components = match self.components.read() {
            Ok(map) => map.clone(),
            Err(_) => {
                warn!(registry = self.name, "poisoned health registry lock");
                return HealthStatus::default();
            }
        };

        let healthy = !components.is_empty()
            && components.values().all(|status| match status {
                ComponentStatus::Starting => true,
                ComponentStatus::HealthyUntil(until) => *until > now,
                ComponentStatus::Unhealthy => false,
            });

        HealthStatus {
            healthy,
            components,
        }
    }
}

pub struct HealthHandle {
    component: String,
    deadline: Duration,
    components: Arc<RwLock<HashMap<String, ComponentStatus>>>,
}

impl HealthHandle {
    /// Report healthy. Must be called more frequently than the deadline.
    pub fn report_healthy(&self) {
        self.report_status(ComponentStatus::HealthyUntil(
            OffsetDateTime::now_utc().add(self.deadline),
        ));
    }

    pub fn report_status(&self, status: ComponentStatus) {
        match self.components.write() {
            Ok(mut map) => {
                map.insert(self.component.clone(), status);
            }
            Err(_) => warn!(component = self.component, "poisoned health registry lock"),
        }
    }
}
