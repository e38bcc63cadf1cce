pub mod envelope;
pub mod health;
pub mod kafka;
pub mod metrics;
pub mod report;
pub mod rules;
