pub mod alert;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod pipeline;
pub mod routing;
pub mod search;
pub mod status;
pub mod test_support;
pub mod token;
