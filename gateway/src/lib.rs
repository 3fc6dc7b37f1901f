//! Typed CRUD gateway for CRM entities over a generic record store.

pub mod analytics;
pub mod config;
pub mod entity;
pub mod error;
pub mod factory;
pub mod gateway;
pub mod query;
pub mod record;
pub mod report;
pub mod schema;
pub mod store;
pub mod transfer;

pub use error::GatewayError;
pub use error::Result;
pub use gateway::DeleteOutcome;
pub use gateway::EntityGateway;
pub use gateway::GatewayOptions;
