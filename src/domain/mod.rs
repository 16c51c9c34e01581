// Domain layer - Session data model, independent of transport and storage
pub mod command;
pub mod connection;
pub mod error;
pub mod event;
pub mod history;
pub mod telemetry;
