// Presentation layer - HTTP boundary over the session engine
pub mod app_state;
pub mod handlers;
