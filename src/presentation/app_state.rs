// Application state for HTTP handlers
use crate::application::session_engine::SessionEngine;

#[derive(Clone)]
pub struct AppState {
    pub engine: SessionEngine,
}
