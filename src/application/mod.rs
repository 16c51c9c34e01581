// Application layer - Session use cases and the device seam
pub mod device_client;
pub mod session_engine;
pub mod telemetry_parser;
