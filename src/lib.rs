pub mod alert;
pub mod config;
pub mod diagnostics;
pub mod dispatcher;
pub mod geo;
pub mod monitor;
