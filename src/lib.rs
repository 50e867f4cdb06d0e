pub mod arch;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod dispatch;
pub mod elevation;
pub mod error;
pub mod l18n;
pub mod logging;
pub mod platform;
pub mod reporter;
pub mod ringlog;
pub mod service;
pub mod utils;
