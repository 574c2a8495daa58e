// Core modules
pub mod advice;
pub mod config;
pub mod exchange;
pub mod execution;
pub mod models;
pub mod news;
pub mod oracle;
pub mod persistence;
pub mod trading_loop;

// Re-export commonly used types
pub use advice::AdviceParser;
pub use config::AppConfig;
pub use models::*;
pub use trading_loop::{CycleOutcome, TradingLoop};
