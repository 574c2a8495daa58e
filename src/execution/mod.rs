// Order sizing, submission and position bookkeeping
pub mod balance_cache;
pub mod executor;
pub mod position_manager;
pub mod retry;

pub use balance_cache::BalanceCache;
pub use executor::{
    BatchReport, ExecutedOrder, ExecutionSettings, OrderExecutor, SkipReason, SkippedAdvice,
};
pub use position_manager::PositionManager;
pub use retry::RetryPolicy;
