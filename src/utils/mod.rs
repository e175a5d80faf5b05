pub mod logger;
pub mod performance;
