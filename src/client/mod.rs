pub mod cli;
pub mod inbox;
pub mod services;
pub mod storage;
pub mod utils;
