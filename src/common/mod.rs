pub mod error;
pub mod models;
pub mod protocol;
pub mod threads;
