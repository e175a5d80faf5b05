pub mod auth;
pub mod config;
pub mod connection;
pub mod database;
pub mod messages;
