pub mod chat_service;
pub mod remote_api;
