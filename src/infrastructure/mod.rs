pub mod api_client;
pub mod config;
pub mod credential_store;
pub mod error;
pub mod storage;
pub mod task_cache;
