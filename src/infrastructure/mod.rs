pub mod config;
pub mod credential_store;
pub mod error;
pub mod notifier;
pub mod session_log_repository;
pub mod storage;
pub mod task_store_client;
