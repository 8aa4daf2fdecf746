pub mod a2s;
pub mod config;
pub mod error;
pub mod format;
pub mod handlers;
pub mod maps;
pub mod models;
pub mod router;
pub mod search;
pub mod service;
pub mod storage;
pub mod topology;
pub mod utils;
