pub mod chunk;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod http;
pub mod logging;
pub mod metadata;
pub mod partition;
pub mod queue;
pub mod storage;
pub mod url_model;
pub mod worker;
