pub mod config;
pub mod error;
pub mod identifier;
pub mod migrate;
pub mod report;
pub mod resolver;
pub mod runtime;
pub mod server;
pub mod store;
