pub mod attendance;
pub mod auth;
pub mod config;
pub mod error;
pub mod extraction;
pub mod output;
pub mod schedule;
pub mod server;
pub mod store;
