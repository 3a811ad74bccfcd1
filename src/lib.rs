pub mod classify;
pub mod config;
pub mod dedup;
pub mod dispatch;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod http;
pub mod media;
pub mod relay;
pub mod sanitize;
