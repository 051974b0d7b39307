pub mod api;
pub mod config;
pub mod demo;
pub mod router;
pub mod server;
pub mod timezones;
