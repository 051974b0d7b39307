pub mod config;
pub mod context;
pub mod error;
pub mod registry;
pub mod scheduler;
pub mod tasks;
pub mod worker;
