pub mod health;
pub mod matching;
pub mod metrics;
pub mod models;
pub mod queue;
pub mod redis;
pub mod retry;
pub mod store;
