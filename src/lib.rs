pub mod audit;
pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod health;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod storage;
pub mod utils;

pub use error::{AppError, AppResult};
pub use gateway::{build_router, GatewaySettings, GatewayState};
