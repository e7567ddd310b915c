pub mod config;
pub mod error;
pub mod service;

pub use config::AppConfig;
pub use service::ChargingService;
