pub mod archive;
pub mod catalog;
pub mod config;
pub mod doctor;
pub mod error;
pub mod http;
pub mod mail;
pub mod notify;
pub mod serve;
pub mod store;

pub use config::{AppConfig, EnvConfig};
pub use error::{ApiError, ApiResult};
pub use http::{api_router, AppState};
pub use serve::serve;
