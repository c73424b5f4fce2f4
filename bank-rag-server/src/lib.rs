//! `bank-rag-server` exposes a [`bank_rag::RagPipeline`] over HTTP.
//! It answers questions on `POST /api/query` and reports model readiness on
//! `GET /api/system_info`.

pub mod response;
pub mod server;
pub mod settings;

pub use response::{ApiError, FormattedResponse, SystemInfo};
pub use server::{AppState, ServerConfig, app_router, run_server};
pub use settings::Settings;
