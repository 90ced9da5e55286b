//! Fireface SDK.
//!
//! [`App`] is the entry point: it holds the server URL and secret key,
//! installs default logging, and hands out auth clients.
//!
//! ```rust,ignore
//! use fireface::{App, AppConfig};
//!
//! let app = App::new(Some(AppConfig::from_env()?));
//! let auth = app.auth().await?;
//! let token = auth.verify_id_token(&id_token).await?;
//! ```

pub mod app;
pub mod config;
pub mod logging;

pub use app::App;
pub use config::{AppConfig, DEFAULT_SERVER_URL};

/// Auth client types.
pub use fireface_auth as auth;

/// SDK version, reported in the `User-Agent` of outbound requests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
