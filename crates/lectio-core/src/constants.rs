//! Application constants and configuration defaults
//!
//! Centralized location for magic numbers and default values

use std::time::Duration;

/// HTTP client configuration
pub mod http {
    use super::*;

    /// Connection timeout for backend requests
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Overall request timeout - plan sync and row queries are small payloads
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// User agent sent with backend requests
    pub const USER_AGENT: &str = concat!("lectio/", env!("CARGO_PKG_VERSION"));
}

/// Reading plan configuration
pub mod plan {
    /// Number of days in the reading plan
    pub const TOTAL_DAYS: u16 = 365;

    /// Default number of upcoming books to suggest
    pub const DEFAULT_NEXT_BOOKS: usize = 3;
}

/// Application directories and serving defaults
pub mod app {
    /// Config directory name
    pub const CONFIG_DIR_NAME: &str = ".lectio";

    /// Default port for the admin member endpoint
    pub const DEFAULT_SERVE_PORT: u16 = 8787;
}
