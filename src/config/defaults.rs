//! Built-in defaults
//!
//! Hardcoded values used for every field the config file leaves out.

/// Service base URL (default: local development server)
pub const SERVER_URL: &str = "http://localhost:3030";

/// Directory holding `job_constructor_<id>.json` files (default: cwd)
pub const IDENTITY_DIR: &str = ".";

/// Per-request timeout in seconds (default: 60)
pub const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Upper bound on `request_timeout_secs`
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 3600;

/// Executable archive size limit (default: 0 = unlimited)
pub const MAX_BUNDLE_BYTES: u64 = 0;

/// Token freshness window in seconds (default: 3600)
pub const TOKEN_FRESHNESS_SECS: u64 = crate::token::DEFAULT_FRESHNESS_SECS;

/// Event watch refresh interval in seconds (default: 10)
pub const EVENTS_INTERVAL_SECS: u64 = 10;

/// Log watch refresh interval in seconds (default: 15)
pub const LOGS_INTERVAL_SECS: u64 = 15;

/// Config file location relative to `$HOME`
pub const CONFIG_RELATIVE_PATH: &str = ".config/hpcjob/config.toml";
