//! Shared configuration for the tether command server.
//!
//! Values are layered by [`ortho_config`]: built-in defaults, then a discovered
//! configuration file, then `TETHER_*` environment variables, then command
//! line flags. The server reads the result once at startup; nothing here is
//! reloaded at runtime.

mod defaults;
mod endpoint;
mod logging;
mod policy;

use std::ffi::OsString;
use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_LOG_FILTER, DEFAULT_MAX_REQUEST_BYTES, DEFAULT_URL, default_endpoint,
    default_log_filter, default_log_filter_string, default_log_format, default_max_request_bytes,
    default_missing_handle, default_url_string,
};
pub use endpoint::{Endpoint, EndpointParseError, EndpointPreparationError};
pub use logging::{LogFormat, LogFormatParseError};
pub use policy::{MissingHandlePolicy, MissingHandlePolicyParseError};

/// Resolved server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "TETHER")]
pub struct Config {
    /// Channel the controller connects through.
    #[serde(default = "default_endpoint")]
    pub endpoint: Endpoint,
    /// `tracing-subscriber` filter expression.
    #[serde(default = "default_log_filter_string")]
    pub log_filter: String,
    /// Output format for log lines on stderr.
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
    /// Requests longer than this many bytes are rejected unparsed.
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,
    /// Reply convention for requests naming a closed or unknown handle.
    #[serde(default = "default_missing_handle")]
    pub missing_handle: MissingHandlePolicy,
    /// Page opened by `new` when the controller passes no URL.
    #[serde(default = "default_url_string")]
    pub default_url: String,
}

impl Config {
    /// Loads configuration from the process arguments, environment and any
    /// discovered configuration file.
    ///
    /// # Errors
    ///
    /// Returns the loader error when a layer cannot be read or merged.
    pub fn load() -> Result<Self, Arc<OrthoError>> {
        <Self as OrthoConfig>::load()
    }

    /// Loads configuration using `args` in place of the process arguments.
    ///
    /// The first item is treated as the program name.
    ///
    /// # Errors
    ///
    /// Returns the loader error when a layer cannot be read or merged.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, Arc<OrthoError>>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as OrthoConfig>::load_from_iter(args)
    }

    /// Controller endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Request size ceiling in bytes.
    #[must_use]
    pub fn max_request_bytes(&self) -> usize {
        self.max_request_bytes
    }

    /// Not-found convention for handle-taking methods.
    #[must_use]
    pub fn missing_handle(&self) -> MissingHandlePolicy {
        self.missing_handle
    }

    /// URL used when `new` is called without one.
    #[must_use]
    pub fn default_url(&self) -> &str {
        &self.default_url
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            max_request_bytes: default_max_request_bytes(),
            missing_handle: default_missing_handle(),
            default_url: default_url_string(),
        }
    }
}
