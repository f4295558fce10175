use crate::endpoint::Endpoint;
use crate::logging::LogFormat;
use crate::policy::MissingHandlePolicy;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Largest request line accepted from a controller, in bytes.
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 1024 * 1024;

/// Page a new view opens when the controller supplies no URL.
pub const DEFAULT_URL: &str = "https://www.example.com";

/// Default log filter expression used by the binaries.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Computes the default controller endpoint.
pub fn default_endpoint() -> Endpoint {
    Endpoint::Stdio
}

/// Default request size ceiling.
pub fn default_max_request_bytes() -> usize {
    DEFAULT_MAX_REQUEST_BYTES
}

/// Default not-found convention for handle-taking methods.
pub fn default_missing_handle() -> MissingHandlePolicy {
    MissingHandlePolicy::Benign
}

/// Owned default URL value used by serde.
pub fn default_url_string() -> String {
    DEFAULT_URL.to_owned()
}
