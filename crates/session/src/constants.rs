//! Header names and default routes shared by the pipeline crates

/// Header carrying the per-session CSRF token on mutating requests
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Marks requests as programmatic so the backend answers with JSON errors
pub const REQUESTED_WITH_HEADER: &str = "x-requested-with";
pub const REQUESTED_WITH_VALUE: &str = "XMLHttpRequest";

/// Header reporting the client build to the backend
pub const CLIENT_VERSION_HEADER: &str = "x-client-version";

/// Version string sent in `X-Client-Version` unless configured otherwise
pub const DEFAULT_CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Refresh endpoint, relative to the API base URL
pub const DEFAULT_REFRESH_PATH: &str = "/auth/refresh";

/// Route the user is sent to once the session cannot be recovered
pub const DEFAULT_LOGIN_ROUTE: &str = "/login";
