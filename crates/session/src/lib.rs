//! Client session state for the shop admin API
//!
//! Owns everything the request pipeline needs to authenticate a caller:
//! the access credential and its structural checks, the per-session CSRF
//! token, the session store that mirrors both to a session-scoped file, and
//! the refresh-endpoint exchange that trades the HttpOnly refresh cookie for
//! a new access token.
//!
//! Session flow:
//! 1. `SessionStore::load()` restores the mirrored session (or starts empty)
//!    and makes sure a CSRF token exists
//! 2. Login stores the access token and profile via `SessionStore::establish()`
//! 3. Outgoing requests read the token and CSRF token from the store
//! 4. On a 401, `RefreshClient::exchange()` obtains a new access token which
//!    is written back with `SessionStore::set_access_token()`
//! 5. Logout or a failed refresh calls `SessionStore::clear()`

pub mod constants;
pub mod credential;
pub mod csrf;
pub mod error;
pub mod refresh;
pub mod store;

pub use constants::*;
pub use credential::{expires_at_millis, is_expired, is_structurally_valid, now_millis};
pub use csrf::generate_csrf_token;
pub use error::{Error, Result};
pub use refresh::{RefreshClient, RefreshResponse};
pub use store::{Role, SessionStore, UserProfile};
