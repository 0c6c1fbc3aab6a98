//! Request-transform stages for the shop admin API pipeline
//!
//! Every outbound request is a logical `ApiRequest` that passes through an
//! ordered list of `RequestStage`s before it reaches the transport. Stages
//! are applied to a fresh copy of the logical request on every attempt, so a
//! replay after a token refresh picks up the new credential.
//!
//! Declared order used by the client:
//! 1. `StaticHeaders`: X-Requested-With, X-Client-Version, Content-Type
//! 2. `AuthHeaderInjector`: Authorization for structurally valid tokens
//! 3. `CsrfInjector`: X-CSRF-Token on mutating verbs
//! 4. `BodySanitizer`: strips markup from JSON string leaves

pub mod auth;
pub mod csrf;
pub mod headers;
pub mod request;
pub mod sanitize;

pub use auth::AuthHeaderInjector;
pub use csrf::CsrfInjector;
pub use headers::{HeaderInjection, StaticHeaders};
pub use request::{ApiRequest, MultipartField, MultipartValue, RequestBody};
pub use sanitize::BodySanitizer;

use std::future::Future;
use std::pin::Pin;

/// One request-transform step of the pipeline.
///
/// Stages never fail: a stage that cannot do its job (no token, invalid
/// header value) logs and leaves the request as it found it.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn RequestStage>`).
pub trait RequestStage: Send + Sync {
    /// Identifier for logging
    fn name(&self) -> &str;

    /// Mutate the outbound copy of the request in place.
    fn apply<'a>(
        &'a self,
        request: &'a mut ApiRequest,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}
