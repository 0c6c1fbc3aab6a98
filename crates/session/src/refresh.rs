//! Refresh-endpoint exchange
//!
//! The refresh credential lives in an HttpOnly cookie the client never sees,
//! so the exchange is a bare `POST <refresh-path>` with no body. It relies on
//! the reqwest client having been built with a cookie store. The exchange
//! deliberately bypasses the request pipeline: a 401 here is terminal and
//! must never trigger another refresh.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{REQUESTED_WITH_HEADER, REQUESTED_WITH_VALUE};
use crate::credential::is_structurally_valid;
use crate::error::{Error, Result};

/// Success body of the refresh endpoint.
#[derive(Debug, Deserialize, Serialize)]
pub struct RefreshResponse {
    #[serde(rename = "accessToken")]
    pub access_token: String,
}

/// Performs the refresh exchange against a fixed endpoint.
#[derive(Debug, Clone)]
pub struct RefreshClient {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl RefreshClient {
    /// `http` must share its cookie store with the client that logged in.
    pub fn new(http: reqwest::Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http,
            url: url.into(),
            timeout,
        }
    }

    /// Exchange the refresh cookie for a new access token.
    ///
    /// 401/403 map to `InvalidCredentials` (cookie missing, expired or
    /// revoked); other non-2xx statuses map to `RefreshRejected`. A success
    /// body whose token fails the structural check is `InvalidToken`.
    pub async fn exchange(&self) -> Result<RefreshResponse> {
        debug!(url = %self.url, "exchanging refresh cookie for access token");
        let response = self
            .http
            .post(&self.url)
            .header(REQUESTED_WITH_HEADER, REQUESTED_WITH_VALUE)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));

            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(Error::InvalidCredentials(format!(
                    "refresh cookie rejected ({status}): {body}"
                )));
            }

            return Err(Error::RefreshRejected(format!(
                "refresh endpoint returned {status}: {body}"
            )));
        }

        let refreshed = response
            .json::<RefreshResponse>()
            .await
            .map_err(|e| Error::RefreshRejected(format!("invalid refresh response: {e}")))?;

        if !is_structurally_valid(&refreshed.access_token) {
            return Err(Error::InvalidToken(
                "refresh endpoint returned a token that is not three base64url segments".into(),
            ));
        }

        Ok(refreshed)
    }
}
