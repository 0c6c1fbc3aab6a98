//! Logical request model shared by the stages and the transport

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::HeaderMap;

/// A file or text field of a multipart upload.
///
/// Kept as plain data (rather than a `reqwest::multipart::Form`) so the
/// request can be cloned and replayed.
#[derive(Debug, Clone)]
pub struct MultipartField {
    pub name: String,
    pub value: MultipartValue,
}

#[derive(Debug, Clone)]
pub enum MultipartValue {
    Text(String),
    File {
        file_name: String,
        content_type: String,
        bytes: Bytes,
    },
}

impl MultipartField {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: MultipartValue::Text(value.into()),
        }
    }

    pub fn file(
        name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            value: MultipartValue::File {
                file_name: file_name.into(),
                content_type: content_type.into(),
                bytes: bytes.into(),
            },
        }
    }
}

#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    Multipart(Vec<MultipartField>),
}

impl RequestBody {
    pub fn is_multipart(&self) -> bool {
        matches!(self, RequestBody::Multipart(_))
    }
}

/// A logical API request: what the caller asked for plus the pipeline's
/// per-request bookkeeping.
///
/// `attempt` counts retransmissions made by the retry controller.
/// `refresh_retried` marks the single replay that follows a token refresh;
/// it is independent of `attempt`.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the API base URL, starting with `/`
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: RequestBody,
    pub attempt: u32,
    pub refresh_retried: bool,
    /// Whether a 401 may be recovered through the refresh coordinator.
    /// Cleared for login, where a 401 means bad credentials.
    pub refresh_on_unauthorized: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            attempt: 0,
            refresh_retried: false,
            refresh_on_unauthorized: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn multipart(mut self, fields: Vec<MultipartField>) -> Self {
        self.body = RequestBody::Multipart(fields);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn without_refresh(mut self) -> Self {
        self.refresh_on_unauthorized = false;
        self
    }

    /// POST, PUT, PATCH and DELETE change server state.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self.method,
            Method::POST | Method::PUT | Method::PATCH | Method::DELETE
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutating_verbs() {
        assert!(ApiRequest::post("/contacts").is_mutating());
        assert!(ApiRequest::put("/contacts/1").is_mutating());
        assert!(ApiRequest::patch("/contacts/1").is_mutating());
        assert!(ApiRequest::delete("/contacts/1").is_mutating());
        assert!(!ApiRequest::get("/contacts").is_mutating());
        assert!(!ApiRequest::new(Method::HEAD, "/contacts").is_mutating());
        assert!(!ApiRequest::new(Method::OPTIONS, "/contacts").is_mutating());
    }

    #[test]
    fn new_request_starts_fresh() {
        let request = ApiRequest::get("/orders");
        assert_eq!(request.attempt, 0);
        assert!(!request.refresh_retried);
        assert!(request.refresh_on_unauthorized);
        assert!(matches!(request.body, RequestBody::Empty));
    }

    #[test]
    fn builders_accumulate() {
        let request = ApiRequest::get("/contacts")
            .query("page", 2)
            .query("per_page", 50)
            .without_refresh();
        assert_eq!(
            request.query,
            vec![
                ("page".to_string(), "2".to_string()),
                ("per_page".to_string(), "50".to_string())
            ]
        );
        assert!(!request.refresh_on_unauthorized);
    }

    #[test]
    fn multipart_body_is_detected() {
        let request = ApiRequest::post("/contacts/import").multipart(vec![MultipartField::file(
            "file",
            "contacts.csv",
            "text/csv",
            &b"name,phone\n"[..],
        )]);
        assert!(request.body.is_multipart());
        assert!(!RequestBody::Json(serde_json::json!({})).is_multipart());
    }
}
