//! Markup stripping for JSON request bodies

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tracing::debug;

use crate::{ApiRequest, RequestBody, RequestStage};

/// Characters removed from every string leaf.
const MARKUP_DELIMITERS: &[char] = &['<', '>'];

/// URL scheme removed (case-insensitively) from every string leaf.
const SCRIPT_SCHEME: &str = "javascript:";

/// Strips markup from string leaves of JSON bodies. Multipart bodies are
/// passed through untouched.
pub struct BodySanitizer;

impl RequestStage for BodySanitizer {
    fn name(&self) -> &str {
        "sanitize"
    }

    fn apply<'a>(
        &'a self,
        request: &'a mut ApiRequest,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        if let RequestBody::Json(body) = &mut request.body {
            let changed = sanitize_value(body);
            if changed > 0 {
                debug!(path = %request.path, fields = changed, "stripped markup from request body");
            }
        }
        Box::pin(async {})
    }
}

/// Sanitize every string leaf of `value` in place, leaving keys, numbers,
/// booleans, nulls and structure alone. Returns how many leaves changed.
pub fn sanitize_value(value: &mut Value) -> usize {
    match value {
        Value::String(s) => {
            let clean = sanitize_str(s);
            if clean != *s {
                *s = clean;
                1
            } else {
                0
            }
        }
        Value::Array(items) => items.iter_mut().map(sanitize_value).sum(),
        Value::Object(map) => map.values_mut().map(sanitize_value).sum(),
        Value::Null | Value::Bool(_) | Value::Number(_) => 0,
    }
}

/// Remove markup delimiters and script schemes until nothing changes.
///
/// Iterating to a fixpoint keeps the function idempotent: removing one
/// pattern can splice together another (`java<script:` → `javascript:`).
pub fn sanitize_str(input: &str) -> String {
    let mut current: String = input.to_owned();
    loop {
        let without_delims: String = current
            .chars()
            .filter(|c| !MARKUP_DELIMITERS.contains(c))
            .collect();
        let next = strip_script_scheme(&without_delims);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn strip_script_scheme(input: &str) -> String {
    // ASCII lowercasing keeps byte offsets aligned with `input`
    let lower = input.to_ascii_lowercase();
    let mut out = String::with_capacity(input.len());
    let mut rest = 0;
    while let Some(found) = lower[rest..].find(SCRIPT_SCHEME) {
        let start = rest + found;
        out.push_str(&input[rest..start]);
        rest = start + SCRIPT_SCHEME.len();
    }
    out.push_str(&input[rest..]);
    out
}
