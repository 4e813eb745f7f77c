use std::collections::HashMap;

use agenthub_proto::TraceContext;

/// Reserved header keys for trace propagation
pub mod keys {
    pub const TRACEPARENT: &str = "traceparent";
    pub const TRACESTATE: &str = "tracestate";
}

/// Parse a W3C `traceparent` header into (trace_id, span_id).
///
/// Format: `00-<32 hex>-<16 hex>-<2 hex flags>`. Returns `None` on any
/// malformed field so callers fall back to a fresh context.
pub fn parse_traceparent(value: &str) -> Option<(String, String)> {
    let mut parts = value.split('-');
    let version = parts.next()?;
    let trace_id = parts.next()?;
    let span_id = parts.next()?;
    let _flags = parts.next()?;
    if version.len() != 2 || trace_id.len() != 32 || span_id.len() != 16 {
        return None;
    }
    if !trace_id.chars().all(|c| c.is_ascii_hexdigit())
        || !span_id.chars().all(|c| c.is_ascii_hexdigit())
    {
        return None;
    }
    // All-zero trace or span ids are invalid
    if trace_id.chars().all(|c| c == '0') || span_id.chars().all(|c| c == '0') {
        return None;
    }
    Some((trace_id.to_ascii_lowercase(), span_id.to_ascii_lowercase()))
}

/// Render a `traceparent` header for the given context.
pub fn traceparent(trace: &TraceContext) -> String {
    format!("00-{}-{}-01", trace.trace_id, trace.span_id)
}

fn random_hex(len: usize) -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    hex[..len].to_string()
}

/// Start a fresh trace context with random identifiers.
pub fn generate() -> TraceContext {
    let trace_id = random_hex(32);
    let span_id = random_hex(16);
    let mut trace = TraceContext {
        trace_id,
        span_id,
        headers: HashMap::new(),
    };
    trace
        .headers
        .insert(keys::TRACEPARENT.to_string(), traceparent(&trace));
    trace
}

/// Continue an existing trace under a new span.
pub fn child_of(parent: &TraceContext) -> TraceContext {
    let mut trace = TraceContext {
        trace_id: parent.trace_id.clone(),
        span_id: random_hex(16),
        headers: parent.headers.clone(),
    };
    trace
        .headers
        .insert(keys::TRACEPARENT.to_string(), traceparent(&trace));
    trace
}

/// Build a trace context from a string-map of headers.
///
/// Uses `traceparent` when present and valid; otherwise generates a fresh
/// context. Unknown headers (e.g. `tracestate`) are carried verbatim.
pub fn from_headers(headers: &HashMap<String, String>) -> TraceContext {
    if let Some((trace_id, span_id)) = headers
        .get(keys::TRACEPARENT)
        .and_then(|v| parse_traceparent(v))
    {
        let mut out = TraceContext {
            trace_id,
            span_id,
            headers: headers.clone(),
        };
        out.headers
            .insert(keys::TRACEPARENT.to_string(), traceparent(&out));
        return out;
    }
    let mut out = generate();
    for (k, v) in headers {
        if k != keys::TRACEPARENT {
            out.headers.insert(k.clone(), v.clone());
        }
    }
    out
}

/// Extract the caller's trace context from gRPC request metadata.
pub fn from_grpc_metadata(metadata: &tonic::metadata::MetadataMap) -> TraceContext {
    let mut headers = HashMap::new();
    for key in [keys::TRACEPARENT, keys::TRACESTATE] {
        if let Some(value) = metadata.get(key).and_then(|v| v.to_str().ok()) {
            headers.insert(key.to_string(), value.to_string());
        }
    }
    from_headers(&headers)
}
