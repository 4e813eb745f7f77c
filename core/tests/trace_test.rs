use std::collections::HashMap;

use agenthub_core::trace;

#[test]
fn parses_well_formed_traceparent() {
    let (trace_id, span_id) = trace::parse_traceparent(
        "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01",
    )
    .unwrap();
    assert_eq!(trace_id, "0af7651916cd43dd8448eb211c80319c");
    assert_eq!(span_id, "b7ad6b7169203331");
}

#[test]
fn rejects_malformed_traceparent() {
    for bad in [
        "",
        "not-a-header",
        "00-short-b7ad6b7169203331-01",
        "00-0af7651916cd43dd8448eb211c80319c-short-01",
        "00-00000000000000000000000000000000-b7ad6b7169203331-01",
        "00-0af7651916cd43dd8448eb211c80319c-0000000000000000-01",
        "00-zzf7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01",
    ] {
        assert!(trace::parse_traceparent(bad).is_none(), "accepted {bad:?}");
    }
}

#[test]
fn from_headers_continues_existing_trace() {
    let mut headers = HashMap::new();
    headers.insert(
        "traceparent".to_string(),
        "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01".to_string(),
    );
    headers.insert("tracestate".to_string(), "vendor=x".to_string());

    let ctx = trace::from_headers(&headers);
    assert_eq!(ctx.trace_id, "0af7651916cd43dd8448eb211c80319c");
    assert_eq!(ctx.span_id, "b7ad6b7169203331");
    assert_eq!(ctx.headers.get("tracestate").unwrap(), "vendor=x");
}

#[test]
fn from_headers_generates_when_missing() {
    let ctx = trace::from_headers(&HashMap::new());
    assert_eq!(ctx.trace_id.len(), 32);
    assert_eq!(ctx.span_id.len(), 16);
    assert!(ctx.headers.contains_key("traceparent"));
}

#[test]
fn child_spans_stay_in_the_same_trace() {
    let parent = trace::generate();
    let child = trace::child_of(&parent);
    assert_eq!(child.trace_id, parent.trace_id);
    assert_ne!(child.span_id, parent.span_id);
    assert_eq!(trace::traceparent(&child), child.headers["traceparent"]);
}
