//! OTLP/JSON as written by the collector file exporter: one
//! `{"resourceSpans": [...]}` document per line, ids as hex strings.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use tracecheck_core::error::{Result, TraceCheckError};
use tracecheck_core::model::span::{SpanKind, SpanRecord};

use crate::otlp::decode::{nanos_to_dt, status_label};

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TracesData {
    resource_spans: Vec<ResourceSpans>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ResourceSpans {
    resource: Option<Resource>,
    scope_spans: Vec<ScopeSpans>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Resource {
    attributes: Vec<KeyValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ScopeSpans {
    spans: Vec<Span>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Span {
    trace_id: String,
    span_id: String,
    parent_span_id: String,
    name: String,
    kind: Value,
    start_time_unix_nano: Value,
    end_time_unix_nano: Value,
    attributes: Vec<KeyValue>,
    status: Option<Status>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Status {
    code: Value,
    message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct KeyValue {
    key: String,
    value: Value,
}

pub fn is_otlp_json(line: &str) -> bool {
    line.contains("\"resourceSpans\"")
}

/// Decodes every span in one OTLP/JSON document.
pub fn decode_line(line: &str) -> Result<Vec<SpanRecord>> {
    let data: TracesData = serde_json::from_str(line)
        .map_err(|e| TraceCheckError::Parse(format!("invalid OTLP/JSON: {e}")))?;

    let mut spans = Vec::new();
    for rs in &data.resource_spans {
        let service = rs
            .resource
            .as_ref()
            .and_then(|r| r.attributes.iter().find(|kv| kv.key == "service.name"))
            .map(|kv| any_value_to_string(&kv.value))
            .unwrap_or_else(|| "unknown".to_string());

        for ss in &rs.scope_spans {
            for span in &ss.spans {
                spans.push(decode_span(&service, span));
            }
        }
    }
    Ok(spans)
}

fn decode_span(service: &str, span: &Span) -> SpanRecord {
    let (code, message) = span
        .status
        .as_ref()
        .map(|s| (status_code(&s.code), s.message.as_str()))
        .unwrap_or((0, ""));

    SpanRecord {
        trace_id: span.trace_id.to_ascii_lowercase(),
        span_id: span.span_id.to_ascii_lowercase(),
        parent_span_id: span.parent_span_id.to_ascii_lowercase(),
        service_name: service.to_string(),
        span_name: span.name.clone(),
        span_kind: span_kind(&span.kind),
        start_ts: nanos_to_dt(as_u64(&span.start_time_unix_nano)),
        end_ts: nanos_to_dt(as_u64(&span.end_time_unix_nano)),
        status: status_label(code, message),
        attributes: span
            .attributes
            .iter()
            .map(|kv| (kv.key.clone(), any_value_to_string(&kv.value)))
            .collect::<BTreeMap<_, _>>(),
    }
}

/// Proto3 JSON allows 64-bit integers as strings or numbers.
fn as_u64(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n.as_u64().unwrap_or_default(),
        Value::String(s) => s.parse().unwrap_or_default(),
        _ => 0,
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn span_kind(value: &Value) -> SpanKind {
    if let Some(code) = as_i64(value) {
        return i32::try_from(code).map(SpanKind::from).unwrap_or_default();
    }
    match value.as_str().unwrap_or_default() {
        "SPAN_KIND_INTERNAL" => SpanKind::Internal,
        "SPAN_KIND_SERVER" => SpanKind::Server,
        "SPAN_KIND_CLIENT" => SpanKind::Client,
        "SPAN_KIND_PRODUCER" => SpanKind::Producer,
        "SPAN_KIND_CONSUMER" => SpanKind::Consumer,
        _ => SpanKind::Unspecified,
    }
}

fn status_code(value: &Value) -> i32 {
    if let Some(code) = as_i64(value) {
        return i32::try_from(code).unwrap_or_default();
    }
    match value.as_str().unwrap_or_default() {
        "STATUS_CODE_OK" => 1,
        "STATUS_CODE_ERROR" => 2,
        _ => 0,
    }
}

fn any_value_to_string(value: &Value) -> String {
    let Some(map) = value.as_object() else {
        return String::new();
    };
    if let Some(s) = map.get("stringValue").and_then(Value::as_str) {
        return s.to_string();
    }
    if let Some(b) = map.get("boolValue").and_then(Value::as_bool) {
        return b.to_string();
    }
    if let Some(i) = map.get("intValue").and_then(as_i64) {
        return i.to_string();
    }
    if let Some(d) = map.get("doubleValue").and_then(Value::as_f64) {
        return d.to_string();
    }
    if map.contains_key("arrayValue") || map.contains_key("kvlistValue") {
        return "<complex>".to_string();
    }
    String::new()
}
