use chrono::{Duration, TimeZone, Utc};
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::any_value::Value;
use opentelemetry_proto::tonic::common::v1::{AnyValue, InstrumentationScope, KeyValue};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span};
use prost::Message;
use tracecheck_core::model::span::{SpanKind, SpanRecord};

pub fn span(trace_id: &str, span_id: &str, parent: &str, service: &str) -> SpanRecord {
    let base = Utc.with_ymd_and_hms(2026, 1, 9, 16, 4, 26).unwrap();
    SpanRecord {
        trace_id: trace_id.to_string(),
        span_id: span_id.to_string(),
        parent_span_id: parent.to_string(),
        service_name: service.to_string(),
        span_name: format!("{service} op"),
        span_kind: if parent.is_empty() {
            SpanKind::Server
        } else {
            SpanKind::Client
        },
        start_ts: base,
        end_ts: base + Duration::milliseconds(40),
        status: "OK".to_string(),
        attributes: Default::default(),
    }
}

pub fn labelled(mut record: SpanRecord, label: &str) -> SpanRecord {
    record
        .attributes
        .insert("anomaly.label".to_string(), label.to_string());
    record
}

/// A small shop corpus: one healthy three-service trace plus one instance of
/// each structural defect.
pub fn shop_corpus() -> Vec<SpanRecord> {
    vec![
        labelled(span("T1", "A", "", "web"), "normal"),
        labelled(span("T1", "B", "A", "cart"), "normal"),
        labelled(span("T1", "C", "B", "payment"), "normal"),
        labelled(span("T2", "r1", "", "web"), "anomalous"),
        labelled(span("T2", "r2", "", "web"), "anomalous"),
        labelled(span("T3", "D", "zzz", "cart"), "anomalous"),
        labelled(span("T4", "s1", "", "catalogue"), "normal"),
        labelled(span("T5", "s1", "", "catalogue"), "normal"),
    ]
}

pub fn healthy_corpus() -> Vec<SpanRecord> {
    vec![
        span("T1", "A", "", "web"),
        span("T1", "B", "A", "cart"),
        span("T1", "C", "B", "payment"),
    ]
}

pub fn to_jsonl(records: &[SpanRecord]) -> String {
    records
        .iter()
        .map(|r| serde_json::to_string(r).unwrap())
        .collect::<Vec<_>>()
        .join("\n")
}

fn string_kv(key: &str, value: &str) -> KeyValue {
    KeyValue {
        key: key.into(),
        value: Some(AnyValue {
            value: Some(Value::StringValue(value.into())),
        }),
    }
}

/// One resource per service, spans given as `(trace_hex, span_hex, parent_hex, name)`.
pub fn export_request(services: &[(&str, Vec<(&str, &str, &str, &str)>)]) -> ExportTraceServiceRequest {
    let base_nanos = 1_700_000_000_000_000_000u64;
    ExportTraceServiceRequest {
        resource_spans: services
            .iter()
            .map(|(service, spans)| ResourceSpans {
                resource: Some(Resource {
                    attributes: vec![string_kv("service.name", service)],
                    dropped_attributes_count: 0,
                    entity_refs: vec![],
                }),
                scope_spans: vec![ScopeSpans {
                    scope: Some(InstrumentationScope {
                        name: "testkit".into(),
                        version: "0.1".into(),
                        attributes: vec![],
                        dropped_attributes_count: 0,
                    }),
                    spans: spans
                        .iter()
                        .enumerate()
                        .map(|(i, (trace, id, parent, name))| Span {
                            trace_id: hex_bytes(trace),
                            span_id: hex_bytes(id),
                            parent_span_id: hex_bytes(parent),
                            name: (*name).into(),
                            kind: if parent.is_empty() { 2 } else { 3 },
                            start_time_unix_nano: base_nanos + i as u64 * 1_000_000,
                            end_time_unix_nano: base_nanos + (i as u64 + 5) * 1_000_000,
                            ..Default::default()
                        })
                        .collect(),
                    schema_url: "".into(),
                }],
                schema_url: "".into(),
            })
            .collect(),
    }
}

pub fn encode_request(req: &ExportTraceServiceRequest) -> Vec<u8> {
    let mut payload = Vec::new();
    req.encode(&mut payload).unwrap();
    payload
}

/// OTLP/JSON line in the collector file exporter layout.
pub fn otlp_json_line(services: &[(&str, Vec<(&str, &str, &str, &str)>)]) -> String {
    let resource_spans = services
        .iter()
        .map(|(service, spans)| {
            serde_json::json!({
                "resource": {"attributes": [{"key": "service.name", "value": {"stringValue": service}}]},
                "scopeSpans": [{
                    "scope": {"name": "testkit"},
                    "spans": spans.iter().map(|(trace, id, parent, name)| serde_json::json!({
                        "traceId": trace,
                        "spanId": id,
                        "parentSpanId": parent,
                        "name": name,
                        "kind": if parent.is_empty() { 2 } else { 3 },
                        "startTimeUnixNano": "1700000000000000000",
                        "endTimeUnixNano": "1700000000050000000",
                    })).collect::<Vec<_>>(),
                }],
            })
        })
        .collect::<Vec<_>>();
    serde_json::json!({ "resourceSpans": resource_spans }).to_string()
}

fn hex_bytes(hex: &str) -> Vec<u8> {
    (0..hex.len() / 2)
        .filter_map(|i| u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok())
        .collect()
}
