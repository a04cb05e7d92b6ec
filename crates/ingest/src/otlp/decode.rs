use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::{AnyValue, KeyValue};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::Span as OtlpSpan;
use tracecheck_core::model::span::{SpanKind, SpanRecord};

pub fn decode_request(req: &ExportTraceServiceRequest) -> Vec<SpanRecord> {
    let mut spans = Vec::new();
    for rs in &req.resource_spans {
        let resource = rs.resource.as_ref();
        for ss in &rs.scope_spans {
            for span in &ss.spans {
                spans.push(decode_span(resource, span));
            }
        }
    }
    spans
}

pub fn decode_span(resource: Option<&Resource>, span: &OtlpSpan) -> SpanRecord {
    SpanRecord {
        trace_id: bytes_to_hex(&span.trace_id),
        span_id: bytes_to_hex(&span.span_id),
        parent_span_id: bytes_to_hex(&span.parent_span_id),
        service_name: service_name(resource),
        span_name: span.name.clone(),
        span_kind: SpanKind::from(span.kind),
        start_ts: nanos_to_dt(span.start_time_unix_nano),
        end_ts: nanos_to_dt(span.end_time_unix_nano),
        status: status_label(
            span.status.as_ref().map(|s| s.code).unwrap_or_default(),
            span.status.as_ref().map(|s| s.message.as_str()).unwrap_or_default(),
        ),
        attributes: kv_to_map(&span.attributes),
    }
}

/// Message when present, otherwise `ERROR` for status code 2 and `OK` for anything else.
pub(crate) fn status_label(code: i32, message: &str) -> String {
    if !message.is_empty() {
        return message.to_string();
    }
    if code == 2 {
        "ERROR".to_string()
    } else {
        "OK".to_string()
    }
}

fn service_name(resource: Option<&Resource>) -> String {
    if let Some(resource) = resource {
        for kv in &resource.attributes {
            if kv.key == "service.name" {
                return any_value_to_string(kv.value.as_ref());
            }
        }
    }
    "unknown".to_string()
}

fn kv_to_map(attrs: &[KeyValue]) -> BTreeMap<String, String> {
    attrs
        .iter()
        .map(|kv| (kv.key.clone(), any_value_to_string(kv.value.as_ref())))
        .collect()
}

fn any_value_to_string(value: Option<&AnyValue>) -> String {
    value
        .and_then(|v| v.value.as_ref())
        .map(|v| match v {
            opentelemetry_proto::tonic::common::v1::any_value::Value::StringValue(s) => s.clone(),
            opentelemetry_proto::tonic::common::v1::any_value::Value::BoolValue(b) => b.to_string(),
            opentelemetry_proto::tonic::common::v1::any_value::Value::IntValue(i) => i.to_string(),
            opentelemetry_proto::tonic::common::v1::any_value::Value::DoubleValue(d) => {
                d.to_string()
            }
            opentelemetry_proto::tonic::common::v1::any_value::Value::BytesValue(b) => {
                String::from_utf8_lossy(b).to_string()
            }
            _ => "<complex>".to_string(),
        })
        .unwrap_or_default()
}

/// Lowercase hex; empty input stays empty, which is the root sentinel for parents.
fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect::<String>()
}

pub(crate) fn nanos_to_dt(nanos: u64) -> DateTime<Utc> {
    let secs = (nanos / 1_000_000_000) as i64;
    let subnanos = (nanos % 1_000_000_000) as u32;
    Utc.timestamp_opt(secs, subnanos)
        .single()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use opentelemetry_proto::tonic::common::v1::any_value::Value;
    use opentelemetry_proto::tonic::common::v1::{AnyValue, KeyValue};
    use opentelemetry_proto::tonic::resource::v1::Resource;
    use opentelemetry_proto::tonic::trace::v1::Span as OtlpSpan;
    use opentelemetry_proto::tonic::trace::v1::Status;
    use tracecheck_core::model::span::SpanKind;

    use super::decode_span;

    fn resource(service: &str) -> Resource {
        Resource {
            attributes: vec![KeyValue {
                key: "service.name".into(),
                value: Some(AnyValue {
                    value: Some(Value::StringValue(service.into())),
                }),
            }],
            dropped_attributes_count: 0,
            entity_refs: vec![],
        }
    }

    #[test]
    fn decodes_ids_service_and_kind() {
        let span = OtlpSpan {
            trace_id: vec![1; 16],
            span_id: vec![2; 8],
            parent_span_id: vec![3; 8],
            name: "GET /cart".into(),
            kind: 2,
            start_time_unix_nano: 1_700_000_000_000_000_000,
            end_time_unix_nano: 1_700_000_000_250_000_000,
            attributes: vec![KeyValue {
                key: "http.status_code".into(),
                value: Some(AnyValue {
                    value: Some(Value::IntValue(200)),
                }),
            }],
            ..Default::default()
        };

        let out = decode_span(Some(&resource("cart")), &span);
        assert_eq!(out.trace_id, "01010101010101010101010101010101");
        assert_eq!(out.span_id, "0202020202020202");
        assert_eq!(out.parent_span_id, "0303030303030303");
        assert_eq!(out.service_name, "cart");
        assert_eq!(out.span_kind, SpanKind::Server);
        assert_eq!(out.duration_ms(), 250);
        assert_eq!(out.attr("http.status_code"), Some("200"));
    }

    #[test]
    fn empty_parent_decodes_as_root() {
        let span = OtlpSpan {
            trace_id: vec![1; 16],
            span_id: vec![2; 8],
            parent_span_id: vec![],
            name: "call".into(),
            status: None,
            ..Default::default()
        };

        let out = decode_span(None, &span);
        assert!(out.is_root());
        assert_eq!(out.status, "OK");
        assert_eq!(out.service_name, "unknown");
    }

    #[test]
    fn error_status_code_is_labelled() {
        let span = OtlpSpan {
            status: Some(Status {
                message: String::new(),
                code: 2,
            }),
            ..Default::default()
        };
        assert_eq!(decode_span(None, &span).status, "ERROR");
    }
}
