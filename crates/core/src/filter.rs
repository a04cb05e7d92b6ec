use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TraceCheckError};
use crate::model::span::SpanRecord;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttrFilter {
    pub key: String,
    pub value_glob: String,
}

impl AttrFilter {
    pub fn parse(input: &str) -> Result<Self> {
        let (key, value_glob) = input
            .split_once('=')
            .ok_or_else(|| TraceCheckError::Parse(format!("invalid where filter: {input}")))?;

        if key.trim().is_empty() || value_glob.trim().is_empty() {
            return Err(TraceCheckError::Parse(format!("invalid where filter: {input}")));
        }
        Pattern::new(value_glob.trim())
            .map_err(|e| TraceCheckError::Parse(format!("invalid glob in {input}: {e}")))?;

        Ok(Self {
            key: key.trim().to_string(),
            value_glob: value_glob.trim().to_string(),
        })
    }

    pub fn matches(&self, value: &str) -> bool {
        Pattern::new(&self.value_glob)
            .map(|p| p.matches(value))
            .unwrap_or(false)
    }

    /// `service`, `span_name` and `status` address record fields; any other
    /// key is looked up in the attributes. A missing key never matches.
    pub fn matches_span(&self, span: &SpanRecord) -> bool {
        let value = match self.key.as_str() {
            "service" | "service.name" => Some(span.service_name.as_str()),
            "span_name" | "name" => Some(span.span_name.as_str()),
            "status" => Some(span.status.as_str()),
            key => span.attr(key),
        };
        value.is_some_and(|v| self.matches(v))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SpanFilter {
    pub service: Option<String>,
    pub trace_id: Option<String>,
    pub attr_filters: Vec<AttrFilter>,
}

impl SpanFilter {
    pub fn is_empty(&self) -> bool {
        self.service.is_none() && self.trace_id.is_none() && self.attr_filters.is_empty()
    }

    pub fn matches(&self, span: &SpanRecord) -> bool {
        if self.service.as_deref().is_some_and(|s| s != span.service_name) {
            return false;
        }
        if self.trace_id.as_deref().is_some_and(|t| t != span.trace_id) {
            return false;
        }
        self.attr_filters.iter().all(|f| f.matches_span(span))
    }

    /// Keeps matching records, preserving input order.
    pub fn apply(&self, records: Vec<SpanRecord>) -> Vec<SpanRecord> {
        if self.is_empty() {
            return records;
        }
        let before = records.len();
        let kept = records
            .into_iter()
            .filter(|r| self.matches(r))
            .collect::<Vec<_>>();
        tracing::debug!(before, after = kept.len(), "span filter applied");
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labelled(service: &str, label: &str) -> SpanRecord {
        let mut span = SpanRecord {
            trace_id: "t".to_string(),
            span_id: "s".to_string(),
            service_name: service.to_string(),
            ..SpanRecord::default()
        };
        span.attributes
            .insert("anomaly.label".to_string(), label.to_string());
        span
    }

    #[test]
    fn attr_filter_parse_and_match() {
        let f = AttrFilter::parse("net.peer.name=redis*").unwrap();
        assert_eq!(f.key, "net.peer.name");
        assert!(f.matches("redis:6379"));
        assert!(!f.matches("postgres:5432"));
    }

    #[test]
    fn attr_filter_rejects_bad_input() {
        assert!(AttrFilter::parse("no-equals").is_err());
        assert!(AttrFilter::parse("=x").is_err());
        assert!(AttrFilter::parse("k=[").is_err());
    }

    #[test]
    fn span_filter_combines_service_and_attributes() {
        let filter = SpanFilter {
            service: Some("cart".to_string()),
            trace_id: None,
            attr_filters: vec![AttrFilter::parse("anomaly.label=anom*").unwrap()],
        };
        assert!(filter.matches(&labelled("cart", "anomalous")));
        assert!(!filter.matches(&labelled("cart", "normal")));
        assert!(!filter.matches(&labelled("web", "anomalous")));
    }

    #[test]
    fn pseudo_keys_address_record_fields() {
        let f = AttrFilter::parse("service=ca*").unwrap();
        assert!(f.matches_span(&labelled("cart", "normal")));
        let missing = AttrFilter::parse("http.method=GET").unwrap();
        assert!(!missing.matches_span(&labelled("cart", "normal")));
    }

    #[test]
    fn apply_keeps_order() {
        let records = vec![labelled("a", "x"), labelled("b", "y"), labelled("a", "z")];
        let filter = SpanFilter {
            service: Some("a".to_string()),
            ..SpanFilter::default()
        };
        let kept = filter.apply(records);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[1].attr("anomaly.label"), Some("z"));
    }
}
