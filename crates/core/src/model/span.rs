use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OTLP span kind. Unknown codes are preserved rather than rejected.
///
/// Identity is the numeric code, so a hand-built `Unknown(2)` is the same kind
/// as `Server` for equality, ordering and hashing.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum SpanKind {
    #[default]
    Unspecified,
    Internal,
    Server,
    Client,
    Producer,
    Consumer,
    Unknown(i32),
}

impl SpanKind {
    pub fn code(self) -> i32 {
        match self {
            Self::Unspecified => 0,
            Self::Internal => 1,
            Self::Server => 2,
            Self::Client => 3,
            Self::Producer => 4,
            Self::Consumer => 5,
            Self::Unknown(code) => code,
        }
    }

    /// Human-readable label. This is the only kind-name table in the workspace.
    pub fn label(self) -> String {
        match Self::from(self.code()) {
            Self::Unspecified => "UNSPECIFIED".to_string(),
            Self::Internal => "INTERNAL".to_string(),
            Self::Server => "SERVER".to_string(),
            Self::Client => "CLIENT".to_string(),
            Self::Producer => "PRODUCER".to_string(),
            Self::Consumer => "CONSUMER".to_string(),
            Self::Unknown(code) => format!("UNKNOWN({code})"),
        }
    }
}

impl From<i32> for SpanKind {
    fn from(code: i32) -> Self {
        match code {
            0 => Self::Unspecified,
            1 => Self::Internal,
            2 => Self::Server,
            3 => Self::Client,
            4 => Self::Producer,
            5 => Self::Consumer,
            other => Self::Unknown(other),
        }
    }
}

impl From<SpanKind> for i32 {
    fn from(kind: SpanKind) -> Self {
        kind.code()
    }
}

impl PartialEq for SpanKind {
    fn eq(&self, other: &Self) -> bool {
        self.code() == other.code()
    }
}

impl Eq for SpanKind {}

impl Hash for SpanKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.code().hash(state);
    }
}

impl Ord for SpanKind {
    fn cmp(&self, other: &Self) -> Ordering {
        self.code().cmp(&other.code())
    }
}

impl PartialOrd for SpanKind {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SpanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// One flat span row. An empty `parent_span_id` marks a root span.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct SpanRecord {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: String,
    pub service_name: String,
    pub span_name: String,
    pub span_kind: SpanKind,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub status: String,
    pub attributes: BTreeMap<String, String>,
}

impl SpanRecord {
    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_empty()
    }

    pub fn duration_ms(&self) -> i64 {
        (self.end_ts - self.start_ts).num_milliseconds().max(0)
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_roundtrips_known_and_unknown_codes() {
        assert_eq!(SpanKind::from(2), SpanKind::Server);
        assert_eq!(SpanKind::from(9), SpanKind::Unknown(9));
        assert_eq!(SpanKind::Unknown(9).code(), 9);
        assert_eq!(SpanKind::Client.label(), "CLIENT");
        assert_eq!(SpanKind::Unknown(7).to_string(), "UNKNOWN(7)");
    }

    #[test]
    fn unnormalized_codes_share_identity_with_named_kinds() {
        use std::collections::HashSet;

        assert_eq!(SpanKind::Unknown(2), SpanKind::Server);
        assert_eq!(SpanKind::Unknown(2).cmp(&SpanKind::Server), Ordering::Equal);
        assert_eq!(SpanKind::Unknown(2).label(), "SERVER");

        let mut tally = BTreeMap::new();
        for kind in [SpanKind::Server, SpanKind::Unknown(2), SpanKind::Unknown(7)] {
            *tally.entry(kind).or_insert(0) += 1;
        }
        assert_eq!(tally.get(&SpanKind::Server), Some(&2));
        assert_eq!(tally.len(), 2);

        let set = [SpanKind::Client, SpanKind::Unknown(3)]
            .into_iter()
            .collect::<HashSet<_>>();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let span: SpanRecord =
            serde_json::from_str(r#"{"trace_id":"t1","span_id":"a","span_kind":3}"#).unwrap();
        assert!(span.is_root());
        assert_eq!(span.span_kind, SpanKind::Client);
        assert_eq!(span.service_name, "");
        assert_eq!(span.duration_ms(), 0);
    }
}
