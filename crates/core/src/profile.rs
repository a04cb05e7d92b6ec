use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::index::SpanIndex;
use crate::integrity::OrphanSpan;
use crate::metrics::ValueSummary;
use crate::model::span::SpanKind;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CorpusProfile {
    pub total_spans: usize,
    pub distinct_span_ids: usize,
    pub distinct_parent_ids: usize,
    pub root_spans: usize,
    pub child_spans: usize,
    pub traces: usize,
    pub roots_by_service: Vec<(String, usize)>,
    pub roots_by_kind: Vec<(SpanKind, usize)>,
    pub children_by_kind: Vec<(SpanKind, usize)>,
    pub spans_per_trace: Option<ValueSummary>,
    pub span_count_histogram: Vec<(usize, usize)>,
    pub services_per_trace: Option<ValueSummary>,
    pub roots_per_trace: Option<ValueSummary>,
    pub spans_by_service: Vec<(String, usize)>,
}

impl CorpusProfile {
    pub fn build(index: &SpanIndex<'_>) -> Self {
        let records = index.records();
        let root_spans = records.iter().filter(|r| r.is_root()).count();

        let mut roots_by_service: HashMap<&str, usize> = HashMap::new();
        let mut spans_by_service: HashMap<&str, usize> = HashMap::new();
        let mut roots_by_kind: BTreeMap<SpanKind, usize> = BTreeMap::new();
        let mut children_by_kind: BTreeMap<SpanKind, usize> = BTreeMap::new();
        for record in records {
            *spans_by_service.entry(record.service_name.as_str()).or_default() += 1;
            if record.is_root() {
                *roots_by_service.entry(record.service_name.as_str()).or_default() += 1;
                *roots_by_kind.entry(record.span_kind).or_default() += 1;
            } else {
                *children_by_kind.entry(record.span_kind).or_default() += 1;
            }
        }

        let mut span_counts = Vec::with_capacity(index.trace_count());
        let mut service_counts = Vec::with_capacity(index.trace_count());
        let mut root_counts = Vec::with_capacity(index.trace_count());
        let mut histogram: BTreeMap<usize, usize> = BTreeMap::new();
        for (trace_id, spans) in index.traces() {
            span_counts.push(spans.len());
            *histogram.entry(spans.len()).or_default() += 1;
            let services = spans
                .iter()
                .map(|&pos| index.record(pos).service_name.as_str())
                .collect::<BTreeSet<_>>();
            service_counts.push(services.len());
            root_counts.push(index.roots_of(trace_id).len());
        }

        Self {
            total_spans: records.len(),
            distinct_span_ids: index.distinct_span_ids(),
            distinct_parent_ids: index.distinct_parent_ids(),
            root_spans,
            child_spans: records.len() - root_spans,
            traces: index.trace_count(),
            roots_by_service: ranked(roots_by_service),
            roots_by_kind: roots_by_kind.into_iter().collect(),
            children_by_kind: children_by_kind.into_iter().collect(),
            spans_per_trace: ValueSummary::from_values(span_counts),
            span_count_histogram: histogram.into_iter().collect(),
            services_per_trace: ValueSummary::from_values(service_counts),
            roots_per_trace: ValueSummary::from_values(root_counts),
            spans_by_service: ranked(spans_by_service),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct OrphanBreakdown {
    pub by_service: Vec<(String, usize)>,
    pub by_kind: Vec<(SpanKind, usize)>,
}

impl OrphanBreakdown {
    pub fn from_orphans(orphans: &[OrphanSpan]) -> Self {
        let mut by_service: HashMap<&str, usize> = HashMap::new();
        let mut by_kind: BTreeMap<SpanKind, usize> = BTreeMap::new();
        for orphan in orphans {
            *by_service.entry(orphan.service_name.as_str()).or_default() += 1;
            *by_kind.entry(orphan.span_kind).or_default() += 1;
        }
        Self {
            by_service: ranked(by_service),
            by_kind: by_kind.into_iter().collect(),
        }
    }
}

/// Descending by count, ties by name.
fn ranked(counts: HashMap<&str, usize>) -> Vec<(String, usize)> {
    let mut out = counts
        .into_iter()
        .map(|(name, count)| (name.to_string(), count))
        .collect::<Vec<_>>();
    out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::span::SpanRecord;

    fn span(trace: &str, id: &str, parent: &str, service: &str, kind: i32) -> SpanRecord {
        SpanRecord {
            trace_id: trace.to_string(),
            span_id: id.to_string(),
            parent_span_id: parent.to_string(),
            service_name: service.to_string(),
            span_kind: SpanKind::from(kind),
            ..SpanRecord::default()
        }
    }

    #[test]
    fn counts_roots_children_and_kinds() {
        let records = vec![
            span("t1", "a", "", "web", 2),
            span("t1", "b", "a", "cart", 3),
            span("t1", "c", "b", "cart", 2),
            span("t2", "d", "", "web", 2),
            span("t3", "e", "", "batch", 1),
            span("t3", "f", "", "batch", 1),
        ];
        let index = SpanIndex::build(&records);
        let profile = CorpusProfile::build(&index);

        assert_eq!(profile.total_spans, 6);
        assert_eq!(profile.root_spans, 4);
        assert_eq!(profile.child_spans, 2);
        assert_eq!(profile.traces, 3);
        assert_eq!(profile.distinct_parent_ids, 2);
        assert_eq!(
            profile.roots_by_service,
            vec![("batch".to_string(), 2), ("web".to_string(), 2)]
        );
        assert_eq!(
            profile.roots_by_kind,
            vec![(SpanKind::Internal, 2), (SpanKind::Server, 2)]
        );
        assert_eq!(
            profile.children_by_kind,
            vec![(SpanKind::Server, 1), (SpanKind::Client, 1)]
        );
        assert_eq!(profile.span_count_histogram, vec![(1, 1), (2, 1), (3, 1)]);

        let services = profile.services_per_trace.unwrap();
        assert_eq!(services.max, 2);
        let roots = profile.roots_per_trace.unwrap();
        assert_eq!(roots.max, 2);
        assert_eq!(roots.min, 1);
    }

    #[test]
    fn empty_corpus_has_no_distributions() {
        let index = SpanIndex::build(&[]);
        let profile = CorpusProfile::build(&index);
        assert_eq!(profile.total_spans, 0);
        assert!(profile.spans_per_trace.is_none());
    }

    #[test]
    fn orphan_breakdown_groups_by_service_and_kind() {
        let records = vec![
            span("t", "a", "x", "cart", 3),
            span("t", "b", "y", "cart", 2),
            span("t", "c", "z", "web", 3),
        ];
        let index = SpanIndex::build(&records);
        let orphans = crate::integrity::IntegrityChecker::new(&index).find_orphans();
        let breakdown = OrphanBreakdown::from_orphans(&orphans);
        assert_eq!(
            breakdown.by_service,
            vec![("cart".to_string(), 2), ("web".to_string(), 1)]
        );
        assert_eq!(
            breakdown.by_kind,
            vec![(SpanKind::Server, 1), (SpanKind::Client, 2)]
        );
    }
}
