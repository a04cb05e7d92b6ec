use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::index::SpanIndex;
use crate::model::span::{SpanKind, SpanRecord};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DuplicateGroup {
    pub span_id: String,
    pub records: Vec<SpanRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrphanSpan {
    pub span_id: String,
    pub parent_span_id: String,
    pub trace_id: String,
    pub service_name: String,
    pub span_name: String,
    pub span_kind: SpanKind,
}

/// A parent reference that resolves, but to a span recorded under another trace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CrossTraceParent {
    pub span_id: String,
    pub trace_id: String,
    pub parent_span_id: String,
    pub parent_trace_id: String,
}

/// Read-only structural checks over a [`SpanIndex`].
pub struct IntegrityChecker<'i, 'a> {
    index: &'i SpanIndex<'a>,
}

impl<'i, 'a> IntegrityChecker<'i, 'a> {
    pub fn new(index: &'i SpanIndex<'a>) -> Self {
        Self { index }
    }

    pub fn find_duplicate_span_ids(&self) -> Vec<DuplicateGroup> {
        self.index
            .duplicate_groups()
            .iter()
            .map(|(span_id, positions)| DuplicateGroup {
                span_id: (*span_id).to_string(),
                records: positions
                    .iter()
                    .map(|&pos| self.index.record(pos).clone())
                    .collect(),
            })
            .collect()
    }

    /// Spans whose parent id matches no span anywhere in the corpus, in input order.
    pub fn find_orphans(&self) -> Vec<OrphanSpan> {
        self.index
            .records()
            .iter()
            .filter(|r| !r.is_root() && !self.index.contains(&r.parent_span_id))
            .map(|r| OrphanSpan {
                span_id: r.span_id.clone(),
                parent_span_id: r.parent_span_id.clone(),
                trace_id: r.trace_id.clone(),
                service_name: r.service_name.clone(),
                span_name: r.span_name.clone(),
                span_kind: r.span_kind,
            })
            .collect()
    }

    /// Resolvable parents whose first-seen record belongs to a different trace.
    pub fn find_cross_trace_parents(&self) -> Vec<CrossTraceParent> {
        self.index
            .records()
            .iter()
            .filter(|r| !r.is_root())
            .filter_map(|r| {
                let parent = self.index.get(&r.parent_span_id)?;
                (parent.trace_id != r.trace_id).then(|| CrossTraceParent {
                    span_id: r.span_id.clone(),
                    trace_id: r.trace_id.clone(),
                    parent_span_id: r.parent_span_id.clone(),
                    parent_trace_id: parent.trace_id.clone(),
                })
            })
            .collect()
    }

    pub fn find_multi_root_traces(&self) -> BTreeMap<String, usize> {
        self.index
            .rooted_traces()
            .filter(|(_, roots)| roots.len() > 1)
            .map(|(trace_id, roots)| (trace_id.to_string(), roots.len()))
            .collect()
    }

    /// Traces in which every span names a parent.
    pub fn find_zero_root_traces(&self) -> Vec<String> {
        self.index
            .traces()
            .filter(|(trace_id, _)| self.index.roots_of(trace_id).is_empty())
            .map(|(trace_id, _)| trace_id.to_string())
            .collect()
    }
}
