use std::collections::{BTreeMap, HashMap};

use crate::model::span::SpanRecord;

/// Lookup structures over one batch of spans.
///
/// Built in a single pass over the input. Positions into the original slice
/// are kept rather than clones so every report can point back at the exact
/// record it was derived from.
#[derive(Debug)]
pub struct SpanIndex<'a> {
    records: &'a [SpanRecord],
    by_id: HashMap<&'a str, usize>,
    children_of: HashMap<&'a str, Vec<usize>>,
    roots_of: BTreeMap<&'a str, Vec<usize>>,
    spans_of: BTreeMap<&'a str, Vec<usize>>,
    duplicates: Vec<(&'a str, Vec<usize>)>,
}

impl<'a> SpanIndex<'a> {
    pub fn build(records: &'a [SpanRecord]) -> Self {
        let mut by_id: HashMap<&'a str, usize> = HashMap::with_capacity(records.len());
        let mut children_of: HashMap<&'a str, Vec<usize>> = HashMap::new();
        let mut roots_of: BTreeMap<&'a str, Vec<usize>> = BTreeMap::new();
        let mut spans_of: BTreeMap<&'a str, Vec<usize>> = BTreeMap::new();
        let mut repeats: HashMap<&'a str, Vec<usize>> = HashMap::new();
        let mut repeat_order: Vec<&'a str> = Vec::new();

        for (pos, record) in records.iter().enumerate() {
            let span_id = record.span_id.as_str();
            if let Some(&first) = by_id.get(span_id) {
                let group = repeats.entry(span_id).or_insert_with(|| {
                    repeat_order.push(span_id);
                    vec![first]
                });
                group.push(pos);
            } else {
                by_id.insert(span_id, pos);
            }

            if record.is_root() {
                roots_of
                    .entry(record.trace_id.as_str())
                    .or_default()
                    .push(pos);
            } else {
                children_of
                    .entry(record.parent_span_id.as_str())
                    .or_default()
                    .push(pos);
            }
            spans_of
                .entry(record.trace_id.as_str())
                .or_default()
                .push(pos);
        }

        let duplicates = repeat_order
            .into_iter()
            .filter_map(|id| repeats.remove(id).map(|group| (id, group)))
            .collect::<Vec<_>>();

        tracing::debug!(
            spans = records.len(),
            distinct_ids = by_id.len(),
            traces = spans_of.len(),
            duplicate_ids = duplicates.len(),
            "span index built"
        );

        Self {
            records,
            by_id,
            children_of,
            roots_of,
            spans_of,
            duplicates,
        }
    }

    pub fn records(&self) -> &'a [SpanRecord] {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record(&self, pos: usize) -> &'a SpanRecord {
        &self.records[pos]
    }

    /// First record seen with this span id.
    pub fn get(&self, span_id: &str) -> Option<&'a SpanRecord> {
        self.by_id.get(span_id).map(|&pos| &self.records[pos])
    }

    pub fn contains(&self, span_id: &str) -> bool {
        self.by_id.contains_key(span_id)
    }

    pub fn distinct_span_ids(&self) -> usize {
        self.by_id.len()
    }

    /// Children of `span_id` in input order. The parent need not exist.
    pub fn children_of(&self, span_id: &str) -> &[usize] {
        self.children_of
            .get(span_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn distinct_parent_ids(&self) -> usize {
        self.children_of.len()
    }

    /// Root spans of a trace in input order.
    pub fn roots_of(&self, trace_id: &str) -> &[usize] {
        self.roots_of
            .get(trace_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Traces that have at least one root, ordered by trace id.
    pub fn rooted_traces(&self) -> impl Iterator<Item = (&'a str, &[usize])> + '_ {
        self.roots_of.iter().map(|(id, roots)| (*id, roots.as_slice()))
    }

    /// Every trace with its spans in input order, ordered by trace id.
    pub fn traces(&self) -> impl Iterator<Item = (&'a str, &[usize])> + '_ {
        self.spans_of.iter().map(|(id, spans)| (*id, spans.as_slice()))
    }

    pub fn spans_of(&self, trace_id: &str) -> &[usize] {
        self.spans_of
            .get(trace_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn trace_count(&self) -> usize {
        self.spans_of.len()
    }

    /// Span ids seen on more than one record, in order of first repetition,
    /// each with every position carrying it (first occurrence included).
    pub fn duplicate_groups(&self) -> &[(&'a str, Vec<usize>)] {
        &self.duplicates
    }
}
