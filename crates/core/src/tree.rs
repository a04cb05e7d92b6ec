use std::collections::{BTreeSet, HashSet};

use crate::index::SpanIndex;
use crate::model::span::SpanRecord;

#[derive(Debug, Clone, PartialEq)]
pub struct TreeLine<'a> {
    pub depth: usize,
    pub span: &'a SpanRecord,
    pub is_last: bool,
    /// Already on the active path; emitted once and not descended.
    pub cyclic: bool,
}

/// Rendering order over one trace: each root in input order, then a
/// depth-first pre-order walk with children in input order. Only children
/// recorded under the same trace are followed.
pub struct TraceTree<'i, 'a> {
    index: &'i SpanIndex<'a>,
}

impl<'i, 'a> TraceTree<'i, 'a> {
    pub fn new(index: &'i SpanIndex<'a>) -> Self {
        Self { index }
    }

    pub fn walk(&self, trace_id: &str) -> Vec<TreeLine<'a>> {
        let mut lines = Vec::new();
        for &root in self.index.roots_of(trace_id) {
            self.walk_from(trace_id, root, &mut lines);
        }
        lines
    }

    fn same_trace_children(&self, trace_id: &str, pos: usize) -> Vec<usize> {
        let span_id = self.index.record(pos).span_id.as_str();
        self.index
            .children_of(span_id)
            .iter()
            .copied()
            .filter(|&child| self.index.record(child).trace_id == trace_id)
            .collect()
    }

    fn walk_from(&self, trace_id: &str, root: usize, lines: &mut Vec<TreeLine<'a>>) {
        // Path identity is the span id, so a duplicate id pointing back up the
        // tree counts as a cycle. `leaving` frames pop the path.
        let mut on_path: HashSet<&'a str> = HashSet::new();
        let mut stack = vec![(root, 0usize, true, false)];
        while let Some((pos, depth, is_last, leaving)) = stack.pop() {
            let span = self.index.record(pos);
            let key = span.span_id.as_str();
            if leaving {
                on_path.remove(key);
                continue;
            }
            if on_path.contains(key) {
                lines.push(TreeLine {
                    depth,
                    span,
                    is_last,
                    cyclic: true,
                });
                continue;
            }

            lines.push(TreeLine {
                depth,
                span,
                is_last,
                cyclic: false,
            });
            on_path.insert(key);
            stack.push((pos, depth, is_last, true));

            let children = self.same_trace_children(trace_id, pos);
            let last = children.len().saturating_sub(1);
            for (i, &child) in children.iter().enumerate().rev() {
                stack.push((child, depth + 1, i == last, false));
            }
        }
    }

    /// Most structurally interesting traces: distinct services desc, spans
    /// desc, trace id asc. Traces touching three or more services are
    /// preferred, then two or more, then anything.
    pub fn pick_examples(&self, limit: usize, candidates: Option<&BTreeSet<String>>) -> Vec<String> {
        let mut ranked = self
            .index
            .traces()
            .filter(|(trace_id, _)| candidates.is_none_or(|c| c.contains(*trace_id)))
            .map(|(trace_id, spans)| {
                let services = spans
                    .iter()
                    .map(|&pos| self.index.record(pos).service_name.as_str())
                    .collect::<BTreeSet<_>>()
                    .len();
                (trace_id, services, spans.len())
            })
            .collect::<Vec<_>>();
        ranked.sort_by(|a, b| {
            b.1.cmp(&a.1)
                .then_with(|| b.2.cmp(&a.2))
                .then_with(|| a.0.cmp(b.0))
        });

        let pick = |min_services: usize| {
            ranked
                .iter()
                .filter(|(_, services, _)| *services >= min_services)
                .take(limit)
                .map(|(trace_id, _, _)| trace_id.to_string())
                .collect::<Vec<_>>()
        };
        let preferred = pick(3);
        if !preferred.is_empty() {
            return preferred;
        }
        let fallback = pick(2);
        if !fallback.is_empty() {
            return fallback;
        }
        pick(0)
    }
}
