use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::index::SpanIndex;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TraceShape {
    pub depth: usize,
    pub breadth: usize,
    pub roots: usize,
}

/// A branch cut short because `to_span` was already on the active path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct CycleTruncation {
    pub trace_id: String,
    pub from_span: String,
    pub to_span: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValueSummary {
    pub min: usize,
    pub max: usize,
    pub mean: f64,
    pub median: usize,
}

impl ValueSummary {
    /// `None` for an empty input. Median is the upper middle element.
    pub fn from_values(values: impl IntoIterator<Item = usize>) -> Option<Self> {
        let mut sorted = values.into_iter().collect::<Vec<_>>();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_unstable();
        let total: usize = sorted.iter().sum();
        Some(Self {
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            mean: total as f64 / sorted.len() as f64,
            median: sorted[sorted.len() / 2],
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsSummary {
    pub depth: ValueSummary,
    pub breadth: ValueSummary,
    pub depth_distribution: Vec<(usize, usize)>,
    pub deepest_trace: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TraceMetrics {
    pub traces: BTreeMap<String, TraceShape>,
    pub zero_root_traces: Vec<String>,
    /// Distinct cuts, ordered by trace, then from, then to.
    pub truncations: Vec<CycleTruncation>,
}

impl TraceMetrics {
    pub fn summary(&self) -> Option<MetricsSummary> {
        let depth = ValueSummary::from_values(self.traces.values().map(|s| s.depth))?;
        let breadth = ValueSummary::from_values(self.traces.values().map(|s| s.breadth))?;

        let mut distribution: BTreeMap<usize, usize> = BTreeMap::new();
        for shape in self.traces.values() {
            *distribution.entry(shape.depth).or_default() += 1;
        }

        // BTreeMap iteration is ascending, so the first maximum has the smallest id.
        let mut deepest: Option<(&String, usize)> = None;
        for (trace_id, shape) in &self.traces {
            if deepest.is_none_or(|(_, best)| shape.depth > best) {
                deepest = Some((trace_id, shape.depth));
            }
        }

        Some(MetricsSummary {
            depth,
            breadth,
            depth_distribution: distribution.into_iter().collect(),
            deepest_trace: deepest.map(|(id, _)| id.clone()).unwrap_or_default(),
        })
    }
}

struct Frame<'a> {
    span_id: &'a str,
    next_child: usize,
    best_child: usize,
}

/// Depth and root breadth per trace.
///
/// `depth(span)` is 1 for a leaf and `1 + max(depth(child))` otherwise; a child
/// already on the active path contributes 0. Each span id is expanded once and
/// its depth memoized when its frame completes, so the walk is linear in the
/// number of parent links. Outside cycles the memoized value is path
/// independent; inside a cycle it is the value along the first path that
/// reached the span.
pub struct TreeMetricsEngine<'i, 'a> {
    index: &'i SpanIndex<'a>,
    memo: HashMap<&'a str, usize>,
    truncations: BTreeSet<CycleTruncation>,
}

impl<'i, 'a> TreeMetricsEngine<'i, 'a> {
    pub fn new(index: &'i SpanIndex<'a>) -> Self {
        Self {
            index,
            memo: HashMap::new(),
            truncations: BTreeSet::new(),
        }
    }

    pub fn compute_metrics(mut self) -> TraceMetrics {
        let mut traces = BTreeMap::new();
        let mut zero_root_traces = Vec::new();

        let index = self.index;
        let rooted = index
            .traces()
            .map(|(trace_id, _)| (trace_id, index.roots_of(trace_id)))
            .collect::<Vec<_>>();

        for (trace_id, roots) in rooted {
            if roots.is_empty() {
                zero_root_traces.push(trace_id.to_string());
                continue;
            }

            let mut shape = TraceShape {
                depth: 0,
                breadth: 0,
                roots: roots.len(),
            };
            for &pos in roots {
                let root_id = index.record(pos).span_id.as_str();
                shape.depth = shape.depth.max(self.depth_from(trace_id, root_id));
                shape.breadth = shape.breadth.max(index.children_of(root_id).len());
            }
            traces.insert(trace_id.to_string(), shape);
        }

        if !self.truncations.is_empty() {
            tracing::warn!(
                count = self.truncations.len(),
                "cyclic continuations truncated during depth walk"
            );
        }
        tracing::debug!(
            traces = traces.len(),
            zero_root = zero_root_traces.len(),
            memoized = self.memo.len(),
            "trace metrics computed"
        );

        TraceMetrics {
            traces,
            zero_root_traces,
            truncations: self.truncations.into_iter().collect(),
        }
    }

    fn depth_from(&mut self, trace_id: &str, root: &'a str) -> usize {
        if let Some(&depth) = self.memo.get(root) {
            return depth;
        }

        let index = self.index;
        let mut on_path: HashSet<&'a str> = HashSet::new();
        let mut stack = vec![Frame {
            span_id: root,
            next_child: 0,
            best_child: 0,
        }];
        on_path.insert(root);

        loop {
            let Some(frame) = stack.last_mut() else {
                return 0;
            };
            let children = index.children_of(frame.span_id);

            if let Some(&pos) = children.get(frame.next_child) {
                frame.next_child += 1;
                let child = index.record(pos).span_id.as_str();

                if on_path.contains(child) {
                    self.truncations.insert(CycleTruncation {
                        trace_id: trace_id.to_string(),
                        from_span: frame.span_id.to_string(),
                        to_span: child.to_string(),
                    });
                    continue;
                }
                if let Some(&depth) = self.memo.get(child) {
                    frame.best_child = frame.best_child.max(depth);
                    continue;
                }

                on_path.insert(child);
                stack.push(Frame {
                    span_id: child,
                    next_child: 0,
                    best_child: 0,
                });
                continue;
            }

            let Some(done) = stack.pop() else {
                return 0;
            };
            on_path.remove(done.span_id);
            let depth = 1 + done.best_child;
            self.memo.insert(done.span_id, depth);

            match stack.last_mut() {
                Some(parent) => parent.best_child = parent.best_child.max(depth),
                None => return depth,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::span::SpanRecord;

    fn span(trace: &str, id: &str, parent: &str) -> SpanRecord {
        SpanRecord {
            trace_id: trace.to_string(),
            span_id: id.to_string(),
            parent_span_id: parent.to_string(),
            ..SpanRecord::default()
        }
    }

    fn metrics(records: &[SpanRecord]) -> TraceMetrics {
        let index = SpanIndex::build(records);
        TreeMetricsEngine::new(&index).compute_metrics()
    }

    /// Direct transcription of the path-copying recursive definition.
    fn reference_depth(index: &SpanIndex<'_>, span_id: &str, path: &mut Vec<String>) -> usize {
        if path.iter().any(|p| p == span_id) {
            return 0;
        }
        path.push(span_id.to_string());
        let children = index.children_of(span_id);
        let depth = if children.is_empty() {
            1
        } else {
            1 + children
                .iter()
                .map(|&pos| reference_depth(index, &index.record(pos).span_id, path))
                .max()
                .unwrap_or(0)
        };
        path.pop();
        depth
    }

    #[test]
    fn three_level_chain() {
        let m = metrics(&[span("T1", "A", ""), span("T1", "B", "A"), span("T1", "C", "B")]);
        let shape = m.traces["T1"];
        assert_eq!(shape.depth, 3);
        assert_eq!(shape.breadth, 1);
        assert!(m.truncations.is_empty());
    }

    #[test]
    fn leaf_only_root_has_depth_one() {
        let m = metrics(&[span("T", "only", "")]);
        assert_eq!(m.traces["T"].depth, 1);
        assert_eq!(m.traces["T"].breadth, 0);
    }

    #[test]
    fn multi_root_takes_maximum_not_sum() {
        let m = metrics(&[
            span("T2", "r1", ""),
            span("T2", "r2", ""),
            span("T2", "c", "r2"),
            span("T2", "d", "r1"),
            span("T2", "e", "r1"),
        ]);
        let shape = m.traces["T2"];
        assert_eq!(shape.depth, 2);
        assert_eq!(shape.breadth, 2);
        assert_eq!(shape.roots, 2);
    }

    #[test]
    fn two_bare_roots_have_depth_one() {
        let m = metrics(&[span("T2", "a", ""), span("T2", "b", "")]);
        assert_eq!(m.traces["T2"].depth, 1);
    }

    #[test]
    fn zero_root_traces_are_excluded_and_listed() {
        let m = metrics(&[span("T", "a", "b"), span("T", "b", "a"), span("U", "r", "")]);
        assert!(!m.traces.contains_key("T"));
        assert_eq!(m.zero_root_traces, vec!["T".to_string()]);
    }

    #[test]
    fn cycle_through_duplicate_id_terminates() {
        // "r" is a root, but a second "r" record hangs under "c", closing r -> c -> r.
        let m = metrics(&[span("T", "r", ""), span("T", "c", "r"), span("T", "r", "c")]);
        let shape = m.traces["T"];
        assert_eq!(shape.depth, 2);
        assert_eq!(m.truncations.len(), 1);
        assert_eq!(m.truncations[0].from_span, "c");
        assert_eq!(m.truncations[0].to_span, "r");
    }

    #[test]
    fn matches_reference_definition_on_tangled_input() {
        let records = vec![
            span("T", "r", ""),
            span("T", "a", "r"),
            span("T", "b", "r"),
            span("T", "c", "a"),
            span("T", "c", "b"),
            span("T", "d", "c"),
            span("T", "a", "d"),
            span("T", "e", "b"),
            span("T", "f", "e"),
            span("T", "g", "f"),
            span("V", "v", ""),
            span("V", "w", "c"),
        ];
        let index = SpanIndex::build(&records);
        let m = TreeMetricsEngine::new(&index).compute_metrics();
        for (trace_id, roots) in index.rooted_traces() {
            let expected = roots
                .iter()
                .map(|&pos| reference_depth(&index, &index.record(pos).span_id, &mut Vec::new()))
                .max()
                .unwrap();
            assert_eq!(m.traces[trace_id].depth, expected, "trace {trace_id}");
        }
    }

    /// Every rung repeats its span id, so each span has two identical child
    /// links; the closing record under the last rung loops back to the root.
    fn ladder(rungs: usize) -> Vec<SpanRecord> {
        let mut records = vec![span("T", "L0", "")];
        for i in 1..=rungs {
            let id = format!("L{i}");
            let parent = format!("L{}", i - 1);
            records.push(span("T", &id, &parent));
            records.push(span("T", &id, &parent));
        }
        records.push(span("T", "L0", &format!("L{rungs}")));
        records
    }

    #[test]
    fn repeated_links_into_a_cycle_are_walked_once() {
        let m = metrics(&ladder(64));
        assert_eq!(m.traces["T"].depth, 65);
        assert_eq!(
            m.truncations,
            vec![CycleTruncation {
                trace_id: "T".to_string(),
                from_span: "L64".to_string(),
                to_span: "L0".to_string(),
            }]
        );
    }

    #[test]
    fn truncations_are_distinct_and_ordered() {
        let m = metrics(&[
            span("T", "r", ""),
            span("T", "b", "r"),
            span("T", "a", "r"),
            span("T", "r", "b"),
            span("T", "r", "a"),
            span("T", "r", "a"),
        ]);
        let cuts = m
            .truncations
            .iter()
            .map(|t| (t.from_span.as_str(), t.to_span.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(cuts, vec![("a", "r"), ("b", "r")]);
    }

    #[test]
    fn deep_chain_does_not_overflow() {
        let mut records = vec![span("T", "s0", "")];
        for i in 1..50_000 {
            records.push(span("T", &format!("s{i}"), &format!("s{}", i - 1)));
        }
        let m = metrics(&records);
        assert_eq!(m.traces["T"].depth, 50_000);
    }

    #[test]
    fn summary_reports_distribution_and_deepest() {
        let m = metrics(&[
            span("b", "b0", ""),
            span("b", "b1", "b0"),
            span("a", "a0", ""),
            span("a", "a1", "a0"),
            span("c", "c0", ""),
        ]);
        let summary = m.summary().unwrap();
        assert_eq!(summary.depth.min, 1);
        assert_eq!(summary.depth.max, 2);
        assert_eq!(summary.depth.median, 2);
        assert_eq!(summary.depth_distribution, vec![(1, 1), (2, 2)]);
        assert_eq!(summary.deepest_trace, "a");
    }

    #[test]
    fn empty_input_has_no_summary() {
        assert!(metrics(&[]).summary().is_none());
    }
}
