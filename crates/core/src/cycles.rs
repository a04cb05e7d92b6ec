use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::index::SpanIndex;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParentCycle {
    pub trace_id: String,
    pub span_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    OnPath,
    Done,
}

/// Follows parent pointers upward from every span.
///
/// Each span id resolves to its first-seen record, so the parent relation is
/// a function over ids and every chain is walked at most once overall.
pub struct ParentChainWalker<'i, 'a> {
    index: &'i SpanIndex<'a>,
}

impl<'i, 'a> ParentChainWalker<'i, 'a> {
    pub fn new(index: &'i SpanIndex<'a>) -> Self {
        Self { index }
    }

    fn parent_of(&self, span_id: &str) -> Option<&'a str> {
        let record = self.index.get(span_id)?;
        if record.is_root() || !self.index.contains(&record.parent_span_id) {
            return None;
        }
        Some(record.parent_span_id.as_str())
    }

    /// Every distinct cycle, listed from the first member the walk reached.
    pub fn find_cycles(&self) -> Vec<ParentCycle> {
        let mut marks: HashMap<&'a str, Mark> = HashMap::new();
        let mut cycles = Vec::new();

        for record in self.index.records() {
            let start = record.span_id.as_str();
            if marks.contains_key(start) {
                continue;
            }

            let mut path: Vec<&'a str> = Vec::new();
            let mut current = start;
            loop {
                match marks.get(current).copied() {
                    Some(Mark::Done) => break,
                    Some(Mark::OnPath) => {
                        if let Some(at) = path.iter().position(|id| *id == current) {
                            let trace_id = self
                                .index
                                .get(current)
                                .map(|r| r.trace_id.clone())
                                .unwrap_or_default();
                            cycles.push(ParentCycle {
                                trace_id,
                                span_ids: path[at..].iter().map(|id| id.to_string()).collect(),
                            });
                        }
                        break;
                    }
                    None => {
                        marks.insert(current, Mark::OnPath);
                        path.push(current);
                        match self.parent_of(current) {
                            Some(parent) => current = parent,
                            None => break,
                        }
                    }
                }
            }

            for id in path {
                marks.insert(id, Mark::Done);
            }
        }

        if !cycles.is_empty() {
            tracing::warn!(count = cycles.len(), "parent chains contain cycles");
        }
        cycles
    }
}
