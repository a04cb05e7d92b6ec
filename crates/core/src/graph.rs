use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::index::SpanIndex;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceCallEdge {
    pub parent_service: String,
    pub child_service: String,
    pub count: usize,
}

/// Derives the inter-service call graph from resolvable parent links.
pub struct CrossServiceGraphBuilder<'i, 'a> {
    index: &'i SpanIndex<'a>,
}

impl<'i, 'a> CrossServiceGraphBuilder<'i, 'a> {
    pub fn new(index: &'i SpanIndex<'a>) -> Self {
        Self { index }
    }

    /// Edges where the services differ, by descending count, then parent, then child.
    pub fn build_edges(&self) -> Vec<ServiceCallEdge> {
        let mut counts: HashMap<(&'a str, &'a str), usize> = HashMap::new();
        let mut cross_calls = 0usize;

        for child in self.index.records() {
            if child.is_root() {
                continue;
            }
            let Some(parent) = self.index.get(&child.parent_span_id) else {
                continue;
            };
            if parent.service_name != child.service_name {
                *counts
                    .entry((parent.service_name.as_str(), child.service_name.as_str()))
                    .or_default() += 1;
                cross_calls += 1;
            }
        }

        let mut edges = counts
            .into_iter()
            .map(|((parent, child), count)| ServiceCallEdge {
                parent_service: parent.to_string(),
                child_service: child.to_string(),
                count,
            })
            .collect::<Vec<_>>();
        edges.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.parent_service.cmp(&b.parent_service))
                .then_with(|| a.child_service.cmp(&b.child_service))
        });

        tracing::debug!(edges = edges.len(), cross_calls, "service call graph built");
        edges
    }
}

/// Square call matrix over every service that appears in `edges`, sorted by name.
pub fn call_matrix(edges: &[ServiceCallEdge]) -> (Vec<String>, Vec<Vec<usize>>) {
    let mut services = edges
        .iter()
        .flat_map(|e| [e.parent_service.clone(), e.child_service.clone()])
        .collect::<Vec<_>>();
    services.sort();
    services.dedup();

    let position = services
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect::<HashMap<_, _>>();
    let mut matrix = vec![vec![0usize; services.len()]; services.len()];
    for edge in edges {
        let row = position[edge.parent_service.as_str()];
        let col = position[edge.child_service.as_str()];
        matrix[row][col] += edge.count;
    }
    (services, matrix)
}
