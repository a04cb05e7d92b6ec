use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::cycles::{ParentChainWalker, ParentCycle};
use crate::error::{Result, TraceCheckError};
use crate::graph::{CrossServiceGraphBuilder, ServiceCallEdge};
use crate::index::SpanIndex;
use crate::integrity::{CrossTraceParent, DuplicateGroup, IntegrityChecker, OrphanSpan};
use crate::metrics::{MetricsSummary, TraceMetrics, TreeMetricsEngine};
use crate::model::span::SpanRecord;
use crate::profile::{CorpusProfile, OrphanBreakdown};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    DuplicateSpanId,
    OrphanSpan,
    CrossTraceParent,
    MultiRootTrace,
    ZeroRootTrace,
    ParentCycle,
    CycleTruncation,
}

impl FindingKind {
    pub const ALL: [FindingKind; 7] = [
        Self::DuplicateSpanId,
        Self::OrphanSpan,
        Self::CrossTraceParent,
        Self::MultiRootTrace,
        Self::ZeroRootTrace,
        Self::ParentCycle,
        Self::CycleTruncation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DuplicateSpanId => "duplicate_span_id",
            Self::OrphanSpan => "orphan_span",
            Self::CrossTraceParent => "cross_trace_parent",
            Self::MultiRootTrace => "multi_root_trace",
            Self::ZeroRootTrace => "zero_root_trace",
            Self::ParentCycle => "parent_cycle",
            Self::CycleTruncation => "cycle_truncation",
        }
    }
}

impl FromStr for FindingKind {
    type Err = TraceCheckError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| TraceCheckError::Parse(format!("unknown finding kind: {s}")))
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Finding {
    pub kind: FindingKind,
    pub severity: Severity,
    pub subject: String,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisReport {
    pub profile: CorpusProfile,
    pub duplicates: Vec<DuplicateGroup>,
    pub orphans: Vec<OrphanSpan>,
    pub orphan_breakdown: OrphanBreakdown,
    pub cross_trace_parents: Vec<CrossTraceParent>,
    pub multi_root_traces: BTreeMap<String, usize>,
    pub zero_root_traces: Vec<String>,
    pub parent_cycles: Vec<ParentCycle>,
    pub metrics: TraceMetrics,
    pub metrics_summary: Option<MetricsSummary>,
    pub edges: Vec<ServiceCallEdge>,
    pub fail_on: Vec<FindingKind>,
}

/// Runs every analysis over one batch. Never fails: malformed input shows up
/// as findings, not errors.
pub fn analyze(records: &[SpanRecord], cfg: &Config) -> AnalysisReport {
    let index = SpanIndex::build(records);
    let checker = IntegrityChecker::new(&index);

    let duplicates = checker.find_duplicate_span_ids();
    let orphans = checker.find_orphans();
    let cross_trace_parents = if cfg.flag_cross_trace {
        checker.find_cross_trace_parents()
    } else {
        Vec::new()
    };
    let multi_root_traces = checker.find_multi_root_traces();
    let zero_root_traces = checker.find_zero_root_traces();
    let parent_cycles = ParentChainWalker::new(&index).find_cycles();
    let metrics = TreeMetricsEngine::new(&index).compute_metrics();
    let metrics_summary = metrics.summary();
    let edges = CrossServiceGraphBuilder::new(&index).build_edges();

    if !duplicates.is_empty() {
        tracing::warn!(count = duplicates.len(), "duplicate span ids");
    }
    if !orphans.is_empty() {
        tracing::warn!(count = orphans.len(), "orphaned spans");
    }
    if !multi_root_traces.is_empty() {
        tracing::warn!(count = multi_root_traces.len(), "traces with multiple roots");
    }
    if !zero_root_traces.is_empty() {
        tracing::warn!(count = zero_root_traces.len(), "traces without a root");
    }

    AnalysisReport {
        profile: CorpusProfile::build(&index),
        orphan_breakdown: OrphanBreakdown::from_orphans(&orphans),
        duplicates,
        orphans,
        cross_trace_parents,
        multi_root_traces,
        zero_root_traces,
        parent_cycles,
        metrics,
        metrics_summary,
        edges,
        fail_on: cfg.fail_on.clone(),
    }
}

impl AnalysisReport {
    /// Every defect as a flat list, grouped by kind in [`FindingKind::ALL`] order.
    pub fn findings(&self) -> Vec<Finding> {
        let warn = |kind, subject: &str, detail: String| Finding {
            kind,
            severity: Severity::Warning,
            subject: subject.to_string(),
            detail,
        };
        let mut out = Vec::new();

        for group in &self.duplicates {
            let traces = group
                .records
                .iter()
                .map(|r| r.trace_id.as_str())
                .collect::<Vec<_>>()
                .join(",");
            out.push(warn(
                FindingKind::DuplicateSpanId,
                &group.span_id,
                format!("{} records share this span id (traces: {traces})", group.records.len()),
            ));
        }
        for orphan in &self.orphans {
            out.push(warn(
                FindingKind::OrphanSpan,
                &orphan.span_id,
                format!(
                    "parent {} not found (trace {}, service {})",
                    orphan.parent_span_id, orphan.trace_id, orphan.service_name
                ),
            ));
        }
        for cross in &self.cross_trace_parents {
            out.push(warn(
                FindingKind::CrossTraceParent,
                &cross.span_id,
                format!(
                    "trace {} references parent {} recorded under trace {}",
                    cross.trace_id, cross.parent_span_id, cross.parent_trace_id
                ),
            ));
        }
        for (trace_id, roots) in &self.multi_root_traces {
            out.push(warn(
                FindingKind::MultiRootTrace,
                trace_id,
                format!("{roots} root spans"),
            ));
        }
        for trace_id in &self.zero_root_traces {
            out.push(warn(
                FindingKind::ZeroRootTrace,
                trace_id,
                "no span without a parent".to_string(),
            ));
        }
        for cycle in &self.parent_cycles {
            out.push(warn(
                FindingKind::ParentCycle,
                &cycle.trace_id,
                format!("parent chain loops: {}", cycle.span_ids.join(" -> ")),
            ));
        }
        for cut in &self.metrics.truncations {
            out.push(warn(
                FindingKind::CycleTruncation,
                &cut.trace_id,
                format!("depth walk cut at {} -> {}", cut.from_span, cut.to_span),
            ));
        }
        out
    }

    pub fn count(&self, kind: FindingKind) -> usize {
        match kind {
            FindingKind::DuplicateSpanId => self.duplicates.len(),
            FindingKind::OrphanSpan => self.orphans.len(),
            FindingKind::CrossTraceParent => self.cross_trace_parents.len(),
            FindingKind::MultiRootTrace => self.multi_root_traces.len(),
            FindingKind::ZeroRootTrace => self.zero_root_traces.len(),
            FindingKind::ParentCycle => self.parent_cycles.len(),
            FindingKind::CycleTruncation => self.metrics.truncations.len(),
        }
    }

    /// True when none of the gating finding kinds occurred.
    pub fn is_clean(&self) -> bool {
        self.fail_on.iter().all(|&kind| self.count(kind) == 0)
    }

    /// Child spans whose parent resolves somewhere in the corpus.
    pub fn resolved_children(&self) -> usize {
        self.profile.child_spans - self.orphans.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(trace: &str, id: &str, parent: &str, service: &str) -> SpanRecord {
        SpanRecord {
            trace_id: trace.to_string(),
            span_id: id.to_string(),
            parent_span_id: parent.to_string(),
            service_name: service.to_string(),
            ..SpanRecord::default()
        }
    }

    fn corrupt_corpus() -> Vec<SpanRecord> {
        vec![
            span("T1", "A", "", "web"),
            span("T1", "B", "A", "cart"),
            span("T1", "C", "B", "payment"),
            span("T2", "r1", "", "web"),
            span("T2", "r2", "", "web"),
            span("T3", "D", "zzz", "cart"),
            span("T4", "s1", "", "web"),
            span("T5", "s1", "", "web"),
            span("T6", "x", "y", "batch"),
            span("T6", "y", "x", "batch"),
            span("T7", "k", "A", "web"),
        ]
    }

    #[test]
    fn clean_chain_is_clean() {
        let records = vec![
            span("T1", "A", "", "web"),
            span("T1", "B", "A", "cart"),
            span("T1", "C", "B", "payment"),
        ];
        let report = analyze(&records, &Config::default());
        assert!(report.is_clean());
        assert!(report.findings().is_empty());
        assert_eq!(report.metrics.traces["T1"].depth, 3);
        assert_eq!(report.edges.len(), 2);
        assert_eq!(report.resolved_children(), 2);
    }

    #[test]
    fn every_defect_class_is_found() {
        let report = analyze(&corrupt_corpus(), &Config::default());
        assert_eq!(report.count(FindingKind::DuplicateSpanId), 1);
        assert_eq!(report.count(FindingKind::OrphanSpan), 1);
        assert_eq!(report.count(FindingKind::CrossTraceParent), 1);
        assert_eq!(report.count(FindingKind::MultiRootTrace), 1);
        assert_eq!(report.count(FindingKind::ZeroRootTrace), 3);
        assert_eq!(report.count(FindingKind::ParentCycle), 1);
        assert!(!report.is_clean());

        let kinds = report.findings().iter().map(|f| f.kind).collect::<Vec<_>>();
        let mut sorted = kinds.clone();
        sorted.sort();
        assert_eq!(kinds, sorted);
    }

    #[test]
    fn cross_trace_flag_can_be_disabled() {
        let cfg = Config {
            flag_cross_trace: false,
            ..Config::default()
        };
        let report = analyze(&corrupt_corpus(), &cfg);
        assert!(report.cross_trace_parents.is_empty());
    }

    #[test]
    fn gating_only_considers_configured_kinds() {
        let records = vec![span("T2", "r1", "", "web"), span("T2", "r2", "", "web")];
        let cfg = Config {
            fail_on: vec![FindingKind::OrphanSpan],
            ..Config::default()
        };
        let report = analyze(&records, &cfg);
        assert_eq!(report.count(FindingKind::MultiRootTrace), 1);
        assert!(report.is_clean());
    }

    #[test]
    fn repeated_analysis_is_identical() {
        let records = corrupt_corpus();
        let first = serde_json::to_string(&analyze(&records, &Config::default())).unwrap();
        let second = serde_json::to_string(&analyze(&records, &Config::default())).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn finding_kind_parses_dashes_and_case() {
        assert_eq!(
            FindingKind::from_str("Multi-Root-Trace").unwrap(),
            FindingKind::MultiRootTrace
        );
        assert!(FindingKind::from_str("nope").is_err());
    }
}
