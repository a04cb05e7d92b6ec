use std::collections::BTreeSet;
use std::fmt::Display;
use std::io::IsTerminal;
use std::path::PathBuf;

use owo_colors::OwoColorize;
use tracecheck_core::config::Config;
use tracecheck_core::graph::call_matrix;
use tracecheck_core::metrics::ValueSummary;
use tracecheck_core::model::span::SpanKind;
use tracecheck_core::tree::{TraceTree, TreeLine};
use tracecheck_core::{AnalysisReport, FindingKind, SpanIndex};
use tracecheck_ingest::LoadStats;

fn color() -> bool {
    std::io::stdout().is_terminal()
}

fn summary_line(label: &str, v: Option<&ValueSummary>) {
    match v {
        Some(v) => println!(
            "{label} min={} max={} mean={:.2} median={}",
            v.min, v.max, v.mean, v.median
        ),
        None => println!("{label} -"),
    }
}

fn pairs<K: Display>(items: &[(K, usize)]) -> String {
    if items.is_empty() {
        return "-".to_string();
    }
    items
        .iter()
        .map(|(k, n)| format!("{k}={n}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn kinds(items: &[(SpanKind, usize)]) -> String {
    pairs(
        &items
            .iter()
            .map(|(kind, n)| (kind.label(), *n))
            .collect::<Vec<_>>(),
    )
}

fn section(title: &str) {
    if color() {
        println!("== {} ==", title.bold());
    } else {
        println!("== {title} ==");
    }
}

fn more(total: usize, shown: usize) {
    if total > shown {
        println!("  ... and {} more", total - shown);
    }
}

pub fn print_report_human(report: &AnalysisReport, stats: &LoadStats, cfg: &Config) {
    let limit = cfg.max_examples;
    println!(
        "input files={} lines={} spans={} skipped_lines={}",
        stats.files, stats.lines, stats.spans, stats.skipped_lines
    );

    let p = &report.profile;
    section("profile");
    println!(
        "spans={} distinct_span_ids={} distinct_parent_ids={} roots={} children={} traces={}",
        p.total_spans,
        p.distinct_span_ids,
        p.distinct_parent_ids,
        p.root_spans,
        p.child_spans,
        p.traces
    );
    summary_line("spans_per_trace", p.spans_per_trace.as_ref());
    println!("span_count_histogram {}", pairs(&p.span_count_histogram));
    summary_line("services_per_trace", p.services_per_trace.as_ref());
    summary_line("roots_per_trace", p.roots_per_trace.as_ref());
    println!("spans_by_service {}", pairs(&p.spans_by_service));
    println!("roots_by_service {}", pairs(&p.roots_by_service));
    println!("roots_by_kind {}", kinds(&p.roots_by_kind));
    println!("children_by_kind {}", kinds(&p.children_by_kind));

    section("duplicate span ids");
    for group in report.duplicates.iter().take(limit) {
        println!("span_id={} records={}", group.span_id, group.records.len());
        for r in &group.records {
            println!(
                "  trace={} service={} name=\"{}\" parent={}",
                r.trace_id,
                r.service_name,
                r.span_name,
                if r.is_root() { "-" } else { &r.parent_span_id }
            );
        }
    }
    more(report.duplicates.len(), limit);
    println!("-- {} duplicate span ids --", report.duplicates.len());

    section("orphans");
    for o in report.orphans.iter().take(limit) {
        println!(
            "span={} parent={} trace={} service={} name=\"{}\" kind={}",
            o.span_id,
            o.parent_span_id,
            o.trace_id,
            o.service_name,
            o.span_name,
            o.span_kind.label()
        );
    }
    more(report.orphans.len(), limit);
    if !report.orphans.is_empty() {
        println!("orphans_by_service {}", pairs(&report.orphan_breakdown.by_service));
        println!("orphans_by_kind {}", kinds(&report.orphan_breakdown.by_kind));
    }
    println!(
        "-- {} orphaned spans ({} of {} child spans resolved) --",
        report.orphans.len(),
        report.resolved_children(),
        p.child_spans
    );

    if cfg.flag_cross_trace {
        section("cross-trace parents");
        for c in report.cross_trace_parents.iter().take(limit) {
            println!(
                "span={} trace={} parent={} parent_trace={}",
                c.span_id, c.trace_id, c.parent_span_id, c.parent_trace_id
            );
        }
        more(report.cross_trace_parents.len(), limit);
        println!("-- {} cross-trace parents --", report.cross_trace_parents.len());
    }

    section("multi-root traces");
    for (trace_id, roots) in report.multi_root_traces.iter().take(limit) {
        println!("trace={trace_id} roots={roots}");
    }
    more(report.multi_root_traces.len(), limit);
    println!("-- {} multi-root traces --", report.multi_root_traces.len());

    section("zero-root traces");
    for trace_id in report.zero_root_traces.iter().take(limit) {
        println!("trace={trace_id}");
    }
    more(report.zero_root_traces.len(), limit);
    println!("-- {} zero-root traces --", report.zero_root_traces.len());

    section("parent cycles");
    for cycle in report.parent_cycles.iter().take(limit) {
        println!("trace={} chain={}", cycle.trace_id, cycle.span_ids.join(" -> "));
    }
    more(report.parent_cycles.len(), limit);
    for cut in report.metrics.truncations.iter().take(limit) {
        println!(
            "truncated trace={} at {} -> {}",
            cut.trace_id, cut.from_span, cut.to_span
        );
    }
    more(report.metrics.truncations.len(), limit);
    println!(
        "-- {} parent cycles, {} walk truncations --",
        report.parent_cycles.len(),
        report.metrics.truncations.len()
    );

    section("depth and breadth");
    match &report.metrics_summary {
        Some(s) => {
            summary_line("depth", Some(&s.depth));
            summary_line("breadth", Some(&s.breadth));
            println!("depth_distribution {}", pairs(&s.depth_distribution));
            if let Some(shape) = report.metrics.traces.get(&s.deepest_trace) {
                println!(
                    "deepest_trace={} depth={} breadth={}",
                    s.deepest_trace, shape.depth, shape.breadth
                );
            }
        }
        None => println!("no rooted traces"),
    }
    println!(
        "-- {} traces measured, {} without roots excluded --",
        report.metrics.traces.len(),
        report.metrics.zero_root_traces.len()
    );

    section("service calls");
    for edge in report.edges.iter().take(cfg.top_edges) {
        println!(
            "{} -> {} count={}",
            edge.parent_service, edge.child_service, edge.count
        );
    }
    more(report.edges.len(), cfg.top_edges);
    print_matrix(report);
    println!("-- {} service edges --", report.edges.len());

    section("summary");
    let counts = FindingKind::ALL
        .iter()
        .map(|&kind| (kind, report.count(kind)))
        .collect::<Vec<_>>();
    println!("{}", pairs(&counts));
    let status = if report.is_clean() { "CLEAN" } else { "ISSUES" };
    match (color(), report.is_clean()) {
        (true, true) => println!("status={}", status.green()),
        (true, false) => println!("status={}", status.red()),
        _ => println!("status={status}"),
    }
}

fn print_matrix(report: &AnalysisReport) {
    let (services, matrix) = call_matrix(&report.edges);
    if services.is_empty() {
        return;
    }
    let width = services.iter().map(String::len).max().unwrap_or(0).max(6);
    print!("{:width$}", "parent\\child");
    for s in &services {
        print!(" {s:>width$}");
    }
    println!();
    for (service, row) in services.iter().zip(&matrix) {
        print!("{service:width$}");
        for n in row {
            print!(" {n:>width$}");
        }
        println!();
    }
}

fn connector_prefix(open: &[bool], line: &TreeLine<'_>) -> String {
    if line.depth == 0 {
        return String::new();
    }
    let mut prefix = String::new();
    for &last in open.iter().take(line.depth).skip(1) {
        prefix.push_str(if last { "   " } else { "│  " });
    }
    prefix.push_str(if line.is_last { "└─ " } else { "├─ " });
    prefix
}

fn tree_row(prefix: &str, line: &TreeLine<'_>, color: bool) -> String {
    let span = line.span;
    let kind = span.span_kind.label();
    let ms = span.duration_ms();
    let cycle = if line.cyclic { " (cycle)" } else { "" };
    if color {
        let status = if span.status == "OK" {
            span.status.green().to_string()
        } else {
            span.status.red().to_string()
        };
        format!(
            "{prefix}{} {} [{kind}] {ms}ms {status}{}",
            span.service_name.cyan(),
            span.span_name,
            cycle.yellow()
        )
    } else {
        format!(
            "{prefix}{} {} [{kind}] {ms}ms {}{cycle}",
            span.service_name, span.span_name, span.status
        )
    }
}

pub fn render_tree(lines: &[TreeLine<'_>], color: bool) -> Vec<String> {
    let mut open: Vec<bool> = Vec::new();
    let mut rows = Vec::with_capacity(lines.len());
    for line in lines {
        rows.push(tree_row(&connector_prefix(&open, line), line, color));
        open.truncate(line.depth);
        open.push(line.is_last);
    }
    rows
}

/// One trace ready for rendering. Counts cover every span recorded under the
/// trace, including spans the walk cannot reach from a root.
pub struct RenderedTrace<'a> {
    pub trace_id: String,
    pub spans: usize,
    pub services: usize,
    pub lines: Vec<TreeLine<'a>>,
}

impl<'a> RenderedTrace<'a> {
    pub fn build(index: &SpanIndex<'a>, trace_id: &str) -> Self {
        let positions = index.spans_of(trace_id);
        let services = positions
            .iter()
            .map(|&pos| index.record(pos).service_name.as_str())
            .collect::<BTreeSet<_>>()
            .len();
        Self {
            trace_id: trace_id.to_string(),
            spans: positions.len(),
            services,
            lines: TraceTree::new(index).walk(trace_id),
        }
    }

    pub fn has_root(&self) -> bool {
        !self.lines.is_empty()
    }
}

pub fn print_trees_human(trees: &[RenderedTrace<'_>]) {
    let color = color();
    for trace in trees {
        println!(
            "TRACE {} spans={} services={}",
            trace.trace_id, trace.spans, trace.services
        );
        if !trace.has_root() {
            println!("  no root span (incomplete trace)");
            continue;
        }
        for row in render_tree(&trace.lines, color) {
            println!("{row}");
        }
    }
    println!("-- {} traces --", trees.len());
}

pub fn tree_json(trees: &[RenderedTrace<'_>]) -> serde_json::Value {
    trees
        .iter()
        .map(|trace| {
            let lines = trace
                .lines
                .iter()
                .map(|l| {
                    serde_json::json!({
                        "depth": l.depth,
                        "span_id": l.span.span_id,
                        "parent_span_id": l.span.parent_span_id,
                        "service_name": l.span.service_name,
                        "span_name": l.span.span_name,
                        "span_kind": l.span.span_kind.label(),
                        "duration_ms": l.span.duration_ms(),
                        "status": l.span.status,
                        "cyclic": l.cyclic,
                    })
                })
                .collect::<Vec<_>>();
            serde_json::json!({
                "trace_id": trace.trace_id,
                "span_count": trace.spans,
                "service_count": trace.services,
                "has_root": trace.has_root(),
                "lines": lines,
            })
        })
        .collect()
}

pub fn print_convert_human(written: &[(PathBuf, usize)]) {
    for (path, spans) in written {
        println!("wrote {} spans={spans}", path.display());
    }
    println!("-- {} files --", written.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_connectors_follow_sibling_order() {
        let records = vec![
            testkit::span("t", "a", "", "web"),
            testkit::span("t", "b", "a", "cart"),
            testkit::span("t", "c", "b", "db"),
            testkit::span("t", "d", "a", "payment"),
        ];
        let index = SpanIndex::build(&records);
        let lines = TraceTree::new(&index).walk("t");
        let rows = render_tree(&lines, false);
        assert_eq!(
            rows,
            vec![
                "web web op [SERVER] 40ms OK",
                "├─ cart cart op [CLIENT] 40ms OK",
                "│  └─ db db op [CLIENT] 40ms OK",
                "└─ payment payment op [CLIENT] 40ms OK",
            ]
        );
    }

    #[test]
    fn cyclic_rows_are_marked() {
        let records = vec![
            testkit::span("t", "r", "", "web"),
            testkit::span("t", "x", "r", "a"),
            testkit::span("t", "x", "x", "b"),
        ];
        let index = SpanIndex::build(&records);
        let lines = TraceTree::new(&index).walk("t");
        let rows = render_tree(&lines, false);
        assert!(rows.iter().any(|r| r.ends_with("(cycle)")), "{rows:?}");
    }

    #[test]
    fn rootless_trace_counts_all_of_its_spans() {
        let records = vec![
            testkit::span("T1", "a", "", "web"),
            testkit::span("T3", "d", "gone", "cart"),
            testkit::span("T3", "e", "d", "payment"),
        ];
        let index = SpanIndex::build(&records);
        let trace = RenderedTrace::build(&index, "T3");
        assert_eq!(trace.spans, 2);
        assert_eq!(trace.services, 2);
        assert!(!trace.has_root());

        let json = tree_json(&[trace]);
        assert_eq!(json[0]["span_count"], 2);
        assert_eq!(json[0]["has_root"], false);
        assert!(json[0]["lines"].as_array().unwrap().is_empty());
    }

    #[test]
    fn pairs_render_dash_when_empty() {
        let empty: Vec<(String, usize)> = Vec::new();
        assert_eq!(pairs(&empty), "-");
        assert_eq!(pairs(&[("web".to_string(), 2)]), "web=2");
    }
}
