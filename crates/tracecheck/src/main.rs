mod output;
mod telemetry;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracecheck_core::config::Config;
use tracecheck_core::filter::{AttrFilter, SpanFilter};
use tracecheck_core::tree::TraceTree;
use tracecheck_core::{AnalysisReport, Finding, SpanIndex, SpanRecord, analyze};
use tracecheck_ingest::sink::{write_partitioned, write_spans_jsonl};
use tracecheck_ingest::{InputFormat, LoadStats, load_inputs};

use crate::output::{
    RenderedTrace, print_convert_human, print_report_human, print_trees_human, tree_json,
};
use crate::telemetry::init_cli_tracing;

#[derive(Parser, Debug)]
#[command(name = "tracecheck")]
#[command(about = "Structural integrity checks for distributed trace corpora")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    json: bool,

    #[arg(
        long,
        global = true,
        default_value = "auto",
        help = "Input decoding: auto, otlp-json, otlp-proto or spans"
    )]
    format: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Run every integrity check and print the report")]
    Analyze {
        #[arg(required = true, help = "Files or glob patterns")]
        inputs: Vec<String>,
        #[arg(long = "where", help = "Attribute filter key=glob (repeatable)")]
        where_filters: Vec<String>,
        #[arg(long)]
        service: Option<String>,
        #[arg(long, help = "Exit with code 2 when gating findings are present")]
        strict: bool,
        #[arg(long, help = "Do not report parents recorded under another trace")]
        no_cross_trace: bool,
        #[arg(long)]
        max_examples: Option<usize>,
        #[arg(long)]
        top_edges: Option<usize>,
    },
    #[command(about = "Print span trees for selected traces")]
    Tree {
        #[arg(required = true)]
        inputs: Vec<String>,
        #[arg(long)]
        trace: Option<String>,
        #[arg(long, help = "Number of example traces when --trace is not given")]
        examples: Option<usize>,
        #[arg(long = "where")]
        where_filters: Vec<String>,
        #[arg(long)]
        service: Option<String>,
    },
    #[command(about = "Rewrite inputs as flat span JSONL")]
    Convert {
        #[arg(required = true)]
        inputs: Vec<String>,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, help = "Write one file per value of this attribute")]
        split_by: Option<String>,
        #[arg(long, help = "Keep only spans of this trace")]
        trace: Option<String>,
        #[arg(long = "where")]
        where_filters: Vec<String>,
        #[arg(long)]
        service: Option<String>,
    },
}

#[derive(Serialize)]
struct AnalyzeOutput<'a> {
    input: &'a LoadStats,
    clean: bool,
    findings: Vec<Finding>,
    report: &'a AnalysisReport,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_cli_tracing();
    let format = InputFormat::from_str(&cli.format)?;

    match cli.command {
        Commands::Analyze {
            inputs,
            where_filters,
            service,
            strict,
            no_cross_trace,
            max_examples,
            top_edges,
        } => {
            let mut cfg = Config::load().context("load config")?;
            if no_cross_trace {
                cfg.flag_cross_trace = false;
            }
            if let Some(n) = max_examples {
                cfg.max_examples = n;
            }
            if let Some(n) = top_edges {
                cfg.top_edges = n;
            }

            let filter = build_filter(service, None, where_filters)?;
            let (records, stats) = load_corpus(&inputs, format, &filter)?;
            let report = analyze(&records, &cfg);

            if cli.json {
                let out = AnalyzeOutput {
                    input: &stats,
                    clean: report.is_clean(),
                    findings: report.findings(),
                    report: &report,
                };
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                print_report_human(&report, &stats, &cfg);
            }

            if strict && !report.is_clean() {
                tracing::info!("gating findings present");
                return Ok(ExitCode::from(2));
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Tree {
            inputs,
            trace,
            examples,
            where_filters,
            service,
        } => {
            let cfg = Config::load().context("load config")?;
            let selector = build_filter(service, None, where_filters)?;
            let (records, _) = load_corpus(&inputs, format, &SpanFilter::default())?;

            let index = SpanIndex::build(&records);
            let tree = TraceTree::new(&index);
            let trace_ids = match trace {
                Some(trace_id) => {
                    if index.spans_of(&trace_id).is_empty() {
                        anyhow::bail!("trace {trace_id} not found in inputs");
                    }
                    vec![trace_id]
                }
                None => {
                    let candidates = selected_traces(&records, &selector);
                    tree.pick_examples(examples.unwrap_or(cfg.tree_examples), candidates.as_ref())
                }
            };

            let trees = trace_ids
                .iter()
                .map(|trace_id| RenderedTrace::build(&index, trace_id))
                .collect::<Vec<_>>();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&tree_json(&trees))?);
            } else {
                print_trees_human(&trees);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Convert {
            inputs,
            output,
            split_by,
            trace,
            where_filters,
            service,
        } => {
            let filter = build_filter(service, trace, where_filters)?;
            let (records, _) = load_corpus(&inputs, format, &filter)?;

            let written = match split_by {
                Some(attr) => write_partitioned(&output, &records, &attr)
                    .with_context(|| format!("write partitions of {}", output.display()))?,
                None => {
                    write_spans_jsonl(&output, &records)
                        .with_context(|| format!("write {}", output.display()))?;
                    vec![(output, records.len())]
                }
            };

            if cli.json {
                let files = written
                    .iter()
                    .map(|(path, spans)| serde_json::json!({"path": path, "spans": spans}))
                    .collect::<Vec<_>>();
                println!("{}", serde_json::to_string_pretty(&files)?);
            } else {
                print_convert_human(&written);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn build_filter(
    service: Option<String>,
    trace_id: Option<String>,
    where_filters: Vec<String>,
) -> anyhow::Result<SpanFilter> {
    Ok(SpanFilter {
        service,
        trace_id,
        attr_filters: where_filters
            .iter()
            .map(|f| AttrFilter::parse(f))
            .collect::<tracecheck_core::Result<Vec<_>>>()?,
    })
}

fn load_corpus(
    inputs: &[String],
    format: InputFormat,
    filter: &SpanFilter,
) -> anyhow::Result<(Vec<SpanRecord>, LoadStats)> {
    let (records, stats) = load_inputs(inputs, format).context("load inputs")?;
    Ok((filter.apply(records), stats))
}

/// Traces containing at least one span the selector accepts; `None` when the
/// selector is empty so every trace is eligible.
fn selected_traces(records: &[SpanRecord], selector: &SpanFilter) -> Option<BTreeSet<String>> {
    if selector.is_empty() {
        return None;
    }
    Some(
        records
            .iter()
            .filter(|r| selector.matches(r))
            .map(|r| r.trace_id.clone())
            .collect(),
    )
}
