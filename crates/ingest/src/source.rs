use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use flate2::read::GzDecoder;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use prost::Message;
use serde::Serialize;
use tracecheck_core::error::{Result, TraceCheckError};
use tracecheck_core::model::span::SpanRecord;

use crate::otlp::decode::decode_request;
use crate::otlp::json::{decode_line, is_otlp_json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputFormat {
    /// By extension for protobuf, otherwise sniffed per line.
    #[default]
    Auto,
    OtlpJson,
    OtlpProto,
    Spans,
}

impl FromStr for InputFormat {
    type Err = TraceCheckError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "otlp-json" | "otlp_json" | "json" => Ok(Self::OtlpJson),
            "otlp-proto" | "otlp_proto" | "proto" | "protobuf" => Ok(Self::OtlpProto),
            "spans" | "jsonl" => Ok(Self::Spans),
            _ => Err(TraceCheckError::Parse(format!("unknown input format: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct LoadStats {
    pub files: usize,
    pub lines: usize,
    pub spans: usize,
    pub skipped_lines: usize,
}

/// Expands each pattern (a literal path or a glob) into files. Glob matches
/// are taken in sorted order so the resulting span order is reproducible.
pub fn expand_inputs(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for pattern in patterns {
        let literal = Path::new(pattern);
        if literal.is_file() {
            out.push(literal.to_path_buf());
            continue;
        }

        let mut matched = glob::glob(pattern)
            .map_err(|e| TraceCheckError::InvalidArgument(format!("bad input pattern {pattern}: {e}")))?
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(e) => {
                    tracing::warn!(error = %e, "unreadable glob match");
                    None
                }
            })
            .filter(|path| path.is_file())
            .collect::<Vec<_>>();
        if matched.is_empty() {
            return Err(TraceCheckError::InvalidArgument(format!(
                "no input files match {pattern}"
            )));
        }
        matched.sort();
        out.append(&mut matched);
    }
    Ok(out)
}

/// Loads every input in order. Undecodable lines are skipped and counted;
/// unreadable files and undecodable protobuf payloads are errors.
pub fn load_inputs(patterns: &[String], format: InputFormat) -> Result<(Vec<SpanRecord>, LoadStats)> {
    let mut spans = Vec::new();
    let mut stats = LoadStats::default();
    for path in expand_inputs(patterns)? {
        load_file(&path, format, &mut spans, &mut stats)?;
    }
    stats.spans = spans.len();
    tracing::info!(
        files = stats.files,
        spans = stats.spans,
        skipped = stats.skipped_lines,
        "inputs loaded"
    );
    Ok((spans, stats))
}

fn open(path: &Path) -> Result<Box<dyn Read>> {
    let file = File::open(path)
        .map_err(|e| TraceCheckError::Io(format!("failed opening {}: {e}", path.display())))?;
    if is_gzip(path) {
        Ok(Box::new(GzDecoder::new(file)))
    } else {
        Ok(Box::new(file))
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

fn inner_extension(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let name = name.strip_suffix(".gz").unwrap_or(name);
    let (_, ext) = name.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

fn resolve_format(path: &Path, format: InputFormat) -> InputFormat {
    if format != InputFormat::Auto {
        return format;
    }
    match inner_extension(path).as_deref() {
        Some("pb" | "binpb" | "bin") => InputFormat::OtlpProto,
        _ => InputFormat::Auto,
    }
}

fn load_file(
    path: &Path,
    format: InputFormat,
    spans: &mut Vec<SpanRecord>,
    stats: &mut LoadStats,
) -> Result<()> {
    stats.files += 1;
    let before = spans.len();
    let mut reader = open(path)?;

    if resolve_format(path, format) == InputFormat::OtlpProto {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| TraceCheckError::Io(format!("failed reading {}: {e}", path.display())))?;
        let req = ExportTraceServiceRequest::decode(bytes.as_slice()).map_err(|e| {
            TraceCheckError::Parse(format!("invalid OTLP protobuf in {}: {e}", path.display()))
        })?;
        spans.extend(decode_request(&req));
        tracing::debug!(path = %path.display(), spans = spans.len() - before, "protobuf file decoded");
        return Ok(());
    }

    for (line_no, line) in BufReader::new(reader).lines().enumerate() {
        let line = line
            .map_err(|e| TraceCheckError::Io(format!("failed reading {}: {e}", path.display())))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        stats.lines += 1;

        match decode_json_line(trimmed, format) {
            Ok(mut decoded) => spans.append(&mut decoded),
            Err(e) => {
                stats.skipped_lines += 1;
                tracing::warn!(
                    path = %path.display(),
                    line = line_no + 1,
                    error = %e,
                    "skipping undecodable line"
                );
            }
        }
    }
    tracing::debug!(path = %path.display(), spans = spans.len() - before, "file decoded");
    Ok(())
}

fn decode_json_line(line: &str, format: InputFormat) -> Result<Vec<SpanRecord>> {
    let otlp = match format {
        InputFormat::OtlpJson => true,
        InputFormat::Spans => false,
        _ => is_otlp_json(line),
    };
    if otlp {
        return decode_line(line);
    }
    serde_json::from_str::<SpanRecord>(line)
        .map(|span| vec![span])
        .map_err(|e| TraceCheckError::Parse(format!("invalid span record: {e}")))
}
