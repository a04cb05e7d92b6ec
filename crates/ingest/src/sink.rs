use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use tracecheck_core::error::{Result, TraceCheckError};
use tracecheck_core::model::span::SpanRecord;

fn io_err(path: &Path, e: impl std::fmt::Display) -> TraceCheckError {
    TraceCheckError::Io(format!("failed writing {}: {e}", path.display()))
}

/// Writes one serialized record per line; a `.gz` suffix compresses the output.
pub fn write_spans_jsonl(path: &Path, records: &[SpanRecord]) -> Result<()> {
    let file = BufWriter::new(File::create(path).map_err(|e| io_err(path, e))?);
    if path.extension().is_some_and(|ext| ext == "gz") {
        let mut encoder = GzEncoder::new(file, Compression::default());
        write_lines(&mut encoder, records).map_err(|e| io_err(path, e))?;
        encoder
            .finish()
            .and_then(|mut inner| inner.flush())
            .map_err(|e| io_err(path, e))?;
    } else {
        let mut out = file;
        write_lines(&mut out, records).map_err(|e| io_err(path, e))?;
        out.flush().map_err(|e| io_err(path, e))?;
    }
    tracing::debug!(path = %path.display(), spans = records.len(), "span file written");
    Ok(())
}

fn write_lines<W: Write>(out: &mut W, records: &[SpanRecord]) -> std::io::Result<()> {
    for record in records {
        serde_json::to_writer(&mut *out, record)?;
        out.write_all(b"\n")?;
    }
    Ok(())
}

/// Splits records by the value of `attr` (missing values go to `none`) and
/// writes one `<stem>.<value>.jsonl` file per value next to `path`.
pub fn write_partitioned(path: &Path, records: &[SpanRecord], attr: &str) -> Result<Vec<(PathBuf, usize)>> {
    let mut groups: BTreeMap<String, Vec<SpanRecord>> = BTreeMap::new();
    for record in records {
        let value = record.attr(attr).unwrap_or("none");
        groups
            .entry(sanitize(value))
            .or_default()
            .push(record.clone());
    }

    let stem = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.strip_suffix(".gz").unwrap_or(n))
        .map(|n| n.strip_suffix(".jsonl").unwrap_or(n))
        .unwrap_or("spans")
        .to_string();
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    let mut written = Vec::with_capacity(groups.len());
    for (value, group) in groups {
        let target = dir.join(format!("{stem}.{value}.jsonl"));
        write_spans_jsonl(&target, &group)?;
        written.push((target, group.len()));
    }
    Ok(written)
}

fn sanitize(value: &str) -> String {
    let cleaned = value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect::<String>();
    if cleaned.is_empty() {
        "none".to_string()
    } else {
        cleaned
    }
}
