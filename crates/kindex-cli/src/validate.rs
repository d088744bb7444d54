//! # Validate Subcommand
//!
//! Validates payload files as one kind. A file holds either a single
//! payload object or an array of payloads.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;
use serde_json::{json, Value};

use kindex_schema::ValidationReport;

use crate::{print_json, read_document, Engine};

/// Arguments for the validate subcommand.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Kind every payload is validated as.
    #[arg(long)]
    pub kind: String,

    /// Payload files (JSON, or YAML by extension).
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

/// Execute the validate subcommand.
pub fn run_validate(args: &ValidateArgs, engine: &Engine, as_json: bool) -> Result<u8> {
    engine.catalog.lookup(&args.kind)?;

    let mut failed = 0usize;
    let mut entries = Vec::new();
    for file in &args.files {
        for (index, report) in validate_file(engine, &args.kind, file)?.iter().enumerate() {
            if !report.is_valid() {
                failed += 1;
            }
            if as_json {
                entries.push(report_json(engine, file, index, report));
            } else {
                print_report(file, index, report);
            }
        }
    }

    if as_json {
        print_json(&Value::Array(entries))?;
    } else if failed == 0 {
        println!("OK: all {} payload(s) are valid", args.kind);
    } else {
        println!("FAIL: {failed} {} payload(s) have violations", args.kind);
    }
    Ok(u8::from(failed > 0))
}

/// Validate every payload in `path` as `kind`.
pub fn validate_file(engine: &Engine, kind: &str, path: &Path) -> Result<Vec<ValidationReport>> {
    let validator = engine.validator();
    let payloads = match read_document(path)? {
        Value::Array(items) => items,
        single => vec![single],
    };
    tracing::debug!(path = %path.display(), kind, payloads = payloads.len(), "validating file");
    Ok(payloads
        .iter()
        .map(|p| validator.validate(kind, p, &engine.context))
        .collect())
}

/// JSON form of one report. The instance is redacted.
pub fn report_json(engine: &Engine, file: &Path, index: usize, report: &ValidationReport) -> Value {
    json!({
        "file": file.display().to_string(),
        "index": index,
        "kind": report.kind(),
        "valid": report.is_valid(),
        "violations": report.violations(),
        "notes": report.notes(),
        "instance": report.instance().map(|i| engine.catalog.redact(i)),
    })
}

fn print_report(file: &Path, index: usize, report: &ValidationReport) {
    let label = match report.instance() {
        Some(instance) => format!("{}[{index}] {}", file.display(), instance.key()),
        None => format!("{}[{index}]", file.display()),
    };
    if report.is_valid() {
        println!("ok    {label}");
    } else {
        println!("FAIL  {label}");
        for v in report.violations() {
            println!("        {v}");
        }
    }
    for note in report.notes() {
        println!("        note: {}: unknown field", note.path);
    }
}
