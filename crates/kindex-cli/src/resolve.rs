//! # Resolve Subcommand
//!
//! Builds one snapshot from several payload files and checks that every
//! reference in it lands on exactly one instance of a permitted kind.
//!
//! Inputs are `KIND=PATH` pairs. A file holds a payload object, an array
//! of payloads, or a collection envelope (`{"count", "results", "next"}`).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::{json, Value};

use kindex_collection::{CollectionCodec, PageElement};
use kindex_graph::{apply_order, ApplyOrder, ConfigGraph, ConfigGraphBuilder, ReferenceResolver, Resolution};
use kindex_schema::ValidationReport;

use crate::{print_json, read_document, Engine};

/// Arguments for the resolve subcommand.
#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Inputs as KIND=PATH.
    #[arg(required = true, value_parser = parse_input)]
    pub inputs: Vec<(String, PathBuf)>,

    /// Also print the creation order of the snapshot.
    #[arg(long)]
    pub order: bool,
}

/// What a resolve run found.
#[derive(Debug)]
pub struct ResolveOutcome {
    pub graph: ConfigGraph,
    /// Reports of payloads with violations.
    pub invalid: Vec<ValidationReport>,
    pub resolution: Resolution,
}

impl ResolveOutcome {
    pub fn is_clean(&self) -> bool {
        self.invalid.is_empty() && self.resolution.is_complete()
    }
}

/// Execute the resolve subcommand.
pub fn run_resolve(args: &ResolveArgs, engine: &Engine, as_json: bool) -> Result<u8> {
    let outcome = resolve_inputs(engine, &args.inputs)?;
    let order = args.order.then(|| apply_order(&outcome.graph, &outcome.resolution));

    if as_json {
        print_json(&outcome_json(&outcome, order.as_ref()))?;
    } else {
        print_outcome(&outcome, order.as_ref());
    }
    Ok(u8::from(!outcome.is_clean()))
}

/// Load every input into one snapshot and resolve it.
pub fn resolve_inputs(engine: &Engine, inputs: &[(String, PathBuf)]) -> Result<ResolveOutcome> {
    let codec = CollectionCodec::new(engine.validator(), engine.context.clone());
    let mut builder = ConfigGraphBuilder::new();
    let mut invalid = Vec::new();

    for (kind, path) in inputs {
        engine.catalog.lookup(kind)?;
        let document = read_document(path)?;
        let reports: Vec<ValidationReport> = if is_envelope(&document) {
            codec
                .decode_value(kind, &document)
                .with_context(|| format!("{} is not a valid collection page", path.display()))?
                .into_elements()
                .into_iter()
                .map(PageElement::into_report)
                .collect()
        } else {
            let payloads = match document {
                Value::Array(items) => items,
                single => vec![single],
            };
            payloads
                .iter()
                .map(|p| codec.validator().validate(kind, p, codec.context()))
                .collect()
        };

        for report in reports {
            if !report.is_valid() {
                invalid.push(report.clone());
            }
            if let Some(instance) = report.into_instance() {
                if let Some(previous) = builder.insert(instance) {
                    tracing::warn!(key = %previous.key(), "duplicate instance, keeping the last one");
                }
            }
        }
    }

    let graph = builder.build();
    let resolution = ReferenceResolver::new(engine.catalog.clone()).resolve(&graph);
    Ok(ResolveOutcome {
        graph,
        invalid,
        resolution,
    })
}

fn is_envelope(document: &Value) -> bool {
    document.get("results").is_some_and(Value::is_array) && document.get("count").is_some()
}

fn parse_input(raw: &str) -> Result<(String, PathBuf), String> {
    match raw.split_once('=') {
        Some((kind, path)) if !kind.is_empty() && !path.is_empty() => {
            Ok((kind.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected KIND=PATH, got '{raw}'")),
    }
}

fn outcome_json(outcome: &ResolveOutcome, order: Option<&ApplyOrder>) -> Value {
    let invalid: Vec<Value> = outcome
        .invalid
        .iter()
        .map(|r| {
            json!({
                "kind": r.kind(),
                "id": r.instance().map(|i| i.id().to_string()),
                "violations": r.violations(),
            })
        })
        .collect();
    let mut out = json!({
        "instances": outcome.graph.len(),
        "digest": outcome.graph.digest().ok().map(|d| d.to_string()),
        "edges": outcome.resolution.edges(),
        "violations": outcome.resolution.violations(),
        "invalid": invalid,
    });
    if let Some(order) = order {
        out["order"] = json!(order);
    }
    out
}

fn print_outcome(outcome: &ResolveOutcome, order: Option<&ApplyOrder>) {
    println!(
        "{} instance(s), {} reference(s) resolved",
        outcome.graph.len(),
        outcome.resolution.edges().len()
    );
    for report in &outcome.invalid {
        println!("invalid: {report}");
    }
    for violation in outcome.resolution.violations() {
        println!("unresolved: {violation}");
    }
    if let Some(order) = order {
        println!("apply order:");
        for (step, key) in order.order.iter().enumerate() {
            println!("  {:>4}. {key}", step + 1);
        }
        for key in &order.cyclic {
            println!("  cycle: {key}");
        }
    }
}
