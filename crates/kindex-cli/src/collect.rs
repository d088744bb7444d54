//! # Collect Subcommand
//!
//! Fetches every page of a collection from a snapshot directory and
//! reports the elements that failed validation. With `--output`, the
//! instances are written back as a single page.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::{json, Value};

use kindex_collection::{
    fetch_all, Collection, CollectionCodec, FileTransport, RetryPolicy, RetryingTransport,
};

use crate::{print_json, Engine};

/// Arguments for the collect subcommand.
#[derive(Args, Debug)]
pub struct CollectArgs {
    /// Kind of the collection.
    #[arg(long)]
    pub kind: String,

    /// Directory holding the captured pages; the first page is `<KIND>.json`.
    #[arg(long)]
    pub dir: PathBuf,

    /// Retries per page for transient read failures.
    #[arg(long, default_value_t = 3)]
    pub retries: u32,

    /// Write all fetched instances as one page to this file.
    #[arg(long)]
    pub output: Option<PathBuf>,
}

/// Execute the collect subcommand.
pub fn run_collect(args: &CollectArgs, engine: &Engine, as_json: bool) -> Result<u8> {
    let codec = CollectionCodec::new(engine.validator(), engine.context.clone());
    let collection = collect(args, engine, &codec)?;

    if let Some(output) = &args.output {
        let bytes = codec.encode_instances(
            collection.kind(),
            collection.instances().count() as u64,
            None,
            collection.instances(),
        )?;
        std::fs::write(output, bytes)
            .with_context(|| format!("failed to write {}", output.display()))?;
    }

    let invalid = collection.invalid().count();
    if as_json {
        print_json(&summary_json(engine, &collection))?;
    } else {
        println!(
            "{}: {} element(s), count {}",
            collection.kind(),
            collection.elements().len(),
            collection.count()
        );
        for element in collection.invalid() {
            println!("invalid: {}", element.report());
        }
    }
    Ok(u8::from(invalid > 0))
}

/// Fetch the collection named by `args`.
pub fn collect(args: &CollectArgs, engine: &Engine, codec: &CollectionCodec) -> Result<Collection> {
    let kind = engine.catalog.lookup(&args.kind)?.name.clone();
    let retry = RetryPolicy {
        max_retries: args.retries,
        ..RetryPolicy::default()
    };
    let mut transport = RetryingTransport::new(FileTransport::new(&args.dir), retry);
    let collection = fetch_all(&mut transport, codec, &kind, engine.config.max_pages)
        .with_context(|| format!("failed to fetch {kind} from {}", args.dir.display()))?;
    Ok(collection)
}

fn summary_json(engine: &Engine, collection: &Collection) -> Value {
    let invalid: Vec<Value> = collection
        .invalid()
        .map(|e| {
            json!({
                "id": e.instance().map(|i| i.id().to_string()),
                "violations": e.report().violations(),
            })
        })
        .collect();
    let instances: Vec<Value> = collection
        .instances()
        .map(|i| engine.catalog.redact(i))
        .collect();
    json!({
        "kind": collection.kind(),
        "count": collection.count(),
        "elements": collection.elements().len(),
        "invalid": invalid,
        "instances": instances,
    })
}
