//! # Catalog Subcommand
//!
//! Summarizes the loaded catalog, or one kind's fields, under the active
//! edition context.

use anyhow::Result;
use clap::Args;
use serde_json::{json, Value};

use kindex_schema::{is_allowed, EditionContext, EditionTag, ResourceKind, SchemaCatalog};

use crate::{print_json, Engine};

/// Arguments for the catalog subcommand.
#[derive(Args, Debug)]
pub struct CatalogArgs {
    /// Describe the fields of one kind.
    #[arg(long)]
    pub kind: Option<String>,
}

/// Execute the catalog subcommand.
pub fn run_catalog(args: &CatalogArgs, engine: &Engine, as_json: bool) -> Result<u8> {
    let summary = match &args.kind {
        Some(kind) => describe_kind(engine.catalog.lookup(kind)?, &engine.context),
        None => summarize(&engine.catalog, &engine.context),
    };
    if as_json {
        print_json(&summary)?;
        return Ok(0);
    }

    if let Some(fields) = summary["fields"].as_array() {
        println!("{} ({})", summary["kind"].as_str().unwrap_or_default(), summary["available"]);
        for f in fields {
            println!(
                "  {:<28} {:<32} {}{}{}",
                f["name"].as_str().unwrap_or_default(),
                f["type"].as_str().unwrap_or_default(),
                if f["required"] == true { "required " } else { "" },
                if f["sensitive"] == true { "sensitive " } else { "" },
                if f["available"] == true { "" } else { "(not available)" },
            );
        }
    } else {
        println!("catalog {}", summary["fingerprint"].as_str().unwrap_or_default());
        for k in summary["kinds"].as_array().into_iter().flatten() {
            println!(
                "  {:<24} {:>3} field(s){}",
                k["kind"].as_str().unwrap_or_default(),
                k["fields"],
                if k["available"] == true { "" } else { "  (not available)" },
            );
        }
    }
    Ok(0)
}

/// Every kind with its field count and availability.
pub fn summarize(catalog: &SchemaCatalog, context: &EditionContext) -> Value {
    let kinds: Vec<Value> = catalog
        .kinds()
        .map(|k| {
            json!({
                "kind": k.name,
                "fields": k.fields.len(),
                "available": gate_open(context, k.editions.as_deref()),
            })
        })
        .collect();
    json!({
        "fingerprint": catalog.fingerprint().to_string(),
        "context": context.to_string(),
        "kinds": kinds,
    })
}

/// One kind's field declarations and their availability.
pub fn describe_kind(kind: &ResourceKind, context: &EditionContext) -> Value {
    let fields: Vec<Value> = kind
        .fields
        .iter()
        .map(|f| {
            let mut entry = json!({
                "name": f.name,
                "type": f.domain.describe(),
                "required": f.required,
                "sensitive": f.sensitive,
                "available": gate_open(context, f.editions.as_deref()),
            });
            if let Some(tags) = &f.editions {
                entry["editions"] = tags.iter().map(ToString::to_string).collect();
            }
            if let Some(default) = &f.default {
                entry["default"] = default.clone();
            }
            entry
        })
        .collect();
    json!({
        "kind": kind.name,
        "id_field": kind.id_field,
        "name_field": kind.name_field,
        "available": gate_open(context, kind.editions.as_deref()),
        "fields": fields,
    })
}

fn gate_open(context: &EditionContext, tags: Option<&[EditionTag]>) -> bool {
    tags.map_or(true, |tags| is_allowed(context, tags))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindex_core::ApiVersion;
    use kindex_schema::SourceFormat;

    const CATALOG: &str = r#"
kinds:
  - name: Pool
    fields:
      - { name: name, type: string, required: true }
      - { name: auth_password, type: string, sensitive: true }
      - { name: ramp, type: integer, editions: [enterprise], default: 10 }
  - name: Insight
    editions: [enterprise]
    fields:
      - { name: name, type: string }
"#;

    #[test]
    fn summary_marks_gated_kinds() {
        let catalog = SchemaCatalog::load_str(CATALOG, SourceFormat::Yaml).unwrap();
        let ctx = EditionContext::new(["essentials"], ApiVersion::new(22, 1, 1));
        let s = summarize(&catalog, &ctx);
        assert_eq!(s["fingerprint"], catalog.fingerprint().to_string());
        assert_eq!(s["kinds"][0]["kind"], "Insight");
        assert_eq!(s["kinds"][0]["available"], false);
        assert_eq!(s["kinds"][1]["fields"], 3);
        assert_eq!(s["kinds"][1]["available"], true);
    }

    #[test]
    fn kind_description_lists_fields() {
        let catalog = SchemaCatalog::load_str(CATALOG, SourceFormat::Yaml).unwrap();
        let ctx = EditionContext::new(["essentials"], ApiVersion::new(22, 1, 1));
        let d = describe_kind(catalog.lookup("Pool").unwrap(), &ctx);
        assert_eq!(d["fields"][0]["required"], true);
        assert_eq!(d["fields"][1]["sensitive"], true);
        assert_eq!(d["fields"][2]["available"], false);
        assert_eq!(d["fields"][2]["editions"], json!(["enterprise"]));
        assert_eq!(d["fields"][2]["default"], 10);
    }
}
