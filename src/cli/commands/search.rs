//! Semantic search command.

use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use serde::Serialize;

use crate::application::AppContext;
use crate::cli::output::{list_table, output, render_list, truncate, CommandOutput};
use crate::domain::models::{fields, FieldValue, FilterExpr, SearchHit, DOCUMENTS};
use crate::services::{IterateQuery, SearchQuery};

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Query text
    pub text: String,

    #[arg(short = 'C', long, default_value = DOCUMENTS)]
    pub collection: String,

    /// Embedding field to search
    #[arg(short, long, default_value = fields::TEXT_EMBEDDING)]
    pub field: String,

    /// Maximum number of hits
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Equality filter, `field=value` (repeatable)
    #[arg(long)]
    pub eq: Vec<String>,

    /// Inclusive range filter, `field=low..high` (repeatable)
    #[arg(long)]
    pub range: Vec<String>,

    /// Scalar fields to return
    #[arg(short, long, value_delimiter = ',')]
    pub output: Vec<String>,

    /// Page through a server-side cursor with this batch size
    #[arg(long)]
    pub batch_size: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HitOutput {
    pub id: i64,
    pub distance: f32,
    pub fields: serde_json::Value,
}

impl From<&SearchHit> for HitOutput {
    fn from(hit: &SearchHit) -> Self {
        Self {
            id: hit.id,
            distance: hit.distance,
            fields: serde_json::to_value(&hit.record.scalars).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SearchOutput {
    pub hits: Vec<HitOutput>,
    /// Cursor fetches, when paging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batches: Option<usize>,
}

impl CommandOutput for SearchOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "distance", "fields"]);
        for hit in &self.hits {
            table.add_row(vec![
                hit.id.to_string(),
                format!("{:.4}", hit.distance),
                truncate(&hit.fields.to_string(), 80),
            ]);
        }
        let listing = render_list("hit", &table, self.hits.len());
        match self.batches {
            Some(batches) => format!("{listing}\n\n{batches} batch fetches"),
            None => listing,
        }
    }
}

/// Parse a literal as an integer, then a float, else keep it as a string.
fn literal(raw: &str) -> FieldValue {
    raw.parse::<i64>()
        .map(FieldValue::from)
        .or_else(|_| raw.parse::<f64>().map(FieldValue::from))
        .unwrap_or_else(|_| FieldValue::from(raw))
}

fn split_assignment(raw: &str) -> Result<(&str, &str)> {
    raw.split_once('=')
        .map(|(field, value)| (field.trim(), value.trim()))
        .filter(|(field, _)| !field.is_empty())
        .ok_or_else(|| anyhow!("expected field=value, got '{raw}'"))
}

/// Build the conjunction of the `--eq` and `--range` flags.
pub fn build_filter(eq: &[String], range: &[String]) -> Result<Option<FilterExpr>> {
    let mut clauses = Vec::new();
    for raw in eq {
        let (field, value) = split_assignment(raw)?;
        clauses.push(FilterExpr::eq(field, literal(value)));
    }
    for raw in range {
        let (field, bounds) = split_assignment(raw)?;
        let Some((low, high)) = bounds.split_once("..") else {
            bail!("expected field=low..high, got '{raw}'");
        };
        clauses.push(FilterExpr::between(field, literal(low.trim()), literal(high.trim())));
    }

    let filter = match clauses.len() {
        0 => return Ok(None),
        1 => clauses.remove(0),
        _ => FilterExpr::all(clauses),
    };
    filter.validate().context("Invalid filter")?;
    Ok(Some(filter))
}

pub async fn execute(args: SearchArgs, context: &AppContext, json: bool) -> Result<()> {
    let filter = build_filter(&args.eq, &args.range)?;

    let result = if let Some(batch_size) = args.batch_size {
        let paged = context
            .retrieval
            .iterate_search(&IterateQuery {
                collection: args.collection,
                field: args.field,
                text: args.text,
                filter,
                batch_size: Some(batch_size),
                limit: args.limit.unwrap_or(context.config.retrieval.default_limit),
                output_fields: args.output,
            })
            .await
            .context("Paged search failed")?;
        SearchOutput {
            hits: paged.hits.iter().map(HitOutput::from).collect(),
            batches: Some(paged.batches),
        }
    } else {
        let query = SearchQuery {
            collection: args.collection,
            field: args.field,
            text: args.text,
            filter,
            limit: args.limit,
            output_fields: args.output,
        };
        let hits = context.retrieval.search(&query).await.context("Search failed")?;
        SearchOutput {
            hits: hits.iter().map(HitOutput::from).collect(),
            batches: None,
        }
    };

    output(&result, json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literals_are_typed() {
        assert_eq!(literal("42"), FieldValue::Int(42));
        assert_eq!(literal("2.5"), FieldValue::Float(2.5));
        assert_eq!(literal("INTERNAL"), FieldValue::Str("INTERNAL".to_string()));
    }

    #[test]
    fn test_build_filter_combines_flags() {
        let filter = build_filter(
            &["type=INTERNAL".to_string()],
            &["budget=1000..5000".to_string()],
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            filter,
            FilterExpr::all([
                FilterExpr::eq("type", "INTERNAL"),
                FilterExpr::between("budget", 1000, 5000),
            ])
        );
    }

    #[test]
    fn test_build_filter_rejects_bad_flags() {
        assert!(build_filter(&["novalue".to_string()], &[]).is_err());
        assert!(build_filter(&[], &["budget=1000".to_string()]).is_err());
        assert!(build_filter(&["bad field=1".to_string()], &[]).is_err());
        assert!(build_filter(&[], &[]).unwrap().is_none());
    }
}
