//! Index a document text file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use crate::application::AppContext;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::DocumentKey;
use crate::services::NewDocument;

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Text file to index
    pub file: PathBuf,

    #[arg(short, long)]
    pub project: i64,

    #[arg(short, long)]
    pub document: i64,

    #[arg(short, long, default_value = "1")]
    pub version: i64,

    /// Document name (defaults to the file name)
    #[arg(short, long)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IngestOutput {
    pub source_id: String,
    pub chunk_ids: Vec<i64>,
}

impl CommandOutput for IngestOutput {
    fn to_human(&self) -> String {
        format!(
            "Indexed {} in {} chunk{}",
            self.source_id,
            self.chunk_ids.len(),
            if self.chunk_ids.len() == 1 { "" } else { "s" }
        )
    }
}

pub async fn execute(args: IngestArgs, context: &AppContext, json: bool) -> Result<()> {
    let text = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let name = args.name.unwrap_or_else(|| {
        args.file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    });

    let document = NewDocument {
        key: DocumentKey {
            project_id: args.project,
            document_id: args.document,
            version: args.version,
        },
        name,
        text,
    };
    let chunk_ids = context
        .indexing
        .create_document(&document)
        .await
        .context("Failed to index document")?;
    context.persist().await.context("Failed to save store snapshot")?;

    output(
        &IngestOutput {
            source_id: document.key.source_id(),
            chunk_ids,
        },
        json,
    );
    Ok(())
}
