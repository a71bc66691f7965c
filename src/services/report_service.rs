//! Project report: best matching projects, their documents and summaries.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::DocumentKey;
use crate::services::indexing_service::IndexingService;
use crate::services::retrieval_service::{ProjectHit, RetrievalService};
use crate::services::summary_service::SummaryService;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentReport {
    pub document_id: i64,
    pub version: i64,
    pub name: String,
    /// Absent when the document has no text or generation failed
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectReport {
    pub project: ProjectHit,
    pub documents: Vec<DocumentReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub term: String,
    pub projects: Vec<ProjectReport>,
}

pub struct ReportService {
    retrieval: Arc<RetrievalService>,
    indexing: Arc<IndexingService>,
    summaries: Arc<SummaryService>,
}

impl ReportService {
    pub fn new(
        retrieval: Arc<RetrievalService>,
        indexing: Arc<IndexingService>,
        summaries: Arc<SummaryService>,
    ) -> Self {
        Self {
            retrieval,
            indexing,
            summaries,
        }
    }

    /// Search projects for `term` and summarise every document they hold.
    ///
    /// A failed summary leaves that document's summary empty; store errors
    /// abort the report.
    #[instrument(skip(self))]
    pub async fn build_report(&self, term: &str) -> DomainResult<Report> {
        let mut projects = Vec::new();
        for project in self.retrieval.search_projects(term).await? {
            let mut documents = Vec::new();
            for doc in self.indexing.find_documents_by_project(project.id).await? {
                let key = DocumentKey {
                    project_id: project.id,
                    document_id: doc.document_id,
                    version: doc.version,
                };
                let summary = match self.summaries.summarize_document(&key).await {
                    Ok(summary) => summary,
                    Err(err @ DomainError::GenerationFailed(_)) => {
                        warn!(source_id = %key.source_id(), error = %err, "summary skipped");
                        None
                    }
                    Err(err) => return Err(err),
                };
                documents.push(DocumentReport {
                    document_id: doc.document_id,
                    version: doc.version,
                    name: doc.name,
                    summary,
                });
            }
            projects.push(ProjectReport { project, documents });
        }
        info!(projects = projects.len(), "report built");
        Ok(Report {
            term: term.to_string(),
            projects,
        })
    }
}
