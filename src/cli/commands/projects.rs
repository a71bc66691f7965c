//! Project commands.

use anyhow::{anyhow, Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::application::AppContext;
use crate::cli::output::{list_table, output, render_list, truncate, CommandOutput};
use crate::services::{NewProject, ProjectHit, Report};

#[derive(Args, Debug)]
pub struct ProjectsArgs {
    #[command(subcommand)]
    pub command: ProjectCommands,
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommands {
    /// Create or replace a project
    Add {
        #[arg(long)]
        id: i64,
        #[arg(short, long)]
        name: String,
        #[arg(short, long, default_value = "")]
        description: String,
        #[arg(short, long, default_value = "0")]
        budget: i64,
        /// Project type, e.g. INTERNAL
        #[arg(short = 't', long = "type", default_value = "INTERNAL")]
        project_type: String,
    },
    /// Show a project
    Show { id: i64 },
    /// Delete a project
    Delete { id: i64 },
    /// Hybrid search over project names and descriptions
    Search { term: String },
    /// Matching projects with summaries of their documents
    Report { term: String },
}

#[derive(Debug, Serialize)]
pub struct ProjectListOutput {
    pub projects: Vec<ProjectHit>,
}

impl CommandOutput for ProjectListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "name", "type", "budget", "score"]);
        for project in &self.projects {
            table.add_row(vec![
                project.id.to_string(),
                truncate(&project.name, 30),
                project.project_type.clone(),
                project.budget.to_string(),
                format!("{:.4}", project.score),
            ]);
        }
        render_list("project", &table, self.projects.len())
    }
}

#[derive(Debug, Serialize)]
pub struct ProjectChangeOutput {
    pub id: i64,
    pub action: &'static str,
}

impl CommandOutput for ProjectChangeOutput {
    fn to_human(&self) -> String {
        format!("Project {} {}", self.id, self.action)
    }
}

#[derive(Debug, Serialize)]
pub struct ProjectDetailOutput {
    pub id: i64,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub project_type: String,
    pub budget: i64,
}

impl CommandOutput for ProjectDetailOutput {
    fn to_human(&self) -> String {
        [
            format!("Project {}", self.id),
            "─────────────────────────────────────────".to_string(),
            format!("Name:        {}", self.name),
            format!("Type:        {}", self.project_type),
            format!("Budget:      {}", self.budget),
            format!("Description: {}", self.description),
        ]
        .join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct ReportOutput(pub Report);

impl CommandOutput for ReportOutput {
    fn to_human(&self) -> String {
        let report = &self.0;
        if report.projects.is_empty() {
            return format!("No projects match '{}'.", report.term);
        }
        let mut lines = vec![format!("Report for '{}'", report.term)];
        for section in &report.projects {
            lines.push(String::new());
            lines.push(format!(
                "{} (#{}, {}, budget {})",
                section.project.name,
                section.project.id,
                section.project.project_type,
                section.project.budget
            ));
            if section.documents.is_empty() {
                lines.push("  no documents".to_string());
            }
            for doc in &section.documents {
                lines.push(format!(
                    "  - {} v{}: {}",
                    doc.name,
                    doc.version,
                    doc.summary.as_deref().unwrap_or("(no summary)")
                ));
            }
        }
        lines.join("\n")
    }
}

pub async fn execute(args: ProjectsArgs, context: &AppContext, json: bool) -> Result<()> {
    match args.command {
        ProjectCommands::Add {
            id,
            name,
            description,
            budget,
            project_type,
        } => {
            let project = NewProject {
                id,
                name,
                description,
                budget,
                project_type,
            };
            context
                .indexing
                .update_project(&project)
                .await
                .context("Failed to store project")?;
            context.persist().await.context("Failed to save store snapshot")?;
            output(&ProjectChangeOutput { id, action: "saved" }, json);
        }
        ProjectCommands::Show { id } => {
            let project = context
                .indexing
                .get_project(id)
                .await
                .context("Failed to load project")?
                .ok_or_else(|| anyhow!("Project {id} not found"))?;
            output(
                &ProjectDetailOutput {
                    id: project.id,
                    name: project.name,
                    description: project.description,
                    project_type: project.project_type,
                    budget: project.budget,
                },
                json,
            );
        }
        ProjectCommands::Delete { id } => {
            if !context
                .indexing
                .delete_project(id)
                .await
                .context("Failed to delete project")?
            {
                return Err(anyhow!("Project {id} not found"));
            }
            context.persist().await.context("Failed to save store snapshot")?;
            output(&ProjectChangeOutput { id, action: "deleted" }, json);
        }
        ProjectCommands::Search { term } => {
            let projects = context
                .retrieval
                .search_projects(&term)
                .await
                .context("Project search failed")?;
            output(&ProjectListOutput { projects }, json);
        }
        ProjectCommands::Report { term } => {
            let generator = context
                .text_generator()
                .context("Failed to set up text generation")?;
            let report = context
                .reports(generator)
                .build_report(&term)
                .await
                .context("Failed to build report")?;
            output(&ReportOutput(report), json);
        }
    }
    Ok(())
}
