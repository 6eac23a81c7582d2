//! Plan commands

use anyhow::{Context, Result};
use std::path::Path;
use tabled::Tabled;

use crate::client::{ApiClient, Credentials, Plan, PlanRequest};
use crate::output::{
    color_status, format_timestamp, print_json, print_rows, print_success, print_warning,
    OutputFormat,
};

#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Steps")]
    steps: usize,
    #[tabled(rename = "Created")]
    created_at: String,
}

#[derive(Tabled)]
struct StepRow {
    #[tabled(rename = "Step")]
    id: String,
    #[tabled(rename = "Package")]
    package: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Repository")]
    repository: String,
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Status")]
    status: String,
}

/// Read user overrides from a YAML or JSON file
pub fn read_values_file(path: &Path) -> Result<serde_json::Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read values file {}", path.display()))?;
    let value: serde_json::Value = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse values file {}", path.display()))?;
    if !value.is_object() {
        anyhow::bail!("Values file {} must contain a mapping", path.display());
    }
    Ok(value)
}

pub async fn create_plan(
    client: &ApiClient,
    text: String,
    namespace: Option<String>,
    requirements: Option<serde_json::Value>,
    credentials: Option<Credentials>,
    format: OutputFormat,
) -> Result<()> {
    let request = PlanRequest {
        text,
        requirements,
        namespace,
        credentials,
    };
    let plan: Plan = client.post("api/v1/plans", &request).await?;

    match format {
        OutputFormat::Json => print_json(&plan)?,
        OutputFormat::Table => {
            print_success(&format!("Created plan {}", plan.id));
            print_plan(&plan);
        }
    }

    Ok(())
}

pub async fn show_plan(client: &ApiClient, id: &str, format: OutputFormat) -> Result<()> {
    let plan: Plan = client.get(&format!("api/v1/plans/{}", id)).await?;

    match format {
        OutputFormat::Json => print_json(&plan)?,
        OutputFormat::Table => print_plan(&plan),
    }

    Ok(())
}

pub async fn list_plans(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let plans: Vec<Plan> = client.get("api/v1/plans").await?;

    match format {
        OutputFormat::Json => print_json(&plans)?,
        OutputFormat::Table => {
            if plans.is_empty() {
                print_warning("No plans found");
                return Ok(());
            }

            let rows: Vec<PlanRow> = plans
                .iter()
                .map(|p| PlanRow {
                    id: p.id.clone(),
                    name: p.name.clone(),
                    steps: p.steps.len(),
                    created_at: format_timestamp(&p.created_at),
                })
                .collect();
            print_rows(rows);
            println!("\nTotal: {} plans", plans.len());
        }
    }

    Ok(())
}

fn print_plan(plan: &Plan) {
    println!("{}", plan.name);
    println!("{}", plan.description);
    println!("Estimated time: {}", plan.estimated_time);
    println!(
        "Resource impact: cpu {}, memory {}, storage {}, nodes {}",
        plan.resource_impact.cpu,
        plan.resource_impact.memory,
        plan.resource_impact.storage,
        plan.resource_impact.nodes
    );

    let rows: Vec<StepRow> = plan
        .steps
        .iter()
        .map(|s| {
            let (package, version, repository) = match &s.package {
                Some(p) => (p.name.clone(), p.version.clone(), p.source.name.clone()),
                None => (
                    s.command.clone().unwrap_or_else(|| s.name.clone()),
                    "-".to_string(),
                    "-".to_string(),
                ),
            };
            StepRow {
                id: s.id.clone(),
                package,
                version,
                repository,
                namespace: s.namespace.clone().unwrap_or_else(|| "default".to_string()),
                status: color_status(&s.status),
            }
        })
        .collect();
    print_rows(rows);

    if !plan.prerequisites.is_empty() {
        println!("\nPrerequisites:");
        for item in &plan.prerequisites {
            println!("  - {}", item);
        }
    }
    if !plan.risks.is_empty() {
        println!("\nRisks:");
        for item in &plan.risks {
            println!("  - {}", item);
        }
    }
}
