//! Deployment and execution commands

use anyhow::Result;
use std::time::Duration;
use tabled::Tabled;

use crate::client::{ApiClient, Credentials, ExecuteRequest, Execution};
use crate::output::{
    color_status, format_timestamp, print_error, print_info, print_json, print_rows,
    print_success, print_warning, OutputFormat,
};

const POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Tabled)]
struct ExecutionRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Plan")]
    plan_id: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Steps Done")]
    done: String,
    #[tabled(rename = "Started")]
    started_at: String,
}

#[derive(Tabled)]
struct StepRow {
    #[tabled(rename = "Step")]
    step_id: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Error")]
    error: String,
}

/// Start executing a plan, optionally following it to the end
pub async fn deploy(
    client: &ApiClient,
    plan_id: &str,
    credentials: Credentials,
    wait: bool,
    format: OutputFormat,
) -> Result<()> {
    let request = ExecuteRequest { credentials };
    let mut execution: Execution = client
        .post(&format!("api/v1/plans/{}/executions", plan_id), &request)
        .await?;

    if matches!(format, OutputFormat::Table) {
        print_success(&format!("Execution {} started", execution.id));
    }

    if wait {
        let path = format!("api/v1/executions/{}", execution.id);
        let mut reported = 0;
        while !execution.is_terminal() {
            tokio::time::sleep(POLL_INTERVAL).await;
            execution = client.get(&path).await?;
            if matches!(format, OutputFormat::Table) {
                reported = report_progress(&execution, reported);
            }
        }
    }

    match format {
        OutputFormat::Json => print_json(&execution)?,
        OutputFormat::Table => print_execution(&execution),
    }

    if execution.status == "failed" {
        anyhow::bail!(
            "Deployment failed: {}",
            execution.error.as_deref().unwrap_or("unknown error")
        );
    }

    Ok(())
}

/// Print steps that finished since the last poll; returns how many are done
fn report_progress(execution: &Execution, reported: usize) -> usize {
    let finished: Vec<_> = execution
        .steps
        .iter()
        .filter(|s| s.status == "completed" || s.status == "failed")
        .collect();
    for step in finished.iter().skip(reported) {
        match step.status.as_str() {
            "completed" => print_success(&format!("{} completed", step.step_id)),
            _ => print_error(&format!("{} failed", step.step_id)),
        }
    }
    finished.len()
}

pub async fn show_execution(client: &ApiClient, id: &str, format: OutputFormat) -> Result<()> {
    let execution: Execution = client.get(&format!("api/v1/executions/{}", id)).await?;

    match format {
        OutputFormat::Json => print_json(&execution)?,
        OutputFormat::Table => print_execution(&execution),
    }

    Ok(())
}

pub async fn list_executions(
    client: &ApiClient,
    plan_id: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let mut executions: Vec<Execution> = client.get("api/v1/executions").await?;
    if let Some(plan_id) = &plan_id {
        executions.retain(|e| &e.plan_id == plan_id);
    }

    match format {
        OutputFormat::Json => print_json(&executions)?,
        OutputFormat::Table => {
            if executions.is_empty() {
                print_warning("No executions found");
                return Ok(());
            }

            let rows: Vec<ExecutionRow> = executions
                .iter()
                .map(|e| ExecutionRow {
                    id: e.id.clone(),
                    plan_id: e.plan_id.clone(),
                    status: color_status(&e.status),
                    done: format!(
                        "{}/{}",
                        e.steps.iter().filter(|s| s.status == "completed").count(),
                        e.steps.len()
                    ),
                    started_at: format_timestamp(&e.started_at),
                })
                .collect();
            print_rows(rows);
            println!("\nTotal: {} executions", executions.len());
        }
    }

    Ok(())
}

fn print_execution(execution: &Execution) {
    print_info(&format!(
        "Execution {} of plan {}: {}",
        execution.id,
        execution.plan_id,
        color_status(&execution.status)
    ));

    let rows: Vec<StepRow> = execution
        .steps
        .iter()
        .map(|s| StepRow {
            step_id: s.step_id.clone(),
            status: color_status(&s.status),
            error: s.error.clone().unwrap_or_default(),
        })
        .collect();
    print_rows(rows);

    if let Some(failure) = &execution.failure {
        print_error(&format!("{} failed: {}", failure.step_id, failure.error));
        for line in &failure.logs {
            println!("  {}", line);
        }
    }

    if !execution.logs.is_empty() {
        println!("\nLog:");
        for line in &execution.logs {
            println!("  {}", line);
        }
    }
}
