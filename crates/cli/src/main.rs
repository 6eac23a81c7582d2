//! Add-on deployment CLI
//!
//! A command-line tool for analyzing clusters, planning add-on deployments
//! and following their execution through the add-on agent.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client::Credentials;
use commands::{analyze, executions, plans};
use std::path::PathBuf;

/// Add-on deployment CLI
#[derive(Parser)]
#[command(name = "addonctl")]
#[command(author, version, about = "CLI for the add-on deployment agent", long_about = None)]
pub struct Cli {
    /// Agent URL (can also be set via ADDON_API_URL env var)
    #[arg(long, env = "ADDON_API_URL")]
    pub api_url: Option<String>,

    /// Path to kubeconfig file (uses default if not specified)
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<String>,

    /// Kubeconfig context to use instead of the current one
    #[arg(long)]
    pub context: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze cluster capabilities and resources
    Analyze,

    /// Create and inspect deployment plans
    #[command(subcommand)]
    Plan(PlanCommands),

    /// Execute a plan against the cluster
    Deploy {
        /// Plan ID to execute
        plan_id: String,

        /// Follow the execution until it finishes
        #[arg(long)]
        wait: bool,
    },

    /// Inspect executions
    #[command(subcommand)]
    Execution(ExecutionCommands),
}

#[derive(Subcommand)]
pub enum PlanCommands {
    /// Create a plan from a free-text request
    Create {
        /// What to deploy, e.g. "install grafana for monitoring"
        #[arg(required = true, num_args = 1..)]
        request: Vec<String>,

        /// Target namespace for every step
        #[arg(long, short)]
        namespace: Option<String>,

        /// YAML or JSON file with value overrides
        #[arg(long)]
        values: Option<PathBuf>,

        /// Customize the plan for the cluster in the kubeconfig
        #[arg(long)]
        analyze: bool,
    },

    /// Show a plan
    Show {
        /// Plan ID
        id: String,
    },

    /// List plans
    List,
}

#[derive(Subcommand)]
pub enum ExecutionCommands {
    /// Show an execution with per-step status
    Show {
        /// Execution ID
        id: String,
    },

    /// List executions
    List {
        /// Only executions of this plan
        #[arg(long)]
        plan: Option<String>,
    },
}

fn credentials(cli: &Cli) -> Result<Credentials> {
    Ok(Credentials {
        kubeconfig: config::read_kubeconfig(cli.kubeconfig.as_deref())?,
        context: cli.context.clone(),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = config::Config::load()?;

    let api_url = settings.resolve_api_url(cli.api_url.clone());
    if cli.verbose {
        output::print_info(&format!("Using agent at {}", api_url));
    }

    // Initialize client
    let client = client::ApiClient::new(&api_url)?;

    // Execute command
    match &cli.command {
        Commands::Analyze => {
            analyze::analyze_cluster(&client, credentials(&cli)?, cli.format).await?;
        }
        Commands::Plan(plan_cmd) => match plan_cmd {
            PlanCommands::Create {
                request,
                namespace,
                values,
                analyze,
            } => {
                let requirements = values
                    .as_deref()
                    .map(plans::read_values_file)
                    .transpose()?;
                let creds = if *analyze { Some(credentials(&cli)?) } else { None };
                plans::create_plan(
                    &client,
                    request.join(" "),
                    settings.resolve_namespace(namespace.clone()),
                    requirements,
                    creds,
                    cli.format,
                )
                .await?;
            }
            PlanCommands::Show { id } => {
                plans::show_plan(&client, id, cli.format).await?;
            }
            PlanCommands::List => {
                plans::list_plans(&client, cli.format).await?;
            }
        },
        Commands::Deploy { plan_id, wait } => {
            executions::deploy(&client, plan_id, credentials(&cli)?, *wait, cli.format).await?;
        }
        Commands::Execution(exec_cmd) => match exec_cmd {
            ExecutionCommands::Show { id } => {
                executions::show_execution(&client, id, cli.format).await?;
            }
            ExecutionCommands::List { plan } => {
                executions::list_executions(&client, plan.clone(), cli.format).await?;
            }
        },
    }

    Ok(())
}
