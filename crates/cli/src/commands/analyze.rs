//! Cluster analysis command

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, ClusterAnalysis, Credentials};
use crate::output::{
    format_bytes, format_cpu, format_flag, format_timestamp, print_info, print_json, print_rows,
    OutputFormat,
};

/// Row for nodes table
#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Condition")]
    condition: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Allocatable")]
    allocatable: String,
}

/// Row for a name/value table
#[derive(Tabled)]
struct FlagRow {
    #[tabled(rename = "Capability")]
    name: String,
    #[tabled(rename = "Enabled")]
    enabled: String,
}

pub async fn analyze_cluster(
    client: &ApiClient,
    credentials: Credentials,
    format: OutputFormat,
) -> Result<()> {
    let analysis: ClusterAnalysis = client
        .post("api/v1/clusters/analyze", &credentials)
        .await?;

    match format {
        OutputFormat::Json => print_json(&analysis)?,
        OutputFormat::Table => print_analysis(&analysis),
    }

    Ok(())
}

fn print_analysis(analysis: &ClusterAnalysis) {
    print_info(&format!(
        "Cluster {} ({}), analyzed {}",
        analysis.cluster_name,
        analysis.version,
        format_timestamp(&analysis.analyzed_at)
    ));

    let nodes: Vec<NodeRow> = analysis
        .nodes
        .iter()
        .map(|n| NodeRow {
            name: n.name.clone(),
            role: n.role.clone(),
            condition: n.condition.clone(),
            cpu: format!(
                "{} / {}",
                format_cpu(n.cpu.allocatable),
                format_cpu(n.cpu.capacity)
            ),
            memory: format!(
                "{} / {}",
                format_bytes(n.memory.allocatable),
                format_bytes(n.memory.capacity)
            ),
            allocatable: format!("{}% cpu, {}% mem", n.cpu.percentage, n.memory.percentage),
        })
        .collect();
    if !nodes.is_empty() {
        print_rows(nodes);
    }

    let r = &analysis.resources;
    println!(
        "\nResources: CPU {} of {} available, memory {} of {}, storage {} of {}",
        format_cpu(r.available_cpu_millis),
        format_cpu(r.total_cpu_millis),
        format_bytes(r.available_memory_bytes),
        format_bytes(r.total_memory_bytes),
        format_bytes(r.available_storage_bytes),
        format_bytes(r.total_storage_bytes),
    );

    let flags: Vec<FlagRow> = analysis
        .capabilities
        .iter()
        .chain(analysis.security.iter())
        .map(|(name, enabled)| FlagRow {
            name: name.replace('_', " "),
            enabled: format_flag(*enabled),
        })
        .collect();
    print_rows(flags);

    if !analysis.storage_classes.is_empty() {
        println!("Storage classes: {}", analysis.storage_classes.join(", "));
    }
    println!("Namespaces: {}", analysis.namespaces.len());
}
