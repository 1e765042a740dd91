//! Output formatting for CLI commands.

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use shipmate_health::{ReadinessTable, ResourceReadiness};
use shipmate_release::{ReleaseAction, ReleaseResult};
use tabled::{Table, Tabled};

const CLI_SCHEMA_VERSION: &str = "shipmate.cli.v1";

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON format.
    Json,
}

/// Print data in the specified format.
pub fn print_output<T: Serialize + Tabled>(data: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if data.is_empty() {
                println!("{}", "No workloads found.".dimmed());
            } else {
                println!("{}", Table::new(data));
            }
        }
        OutputFormat::Json => println!("{}", format_json(data, "[]")),
    }
}

/// Print a single item as JSON.
pub fn print_single<T: Serialize>(data: &T) {
    println!("{}", format_json(data, "{}"));
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", "Success:".green().bold(), message);
}

/// Print an info message.
pub fn print_info(message: &str) {
    println!("{} {}", "Info:".blue().bold(), message);
}

/// One readiness row as shown to operators.
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct ReadinessRow {
    #[tabled(rename = "Resource")]
    pub resource: String,

    #[tabled(rename = "Ready")]
    pub ready: String,

    #[tabled(rename = "State")]
    pub state: String,

    #[tabled(rename = "Detail")]
    pub detail: String,
}

impl From<&ResourceReadiness> for ReadinessRow {
    fn from(row: &ResourceReadiness) -> Self {
        Self {
            resource: row.resource_id(),
            ready: format!("{}/{}", row.ready, row.desired),
            state: row.state.to_string(),
            detail: row.detail.clone().unwrap_or_else(|| "-".to_string()),
        }
    }
}

/// Print a readiness table.
pub fn print_readiness(table: &ReadinessTable, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            let rows: Vec<ReadinessRow> = table.rows().iter().map(ReadinessRow::from).collect();
            print_output(&rows, format);
        }
        OutputFormat::Json => print_single(table),
    }
}

/// Past-tense verb for a completed action.
pub fn action_verb(action: ReleaseAction) -> &'static str {
    match action {
        ReleaseAction::Install => "Installed",
        ReleaseAction::Upgrade => "Upgraded",
        ReleaseAction::Rollback { .. } => "Rolled back",
    }
}

/// Print the outcome of a successful run.
pub fn print_result(result: &ReleaseResult, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            print_success(&format!(
                "{} release {} in namespace {} (revision {}) in {:.1}s",
                action_verb(result.action),
                result.release,
                result.namespace,
                result.revision,
                result.elapsed_ms as f64 / 1000.0
            ));
            let app_version = result.app_version.as_deref().unwrap_or("-");
            println!(
                "chart: {}-{} (app {})",
                result.chart_name, result.chart_version, app_version
            );
            println!("values: {}", result.values_digest);

            match &result.readiness {
                Some(table) => {
                    let resources: Vec<String> = result
                        .resources
                        .iter()
                        .map(|(kind, count)| format!("{} {}", count, kind))
                        .collect();
                    if !resources.is_empty() {
                        println!(
                            "resources: {}, {} Service",
                            resources.join(", "),
                            result.services
                        );
                    }
                    print_readiness(table, format);
                }
                None => print_info("Readiness was not verified (--no-wait)"),
            }
        }
        OutputFormat::Json => print_single(result),
    }
}

fn format_json<T: Serialize + ?Sized>(data: &T, fallback: &str) -> String {
    let value = serde_json::to_value(data).unwrap_or_else(|_| serde_json::json!({}));
    let wrapped = sort_json_value(wrap_with_schema(value));
    serde_json::to_string_pretty(&wrapped).unwrap_or_else(|_| fallback.to_string())
}

fn wrap_with_schema(value: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "schemaVersion": CLI_SCHEMA_VERSION,
        "data": value
    })
}

fn sort_json_value(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Array(values) => {
            serde_json::Value::Array(values.into_iter().map(sort_json_value).collect())
        }
        serde_json::Value::Object(entries) => {
            let mut pairs: Vec<_> = entries.into_iter().collect();
            pairs.sort_by(|a, b| a.0.cmp(&b.0));
            let mut mapped = serde_json::Map::new();
            for (key, value) in pairs {
                mapped.insert(key, sort_json_value(value));
            }
            serde_json::Value::Object(mapped)
        }
        other => other,
    }
}
