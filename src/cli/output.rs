//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::deploy::DeployReport;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Key/value row for the report table.
#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    field: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

/// Pod row for the report table.
#[derive(Tabled)]
struct PodRow {
    #[tabled(rename = "Pod")]
    name: String,
    #[tabled(rename = "Instance ID")]
    instance_id: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a deployment report for display.
    #[must_use]
    pub fn format_report(&self, report: &DeployReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => Self::format_report_text(report),
        }
    }

    fn format_report_text(report: &DeployReport) -> String {
        let mut output = String::new();

        let headline = if report.dry_run {
            format!("{} Dry run for {} finished", "•".cyan(), report.target)
        } else {
            format!("{} Gateway deployed to {}", "✓".green(), report.target)
        };
        let _ = writeln!(output, "\n{headline}\n");

        let mut rows = vec![FieldRow {
            field: "Control plane",
            value: format!("{} ({})", report.control_plane.name, report.control_plane.id),
        }];
        if !report.control_plane.domain.is_empty() {
            rows.push(FieldRow {
                field: "Domain",
                value: report.control_plane.domain.clone(),
            });
        }

        let optional = [
            ("Config file", report.config_file.as_ref().map(|p| p.display().to_string())),
            ("Instance ID", report.instance_id.clone()),
            ("Container ID", report.container_id.clone()),
            ("Deployment", report.deployment.clone()),
            ("Service", report.service.clone()),
        ];
        rows.extend(
            optional
                .into_iter()
                .filter_map(|(field, value)| value.map(|value| FieldRow { field, value })),
        );

        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        if !report.pods.is_empty() {
            let pods: Vec<PodRow> = report
                .pods
                .iter()
                .map(|p| PodRow {
                    name: p.name.clone(),
                    instance_id: p
                        .instance_id
                        .clone()
                        .unwrap_or_else(|| "unknown".yellow().to_string()),
                })
                .collect();
            output.push('\n');
            output.push_str(&Table::new(pods).to_string());
            output.push('\n');
        }

        output
    }

    /// Formats a success message.
    #[must_use]
    pub fn success(&self, message: &str) -> String {
        self.message("success", message, "✓".green().to_string())
    }

    fn message(&self, status: &str, message: &str, marker: String) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({ "status": status, "message": message });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => format!("{marker} {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::ControlPlaneRef;
    use crate::deploy::{PodReport, Target};

    fn report() -> DeployReport {
        DeployReport {
            target: Target::Kubernetes,
            dry_run: false,
            control_plane: ControlPlaneRef {
                id: String::from("cp-1"),
                name: String::from("default"),
                domain: String::from("cp-1.example.com"),
                org_id: String::from("org-1"),
            },
            config_file: None,
            instance_id: None,
            container_id: None,
            deployment: Some(String::from("apisix")),
            service: Some(String::from("apisix-gateway")),
            pods: vec![
                PodReport {
                    name: String::from("apisix-0"),
                    instance_id: Some(String::from("id-0")),
                },
                PodReport {
                    name: String::from("apisix-1"),
                    instance_id: None,
                },
            ],
        }
    }

    #[test]
    fn test_json_report_skips_empty_fields() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let value: serde_json::Value =
            serde_json::from_str(&formatter.format_report(&report())).expect("json");

        assert_eq!(value["target"], "kubernetes");
        assert_eq!(value["service"], "apisix-gateway");
        assert_eq!(value["pods"][0]["instance_id"], "id-0");
        assert!(value.get("container_id").is_none());
    }

    #[test]
    fn test_text_report_lists_pods() {
        colored::control::set_override(false);
        let text = OutputFormatter::new(OutputFormat::Text).format_report(&report());

        assert!(text.contains("Gateway deployed to kubernetes"));
        assert!(text.contains("apisix-gateway"));
        assert!(text.contains("apisix-1"));
        assert!(text.contains("unknown"));
        assert!(!text.contains("Container ID"));
    }

    #[test]
    fn test_json_message() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let value: serde_json::Value =
            serde_json::from_str(&formatter.success("Gateway stopped")).expect("json");
        assert_eq!(value["status"], "success");
        assert_eq!(value["message"], "Gateway stopped");
    }
}
