// Report Generation for Rentable Deploy
//
// Operator-facing rendering of deployment and audit reports.

use crate::api::types::{AuditReport, DeploymentReport};
use crate::gas::GasEntry;
use anyhow::Result;
use common::FindingStatus;
use ethers::types::U256;
use ethers::utils::format_units;
use serde::Serialize;
use std::fmt::Write;
use std::fs;
use std::path::Path;

/// Report formatter for Rentable Deploy
pub struct ReportFormatter;

impl ReportFormatter {
    /// Format any report as JSON
    pub fn to_json<T: Serialize>(report: &T) -> Result<String> {
        let json = serde_json::to_string_pretty(report)?;
        Ok(json)
    }

    /// Format a deployment report as plain text
    pub fn deployment_to_text(report: &DeploymentReport) -> String {
        let mut output = String::new();

        output.push_str("Rentable Deployment Report\n");
        output.push_str("==========================\n\n");
        let _ = writeln!(output, "Timestamp: {}", report.timestamp);
        let _ = writeln!(output, "Network: {} ({})\n", report.network, report.network_id);

        let _ = writeln!(output, "Resources: {}", report.resources.len());
        output.push_str("----------\n");
        for resource in &report.resources {
            let _ = write!(output, "{:>22}: {:?} [{}]", resource.name, resource.address, resource.kind);
            if let Some(implementation) = resource.implementation {
                let _ = write!(output, " -> {:?}", implementation);
            }
            output.push('\n');
        }
        let _ = writeln!(output, "\nConfiguration calls applied: {}\n", report.completed_calls.len());

        Self::format_gas(&mut output, &report.transactions, report.total_gas, report.gas_price, &report.estimated_cost);
        output
    }

    /// Format an audit report as plain text, one line per finding
    pub fn audit_to_text(report: &AuditReport) -> String {
        let mut output = String::new();

        output.push_str("Rentable Ownership Audit\n");
        output.push_str("========================\n\n");
        let _ = writeln!(output, "Timestamp: {}", report.timestamp);
        let _ = writeln!(output, "Network: {} ({})", report.network, report.network_id);
        let _ = writeln!(output, "Reconciled: {}\n", report.reconciled);

        for finding in &report.findings {
            let actual = match finding.actual_controller {
                Some(actual) => format!("{:?}", actual),
                None => "-".to_string(),
            };
            let _ = write!(
                output,
                "[{:<13}] {} {}: actual {} expected {:?}",
                finding.status.to_string(),
                finding.resource_name, finding.control_kind, actual, finding.expected_controller
            );
            if let Some(note) = &finding.note {
                let _ = write!(output, " ({})", note);
            }
            output.push('\n');
        }

        let _ = writeln!(
            output,
            "\nOK: {}  MISMATCH: {}  UNINITIALIZED: {}  PENDING: {}  UNREADABLE: {}\n",
            report.count(FindingStatus::Ok),
            report.count(FindingStatus::Mismatch),
            report.count(FindingStatus::Uninitialized),
            report.count(FindingStatus::PendingAcceptance),
            report.count(FindingStatus::Unreadable),
        );

        if !report.transactions.is_empty() {
            Self::format_gas(&mut output, &report.transactions, report.total_gas, report.gas_price, &report.estimated_cost);
        }
        output
    }

    /// Format gas entries and totals
    fn format_gas(output: &mut String, entries: &[GasEntry], total: U256, gas_price: U256, cost: &str) {
        let _ = writeln!(output, "Transactions: {}", entries.len());
        output.push_str("-------------\n");
        for entry in entries {
            let _ = writeln!(output, "{:>12} gas  {}  {:?}", entry.gas_used.to_string(), entry.label, entry.tx_hash);
        }
        let gwei = format_units(gas_price, "gwei").unwrap_or_else(|_| format!("{} wei", gas_price));
        let _ = writeln!(output, "\nTotal Gas: {}", total);
        let _ = writeln!(output, "Gas Price: {} gwei", gwei);
        let _ = writeln!(output, "Estimated Cost: {}", cost);
    }

    /// Render a deployment report in the requested format
    pub fn render_deployment(report: &DeploymentReport, format: ReportFormat) -> Result<String> {
        match format {
            ReportFormat::Json => Self::to_json(report),
            ReportFormat::Text => Ok(Self::deployment_to_text(report)),
        }
    }

    /// Render an audit report in the requested format
    pub fn render_audit(report: &AuditReport, format: ReportFormat) -> Result<String> {
        match format {
            ReportFormat::Json => Self::to_json(report),
            ReportFormat::Text => Ok(Self::audit_to_text(report)),
        }
    }

    /// Save rendered report content to a file
    pub fn save_to_file<P: AsRef<Path>>(content: &str, path: P) -> Result<()> {
        fs::write(path, content)?;
        Ok(())
    }
}

/// Report format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// JSON format
    Json,

    /// Plain text format
    Text,
}
