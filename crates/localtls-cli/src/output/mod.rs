//! Output formatting for different formats.

use clap::ValueEnum;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use localtls::{
    BundleManifest, HealthReport, HealthStatus, InstallResult, LeafHandle, LeafOutcome,
};

/// Available output formats.
#[derive(Debug, Clone, Copy, Default, ValueEnum, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable, colored
    #[default]
    Pretty,
    /// JSON output
    Json,
    /// YAML output
    Yaml,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            _ => anyhow::bail!(
                "Unknown output format: {s}\n\
                 Valid formats: pretty, json, yaml"
            ),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Json => write!(f, "json"),
            Self::Yaml => write!(f, "yaml"),
        }
    }
}

/// Print `value` as JSON or YAML. Returns `false` for [`OutputFormat::Pretty`].
pub fn emit_structured<T: Serialize>(format: OutputFormat, value: &T) -> anyhow::Result<bool> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
        OutputFormat::Pretty => return Ok(false),
    }
    Ok(true)
}

/// Colored status word.
pub fn status_label(status: HealthStatus) -> String {
    match status {
        HealthStatus::Healthy => "HEALTHY".green().bold().to_string(),
        HealthStatus::Degraded => "DEGRADED".yellow().bold().to_string(),
        HealthStatus::Unhealthy => "UNHEALTHY".red().bold().to_string(),
    }
}

/// Leaf summary.
pub fn print_leaf(leaf: &LeafHandle) {
    let what = match leaf.outcome {
        LeafOutcome::Reused => "Reused existing certificate".normal(),
        LeafOutcome::Issued => "Issued new certificate".green(),
        LeafOutcome::Delegated => "Issued new certificate with external tool".green(),
    };
    println!("{} ({})", what.bold(), leaf.source);
    println!("  {} {}", "Certificate:".bold(), leaf.cert_path.display());
    println!("  {} {}", "Key:".bold(), leaf.key_path.display());
    println!("  {} {}", "Root CA:".bold(), leaf.root_ca_path.display());
    println!("  {} {}", "Hostnames:".bold(), leaf.info.san.join(", "));
    println!(
        "  {} {}",
        "Valid until:".bold(),
        leaf.info.not_after.format("%Y-%m-%d %H:%M:%S UTC")
    );
}

/// One line per trust store attempt.
pub fn print_install_results(results: &[InstallResult]) {
    if results.is_empty() {
        println!("{}", "No trust store applies on this system".yellow());
        return;
    }
    for r in results {
        let line = format!("{} ({})", r.store, r.kind);
        if !r.success {
            println!(
                "  {} {}: {}",
                "✗".red(),
                line,
                r.reason.as_deref().unwrap_or("unknown failure")
            );
        } else if r.already_present {
            println!("  {} {} already trusted", "✓".green(), line);
        } else {
            println!("  {} {} trusted", "✓".green(), line);
            if let Some(reason) = &r.reason {
                println!("      {}", reason.dimmed());
            }
        }
    }
}

/// Full health report.
pub fn print_health(report: &HealthReport) {
    println!("{} {}", "Certificate health:".bold(), status_label(report.status));
    println!();

    let yes_no = |b: bool| if b { "yes".green() } else { "no".red() };
    println!("  {} {}", "External tool available:".bold(), yes_no(report.external_tool_available));
    println!("  {} {}", "Internal CA present:".bold(), yes_no(report.ca_present));
    println!("  {} {}", "Server certificate present:".bold(), yes_no(report.leaf.cert_present));
    println!("  {} {}", "Server key present:".bold(), yes_no(report.leaf.key_present));
    if let Some(source) = report.source {
        println!("  {} {}", "Issued by:".bold(), source);
    }
    if let Some(at) = report.last_generated {
        println!("  {} {}", "Last generated:".bold(), at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(info) = &report.leaf.info {
        println!(
            "  {} {} ({} days)",
            "Expires:".bold(),
            info.not_after.format("%Y-%m-%d %H:%M:%S UTC"),
            report.leaf.days_until_expiry.unwrap_or_default()
        );
        println!("  {} {}", "Hostnames:".bold(), info.san.join(", "));
    }
    if let Some(chains) = report.leaf.chains_to_root {
        println!("  {} {}", "Signed by current root:".bold(), yes_no(chains));
    }

    if !report.trust.is_empty() {
        println!();
        println!("{}", "Trust stores:".bold());
        for record in &report.trust {
            let mark = if record.installed { "✓".green() } else { "✗".red() };
            let location = record.location.as_deref().unwrap_or("-");
            println!("  {mark} {} ({}) {}", record.store, record.kind, location.dimmed());
        }
    }

    if !report.issues.is_empty() {
        println!();
        println!("{}", "Issues:".bold());
        for issue in &report.issues {
            println!("  - {issue}");
        }
    }
}

/// Files written by a bundle export.
pub fn print_bundle(manifest: &BundleManifest) {
    println!("{} {}", "Client bundle created in".green().bold(), manifest.directory.display());
    for file in manifest.files() {
        println!("  {}", file.display());
    }
    println!("  {} {}", "CA fingerprint (SHA-256):".bold(), manifest.fingerprint);
}
