//! CLI argument parsing and command dispatch.

pub mod args;
pub mod commands;

use anyhow::Result;
use args::{Cli, Commands};
use clap::Parser;
use colored::Colorize;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use localtls::{CertificateManager, TlsConfig, TlsError};

/// Run the CLI application.
pub async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    init_logging(cli.verbose);
    if cli.no_color {
        colored::control::set_override(false);
    }

    let mut config = CertificateManager::load_config(&cli.root)?;
    apply_overrides(&mut config, &cli);
    config.validate()?;

    let ctx = commands::Context {
        manager: CertificateManager::new(&cli.root, config),
        output_format: cli.output.unwrap_or_default(),
        explain: cli.explain,
        verbose: cli.verbose,
    };

    match cli.command.unwrap_or(Commands::Ensure) {
        Commands::Ensure => commands::ensure::execute(ctx).await,
        Commands::Generate => commands::generate::execute(ctx).await,
        Commands::Mkcert => commands::generate::mkcert(ctx).await,
        Commands::NoMkcert => commands::generate::no_mkcert(ctx).await,
        Commands::InstallCa => commands::install_ca::execute(ctx).await,
        Commands::Bundle(args) => commands::bundle::execute(ctx, args),
        Commands::Health => commands::health::execute(ctx).await,
        Commands::Check => commands::check::execute(ctx),
        Commands::Instructions(args) => commands::instructions::execute(ctx, args),
    }
}

/// Print a failed command with its remediation hint.
pub fn report_error(err: &anyhow::Error) {
    eprintln!("{} {err:#}", "error:".red().bold());
    if let Some(tls) = err.downcast_ref::<TlsError>() {
        eprintln!("{} {}", "hint:".yellow().bold(), tls.remediation());
    }
}

/// Logs go to stderr so JSON/YAML on stdout stays parseable.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing::subscriber::set_global_default(
        FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .finish(),
    );
}

fn apply_overrides(config: &mut TlsConfig, cli: &Cli) {
    for host in &cli.hostnames {
        let host = host.trim();
        if !host.is_empty() && !config.hostnames.iter().any(|h| h.eq_ignore_ascii_case(host)) {
            config.hostnames.push(host.to_string());
        }
    }
    if let Some(days) = cli.days {
        config.validity_days = days;
    }
    if let Some(org) = &cli.organization {
        config.organization.clone_from(org);
    }
}
