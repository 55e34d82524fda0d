//! pia-wg-config: WireGuard config generator for Private Internet Access
//!
//! Parses arguments, sets up logging, and runs the provisioning pipeline.
//! The config goes to stdout or a file; logs and diagnostics go to stderr.

use anyhow::{Result, bail};
use clap::parser::ValueSource;
use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use piawg_vpn::{
    Credentials, DEFAULT_REGION, GenerateError, HttpClient, HttpClientConfig, KeyPair,
    ProviderEndpoints, ProvisionOptions, Region, ServerDirectory,
};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, info};

mod output;

// Use mimalloc as the global allocator
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Generate a WireGuard config for Private Internet Access
#[derive(Parser)]
#[command(name = "pia-wg-config")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// PIA username
    #[arg(env = "PIA_USERNAME")]
    username: Option<String>,

    /// PIA password
    #[arg(env = "PIA_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// The file to write the WireGuard config to (default: stdout)
    #[arg(short, long)]
    outfile: Option<PathBuf>,

    /// Region to connect to (use the 'regions' command to list them)
    #[arg(short, long, default_value = DEFAULT_REGION)]
    region: String,

    /// Add the metadata server's name to the config as ServerCommonName
    #[arg(short, long)]
    server: bool,

    /// Use this WireGuard private key (base64) instead of generating one
    #[arg(long)]
    private_key: Option<String>,

    /// Public key to register; requires --private-key
    #[arg(long, requires = "private_key")]
    public_key: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, Subcommand)]
enum Commands {
    /// List all available PIA regions
    #[command(alias = "r")]
    Regions,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match parse_cli(std::env::args_os()) {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    };

    // Initialize logging (stderr, so stdout stays clean for the config)
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match &cli.command {
        Some(Commands::Regions) => list_regions(&cli).await,
        None => generate(&cli).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Parse arguments, letting a leading `regions` win over the USERNAME slot.
///
/// With `args_conflicts_with_subcommands`, clap stops matching subcommand
/// names once any option has been seen, so `-v regions` would otherwise
/// bind `regions` as the username.
fn parse_cli<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = Cli::command().try_get_matches_from(args)?;
    let mut cli = Cli::from_arg_matches(&matches)?;

    if cli.command.is_none() && matches.value_source("username") == Some(ValueSource::CommandLine) {
        let command = cli.username.as_deref().and_then(|name| {
            Cli::command()
                .find_subcommand(name)
                .and_then(|sc| Commands::from_subcommand_name(sc.get_name()))
        });
        if command.is_some() {
            cli.command = command;
            cli.username = None;
            cli.password = None;
        }
    }

    Ok(cli)
}

impl Commands {
    fn from_subcommand_name(name: &str) -> Option<Self> {
        match name {
            "regions" => Some(Commands::Regions),
            _ => None,
        }
    }
}

fn http_config(cli: &Cli) -> HttpClientConfig {
    HttpClientConfig {
        timeout: Duration::from_secs(cli.timeout),
        ..HttpClientConfig::default()
    }
}

async fn list_regions(cli: &Cli) -> Result<()> {
    eprintln!("Fetching available regions from PIA...");

    let http = HttpClient::new(http_config(cli));
    let endpoints = ProviderEndpoints::default();
    let directory = ServerDirectory::fetch(&http, &endpoints.server_list_url).await?;

    println!("{}", output::format_regions(directory.regions()));
    Ok(())
}

fn key_pair(cli: &Cli) -> Result<Option<KeyPair>> {
    let pair = match (&cli.private_key, &cli.public_key) {
        (Some(private), Some(public)) => Some(KeyPair::from_strings(private.as_str(), public.as_str())?),
        (Some(private), None) => Some(KeyPair::from_private_base64(private)?),
        (None, Some(_)) => bail!("--public-key requires --private-key"),
        (None, None) => None,
    };
    Ok(pair)
}

async fn generate(cli: &Cli) -> Result<()> {
    let (Some(username), Some(password)) = (&cli.username, &cli.password) else {
        eprintln!("Error: Username and password are required\n");
        eprintln!("Usage:");
        eprintln!("  pia-wg-config [OPTIONS] USERNAME PASSWORD\n");
        eprintln!("Examples:");
        eprintln!("  pia-wg-config myuser mypass");
        eprintln!("  pia-wg-config -r uk_london myuser mypass");
        eprintln!("  pia-wg-config -o config.conf -r de_frankfurt myuser mypass\n");
        eprintln!("To see available regions:");
        eprintln!("  pia-wg-config regions");
        bail!("missing credentials");
    };

    let credentials = Credentials::new(username.as_str(), password.as_str());
    if !credentials.is_complete() {
        bail!("Username and password cannot be empty");
    }

    let mut options = ProvisionOptions::new(credentials, Region::new(cli.region.as_str()));
    options.http = http_config(cli);
    options.generator.server_name = cli.server;
    options.generator.key_pair = key_pair(cli)?;

    info!("Generating WireGuard config for region {}", cli.region);
    let config = match piawg_vpn::provision(options).await {
        Ok(config) => config,
        Err(e) => {
            report_failure(&e, &cli.region, cli.verbose);
            return Err(e.into());
        }
    };

    match &cli.outfile {
        Some(path) => {
            output::write_config(path, &config)?;
            debug!("WireGuard config written to {}", path.display());
            eprintln!("✓ WireGuard config generated successfully: {}", path.display());
            eprintln!("You can now connect using: sudo wg-quick up {}", path.display());
        }
        None => println!("{}", config),
    }

    Ok(())
}

fn report_failure(err: &GenerateError, region: &str, verbose: bool) {
    let hints = output::failure_hints(err, region);
    if hints.is_empty() {
        return;
    }

    let stage = err.stage().map(|s| s.to_string()).unwrap_or_default();
    eprintln!("Failed to generate WireGuard configuration ({} stage)", stage);
    eprintln!("This could be due to:");
    for hint in hints {
        eprintln!("  - {}", hint);
    }
    if !verbose {
        eprintln!("\nTry running with -v flag for more details");
    }
}
