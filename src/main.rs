// src/main.rs

//! `spineldb-cli`: issue one command, or one transaction, and print the reply.

use anyhow::{Context, Result, anyhow, bail};
use spineldb_client::{Client, ClientConfig, Command};
use std::env;
use tracing::{debug, error};
use tracing_subscriber::filter::EnvFilter;

const USAGE: &str = "Usage: spineldb-cli [--config PATH] [--host HOST] [--port PORT] \
[--tls] [--insecure] [--multi] COMMAND [ARGS...]";

/// What the command line asked for.
#[derive(Debug, Default)]
struct CliArgs {
    config_path: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    tls: bool,
    insecure: bool,
    multi: bool,
    positional: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().skip(1).collect();
    if args.iter().any(|arg| arg == "--version") {
        println!("spineldb-cli version {VERSION}");
        return Ok(());
    }

    let cli = match parse_args(args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{e}\n{USAGE}");
            std::process::exit(2);
        }
    };

    let config = load_config(&cli)?;

    // Logs go to stderr so stdout carries only the reply.
    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .with_writer(std::io::stderr)
        .compact()
        .init();

    if let Err(e) = run(&cli, &config).await {
        error!("{e:#}");
        return Err(e);
    }
    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<CliArgs> {
    let mut cli = CliArgs::default();
    let mut iter = args.into_iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => cli.config_path = Some(flag_value(&mut iter, "--config")?),
            "--host" => cli.host = Some(flag_value(&mut iter, "--host")?),
            "--port" => {
                let value = flag_value(&mut iter, "--port")?;
                let port = value
                    .parse::<u16>()
                    .map_err(|_| anyhow!("Invalid port number: {value}"))?;
                cli.port = Some(port);
            }
            "--tls" => cli.tls = true,
            "--insecure" => cli.insecure = true,
            "--multi" => cli.multi = true,
            _ => {
                cli.positional.push(arg);
                cli.positional.extend(iter.by_ref());
            }
        }
    }

    if cli.positional.is_empty() {
        bail!("No command given");
    }
    Ok(cli)
}

fn flag_value(iter: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    iter.next()
        .ok_or_else(|| anyhow!("{flag} flag requires a value"))
}

fn load_config(cli: &CliArgs) -> Result<ClientConfig> {
    let mut config = match &cli.config_path {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::default(),
    };

    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if cli.tls {
        config.tls.enabled = true;
    }
    if cli.insecure {
        config.tls.skip_verification = true;
    }
    config.validate()?;
    Ok(config)
}

async fn run(cli: &CliArgs, config: &ClientConfig) -> Result<()> {
    let mut client = Client::connect(config)
        .await
        .with_context(|| format!("Failed to connect to {}", config.address()))?;

    let reply = if cli.multi {
        let mut tx = client.begin_transaction();
        for line in &cli.positional {
            let mut words = line.split_whitespace();
            let Some(verb) = words.next() else {
                continue;
            };
            tx.queue(Command::new(verb).args(words));
        }
        debug!("Committing {} commands", tx.len());
        tx.commit().await?
    } else {
        let mut words = cli.positional.iter();
        let verb = words.next().context("No command given")?;
        client.issue(Command::new(verb.as_str()).args(words)).await?
    };

    println!("{reply}");
    client.close().await;
    Ok(())
}
