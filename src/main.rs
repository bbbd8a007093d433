//! Execlink CLI - run shell commands on a remote execution host.
//!
//! This is the binary entry point. See the `execlink` library for the
//! protocol engine.

use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use execlink::{CommandClient, Config, JobStatus};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "execlink")]
#[command(version)]
#[command(about = "Run shell commands on a remote execution host")]
struct Cli {
    /// WebSocket URL of the execution host (overrides config)
    #[arg(long)]
    server: Option<String>,

    /// Job timeout in seconds (overrides config)
    #[arg(long)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one command, stream its output, and exit with its exit code
    Run {
        /// Command text (joined with spaces)
        #[arg(required = true)]
        command: Vec<String>,
    },
    /// Interactive session (`:kill`, `:status`, `:reconnect`, `:quit`)
    Shell,
    /// Print the effective configuration as JSON
    Config,
}

/// How long to wait for the socket before giving up: one connect attempt
/// plus the full automatic retry schedule.
fn connect_budget(config: &Config) -> Duration {
    config.connect_timeout()
        + (config.connect_timeout() + config.reconnect_delay()) * config.max_reconnect_attempts
}

async fn connect_client(config: Config) -> Result<CommandClient> {
    let budget = connect_budget(&config);
    let client = CommandClient::new(config);
    client.connect()?;
    client.wait_connected(budget).await?;
    Ok(client)
}

/// Stream one job to stdout/stderr and return the process exit code.
async fn run_one(client: &CommandClient, command: String) -> Result<i32> {
    let mut handle = client.execute(command).await?;
    while let Some(line) = handle.next_line().await {
        if line.is_error {
            eprintln!("{}", line.text);
        } else {
            println!("{}", line.text);
        }
    }
    let outcome = handle.outcome().await?;
    match outcome.status {
        JobStatus::Done => Ok(outcome.exit_code.unwrap_or(0)),
        JobStatus::Killed => {
            eprintln!("job killed");
            Ok(130)
        }
        JobStatus::TimedOut => {
            eprintln!("job timed out");
            Ok(124)
        }
        JobStatus::Error => {
            eprintln!(
                "job failed: {}",
                outcome.error.as_deref().unwrap_or("unknown error")
            );
            Ok(1)
        }
        status => {
            eprintln!("job ended in unexpected state {status}");
            Ok(1)
        }
    }
}

async fn run_shell(client: CommandClient) -> Result<()> {
    // Print connection transitions so a dropped host is visible mid-session.
    let mut status_rx = client.subscribe();
    tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let status = status_rx.borrow_and_update().clone();
            eprintln!("[connection] {}", status.state);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    eprintln!("connected. Type a command, or :kill / :status / :reconnect / :quit");
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        match input {
            "" => {}
            ":quit" | ":q" => break,
            ":kill" => client.kill_current_job()?,
            ":status" => {
                let status = client.status();
                let busy = client.has_running_job().await?;
                eprintln!(
                    "[connection] {} (session: {}, job running: {busy})",
                    status.state,
                    status.session_id.as_deref().unwrap_or("none")
                );
                if busy {
                    client.check_job_status()?;
                }
            }
            ":reconnect" => client.force_reconnect()?,
            meta if meta.starts_with(':') => {
                eprintln!("unknown command {meta}");
            }
            command => match run_one(&client, command.to_string()).await {
                Ok(code) if code != 0 => eprintln!("exit code {code}"),
                Ok(_) => {}
                Err(e) => eprintln!("error: {e}"),
            },
        }
    }
    client.disconnect()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(server) = cli.server {
        config.server_url = server;
    }
    if let Some(secs) = cli.timeout {
        config.job_timeout_ms = secs * 1000;
    }

    match cli.command {
        Commands::Run { command } => {
            let client = connect_client(config).await?;
            let code = run_one(&client, command.join(" ")).await?;
            client.disconnect()?;
            std::process::exit(code);
        }
        Commands::Shell => {
            let client = connect_client(config).await?;
            run_shell(client).await?;
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
