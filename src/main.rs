//! hpcjob CLI
//!
//! Entry point for the `hpcjob` command-line tool.

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use hpcjob::{
    ClientConfig, ConfigOverrides, InterruptHandler, Job, JobClient, JobConfigUpdate, JobError,
    RegisterOptions, ResultRetrieval,
};
use hpcjob_protocol::{Event, LogEntry};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Exit code for unusable configuration
const EXIT_CODE_CONFIG: i32 = 2;

#[derive(Parser)]
#[command(name = "hpcjob")]
#[command(about = "Submit and track jobs on an HPC orchestration service", version)]
struct Cli {
    /// Path to config file (default: ~/.config/hpcjob/config.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Service base URL (overrides config)
    #[arg(long, global = true)]
    server: Option<String>,

    /// Directory of job_constructor_<id>.json files (overrides config)
    #[arg(long, global = true)]
    identity_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new job and write its constructor file
    Register {
        #[arg(long)]
        maintainer: String,

        /// Target HPC (service default if omitted)
        #[arg(long)]
        hpc: Option<String>,

        /// Legacy HPC login
        #[arg(long)]
        user: Option<String>,

        /// Legacy HPC password (discouraged)
        #[arg(long)]
        password: Option<String>,
    },

    /// Configure and submit a registered job
    Submit {
        #[arg(long)]
        id: String,

        /// Folder to package and upload as the executable
        #[arg(long)]
        executable: Option<PathBuf>,

        #[arg(long)]
        data_folder: Option<String>,

        #[arg(long)]
        result_folder: Option<String>,

        /// Job parameter as key=value (repeatable)
        #[arg(long = "param", value_parser = parse_key_val)]
        params: Vec<(String, Value)>,

        /// Environment variable as key=value (repeatable)
        #[arg(long = "env", value_parser = parse_key_val)]
        envs: Vec<(String, Value)>,

        /// Scheduler setting as key=value (repeatable)
        #[arg(long = "slurm", value_parser = parse_key_val)]
        slurm: Vec<(String, Value)>,
    },

    /// Show a job's status
    Status {
        #[arg(long)]
        id: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show a job's events
    Events {
        #[arg(long)]
        id: String,

        /// Follow until the job ends
        #[arg(long)]
        live: bool,

        /// Refresh interval in seconds (default from config)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Show a job's logs
    Logs {
        #[arg(long)]
        id: String,

        /// Follow until the job ends
        #[arg(long)]
        live: bool,

        /// Refresh interval in seconds (default from config)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Retrieve a job's result folder
    Download {
        #[arg(long)]
        id: String,

        /// Destination directory
        #[arg(long, default_value = ".")]
        dest: PathBuf,
    },

    /// Show the status of a federated result transfer
    TransferStatus {
        #[arg(long)]
        id: String,
    },

    /// List service announcements
    Announcements,
}

/// Parse `key=value`; the value is JSON if it parses as JSON, else a string
fn parse_key_val(s: &str) -> Result<(String, Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {:?}", s))?;
    if key.is_empty() {
        return Err(format!("empty key in {:?}", s));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hpcjob=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match ClientConfig::resolve(&ConfigOverrides {
        config_path: cli.config.clone(),
        server_url: cli.server.clone(),
        identity_dir: cli.identity_dir.clone(),
    }) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(EXIT_CODE_CONFIG);
        }
    };

    let client = match JobClient::from_config(&config) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    };

    if let Err(e) = run(cli.command, &client, &config) {
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}

fn run(command: Commands, client: &JobClient, config: &ClientConfig) -> Result<(), JobError> {
    match command {
        Commands::Register {
            maintainer,
            hpc,
            user,
            password,
        } => {
            let job = client.register(RegisterOptions {
                maintainer: Some(maintainer),
                hpc,
                user,
                password,
            })?;
            if let Some(header) = job.header() {
                println!("Job ID:     {}", header.id);
                println!("HPC:        {}", header.hpc);
                println!("Maintainer: {}", header.maintainer);
            }
            Ok(())
        }
        Commands::Submit {
            id,
            executable,
            data_folder,
            result_folder,
            params,
            envs,
            slurm,
        } => {
            let mut job = client.restore(&id)?;
            let mut update = JobConfigUpdate::new();
            for (k, v) in params {
                update = update.param(k, v);
            }
            for (k, v) in envs {
                update = update.env(k, v);
            }
            for (k, v) in slurm {
                update = update.slurm(k, v);
            }
            update.data_folder = data_folder;
            update.result_folder = result_folder;
            job.configure(update);

            if let Some(dir) = executable {
                job.upload_executable_folder(&dir)?;
            }
            let record = job.submit()?;
            print_json(&record)
        }
        Commands::Status { id, json } => {
            let status = client.restore(&id)?.status()?;
            if json {
                return print_json(&status);
            }
            println!("Job ID:     {}", status.record.id);
            println!("HPC:        {}", status.record.hpc);
            println!("Maintainer: {}", status.record.maintainer);
            println!("Events:     {}", status.events.len());
            println!("Logs:       {}", status.logs.len());
            if let Some(event) = status.terminal_event() {
                println!("Finished:   {} {}", event.event_type, event.message);
            }
            if let Some(folder) = &status.record.result_folder {
                println!("Results:    {}", folder);
            }
            Ok(())
        }
        Commands::Events { id, live, interval } => {
            let job = client.restore(&id)?;
            if !live {
                job.events()?.iter().for_each(print_event);
                return Ok(());
            }
            print_header(&job);
            let interval = interval.map_or_else(|| config.events_interval(), Duration::from_secs);
            for event in job.watch_events(interval, interrupt_token()) {
                print_event(&event?);
            }
            Ok(())
        }
        Commands::Logs { id, live, interval } => {
            let job = client.restore(&id)?;
            if !live {
                job.logs()?.iter().for_each(print_log);
                return Ok(());
            }
            print_header(&job);
            let interval = interval.map_or_else(|| config.logs_interval(), Duration::from_secs);
            for entry in job.watch_logs(interval, interrupt_token()) {
                print_log(&entry?);
            }
            Ok(())
        }
        Commands::Download { id, dest } => {
            match client.restore(&id)?.download_result_folder(&dest)? {
                ResultRetrieval::Local(path) => {
                    println!("file successfully downloaded under: {}", path.display());
                    Ok(())
                }
                ResultRetrieval::Transfer(response) => print_json(&response),
            }
        }
        Commands::TransferStatus { id } => print_json(&client.restore(&id)?.query_transfer_status()?),
        Commands::Announcements => {
            for a in client.announcements()? {
                println!("[{}] {}: {}", a.time_stamp, a.poster, a.message);
            }
            Ok(())
        }
    }
}

/// Install the Ctrl-C handler and return the token it trips
fn interrupt_token() -> hpcjob::CancelToken {
    let handler = InterruptHandler::new();
    if let Err(e) = handler.install() {
        warn!("failed to install interrupt handler: {}", e);
    }
    handler.token()
}

fn print_header(job: &Job) {
    if let Some(header) = job.header() {
        println!("Job ID: {}  HPC: {}  Maintainer: {}", header.id, header.hpc, header.maintainer);
    }
}

fn print_event(event: &Event) {
    let time = event
        .created_at
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();
    println!("{} {} {}", time, event.event_type, event.message);
}

fn print_log(entry: &LogEntry) {
    let time = entry
        .created_at
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();
    println!("{} {}", time, entry.message);
}

fn print_json<T: Serialize>(value: &T) -> Result<(), JobError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| JobError::Protocol(format!("failed to serialize output: {}", e)))?;
    println!("{}", json);
    Ok(())
}
