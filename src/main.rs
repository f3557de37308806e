use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

use jobhost::api::{ErrorResponse, EVENT_STREAM};
use jobhost::config::{HostConfig, SandboxConfig, DEFAULT_LISTENER_BUFFER, DEFAULT_PORT};
use jobhost::job::{Job, JobConfig, JobEvent};
use jobhost::node::HostNode;
use jobhost::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "jobhost")]
#[command(version)]
#[command(about = "Host agent that supervises containerized jobs and streams their events")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the host agent
    Server(ServerArgs),

    /// Job management commands
    Job {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: JobCommands,
    },
}

// =============================================================================
// Server Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Port to listen on for the host API
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Container runtime binary
    #[arg(long, default_value = "docker")]
    runtime: String,

    /// Default image for jobs that do not name one
    #[arg(long, default_value = "alpine:latest")]
    image: String,

    /// Allow containers network access
    #[arg(long)]
    allow_network: bool,

    /// Events buffered per stream subscriber before events are dropped
    #[arg(long, default_value_t = DEFAULT_LISTENER_BUFFER)]
    listener_buffer: usize,
}

// =============================================================================
// Client Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Host API address
    #[arg(long, short = 'a', default_value = "http://127.0.0.1:1113")]
    addr: String,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(clap::Subcommand, Debug)]
enum JobCommands {
    /// List all jobs on the host
    List,
    /// Show one job
    Status { job_id: String },
    /// Start a job
    Run {
        job_id: String,

        /// Image to run (defaults to the host's image)
        #[arg(long)]
        image: Option<String>,

        /// Memory limit (e.g., "512m")
        #[arg(long)]
        memory: Option<String>,

        /// CPU limit (e.g., "1.5")
        #[arg(long)]
        cpus: Option<String>,

        /// Command and arguments
        #[arg(last = true)]
        cmd: Vec<String>,
    },
    /// Stop a job
    Stop { job_id: String },
    /// Stream job events (all jobs unless an id is given)
    Watch { job_id: Option<String> },
}

// =============================================================================
// Server Implementation
// =============================================================================

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let listen_addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    let sandbox = SandboxConfig {
        runtime: args.runtime,
        image: args.image,
        network_disabled: !args.allow_network,
        ..SandboxConfig::default()
    };
    let config = HostConfig::new(listen_addr)
        .with_listener_buffer(args.listener_buffer)
        .with_sandbox(sandbox);

    tracing::info!(
        listen_addr = %config.listen_addr,
        runtime = %config.sandbox.runtime,
        image = %config.sandbox.image,
        listener_buffer = config.listener_buffer,
        "Starting jobhost"
    );

    let shutdown = install_shutdown_handler()?;
    HostNode::new(config).run(shutdown).await?;
    Ok(())
}

// =============================================================================
// Client Command Handlers
// =============================================================================

fn jobs_url(client: &ClientArgs, id: Option<&str>) -> String {
    let base = client.addr.trim_end_matches('/');
    match id {
        Some(id) => format!("{}/host/jobs/{}", base, id),
        None => format!("{}/host/jobs", base),
    }
}

/// Turn an error response into a message on stderr and a non-zero exit.
async fn check(
    response: reqwest::Response,
) -> Result<reqwest::Response, Box<dyn std::error::Error>> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let message = match response.json::<ErrorResponse>().await {
        Ok(body) => body.error,
        Err(_) => status.to_string(),
    };
    eprintln!("Error: {}", message);
    std::process::exit(1);
}

fn print_job_table(jobs: &[Job]) {
    if jobs.is_empty() {
        println!("No jobs found.");
        return;
    }

    println!("{:<24} {:<10} {:<20} COMMAND", "JOB ID", "STATUS", "IMAGE");
    println!("{}", "-".repeat(78));
    for job in jobs {
        let image = job.config.image.as_deref().unwrap_or("-");
        let cmd = job.config.cmd.join(" ");
        let cmd_display = if cmd.chars().count() > 20 {
            format!("{}...", cmd.chars().take(17).collect::<String>())
        } else {
            cmd
        };
        println!(
            "{:<24} {:<10} {:<20} {}",
            job.id,
            job.status.to_string(),
            image,
            cmd_display
        );
    }
}

fn print_job_detail(job: &Job) {
    println!("Job ID:      {}", job.id);
    println!("Status:      {}", job.status);
    if job.force_stop {
        println!("Force Stop:  yes");
    }
    if let Some(image) = &job.config.image {
        println!("Image:       {}", image);
    }
    if !job.config.cmd.is_empty() {
        println!("Command:     {}", job.config.cmd.join(" "));
    }
    println!("Created:     {}", job.created_at);
    if let Some(started) = job.started_at {
        println!("Started:     {}", started);
    }
    if let Some(ended) = job.ended_at {
        println!("Ended:       {}", ended);
    }
    if let Some(exit_code) = job.exit_code {
        println!("Exit Code:   {}", exit_code);
    }
    if let Some(error) = &job.error {
        println!("Error:       {}", error);
    }
}

async fn handle_job_list(
    http: &reqwest::Client,
    client: &ClientArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = check(http.get(jobs_url(client, None)).send().await?).await?;
    let jobs: Vec<Job> = response.json().await?;

    match client.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&jobs)?),
        OutputFormat::Table => print_job_table(&jobs),
    }
    Ok(())
}

async fn handle_job_status(
    http: &reqwest::Client,
    client: &ClientArgs,
    job_id: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = check(http.get(jobs_url(client, Some(job_id))).send().await?).await?;
    let job: Job = response.json().await?;

    match client.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&job)?),
        OutputFormat::Table => print_job_detail(&job),
    }
    Ok(())
}

async fn handle_job_run(
    http: &reqwest::Client,
    client: &ClientArgs,
    job_id: &str,
    config: JobConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = check(
        http.put(jobs_url(client, Some(job_id)))
            .json(&config)
            .send()
            .await?,
    )
    .await?;
    let job: Job = response.json().await?;

    match client.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&job)?),
        OutputFormat::Table => println!("Job {} is {}", job.id, job.status),
    }
    Ok(())
}

async fn handle_job_stop(
    http: &reqwest::Client,
    client: &ClientArgs,
    job_id: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    check(http.delete(jobs_url(client, Some(job_id))).send().await?).await?;
    if let OutputFormat::Table = client.output {
        println!("Stop requested for job {}", job_id);
    }
    Ok(())
}

async fn handle_job_watch(
    http: &reqwest::Client,
    client: &ClientArgs,
    job_id: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut response = check(
        http.get(jobs_url(client, job_id))
            .header(reqwest::header::ACCEPT, EVENT_STREAM)
            .send()
            .await?,
    )
    .await?;

    let mut pending = String::new();
    while let Some(chunk) = response.chunk().await? {
        pending.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(end) = pending.find("\n\n") {
            let frame: String = pending.drain(..end + 2).collect();
            let Some(data) = frame.trim_end().strip_prefix("data: ") else {
                continue;
            };
            let event: JobEvent = serde_json::from_str(data)?;
            match client.output {
                OutputFormat::Json => println!("{}", data),
                OutputFormat::Table => println!(
                    "{:<6} {:<24} {}",
                    event.event.to_string(),
                    event.job_id,
                    event.job.status
                ),
            }
        }
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Server(server_args) => {
            run_server(server_args).await?;
        }
        Commands::Job { client, command } => {
            let http = reqwest::Client::new();

            match command {
                JobCommands::List => handle_job_list(&http, &client).await?,
                JobCommands::Status { job_id } => {
                    handle_job_status(&http, &client, &job_id).await?
                }
                JobCommands::Run {
                    job_id,
                    image,
                    memory,
                    cpus,
                    cmd,
                } => {
                    let config = JobConfig {
                        image,
                        cmd,
                        memory_limit: memory,
                        cpu_limit: cpus,
                    };
                    handle_job_run(&http, &client, &job_id, config).await?
                }
                JobCommands::Stop { job_id } => handle_job_stop(&http, &client, &job_id).await?,
                JobCommands::Watch { job_id } => {
                    handle_job_watch(&http, &client, job_id.as_deref()).await?
                }
            }
        }
    }

    Ok(())
}
