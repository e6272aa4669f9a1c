use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;
use log::debug;
use tokio_util::sync::CancellationToken;

use rediscloud_api::ClientConfig;
use rediscloud_core::provider::Provider;
use rediscloud_core::resource::{Resource, ResourceId, State, Value};
use rediscloud_provider::{RedisCloudProvider, Tasks};
use rediscloud_provider::resources::{PEERING, SUBSCRIPTION};

#[derive(Parser)]
#[command(name = "rediscloud")]
#[command(about = "Drive Redis Cloud tasks and Active-Active resources", long_about = None)]
struct Cli {
    /// Override the operation timeout, in seconds; also bounds task waits
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Timeout of a single HTTP request, in seconds
    #[arg(long, global = true)]
    request_timeout: Option<u64>,

    /// Resource name used in messages
    #[arg(long, global = true, default_value = "cli")]
    name: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and wait for asynchronous tasks
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Manage Active-Active subscriptions
    Subscription {
        #[command(subcommand)]
        command: ResourceCommands,
    },
    /// Manage Active-Active subscription peerings
    Peering {
        #[command(subcommand)]
        command: ResourceCommands,
    },
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Fetch a task once
    Get { id: String },
    /// Wait until a task completes
    Wait { id: String },
    /// Wait until a task completes and print the resource id it produced
    ResourceId { id: String },
}

#[derive(Subcommand)]
enum ResourceCommands {
    /// Create from a JSON file of attributes
    Create { file: PathBuf },
    /// Read by identifier
    Read { id: String },
    /// Update from a JSON file of attributes
    Update { id: String, file: PathBuf },
    /// Delete by identifier
    Delete { id: String },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = ClientConfig::from_env().context("Failed to load client configuration")?;
    if let Some(seconds) = cli.request_timeout {
        config = config.with_request_timeout(Duration::from_secs(seconds));
    }
    let timeout = cli.timeout.map(Duration::from_secs);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupt received, cancelling");
            ctrl_c.cancel();
        }
    });

    let mut provider = RedisCloudProvider::from_config(&config)
        .context("Failed to create API client")?
        .with_cancellation(cancel);
    if let Some(timeout) = timeout {
        provider = provider.with_timeout(timeout);
    }

    match cli.command {
        Commands::Task { command } => {
            let tasks = task_poller(&provider, timeout);
            run_task_command(&tasks, provider.cancellation_token(), command).await
        }
        Commands::Subscription { command } => {
            run_resource_command(&provider, SUBSCRIPTION, &cli.name, command).await
        }
        Commands::Peering { command } => {
            run_resource_command(&provider, PEERING, &cli.name, command).await
        }
    }
}

/// Task poller bounded by the operation timeout, if one was given
fn task_poller(provider: &RedisCloudProvider, timeout: Option<Duration>) -> Tasks {
    let tasks = provider.tasks();
    match timeout {
        Some(limit) => tasks.with_time_limit(limit),
        None => tasks,
    }
}

async fn run_task_command(
    tasks: &Tasks,
    cancel: &CancellationToken,
    command: TaskCommands,
) -> Result<()> {
    match command {
        TaskCommands::Get { id } => {
            let task = tasks.get(&id).await?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        TaskCommands::Wait { id } => {
            println!("{}", format!("Waiting for task {}...", id).cyan());
            let task = tasks.wait_for_task_to_complete(&id, cancel).await?;
            println!("{}", "Task completed.".green().bold());
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        TaskCommands::ResourceId { id } => {
            let resource_id = tasks.wait_for_resource_id(&id, cancel).await?;
            println!("{}", resource_id);
        }
    }
    Ok(())
}

async fn run_resource_command(
    provider: &RedisCloudProvider,
    resource_type: &str,
    name: &str,
    command: ResourceCommands,
) -> Result<()> {
    let id = ResourceId::new(resource_type, name);

    match command {
        ResourceCommands::Create { file } => {
            let resource = load_resource(&file, &id)?;
            println!("{}", format!("Creating {}...", resource_type).cyan().bold());
            let state = provider.create(&resource).await?;
            println!("{}", "Created.".green().bold());
            print_state(&state);
        }
        ResourceCommands::Read { id: identifier } => {
            let state = provider.read(&id, &identifier).await?;
            if !state.exists {
                println!("{}", format!("{} {} not found.", resource_type, identifier).yellow());
                return Ok(());
            }
            print_state(&state);
        }
        ResourceCommands::Update {
            id: identifier,
            file,
        } => {
            let resource = load_resource(&file, &id)?;
            let current = provider.read(&id, &identifier).await?;
            if !current.exists {
                bail!("{} {} does not exist", resource_type, identifier);
            }
            println!("{}", format!("Updating {} {}...", resource_type, identifier).cyan().bold());
            let state = provider
                .update(&id, &identifier, &current, &resource)
                .await?;
            println!("{}", "Updated.".green().bold());
            print_state(&state);
        }
        ResourceCommands::Delete { id: identifier } => {
            println!("{}", format!("Deleting {} {}...", resource_type, identifier).red().bold());
            provider.delete(&id, &identifier).await?;
            println!("{}", "Deleted.".green().bold());
        }
    }
    Ok(())
}

/// Read a JSON object of attributes into a resource
fn load_resource(path: &Path, id: &ResourceId) -> Result<Resource> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let json: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    attributes_from_json(&json)
        .map(|attributes| Resource {
            id: id.clone(),
            attributes,
        })
        .with_context(|| format!("Invalid attributes in {}", path.display()))
}

fn attributes_from_json(json: &serde_json::Value) -> Result<HashMap<String, Value>> {
    match Value::from_json(json) {
        Some(Value::Map(attributes)) => Ok(attributes),
        _ => Err(anyhow!("expected a JSON object of attributes")),
    }
}

fn print_state(state: &State) {
    if let Some(identifier) = &state.identifier {
        println!("{} {}", "id:".bold(), identifier);
    }
    let mut keys: Vec<_> = state.attributes.keys().collect();
    keys.sort();
    for key in keys {
        println!("  {}: {}", key, format_value(&state.attributes[key]));
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        Value::Int(n) => n.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::List(items) => {
            let strs: Vec<_> = items.iter().map(format_value).collect();
            format!("[{}]", strs.join(", "))
        }
        Value::Map(map) => {
            let mut strs: Vec<_> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", k, format_value(v)))
                .collect();
            strs.sort();
            format!("{{{}}}", strs.join(", "))
        }
    }
}
