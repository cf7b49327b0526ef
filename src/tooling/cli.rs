//! CLI Tooling
//!
//! Command-line interface over the mirror: build it, follow a local directory,
//! and inspect records and the audit log.

use crate::config::{ConfigLoader, MirrorConfig};
use crate::error::{MirrorError, Result};
use crate::event::log::EventLog;
use crate::inode::Inode;
use crate::indexer::IndexStats;
use crate::manager::MirrorManager;
use crate::namespace::local::LocalNamespace;
use crate::path::InodePath;
use crate::store::MetadataStore;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use comfy_table::Table;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Namespace mirror: indexes a namespace into a document store and keeps it current
#[derive(Parser)]
#[command(name = "nsmirror")]
#[command(about = "Mirror a namespace's metadata with aggregated disk usage")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (overrides the user config file)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Local directory backing the namespace
    #[arg(long, global = true)]
    pub local_root: Option<PathBuf>,

    /// Sled store directory
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long, global = true)]
    pub log_output: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Rebuild the mirror from the local namespace
    Index,
    /// Rebuild the mirror, then apply changes until stopped
    Run {
        /// Stop after this many seconds (default: wait for a line on stdin)
        #[arg(long)]
        duration_secs: Option<u64>,
    },
    /// Show the record stored for a path
    Get {
        path: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// List the records directly under a path
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// List the audit log of applied events
    Events {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
        /// Show at most this many of the latest events
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
}

impl Cli {
    /// Load configuration and apply command-line overrides.
    pub fn load_config(&self) -> Result<MirrorConfig> {
        let mut config = ConfigLoader::load(self.config.as_deref())?;
        if let Some(local_root) = &self.local_root {
            config.namespace.local_root = local_root.clone();
        }
        if let Some(store) = &self.store {
            config.storage.store_path = Some(store.clone());
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.logging.format = format.clone();
        }
        if let Some(output) = &self.log_output {
            config.logging.output = output.clone();
        }
        Ok(config)
    }
}

/// Opened resources shared by the commands that touch the store.
struct Storage {
    store: Arc<MetadataStore>,
    events: Arc<EventLog>,
}

pub struct CliContext {
    config: MirrorConfig,
}

impl CliContext {
    pub fn new(config: MirrorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    fn open_storage(&self) -> Result<Storage> {
        let db = self.config.storage.open_db()?;
        Ok(Storage {
            store: Arc::new(MetadataStore::open(&db, &self.config.storage.collection)?),
            events: Arc::new(EventLog::open(&db, &self.config.storage.event_pool)?),
        })
    }

    fn manager(&self, storage: &Storage) -> Result<(MirrorManager, LocalNamespace)> {
        let namespace = LocalNamespace::new(&self.config.namespace.local_root)?;
        let mut manager = MirrorManager::new(
            Arc::clone(&storage.store),
            Arc::new(namespace.clone()),
            self.config.namespace.root_path()?,
        )
        .with_poll_interval(self.config.processor.poll_interval())
        .with_temporary_suffix(self.config.processor.temporary_suffix.clone());
        if self.config.processor.audit_events {
            manager = manager.with_audit_log(Arc::clone(&storage.events));
        }
        Ok((manager, namespace))
    }

    /// Execute a CLI command and return its rendered output.
    pub fn execute(&self, command: &Commands) -> Result<String> {
        let started = Instant::now();
        let result = self.execute_inner(command);
        info!(
            command = command_name(command),
            ok = result.is_ok(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Command finished"
        );
        result
    }

    fn execute_inner(&self, command: &Commands) -> Result<String> {
        match command {
            Commands::Index => {
                let storage = self.open_storage()?;
                let (manager, _) = self.manager(&storage)?;
                let stats = manager.reindex()?;
                Ok(format_index_stats(&stats))
            }
            Commands::Run { duration_secs } => {
                let storage = self.open_storage()?;
                let (mut manager, namespace) = self.manager(&storage)?;
                let stream = namespace.watch()?;
                let stats = manager.start(Box::new(stream))?;
                eprintln!("{}", format_index_stats(&stats));
                match duration_secs {
                    Some(secs) => std::thread::sleep(Duration::from_secs(*secs)),
                    None => {
                        eprintln!("Following changes, press Enter to stop");
                        let mut line = String::new();
                        std::io::stdin()
                            .read_line(&mut line)
                            .map_err(|e| MirrorError::Processor(e.to_string()))?;
                    }
                }
                manager.stop()?;
                Ok(format!(
                    "Stopped; mirror holds {} records",
                    storage.store.count()?
                ))
            }
            Commands::Get { path, format } => {
                let storage = self.open_storage()?;
                let path = InodePath::parse(path)?;
                let inode = storage
                    .store
                    .get(&path)?
                    .ok_or_else(|| MirrorError::MissingRecord(path.to_string()))?;
                match format.as_str() {
                    "json" => Ok(serde_json::to_string_pretty(&inode)?),
                    _ => Ok(format_inode_text(&inode)),
                }
            }
            Commands::Ls { path } => {
                let storage = self.open_storage()?;
                let path = InodePath::parse(path)?;
                let children = storage.store.children(&path)?;
                if children.is_empty() && storage.store.get(&path)?.is_none() {
                    return Err(MirrorError::MissingRecord(path.to_string()));
                }
                Ok(format_listing(&children))
            }
            Commands::Events { format, limit } => {
                let storage = self.open_storage()?;
                let mut records = storage.events.records()?;
                if let Some(limit) = limit {
                    let skip = records.len().saturating_sub(*limit);
                    records.drain(..skip);
                }
                if format == "json" {
                    return Ok(serde_json::to_string_pretty(&records)?);
                }
                let mut table = Table::new();
                table.load_preset(comfy_table::presets::UTF8_FULL);
                table.set_header(vec!["Txid", "Seq", "Kind", "Path"]);
                for r in &records {
                    table.add_row(vec![
                        r.transaction_id.to_string(),
                        r.sequence.to_string(),
                        r.event_type.to_string(),
                        r.event.path().to_string(),
                    ]);
                }
                Ok(table.to_string())
            }
            Commands::Config {
                command: ConfigCommands::Show,
            } => self.config.to_toml(),
        }
    }
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Index => "index",
        Commands::Run { .. } => "run",
        Commands::Get { .. } => "get",
        Commands::Ls { .. } => "ls",
        Commands::Events { .. } => "events",
        Commands::Config { .. } => "config",
    }
}

fn format_time(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn format_index_stats(stats: &IndexStats) -> String {
    format!(
        "Indexed {} directories and {} files ({} bytes) in {:.1} ms",
        stats.directories,
        stats.files,
        stats.disk_usage,
        stats.elapsed.as_secs_f64() * 1e3
    )
}

fn format_inode_text(inode: &Inode) -> String {
    let mut output = String::new();
    output.push_str(&format!("Path:        {}\n", inode.path));
    output.push_str(&format!("Type:        {}\n", inode.kind));
    output.push_str(&format!("Size:        {}\n", inode.size));
    output.push_str(&format!("Disk usage:  {}\n", inode.disk_usage));
    output.push_str(&format!("Block size:  {}\n", inode.block_size));
    output.push_str(&format!("Replication: {}\n", inode.replication_factor));
    output.push_str(&format!(
        "Owner:       {}:{} {}\n",
        inode.owner, inode.group, inode.permission
    ));
    output.push_str(&format!(
        "Modified:    {}\n",
        format_time(inode.modification_time)
    ));
    output.push_str(&format!("Accessed:    {}\n", format_time(inode.access_time)));
    output.push_str(&format!("Id:          {}", inode.id));
    output
}

fn format_listing(children: &[Inode]) -> String {
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec![
        "Type",
        "Permission",
        "Owner",
        "Group",
        "Size",
        "Disk Usage",
        "Modified",
        "Name",
    ]);
    for inode in children {
        table.add_row(vec![
            inode.kind.to_string(),
            inode.permission.clone(),
            inode.owner.clone(),
            inode.group.clone(),
            inode.size.to_string(),
            inode.disk_usage.to_string(),
            format_time(inode.modification_time),
            inode.name.clone(),
        ]);
    }
    table.to_string()
}
