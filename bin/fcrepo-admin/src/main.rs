//! fcrepo Admin - Command line tools for storage and journals
//!
//! Works directly on the configured stores and journal directories, so it
//! is meant to run while the repository is stopped (or on a follower).

use anyhow::{Context as _, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use fcrepo_common::config::TransportConfig;
use fcrepo_common::{CachedDocument, Config, Pid, StoreKey};
use fcrepo_journal::{
    Argument, JournalFileReader, JournalReceiver, JournalRecovery, StorageDelegate, journal_files,
};
use fcrepo_storage::{AuditReport, LowlevelStorage, RebuildReport, Store};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "fcrepo-admin")]
#[command(about = "fcrepo storage and journal administration")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/fcrepo/fcrepo.toml", env = "FCREPO_CONFIG")]
    config: PathBuf,

    /// Log level (overrides the config file)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Digital object operations
    Object {
        #[command(subcommand)]
        action: ObjectCommands,
    },
    /// Datastream content operations
    Datastream {
        #[command(subcommand)]
        action: DatastreamCommands,
    },
    /// Path registry maintenance
    Registry {
        #[command(subcommand)]
        action: RegistryCommands,
    },
    /// Journal inspection, replay and reception
    Journal {
        #[command(subcommand)]
        action: JournalCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ObjectCommands {
    /// Store a new object from a file
    Add { pid: String, file: PathBuf },
    /// Replace an existing object
    Replace { pid: String, file: PathBuf },
    /// Write an object to a file or stdout
    Get {
        pid: String,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Delete an object and all of its datastreams
    Remove { pid: String },
    /// Show whether an object exists, its size and digest
    Stat { pid: String },
}

#[derive(Subcommand, Debug)]
enum DatastreamCommands {
    /// Store a datastream version (`pid+dsId+versionId`) from a file
    Add { key: String, file: PathBuf },
    /// Write a datastream version to a file or stdout
    Get {
        key: String,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Delete a datastream version
    Remove { key: String },
    /// List the stored datastream versions of an object
    List { pid: String },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StoreSelector {
    Objects,
    Datastreams,
    All,
}

#[derive(Subcommand, Debug)]
enum RegistryCommands {
    /// Check that every registered file exists
    AuditFiles {
        #[arg(long, value_enum, default_value = "all")]
        store: StoreSelector,
    },
    /// Check that every file is registered at the expected path
    AuditRegistry {
        #[arg(long, value_enum, default_value = "all")]
        store: StoreSelector,
    },
    /// Rebuild the registry from the files on disk
    Rebuild {
        #[arg(long, value_enum, default_value = "all")]
        store: StoreSelector,
    },
}

#[derive(Subcommand, Debug)]
enum JournalCommands {
    /// List the complete journal files in a directory
    Files {
        /// Journal directory (default: first local transport)
        dir: Option<PathBuf>,
    },
    /// Print the entries of one journal file
    Dump {
        file: PathBuf,
        /// One JSON object per entry
        #[arg(long)]
        json: bool,
    },
    /// Replay journal files into the configured storage
    Recover {
        /// Journal directory (default: first local transport)
        dir: Option<PathBuf>,
        /// Skip entries up to and including this sequence
        #[arg(long)]
        after: Option<u64>,
    },
    /// Receive a journal stream from a remote transport
    Receive {
        #[arg(short, long, default_value = "0.0.0.0:9300")]
        listen: SocketAddr,
        /// Directory to write received journal files into
        #[arg(short, long)]
        dir: PathBuf,
        /// Exit after one connection
        #[arg(long)]
        once: bool,
    },
}

/// `None` when the file does not exist
fn load_config(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }
    let document = CachedDocument::config(path, Duration::from_secs(5));
    let config = document
        .get()
        .with_context(|| format!("loading {}", path.display()))?;
    Ok(Some(config.as_ref().clone()))
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load config file if it exists
    let loaded = load_config(&args.config)?;
    let found = loaded.is_some();
    let config = loaded.unwrap_or_default();
    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    if !found {
        warn!("config file {} not found, using defaults", args.config.display());
    }

    match args.command {
        Commands::Object { action } => object_command(&open_storage(&config)?, action),
        Commands::Datastream { action } => datastream_command(&open_storage(&config)?, action),
        Commands::Registry { action } => registry_command(&open_storage(&config)?, action),
        Commands::Journal { action } => journal_command(&config, action),
    }
}

fn open_storage(config: &Config) -> Result<LowlevelStorage> {
    LowlevelStorage::from_config(&config.storage).context("opening storage")
}

fn parse_pid(pid: &str) -> Result<Pid> {
    Pid::new(pid).with_context(|| format!("invalid PID {pid:?}"))
}

fn parse_datastream_key(key: &str) -> Result<StoreKey> {
    let key = StoreKey::parse(key).with_context(|| format!("invalid datastream key {key:?}"))?;
    if !key.is_datastream() {
        bail!("{key} is an object key; expected pid+dsId+versionId");
    }
    Ok(key)
}

fn open_input(file: &Path) -> Result<File> {
    File::open(file).with_context(|| format!("opening {}", file.display()))
}

/// Copy `content` to `out`, or stdout when `out` is `None`
fn write_output(mut content: impl Read, out: Option<&Path>) -> Result<u64> {
    let copied = match out {
        Some(path) => {
            let mut file =
                File::create(path).with_context(|| format!("creating {}", path.display()))?;
            io::copy(&mut content, &mut file)?
        }
        None => {
            let mut stdout = io::stdout().lock();
            let copied = io::copy(&mut content, &mut stdout)?;
            stdout.flush()?;
            copied
        }
    };
    Ok(copied)
}

fn sha256_hex(mut content: impl Read) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = content.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn object_command(storage: &LowlevelStorage, action: ObjectCommands) -> Result<()> {
    match action {
        ObjectCommands::Add { pid, file } => {
            let pid = parse_pid(&pid)?;
            let size = storage.add_object(&pid, open_input(&file)?)?;
            println!("Added {pid} ({size} bytes)");
        }
        ObjectCommands::Replace { pid, file } => {
            let pid = parse_pid(&pid)?;
            let size = storage.replace_object(&pid, open_input(&file)?)?;
            println!("Replaced {pid} ({size} bytes)");
        }
        ObjectCommands::Get { pid, out } => {
            let pid = parse_pid(&pid)?;
            write_output(storage.retrieve_object(&pid)?, out.as_deref())?;
        }
        ObjectCommands::Remove { pid } => {
            let pid = parse_pid(&pid)?;
            let datastreams = storage.datastreams_of(&pid)?;
            for key in &datastreams {
                storage.remove_datastream(key)?;
            }
            storage.remove_object(&pid)?;
            println!(
                "Removed {pid} and {} datastream versions",
                datastreams.len()
            );
        }
        ObjectCommands::Stat { pid } => {
            let pid = parse_pid(&pid)?;
            if !storage.object_exists(&pid)? {
                println!("{pid}: not found");
                return Ok(());
            }
            let key = StoreKey::object(pid.clone());
            println!("PID:         {pid}");
            println!("Size:        {} bytes", storage.objects().size(&key)?);
            println!(
                "SHA-256:     {}",
                sha256_hex(storage.retrieve_object(&pid)?)?
            );
            println!("Datastreams: {}", storage.datastreams_of(&pid)?.len());
        }
    }
    Ok(())
}

fn datastream_command(storage: &LowlevelStorage, action: DatastreamCommands) -> Result<()> {
    match action {
        DatastreamCommands::Add { key, file } => {
            let key = parse_datastream_key(&key)?;
            let size = storage.add_datastream(&key, open_input(&file)?)?;
            println!("Added {key} ({size} bytes)");
        }
        DatastreamCommands::Get { key, out } => {
            let key = parse_datastream_key(&key)?;
            write_output(storage.retrieve_datastream(&key)?, out.as_deref())?;
        }
        DatastreamCommands::Remove { key } => {
            let key = parse_datastream_key(&key)?;
            storage.remove_datastream(&key)?;
            println!("Removed {key}");
        }
        DatastreamCommands::List { pid } => {
            let pid = parse_pid(&pid)?;
            let keys = storage.datastreams_of(&pid)?;
            if keys.is_empty() {
                println!("No datastreams stored for {pid}");
            }
            for key in keys {
                let size = storage.datastreams().size(&key)?;
                println!("{key:<60} {size:>12}");
            }
        }
    }
    Ok(())
}

fn selected(storage: &LowlevelStorage, selector: StoreSelector) -> Vec<&Store> {
    match selector {
        StoreSelector::Objects => vec![storage.objects()],
        StoreSelector::Datastreams => vec![storage.datastreams()],
        StoreSelector::All => vec![storage.objects(), storage.datastreams()],
    }
}

fn print_audit(store: &Store, what: &str, report: &AuditReport) -> bool {
    println!(
        "{}: {} {} checked, {} discrepancies",
        store.name(),
        report.checked,
        what,
        report.discrepancies.len()
    );
    for discrepancy in &report.discrepancies {
        println!("  {discrepancy}");
    }
    report.is_clean()
}

fn print_rebuild(store: &Store, report: &RebuildReport) {
    println!("{}: {} keys registered", store.name(), report.registered);
    for path in &report.skipped {
        println!("  skipped {path}: not a store file");
    }
    for (key, path) in &report.duplicates {
        println!("  duplicate {path} for {key} ignored");
    }
}

fn registry_command(storage: &LowlevelStorage, action: RegistryCommands) -> Result<()> {
    let mut clean = true;
    match action {
        RegistryCommands::AuditFiles { store } => {
            for store in selected(storage, store) {
                clean &= print_audit(store, "registry entries", &store.audit_files()?);
            }
        }
        RegistryCommands::AuditRegistry { store } => {
            for store in selected(storage, store) {
                clean &= print_audit(store, "files", &store.audit_registry()?);
            }
        }
        RegistryCommands::Rebuild { store } => {
            for store in selected(storage, store) {
                info!("rebuilding registry of {}", store.name());
                print_rebuild(store, &store.rebuild()?);
            }
        }
    }
    if !clean {
        bail!("audit found discrepancies");
    }
    Ok(())
}

/// Directory of the first local transport
fn default_journal_dir(config: &Config) -> Result<PathBuf> {
    config
        .journal
        .transports
        .iter()
        .find_map(|t| match t {
            TransportConfig::Local { directory, .. } => Some(directory.clone()),
            TransportConfig::Remote { .. } => None,
        })
        .context("no journal directory given and no local transport configured")
}

fn describe_argument(value: &Argument) -> String {
    match value {
        Argument::String(s) => format!("{s:?}"),
        Argument::Integer(n) => n.to_string(),
        Argument::Boolean(b) => b.to_string(),
        Argument::Date(d) => d.to_rfc3339(),
        Argument::StringArray(v) => format!("{v:?}"),
        Argument::Binary(b) => format!("<{} bytes>", b.len()),
        Argument::Null => "null".to_string(),
    }
}

fn journal_command(config: &Config, action: JournalCommands) -> Result<()> {
    match action {
        JournalCommands::Files { dir } => {
            let dir = match dir {
                Some(dir) => dir,
                None => default_journal_dir(config)?,
            };
            for path in journal_files(&dir)? {
                let reader = JournalFileReader::open(&path)?;
                let header = reader.header().clone();
                let entries = reader.count();
                println!(
                    "{}  {}  {} entries",
                    path.display(),
                    header.timestamp.to_rfc3339(),
                    entries
                );
            }
        }
        JournalCommands::Dump { file, json } => {
            let reader = JournalFileReader::open(&file)
                .with_context(|| format!("opening {}", file.display()))?;
            if !json {
                println!(
                    "Repository {} written {}",
                    reader.header().repository_hash,
                    reader.header().timestamp.to_rfc3339()
                );
            }
            for entry in reader {
                let entry = entry?;
                if json {
                    let arguments: serde_json::Map<String, serde_json::Value> = entry
                        .arguments()
                        .iter()
                        .map(|(name, value)| {
                            (name.clone(), serde_json::Value::String(describe_argument(value)))
                        })
                        .collect();
                    let line = serde_json::json!({
                        "sequence": entry.sequence(),
                        "method": entry.method().as_str(),
                        "timestamp": entry.timestamp().to_rfc3339(),
                        "noOp": entry.context().no_op(),
                        "arguments": arguments,
                    });
                    println!("{line}");
                } else {
                    println!(
                        "#{:<8} {} {}{}",
                        entry.sequence(),
                        entry.timestamp().to_rfc3339(),
                        entry.method(),
                        if entry.context().no_op() { " (no-op)" } else { "" }
                    );
                    for (name, value) in entry.arguments() {
                        println!("    {name} = {}", describe_argument(value));
                    }
                }
            }
        }
        JournalCommands::Recover { dir, after } => {
            let dir = match dir {
                Some(dir) => dir,
                None => default_journal_dir(config)?,
            };
            let storage = Arc::new(open_storage(config)?);
            let delegate = StorageDelegate::new(storage);
            let stats = JournalRecovery::new().replay(&dir, &delegate, after)?;
            println!("Files:    {}", stats.files);
            println!("Entries:  {}", stats.entries);
            println!("Applied:  {}", stats.applied);
            println!("Skipped:  {}", stats.skipped);
            println!("No-ops:   {}", stats.no_ops);
            match stats.last_sequence {
                Some(seq) => println!("Last:     {seq}"),
                None => println!("Last:     (none)"),
            }
        }
        JournalCommands::Receive { listen, dir, once } => {
            let receiver = JournalReceiver::bind(listen, &dir)?;
            println!("Receiving on {} into {}", receiver.local_addr()?, dir.display());
            if once {
                let stats = receiver.accept_one()?;
                println!(
                    "Received {} files, {} entries",
                    stats.files, stats.entries
                );
            } else {
                receiver.serve()?;
            }
        }
    }
    Ok(())
}
