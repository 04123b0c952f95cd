//! casfs CLI - content-addressable file store command line interface

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use casfs::{Algorithm, CasConfig, Store};

#[derive(Parser)]
#[command(name = "casfs")]
#[command(about = "content-addressable file store")]
#[command(version)]
struct Cli {
    /// store root: a directory, file://path, temp:// or mem://
    #[arg(short, long, env = "CASFS_ROOT", default_value = ".")]
    root: String,

    /// TOML config file; flags below override it
    #[arg(short, long, env = "CASFS_CONFIG")]
    config: Option<PathBuf>,

    /// directory levels above each stored file
    #[arg(long)]
    depth: Option<usize>,

    /// digest characters per directory level
    #[arg(long)]
    width: Option<usize>,

    /// hash algorithm (sha224, sha256, sha384, sha512, blake3)
    #[arg(long)]
    algorithm: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// store files, printing their digest and path
    Put {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// resolve a digest or path
    Get {
        key: String,
    },

    /// write stored content to stdout
    Cat {
        key: String,
    },

    /// delete stored content
    Delete {
        key: String,
    },

    /// exit successfully if the key resolves
    Exists {
        key: String,
    },

    /// list stored files
    Files,

    /// list directories holding files
    Folders,

    /// show file count and total size
    Stats,

    /// move misplaced files to their derived paths
    Repair {
        /// only list what would be repaired
        #[arg(long)]
        dry_run: bool,
    },

    /// write the effective configuration to a TOML file
    InitConfig {
        path: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> casfs::Result<CasConfig> {
    let mut config = match &cli.config {
        Some(path) => CasConfig::load(path)?,
        None => CasConfig::default(),
    };

    if let Some(depth) = cli.depth {
        config.depth = depth;
    }
    if let Some(width) = cli.width {
        config.width = width;
    }
    if let Some(name) = &cli.algorithm {
        config.algorithm = name.parse::<Algorithm>()?;
    }

    config.validate()?;
    Ok(config)
}

fn run(cli: Cli) -> casfs::Result<ExitCode> {
    let config = load_config(&cli)?;

    match cli.command {
        Commands::InitConfig { path } => {
            config.save(&path)?;
            println!("wrote config to {}", path.display());
        }

        Commands::Put { files } => {
            let store = Store::from_uri(&cli.root, config)?;
            for path in files {
                let file = File::open(&path).map_err(|e| casfs::Error::Io {
                    path: path.clone(),
                    source: e,
                })?;
                let addr = store.put(file)?;
                let note = if addr.is_duplicate() { " (duplicate)" } else { "" };
                println!("{} {}{}", addr.id, addr.relpath, note);
            }
        }

        Commands::Get { key } => {
            let store = Store::from_uri(&cli.root, config)?;
            match store.get(&key) {
                Some(addr) => println!("{}", addr),
                None => {
                    eprintln!("not found: {}", key);
                    return Ok(ExitCode::FAILURE);
                }
            }
        }

        Commands::Cat { key } => {
            let store = Store::from_uri(&cli.root, config)?;
            let mut reader = store.open(&key)?;
            let mut stdout = io::stdout().lock();
            io::copy(&mut reader, &mut stdout)
                .and_then(|_| stdout.flush())
                .map_err(|e| casfs::Error::Io {
                    path: "stdout".into(),
                    source: e,
                })?;
        }

        Commands::Delete { key } => {
            let store = Store::from_uri(&cli.root, config)?;
            store.delete(&key)?;
            println!("deleted {}", key);
        }

        Commands::Exists { key } => {
            let store = Store::from_uri(&cli.root, config)?;
            if !store.exists(&key) {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Files => {
            let store = Store::from_uri(&cli.root, config)?;
            for path in store.files() {
                println!("{}", path?);
            }
        }

        Commands::Folders => {
            let store = Store::from_uri(&cli.root, config)?;
            for dir in store.folders() {
                let dir = dir?;
                println!("{}", if dir.is_empty() { "." } else { dir.as_str() });
            }
        }

        Commands::Stats => {
            let store = Store::from_uri(&cli.root, config)?;
            println!("{} files in the store", store.count()?);
            println!("{} bytes stored", store.size()?);
        }

        Commands::Repair { dry_run } => {
            let store = Store::from_uri(&cli.root, config)?;
            let items = if dry_run {
                store.corrupted()?
            } else {
                store.repair()?
            };

            let action = if dry_run { "would repair" } else { "repaired" };
            for item in &items {
                println!("{} -> {}", item.path, item.expected.relpath);
            }
            println!("{} {} files", action, items.len());
        }
    }

    Ok(ExitCode::SUCCESS)
}
