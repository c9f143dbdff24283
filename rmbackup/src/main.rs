use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rmbackup::config::BackupConfig;
use rmbackup::logging;
use rmbackup::sync::engine::SyncEngine;
use rmbackup::sync::mapping::MappingStore;
use rmbackup::sync::source::DocumentSource;
use rmbackup::sync::tree::{NodeKind, RemoteTree};
use rmbackup_core::DeviceClient;
use tracing::{debug, error, info};

const EXIT_TREE_FAILED: u8 = 3;
const EXIT_ACTION_FAILED: u8 = 4;
const EXIT_SYNC_INCOMPLETE: u8 = 5;
const EXIT_SAVE_FAILED: u8 = 6;

#[derive(Debug, Parser)]
#[command(name = "rmbackup", version, about = "Back up tablet documents to local files")]
struct Cli {
    /// File recording which documents are backed up where
    mapping: PathBuf,

    #[command(subcommand)]
    action: Action,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
enum Action {
    /// Download every registered document
    #[command(visible_alias = "s")]
    Sync,
    /// Register a document for backup
    #[command(visible_alias = "r")]
    Register {
        /// Path on the tablet, e.g. "Notes/Taxes"
        remote_path: String,
        /// Where the PDF should be written locally
        local_path: PathBuf,
    },
    /// Stop backing up a document
    #[command(visible_alias = "dr")]
    Deregister {
        /// Path on the tablet
        remote_path: String,
    },
    /// Print every document path on the tablet
    #[command(visible_alias = "ls")]
    List,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = BackupConfig::from_env();
    if let Err(err) = logging::init(&config.log_filter, cli.verbose) {
        eprintln!("[rmbackup] {err:#}");
    }
    match run(cli, config).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: BackupConfig) -> anyhow::Result<u8> {
    let client = DeviceClient::with_connect_timeout(&config.base_url, config.connect_timeout)
        .with_context(|| format!("cannot use device address {}", config.base_url))?;
    let engine = SyncEngine::new(client).with_staleness(config.staleness);
    debug!(device = %engine.source().base_url(), "reading document tree");
    Ok(run_with(&engine, &cli.mapping, &cli.action).await)
}

/// Builds the tree, applies `action` to the mapping at `mapping` and saves
/// it. Returns the process exit code.
async fn run_with<S: DocumentSource>(
    engine: &SyncEngine<S>,
    mapping: &Path,
    action: &Action,
) -> u8 {
    let tree = match engine.build_tree().await {
        Ok(tree) => tree,
        Err(err) => {
            error!(
                error = %err,
                "could not read the document tree; is the tablet connected with the USB web interface enabled?"
            );
            return EXIT_TREE_FAILED;
        }
    };
    info!(documents = tree.leaf_count(), "remote tree loaded");

    let (mut store, writable) = match MappingStore::load(mapping).await {
        Ok(store) => (store, true),
        Err(err) => {
            error!(error = %err, "continuing with an empty mapping; the mapping file will be left as it is");
            (MappingStore::new(), false)
        }
    };
    store.missing_local_files().await;

    let code = match action {
        Action::Sync => {
            let report = engine.sync_all(&tree, &store).await;
            for failure in &report.failures {
                error!(id = %failure.id, error = %failure.error, "not backed up");
            }
            if report.is_clean() { 0 } else { EXIT_SYNC_INCOMPLETE }
        }
        Action::Register {
            remote_path,
            local_path,
        } => match engine.register_entry(&tree, &mut store, remote_path, local_path) {
            Ok(_) => 0,
            Err(err) => {
                error!(error = %err, "register failed");
                EXIT_ACTION_FAILED
            }
        },
        Action::Deregister { remote_path } => {
            match engine.deregister_entry(&tree, &mut store, remote_path) {
                Ok(_) => 0,
                Err(err) => {
                    error!(error = %err, "deregister failed");
                    EXIT_ACTION_FAILED
                }
            }
        }
        Action::List => {
            print_tree(&tree);
            0
        }
    };

    if !writable {
        return EXIT_SAVE_FAILED;
    }
    if let Err(err) = store.save(mapping).await {
        error!(error = %err, "mapping was not saved");
        return EXIT_SAVE_FAILED;
    }
    code
}

fn print_tree(tree: &RemoteTree) {
    for (path, node) in tree.leaves() {
        let kind = match node.kind {
            NodeKind::Document => "document",
            NodeKind::Folder => "folder",
        };
        println!("{kind}\t{}\t{path}", node.id);
    }
}
