use clap::{Parser, Subcommand};
use fieldsync::client::offline::SyncItem;
use fieldsync::client::{
    ApiClient, AuthGate, AutoSync, Config, LocalDatabase, ReqwestTransport, SyncCoordinator,
    TokenStore, Transport, UploadDispatcher,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "fieldsync", about = "Offline sync queue for field survey records")]
struct Args {
    /// Path to the configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show queue counts and the last upload time
    Status,
    /// List queued items
    List {
        /// Only failed items
        #[arg(long, conflicts_with = "pending")]
        errors: bool,
        /// Only pending items
        #[arg(long)]
        pending: bool,
    },
    /// Upload pending items (all, or only the given ids)
    Sync { ids: Vec<Uuid> },
    /// Upload pending items periodically until interrupted
    Watch {
        #[arg(long, default_value_t = 300)]
        interval_secs: u64,
    },
    /// Put a failed item back to pending
    Retry { id: Uuid },
    /// Remove an item and its record
    Discard { id: Uuid },
    /// Remove every failed item and its record
    ClearErrors,
    /// Remove successfully uploaded items
    ClearSucceeded,
    /// Log in and store the session
    Login {
        account: String,
        #[arg(long, env = "FIELDSYNC_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session
    Logout,
}

struct App {
    coordinator: Arc<SyncCoordinator>,
    api: Arc<ApiClient>,
}

impl App {
    async fn open(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        let store = Arc::new(LocalDatabase::open(config.db_path()).await?);
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::from_config(&config)?);
        let tokens = Arc::new(TokenStore::restore(store.clone()).await);
        let gate = Arc::new(AuthGate::new(config.clone(), transport.clone(), tokens));
        let api = Arc::new(ApiClient::new(config, transport, gate));
        let coordinator = Arc::new(SyncCoordinator::restore(store).await?);
        Ok(Self { coordinator, api })
    }

    fn dispatcher(&self) -> UploadDispatcher {
        UploadDispatcher::new(self.api.clone())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;
    let app = App::open(config).await?;

    match args.command {
        Command::Status => {
            let stats = app.coordinator.stats().await;
            println!(
                "pending: {}  error: {}  success: {}",
                stats.pending, stats.error, stats.success
            );
            match app.coordinator.last_upload_at().await {
                Some(at) => println!("last upload: {}", at.to_rfc3339()),
                None => println!("last upload: never"),
            }
            let logged_in = app.api.gate().tokens().is_logged_in();
            println!("session: {}", if logged_in { "active" } else { "none" });
        }
        Command::List { errors, pending } => {
            let items = if errors {
                app.coordinator.errors().await
            } else if pending {
                app.coordinator.pending().await
            } else {
                app.coordinator.items().await
            };
            items.iter().for_each(print_item);
        }
        Command::Sync { ids } => {
            let selection = (!ids.is_empty()).then_some(ids.as_slice());
            let report = app.dispatcher().run(&app.coordinator, selection).await?;
            println!(
                "uploaded: {}  failed: {}  stale: {}",
                report.succeeded, report.failed, report.stale
            );
            app.coordinator.errors().await.iter().for_each(print_item);
            if report.unsaved > 0 {
                eprintln!("warning: {} outcome(s) not saved to disk", report.unsaved);
            }
            if report.aborted {
                eprintln!("session expired; run `fieldsync login` and sync again");
                std::process::exit(2);
            }
        }
        Command::Watch { interval_secs } => {
            let auto_sync = AutoSync::spawn(
                app.coordinator.clone(),
                Arc::new(app.dispatcher()),
                Duration::from_secs(interval_secs.max(1)),
            );
            tokio::signal::ctrl_c().await?;
            auto_sync.shutdown().await;
        }
        Command::Retry { id } => {
            if !app.coordinator.reset(id).await? {
                return Err(format!("no failed item {}", id).into());
            }
            println!("{} reset to pending", id);
        }
        Command::Discard { id } => match app.coordinator.remove(id).await? {
            Some(_) => println!("{} discarded", id),
            None => return Err(format!("no queued item {}", id).into()),
        },
        Command::ClearErrors => {
            let removed = app.coordinator.clear_errors().await?;
            println!("removed {} failed item(s)", removed);
        }
        Command::ClearSucceeded => {
            let removed = app.coordinator.clear_succeeded().await?;
            println!("removed {} uploaded item(s)", removed);
        }
        Command::Login { account, password } => {
            app.api.login(&account, &password).await?;
            println!("logged in as {}", account);
        }
        Command::Logout => {
            app.api.logout().await;
            println!("logged out");
        }
    }

    Ok(())
}

fn print_item(item: &SyncItem) {
    let record = item
        .data
        .key()
        .map(|key| key.to_string())
        .unwrap_or_default();
    match item.status.message() {
        Some(message) => println!(
            "{}  {:<8} {:<9} {}  {}",
            item.id,
            item.status.label(),
            item.kind.to_string(),
            record,
            message
        ),
        None => println!(
            "{}  {:<8} {:<9} {}",
            item.id,
            item.status.label(),
            item.kind.to_string(),
            record
        ),
    }
}
