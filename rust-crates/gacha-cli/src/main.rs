use admin_key::{
    AdminKeyRecord,
    AdminKeyStore,
    resolve_store_path,
};
use clap::{
    Parser,
    Subcommand,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use gacha::{
    Gacha,
    ReqwestTransport,
    Session,
    SyncAdapter,
    SyncOptions,
    events::GachaEvent,
};
use tokio::sync::broadcast::{
    Receiver,
    error::RecvError,
};
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "false")]
    tracing: bool,

    /// Where the admin key is stored (defaults to ~/.gacha/admin-key.json)
    #[arg(long, global = true)]
    admin_key_file: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch a machine's configuration and print it as JSON
    Fetch {
        #[arg(short, long)]
        url: Url,

        /// Also load admin-only sections (needs a stored admin key)
        #[arg(long)]
        load_admin: bool,

        /// Print the persisted notecard shape instead of the live one
        #[arg(long)]
        notecard: bool,

        /// Log every event raised while fetching (turns on tracing)
        #[arg(long)]
        events: bool,
    },
    /// Manage the stored admin key
    AdminKey {
        #[command(subcommand)]
        action: AdminKeyAction,
    },
}

#[derive(Subcommand, Debug)]
enum AdminKeyAction {
    Set {
        key: String,

        /// Only use the key for this machine
        #[arg(long)]
        url: Option<Url>,
    },
    Clear,
    Show,
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn handle_interupt() {
    match tokio::signal::ctrl_c().await {
        Ok(_) => tracing::info!("Received interrupt, exiting"),
        Err(_) => tracing::warn!("Received interrupt error, exiting anyway"),
    }
}

async fn print_events(mut events: Receiver<GachaEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => tracing::info!("event {event}"),
            Err(RecvError::Lagged(missed)) => tracing::warn!("{missed} events missed"),
            Err(RecvError::Closed) => return,
        }
    }
}

async fn fetch(
    store: &AdminKeyStore,
    url: Url,
    load_admin: bool,
    notecard: bool,
    events: bool,
) -> Result<()> {
    let admin_key = store.resolve(url.as_str()).map_err(|e| eyre!(e))?;
    if load_admin && admin_key.is_none() {
        tracing::warn!(
            "No admin key stored for {url}; admin-only sections will be skipped"
        );
    }
    let session = Session::new(url.as_str())
        .wrap_err("Invalid --url")?
        .with_admin_key(admin_key);
    let transport = ReqwestTransport::new().wrap_err("Failed to build HTTP client")?;
    let mut gacha = Gacha::new(SyncAdapter::new(transport, session));
    let printer = events.then(|| tokio::spawn(print_events(gacha.subscribe())));

    tracing::info!("Fetching {}", gacha.sync());
    let fetched = tokio::select! {
        fetched = gacha.fetch(SyncOptions::new().load_admin(load_admin)) => fetched,
        _ = handle_interupt() => {
            return Err(eyre!("Interrupted while fetching"));
        }
    };
    fetched.wrap_err_with(|| format!("Fetch stalled: {:?}", gacha.pipeline_state()))?;

    let view = if notecard {
        gacha.to_notecard_json()
    } else {
        gacha.to_live_json()
    };
    drop(gacha);
    if let Some(printer) = printer {
        printer.await.wrap_err("Event printer failed")?;
    }
    let json = serde_json::to_string_pretty(&view).wrap_err("Failed to render JSON")?;
    println!("{json}");
    Ok(())
}

fn admin_key(store: &AdminKeyStore, action: AdminKeyAction) -> Result<()> {
    match action {
        AdminKeyAction::Set { key, url } => {
            let record = AdminKeyRecord::new(key, url.map(String::from));
            store.save(&record).map_err(|e| eyre!(e))?;
            println!(
                "Stored admin key {} in {}",
                record.fingerprint(),
                store.path().display()
            );
        }
        AdminKeyAction::Clear => {
            if store.clear().map_err(|e| eyre!(e))? {
                println!("Removed {}", store.path().display());
            } else {
                println!("No admin key stored");
            }
        }
        AdminKeyAction::Show => match store.load().map_err(|e| eyre!(e))? {
            Some(record) => println!(
                "{} saved {} for {}",
                record.fingerprint(),
                record.saved_at,
                record.document_url.as_deref().unwrap_or("any machine")
            ),
            None => println!("No admin key stored"),
        },
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    let watch_events = matches!(args.command, Command::Fetch { events: true, .. });
    if args.tracing || watch_events {
        init_tracing();
    }
    let path = resolve_store_path(args.admin_key_file.as_deref()).map_err(|e| eyre!(e))?;
    let store = AdminKeyStore::open(path);
    match args.command {
        Command::Fetch {
            url,
            load_admin,
            notecard,
            events,
        } => fetch(&store, url, load_admin, notecard, events).await,
        Command::AdminKey { action } => admin_key(&store, action),
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn args__fetch_flags_parse() {
        let args = Args::try_parse_from([
            "gacha",
            "--tracing",
            "fetch",
            "--url",
            "http://machine.test/doc",
            "--load-admin",
            "--notecard",
        ])
        .unwrap();

        assert!(args.tracing);
        match args.command {
            Command::Fetch {
                url,
                load_admin,
                notecard,
                events,
            } => {
                assert_eq!(url.as_str(), "http://machine.test/doc");
                assert!(load_admin && notecard && !events);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn args__admin_key_file_is_global() {
        let args = Args::try_parse_from([
            "gacha",
            "admin-key",
            "set",
            "secret",
            "--admin-key-file",
            "~/keys.json",
        ])
        .unwrap();

        assert_eq!(args.admin_key_file.as_deref(), Some("~/keys.json"));
        assert!(matches!(
            args.command,
            Command::AdminKey {
                action: AdminKeyAction::Set { url: None, .. }
            }
        ));
    }

    #[test]
    fn args__rejects_invalid_urls() {
        let parsed = Args::try_parse_from(["gacha", "fetch", "--url", "not a url"]);

        assert!(parsed.is_err());
    }
}
