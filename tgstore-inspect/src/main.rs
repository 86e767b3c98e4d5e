//! tgstore-inspect — look inside a session file.
//!
//! ```text
//! tgstore-inspect <file> show              session summary and schema version
//! tgstore-inspect <file> offsets           update checkpoints
//! tgstore-inspect <file> peer <query>      resolve an id, @username or +phone
//! tgstore-inspect <file> export            print a portable session string
//! tgstore-inspect <file> import <string>   write a session string into <file>
//! ```
//!
//! Opening a file upgrades its schema if it is older than this build.

use std::path::{Path, PathBuf};

use chrono::DateTime;
use tgstore::{InputPeer, Store, StoreConfig, StoreError};

const USAGE: &str = "usage: tgstore-inspect <file> <show|offsets|peer <query>|export|import <string>>";

#[tokio::main]
async fn main() {
    // RUST_LOG=tgstore=debug for per-operation tracing
    if std::env::var("RUST_LOG").is_err() {
        // SAFETY: single-threaded at this point, no other threads reading env
        unsafe { std::env::set_var("RUST_LOG", "tgstore=info"); }
    }
    env_logger::init();

    if let Err(e) = run().await {
        eprintln!("✗ {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (path, command) = match args.as_slice() {
        [path, command, ..] => (PathBuf::from(path), command.as_str()),
        _ => return Err(USAGE.into()),
    };
    let rest = &args[2..];

    if command == "import" {
        let [session] = rest else { return Err(USAGE.into()) };
        let store = Store::open(StoreConfig::file(&path)).await?;
        store.import_session_string(session).await?;
        store.save().await?;
        store.close().await?;
        println!("💾 Session written to {}", path.display());
        return Ok(());
    }

    let store = open_existing(&path).await?;
    match (command, rest) {
        ("show", [])          => show(&store).await?,
        ("offsets", [])       => offsets(&store).await?,
        ("peer", [query])     => peer(&store, query).await?,
        ("export", [])        => println!("{}", store.export_session_string().await?),
        _ => {
            store.close().await?;
            return Err(USAGE.into());
        }
    }
    store.close().await?;
    Ok(())
}

async fn open_existing(path: &Path) -> Result<Store, Box<dyn std::error::Error>> {
    if !path.is_file() {
        return Err(format!("{} does not exist", path.display()).into());
    }
    Ok(Store::open(StoreConfig::file(path)).await?)
}

async fn show(store: &Store) -> Result<(), StoreError> {
    let s = store.session().await?;
    println!("schema     v{}", store.schema_version().await?);
    println!("dc         {}{}", s.dc_id, if s.test_mode { " (test)" } else { "" });
    println!("api_id     {}", opt(s.api_id));
    println!("auth_key   {}", s.auth_key.as_ref().map_or("none".into(), |k| format!("{} bytes", k.len())));
    println!("user_id    {}", opt(s.user_id));
    println!("is_bot     {}", opt(s.is_bot));
    println!("saved      {}", timestamp(s.date));
    println!("peers      {}", store.peer_count().await?);
    println!("offsets    {}", store.update_offsets().await?.len());
    Ok(())
}

async fn offsets(store: &Store) -> Result<(), StoreError> {
    let offsets = store.update_offsets().await?;
    if offsets.is_empty() {
        println!("(no checkpoints)");
    }
    for o in offsets {
        let source = if o.is_account() { "account".to_string() } else { format!("channel {}", o.source_id) };
        println!(
            "{source:<22} pts={:<10} qts={:<8} seq={:<8} date={}",
            o.pts, o.qts, o.seq, timestamp(i64::from(o.date)),
        );
    }
    Ok(())
}

async fn peer(store: &Store, query: &str) -> Result<(), StoreError> {
    let input = if let Some(phone) = query.strip_prefix('+') {
        store.get_peer_by_phone_number(phone).await?
    } else if let Ok(id) = query.parse::<i64>() {
        store.get_peer_by_id(id).await?
    } else {
        store.get_peer_by_username(query).await?
    };

    let record = store.get_peer(input.peer_id()?).await?;
    match input {
        InputPeer::User { user_id, access_hash }       => println!("user {user_id} hash={access_hash}"),
        InputPeer::Chat { chat_id }                    => println!("chat {chat_id}"),
        InputPeer::Channel { channel_id, access_hash } => println!("channel {channel_id} hash={access_hash}"),
    }
    println!("kind       {}", record.kind);
    if !record.usernames.is_empty() {
        println!("usernames  {}", record.usernames.join(", "));
    }
    println!("phone      {}", record.phone_number.as_deref().unwrap_or("-"));
    println!("seen       {}", timestamp(record.last_update_on));
    Ok(())
}

fn opt<T: std::fmt::Display>(v: Option<T>) -> String {
    v.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn timestamp(secs: i64) -> String {
    match DateTime::from_timestamp(secs, 0) {
        Some(t) if secs > 0 => t.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        _ => "never".to_string(),
    }
}
