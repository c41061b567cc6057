//! Sessions command - inspect persisted sessions.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use serde::Serialize;
use sweb_session::{FileStore, is_expired_at};

use super::Context;

/// Arguments for the sessions command.
#[derive(Args, Debug)]
pub struct SessionsArgs {
    #[command(subcommand)]
    pub command: SessionsCommand,
}

#[derive(Subcommand, Debug)]
pub enum SessionsCommand {
    /// List persisted sessions
    List {
        /// Session directory (defaults to `[session] save_path`)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete persisted sessions older than the configured timeout
    Purge {
        /// Session directory (defaults to `[session] save_path`)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

/// One persisted session as shown by `list`.
#[derive(Debug, Serialize)]
struct SessionSummary {
    id: String,
    last_access: DateTime<Utc>,
    keys: Vec<String>,
    expired: bool,
}

/// Run the sessions command.
pub async fn run(args: SessionsArgs, ctx: &Context) -> Result<()> {
    match args.command {
        SessionsCommand::List { dir, json } => list(dir, json, ctx).await,
        SessionsCommand::Purge { dir } => purge(dir, ctx).await,
    }
}

fn open_store(dir: Option<PathBuf>, ctx: &Context) -> Result<Arc<FileStore>> {
    let Some(dir) = dir.or(ctx.config.session().save_path) else {
        bail!("No session directory: pass --dir or set [session] save_path");
    };
    let store = FileStore::open(&dir)
        .with_context(|| format!("Failed to open session directory {}", dir.display()))?;
    Ok(Arc::new(store))
}

/// Read every persisted session, oldest access first.
async fn scan(store: Arc<FileStore>, ctx: &Context) -> Result<Vec<SessionSummary>> {
    let timeout = ctx.config.session().timeout();
    let now = Utc::now();

    let mut summaries = tokio::task::spawn_blocking(move || {
        let mut out = Vec::new();
        store.load_all(|attrs| {
            let mut keys = attrs.keys();
            keys.sort();
            out.push(SessionSummary {
                id: attrs.sid().to_string(),
                last_access: attrs.time_accessed(),
                keys,
                expired: is_expired_at(attrs.time_accessed(), timeout, now),
            });
        })?;
        Ok::<_, sweb_session::Error>(out)
    })
    .await??;

    summaries.sort_by_key(|s| s.last_access);
    Ok(summaries)
}

async fn list(dir: Option<PathBuf>, json: bool, ctx: &Context) -> Result<()> {
    let store = open_store(dir, ctx)?;
    let summaries = scan(store, ctx).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    if summaries.is_empty() {
        println!("No persisted sessions");
        return Ok(());
    }

    for s in &summaries {
        let marker = if s.expired { " (expired)" } else { "" };
        println!(
            "{}  {}  {} key(s){}",
            s.id,
            s.last_access.format("%Y-%m-%d %H:%M:%S"),
            s.keys.len(),
            marker
        );
        if ctx.verbose && !s.keys.is_empty() {
            println!("    {}", s.keys.join(", "));
        }
    }
    Ok(())
}

async fn purge(dir: Option<PathBuf>, ctx: &Context) -> Result<()> {
    let store = open_store(dir, ctx)?;
    let summaries = scan(Arc::clone(&store), ctx).await?;
    let expired: Vec<String> = summaries
        .into_iter()
        .filter(|s| s.expired)
        .map(|s| s.id)
        .collect();

    let removed = tokio::task::spawn_blocking(move || {
        let mut removed = 0;
        for sid in &expired {
            match store.remove(sid) {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(session_id = %sid, error = %e, "Failed to purge session"),
            }
        }
        removed
    })
    .await?;

    println!("Purged {removed} expired session(s)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs::{self, File};
    use std::time::{Duration, SystemTime};

    use sweb_config::{SessionSection, SwebConfig};
    use tempfile::TempDir;

    use super::*;

    fn ctx(dir: &TempDir) -> Context {
        let config = SwebConfig {
            session: Some(SessionSection {
                timeout_secs: 60,
                save_path: Some(dir.path().to_path_buf()),
                ..SessionSection::default()
            }),
            ..SwebConfig::default()
        };
        Context {
            config,
            verbose: false,
        }
    }

    fn write_session(dir: &TempDir, sid: &str, body: &str, age: Duration) {
        let path = dir.path().join(sid);
        fs::write(&path, body).unwrap();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::now() - age)
            .unwrap();
    }

    #[tokio::test]
    async fn test_scan_orders_and_flags() {
        let dir = TempDir::new().unwrap();
        write_session(&dir, "recent", r#"{"b":1,"a":2}"#, Duration::from_secs(5));
        write_session(&dir, "stale", "", Duration::from_secs(600));

        let ctx = ctx(&dir);
        let summaries = scan(open_store(None, &ctx).unwrap(), &ctx).await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id, "stale");
        assert!(summaries[0].expired);
        assert_eq!(summaries[1].keys, vec!["a", "b"]);
        assert!(!summaries[1].expired);
    }

    #[tokio::test]
    async fn test_purge_removes_only_expired() {
        let dir = TempDir::new().unwrap();
        write_session(&dir, "recent", "{}", Duration::from_secs(5));
        write_session(&dir, "stale", "{}", Duration::from_secs(600));

        purge(None, &ctx(&dir)).await.unwrap();
        assert!(dir.path().join("recent").exists());
        assert!(!dir.path().join("stale").exists());
    }

    #[test]
    fn test_missing_directory_is_error() {
        let ctx = Context {
            config: SwebConfig::default(),
            verbose: false,
        };
        assert!(open_store(None, &ctx).is_err());
    }
}
