use crate::config::Config;
use crate::rules::{compile_rules, RuleTable};
use arc_swap::ArcSwap;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Watch the config file and swap the live rule table on change.
///
/// Creations and writes are treated uniformly as reload triggers. A reload
/// re-reads and re-compiles the whole file; on success the new table is
/// stored with a single atomic swap so in-flight requests observe either the
/// old table or the new one, never a mix. On failure the prior table stays
/// live. The loop exits when the token is cancelled.
pub async fn watch_rules(
    path: PathBuf,
    table: Arc<ArcSwap<RuleTable>>,
    cancel_token: CancellationToken,
) {
    info!(config_path = %path.display(), "starting config reloader");

    let (tx, mut rx) = mpsc::channel::<Event>(16);

    // notify delivers events on its own thread; bridge them into the async loop
    let mut watcher = match notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
        if let Ok(event) = res {
            let _ = tx.blocking_send(event);
        }
    }) {
        Ok(watcher) => watcher,
        Err(err) => {
            error!(%err, "failed to create file watcher");
            return;
        }
    };

    if let Err(err) = watcher.watch(&path, RecursiveMode::NonRecursive) {
        error!(%err, config_path = %path.display(), "failed to watch file");
        return;
    }

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("shutting down config reload worker");
                return;
            }
            event = rx.recv() => {
                let Some(event) = event else {
                    warn!("file watcher channel closed");
                    return;
                };
                if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    continue;
                }
                match Config::load(&path) {
                    Ok(config) => {
                        let compiled = compile_rules(&config.rules, &config.rule_defaults());
                        info!(
                            hosts = compiled.host_count(),
                            rules = compiled.rule_count(),
                            "reloaded config"
                        );
                        table.store(Arc::new(compiled));
                    }
                    Err(err) => {
                        error!(%err, "error reloading config, reusing existing config");
                    }
                }
            }
        }
    }
}
