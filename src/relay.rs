//! Per-target orchestration: fetch → filter → dedup → dispatch.

use crate::classify;
use crate::config::{Config, ConfigKeywords, CsvKeywords, KeywordProvider, TargetConfig};
use crate::dedup::{self, SentStore};
use crate::dispatch::{self, Dispatcher};
use crate::error::Result;
use crate::fetch::{self, Item};
use crate::http::HttpClient;
use crate::media::{self, MediaAsset};
use chrono::{DateTime, Duration, Utc};
use std::path::Path;
use tracing::{info, warn};

pub const USER_AGENT: &str = "Mozilla/5.0 (compatible; newsrelay/0.1; no-login)";

/// Per-target counters for the run summary.
pub struct TargetReport {
    pub name: String,
    pub raw: usize,
    pub filtered: usize,
    pub sent: usize,
}

/// CSV override when configured and readable, built-in dictionary otherwise.
/// Targets missing from the override fall back to their config list.
struct LayeredKeywords {
    over: Option<CsvKeywords>,
    base: ConfigKeywords,
}

impl KeywordProvider for LayeredKeywords {
    fn keywords(&self, target: &str) -> Option<Vec<String>> {
        self.over
            .as_ref()
            .and_then(|p| p.keywords(target))
            .or_else(|| self.base.keywords(target))
    }
}

fn keyword_provider(config: &Config) -> LayeredKeywords {
    let over = config.keywords_csv.as_deref().and_then(|path: &Path| {
        match CsvKeywords::load(path) {
            Ok(p) => {
                info!(path = %path.display(), "loaded keyword override");
                Some(p)
            }
            Err(e) => {
                warn!(error = %e, "keyword override unavailable, using built-in dictionary");
                None
            }
        }
    });
    LayeredKeywords {
        over,
        base: ConfigKeywords::new(&config.targets),
    }
}

/// Drop stale, promotional and out-of-locality items. An empty keyword list
/// disables the locality check for that target.
pub fn filter_items(
    items: Vec<Item>,
    fresh_hours: i64,
    keywords: &[String],
    now: DateTime<Utc>,
) -> Vec<Item> {
    items
        .into_iter()
        .filter(|it| {
            if now - it.published > Duration::hours(fresh_hours) {
                return false;
            }
            let full = format!("{} {} {}", it.title, it.summary, it.raw);
            let full = full.trim();
            if classify::looks_like_ad(full) {
                return false;
            }
            if !keywords.is_empty() && !classify::mentions_local(full, keywords) {
                return false;
            }
            true
        })
        .collect()
}

async fn resolve_media(http: &HttpClient, item: &Item) -> Option<MediaAsset> {
    if let Some(asset) = media::resolve(http, &item.video_urls, media::MAX_MEDIA_BYTES).await {
        return Some(asset);
    }
    media::resolve(http, &item.photo_urls, media::MAX_MEDIA_BYTES).await
}

/// Process one target end to end. Only a persistence failure propagates;
/// every per-item fault is logged and skipped.
pub async fn process_target(
    http: &HttpClient,
    dispatcher: &mut Dispatcher,
    store: &mut SentStore,
    config: &Config,
    target: &TargetConfig,
    provider: &dyn KeywordProvider,
) -> Result<TargetReport> {
    let chat = dispatch::normalize_chat_id(&target.chat);
    info!(
        target = %target.name,
        chat = %chat,
        sources = target.sources.len(),
        "processing target"
    );

    let items = fetch::fetch_sources(http, &target.sources, config.relay.fresh_hours).await;
    let raw = items.len();

    let keywords = provider.keywords(&target.name).unwrap_or_default();
    let mut filtered = filter_items(items, config.relay.fresh_hours, &keywords, Utc::now());
    filtered.sort_by(|a, b| b.published.cmp(&a.published));
    info!(target = %target.name, raw, filtered = filtered.len(), "filtering done");

    let mut sent = 0;
    for item in filtered.iter().take(config.relay.max_posts_per_target) {
        let key = dedup::content_key(&item.title, &item.summary, &item.source);
        if store.seen(&chat, &key) {
            continue;
        }

        // Videos are better evidence than photos; check them first.
        let asset = resolve_media(http, item).await;
        if dispatcher
            .send_item(&chat, &item.title, &item.summary, asset.as_ref())
            .await
        {
            store.record(&chat, &key, Utc::now())?;
            sent += 1;
        } else {
            warn!(source = %item.source, "dispatch failed, item left for next run");
        }
        tokio::time::sleep(std::time::Duration::from_millis(config.relay.send_delay_ms)).await;
    }

    Ok(TargetReport {
        name: target.name.clone(),
        raw,
        filtered: filtered.len(),
        sent,
    })
}

/// Walk every configured target in order. Target order is fixed; there is
/// no fan-out, to stay inside the endpoints' rate limits.
pub async fn run(config: &Config) -> Result<()> {
    let http = HttpClient::new(USER_AGENT)?;
    let mut store = SentStore::load(&config.relay.store_path, config.relay.retention_days)?;
    let mut dispatcher = Dispatcher::new(http.clone(), config.relay.token.clone());
    let provider = keyword_provider(config);

    info!(targets = config.targets.len(), known = store.len(), "relay starting");
    for target in &config.targets {
        let report =
            process_target(&http, &mut dispatcher, &mut store, config, target, &provider).await?;
        info!(
            target = %report.name,
            raw = report.raw,
            filtered = report.filtered,
            sent = report.sent,
            "target complete"
        );
    }
    info!("relay done");
    Ok(())
}
