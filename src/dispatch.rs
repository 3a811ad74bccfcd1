//! Delivery to target chats via the bot messaging API.
//!
//! The dispatcher owns the token and a TTL-bounded reachability cache, so
//! nothing here lives as process-wide state.

use crate::http::HttpClient;
use crate::media::{MediaAsset, MediaKind};
use crate::sanitize;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

const API_BASE: &str = "https://api.telegram.org";
const CAPTION_LIMIT: usize = 1024;
const MESSAGE_LIMIT: usize = 4096;
const CHUNK_RETRIES: u32 = 2;
const CHUNK_RETRY_PAUSE: Duration = Duration::from_millis(500);
const MEDIA_RETRY_PAUSE: Duration = Duration::from_millis(600);
const REACHABILITY_TTL: Duration = Duration::from_secs(60 * 60);

static USERNAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]{5,32}$").unwrap());

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    ok: bool,
}

fn response_ok(body: &str) -> bool {
    serde_json::from_str::<ApiResponse>(body)
        .map(|r| r.ok)
        .unwrap_or(false)
}

/// Normalize a chat literal: numeric ids and `@handles` pass through;
/// t.me/telegram.me URLs with a plain username path become `@username`.
pub fn normalize_chat_id(chat: &str) -> String {
    let s = chat.trim();
    if s.is_empty() || s.starts_with('@') {
        return s.to_string();
    }
    let Some(rest) = s
        .strip_prefix("https://")
        .or_else(|| s.strip_prefix("http://"))
    else {
        return s.to_string();
    };
    let (host, path) = rest.split_once('/').unwrap_or((rest, ""));
    if !(host.ends_with("t.me") || host.ends_with("telegram.me")) {
        return s.to_string();
    }
    let path = path.trim_matches('/');
    if path.is_empty()
        || path.contains('+')
        || path.contains("joinchat")
        || path.contains("addstickers")
        || path.contains("s/")
    {
        return s.to_string();
    }
    let username = path.split('/').next().unwrap_or("");
    if USERNAME.is_match(username) {
        format!("@{username}")
    } else {
        s.to_string()
    }
}

/// Greedily pack lines into chunks that stay within `limit` characters.
/// Joining the chunks back with `\n` reconstructs the input. A single line
/// longer than `limit` is emitted as one oversized chunk rather than split
/// mid-line; the API rejects it and the per-chunk retry path reports the
/// failure.
pub fn split_chunks(text: &str, limit: usize) -> Vec<String> {
    if text.chars().count() <= limit {
        return vec![text.to_string()];
    }
    let mut parts = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut cur_len = 0;
    for line in text.split('\n') {
        let ln = line.chars().count() + 1;
        if cur_len + ln > limit && !current.is_empty() {
            parts.push(current.join("\n"));
            current = vec![line];
            cur_len = ln;
        } else {
            current.push(line);
            cur_len += ln;
        }
    }
    if !current.is_empty() {
        parts.push(current.join("\n"));
    }
    parts
}

/// Caption: `title — summary`, capped at the API's 1024-char caption limit.
/// A missing title is promoted from the summary's first sentence.
pub fn build_caption(title: &str, summary: &str) -> String {
    let mut title = sanitize::sanitize(title);
    let mut summary = sanitize::sanitize(summary);
    if title.is_empty() {
        let sents = sanitize::sentences(&summary);
        title = sents
            .first()
            .cloned()
            .unwrap_or_else(|| summary.chars().take(140).collect());
        summary = if sents.len() > 1 {
            sents[1..].join(" ")
        } else {
            String::new()
        };
    }
    let detail = if summary.is_empty() {
        title
    } else {
        format!("{title} — {summary}")
    };
    detail.trim().chars().take(CAPTION_LIMIT).collect()
}

pub struct Dispatcher {
    http: HttpClient,
    token: String,
    api_base: String,
    reachability: HashMap<String, (bool, Instant)>,
    reachability_ttl: Duration,
}

impl Dispatcher {
    pub fn new(http: HttpClient, token: String) -> Self {
        Self {
            http,
            token,
            api_base: API_BASE.to_string(),
            reachability: HashMap::new(),
            reachability_ttl: REACHABILITY_TTL,
        }
    }

    /// Point the dispatcher at a different API endpoint (local stand-ins in
    /// tests).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    pub fn with_reachability_ttl(mut self, ttl: Duration) -> Self {
        self.reachability_ttl = ttl;
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.token)
    }

    /// `getChat` reachability check, cached per chat with a one-hour TTL.
    /// A failure is cached too so an unreachable chat is not re-checked per
    /// item.
    pub async fn check_chat(&mut self, chat: &str) -> bool {
        let chat = normalize_chat_id(chat);
        if let Some((ok, at)) = self.reachability.get(&chat) {
            if at.elapsed() < self.reachability_ttl {
                return *ok;
            }
        }
        let url = format!("{}?chat_id={chat}", self.method_url("getChat"));
        let ok = match self.http.get_json::<ApiResponse>(&url).await {
            Ok(resp) => resp.ok,
            Err(e) => {
                debug!(chat = %chat, error = %e, "getChat failed");
                false
            }
        };
        self.reachability.insert(chat, (ok, Instant::now()));
        ok
    }

    /// Chunked plain-text delivery. Every chunk gets its own bounded retry;
    /// a chunk exhausting its retries fails the whole post, but remaining
    /// chunks are still attempted.
    pub async fn send_message(&mut self, chat: &str, text: &str) -> bool {
        let chat = normalize_chat_id(chat);
        if !self.check_chat(&chat).await {
            warn!(chat = %chat, "send cancelled: bot cannot see the chat");
            return false;
        }
        let url = self.method_url("sendMessage");
        let mut ok_all = true;
        for chunk in split_chunks(text, MESSAGE_LIMIT) {
            let mut sent = false;
            for _ in 0..CHUNK_RETRIES {
                let params = [
                    ("chat_id", chat.clone()),
                    ("text", chunk.clone()),
                    ("disable_web_page_preview", "true".to_string()),
                ];
                match self.http.post_form(&url, &params).await {
                    Ok(body) if response_ok(&body) => {
                        sent = true;
                        break;
                    }
                    Ok(_) | Err(_) => sleep(CHUNK_RETRY_PAUSE).await,
                }
            }
            if !sent {
                ok_all = false;
            }
        }
        ok_all
    }

    /// Multipart photo/video upload with caption.
    pub async fn send_media(&mut self, chat: &str, asset: &MediaAsset, caption: &str) -> bool {
        let chat = normalize_chat_id(chat);
        let (method, field) = match asset.kind {
            MediaKind::Photo => ("sendPhoto", "photo"),
            MediaKind::Video => ("sendVideo", "video"),
        };
        let url = self.method_url(method);

        for _ in 0..2 {
            let make_form = || {
                let part = reqwest::multipart::Part::bytes(asset.data.clone())
                    .file_name(asset.name.clone());
                reqwest::multipart::Form::new()
                    .text("chat_id", chat.clone())
                    .text("caption", caption.to_string())
                    .part(field, part)
            };
            match self.http.post_multipart(&url, make_form).await {
                Ok(body) if response_ok(&body) => return true,
                Ok(_) | Err(_) => sleep(MEDIA_RETRY_PAUSE).await,
            }
        }
        false
    }

    /// Deliver one post: media with caption when an asset resolved, with a
    /// mandatory fallback to plain text of the identical caption. An empty
    /// caption is never sent as text, the API rejects empty messages, so a
    /// text-less post either goes out as media or fails.
    pub async fn send_item(
        &mut self,
        chat: &str,
        title: &str,
        summary: &str,
        media: Option<&MediaAsset>,
    ) -> bool {
        let caption = build_caption(title, summary);
        if let Some(asset) = media {
            if self.send_media(chat, asset, &caption).await {
                return true;
            }
            warn!(chat = %chat, "media send failed, falling back to text");
        }
        if caption.is_empty() {
            warn!(chat = %chat, "no text to fall back to, giving up on the post");
            return false;
        }
        self.send_message(chat, &caption).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_id_passthrough() {
        assert_eq!(normalize_chat_id("@some_chat"), "@some_chat");
        assert_eq!(normalize_chat_id("-1001234567890"), "-1001234567890");
        assert_eq!(normalize_chat_id("  @x  "), "@x");
    }

    #[test]
    fn chat_url_normalizes_to_username() {
        assert_eq!(
            normalize_chat_id("https://t.me/ChatMedvedkovo"),
            "@ChatMedvedkovo"
        );
        assert_eq!(
            normalize_chat_id("http://telegram.me/SomeChat/42"),
            "@SomeChat"
        );
    }

    #[test]
    fn invite_and_preview_urls_pass_through() {
        assert_eq!(
            normalize_chat_id("https://t.me/+AbCdEf"),
            "https://t.me/+AbCdEf"
        );
        assert_eq!(
            normalize_chat_id("https://t.me/joinchat/xyz"),
            "https://t.me/joinchat/xyz"
        );
        assert_eq!(
            normalize_chat_id("https://t.me/s/channel"),
            "https://t.me/s/channel"
        );
        // too short for a username
        assert_eq!(normalize_chat_id("https://t.me/ab"), "https://t.me/ab");
    }

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(split_chunks("привет", 4096), vec!["привет"]);
    }

    #[test]
    fn chunks_roundtrip_and_respect_limit() {
        let lines: Vec<String> = (0..300).map(|i| format!("строка номер {i}")).collect();
        let text = lines.join("\n");
        let chunks = split_chunks(&text, 200);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 200));
        assert_eq!(chunks.join("\n"), text);
    }

    #[test]
    fn oversized_single_line_is_one_chunk() {
        let text = "x".repeat(250);
        assert_eq!(split_chunks(&text, 200), vec![text]);
    }

    #[test]
    fn empty_text_builds_empty_caption() {
        assert!(build_caption("", "").is_empty());
        assert!(build_caption("  ", "\n").is_empty());
    }

    #[test]
    fn chunking_preserves_empty_lines() {
        let text = format!("{}\n\n{}", "а".repeat(150), "б".repeat(150));
        let chunks = split_chunks(&text, 160);
        assert_eq!(chunks.join("\n"), text);
    }

    #[test]
    fn caption_joins_title_and_summary() {
        assert_eq!(
            build_caption("Заголовок", "Подробности тут"),
            "Заголовок — Подробности тут"
        );
        assert_eq!(build_caption("Только заголовок", ""), "Только заголовок");
    }

    #[test]
    fn caption_promotes_first_sentence_to_title() {
        let caption = build_caption("", "Первое предложение. Остальной текст.");
        assert!(caption.starts_with("Первое предложение."));
        assert!(caption.contains("— Остальной текст."));
    }

    #[test]
    fn caption_is_capped_at_1024_chars() {
        let caption = build_caption("Заголовок", &"д".repeat(3000));
        assert_eq!(caption.chars().count(), 1024);
    }

    #[test]
    fn caption_is_sanitized() {
        let caption = build_caption("Новость https://spam.example", "от @channel");
        assert!(!caption.contains("http"));
        assert!(!caption.contains('@'));
    }
}
