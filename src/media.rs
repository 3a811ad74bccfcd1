//! Media candidate validation and size-capped download.

use crate::http::HttpClient;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

pub const MAX_MEDIA_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Video,
}

/// A fully downloaded asset. Never persisted.
#[derive(Clone)]
pub struct MediaAsset {
    pub name: String,
    pub data: Vec<u8>,
    pub kind: MediaKind,
}

static IMG_EXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(jpe?g|png|webp|gif)(\?.*)?$").unwrap());
static VIDEO_EXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(mp4|mov|webm)(\?.*)?$").unwrap());
static CDN_HOST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^https?://[^/]*telegram[^/]*\.(org|cdn)/.*").unwrap());

pub fn is_image_url(url: &str) -> bool {
    url.starts_with("http") && (IMG_EXT.is_match(url) || CDN_HOST.is_match(url))
}

pub fn is_video_url(url: &str) -> bool {
    url.starts_with("http") && (VIDEO_EXT.is_match(url) || CDN_HOST.is_match(url))
}

/// Kind and file extension from the declared content type, with URL hints as
/// fallback for ambiguous video responses.
fn classify(content_type: &str, url: &str) -> Option<(MediaKind, &'static str)> {
    if content_type.contains("image/") {
        let ext = if content_type.contains("png") {
            ".png"
        } else if content_type.contains("webp") {
            ".webp"
        } else if content_type.contains("gif") {
            ".gif"
        } else {
            ".jpg"
        };
        return Some((MediaKind::Photo, ext));
    }
    if content_type.contains("video/") || VIDEO_EXT.is_match(url) {
        let ext = if content_type.contains("webm") || url.to_lowercase().ends_with(".webm") {
            ".webm"
        } else {
            ".mp4"
        };
        return Some((MediaKind::Video, ext));
    }
    None
}

/// Try each candidate in order and return the first that validates and fully
/// downloads under the byte ceiling. `None` is not an error: the caller
/// falls back to text-only delivery.
pub async fn resolve(
    http: &HttpClient,
    candidates: &[String],
    max_bytes: usize,
) -> Option<MediaAsset> {
    for raw in candidates {
        let url = raw.trim().replace("&amp;", "&");
        if url.is_empty() || !(is_image_url(&url) || is_video_url(&url)) {
            continue;
        }
        if let Some(asset) = download(http, &url, max_bytes).await {
            return Some(asset);
        }
    }
    None
}

/// Append a chunk unless it would take the buffer past the ceiling. Returns
/// false on breach, leaving the buffer untouched so the caller can abort the
/// transfer immediately.
fn append_within_ceiling(buf: &mut Vec<u8>, chunk: &[u8], max_bytes: usize) -> bool {
    if buf.len() + chunk.len() > max_bytes {
        return false;
    }
    buf.extend_from_slice(chunk);
    true
}

/// Stream the body, enforcing the ceiling per chunk so an oversized download
/// is aborted mid-transfer instead of after full buffering.
async fn download(http: &HttpClient, url: &str, max_bytes: usize) -> Option<MediaAsset> {
    let mut resp = http.get_raw(url).await.ok()?;
    if !resp.status().is_success() {
        return None;
    }

    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_lowercase();
    let (kind, ext) = classify(&content_type, url)?;

    let mut data = Vec::new();
    loop {
        match resp.chunk().await {
            Ok(Some(chunk)) => {
                if !append_within_ceiling(&mut data, &chunk, max_bytes) {
                    debug!(url, bytes = data.len(), "media exceeds size ceiling, aborting");
                    return None;
                }
            }
            Ok(None) => break,
            Err(_) => return None,
        }
    }

    if data.is_empty() {
        return None;
    }
    Some(MediaAsset {
        name: format!("media{ext}"),
        data,
        kind,
    })
}
