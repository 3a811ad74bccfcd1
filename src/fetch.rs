//! Resolves source handles to fresh items via ordered mirror endpoints.

use crate::extract::{self, RawPost};
use crate::http::HttpClient;
use crate::sanitize;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

/// A post ready for filtering and dispatch: sanitized title/summary split
/// out of the extracted text.
#[derive(Debug, Clone, Serialize)]
pub struct Item {
    pub title: String,
    pub summary: String,
    pub published: DateTime<Utc>,
    pub source: String,
    pub raw: String,
    pub photo_urls: Vec<String>,
    pub video_urls: Vec<String>,
}

/// Direct preview host first, then the rendering proxies.
fn mirror_urls(handle: &str) -> [String; 3] {
    [
        format!("https://t.me/s/{handle}"),
        format!("https://r.jina.ai/https://t.me/s/{handle}"),
        format!("https://r.jina.ai/http://t.me/s/{handle}"),
    ]
}

/// First sentence becomes the title, the rest the summary. Unsegmentable
/// text falls back to a 120-char prefix.
pub fn item_from_post(post: RawPost) -> Item {
    let sents = sanitize::sentences(&post.text);
    let title = sents
        .first()
        .cloned()
        .unwrap_or_else(|| post.text.chars().take(120).collect());
    let summary = if sents.len() > 1 {
        sents[1..].join(" ")
    } else {
        String::new()
    };
    Item {
        title,
        summary,
        published: post.published,
        source: post.source,
        raw: post.text,
        photo_urls: post.photo_urls,
        video_urls: post.video_urls,
    }
}

/// Fetch fresh items for every handle. Mirrors are tried in order until one
/// yields at least one fresh post; a handle whose mirrors are all exhausted
/// contributes zero items without affecting the others.
pub async fn fetch_sources(http: &HttpClient, handles: &[String], fresh_hours: i64) -> Vec<Item> {
    let since = Utc::now() - Duration::hours(fresh_hours);
    let mut out = Vec::new();

    for handle in handles {
        let h = handle.trim().trim_start_matches('@');
        if h.is_empty() {
            continue;
        }

        let mut total = 0;
        let mut fresh = 0;
        for url in mirror_urls(h) {
            let body = match http.get_text(&url).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(source = %h, url = %url, error = %e, "mirror failed, trying next");
                    continue;
                }
            };
            if body.is_empty() {
                continue;
            }

            let posts = extract::extract_posts(&body, &format!("@{h}"));
            total += posts.len();
            for p in posts {
                if p.published >= since {
                    fresh += 1;
                    out.push(item_from_post(p));
                }
            }
            if fresh > 0 {
                break;
            }
        }
        info!(source = %h, total, fresh, "channel fetched");
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(text: &str) -> RawPost {
        RawPost {
            source: "@chan".into(),
            published: Utc::now(),
            text: text.into(),
            photo_urls: vec![],
            video_urls: vec![],
        }
    }

    #[test]
    fn mirrors_try_direct_host_first() {
        let urls = mirror_urls("somechannel");
        assert_eq!(urls[0], "https://t.me/s/somechannel");
        assert!(urls[1].starts_with("https://r.jina.ai/https://"));
        assert!(urls[2].starts_with("https://r.jina.ai/http://"));
    }

    #[test]
    fn first_sentence_becomes_title() {
        let item = item_from_post(post("Прорвало трубу на Широкой. Движение перекрыто. Ждём ремонта."));
        assert_eq!(item.title, "Прорвало трубу на Широкой.");
        assert_eq!(item.summary, "Движение перекрыто. Ждём ремонта.");
    }

    #[test]
    fn single_sentence_has_empty_summary() {
        let item = item_from_post(post("Короткая новость без точки"));
        assert_eq!(item.title, "Короткая новость без точки");
        assert!(item.summary.is_empty());
    }

    #[test]
    fn unsegmentable_text_truncates_to_prefix() {
        let item = item_from_post(post(""));
        assert!(item.title.is_empty());
        assert!(item.summary.is_empty());
    }
}
