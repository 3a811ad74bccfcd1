//! Turns one channel preview page into structured posts.

use crate::sanitize;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;

/// One extracted post, before filtering.
#[derive(Debug, Clone)]
pub struct RawPost {
    pub source: String,
    pub published: DateTime<Utc>,
    /// Sanitized text (the sanitization chain runs at extraction time).
    pub text: String,
    pub photo_urls: Vec<String>,
    pub video_urls: Vec<String>,
}

static PINNED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bpinned\b|\bзакрепил[аио]?\b|\bзакреплено\b").unwrap());

static BG_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"background-image:\s*url\(['"]?(https?://[^'"\)]+)"#).unwrap()
});

/// Permissive timestamp parsing: machine-readable first, then the human
/// formats the preview pages put in tooltip attributes. Values without a
/// timezone are taken as UTC.
pub fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    const NAIVE_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%b %d, %Y %H:%M:%S",
        "%b %d, %Y, %H:%M:%S",
        "%d.%m.%Y %H:%M:%S",
        "%d.%m.%Y %H:%M",
    ];
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn push_unique(urls: &mut Vec<String>, seen: &mut HashSet<String>, url: &str) {
    let url = url.trim();
    if url.starts_with("http") && seen.insert(url.to_string()) {
        urls.push(url.to_string());
    }
}

/// Extract zero or more posts from a preview page. Nodes missing a
/// timestamp, or with neither text nor media, are dropped; short pinned
/// markers are dropped outright.
pub fn extract_posts(html: &str, source: &str) -> Vec<RawPost> {
    let document = Html::parse_document(html);
    let mut posts = Vec::new();

    let Ok(wrap_sel) = Selector::parse(".tgme_widget_message_wrap") else {
        return posts;
    };

    for msg in document.select(&wrap_sel) {
        let published = resolve_timestamp(msg);

        let raw_text = text_block(msg);
        if PINNED.is_match(&raw_text) && raw_text.split_whitespace().count() <= 6 {
            continue;
        }
        let text = sanitize::sanitize(&raw_text);

        let photos = photo_urls(msg);
        let videos = video_urls(msg);

        let Some(published) = published else { continue };
        if text.is_empty() && photos.is_empty() && videos.is_empty() {
            continue;
        }

        posts.push(RawPost {
            source: source.to_string(),
            published,
            text,
            photo_urls: photos,
            video_urls: videos,
        });
    }

    posts
}

fn resolve_timestamp(msg: ElementRef<'_>) -> Option<DateTime<Utc>> {
    if let Ok(time_sel) = Selector::parse("time") {
        if let Some(t) = msg.select(&time_sel).next() {
            let candidate = t
                .value()
                .attr("datetime")
                .map(String::from)
                .unwrap_or_else(|| element_text(t));
            if let Some(dt) = parse_datetime(&candidate) {
                return Some(dt);
            }
        }
    }
    if let Ok(date_sel) = Selector::parse("a.tgme_widget_message_date") {
        if let Some(a) = msg.select(&date_sel).next() {
            if let Some(title) = a.value().attr("title") {
                return parse_datetime(title);
            }
        }
    }
    None
}

fn text_block(msg: ElementRef<'_>) -> String {
    for sel_str in [".tgme_widget_message_text", ".tgme_widget_message_description"] {
        if let Ok(sel) = Selector::parse(sel_str) {
            if let Some(el) = msg.select(&sel).next() {
                return element_text(el);
            }
        }
    }
    String::new()
}

fn photo_urls(msg: ElementRef<'_>) -> Vec<String> {
    let mut urls = Vec::new();
    let mut seen = HashSet::new();
    if let Ok(sel) = Selector::parse("a.tgme_widget_message_photo_wrap") {
        for a in msg.select(&sel) {
            let style = a.value().attr("style").unwrap_or("");
            if let Some(caps) = BG_IMAGE.captures(style) {
                push_unique(&mut urls, &mut seen, &caps[1]);
            }
        }
    }
    urls
}

fn video_urls(msg: ElementRef<'_>) -> Vec<String> {
    let mut urls = Vec::new();
    let mut seen = HashSet::new();
    if let Ok(sel) =
        Selector::parse("a.tgme_widget_message_video_wrap, a.tgme_widget_message_roundvideo_wrap")
    {
        for a in msg.select(&sel) {
            if let Some(href) = a.value().attr("href") {
                push_unique(&mut urls, &mut seen, href);
            }
            if let Some(dv) = a.value().attr("data-video") {
                push_unique(&mut urls, &mut seen, dv);
            }
        }
    }
    if let Ok(sel) = Selector::parse("video, source") {
        for v in msg.select(&sel) {
            if let Some(src) = v.value().attr("src") {
                push_unique(&mut urls, &mut seen, src);
            }
        }
    }
    urls
}
