use regex::Regex;
use std::sync::LazyLock;

/// What to do when a rule's pattern matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    /// Replace every match with nothing.
    Strip,
    /// Cut the text at the earliest match and drop everything after it.
    Truncate,
}

struct Rule {
    name: &'static str,
    pattern: &'static str,
    action: Action,
}

/// The sanitization chain. Order is a contract: URLs, mentions and hashtags
/// must be stripped before the subscribe-CTA truncation so that leftover
/// punctuation from removed tokens cannot shift a cut point.
static RULES: &[Rule] = &[
    Rule {
        name: "bare-urls",
        pattern: r"https?://\S+|t\.me/\S+",
        action: Action::Strip,
    },
    Rule {
        name: "mentions",
        pattern: r"@[A-Za-z0-9_]+",
        action: Action::Strip,
    },
    Rule {
        name: "hashtags",
        pattern: r"(?:^|\s)#[^\s#]+",
        action: Action::Strip,
    },
    // "Sent in by a reader" boilerplate common in district channels.
    Rule {
        name: "reader-sent-subscriber",
        pattern: r"(?i)\bподписчик\s+прислал[аи]?\b.*",
        action: Action::Strip,
    },
    Rule {
        name: "reader-sent-subscriber-f",
        pattern: r"(?i)\bподписчица\s+прислал[аи]?\b.*",
        action: Action::Strip,
    },
    Rule {
        name: "reader-sent",
        pattern: r"(?i)\bприслал[аи]?\b.*",
        action: Action::Strip,
    },
    Rule {
        name: "reader-writes",
        pattern: r"(?i)\bнам\s+пишут.*",
        action: Action::Strip,
    },
    Rule {
        name: "reader-reports",
        pattern: r"(?i)\bсообщают.*",
        action: Action::Strip,
    },
    Rule {
        name: "via-bot",
        pattern: r"(?i)\bприслано\s+через\s+бота.*",
        action: Action::Strip,
    },
    Rule {
        name: "to-bot",
        pattern: r"(?i)\bв\s+бот\s+прислал[аи]?\b.*",
        action: Action::Strip,
    },
    // Subscribe/join invitations mark the start of the channel's own promo
    // tail; everything from the first one onward is dropped.
    Rule {
        name: "cta-subscribe",
        pattern: r"(?i)\bподписывайтесь?\b",
        action: Action::Truncate,
    },
    Rule {
        name: "cta-subscribe-2sg",
        pattern: r"(?i)\bподписывайся\b",
        action: Action::Truncate,
    },
    Rule {
        name: "cta-subscribe-inf",
        pattern: r"(?i)\bподписаться\b",
        action: Action::Truncate,
    },
    Rule {
        name: "cta-subscribe-imp",
        pattern: r"(?i)\bподпишись\b",
        action: Action::Truncate,
    },
    Rule {
        name: "cta-join",
        pattern: r"(?i)\bвступай(те)?\b",
        action: Action::Truncate,
    },
    Rule {
        name: "cta-signup",
        pattern: r"(?i)\bоформляй(те)?\b",
        action: Action::Truncate,
    },
];

static COMPILED: LazyLock<Vec<(Regex, &'static Rule)>> = LazyLock::new(|| {
    RULES
        .iter()
        .filter_map(|r| Regex::new(r.pattern).ok().map(|re| (re, r)))
        .collect()
});

static HORIZONTAL_WS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").unwrap());
static BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Apply one rule to the text.
fn apply(re: &Regex, rule: &Rule, text: &str) -> String {
    match rule.action {
        Action::Strip => re.replace_all(text, "").into_owned(),
        Action::Truncate => match re.find(text) {
            Some(m) => text[..m.start()]
                .trim_end_matches([' ', '.', ',', '!', '—', '-'])
                .to_string(),
            None => text.to_string(),
        },
    }
}

/// Run the full sanitization chain: strip URLs/mentions/hashtags, drop
/// reader-submission boilerplate, cut at the first subscribe CTA, then
/// collapse whitespace.
pub fn sanitize(text: &str) -> String {
    let mut out = text.to_string();
    for (re, rule) in COMPILED.iter() {
        out = apply(re, rule, &out);
    }
    collapse_whitespace(&out)
}

/// Collapse runs of spaces/tabs to one space and runs of 3+ newlines to a
/// blank line, then trim.
pub fn collapse_whitespace(text: &str) -> String {
    let out = HORIZONTAL_WS.replace_all(text, " ");
    let out = BLANK_RUNS.replace_all(&out, "\n\n");
    out.trim().to_string()
}

/// Split text into sentences at `.`/`!`/`?`/`…` followed by whitespace, or
/// at newlines. Empty segments are dropped.
pub fn sentences(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut prev_terminal = false;

    for (i, c) in text.char_indices() {
        if c == '\n' || (prev_terminal && c.is_whitespace()) {
            if start < i {
                parts.push(&text[start..i]);
            }
            start = i + c.len_utf8();
        }
        prev_terminal = matches!(c, '.' | '!' | '?' | '…');
    }
    if start < text.len() {
        parts.push(&text[start..]);
    }

    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_bare_urls() {
        let s = sanitize("Открытие парка https://example.com/a?b=c сегодня");
        assert!(!s.contains("http"));
        assert!(!s.contains("example.com"));
        assert_eq!(s, "Открытие парка сегодня");
    }

    #[test]
    fn strips_tme_links() {
        let s = sanitize("Подробности t.me/somechannel/123 позже");
        assert!(!s.contains("t.me"));
    }

    #[test]
    fn strips_mentions_and_hashtags() {
        let s = sanitize("Новость от @some_channel про район #новости #район");
        assert!(!s.contains('@'));
        assert!(!s.contains('#'));
    }

    #[test]
    fn drops_reader_boilerplate_to_end() {
        let s = sanitize("Авария на мосту. Подписчик прислал фото с места");
        assert_eq!(s, "Авария на мосту.");
    }

    #[test]
    fn truncates_at_earliest_cta() {
        // "вступайте" appears before "подписывайтесь"; the cut must land on
        // the earlier marker.
        let s = sanitize("Важная новость! Вступайте в чат, подписывайтесь на канал");
        assert_eq!(s, "Важная новость");
    }

    #[test]
    fn cta_cut_trims_trailing_punctuation() {
        let s = sanitize("Сегодня ярмарка — подписывайтесь");
        assert_eq!(s, "Сегодня ярмарка");
    }

    #[test]
    fn token_stripping_precedes_cta_cut() {
        // The mention sits right before the CTA; stripping it first must not
        // leave punctuation that survives the cut.
        let s = sanitize("Новость дня. @channel подписывайтесь");
        assert_eq!(s, "Новость дня");
    }

    #[test]
    fn collapses_whitespace() {
        let s = sanitize("а  б\tв\n\n\n\nг");
        assert_eq!(s, "а б в\n\nг");
    }

    #[test]
    fn sanitize_is_identity_on_clean_text() {
        let clean = "Во дворе дома 5 открыли новую детскую площадку";
        assert_eq!(sanitize(clean), clean);
    }

    #[test]
    fn splits_sentences() {
        let s = sentences("Первое предложение. Второе! Третье?\nЧетвёртое");
        assert_eq!(s, vec!["Первое предложение.", "Второе!", "Третье?", "Четвёртое"]);
    }

    #[test]
    fn sentences_keeps_inline_dots() {
        let s = sentences("Дом 12 к.3 закрыт");
        assert_eq!(s.len(), 1);
    }
}
