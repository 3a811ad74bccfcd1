//! Heuristic ad detection and locality matching.
//!
//! Five independent detectors vote on lowercased sanitized text; two or more
//! firing marks the post as promotional. No weights, no short-circuit — the
//! signals are counted so each detector stays testable on its own.

use regex::Regex;
use std::sync::LazyLock;

static AD_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(реклам|промо|партнерск|партнёрск|спонсор|скидк|акци[яи]|распродаж|заказ|заказывай|оформить|ждем вас|ждём вас|доставк|самовывоз|меню|ассортимент|каталог|кафе|пекарн|кофейн|салон|барбершоп|парикмахер|студия|маникюр|ногтев|массаж|курсы|тренинг|школа|секции|магазин|бутик|showroom|аренда|сдам|сдается|сдаётся|продам|куплю|купить|барахолка|объявлени[ея]|объявы|закажите|цена|прайс|сколько стоит|приглашаем|приглашаю|приходите|пишите|запись|записывайтесь|звоните|ведет набор|веду набор|мы открылись|процедура|стоимость|в личку|в лс)",
    )
    .unwrap()
});

static CTA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(приглаша(ю|ем)|приходите|пишите|запись|записывайтесь|ведет набор|веду набор|звоните|в личку|в лс|в директ|мы открылись|акция|скидка|стоимость|цена)\b",
    )
    .unwrap()
});

// Russian mobile/landline formats: +7/8 with optional separators. The
// look-behind keeps a leading digit run (e.g. an address or price) from
// producing a bogus match, so this one needs fancy-regex.
static PHONE: LazyLock<fancy_regex::Regex> = LazyLock::new(|| {
    fancy_regex::Regex::new(
        r"(?<!\d)(?:\+7|8)\s?\(?\d{3}\)?[\s\-]?\d{3}[\s\-]?\d{2}[\s\-]?\d{2}",
    )
    .unwrap()
});

static PRICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b\d{2,}[ \x{00A0}]?(₽|руб\.?|рублей)\b").unwrap()
});

static WORKTIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(ежедневно|с\s*\d{1,2}[:\.]\d{2}\s*до\s*\d{1,2}[:\.]\d{2})\b").unwrap()
});

/// Count how many of the five ad detectors fire on the text.
pub fn ad_signals(text: &str) -> u32 {
    if text.is_empty() {
        return 0;
    }
    let low = text.to_lowercase();
    let mut signals = 0;
    if AD_KEYWORDS.is_match(&low) {
        signals += 1;
    }
    if CTA.is_match(&low) {
        signals += 1;
    }
    if PHONE.is_match(&low).unwrap_or(false) {
        signals += 1;
    }
    if PRICE.is_match(&low) {
        signals += 1;
    }
    if WORKTIME.is_match(&low) {
        signals += 1;
    }
    signals
}

/// Promotional iff at least two detectors agree.
pub fn looks_like_ad(text: &str) -> bool {
    ad_signals(text) >= 2
}

/// True when the normalized text contains any locality keyword. An empty
/// keyword list matches nothing; callers treat that as "no locality filter".
pub fn mentions_local(text: &str, keywords: &[String]) -> bool {
    let low = text.to_lowercase().replace('ё', "е");
    keywords.iter().any(|kw| low.contains(kw.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_signal_is_not_an_ad() {
        // Price alone: legitimate news quote a cost all the time.
        assert!(!looks_like_ad("Ремонт дороги обойдётся в 3000000 руб"));
        // Keyword alone.
        assert!(!looks_like_ad("Школа №7 закрыта на каникулы"));
    }

    #[test]
    fn keyword_plus_phone_plus_cta_is_an_ad() {
        let t = "Скидка 20%, звоните +7 916 123 45 67";
        assert!(ad_signals(t) >= 2);
        assert!(looks_like_ad(t));
    }

    #[test]
    fn rental_listing_is_an_ad() {
        let t = "Сдам квартиру, звоните 8-916-000-00-00, цена 30000 руб";
        assert!(looks_like_ad(t));
    }

    #[test]
    fn business_hours_plus_keyword_is_an_ad() {
        assert!(looks_like_ad("Новая кофейня, ежедневно с 9:00 до 21:00"));
    }

    #[test]
    fn phone_detector_ignores_digit_prefixed_runs() {
        // A long numeric id must not register as a phone number.
        assert_eq!(ad_signals("Постановление 1489163123456 от вчера"), 0);
    }

    #[test]
    fn plain_news_passes() {
        assert!(!looks_like_ad(
            "На Полярной улице открыли новую детскую площадку"
        ));
    }

    #[test]
    fn empty_text_is_not_an_ad() {
        assert!(!looks_like_ad(""));
    }

    #[test]
    fn locality_match_normalizes_yo() {
        let kws = vec!["студеный".to_string()];
        assert!(mentions_local("Авария на Студёном проезде", &kws));
        assert!(!mentions_local("Авария на Тверской", &kws));
    }

    #[test]
    fn empty_keywords_match_nothing() {
        assert!(!mentions_local("любой текст", &[]));
    }
}
