use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default = "default_targets")]
    pub targets: Vec<TargetConfig>,
    /// Optional keyword override file: one `target,keyword` row per line.
    #[serde(default)]
    pub keywords_csv: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_fresh_hours")]
    pub fresh_hours: i64,
    #[serde(default = "default_max_posts")]
    pub max_posts_per_target: usize,
    #[serde(default = "default_send_delay_ms")]
    pub send_delay_ms: u64,
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    /// Dedup records older than this are pruned at startup.
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    #[serde(default = "default_token")]
    pub token: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            fresh_hours: default_fresh_hours(),
            max_posts_per_target: default_max_posts(),
            send_delay_ms: default_send_delay_ms(),
            store_path: default_store_path(),
            retention_days: default_retention_days(),
            token: default_token(),
        }
    }
}

/// One delivery destination with its source channels and locality keywords.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    /// Chat literal: `@handle`, numeric id, or a t.me URL.
    pub chat: String,
    pub sources: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

// Defaults
fn default_fresh_hours() -> i64 {
    48
}
fn default_max_posts() -> usize {
    5
}
fn default_send_delay_ms() -> u64 {
    700
}
fn default_store_path() -> PathBuf {
    PathBuf::from("sent.json")
}
fn default_retention_days() -> i64 {
    30
}
fn default_token() -> String {
    std::env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default()
}
fn default_targets() -> Vec<TargetConfig> {
    vec![
        TargetConfig {
            name: "Медведково".into(),
            chat: "https://t.me/ChatMedvedkovo".into(),
            sources: vec![
                "@YuzhnoeMedvedkovo".into(),
                "@medvedkovo_news".into(),
                "@medvedkovo_sosedi".into(),
                "@severnoye_medvedkovo".into(),
            ],
            keywords: vec![
                "медведково".into(),
                "полярная".into(),
                "широкая".into(),
                "шокальского".into(),
                "студеный".into(),
                "чермянская".into(),
                "осташковская".into(),
                "дежнева".into(),
            ],
        },
        TargetConfig {
            name: "Аэропорт".into(),
            chat: "https://t.me/Aeroport_Chat".into(),
            sources: vec![
                "@aerosokol".into(),
                "@sokol_news24".into(),
                "@AeroportMestoVstrechi".into(),
            ],
            keywords: vec![
                "аэропорт".into(),
                "сокол".into(),
                "ленинградский проспект".into(),
                "черняховского".into(),
                "усиевича".into(),
                "планетная".into(),
            ],
        },
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            relay: RelayConfig::default(),
            targets: default_targets(),
            keywords_csv: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read config {}: {e}", path.display())))?;
        toml::from_str(&content).map_err(|e| Error::config(format!("Failed to parse config: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        if self.relay.token.is_empty() {
            return Err(Error::config(
                "TELEGRAM_BOT_TOKEN not set. Export it or set relay.token in config.toml",
            ));
        }
        if self.targets.is_empty() {
            return Err(Error::config("no targets configured"));
        }
        Ok(())
    }
}

/// Capability: given a target name, produce its locality keyword set.
/// Decouples the classifier from where the dictionary lives.
pub trait KeywordProvider {
    fn keywords(&self, target: &str) -> Option<Vec<String>>;
}

/// Override provider reading `target,keyword` rows from a CSV file.
pub struct CsvKeywords {
    map: HashMap<String, Vec<String>>,
}

impl CsvKeywords {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read {}: {e}", path.display())))?;
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((target, keyword)) = line.split_once(',') else {
                continue;
            };
            let keyword = normalize_keyword(keyword);
            if !keyword.is_empty() {
                map.entry(target.trim().to_string()).or_default().push(keyword);
            }
        }
        Ok(Self { map })
    }
}

impl KeywordProvider for CsvKeywords {
    fn keywords(&self, target: &str) -> Option<Vec<String>> {
        self.map.get(target).cloned()
    }
}

/// Default provider backed by the per-target lists in the config file.
pub struct ConfigKeywords {
    map: HashMap<String, Vec<String>>,
}

impl ConfigKeywords {
    pub fn new(targets: &[TargetConfig]) -> Self {
        let map = targets
            .iter()
            .map(|t| {
                (
                    t.name.clone(),
                    t.keywords.iter().map(|k| normalize_keyword(k)).collect(),
                )
            })
            .collect();
        Self { map }
    }
}

impl KeywordProvider for ConfigKeywords {
    fn keywords(&self, target: &str) -> Option<Vec<String>> {
        self.map.get(target).cloned()
    }
}

/// Keywords are matched against lowercased, ё-folded text; fold them the
/// same way once at load time.
fn normalize_keyword(kw: &str) -> String {
    kw.trim().to_lowercase().replace('ё', "е")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config_parses() {
        let toml = r#"
[relay]
fresh_hours = 24
max_posts_per_target = 3
send_delay_ms = 500
store_path = "state/sent.json"
retention_days = 14
token = "123:abc"

[[targets]]
name = "Тестовый"
chat = "@test_chat"
sources = ["@src_one", "@src_two"]
keywords = ["тест", "Ёлки"]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.relay.fresh_hours, 24);
        assert_eq!(config.relay.max_posts_per_target, 3);
        assert_eq!(config.targets.len(), 1);
        assert_eq!(config.targets[0].sources.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.relay.fresh_hours, 48);
        assert_eq!(config.relay.max_posts_per_target, 5);
        assert_eq!(config.relay.send_delay_ms, 700);
        assert_eq!(config.relay.retention_days, 30);
        assert!(!config.targets.is_empty());
    }

    #[test]
    fn validate_rejects_empty_token() {
        let mut config = Config::default();
        config.relay.token = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_keywords_normalize() {
        let targets = vec![TargetConfig {
            name: "Т".into(),
            chat: "@t".into(),
            sources: vec![],
            keywords: vec!["Студёный".into()],
        }];
        let provider = ConfigKeywords::new(&targets);
        assert_eq!(provider.keywords("Т").unwrap(), vec!["студеный"]);
        assert!(provider.keywords("нет").is_none());
    }

    #[test]
    fn csv_keywords_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("toponyms.csv");
        std::fs::write(&path, "# комментарий\nМедведково,Полярная\nМедведково,Широкая\nФили,багратионовский\n").unwrap();

        let provider = CsvKeywords::load(&path).unwrap();
        assert_eq!(
            provider.keywords("Медведково").unwrap(),
            vec!["полярная", "широкая"]
        );
        assert_eq!(provider.keywords("Фили").unwrap().len(), 1);
    }
}
