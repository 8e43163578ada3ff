//! Service configuration
//!
//! Loaded once from TOML and handed to the constructors that need it:
//!
//! ```toml
//! [store]
//! project = "All-Projects"
//!
//! [server]
//! name = "Code Review"
//! email = "noreply@review.example.com"
//!
//! [cleaner]
//! start_delay = "1 min"
//! interval = "1 day"     # "off" or "disabled" never schedules a sweep
//! max_age = "3 days"
//!
//! [projects."platform/app"]
//! use_content_merge = false
//! ```
//!
//! Durations are `<n> <unit>`; a bare number counts seconds.

use crate::artifacts::merge::strategy::MergeStrategy;
use crate::errors::{BatchError, BatchResult};
use crate::services::identity::ServerIdent;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

const DEFAULT_STORE_PROJECT: &str = "All-Projects";
const DISABLED_INTERVALS: [&str; 3] = ["off", "disabled", "never"];

static DURATION_REGEX: LazyLock<Result<regex::Regex, regex::Error>> =
    LazyLock::new(|| regex::Regex::new(r"^\s*(\d+)\s*([a-zA-Z]*)\s*$"));

const UNIT_SECONDS: phf::Map<&'static str, u64> = phf::phf_map! {
    "" => 1,
    "s" => 1,
    "sec" => 1,
    "secs" => 1,
    "second" => 1,
    "seconds" => 1,
    "m" => 60,
    "min" => 60,
    "mins" => 60,
    "minute" => 60,
    "minutes" => 60,
    "h" => 3600,
    "hr" => 3600,
    "hour" => 3600,
    "hours" => 3600,
    "d" => 86400,
    "day" => 86400,
    "days" => 86400,
    "w" => 604800,
    "week" => 604800,
    "weeks" => 604800,
};

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchConfig {
    pub store: StoreConfig,
    pub server: ServerConfig,
    pub cleaner: CleanerConfig,
    pub projects: HashMap<String, ProjectConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Project holding batch records
    pub project: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            project: DEFAULT_STORE_PROJECT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub name: String,
    pub email: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let ident = ServerIdent::default();
        ServerConfig {
            name: ident.name,
            email: ident.email,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CleanerConfig {
    #[serde(deserialize_with = "deserialize_duration")]
    pub start_delay: Duration,
    /// `None` when sweeping is disabled
    #[serde(deserialize_with = "deserialize_interval")]
    pub interval: Option<Duration>,
    #[serde(deserialize_with = "deserialize_duration")]
    pub max_age: Duration,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        CleanerConfig {
            start_delay: Duration::from_secs(60),
            interval: Some(Duration::from_secs(86400)),
            max_age: Duration::from_secs(3 * 86400),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    pub use_content_merge: bool,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        ProjectConfig {
            use_content_merge: true,
        }
    }
}

impl BatchConfig {
    pub fn load(path: &Path) -> BatchResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|err| BatchError::Config(format!("failed to read {}: {err}", path.display())))?;
        Self::from_toml_str(&content)
            .map_err(|err| BatchError::Config(format!("{}: {err}", path.display())))
    }

    pub fn from_toml_str(content: &str) -> BatchResult<Self> {
        toml::from_str(content).map_err(|err| BatchError::Config(err.to_string()))
    }

    pub fn server_ident(&self) -> ServerIdent {
        ServerIdent::new(self.server.name.clone(), self.server.email.clone())
    }

    /// Default merge strategy for batches onto `project`
    pub fn strategy_for(&self, project: &str) -> MergeStrategy {
        let use_content_merge = self
            .projects
            .get(project)
            .map(|config| config.use_content_merge)
            .unwrap_or(true);
        MergeStrategy::for_project(use_content_merge)
    }
}

/// Parse `<n> <unit>`, such as `90s`, `5 min` or `3 days`
pub fn parse_duration(value: &str) -> BatchResult<Duration> {
    let invalid = || BatchError::Config(format!("invalid duration: {value:?}"));

    let regex = DURATION_REGEX
        .as_ref()
        .map_err(|err| BatchError::Config(format!("invalid duration regex: {err}")))?;
    let captures = regex.captures(value).ok_or_else(invalid)?;

    let amount = captures[1].parse::<u64>().map_err(|_| invalid())?;
    let unit = captures[2].to_ascii_lowercase();
    let scale = UNIT_SECONDS.get(unit.as_str()).ok_or_else(invalid)?;

    amount
        .checked_mul(*scale)
        .map(Duration::from_secs)
        .ok_or_else(invalid)
}

/// Like [`parse_duration`], with `off` and `disabled` meaning never
pub fn parse_interval(value: &str) -> BatchResult<Option<Duration>> {
    if DISABLED_INTERVALS.contains(&value.trim().to_ascii_lowercase().as_str()) {
        return Ok(None);
    }
    parse_duration(value).map(Some)
}

fn deserialize_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}

fn deserialize_interval<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_interval(&raw).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::TempDir;
    use assert_fs::prelude::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("90", 90)]
    #[case("90s", 90)]
    #[case("5 min", 300)]
    #[case("2 Hours", 7200)]
    #[case("3 days", 259200)]
    #[case(" 1w ", 604800)]
    fn parses_durations(#[case] raw: &str, #[case] seconds: u64) {
        assert_eq!(parse_duration(raw).unwrap(), Duration::from_secs(seconds));
    }

    #[rstest]
    #[case("")]
    #[case("soon")]
    #[case("3 fortnights")]
    #[case("-1 min")]
    #[case("99999999999999999999 days")]
    fn rejects_malformed_durations(#[case] raw: &str) {
        assert!(matches!(parse_duration(raw), Err(BatchError::Config(_))));
    }

    #[rstest]
    #[case("off")]
    #[case("DISABLED")]
    fn intervals_can_be_disabled(#[case] raw: &str) {
        assert_eq!(parse_interval(raw).unwrap(), None);
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = BatchConfig::from_toml_str("").unwrap();

        assert_eq!(config.store.project, "All-Projects");
        assert_eq!(config.cleaner, CleanerConfig::default());
        assert_eq!(config.server_ident(), ServerIdent::default());
        assert_eq!(config.strategy_for("anything"), MergeStrategy::Resolve);
    }

    #[test]
    fn reads_every_section() {
        let config = BatchConfig::from_toml_str(
            r#"
            [store]
            project = "Batches"

            [server]
            name = "Review Bot"
            email = "bot@example.com"

            [cleaner]
            start_delay = "5 min"
            interval = "off"
            max_age = "1 week"

            [projects."platform/app"]
            use_content_merge = false
            "#,
        )
        .unwrap();

        assert_eq!(config.store.project, "Batches");
        assert_eq!(config.server_ident().name, "Review Bot");
        assert_eq!(config.cleaner.start_delay, Duration::from_secs(300));
        assert_eq!(config.cleaner.interval, None);
        assert_eq!(config.cleaner.max_age, Duration::from_secs(604800));
        assert_eq!(config.strategy_for("platform/app"), MergeStrategy::SimpleTwoWayInCore);
        assert_eq!(config.strategy_for("platform/other"), MergeStrategy::Resolve);
    }

    #[test]
    fn unknown_keys_and_bad_values_are_config_errors() {
        assert!(matches!(
            BatchConfig::from_toml_str("[cleaner]\nmax_age = \"soon\""),
            Err(BatchError::Config(_))
        ));
        assert!(matches!(
            BatchConfig::from_toml_str("[store]\nname = \"x\""),
            Err(BatchError::Config(_))
        ));
    }

    #[test]
    fn loads_from_a_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.child("batch.toml");
        file.write_str("[cleaner]\ninterval = \"12 hours\"\n").unwrap();

        let config = BatchConfig::load(file.path()).unwrap();
        assert_eq!(config.cleaner.interval, Some(Duration::from_secs(43200)));
        assert!(BatchConfig::load(&dir.path().join("missing.toml")).is_err());
    }
}
