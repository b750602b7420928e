//! Configuration types for Code Tutor.
//!
//! Configuration is JSON with camelCase keys. Files are layered in this order,
//! later layers overriding earlier ones key by key:
//!
//! 1. Built-in defaults
//! 2. System config (`/etc/code-tutor/config.json`), for shared deployments
//! 3. User config (`<config dir>/config.json`)
//!
//! The API key is resolved separately: `CODE_TUTOR_API_KEY` and
//! `ANTHROPIC_API_KEY` take precedence over the config file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, TutorError};

/// The config file name inside a config directory.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// System-wide config file for shared server deployments.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/code-tutor/config.json";

/// Environment variables checked for the API key, in order of precedence.
pub const API_KEY_ENV_VARS: [&str; 2] = ["CODE_TUTOR_API_KEY", "ANTHROPIC_API_KEY"];

/// Models offered during setup. Any other id is passed through unchanged.
pub const AVAILABLE_MODELS: [&str; 3] = ["claude-opus-4-5", "claude-sonnet-4-5", "claude-haiku-4-5"];

/// Default model id.
fn default_model() -> String {
    "claude-sonnet-4-5".to_string()
}

/// Default maximum number of teaching rounds.
const fn default_max_rounds() -> u32 {
    crate::teaching::DEFAULT_MAX_ROUNDS
}

/// Default timeout for a single model call, in seconds.
const fn default_request_timeout() -> u64 {
    120
}

/// Default completion budget per model call.
const fn default_max_tokens() -> u32 {
    4096
}

/// Default value for boolean options that default to true.
const fn default_true() -> bool {
    true
}

/// Default focus areas for new users.
fn default_focus_areas() -> Vec<FocusArea> {
    vec![FocusArea::Design, FocusArea::Readability]
}

/// Returns the per-user config directory (`~/.config/code-tutor` on Linux).
///
/// Falls back to `.code-tutor` in the working directory when the platform
/// has no config directory.
#[must_use]
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir().map_or_else(|| PathBuf::from(".code-tutor"), |dir| dir.join("code-tutor"))
}

// ============================================================================
// Config
// ============================================================================

/// Main configuration for Code Tutor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Anthropic API key. Empty when provided through the environment.
    #[serde(default)]
    pub api_key: String,

    /// Prevents users from changing a key set by the system config.
    #[serde(default)]
    pub api_key_locked: bool,

    /// Model id passed through to the model client.
    #[serde(default = "default_model")]
    pub model: String,

    /// The learner's programming experience.
    #[serde(default)]
    pub experience_level: ExperienceLevel,

    /// Maximum number of rounds in a teaching session.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Timeout for a single model call, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Completion budget per model call.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Review preferences.
    #[serde(default)]
    pub preferences: Preferences,

    /// Interaction logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_key_locked: false,
            model: default_model(),
            experience_level: ExperienceLevel::default(),
            max_rounds: default_max_rounds(),
            request_timeout_secs: default_request_timeout(),
            max_tokens: default_max_tokens(),
            preferences: Preferences::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the given config directory.
    ///
    /// Layers the system config (if present) under `<dir>/config.json`
    /// (if present). Missing files fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the user file exists but cannot be read or parsed,
    /// or if the merged configuration fails validation.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_layered(Some(Path::new(SYSTEM_CONFIG_PATH)), &dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a single file, without the system layer.
    ///
    /// If the file does not exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::ConfigParseError` for unreadable files, invalid
    /// JSON or invalid enum values, and `TutorError::ConfigValidationError`
    /// for out-of-range values.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        Self::load_layered(None, path)
    }

    /// Merges defaults, an optional system file and a user file.
    ///
    /// Errors in the system file are logged and ignored; errors in the user
    /// file are reported.
    ///
    /// # Errors
    ///
    /// See [`Config::load_from_file`].
    pub fn load_layered(system: Option<&Path>, user: &Path) -> Result<Self> {
        let mut merged = serde_json::to_value(Self::default())?;

        if let Some(system) = system {
            match read_json(system) {
                Ok(Some(layer)) => merge_json(&mut merged, layer),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(path = %system.display(), error = %e, "Ignoring unreadable system config");
                }
            }
        }

        if let Some(layer) = read_json(user)? {
            merge_json(&mut merged, layer);
        }

        let config: Self =
            serde_json::from_value(merged).map_err(|e| TutorError::config_parse(user, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration as pretty JSON, creating the parent directory.
    ///
    /// # Errors
    ///
    /// Returns an I/O or JSON error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::ConfigValidationError` if any check fails.
    pub fn validate(&self) -> Result<()> {
        if self.max_rounds == 0 {
            return Err(TutorError::config_validation(
                "maxRounds must be greater than 0",
                "Set maxRounds to at least 1 in your config.json",
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(TutorError::config_validation(
                "requestTimeoutSecs must be greater than 0",
                "Set requestTimeoutSecs to at least 1 second in your config.json",
            ));
        }

        if self.max_tokens == 0 {
            return Err(TutorError::config_validation(
                "maxTokens must be greater than 0",
                "Set maxTokens to at least 1 in your config.json",
            ));
        }

        if self.model.trim().is_empty() {
            return Err(TutorError::config_validation(
                "model must not be empty",
                format!("Use one of: {}", AVAILABLE_MODELS.join(", ")),
            ));
        }

        if self.preferences.focus_areas.is_empty() {
            return Err(TutorError::config_validation(
                "preferences.focusAreas must not be empty",
                "Pick at least one focus area, e.g. [\"design\"]",
            ));
        }

        Ok(())
    }

    /// Resolves the API key from the environment, then from the config file.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::MissingApiKey` if no key is available.
    pub fn resolve_api_key(&self) -> Result<String> {
        self.resolve_api_key_with(|name| std::env::var(name).ok())
    }

    /// Resolves the API key using a custom environment lookup.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::MissingApiKey` if no key is available.
    pub fn resolve_api_key_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
        API_KEY_ENV_VARS
            .iter()
            .filter_map(|name| lookup(name))
            .map(|key| key.trim().to_string())
            .find(|key| !key.is_empty())
            .or_else(|| {
                let key = self.api_key.trim();
                (!key.is_empty()).then(|| key.to_string())
            })
            .ok_or(TutorError::MissingApiKey)
    }

    /// Replaces the stored API key unless it is locked.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::ApiKeyLocked` when `apiKeyLocked` is set.
    pub fn set_api_key(&mut self, key: impl Into<String>) -> Result<()> {
        if self.api_key_locked {
            return Err(TutorError::ApiKeyLocked);
        }
        self.api_key = key.into();
        Ok(())
    }

    /// Returns the stored API key with all but the first 8 characters hidden.
    #[must_use]
    pub fn masked_api_key(&self) -> Option<String> {
        if self.api_key.is_empty() {
            return None;
        }
        let prefix: String = self.api_key.chars().take(8).collect();
        if prefix.len() < self.api_key.len() {
            Some(format!("{prefix}..."))
        } else {
            Some("***".to_string())
        }
    }

    /// Builds the learner profile used by both engines.
    #[must_use]
    pub fn profile(&self) -> LearnerProfile {
        LearnerProfile::new(
            self.experience_level,
            self.preferences.question_style,
            self.preferences.focus_areas.iter().copied(),
        )
    }
}

/// Reads a JSON file, returning `None` if it does not exist.
fn read_json(path: &Path) -> Result<Option<Value>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(TutorError::config_parse(
                path,
                format!("failed to read file: {e}"),
            ));
        }
    };

    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|e| TutorError::config_parse(path, e.to_string()))
}

/// Merges `layer` into `base`. Objects merge recursively; anything else replaces.
fn merge_json(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base), Value::Object(layer)) => {
            for (key, value) in layer {
                match base.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge_json(existing, value);
                    }
                    _ => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, layer) => *base = layer,
    }
}

/// Review preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    /// How clarifying questions should be phrased.
    #[serde(default)]
    pub question_style: QuestionStyle,

    /// Areas the feedback should concentrate on, in priority order.
    #[serde(default = "default_focus_areas")]
    pub focus_areas: Vec<FocusArea>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            question_style: QuestionStyle::default(),
            focus_areas: default_focus_areas(),
        }
    }
}

/// Interaction logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    /// Whether session events are written to disk.
    #[serde(default)]
    pub enabled: bool,

    /// Whether learner input and parsed model output are logged.
    #[serde(default = "default_true")]
    pub log_interactions: bool,

    /// Whether full prompt and completion text is logged.
    #[serde(default)]
    pub log_api_calls: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_interactions: default_true(),
            log_api_calls: false,
        }
    }
}

// ============================================================================
// Learner Profile
// ============================================================================

/// Who the learner is, as far as prompts are concerned.
///
/// Immutable for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnerProfile {
    experience_level: ExperienceLevel,
    question_style: QuestionStyle,
    focus_areas: Vec<FocusArea>,
}

impl Default for LearnerProfile {
    fn default() -> Self {
        Self::new(
            ExperienceLevel::default(),
            QuestionStyle::default(),
            default_focus_areas(),
        )
    }
}

impl LearnerProfile {
    /// Creates a profile. Duplicate focus areas are dropped, keeping first occurrence order.
    #[must_use]
    pub fn new(
        experience_level: ExperienceLevel,
        question_style: QuestionStyle,
        focus_areas: impl IntoIterator<Item = FocusArea>,
    ) -> Self {
        let mut unique = Vec::new();
        for area in focus_areas {
            if !unique.contains(&area) {
                unique.push(area);
            }
        }
        Self {
            experience_level,
            question_style,
            focus_areas: unique,
        }
    }

    /// The learner's experience level.
    #[must_use]
    pub const fn experience_level(&self) -> ExperienceLevel {
        self.experience_level
    }

    /// The preferred question style.
    #[must_use]
    pub const fn question_style(&self) -> QuestionStyle {
        self.question_style
    }

    /// Focus areas in priority order.
    #[must_use]
    pub fn focus_areas(&self) -> &[FocusArea] {
        &self.focus_areas
    }
}

// ============================================================================
// Profile Enums
// ============================================================================

/// Implements case-insensitive string (de)serialization for a profile enum.
macro_rules! string_enum_serde {
    ($ty:ident, $what:literal) => {
        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::from_str_case_insensitive(&s).ok_or_else(|| {
                    let expected: Vec<_> = Self::ALL.iter().map(|v| format!("'{}'", v.as_str())).collect();
                    serde::de::Error::custom(format!(
                        "invalid {} '{s}': expected one of {}",
                        $what,
                        expected.join(", ")
                    ))
                })
            }
        }

        impl Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(self.as_str())
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = TutorError;

            fn from_str(s: &str) -> Result<Self> {
                Self::from_str_case_insensitive(s).ok_or_else(|| {
                    let expected: Vec<_> = Self::ALL.iter().map(|v| v.as_str()).collect();
                    TutorError::config_validation(
                        format!("invalid {} '{s}'", $what),
                        format!("Use one of: {}", expected.join(", ")),
                    )
                })
            }
        }
    };
}

/// Programming experience of the learner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ExperienceLevel {
    /// Learning the fundamentals.
    Beginner,
    /// Comfortable with the basics (default).
    #[default]
    Intermediate,
    /// Experienced; ready for architecture discussions.
    Advanced,
    /// Highly skilled.
    Expert,
}

impl ExperienceLevel {
    /// Every level, in ascending order.
    pub const ALL: [Self; 4] = [Self::Beginner, Self::Intermediate, Self::Advanced, Self::Expert];

    /// The lowercase name used in config files and prompts.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
            Self::Expert => "expert",
        }
    }

    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

string_enum_serde!(ExperienceLevel, "experience level");

/// How the tutor phrases its clarifying questions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum QuestionStyle {
    /// Lead the learner to discover insights (default).
    #[default]
    Socratic,
    /// Straightforward, specific questions.
    Direct,
    /// Open-ended questions about alternatives and trade-offs.
    Exploratory,
}

impl QuestionStyle {
    /// Every style.
    pub const ALL: [Self; 3] = [Self::Socratic, Self::Direct, Self::Exploratory];

    /// The lowercase name used in config files and prompts.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Socratic => "socratic",
            Self::Direct => "direct",
            Self::Exploratory => "exploratory",
        }
    }

    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|style| style.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

string_enum_serde!(QuestionStyle, "question style");

/// An area of code quality the learner wants feedback on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FocusArea {
    /// Structure and architecture.
    Design,
    /// Naming, clarity, layout.
    Readability,
    /// Speed and resource use.
    Performance,
    /// Vulnerabilities and unsafe patterns.
    Security,
    /// Test coverage and testability.
    Testing,
    /// Comments and docs.
    Documentation,
}

impl FocusArea {
    /// Every focus area.
    pub const ALL: [Self; 6] = [
        Self::Design,
        Self::Readability,
        Self::Performance,
        Self::Security,
        Self::Testing,
        Self::Documentation,
    ];

    /// The lowercase name used in config files and prompts.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Design => "design",
            Self::Readability => "readability",
            Self::Performance => "performance",
            Self::Security => "security",
            Self::Testing => "testing",
            Self::Documentation => "documentation",
        }
    }

    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|area| area.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

string_enum_serde!(FocusArea, "focus area");

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_config_default_values() {
        let config = Config::default();

        assert!(config.api_key.is_empty());
        assert!(!config.api_key_locked);
        assert_eq!(config.model, "claude-sonnet-4-5");
        assert_eq!(config.experience_level, ExperienceLevel::Intermediate);
        assert_eq!(config.max_rounds, crate::teaching::DEFAULT_MAX_ROUNDS);
        assert_eq!(config.request_timeout_secs, 120);
        assert_eq!(config.max_tokens, 4096);
        assert_eq!(config.preferences.question_style, QuestionStyle::Socratic);
        assert_eq!(
            config.preferences.focus_areas,
            vec![FocusArea::Design, FocusArea::Readability]
        );
        assert!(!config.logging.enabled);
        assert!(config.logging.log_interactions);
        assert!(!config.logging.log_api_calls);
    }

    #[test]
    fn test_enum_serialization() {
        assert_eq!(
            serde_json::to_string(&ExperienceLevel::Advanced).unwrap(),
            "\"advanced\""
        );
        assert_eq!(
            serde_json::to_string(&QuestionStyle::Exploratory).unwrap(),
            "\"exploratory\""
        );
        assert_eq!(
            serde_json::to_string(&FocusArea::Documentation).unwrap(),
            "\"documentation\""
        );
    }

    #[test]
    fn test_enum_deserialization_case_insensitive() {
        let level: ExperienceLevel = serde_json::from_str("\"EXPERT\"").unwrap();
        assert_eq!(level, ExperienceLevel::Expert);

        let style: QuestionStyle = serde_json::from_str("\"Direct\"").unwrap();
        assert_eq!(style, QuestionStyle::Direct);

        let area: FocusArea = serde_json::from_str("\"Security\"").unwrap();
        assert_eq!(area, FocusArea::Security);
    }

    #[test]
    fn test_invalid_enum_error_lists_choices() {
        let err = serde_json::from_str::<ExperienceLevel>("\"wizard\"").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("invalid experience level 'wizard'"));
        assert!(msg.contains("'beginner'"));
        assert!(msg.contains("'expert'"));
    }

    #[test]
    fn test_from_str_for_prompts() {
        assert_eq!(
            "socratic".parse::<QuestionStyle>().unwrap(),
            QuestionStyle::Socratic
        );
        assert!("loud".parse::<QuestionStyle>().is_err());
    }

    #[test]
    fn test_config_deserialization_with_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.model, "claude-sonnet-4-5");
        assert_eq!(config.max_rounds, 5);
    }

    #[test]
    fn test_config_deserialization_with_overrides() {
        let json = r#"{
            "model": "claude-opus-4-5",
            "experienceLevel": "beginner",
            "maxRounds": 3,
            "preferences": {
                "questionStyle": "direct",
                "focusAreas": ["security", "testing"]
            },
            "logging": { "enabled": true }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.model, "claude-opus-4-5");
        assert_eq!(config.experience_level, ExperienceLevel::Beginner);
        assert_eq!(config.max_rounds, 3);
        assert_eq!(config.preferences.question_style, QuestionStyle::Direct);
        assert_eq!(
            config.preferences.focus_areas,
            vec![FocusArea::Security, FocusArea::Testing]
        );
        assert!(config.logging.enabled);
        assert!(config.logging.log_interactions);
    }

    // ------------------------------------------------------------------------
    // Layered loading
    // ------------------------------------------------------------------------

    #[test]
    fn test_load_from_file_nonexistent_returns_default() {
        let config = Config::load_from_file(Path::new("/nonexistent/config.json")).unwrap();
        assert_eq!(config.max_rounds, 5);
    }

    #[test]
    fn test_load_from_file_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "{ not json").unwrap();

        let err = Config::load_from_file(&path).unwrap_err();
        assert!(matches!(err, TutorError::ConfigParseError { .. }));
    }

    #[test]
    fn test_load_layered_user_overrides_system() {
        let dir = tempfile::tempdir().unwrap();
        let system = dir.path().join("system.json");
        let user = dir.path().join("user.json");
        std::fs::write(
            &system,
            r#"{"apiKey": "sk-system", "apiKeyLocked": true, "preferences": {"questionStyle": "direct", "focusAreas": ["security"]}}"#,
        )
        .unwrap();
        std::fs::write(&user, r#"{"preferences": {"questionStyle": "exploratory"}}"#).unwrap();

        let config = Config::load_layered(Some(&system), &user).unwrap();

        assert_eq!(config.api_key, "sk-system");
        assert!(config.api_key_locked);
        assert_eq!(config.preferences.question_style, QuestionStyle::Exploratory);
        // Sibling keys from the system layer survive the nested merge
        assert_eq!(config.preferences.focus_areas, vec![FocusArea::Security]);
    }

    #[test]
    fn test_load_layered_ignores_broken_system_file() {
        let dir = tempfile::tempdir().unwrap();
        let system = dir.path().join("system.json");
        std::fs::write(&system, "garbage").unwrap();

        let config = Config::load_layered(Some(&system), &dir.path().join("missing.json")).unwrap();
        assert_eq!(config.model, "claude-sonnet-4-5");
    }

    #[test]
    fn test_load_validates_after_merge() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, r#"{"maxRounds": 0}"#).unwrap();

        let err = Config::load_from_file(&path).unwrap_err();
        assert!(matches!(err, TutorError::ConfigValidationError { .. }));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let mut config = Config::default();
        config.experience_level = ExperienceLevel::Advanced;
        config.save(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.experience_level, ExperienceLevel::Advanced);
    }

    // ------------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------------

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let config = Config {
            request_timeout_secs: 0,
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("requestTimeoutSecs"));
    }

    #[test]
    fn test_validation_rejects_empty_focus_areas() {
        let mut config = Config::default();
        config.preferences.focus_areas.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("focusAreas"));
    }

    #[test]
    fn test_validation_rejects_blank_model() {
        let config = Config {
            model: "  ".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    // ------------------------------------------------------------------------
    // API key
    // ------------------------------------------------------------------------

    #[test]
    fn test_api_key_env_precedence() {
        let config = Config {
            api_key: "sk-file".to_string(),
            ..Config::default()
        };
        let env: HashMap<&str, &str> =
            HashMap::from([("ANTHROPIC_API_KEY", "sk-anthropic"), ("CODE_TUTOR_API_KEY", "sk-tutor")]);

        let key = config
            .resolve_api_key_with(|name| env.get(name).map(ToString::to_string))
            .unwrap();
        assert_eq!(key, "sk-tutor");
    }

    #[test]
    fn test_api_key_falls_back_to_file() {
        let config = Config {
            api_key: "sk-file".to_string(),
            ..Config::default()
        };
        let key = config.resolve_api_key_with(|_| Some("   ".to_string())).unwrap();
        assert_eq!(key, "sk-file");
    }

    #[test]
    fn test_missing_api_key() {
        let err = Config::default().resolve_api_key_with(|_| None).unwrap_err();
        assert!(matches!(err, TutorError::MissingApiKey));
    }

    #[test]
    fn test_locked_api_key_cannot_change() {
        let mut config = Config {
            api_key: "sk-shared".to_string(),
            api_key_locked: true,
            ..Config::default()
        };
        assert!(matches!(
            config.set_api_key("sk-mine"),
            Err(TutorError::ApiKeyLocked)
        ));
        assert_eq!(config.api_key, "sk-shared");
    }

    #[test]
    fn test_masked_api_key() {
        let mut config = Config::default();
        assert_eq!(config.masked_api_key(), None);

        config.api_key = "sk-ant-abcdef123".to_string();
        assert_eq!(config.masked_api_key().as_deref(), Some("sk-ant-a..."));

        config.api_key = "short".to_string();
        assert_eq!(config.masked_api_key().as_deref(), Some("***"));
    }

    // ------------------------------------------------------------------------
    // Learner profile
    // ------------------------------------------------------------------------

    #[test]
    fn test_profile_dedups_focus_areas_in_order() {
        let profile = LearnerProfile::new(
            ExperienceLevel::Beginner,
            QuestionStyle::Direct,
            [FocusArea::Testing, FocusArea::Design, FocusArea::Testing],
        );
        assert_eq!(
            profile.focus_areas(),
            &[FocusArea::Testing, FocusArea::Design]
        );
    }

    #[test]
    fn test_profile_from_config() {
        let mut config = Config::default();
        config.experience_level = ExperienceLevel::Expert;
        config.preferences.question_style = QuestionStyle::Exploratory;

        let profile = config.profile();
        assert_eq!(profile.experience_level(), ExperienceLevel::Expert);
        assert_eq!(profile.question_style(), QuestionStyle::Exploratory);
        assert_eq!(profile.focus_areas().len(), 2);
    }
}
