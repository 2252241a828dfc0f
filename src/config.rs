//! Configuration for polyeval.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (POLYEVAL_HOME, provider API keys)
//! 2. Config file (.polyeval/config.yaml, or --config)
//! 3. Defaults
//!
//! Config file discovery:
//! - Searches current directory and parents for .polyeval/config.yaml
//! - Paths in config file are relative to the project root (the parent of
//!   the .polyeval/ directory)
//!
//! Settings are resolved once and passed explicitly to the orchestrator.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::{RetryPolicy, Stage};
use crate::domain::{ColumnLayout, JobLayout};

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub work: WorkConfig,
    /// Section -> rubric file name
    #[serde(default)]
    pub rubrics: BTreeMap<String, String>,
    #[serde(default)]
    pub columns: ColumnLayout,
    #[serde(default)]
    pub oracles: OraclesConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
    pub evaluation_language: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    pub questions_dir: Option<String>,
    pub output_dir: Option<String>,
    pub rubrics_dir: Option<String>,
    pub summary: Option<String>,
    /// e.g. "{section_dir}/{language}-{section}.csv"
    pub input_pattern: Option<String>,
    /// e.g. "{language}-{section}-Evals.csv"
    pub output_pattern: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkConfig {
    /// Section key -> question-source subdirectory
    pub sections: Option<BTreeMap<String, String>>,
    pub languages: Option<Vec<String>>,
    pub stages: Option<Vec<Stage>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OraclesConfig {
    pub generate: Option<OracleConfig>,
    pub translate: Option<OracleConfig>,
    pub grade: Option<OracleConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PacingConfig {
    pub row_delay_ms: Option<u64>,
    pub grade_row_delay_ms: Option<u64>,
    pub job_delay_ms: Option<u64>,
}

/// Supported oracle providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// OpenAI chat completions
    Openai,
    /// OpenRouter (OpenAI-compatible)
    Openrouter,
    /// Gemini generateContent
    Gemini,
    /// Public Google Translate endpoint
    GoogleTranslate,
    /// Local command fed through stdin
    Command,
}

impl Provider {
    /// Environment variable holding the provider's API key
    pub fn default_key_env(&self) -> Option<&'static str> {
        match self {
            Self::Openai => Some("OPENAI_API_KEY"),
            Self::Openrouter => Some("OPENROUTER_API_KEY"),
            Self::Gemini => Some("GEMINI_API_KEY"),
            Self::GoogleTranslate | Self::Command => None,
        }
    }
}

/// Oracle settings for one stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    pub provider: Provider,
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// Overrides the provider's default key variable
    pub api_key_env: Option<String>,
    /// Inline key; environment variables take precedence
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub max_tokens: Option<u32>,
    pub timeout_seconds: Option<u64>,
    /// Program and arguments for the command provider
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl OracleConfig {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            model: None,
            base_url: None,
            api_key_env: None,
            api_key: None,
            max_tokens: None,
            timeout_seconds: None,
            command: Vec::new(),
            retry: RetryPolicy::default(),
        }
    }

    /// Default oracle for a stage
    pub fn default_for(stage: Stage) -> Self {
        match stage {
            Stage::Generate => Self {
                model: Some("gpt-5".to_string()),
                max_tokens: Some(1000),
                retry: RetryPolicy::new(3, Duration::from_secs(30)),
                ..Self::new(Provider::Openai)
            },
            Stage::Translate => Self {
                retry: RetryPolicy::new(3, Duration::from_secs(5)),
                ..Self::new(Provider::GoogleTranslate)
            },
            Stage::Grade => Self {
                model: Some("gemini-2.5-pro".to_string()),
                retry: RetryPolicy::new(3, Duration::from_secs(5)),
                ..Self::new(Provider::Gemini)
            },
        }
    }

    /// Per-request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.unwrap_or(300))
    }

    /// Resolve the API key from the environment or the config file
    pub fn api_key(&self) -> Result<String> {
        let env_name = self
            .api_key_env
            .as_deref()
            .or_else(|| self.provider.default_key_env());

        if let Some(name) = env_name {
            if let Ok(key) = std::env::var(name) {
                if !key.trim().is_empty() {
                    return Ok(key);
                }
            }
        }

        self.api_key.clone().with_context(|| match env_name {
            Some(name) => format!("{} environment variable required", name),
            None => format!("{:?} oracle requires an api_key", self.provider),
        })
    }
}

/// Delays between oracle calls, for rate-limit courtesy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub row_delay: Duration,
    pub grade_row_delay: Duration,
    pub job_delay: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            row_delay: Duration::from_secs(1),
            grade_row_delay: Duration::from_secs(2),
            job_delay: Duration::from_secs(5),
        }
    }
}

impl Pacing {
    /// No delays at all
    pub fn none() -> Self {
        Self {
            row_delay: Duration::ZERO,
            grade_row_delay: Duration::ZERO,
            job_delay: Duration::ZERO,
        }
    }

    /// Inter-row delay for a stage
    pub fn row_delay(&self, stage: Stage) -> Duration {
        match stage {
            Stage::Grade => self.grade_row_delay,
            _ => self.row_delay,
        }
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct Settings {
    /// Project root all relative paths hang off
    pub root: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub layout: JobLayout,
    pub summary_path: PathBuf,
    pub languages: Vec<String>,
    pub stages: Vec<Stage>,
    pub columns: ColumnLayout,
    pub generate: OracleConfig,
    pub translate: OracleConfig,
    pub grade: OracleConfig,
    pub pacing: Pacing,
    /// Canonical language answers are graded in
    pub evaluation_language: String,
}

impl Settings {
    /// Load settings, from an explicit config file or by discovery
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config_file = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => find_config_file(),
        };

        let file = match config_file {
            Some(ref path) => Some(load_config_file(path)?),
            None => None,
        };

        let root = if let Ok(home) = std::env::var("POLYEVAL_HOME") {
            PathBuf::from(home)
        } else if let Some(ref path) = config_file {
            project_root(path)
        } else {
            std::env::current_dir().context("Failed to determine current directory")?
        };

        Ok(Self::resolve(root, config_file, file))
    }

    /// Resolve settings against a project root
    pub fn resolve(root: PathBuf, config_file: Option<PathBuf>, file: Option<ConfigFile>) -> Self {
        let file = file.unwrap_or_else(|| ConfigFile {
            version: "1".to_string(),
            paths: PathsConfig::default(),
            work: WorkConfig::default(),
            rubrics: BTreeMap::new(),
            columns: ColumnLayout::default(),
            oracles: OraclesConfig::default(),
            pacing: PacingConfig::default(),
            evaluation_language: None,
        });

        let dir = |value: &Option<String>, default: &str| {
            resolve_path(&root, value.as_deref().unwrap_or(default))
        };

        let rubrics = if file.rubrics.is_empty() {
            default_rubrics()
        } else {
            file.rubrics
        };

        let layout = JobLayout {
            questions_dir: dir(&file.paths.questions_dir, "q_translations"),
            output_dir: dir(&file.paths.output_dir, "LLMEvals"),
            rubrics_dir: dir(&file.paths.rubrics_dir, "rubrics"),
            sections: file.work.sections.unwrap_or_else(default_sections),
            rubrics,
            input_pattern: file
                .paths
                .input_pattern
                .unwrap_or_else(|| "{section_dir}/{language}-{section}.csv".to_string()),
            output_pattern: file
                .paths
                .output_pattern
                .unwrap_or_else(|| "{language}-{section}-Evals.csv".to_string()),
        };

        let defaults = Pacing::default();
        let millis = |value: Option<u64>, default: Duration| {
            value.map(Duration::from_millis).unwrap_or(default)
        };
        let pacing = Pacing {
            row_delay: millis(file.pacing.row_delay_ms, defaults.row_delay),
            grade_row_delay: millis(file.pacing.grade_row_delay_ms, defaults.grade_row_delay),
            job_delay: millis(file.pacing.job_delay_ms, defaults.job_delay),
        };

        Self {
            summary_path: dir(&file.paths.summary, "LLMEvals/evaluation_summary.csv"),
            root,
            config_file,
            layout,
            languages: file.work.languages.unwrap_or_else(default_languages),
            stages: file.work.stages.unwrap_or_else(|| Stage::ALL.to_vec()),
            columns: file.columns,
            generate: file
                .oracles
                .generate
                .unwrap_or_else(|| OracleConfig::default_for(Stage::Generate)),
            translate: file
                .oracles
                .translate
                .unwrap_or_else(|| OracleConfig::default_for(Stage::Translate)),
            grade: file
                .oracles
                .grade
                .unwrap_or_else(|| OracleConfig::default_for(Stage::Grade)),
            pacing,
            evaluation_language: file
                .evaluation_language
                .unwrap_or_else(|| "English".to_string()),
        }
    }

    /// Oracle settings for a stage
    pub fn oracle(&self, stage: Stage) -> &OracleConfig {
        match stage {
            Stage::Generate => &self.generate,
            Stage::Translate => &self.translate,
            Stage::Grade => &self.grade,
        }
    }

    /// Section keys of the work list, in order
    pub fn sections(&self) -> Vec<String> {
        self.layout.sections.keys().cloned().collect()
    }
}

fn default_sections() -> BTreeMap<String, String> {
    [
        ("Biases_Stereotypes", "biases_stereo"),
        ("Consent_Autonomy", "consent_autonomy"),
        ("Harm_Prev", "harm_prev"),
        ("Legality", "legality"),
        ("Moral_Judgment", "moral_judgment"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn default_rubrics() -> BTreeMap<String, String> {
    [
        ("Biases_Stereotypes", "Biases-Rubric.csv"),
        ("Consent_Autonomy", "Consent-Rubric.csv"),
        ("Harm_Prev", "Safety-Rubric.csv"),
        ("Legality", "Legality-Rubric.csv"),
        ("Moral_Judgment", "Moral_Judgement-Rubric.csv"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn default_languages() -> Vec<String> {
    ["Arabic", "Chinese", "English", "Hindi", "Spanish", "Swahili"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".polyeval").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    // Fall back to a per-user config
    let user_config = dirs::home_dir()?.join(".polyeval").join("config.yaml");
    user_config.exists().then_some(user_config)
}

/// Project root for a config file: the parent of `.polyeval/`, or the file's
/// own directory when it lives elsewhere
fn project_root(config_path: &Path) -> PathBuf {
    let parent = config_path.parent().unwrap_or(Path::new("."));
    let is_dot_dir = parent
        .file_name()
        .map(|name| name == ".polyeval")
        .unwrap_or(false);

    if is_dot_dir {
        parent.parent().unwrap_or(Path::new(".")).to_path_buf()
    } else {
        parent.to_path_buf()
    }
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the project root
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}
