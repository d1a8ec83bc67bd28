use crate::error::ConfigurationError;
use crate::model::SemanticType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

/// Metadata configuration as written in `model.toml`.
///
/// ```toml
/// find_keyword = "Find"
///
/// [separators]
/// and = "AND"
/// or = "OR"
///
/// [operators]
/// contains = "includes"
///
/// [[entities]]
/// name = "Customer"
/// table = "customers"
///
/// [[entities.attributes]]
/// name = "City"
/// column = "city"
/// type = "string"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryModelConfig {
    #[serde(default = "default_find_keyword")]
    pub find_keyword: String,
    #[serde(default)]
    pub separators: SeparatorAliases,
    /// Operator display-name overrides, keyed by operator kind (`notEquals`, `isNull`, ...).
    #[serde(default)]
    pub operators: BTreeMap<String, String>,
    #[serde(default)]
    pub entities: Vec<EntityConfig>,
}

impl Default for QueryModelConfig {
    fn default() -> Self {
        Self {
            find_keyword: default_find_keyword(),
            separators: SeparatorAliases::default(),
            operators: BTreeMap::new(),
            entities: Vec::new(),
        }
    }
}

fn default_find_keyword() -> String {
    String::from("Find")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeparatorAliases {
    pub and: String,
    pub or: String,
}

impl Default for SeparatorAliases {
    fn default() -> Self {
        Self {
            and: String::from("AND"),
            or: String::from("OR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityConfig {
    /// Display name shown to users.
    pub name: String,
    /// Backing table, optionally schema-qualified.
    pub table: String,
    #[serde(default)]
    pub attributes: Vec<AttributeConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeConfig {
    pub name: String,
    pub column: String,
    #[serde(rename = "type")]
    pub semantic_type: SemanticType,
    /// Value domain of an enumerated attribute.
    #[serde(default)]
    pub values: Option<Vec<String>>,
    /// Lower bound for numeric and date attributes.
    #[serde(default)]
    pub min: Option<toml::Value>,
    /// Upper bound for numeric and date attributes.
    #[serde(default)]
    pub max: Option<toml::Value>,
    /// Adds the `is null` operator.
    #[serde(default)]
    pub nullable: bool,
}

impl QueryModelConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigurationError> {
        toml::from_str(content).map_err(|e| ConfigurationError::Load(e.to_string()))
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigurationError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigurationError::Load(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("querymodel")
            .join("model.toml")
    }
}

/// Render a scalar TOML value (string, number, date, boolean) as text.
pub(crate) fn scalar_text(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        toml::Value::Datetime(dt) => Some(dt.to_string()),
        toml::Value::Array(_) | toml::Value::Table(_) => None,
    }
}

/// Supplies metadata configuration at build and reload time.
pub trait ConfigSource: Send + Sync {
    fn load(&self) -> Result<QueryModelConfig, ConfigurationError>;

    /// Where the configuration comes from, for logs.
    fn describe(&self) -> String;
}

/// Reads a TOML file on every load, so edits are picked up by a reload.
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for FileConfigSource {
    fn load(&self) -> Result<QueryModelConfig, ConfigurationError> {
        QueryModelConfig::load_from(&self.path)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory configuration that can be swapped between loads.
#[derive(Debug)]
pub struct StaticConfigSource {
    config: RwLock<Result<QueryModelConfig, ConfigurationError>>,
    loads: AtomicUsize,
}

impl StaticConfigSource {
    pub fn new(config: QueryModelConfig) -> Self {
        Self {
            config: RwLock::new(Ok(config)),
            loads: AtomicUsize::new(0),
        }
    }

    /// Replace what the next load returns.
    pub fn set(&self, config: QueryModelConfig) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = Ok(config);
    }

    /// Make subsequent loads fail as if the source were unreadable.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) =
            Err(ConfigurationError::Load(message.into()));
    }

    /// Number of loads performed so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ConfigSource for StaticConfigSource {
    fn load(&self) -> Result<QueryModelConfig, ConfigurationError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn describe(&self) -> String {
        String::from("in-memory configuration")
    }
}
