use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Blocks the external parser is asked to decode. Discovery never needs a
/// full evaluation of the configuration, only these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DecodeBlock {
    TerraformSource,
    DependenciesBlock,
    DependencyBlock,
    TerragruntFlags,
    FeatureFlagsBlock,
    ExcludeBlock,
    ErrorsBlock,
}

impl DecodeBlock {
    pub fn all() -> Vec<DecodeBlock> {
        vec![
            DecodeBlock::TerraformSource,
            DecodeBlock::DependenciesBlock,
            DecodeBlock::DependencyBlock,
            DecodeBlock::TerragruntFlags,
            DecodeBlock::FeatureFlagsBlock,
            DecodeBlock::ExcludeBlock,
            DecodeBlock::ErrorsBlock,
        ]
    }
}

/// Options forwarded to the external parser. The discovery core treats
/// these as opaque apart from constructing the defaults.
#[derive(Debug, Clone)]
pub struct ParserOptions {
    pub decode: Vec<DecodeBlock>,
    pub suppress_diagnostics: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            decode: DecodeBlock::all(),
            suppress_diagnostics: false,
        }
    }
}

/// What a successful parse hands back: the decoded configuration value and
/// every file the parser read along the way.
#[derive(Debug, Clone, Default)]
pub struct ParsedConfig {
    pub config: UnitConfig,
    pub files_read: Vec<PathBuf>,
}

/// Parsed configuration value for a unit. Populated lazily; a component
/// whose config is still unset has simply not been parsed yet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitConfig {
    #[serde(default)]
    pub terraform_source: Option<String>,
    #[serde(default)]
    pub dependencies: Option<DependenciesBlock>,
    #[serde(default)]
    pub dependency_blocks: Vec<DependencyBlock>,
    #[serde(default)]
    pub flags: Option<TerragruntFlags>,
    #[serde(default)]
    pub feature_flags: Vec<FeatureFlag>,
    #[serde(default)]
    pub exclude: Option<ExcludeBlock>,
    #[serde(default)]
    pub errors: Option<ErrorsBlock>,
}

/// The plain `dependencies { paths = [...] }` block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependenciesBlock {
    #[serde(default)]
    pub paths: Vec<String>,
}

/// A named `dependency` block. `config_path` stays a raw value: the
/// configuration language permits arbitrary expressions there, and a
/// non-string result is a reportable error rather than a decode failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyBlock {
    pub name: String,
    #[serde(default)]
    pub config_path: serde_json::Value,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub skip_outputs: bool,
}

impl DependencyBlock {
    pub fn new(name: impl Into<String>, config_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config_path: serde_json::Value::String(config_path.into()),
            enabled: None,
            skip_outputs: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TerragruntFlags {
    #[serde(default)]
    pub prevent_destroy: bool,
    #[serde(default)]
    pub skip: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFlag {
    pub name: String,
    #[serde(default)]
    pub default: serde_json::Value,
}

/// Matches any command when present in `ExcludeBlock::actions`.
pub const EXCLUDE_ALL_ACTIONS: &str = "all";

/// The `exclude { ... }` block controlling queue filtering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExcludeBlock {
    #[serde(rename = "if", default)]
    pub condition: bool,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub exclude_dependencies: bool,
    #[serde(default)]
    pub no_run: bool,
}

impl ExcludeBlock {
    /// Whether this block applies to the given command.
    pub fn applies_to(&self, command: &str) -> bool {
        self.actions
            .iter()
            .any(|action| action == command || action == EXCLUDE_ALL_ACTIONS)
    }
}

/// The `errors { ... }` block; discovery only carries it through.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorsBlock {
    #[serde(default)]
    pub retryable: Vec<String>,
    #[serde(default)]
    pub ignorable: Vec<String>,
}
