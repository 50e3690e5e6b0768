use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;

use stackgraph_core::{
    ConfigParser, DiscoveryError, ParsedConfig, ParserOptions, Result, UnitConfig,
};

/// In-memory fixture parser keyed by component directory. Intended for
/// tests of the pipeline (this crate's and downstream consumers'): insert
/// the configurations a scenario needs and hand the parser to the driver.
/// Unknown paths answer as include-only configurations.
#[derive(Debug, Default)]
pub struct StaticParser {
    configs: DashMap<PathBuf, ParsedConfig>,
}

impl StaticParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, config: UnitConfig) {
        self.configs.insert(
            path.into(),
            ParsedConfig {
                config,
                files_read: Vec::new(),
            },
        );
    }

    pub fn insert_with_reads(
        &self,
        path: impl Into<PathBuf>,
        config: UnitConfig,
        files_read: Vec<PathBuf>,
    ) {
        self.configs
            .insert(path.into(), ParsedConfig { config, files_read });
    }
}

#[async_trait]
impl ConfigParser for StaticParser {
    async fn parse(&self, path: &Path, _options: &ParserOptions) -> Result<ParsedConfig> {
        self.configs
            .get(path)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| DiscoveryError::IncludeOnlyConfig(path.to_path_buf()))
    }
}

/// A parser that fails every component; exercises suppression paths.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingParser;

#[async_trait]
impl ConfigParser for FailingParser {
    async fn parse(&self, path: &Path, _options: &ParserOptions) -> Result<ParsedConfig> {
        Err(DiscoveryError::Parse {
            path: path.to_path_buf(),
            message: "configuration rejected".into(),
        })
    }
}
