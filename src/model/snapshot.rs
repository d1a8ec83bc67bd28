use super::catalog::OperatorCatalog;
use super::registry::AliasRegistry;
use super::types::Separator;
use crate::config::QueryModelConfig;
use crate::error::ConfigurationError;

/// Immutable, versioned view of the query model metadata.
///
/// A request captures one snapshot at its start and uses it for every stage,
/// so forward (alias to column) and reverse (column to alias) lookups always
/// agree even if a reload publishes a newer version meanwhile.
#[derive(Debug)]
pub struct Snapshot {
    version: u64,
    find_keyword: String,
    separators: Vec<(String, Separator)>,
    registry: AliasRegistry,
    catalog: OperatorCatalog,
}

impl Snapshot {
    pub fn build(config: &QueryModelConfig, version: u64) -> Result<Self, ConfigurationError> {
        let mut issues = Vec::new();

        let find_keyword = config.find_keyword.trim().to_string();
        if find_keyword.is_empty() {
            issues.push(String::from("find keyword is empty"));
        }

        let separators = vec![
            (config.separators.and.trim().to_string(), Separator::And),
            (config.separators.or.trim().to_string(), Separator::Or),
        ];
        for (alias, separator) in &separators {
            if alias.is_empty() {
                issues.push(format!("separator {} has an empty alias", separator.keyword()));
            }
        }
        if !separators[0].0.is_empty() && separators[0].0 == separators[1].0 {
            issues.push(format!(
                "separators AND and OR share the alias `{}`",
                separators[0].0
            ));
        }

        let registry = AliasRegistry::build_collecting(config, &mut issues);
        let catalog = OperatorCatalog::build_collecting(config, &mut issues);

        if !issues.is_empty() {
            return Err(ConfigurationError::Invalid(issues));
        }

        Ok(Self {
            version,
            find_keyword,
            separators,
            registry,
            catalog,
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn find_keyword(&self) -> &str {
        &self.find_keyword
    }

    pub fn registry(&self) -> &AliasRegistry {
        &self.registry
    }

    pub fn catalog(&self) -> &OperatorCatalog {
        &self.catalog
    }

    /// Separator aliases, AND first.
    pub fn separator_names(&self) -> Vec<&str> {
        self.separators.iter().map(|(alias, _)| alias.as_str()).collect()
    }

    pub fn resolve_separator(&self, alias: &str) -> Option<Separator> {
        self.separators
            .iter()
            .find(|(name, _)| name == alias)
            .map(|(_, separator)| *separator)
    }
}
