//! Where processor definitions come from.
//!
//! Definitions are looked up in a local directory of `<name>.json` files
//! first and in the provider second. The catalog is only a boundary: nothing
//! here analyzes pipelines.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::errors::AdvisorError;
use crate::pipeline::ProcessorDefinition;

/// Source of processor definitions.
#[async_trait]
pub trait ProcessorCatalog: Send + Sync {
    /// Fetches one definition by processor name.
    ///
    /// Returns `ProcessorNotFound` when this catalog has no such processor.
    async fn fetch_definition(&self, name: &str) -> Result<ProcessorDefinition, AdvisorError>;

    /// Lists every processor name this catalog knows, sorted.
    async fn list_names(&self) -> Result<Vec<String>, AdvisorError>;
}

/// Processor definitions stored as JSON files in one directory.
#[derive(Debug, Clone)]
pub struct LocalCatalog {
    dir: PathBuf,
}

impl LocalCatalog {
    /// Creates a catalog over `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn read_file(path: &Path) -> Result<ProcessorDefinition, AdvisorError> {
        let text = tokio::fs::read_to_string(path).await?;
        let mut value: Value = serde_json::from_str(&text)?;

        // Files exported without a name take it from the file stem.
        if let Value::Object(map) = &mut value {
            if !map.contains_key("name") {
                let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
                map.insert("name".to_string(), Value::String(stem.to_string()));
            }
        }
        Ok(serde_json::from_value(value)?)
    }

    async fn json_files(&self) -> Result<Vec<PathBuf>, AdvisorError> {
        let mut files = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(files),
            Err(err) => return Err(err.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl ProcessorCatalog for LocalCatalog {
    async fn fetch_definition(&self, name: &str) -> Result<ProcessorDefinition, AdvisorError> {
        let direct = self.dir.join(format!("{name}.json"));
        if tokio::fs::try_exists(&direct).await.unwrap_or(false) {
            tracing::debug!(processor = name, path = %direct.display(), "Loaded local definition");
            return Self::read_file(&direct).await;
        }

        // Fall back to files whose stem differs from the processor name.
        for path in self.json_files().await? {
            match Self::read_file(&path).await {
                Ok(definition) if definition.name == name => return Ok(definition),
                Ok(_) => {}
                Err(err) => tracing::debug!(path = %path.display(), error = %err, "Skipping unreadable file"),
            }
        }
        Err(AdvisorError::ProcessorNotFound(name.to_string()))
    }

    async fn list_names(&self) -> Result<Vec<String>, AdvisorError> {
        let mut names = BTreeSet::new();
        for path in self.json_files().await? {
            match Self::read_file(&path).await {
                Ok(definition) => {
                    names.insert(definition.name);
                }
                Err(err) => tracing::warn!(path = %path.display(), error = %err, "Skipping unreadable processor file"),
            }
        }
        Ok(names.into_iter().collect())
    }
}

/// Catalogs consulted in order; the first hit wins.
#[derive(Clone, Default)]
pub struct LayeredCatalog {
    layers: Vec<Arc<dyn ProcessorCatalog>>,
}

impl LayeredCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a layer consulted after the existing ones.
    #[must_use]
    pub fn with_layer(mut self, layer: Arc<dyn ProcessorCatalog>) -> Self {
        self.layers.push(layer);
        self
    }

    /// Number of layers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether there are no layers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

#[async_trait]
impl ProcessorCatalog for LayeredCatalog {
    async fn fetch_definition(&self, name: &str) -> Result<ProcessorDefinition, AdvisorError> {
        for layer in &self.layers {
            match layer.fetch_definition(name).await {
                Err(AdvisorError::ProcessorNotFound(_)) => continue,
                other => return other,
            }
        }
        Err(AdvisorError::ProcessorNotFound(name.to_string()))
    }

    /// Unions the names of every layer that answers. A failing layer is
    /// skipped with a warning; the call fails only when all layers fail.
    async fn list_names(&self) -> Result<Vec<String>, AdvisorError> {
        let mut names = BTreeSet::new();
        let mut first_error = None;
        let mut answered = self.layers.is_empty();
        for (index, layer) in self.layers.iter().enumerate() {
            match layer.list_names().await {
                Ok(layer_names) => {
                    answered = true;
                    names.extend(layer_names);
                }
                Err(err) => {
                    tracing::warn!(layer = index, error = %err, "Catalog layer unavailable; skipping");
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) if !answered => Err(err),
            _ => Ok(names.into_iter().collect()),
        }
    }
}

impl std::fmt::Debug for LayeredCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayeredCatalog").field("layers", &self.layers.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryCatalog;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    /// A provider that cannot be reached.
    struct UnreachableCatalog;

    #[async_trait]
    impl ProcessorCatalog for UnreachableCatalog {
        async fn fetch_definition(&self, _name: &str) -> Result<ProcessorDefinition, AdvisorError> {
            Err(AdvisorError::provider("connection refused"))
        }

        async fn list_names(&self) -> Result<Vec<String>, AdvisorError> {
            Err(AdvisorError::provider("connection refused"))
        }
    }

    fn write(dir: &Path, file: &str, value: &Value) {
        std::fs::write(dir.join(file), serde_json::to_string_pretty(value).unwrap()).unwrap();
    }

    #[tokio::test]
    async fn test_local_fetch_by_file_name() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "orders.json",
            &json!({"name": "orders", "pipeline": [{"$source": {}}, {"$merge": {}}]}),
        );

        let catalog = LocalCatalog::new(dir.path());
        let definition = catalog.fetch_definition("orders").await.unwrap();
        assert_eq!(definition.pipeline.len(), 2);
    }

    #[tokio::test]
    async fn test_local_fetch_by_inner_name_and_stem_default() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.json", &json!({"name": "renamed", "pipeline": []}));
        write(dir.path(), "nameless.json", &json!({"pipeline": [{"$source": {}}]}));
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let catalog = LocalCatalog::new(dir.path());
        assert_eq!(catalog.fetch_definition("renamed").await.unwrap().name, "renamed");
        assert_eq!(catalog.fetch_definition("nameless").await.unwrap().name, "nameless");
        assert_eq!(catalog.list_names().await.unwrap(), vec!["nameless", "renamed"]);
    }

    #[tokio::test]
    async fn test_local_missing_dir_and_processor() {
        let catalog = LocalCatalog::new("/nonexistent/processors");
        assert!(catalog.list_names().await.unwrap().is_empty());
        let err = catalog.fetch_definition("x").await.unwrap_err();
        assert_eq!(err.error_kind(), "ProcessorNotFound");
    }

    #[tokio::test]
    async fn test_layered_prefers_first_layer() {
        let local = InMemoryCatalog::new()
            .with_definition(ProcessorDefinition::new("shared", vec![json!({"$source": {}})]));
        let remote = InMemoryCatalog::new()
            .with_definition(ProcessorDefinition::new("shared", vec![]))
            .with_definition(ProcessorDefinition::new("remote_only", vec![]));

        let catalog = LayeredCatalog::new()
            .with_layer(Arc::new(local))
            .with_layer(Arc::new(remote));

        assert_eq!(catalog.fetch_definition("shared").await.unwrap().pipeline.len(), 1);
        assert_eq!(catalog.fetch_definition("remote_only").await.unwrap().name, "remote_only");
        assert_eq!(catalog.list_names().await.unwrap(), vec!["remote_only", "shared"]);
        assert!(catalog.fetch_definition("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_layered_listing_skips_unreachable_layer() {
        let local = InMemoryCatalog::new()
            .with_definition(ProcessorDefinition::new("orders", vec![]))
            .with_definition(ProcessorDefinition::new("clicks", vec![]));
        let catalog = LayeredCatalog::new()
            .with_layer(Arc::new(local))
            .with_layer(Arc::new(UnreachableCatalog));

        let names = assert_ok!(catalog.list_names().await);
        assert_eq!(names, vec!["clicks", "orders"]);
    }

    #[tokio::test]
    async fn test_layered_listing_fails_when_every_layer_fails() {
        let catalog = LayeredCatalog::new()
            .with_layer(Arc::new(UnreachableCatalog))
            .with_layer(Arc::new(UnreachableCatalog));

        let err = assert_err!(catalog.list_names().await);
        assert_eq!(err.error_kind(), "ProviderError");
        assert!(assert_ok!(LayeredCatalog::new().list_names().await).is_empty());
    }
}
