//! Patch generation from a catalog of hand-written templates.
//!
//! Catalog files are JSON or YAML, either a bare list of templates or an
//! object with a `templates` list:
//!
//! ```yaml
//! templates:
//!   - key: ui_color
//!     category: ui-ux
//!     keywords: [color, contrast]
//!     file_path: client/src/styles/chat.css
//!     patch: |
//!       @@ -1 +1 @@
//!       -color: #777;
//!       +color: #333;
//!     risk_level: low
//! ```

use anyhow::Context;
use mend_core::{ImprovementTask, Patch, RiskLevel, TaskCategory};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Produces candidate patches for an auto-fixable task.
pub trait PatchGenerator: Send + Sync {
    fn generate(&self, task: &ImprovementTask) -> Vec<Patch>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatchTemplate {
    pub key: String,
    pub category: TaskCategory,
    /// Any of these in the task title or description selects the template.
    /// Empty matches every task of the category.
    #[serde(default)]
    pub keywords: Vec<String>,
    pub file_path: String,
    #[serde(alias = "patch_text")]
    pub patch: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub estimated_impact: String,
}

impl PatchTemplate {
    fn matches(&self, task: &ImprovementTask) -> bool {
        if self.category != task.category {
            return false;
        }
        if self.keywords.is_empty() {
            return true;
        }
        let (title, desc) = task.search_text();
        self.keywords.iter().any(|k| {
            let k = k.to_lowercase();
            title.contains(&k) || desc.contains(&k)
        })
    }

    fn instantiate(&self, task: &ImprovementTask) -> Patch {
        Patch {
            id: format!("patch_{}_{}", task.id, self.key),
            task_id: task.id.clone(),
            file_path: self.file_path.clone(),
            patch_text: self.patch.clone(),
            description: self.description.clone(),
            risk_level: self.risk_level,
            estimated_impact: self.estimated_impact.clone(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    List(Vec<PatchTemplate>),
    Wrapped { templates: Vec<PatchTemplate> },
}

impl From<CatalogFile> for Vec<PatchTemplate> {
    fn from(file: CatalogFile) -> Self {
        match file {
            CatalogFile::List(t) | CatalogFile::Wrapped { templates: t } => t,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CatalogPatchGenerator {
    templates: Vec<PatchTemplate>,
}

impl CatalogPatchGenerator {
    pub fn new(templates: Vec<PatchTemplate>) -> Self {
        Self { templates }
    }

    /// An empty catalog: every task yields no patches.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_json_str(content: &str) -> anyhow::Result<Self> {
        let file: CatalogFile = serde_json::from_str(content).context("parsing JSON catalog")?;
        Ok(Self::new(file.into()))
    }

    pub fn from_yaml_str(content: &str) -> anyhow::Result<Self> {
        let file: CatalogFile = serde_yaml::from_str(content).context("parsing YAML catalog")?;
        Ok(Self::new(file.into()))
    }

    /// Load by extension: `.yaml`/`.yml` as YAML, anything else as JSON.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading catalog: {}", path.display()))?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml" | "yml")
        );
        let catalog = if is_yaml {
            Self::from_yaml_str(&content)
        } else {
            Self::from_json_str(&content)
        };
        catalog.with_context(|| format!("loading catalog: {}", path.display()))
    }

    pub fn templates(&self) -> &[PatchTemplate] {
        &self.templates
    }
}

impl PatchGenerator for CatalogPatchGenerator {
    fn generate(&self, task: &ImprovementTask) -> Vec<Patch> {
        self.templates
            .iter()
            .filter(|t| t.matches(task))
            .map(|t| t.instantiate(task))
            .collect()
    }
}
