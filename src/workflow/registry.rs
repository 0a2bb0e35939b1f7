use super::types::{FieldDef, FieldType, WorkflowSummary, WorkflowTemplate};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;

/// Workflow id of the built-in login workflow
pub const AUTH_WORKFLOW_ID: &str = "authentication";

/// File stem of the optional global field override
const GLOBAL_FIELDS_STEM: &str = "global_fields";

/// Fields every composite needs, whatever workflows it includes
pub fn default_global_fields() -> Vec<FieldDef> {
    let mut username = FieldDef::new("username", "Username", FieldType::Text).required();
    username.validation.min_length = Some(3);
    username.validation.max_length = Some(50);

    let mut password = FieldDef::new("password", "Password", FieldType::Password).required();
    password.validation.min_length = Some(6);

    vec![
        FieldDef::new("target_url", "Target URL", FieldType::Url).required(),
        username,
        password,
    ]
}

/// In-memory catalogue of workflow templates
#[derive(Debug, Clone)]
pub struct WorkflowRegistry {
    templates: BTreeMap<String, WorkflowTemplate>,
    global_fields: Vec<FieldDef>,
}

impl Default for WorkflowRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self {
            templates: BTreeMap::new(),
            global_fields: default_global_fields(),
        }
    }

    /// Load every `.json`, `.yaml` and `.yml` template under `dir`.
    ///
    /// Unreadable or malformed files are logged and skipped so one broken
    /// template does not hide the rest.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            anyhow::bail!("Workflow directory not found: {}", dir.display());
        }

        let mut registry = Self::new();
        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map_or(false, |ext| ext == "json" || ext == "yaml" || ext == "yml")
            })
        {
            let path = entry.path();
            let content = match std::fs::read_to_string(path) {
                Ok(c) => c,
                Err(e) => {
                    log::warn!("Skipping unreadable workflow file {}: {}", path.display(), e);
                    continue;
                }
            };
            if content.trim().is_empty() {
                log::debug!("Skipping empty workflow file {}", path.display());
                continue;
            }

            let is_global = path
                .file_stem()
                .map_or(false, |s| s.to_string_lossy() == GLOBAL_FIELDS_STEM);
            if is_global {
                match serde_yaml::from_str::<Vec<FieldDef>>(&content) {
                    Ok(fields) => registry.global_fields = fields,
                    Err(e) => log::warn!("Invalid global fields in {}: {}", path.display(), e),
                }
                continue;
            }

            match parse_template(&content) {
                Ok(template) => {
                    log::debug!("Loaded workflow '{}' from {}", template.workflow_id, path.display());
                    registry.insert(template);
                }
                Err(e) => log::warn!("Skipping workflow file {}: {:#}", path.display(), e),
            }
        }

        log::info!(
            "Loaded {} workflow templates from {}",
            registry.templates.len(),
            dir.display()
        );
        Ok(registry)
    }

    /// Add or replace a template
    pub fn insert(&mut self, template: WorkflowTemplate) {
        if self.templates.contains_key(&template.workflow_id) {
            log::warn!("Workflow '{}' redefined", template.workflow_id);
        }
        self.templates.insert(template.workflow_id.clone(), template);
    }

    pub fn get(&self, workflow_id: &str) -> Option<&WorkflowTemplate> {
        self.templates.get(workflow_id)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn global_fields(&self) -> &[FieldDef] {
        &self.global_fields
    }

    /// Every template, optionally limited to one category, ordered by id
    pub fn list(&self, category: Option<&str>) -> Vec<WorkflowSummary> {
        self.templates
            .values()
            .filter(|t| category.map_or(true, |c| t.category == c))
            .map(WorkflowSummary::from)
            .collect()
    }

    /// Sorted distinct categories
    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> =
            self.templates.values().map(|t| t.category.clone()).collect();
        categories.sort();
        categories.dedup();
        categories
    }

    /// Templates whose id, name, description or category contain `query`,
    /// best match first.
    pub fn search(&self, query: &str, category: Option<&str>) -> Vec<WorkflowSummary> {
        let query = query.trim().to_lowercase();
        let mut results: Vec<WorkflowSummary> = self
            .templates
            .values()
            .filter(|t| category.map_or(true, |c| t.category == c))
            .filter_map(|t| {
                let text = searchable_text(t);
                if !text.contains(&query) {
                    return None;
                }
                let mut summary = WorkflowSummary::from(t);
                summary.relevance_score = Some(relevance(&query, &text));
                Some(summary)
            })
            .collect();

        results.sort_by(|a, b| {
            let a = a.relevance_score.unwrap_or(0.0);
            let b = b.relevance_score.unwrap_or(0.0);
            b.partial_cmp(&a).unwrap_or(std::cmp::Ordering::Equal)
        });
        results
    }

    /// Declared prerequisites of a workflow; empty when unknown
    pub fn dependencies(&self, workflow_id: &str) -> Vec<String> {
        self.get(workflow_id)
            .map(|t| t.dependencies.clone())
            .unwrap_or_default()
    }

    /// The login workflow, if the registry has one
    pub fn auth_workflow(&self) -> Option<&WorkflowTemplate> {
        self.templates
            .values()
            .find(|t| t.provides_authentication)
            .or_else(|| self.templates.get(AUTH_WORKFLOW_ID))
    }
}

fn parse_template(content: &str) -> Result<WorkflowTemplate> {
    // serde_yaml also reads JSON documents
    let template: WorkflowTemplate =
        serde_yaml::from_str(content).context("Invalid workflow template")?;
    if template.workflow_id.trim().is_empty() {
        anyhow::bail!("Workflow template has an empty workflow_id");
    }
    Ok(template)
}

fn searchable_text(t: &WorkflowTemplate) -> String {
    [
        t.workflow_id.as_str(),
        t.workflow_name.as_str(),
        t.description.as_str(),
        t.category.as_str(),
    ]
    .join(" ")
    .to_lowercase()
}

fn relevance(query: &str, text: &str) -> f64 {
    if query == text {
        return 1.0;
    }
    let exact_matches = if query.is_empty() {
        0
    } else {
        text.matches(query).count()
    };
    let text_words: Vec<&str> = text.split_whitespace().collect();
    let query_words: Vec<&str> = query.split_whitespace().collect();
    let word_matches = query_words
        .iter()
        .filter(|w| text_words.contains(w))
        .count();

    let score = (exact_matches as f64 * 0.5 + word_matches as f64 * 0.3)
        / query_words.len().max(1) as f64;
    score.min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn template(id: &str, name: &str, category: &str) -> WorkflowTemplate {
        let mut t = WorkflowTemplate::new(id);
        t.workflow_name = name.to_string();
        t.category = category.to_string();
        t
    }

    fn sample() -> WorkflowRegistry {
        let mut registry = WorkflowRegistry::new();
        registry.insert(template("authentication", "Login", "security"));
        registry.insert(template("create_vlan", "Create VLAN", "network"));
        registry.insert(template("delete_vlan", "Delete VLAN", "network"));
        registry.insert(template("create_vm", "Create virtual machine", "compute"));
        registry
    }

    #[test]
    fn test_load_dir_reads_json_and_yaml() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("auth.json"),
            r#"{"workflow_id": "authentication", "workflow_name": "Login", "provides_authentication": true}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("vlan.yaml"),
            "workflow_id: create_vlan\nworkflow_name: Create VLAN\ncategory: network\ndependencies: [authentication]\n",
        )
        .unwrap();
        fs::write(dir.path().join("empty.json"), "  \n").unwrap();
        fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let registry = WorkflowRegistry::load_dir(dir.path()).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.dependencies("create_vlan"), vec!["authentication"]);
        assert_eq!(
            registry.auth_workflow().map(|t| t.workflow_id.as_str()),
            Some("authentication")
        );
        assert_eq!(registry.global_fields().len(), 3);
    }

    #[test]
    fn test_load_dir_global_fields_override() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("global_fields.yaml"),
            "- field_id: target_url\n  label: Portal\n  type: url\n  required: true\n",
        )
        .unwrap();

        let registry = WorkflowRegistry::load_dir(dir.path()).unwrap();

        assert!(registry.is_empty());
        assert_eq!(registry.global_fields().len(), 1);
        assert_eq!(registry.global_fields()[0].label, "Portal");
    }

    #[test]
    fn test_load_dir_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(WorkflowRegistry::load_dir(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn test_list_and_categories() {
        let registry = sample();
        assert_eq!(registry.list(None).len(), 4);
        assert_eq!(registry.list(Some("network")).len(), 2);
        assert_eq!(registry.categories(), vec!["compute", "network", "security"]);
    }

    #[test]
    fn test_search_ranks_and_filters() {
        let registry = sample();

        let results = registry.search("VLAN", None);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.relevance_score.unwrap() > 0.0));

        let results = registry.search("create", Some("compute"));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].workflow_id, "create_vm");

        assert!(registry.search("firewall", None).is_empty());
    }

    #[test]
    fn test_relevance_scoring() {
        assert_eq!(relevance("create vlan", "create vlan"), 1.0);
        // one exact occurrence plus two word hits over two query words
        let score = relevance("create vlan", "create_vlan create vlan network");
        assert!((score - 0.55).abs() < 1e-9);
        assert_eq!(relevance("vlan", "vlan vlan vlan"), 1.0);
    }
}
