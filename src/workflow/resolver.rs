use super::registry::WorkflowRegistry;
use super::types::{EnhancedWorkflow, StepTemplate, WorkflowTemplate};
use super::validate::validate_field;
use crate::error::{FieldError, ResolveError};
use crate::parser::types::{ActionKind, Step};
use crate::utils::config::TimeoutConfig;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::{BTreeMap, HashMap, HashSet};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.-]+)\s*\}\}").expect("static regex"));

/// Workflow id reported on errors of registry-wide fields
const GLOBAL_SCOPE: &str = "global";

/// Expands a high-level workflow into one runnable composite
pub struct WorkflowResolver {
    registry: WorkflowRegistry,
    timeouts: TimeoutConfig,
}

impl WorkflowResolver {
    pub fn new(registry: WorkflowRegistry, timeouts: TimeoutConfig) -> Self {
        Self { registry, timeouts }
    }

    pub fn registry(&self) -> &WorkflowRegistry {
        &self.registry
    }

    /// Resolve `workflow_id` and its prerequisites into a composite.
    ///
    /// Prerequisites run before the workflows that need them, each at most
    /// once, with the login workflow first. Nothing is returned unless every
    /// field value validates.
    pub fn resolve(
        &self,
        workflow_id: &str,
        values: &HashMap<String, String>,
        answers: &HashMap<String, bool>,
    ) -> Result<EnhancedWorkflow, ResolveError> {
        if self.registry.get(workflow_id).is_none() {
            return Err(ResolveError::UnknownWorkflow(workflow_id.to_string()));
        }

        let mut walk = Walk {
            registry: &self.registry,
            answers,
            order: Vec::new(),
            done: HashSet::new(),
            path: Vec::new(),
            resolved: BTreeMap::new(),
        };
        walk.visit(workflow_id, None)?;
        let Walk {
            mut order,
            resolved,
            ..
        } = walk;

        if let Some(auth) = self.registry.auth_workflow() {
            order.retain(|id| id != &auth.workflow_id);
            order.insert(0, auth.workflow_id.clone());
        }

        let templates: Vec<&WorkflowTemplate> =
            order.iter().filter_map(|id| self.registry.get(id)).collect();

        let user_values = self.validate(&templates, values)?;

        let mut steps = Vec::new();
        for template in &templates {
            for step in &template.steps {
                let id = steps.len() as u32 + 1;
                steps.push(self.build_step(id, step, &template.workflow_id, &user_values));
            }
        }

        let estimated_total_duration = templates.iter().map(|t| t.estimated_duration).sum();

        log::info!(
            "Resolved workflow '{}': {} workflows, {} steps",
            workflow_id,
            order.len(),
            steps.len()
        );

        Ok(EnhancedWorkflow {
            main_workflow: workflow_id.to_string(),
            included_workflows: order,
            user_values,
            resolved_dependencies: resolved,
            steps,
            estimated_total_duration,
        })
    }

    /// Validate global fields, then each workflow's own fields.
    ///
    /// A field id shared by several workflows is checked once, against its
    /// first definition. Values for undeclared fields pass through.
    fn validate(
        &self,
        templates: &[&WorkflowTemplate],
        values: &HashMap<String, String>,
    ) -> Result<BTreeMap<String, String>, ResolveError> {
        let mut accepted: BTreeMap<String, String> = values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let mut errors = Vec::new();
        let mut seen = HashSet::new();

        let scoped = self
            .registry
            .global_fields()
            .iter()
            .map(|f| (GLOBAL_SCOPE, f))
            .chain(
                templates
                    .iter()
                    .flat_map(|t| t.fields.iter().map(move |f| (t.workflow_id.as_str(), f))),
            );

        for (scope, field) in scoped {
            if !seen.insert(field.field_id.clone()) {
                continue;
            }
            let supplied = values
                .get(&field.field_id)
                .map(|v| v.as_str())
                .filter(|v| !v.is_empty())
                .or(field.default_value.as_deref());

            match validate_field(field, supplied) {
                Ok(Some(value)) => {
                    accepted.insert(field.field_id.clone(), value);
                }
                Ok(None) => {}
                Err(messages) => errors.extend(messages.into_iter().map(|message| FieldError {
                    workflow_id: scope.to_string(),
                    field: field.field_id.clone(),
                    message,
                })),
            }
        }

        if errors.is_empty() {
            Ok(accepted)
        } else {
            Err(ResolveError::Validation(errors))
        }
    }

    fn build_step(
        &self,
        id: u32,
        template: &StepTemplate,
        workflow_id: &str,
        values: &BTreeMap<String, String>,
    ) -> Step {
        let fill = |text: &str| substitute(text, values);
        let timeout_ms = template.timeout.unwrap_or(match template.action {
            ActionKind::Navigate => self.timeouts.navigation_timeout_ms,
            _ => self.timeouts.default_timeout_ms,
        });

        let mut step = Step::new(id, template.action);
        step.description = fill(&template.description);
        step.target = fill(&template.target);
        step.primary_locator = template.selector.as_deref().map(fill);
        step.fallback_locators = template.fallback_selectors.iter().map(|s| fill(s)).collect();
        step.value = template.value.as_deref().map(fill);
        step.verification = template.verification.as_deref().map(fill);
        step.timeout_ms = timeout_ms;
        step.critical = template.critical;
        step.screenshot_after = template.screenshot_after;
        step.source_workflow = Some(workflow_id.to_string());
        step
    }
}

/// Replace `{{field}}` placeholders; unknown names stay as written
pub fn substitute(text: &str, values: &BTreeMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &Captures| match values.get(&caps[1]) {
            Some(v) => v.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Depth-first expansion state
struct Walk<'a> {
    registry: &'a WorkflowRegistry,
    answers: &'a HashMap<String, bool>,
    order: Vec<String>,
    done: HashSet<String>,
    path: Vec<String>,
    resolved: BTreeMap<String, bool>,
}

impl<'a> Walk<'a> {
    fn visit(&mut self, id: &str, parent: Option<&str>) -> Result<(), ResolveError> {
        if self.done.contains(id) {
            return Ok(());
        }
        if let Some(pos) = self.path.iter().position(|p| p == id) {
            let mut cycle = self.path[pos..].to_vec();
            cycle.push(id.to_string());
            return Err(ResolveError::Cycle(cycle));
        }

        let registry = self.registry;
        let template = registry.get(id).ok_or_else(|| match parent {
            Some(parent) => ResolveError::UnknownPrerequisite {
                workflow: parent.to_string(),
                prerequisite: id.to_string(),
            },
            None => ResolveError::UnknownWorkflow(id.to_string()),
        })?;

        self.path.push(id.to_string());
        for prerequisite in self.prerequisites(template) {
            self.visit(&prerequisite, Some(id))?;
        }
        self.path.pop();

        self.done.insert(id.to_string());
        self.order.push(id.to_string());
        Ok(())
    }

    /// Prerequisites selected for `template`, in declared order.
    ///
    /// A dependency named by a question is included only when the answer
    /// selects it; question targets missing from `dependencies` are appended.
    fn prerequisites(&mut self, template: &WorkflowTemplate) -> Vec<String> {
        let conditional: HashSet<&str> = template
            .dependency_questions
            .iter()
            .flat_map(|q| q.candidates())
            .collect();

        let mut chosen = Vec::new();
        for question in &template.dependency_questions {
            let answer = self
                .answers
                .get(&question.field)
                .copied()
                .unwrap_or(question.default);
            self.resolved.insert(question.field.clone(), answer);
            if let Some(id) = question.included_for(answer) {
                chosen.push(id.to_string());
            }
        }

        let mut selected: Vec<String> = template
            .dependencies
            .iter()
            .filter(|d| !conditional.contains(d.as_str()) || chosen.contains(d))
            .cloned()
            .collect();
        for id in chosen {
            if !selected.contains(&id) {
                selected.push(id);
            }
        }
        selected
    }
}
