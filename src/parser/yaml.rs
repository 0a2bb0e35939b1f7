use super::types::{Step, TestScript};
use anyhow::{Context, Result};
use std::path::Path;

/// Parse a test script file (YAML or JSON) into a TestScript
pub fn parse_script_file(path: &Path) -> Result<TestScript> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;

    let mut script = parse_script_content(&content)
        .with_context(|| format!("Failed to parse script: {}", path.display()))?;

    if script.test_name.is_empty() {
        script.test_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "script".to_string());
    }
    Ok(script)
}

/// Parse script content. Accepts a full script object or a bare step list.
pub fn parse_script_content(content: &str) -> Result<TestScript> {
    // serde_yaml also reads JSON documents
    let value: serde_yaml::Value = serde_yaml::from_str(content)?;

    if value.is_sequence() {
        let steps: Vec<Step> = serde_yaml::from_value(value)?;
        return Ok(TestScript {
            test_name: String::new(),
            steps,
            estimated_duration: 0,
        });
    }

    Ok(serde_yaml::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::types::ActionKind;

    #[test]
    fn test_parse_script_object() {
        let yaml = r##"
test_name: Login smoke
test_steps:
  - step_id: 1
    action: navigate
    value: "https://legacy.local/login"
  - step_id: 2
    action: click
    primary_selector: "#submit"
    critical: true
"##;
        let script = parse_script_content(yaml).unwrap();
        assert_eq!(script.test_name, "Login smoke");
        assert_eq!(script.steps.len(), 2);
        assert_eq!(script.steps[1].action, ActionKind::Click);
        assert!(script.steps[1].critical);
    }

    #[test]
    fn test_parse_bare_json_step_list() {
        let json = r#"[{"id": 1, "action": "screenshot"}]"#;
        let script = parse_script_content(json).unwrap();
        assert_eq!(script.steps.len(), 1);
        assert!(script.test_name.is_empty());
    }

    #[test]
    fn test_file_name_used_when_script_unnamed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkout.json");
        std::fs::write(&path, r#"{"steps": []}"#).unwrap();
        let script = parse_script_file(&path).unwrap();
        assert_eq!(script.test_name, "checkout");
    }
}
