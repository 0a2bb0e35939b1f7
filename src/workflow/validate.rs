use super::types::{FieldDef, FieldType};
use once_cell::sync::Lazy;
use regex::Regex;

static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://\S+$").expect("static regex"));
static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("static regex")
});
static IP_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}$").expect("static regex"));

/// Check one value against its field definition.
///
/// Returns the normalized value (booleans lowercased, numbers trimmed)
/// or every problem found, as user-facing messages.
pub fn validate_field(field: &FieldDef, value: Option<&str>) -> Result<Option<String>, Vec<String>> {
    let name = field.display_name();
    let value = match value {
        Some(v) if !v.is_empty() => v,
        _ if field.required => return Err(vec![format!("{} is required", name)]),
        _ => return Ok(None),
    };

    let rules = &field.validation;
    let mut errors = Vec::new();
    let mut normalized = value.to_string();

    match field.field_type {
        FieldType::Number => match value.trim().parse::<f64>() {
            Ok(n) => {
                if let Some(min) = rules.min {
                    if n < min {
                        errors.push(format!("{} must be at least {}", name, min));
                    }
                }
                if let Some(max) = rules.max {
                    if n > max {
                        errors.push(format!("{} must be at most {}", name, max));
                    }
                }
                normalized = value.trim().to_string();
            }
            Err(_) => errors.push(format!("{} must be a valid number", name)),
        },
        FieldType::Boolean => match value.to_lowercase().as_str() {
            "true" | "false" => normalized = value.to_lowercase(),
            _ => errors.push(format!("{} must be true or false", name)),
        },
        FieldType::Dropdown => {
            if !field.options.is_empty() && !field.options.iter().any(|o| o == value) {
                errors.push(format!(
                    "{} must be one of: {}",
                    name,
                    field.options.join(", ")
                ));
            }
        }
        FieldType::Text | FieldType::Password | FieldType::Url | FieldType::Email | FieldType::Ip => {
            let len = value.chars().count();
            if let Some(min) = rules.min_length {
                if len < min {
                    errors.push(format!("{} must be at least {} characters", name, min));
                }
            }
            if let Some(max) = rules.max_length {
                if len > max {
                    errors.push(format!("{} must be at most {} characters", name, max));
                }
            }
        }
    }

    let builtin: Option<&Regex> = match field.field_type {
        FieldType::Url => Some(&URL_PATTERN),
        FieldType::Email => Some(&EMAIL_PATTERN),
        FieldType::Ip => Some(&IP_PATTERN),
        _ => None,
    };
    match rules.pattern.as_deref() {
        Some(pattern) => match Regex::new(pattern) {
            Ok(re) if !re.is_match(value) => errors.push(format!("{} format is invalid", name)),
            Ok(_) => {}
            Err(_) => errors.push(format!("{} has an invalid validation pattern", name)),
        },
        None => {
            if let Some(re) = builtin {
                if !re.is_match(value) {
                    errors.push(format!("{} format is invalid", name));
                }
            }
        }
    }

    if field.field_type == FieldType::Ip && errors.is_empty() {
        let octets_ok = value.split('.').all(|o| o.parse::<u8>().is_ok());
        if !octets_ok {
            errors.push(format!("{} format is invalid", name));
        }
    }

    if errors.is_empty() {
        Ok(Some(normalized))
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(field_type: FieldType) -> FieldDef {
        FieldDef::new("f", "Field", field_type)
    }

    #[test]
    fn test_required_and_optional() {
        let required = field(FieldType::Text).required();
        assert_eq!(
            validate_field(&required, None),
            Err(vec!["Field is required".to_string()])
        );
        assert_eq!(
            validate_field(&required, Some("")),
            Err(vec!["Field is required".to_string()])
        );
        assert_eq!(validate_field(&field(FieldType::Text), None), Ok(None));
    }

    #[test]
    fn test_number_range() {
        let mut vlan = field(FieldType::Number);
        vlan.validation.min = Some(1.0);
        vlan.validation.max = Some(4094.0);
        assert_eq!(validate_field(&vlan, Some("100")), Ok(Some("100".into())));
        assert_eq!(
            validate_field(&vlan, Some("0")),
            Err(vec!["Field must be at least 1".to_string()])
        );
        assert_eq!(
            validate_field(&vlan, Some("abc")),
            Err(vec!["Field must be a valid number".to_string()])
        );
    }

    #[test]
    fn test_text_length_and_pattern() {
        let mut name = field(FieldType::Text);
        name.validation.min_length = Some(3);
        name.validation.pattern = Some("^[A-Z]".into());
        let errors = validate_field(&name, Some("ab")).unwrap_err();
        assert_eq!(
            errors,
            vec![
                "Field must be at least 3 characters".to_string(),
                "Field format is invalid".to_string()
            ]
        );
    }

    #[test]
    fn test_typed_formats() {
        assert!(validate_field(&field(FieldType::Url), Some("https://erp.local/app")).is_ok());
        assert!(validate_field(&field(FieldType::Url), Some("erp.local")).is_err());
        assert!(validate_field(&field(FieldType::Email), Some("ops@corp.example")).is_ok());
        assert!(validate_field(&field(FieldType::Ip), Some("10.0.0.254")).is_ok());
        assert!(validate_field(&field(FieldType::Ip), Some("10.0.0.300")).is_err());
    }

    #[test]
    fn test_boolean_and_dropdown() {
        assert_eq!(
            validate_field(&field(FieldType::Boolean), Some("TRUE")),
            Ok(Some("true".into()))
        );
        assert!(validate_field(&field(FieldType::Boolean), Some("yes")).is_err());

        let mut mode = field(FieldType::Dropdown);
        mode.options = vec!["L2".into(), "L3".into()];
        assert!(validate_field(&mode, Some("L3")).is_ok());
        assert_eq!(
            validate_field(&mode, Some("L4")),
            Err(vec!["Field must be one of: L2, L3".to_string()])
        );
    }
}
