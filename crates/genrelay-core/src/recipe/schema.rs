//! JSON Schema validation for recipe books.
//!
//! Recipe books are validated against `schema/recipe.schema.json` before
//! they are deserialized, so structural mistakes are reported with the
//! path of the offending field.

use std::sync::OnceLock;

/// Embedded recipe schema (loaded at compile time).
const RECIPE_SCHEMA_JSON: &str = include_str!("../../schema/recipe.schema.json");

/// Compiled JSON Schema validator (initialized once, reused).
static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

fn get_validator() -> Result<&'static jsonschema::Validator, String> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: serde_json::Value = serde_json::from_str(RECIPE_SCHEMA_JSON)
            .map_err(|e| format!("Invalid schema JSON: {}", e))?;

        jsonschema::options()
            .build(&schema_value)
            .map_err(|e| format!("Failed to compile schema: {}", e))
    });

    result.as_ref().map_err(|e| e.clone())
}

/// Validate a recipe book value against the schema.
///
/// Returns every violation, formatted as `"<message> at <path>"`.
pub fn validate_recipe_schema(book: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator = get_validator().map_err(|e| vec![e])?;

    let errors: Vec<String> = validator
        .iter_errors(book)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_book_passes() {
        let value = json!({
            "version": "1",
            "recipes": [{
                "name": "caption",
                "capability": "text",
                "models": ["gemini-2.5-flash"],
                "prompt_template": "Describe {subject}"
            }]
        });
        assert!(validate_recipe_schema(&value).is_ok());
    }

    #[test]
    fn test_empty_models_fails() {
        let value = json!({
            "version": "1",
            "recipes": [{
                "name": "caption",
                "capability": "text",
                "models": [],
                "prompt_template": "Describe {subject}"
            }]
        });
        let errors = validate_recipe_schema(&value).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("/recipes/0/models")));
    }

    #[test]
    fn test_unknown_capability_fails() {
        let value = json!({
            "version": "1",
            "recipes": [{
                "name": "clip",
                "capability": "video",
                "models": ["m"],
                "prompt_template": "x"
            }]
        });
        assert!(validate_recipe_schema(&value).is_err());
    }

    #[test]
    fn test_unknown_field_fails() {
        let value = json!({
            "version": "1",
            "recipes": [{
                "name": "caption",
                "capability": "text",
                "models": ["m"],
                "prompt_template": "x",
                "max_retries": 5
            }]
        });
        assert!(validate_recipe_schema(&value).is_err());
    }
}
