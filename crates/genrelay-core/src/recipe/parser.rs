//! Recipe book parsing and rendering.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use thiserror::Error;

use super::schema::validate_recipe_schema;
use crate::request::{Capability, GenerationSettings, RequestSpec, RetryPolicy, SpecError};

lazy_static! {
    /// `{name}` placeholders in templates
    static ref PLACEHOLDER: Regex = Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
}

/// Errors that can occur when loading or rendering recipes.
#[derive(Error, Debug)]
pub enum RecipeError {
    #[error("Failed to read recipe file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Recipe book does not match schema: {}", .0.join("; "))]
    SchemaError(Vec<String>),

    #[error("Duplicate recipe name: {0}")]
    DuplicateRecipe(String),

    #[error("Recipe '{recipe}' uses undeclared placeholder {{{placeholder}}}")]
    UnknownPlaceholder { recipe: String, placeholder: String },

    #[error("Recipe '{recipe}' requires variable '{variable}'")]
    MissingVariable { recipe: String, variable: String },

    #[error("No recipe named '{0}'")]
    UnknownRecipe(String),

    #[error("Rendered request is invalid: {0}")]
    InvalidSpec(#[from] SpecError),
}

/// A template variable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Variable {
    /// Placeholder name, used as `{name}` in templates
    pub name: String,

    /// What the variable is for
    #[serde(default)]
    pub description: Option<String>,

    /// Value used when the caller supplies none
    #[serde(default)]
    pub default: Option<String>,
}

/// A named request template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recipe {
    /// Unique name within the book
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Expected response modality
    pub capability: Capability,

    /// Model chain, most preferred first
    pub models: Vec<String>,

    /// Optional system instruction template
    #[serde(default)]
    pub system_instruction: Option<String>,

    /// Prompt template with `{name}` placeholders
    pub prompt_template: String,

    /// Declared variables
    #[serde(default)]
    pub variables: Vec<Variable>,

    /// Structured-output schema for text recipes
    #[serde(default)]
    pub response_schema: Option<serde_json::Value>,

    #[serde(default)]
    pub settings: GenerationSettings,

    /// Overrides the caller's default retry policy
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
}

impl Recipe {
    /// Render the templates into a validated `RequestSpec`.
    ///
    /// Supplied values win over declared defaults. Values for undeclared
    /// names are ignored.
    pub fn render(&self, values: &BTreeMap<String, String>) -> Result<RequestSpec, RecipeError> {
        let resolved = self.resolve(values)?;

        let mut builder = RequestSpec::builder(self.capability)
            .models(self.models.iter().cloned())
            .settings(self.settings.clone())
            .prompt(substitute(&self.prompt_template, &resolved));

        if let Some(instruction) = &self.system_instruction {
            builder = builder.system_instruction(substitute(instruction, &resolved));
        }
        if let Some(schema) = &self.response_schema {
            builder = builder.response_schema(schema.clone());
        }
        if let Some(retry) = self.retry {
            builder = builder.retry(retry);
        }

        Ok(builder.build()?)
    }

    /// Names of the placeholders used in the templates, in order of first use.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.templates()
            .flat_map(|t| PLACEHOLDER.captures_iter(t))
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .filter(|name| seen.insert(*name))
            .collect()
    }

    fn templates(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.prompt_template.as_str()).chain(self.system_instruction.as_deref())
    }

    fn resolve<'a>(
        &'a self,
        values: &'a BTreeMap<String, String>,
    ) -> Result<BTreeMap<&'a str, &'a str>, RecipeError> {
        let mut resolved = BTreeMap::new();
        for variable in &self.variables {
            let value = values
                .get(&variable.name)
                .or(variable.default.as_ref())
                .ok_or_else(|| RecipeError::MissingVariable {
                    recipe: self.name.clone(),
                    variable: variable.name.clone(),
                })?;
            resolved.insert(variable.name.as_str(), value.as_str());
        }
        Ok(resolved)
    }

    fn validate(&self) -> Result<(), RecipeError> {
        let declared: HashSet<&str> = self.variables.iter().map(|v| v.name.as_str()).collect();
        if let Some(unknown) = self.placeholders().into_iter().find(|p| !declared.contains(p)) {
            return Err(RecipeError::UnknownPlaceholder {
                recipe: self.name.clone(),
                placeholder: unknown.to_string(),
            });
        }
        if let Some(retry) = &self.retry {
            retry.validate()?;
        }
        Ok(())
    }
}

fn substitute(template: &str, values: &BTreeMap<&str, &str>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            values
                .get(&caps[1])
                .map(|v| v.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// A versioned collection of recipes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeBook {
    /// Book format version
    pub version: String,

    pub recipes: Vec<Recipe>,
}

impl RecipeBook {
    /// Parse a recipe book from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, RecipeError> {
        let value: serde_json::Value = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    /// Parse a recipe book from JSON string.
    pub fn from_json(json: &str) -> Result<Self, RecipeError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Parse a recipe book from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, RecipeError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse a recipe book from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, RecipeError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Parse a file, picking the format from its extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RecipeError> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_file(path),
            _ => Self::from_yaml_file(path),
        }
    }

    /// Look up a recipe by name.
    pub fn get(&self, name: &str) -> Result<&Recipe, RecipeError> {
        self.recipes
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| RecipeError::UnknownRecipe(name.to_string()))
    }

    /// Recipe names, in book order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.recipes.iter().map(|r| r.name.as_str())
    }

    fn from_value(value: serde_json::Value) -> Result<Self, RecipeError> {
        validate_recipe_schema(&value).map_err(RecipeError::SchemaError)?;
        let book: RecipeBook = serde_json::from_value(value)?;
        book.validate()?;
        Ok(book)
    }

    fn validate(&self) -> Result<(), RecipeError> {
        let mut seen = HashSet::new();
        for recipe in &self.recipes {
            if !seen.insert(recipe.name.as_str()) {
                return Err(RecipeError::DuplicateRecipe(recipe.name.clone()));
            }
            recipe.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOOK: &str = r#"
version: "1"
recipes:
  - name: postcard
    capability: image
    models:
      - gemini-2.5-flash-image
      - gemini-2.0-flash-preview-image-generation
    prompt_template: "A {style} postcard of {landmark}, no text"
    variables:
      - name: landmark
      - name: style
        default: watercolor
    settings:
      aspect_ratio: "4:3"
  - name: intent
    capability: text
    models: [gemini-2.5-flash]
    system_instruction: "You classify requests for {app}."
    prompt_template: "{request}"
    variables:
      - name: app
        default: postcards
      - name: request
    response_schema:
      type: OBJECT
      properties:
        style: {type: STRING}
    retry:
      max_attempts_per_model: 2
"#;

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_book() {
        let book = RecipeBook::from_yaml(BOOK).unwrap();
        assert_eq!(book.names().collect::<Vec<_>>(), vec!["postcard", "intent"]);
        assert_eq!(book.get("postcard").unwrap().capability, Capability::Image);
    }

    #[test]
    fn test_render_substitutes_and_uses_defaults() {
        let book = RecipeBook::from_yaml(BOOK).unwrap();
        let spec = book
            .get("postcard")
            .unwrap()
            .render(&values(&[("landmark", "the Eiffel Tower")]))
            .unwrap();

        assert_eq!(
            spec.payload.prompt,
            "A watercolor postcard of the Eiffel Tower, no text"
        );
        assert_eq!(spec.models.len(), 2);
        assert_eq!(spec.settings.aspect_ratio.as_deref(), Some("4:3"));
    }

    #[test]
    fn test_supplied_value_beats_default() {
        let book = RecipeBook::from_yaml(BOOK).unwrap();
        let spec = book
            .get("postcard")
            .unwrap()
            .render(&values(&[("landmark", "Big Ben"), ("style", "ink")]))
            .unwrap();
        assert_eq!(spec.payload.prompt, "A ink postcard of Big Ben, no text");
    }

    #[test]
    fn test_missing_variable_is_error() {
        let book = RecipeBook::from_yaml(BOOK).unwrap();
        let result = book.get("postcard").unwrap().render(&BTreeMap::new());
        assert!(matches!(
            result,
            Err(RecipeError::MissingVariable { variable, .. }) if variable == "landmark"
        ));
    }

    #[test]
    fn test_render_text_recipe_with_schema_and_retry() {
        let book = RecipeBook::from_yaml(BOOK).unwrap();
        let spec = book
            .get("intent")
            .unwrap()
            .render(&values(&[("request", "make it moody")]))
            .unwrap();

        assert_eq!(
            spec.payload.system_instruction.as_deref(),
            Some("You classify requests for postcards.")
        );
        assert_eq!(spec.payload.prompt, "make it moody");
        assert!(spec.payload.response_schema.is_some());
        assert_eq!(
            spec.settings.response_mime_type.as_deref(),
            Some("application/json")
        );
        assert_eq!(spec.retry.max_attempts_per_model, 2);
    }

    #[test]
    fn test_undeclared_placeholder_rejected() {
        let yaml = r#"
version: "1"
recipes:
  - name: broken
    capability: text
    models: [m]
    prompt_template: "Hello {who}"
"#;
        let result = RecipeBook::from_yaml(yaml);
        assert!(matches!(
            result,
            Err(RecipeError::UnknownPlaceholder { placeholder, .. }) if placeholder == "who"
        ));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let yaml = r#"
version: "1"
recipes:
  - {name: a, capability: text, models: [m], prompt_template: x}
  - {name: a, capability: text, models: [m], prompt_template: y}
"#;
        assert!(matches!(
            RecipeBook::from_yaml(yaml),
            Err(RecipeError::DuplicateRecipe(name)) if name == "a"
        ));
    }

    #[test]
    fn test_schema_violation_reported() {
        let json = r#"{"version": "1", "recipes": [{"name": "a", "capability": "text", "models": [], "prompt_template": "x"}]}"#;
        assert!(matches!(
            RecipeBook::from_json(json),
            Err(RecipeError::SchemaError(_))
        ));
    }

    #[test]
    fn test_unknown_recipe() {
        let book = RecipeBook::from_yaml(BOOK).unwrap();
        assert!(matches!(
            book.get("nope"),
            Err(RecipeError::UnknownRecipe(_))
        ));
    }

    #[test]
    fn test_placeholders_in_first_use_order() {
        let book = RecipeBook::from_yaml(BOOK).unwrap();
        assert_eq!(
            book.get("intent").unwrap().placeholders(),
            vec!["request", "app"]
        );
    }
}
