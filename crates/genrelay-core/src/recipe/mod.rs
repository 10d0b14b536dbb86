//! Request recipes.
//!
//! A recipe is a named request template: a model chain, prompt and system
//! instruction templates with `{name}` placeholders, and generation
//! settings. Recipe books are YAML or JSON, validated against
//! `schema/recipe.schema.json`.

mod parser;
mod schema;

pub use parser::{Recipe, RecipeBook, RecipeError, Variable};
