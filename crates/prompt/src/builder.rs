//! Prompt builder for rendering templates with variables.

use crate::types::{BuiltPrompt, PromptDefinition};
use selfrag_core::{AppError, AppResult};
use handlebars::Handlebars;
use std::collections::HashMap;

/// Render a prompt definition with input variables.
///
/// Both the system message and the user template are rendered with
/// Handlebars; missing variables render as empty strings.
///
/// # Arguments
/// * `definition` - Prompt definition (built-in or loaded from YAML)
/// * `variables` - Template variables (e.g., "question" -> user input)
pub fn render_prompt(
    definition: &PromptDefinition,
    variables: HashMap<String, String>,
) -> AppResult<BuiltPrompt> {
    tracing::debug!("Rendering prompt: {}", definition.id);

    let system = match &definition.system {
        Some(system) => Some(render_template(system, &variables)?),
        None => None,
    };

    let user = render_template(&definition.template, &variables)?;

    Ok(BuiltPrompt {
        system,
        user,
        source_prompt_id: definition.id.clone(),
        resolved_variables: variables,
    })
}

/// Render a Handlebars template with variables.
fn render_template(template: &str, variables: &HashMap<String, String>) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Disable HTML escaping for plain text
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    let rendered = handlebars
        .render("prompt", &variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))?;

    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_simple_template() {
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), "Hello, world!".to_string());

        let result = render_template("Question: {{question}}", &vars);
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), "Question: Hello, world!");
    }

    #[test]
    fn test_render_prompt_with_system() {
        let def = PromptDefinition::builtin(
            "test.prompt",
            "Test",
            Some("Schema:\n{{schema}}"),
            "Q: {{question}}",
        );

        let mut vars = HashMap::new();
        vars.insert("schema".to_string(), "Table: t".to_string());
        vars.insert("question".to_string(), "how many?".to_string());

        let built = render_prompt(&def, vars).unwrap();
        assert_eq!(built.system.as_deref(), Some("Schema:\nTable: t"));
        assert_eq!(built.user, "Q: how many?");
        assert_eq!(built.source_prompt_id, "test.prompt");
    }

    #[test]
    fn test_render_template_missing_variable() {
        let vars = HashMap::new();
        let result = render_template("Question: {{missing}}", &vars);
        // Handlebars renders missing variables as empty string
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), "Question: ");
    }

    #[test]
    fn test_no_html_escaping() {
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), "a < b && c > d".to_string());

        let rendered = render_template("{{question}}", &vars).unwrap();
        assert_eq!(rendered, "a < b && c > d");
    }
}
