//! Prompt definitions for every LLM role in the selfrag pipeline.
//!
//! Each pipeline role (graders, generator, rewriter, structured-query
//! synthesis) is driven by a named prompt definition. Built-in defaults
//! ship with the crate; workspaces may override any of them by dropping
//! a YAML file under `.selfrag/prompts/<id>.yml`.

pub mod builder;
pub mod registry;
pub mod types;

pub use builder::render_prompt;
pub use registry::{list_prompts, load_prompt, prompt_ids};
pub use types::{BuiltPrompt, PromptDefinition};
