//! Immutable compiled template sets.

use minijinja::{Environment, ErrorKind};
use serde::Serialize;

use crate::error::{Result, TemplateError};

/// A fully compiled collection of named templates.
///
/// Built in one pass by [`crate::Compiler`] and never mutated afterwards.
pub struct TemplateSet {
    base_name: String,
    generation: u64,
    names: Vec<String>,
    env: Environment<'static>,
}

impl TemplateSet {
    pub(crate) fn new(
        base_name: String,
        generation: u64,
        mut names: Vec<String>,
        env: Environment<'static>,
    ) -> Self {
        names.sort();
        Self {
            base_name,
            generation,
            names,
            env,
        }
    }

    /// Name of the set.
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// Load generation this set was built by. The first load is 1.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Sorted template names.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Whether `name` is in the set.
    pub fn contains(&self, name: &str) -> bool {
        self.names.binary_search_by(|n| n.as_str().cmp(name)).is_ok()
    }

    /// Number of compiled templates.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the set holds no templates.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Render `name` with `data` to a string.
    pub fn render<S: Serialize>(&self, name: &str, data: S) -> Result<String> {
        let template = self.env.get_template(name).map_err(|source| {
            if source.kind() == ErrorKind::TemplateNotFound {
                TemplateError::NotFound(name.to_string())
            } else {
                TemplateError::Render {
                    name: name.to_string(),
                    source,
                }
            }
        })?;

        template.render(data).map_err(|source| TemplateError::Render {
            name: name.to_string(),
            source,
        })
    }
}

impl std::fmt::Debug for TemplateSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateSet")
            .field("base_name", &self.base_name)
            .field("generation", &self.generation)
            .field("names", &self.names)
            .finish()
    }
}
