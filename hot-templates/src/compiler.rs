//! Compiles scanned sources into a [`TemplateSet`].

use minijinja::Environment;
use minijinja::syntax::SyntaxConfig;
use tracing::debug;

use crate::config::{Config, DEFAULT_LEFT_DELIM, DEFAULT_RIGHT_DELIM};
use crate::error::{Result, TemplateError};
use crate::scanner::SourceFile;
use crate::set::TemplateSet;

/// Builds template sets from a fixed configuration.
#[derive(Debug, Clone)]
pub struct Compiler {
    config: Config,
}

impl Compiler {
    /// Create a compiler, rejecting delimiters the engine cannot use.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let compiler = Self { config };
        compiler.syntax()?;
        Ok(compiler)
    }

    /// Compile every source into a fresh set.
    ///
    /// Fails on the first source that does not parse. Nothing from a failed
    /// attempt survives it.
    pub fn compile(&self, sources: Vec<SourceFile>, generation: u64) -> Result<TemplateSet> {
        let mut env = Environment::new();
        env.set_undefined_behavior(self.config.undefined.into());
        if let Some(syntax) = self.syntax()? {
            env.set_syntax(syntax);
        }
        for (name, function) in self.config.functions.iter() {
            env.add_global(name.to_string(), function.clone());
        }

        let mut names = Vec::with_capacity(sources.len());
        for file in sources {
            debug!("Compiling template {}", file.name);
            env.add_template_owned(file.name.clone(), file.source)
                .map_err(|source| TemplateError::Compile {
                    name: file.name.clone(),
                    source,
                })?;
            names.push(file.name);
        }

        Ok(TemplateSet::new(
            self.config.base_name.clone(),
            generation,
            names,
            env,
        ))
    }

    fn syntax(&self) -> Result<Option<SyntaxConfig>> {
        let (left, right) = self.config.delimiters();
        if (left, right) == (DEFAULT_LEFT_DELIM, DEFAULT_RIGHT_DELIM) {
            return Ok(None);
        }

        SyntaxConfig::builder()
            .variable_delimiters(left.to_string(), right.to_string())
            .build()
            .map(Some)
            .map_err(|e| TemplateError::Config(format!("invalid delimiters {left} {right}: {e}")))
    }
}
