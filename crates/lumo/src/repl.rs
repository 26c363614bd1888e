//! Line-at-a-time evaluation over accumulated source.
//!
//! Every accepted line is kept, and each new line is compiled together with
//! all of them, so later lines see earlier definitions. A line that fails to
//! compile or run is discarded.

use crate::compiler::Compiler;
use crate::engine::Engine;
use crate::error::Result;
use crate::value::Value;

pub struct Repl<C> {
    compiler: C,
    history: String,
}

impl<C: Compiler> Repl<C> {
    pub fn new(compiler: C) -> Self {
        Repl {
            compiler,
            history: String::new(),
        }
    }

    /// Start from `prelude` as if it had already been entered.
    pub fn with_prelude(compiler: C, prelude: impl Into<String>) -> Self {
        Repl {
            compiler,
            history: prelude.into(),
        }
    }

    pub fn history(&self) -> &str {
        &self.history
    }

    /// Evaluate `line` after everything accepted so far. Blank lines are
    /// ignored and produce no value.
    pub fn submit(&mut self, engine: &Engine, line: &str) -> Result<Option<Value>> {
        if line.trim().is_empty() {
            return Ok(None);
        }
        let source = format!("{};{}", self.history, line);
        let value = engine.eval(&self.compiler, &source)?;
        self.history = source;
        Ok(value)
    }
}
