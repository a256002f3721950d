//! Resolved command lines.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Program plus arguments, ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Executable name or path.
    pub program: PathBuf,
    /// Arguments, in order.
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Creates a spec with no arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Renders the command line for messages, e.g. `dredd-hooks-ruby hooks.rb`.
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}
