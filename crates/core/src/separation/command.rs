//! Command-line engine invocation.
//!
//! Builds `<program> <prefix args..> -n <model> -o <output_root> <input>`,
//! which for the defaults is `python3 -m demucs -n htdemucs -o <out> <in>`.

use std::path::Path;
use std::time::Duration;

use tokio::process::Command;

use super::engine::{EngineError, EngineOutput, SeparationEngine};
use super::subprocess;

pub const DEFAULT_PROGRAM: &str = "python3";
pub const DEFAULT_PREFIX_ARGS: &[&str] = &["-m", "demucs"];
pub const DEFAULT_MODEL: &str = "htdemucs";

/// Runs the separation model as a child process.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: String,
    prefix_args: Vec<String>,
    model: String,
    timeout: Option<Duration>,
}

impl Default for CommandEngine {
    fn default() -> Self {
        Self::new(
            DEFAULT_PROGRAM,
            DEFAULT_PREFIX_ARGS.iter().map(|s| s.to_string()).collect(),
            DEFAULT_MODEL,
        )
    }
}

impl CommandEngine {
    pub fn new(program: impl Into<String>, prefix_args: Vec<String>, model: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            prefix_args,
            model: model.into(),
            timeout: None,
        }
    }

    /// Kill the engine if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Assemble the command without running it.
    pub fn build_command(&self, input: &Path, output_root: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.prefix_args)
            .arg("-n")
            .arg(&self.model)
            .arg("-o")
            .arg(output_root)
            .arg(input);
        cmd
    }
}

impl SeparationEngine for CommandEngine {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn separate(&self, input: &Path, output_root: &Path) -> Result<EngineOutput, EngineError> {
        let mut cmd = self.build_command(input, output_root);
        tracing::info!(
            program = %self.program,
            model = %self.model,
            input = %input.display(),
            "Demucs is processing the file",
        );

        let output = subprocess::run_command(&mut cmd, self.timeout).await?;

        tracing::info!(
            exit_code = output.exit_code,
            duration_ms = output.duration_ms,
            "Separation engine exited",
        );
        Ok(output)
    }
}
