//! Loader for the built-in script runtime

use serde::{Deserialize, Serialize};
use sim_package::VirtualFileSet;
use tracing::info;

use crate::compiler::compile_with;
use crate::error::BuildError;
use crate::machine::{ScriptMachine, DEFAULT_INSTRUCTION_BUDGET};
use crate::{BuildOptions, DeviceRuntime, RuntimeLoader};

/// Default entry file
pub const DEFAULT_ENTRY: &str = "main.script";

/// Configuration for [`ScriptLoader`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    /// File compilation starts from
    pub entry: String,
    /// Instructions executed per tick at most
    pub instruction_budget: u32,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            entry: DEFAULT_ENTRY.to_string(),
            instruction_budget: DEFAULT_INSTRUCTION_BUDGET,
        }
    }
}

/// Compiles a file set and loads it into a [`ScriptMachine`]
#[derive(Debug, Clone, Default)]
pub struct ScriptLoader {
    config: ScriptConfig,
}

impl ScriptLoader {
    /// Create a loader with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a loader from configuration
    pub fn from_config(config: ScriptConfig) -> Self {
        Self { config }
    }

    /// Get the loader configuration
    pub fn config(&self) -> &ScriptConfig {
        &self.config
    }
}

impl RuntimeLoader for ScriptLoader {
    fn load(
        &self,
        files: &VirtualFileSet,
        project_name: &str,
    ) -> Result<Box<dyn DeviceRuntime>, BuildError> {
        self.load_with(files, project_name, BuildOptions::default())
    }

    fn load_with(
        &self,
        files: &VirtualFileSet,
        project_name: &str,
        options: BuildOptions,
    ) -> Result<Box<dyn DeviceRuntime>, BuildError> {
        let program = compile_with(files, &self.config.entry, project_name, options)?;
        info!(
            "Loaded {} ({} ops{}) from {}",
            project_name,
            program.ops.len(),
            if options.debug { ", debug" } else { "" },
            self.config.entry
        );
        Ok(Box::new(ScriptMachine::new(
            program,
            self.config.instruction_budget,
        )))
    }
}
