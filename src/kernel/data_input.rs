//! Inputs of data-loading modules.
//!
//! A data module does not get its data over a connector. It is handed a
//! [`DataModuleInput`] (a file, for now) and declares through
//! [`DataModuleInputFilter`]s which inputs it can load.

use crate::error::{KernelError, Result};
use crate::kernel::condition::Condition;
use crate::kernel::module::Module;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

/// A file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataModuleInputFile {
    path: PathBuf,
}

impl DataModuleInputFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Extension without the dot, if any.
    pub fn extension(&self) -> Option<&str> {
        self.path.extension().and_then(|e| e.to_str())
    }
}

/// Where a data module loads its data from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum DataModuleInput {
    File(DataModuleInputFile),
}

impl DataModuleInput {
    pub const FILE_TAG: &'static str = "FILE";

    /// Build an input from a type tag and its parameter. Unknown tags are
    /// logged and yield `None`.
    pub fn create(tag: &str, parameter: &str) -> Option<Self> {
        if tag.eq_ignore_ascii_case(Self::FILE_TAG) {
            return Some(DataModuleInput::File(DataModuleInputFile::new(parameter)));
        }
        tracing::error!("Data module input type \"{}\" is not supported yet.", tag);
        None
    }

    pub fn tag(&self) -> &'static str {
        match self {
            DataModuleInput::File(_) => Self::FILE_TAG,
        }
    }

    pub fn as_file(&self) -> Option<&DataModuleInputFile> {
        match self {
            DataModuleInput::File(file) => Some(file),
        }
    }
}

impl fmt::Display for DataModuleInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataModuleInput::File(file) => write!(f, "{}:{}", self.tag(), file.path.display()),
        }
    }
}

/// Declares which inputs a data module accepts.
pub trait DataModuleInputFilter: Send + Sync {
    fn matches(&self, input: &DataModuleInput) -> bool;

    fn description(&self) -> &str;
}

/// Accepts files by extension, compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataModuleInputFilterFile {
    extension: String,
    description: String,
}

impl DataModuleInputFilterFile {
    /// `extension` is the bare extension, e.g. `"stld"`.
    pub fn new(extension: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
            description: description.into(),
        }
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }
}

impl DataModuleInputFilter for DataModuleInputFilterFile {
    fn matches(&self, input: &DataModuleInput) -> bool {
        input
            .as_file()
            .and_then(DataModuleInputFile::extension)
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension))
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// A module that loads its data from a [`DataModuleInput`].
pub struct DataModule {
    module: Arc<Module>,
    filters: Vec<Arc<dyn DataModuleInputFilter>>,
    input: RwLock<Option<DataModuleInput>>,
    input_changed: Arc<Condition>,
}

impl DataModule {
    pub fn new(module: Arc<Module>, filters: Vec<Arc<dyn DataModuleInputFilter>>) -> Self {
        let input_changed = Arc::new(Condition::new());
        module.state().add(input_changed.clone());
        Self {
            module,
            filters,
            input: RwLock::new(None),
            input_changed,
        }
    }

    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    pub fn filters(&self) -> &[Arc<dyn DataModuleInputFilter>] {
        &self.filters
    }

    pub fn accepts(&self, input: &DataModuleInput) -> bool {
        self.filters.iter().any(|filter| filter.matches(input))
    }

    /// Hand the module a new input and wake its main loop. May be called
    /// again at any time; the module reloads on each change.
    pub fn set_input(&self, input: DataModuleInput) -> Result<()> {
        if !self.accepts(&input) {
            return Err(KernelError::UnsupportedInput {
                module: self.module.name().to_string(),
                input: input.to_string(),
            });
        }
        tracing::info!("Module {} received input {}", self.module.name(), input);
        *self.input.write().unwrap_or_else(PoisonError::into_inner) = Some(input);
        self.input_changed.notify();
        Ok(())
    }

    pub fn clear_input(&self) {
        *self.input.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.input_changed.notify();
    }

    pub fn input(&self) -> Option<DataModuleInput> {
        self.input
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn input_changed_condition(&self) -> Arc<Condition> {
        self.input_changed.clone()
    }
}

impl Drop for DataModule {
    fn drop(&mut self) {
        self.module.state().remove(&self.input_changed);
    }
}
