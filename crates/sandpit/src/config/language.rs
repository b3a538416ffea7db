use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize, de};

use crate::config::ConfigError;
use crate::types::ResourceLimits;

const INVALID_FILE_EXT_CHARS: [char; 2] = ['/', '.'];

/// Placeholder replaced with the scratch file path in interpreter commands
pub const SOURCE_PLACEHOLDER: &str = "{source}";

/// Languages the sandbox knows how to run
///
/// The set is closed: anything that is not JavaScript or Python is carried as
/// `Unsupported` so it can be reported back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Language {
    JavaScript,
    Python,
    Unsupported(String),
}

impl Language {
    /// Parse a language identifier as sent by clients
    pub fn from_id(id: &str) -> Self {
        let trimmed = id.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "javascript" | "js" => Language::JavaScript,
            "python" | "python3" | "py" => Language::Python,
            _ => Language::Unsupported(trimmed.to_owned()),
        }
    }

    /// Canonical identifier
    pub fn id(&self) -> &str {
        match self {
            Language::JavaScript => "javascript",
            Language::Python => "python",
            Language::Unsupported(id) => id,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Language::Unsupported(_))
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// File extension without dot (e.g., "py")
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileExtension(String);

impl FileExtension {
    pub fn new(extension: &str) -> Result<Self, ConfigError> {
        let contains_invalid = extension
            .chars()
            .any(|c| INVALID_FILE_EXT_CHARS.contains(&c));
        if contains_invalid {
            return Err(ConfigError::InvalidFileExtChars);
        }
        Ok(Self(extension.to_owned()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for FileExtension {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FileExtension::new(&s).map_err(|_| {
            de::Error::invalid_value(
                de::Unexpected::Str(&s),
                &"a file extension without '/' or '.' characters",
            )
        })
    }
}

impl fmt::Display for FileExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Default PATH for interpreter and shell children
pub const DEFAULT_SANDBOX_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Configuration for an external interpreter run against a scratch file
///
/// Missing fields fall back to the Python 3 defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Human-readable name (e.g., "Python 3")
    pub name: String,

    /// Extension of the scratch file
    pub extension: FileExtension,

    /// Command and arguments; `{source}` is replaced with the scratch file path
    pub command: Vec<String>,

    /// Environment variables to set (the rest of the environment is cleared)
    pub env: HashMap<String, String>,

    /// PATH environment variable for the child
    pub path: String,

    /// Resource limits for this interpreter (overrides defaults)
    pub limits: Option<ResourceLimits>,
}

impl InterpreterConfig {
    /// Expand `{source}` in the configured command
    pub fn expand_command(&self, source: &Path) -> Vec<String> {
        let source = source.to_string_lossy();
        self.command
            .iter()
            .map(|arg| arg.replace(SOURCE_PLACEHOLDER, &source))
            .collect()
    }
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            name: "Python 3".to_owned(),
            extension: FileExtension("py".to_owned()),
            command: vec!["python3".to_owned(), SOURCE_PLACEHOLDER.to_owned()],
            env: HashMap::new(),
            path: default_sandbox_path(),
            limits: None,
        }
    }
}

/// Configuration for the in-process JavaScript isolate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JavaScriptConfig {
    /// Resource limits for the isolate (overrides defaults)
    #[serde(default)]
    pub limits: Option<ResourceLimits>,
}

pub(crate) fn default_sandbox_path() -> String {
    DEFAULT_SANDBOX_PATH.to_owned()
}
