use crate::error::ConfigError;
use std::{collections::HashMap, fs, path::Path};
use tracing::debug;

/// Variables visible to the process: the system environment, optionally
/// overlaid with the entries of a `.env` file.
#[derive(Debug, Clone, Default)]
pub struct EnvManager {
    vars: HashMap<String, String>,
}

impl EnvManager {
    pub fn from_system() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Manager with no variables at all, used where the process environment
    /// must not leak in.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_string(), value.to_string());
        self
    }

    /// Overlays the variables of a `.env` file; file entries win.
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::EnvFile {
            path: path.display().to_string(),
            source,
        })?;

        let loaded = self.parse_env_content(&content)?;
        debug!(path = %path.display(), vars = loaded, "Loaded env file");
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    fn parse_env_content(&mut self, content: &str) -> Result<usize, ConfigError> {
        let mut loaded = 0;
        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let line = line.strip_prefix("export ").unwrap_or(line);
            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::MalformedLine(idx + 1));
            };

            let key = key.trim();
            if key.is_empty() {
                return Err(ConfigError::EmptyKey(idx + 1));
            }

            self.vars.insert(key.to_string(), unquote(value.trim()));
            loaded += 1;
        }
        Ok(loaded)
    }
}

fn unquote(value: &str) -> String {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return value[1..value.len() - 1].to_string();
        }
    }
    value.to_string()
}
