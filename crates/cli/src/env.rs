use crate::error::CliError;
use std::{collections::HashMap, fs, path::Path};

/// Process environment overlaid with variables from `.env` files.
#[derive(Debug, Clone)]
pub struct EnvManager {
    vars: HashMap<String, String>,
}

impl EnvManager {
    pub fn new() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Load variables from a .env file. File values win over the process
    /// environment.
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), CliError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("Failed to read env file {}: {}", path.display(), e))
        })?;

        self.parse_env_content(&content)
    }

    pub fn all(&self) -> &HashMap<String, String> {
        &self.vars
    }

    fn parse_env_content(&mut self, content: &str) -> Result<(), CliError> {
        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let line = line.strip_prefix("export ").unwrap_or(line);
            let Some((key, value)) = line.split_once('=') else {
                return Err(CliError::Config(format!(
                    "Invalid env file: malformed line {} (expected KEY=VALUE)",
                    line_num + 1
                )));
            };

            let key = key.trim();
            if key.is_empty() {
                return Err(CliError::Config(format!(
                    "Invalid env file: empty key at line {}",
                    line_num + 1
                )));
            }

            self.vars
                .insert(key.to_string(), Self::unquote_value(value.trim()));
        }

        Ok(())
    }

    fn unquote_value(value: &str) -> String {
        for quote in ['"', '\''] {
            if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
                return value[1..value.len() - 1].to_string();
            }
        }
        value.to_string()
    }
}

impl Default for EnvManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty() -> EnvManager {
        EnvManager {
            vars: HashMap::new(),
        }
    }

    #[test]
    fn test_parse_basic_env() {
        let mut env = empty();
        let content = r#"
# Comment
ROWSTREAM_MAX_WAIT=250ms
export ROWSTREAM_TARGET_RESULT_SIZE=64kB
        "#;

        env.parse_env_content(content).unwrap();
        assert_eq!(env.vars.get("ROWSTREAM_MAX_WAIT").unwrap(), "250ms");
        assert_eq!(env.vars.get("ROWSTREAM_TARGET_RESULT_SIZE").unwrap(), "64kB");
    }

    #[test]
    fn test_parse_quoted_values() {
        let mut env = empty();
        let content = r#"
QUOTED="value with spaces"
SINGLE='single quoted'
UNQUOTED=no_spaces
        "#;

        env.parse_env_content(content).unwrap();
        assert_eq!(env.vars.get("QUOTED").unwrap(), "value with spaces");
        assert_eq!(env.vars.get("SINGLE").unwrap(), "single quoted");
        assert_eq!(env.vars.get("UNQUOTED").unwrap(), "no_spaces");
    }

    #[test]
    fn test_invalid_env_format() {
        let mut env = empty();
        assert!(env.parse_env_content("INVALID LINE WITHOUT EQUALS").is_err());
        assert!(env.parse_env_content("=value").is_err());
    }
}
