use miette::miette;
use recurate_core::SessionConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{env, fs};

#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct CliConfig {
    pub session: SessionConfig,
    /// Where the agent keeps per-project transcripts.
    pub claude_projects_dir: Option<PathBuf>,
}

impl CliConfig {
    pub fn load(config_file: &Path) -> miette::Result<CliConfig> {
        let config_string = fs::read_to_string(config_file).map_err(|e| {
            miette!("error reading config file {}: {}", config_file.display(), e)
        })?;
        Self::parse(&config_string)
    }

    pub fn parse(config_string: &str) -> miette::Result<CliConfig> {
        // substitute environment variables in config file
        let config_string = substitute_vars(config_string, env::vars());

        toml::from_str(&config_string).map_err(|e| miette!("error parsing config file {}", e))
    }

    /// Load `explicit` if given, else the default path when it exists, else defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> miette::Result<CliConfig> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match default_config_path() {
            Some(path) if path.is_file() => {
                tracing::debug!(path = %path.display(), "loading config");
                Self::load(&path)
            }
            _ => Ok(CliConfig::default()),
        }
    }

    pub fn projects_dir(&self) -> Option<PathBuf> {
        self.claude_projects_dir
            .clone()
            .or_else(|| dirs::home_dir().map(|home| home.join(".claude").join("projects")))
    }
}

/// Replace `$NAME` with its value. Longer names go first so `$HOME` never
/// eats the front of `$HOME_DIR`.
fn substitute_vars(input: &str, vars: impl IntoIterator<Item = (String, String)>) -> String {
    let mut vars: Vec<(String, String)> = vars.into_iter().collect();
    vars.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

    let mut output = input.to_string();
    for (k, v) in vars {
        output = output.replace(&format!("${}", k), &v);
    }
    output
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("recurate").join("config.toml"))
}
