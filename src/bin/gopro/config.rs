use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

use crate::Args;

/// Final config created from CLI arguments and user config file.
#[derive(Debug)]
pub struct Config {
    /// Directory containing the recording files.
    pub(crate) input_dir: PathBuf,
    /// Directory for merged output files. Defaults to the input directory.
    pub(crate) output_dir: PathBuf,
    pub(crate) dryrun: bool,
    pub(crate) rename: bool,
    pub(crate) merge: bool,
    pub(crate) verbose: bool,
}

/// Config from a config file
#[derive(Debug, Default, Deserialize)]
struct GoproConfig {
    #[serde(default)]
    commit: bool,
    #[serde(default)]
    merge: bool,
    #[serde(default)]
    output_dir: Option<PathBuf>,
    #[serde(default)]
    verbose: bool,
}

/// Wrapper needed for parsing the config file section.
#[derive(Debug, Default, Deserialize)]
struct UserConfig {
    #[serde(default)]
    gopro: GoproConfig,
}

impl GoproConfig {
    /// Try to read user config from the file if it exists.
    /// Otherwise, fall back to default config.
    ///
    /// # Errors
    /// Returns an error if config file exists but cannot be read or parsed.
    fn get_user_config() -> anyhow::Result<Self> {
        let Some(path) = gopro_tools::config::config_path() else {
            return Ok(Self::default());
        };

        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse config file {}:\n{e}", path.display())),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(error) => Err(anyhow::anyhow!(
                "Failed to read config file {}: {error}",
                path.display()
            )),
        }
    }

    /// Parse config from a TOML string.
    ///
    /// # Errors
    /// Returns an error if the TOML string is invalid.
    fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        toml::from_str::<UserConfig>(toml_str)
            .map(|config| config.gopro)
            .context("Failed to parse gopro config TOML")
    }
}

impl Config {
    /// Create config from given command line args and user config file.
    ///
    /// # Errors
    /// Returns an error if the config file cannot be read or parsed,
    /// or the input directory does not exist.
    pub fn from_args(args: Args) -> anyhow::Result<Self> {
        let user_config = GoproConfig::get_user_config()?;

        let input_dir = gopro_tools::resolve_input_path(args.path.as_deref())?;
        let output = args.output.or(user_config.output_dir);
        let output_dir = gopro_tools::resolve_output_path(output.as_deref(), &input_dir);

        Ok(Self {
            input_dir,
            output_dir,
            dryrun: !(args.commit || user_config.commit),
            rename: !args.skip_rename,
            merge: args.merge || user_config.merge,
            verbose: args.verbose || user_config.verbose,
        })
    }
}
