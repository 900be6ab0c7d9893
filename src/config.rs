use crate::cli::Args;
use crate::condition::SearchCondition;
use crate::errors::Result;
use crate::sink::OutputKind;
use serde::Deserialize;
use std::env;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Report workbook written when neither the command line nor a config file
/// names one.
pub const DEFAULT_REPORT: &str = "result.xlsx";

/// Optional run settings read from a YAML file.
///
/// ```yaml
/// report: /home/me/results/jakarta.xlsx
/// output: report
/// verbose: true
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Path of the results workbook.
    #[serde(default)]
    pub report: Option<PathBuf>,
    /// Where hits go.
    #[serde(default)]
    pub output: Option<OutputKind>,
    /// Enables debug logging.
    #[serde(default)]
    pub verbose: Option<bool>,
}

/// A utility for locating and loading run configuration files.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Finds the configuration file by searching in a prioritized list of locations.
    ///
    /// The search order is:
    /// 1. The path as given (absolute, or relative to the current directory).
    /// 2. A path relative to `working_dir`.
    /// 3. Inside the user's `sheetgrep` config directory.
    /// 4. Next to the executable, or one or two levels above it (to handle
    ///    `target/release` builds).
    ///
    /// # Arguments
    ///
    /// * `config_path` - The path to the configuration file, which can be absolute or relative.
    /// * `working_dir` - The directory being searched.
    pub fn find_config(config_path: &Path, working_dir: &Path) -> Result<PathBuf> {
        if config_path.exists() {
            return Ok(config_path.to_path_buf());
        }
        if config_path.is_absolute() {
            return Err(format!("Config file '{}' not found", config_path.display()).into());
        }

        let in_working_dir = working_dir.join(config_path);
        if in_working_dir.exists() {
            return Ok(in_working_dir);
        }

        let user_config = dirs::config_dir().map(|dir| dir.join("sheetgrep").join(config_path));
        if let Some(candidate) = &user_config {
            if candidate.exists() {
                return Ok(candidate.clone());
            }
        }

        let exe_dir = env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));
        if let Some(exe_dir) = &exe_dir {
            for dir in exe_dir.ancestors().take(3) {
                let candidate = dir.join(config_path);
                if candidate.exists() {
                    return Ok(candidate);
                }
            }
        }

        let mut tried_locations = vec![
            config_path.display().to_string(),
            in_working_dir.display().to_string(),
        ];
        if let Some(candidate) = user_config {
            tried_locations.push(candidate.display().to_string());
        }
        if let Some(exe_dir) = exe_dir {
            tried_locations.push(exe_dir.join(config_path).display().to_string());
        }

        Err(format!(
            "Config file '{}' not found. Searched in:\n  - {}",
            config_path.display(),
            tried_locations.join("\n  - ")
        )
        .into())
    }

    /// Loads a `RunConfig` from a YAML file.
    ///
    /// # Arguments
    ///
    /// * `path` - The path to the YAML configuration file.
    pub fn load_run_config(path: &Path) -> Result<RunConfig> {
        let file = File::open(path)?;
        Ok(serde_yaml::from_reader(file)?)
    }
}

/// Everything a run needs, after command line and config file are merged.
#[derive(Debug)]
pub struct Settings {
    pub condition: SearchCondition,
    pub output: OutputKind,
    /// Absolute path of the results workbook.
    pub report: PathBuf,
    pub verbose: bool,
}

impl Settings {
    /// Validates the command line and merges it over the optional config file.
    ///
    /// # Errors
    ///
    /// Fails if the root is not an existing directory, the search word is
    /// empty, or a `--config` file was named but cannot be found or parsed.
    pub fn resolve(args: &Args) -> Result<Self> {
        if !args.root.is_dir() {
            return Err(format!(
                "Search root '{}' is not an existing directory",
                args.root.display()
            )
            .into());
        }
        let root = std::path::absolute(&args.root)?;

        let file = match &args.config {
            Some(path) => ConfigLoader::load_run_config(&ConfigLoader::find_config(path, &root)?)?,
            None => RunConfig::default(),
        };

        let condition = SearchCondition::new(
            root,
            args.search_word.clone(),
            args.mode,
            args.replace_word.clone(),
        )?;

        let report = args
            .report
            .clone()
            .or(file.report)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_REPORT));

        Ok(Self {
            condition,
            output: args.output.or(file.output).unwrap_or_default(),
            report: std::path::absolute(report)?,
            verbose: args.verbose || file.verbose.unwrap_or(false),
        })
    }
}
