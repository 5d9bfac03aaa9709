// src/config/loader.rs: CLI + config file merge into RunConfig

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use fxhash::FxHashMap as HashMap;
use log::{info, warn};

use crate::cli::Arguments;
use crate::config::defs::{
    Origin, PipelineError, RunConfig, ToolPaths, ALL_TOOLS, DEFAULT_MIN_SCORE, FOAM_HMM,
    TOOL_CONFIG_KEYS,
};

/// Parses `KEY: value` lines. Comments (`#`) and blank lines are ignored,
/// and only the first `:` splits key from value.
pub fn parse_config_text(text: &str) -> HashMap<String, String> {
    let mut config = HashMap::default();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            config.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    config
}

pub fn load_config_file(path: &Path) -> Result<HashMap<String, String>, PipelineError> {
    let text = fs::read_to_string(path).map_err(|e| {
        PipelineError::InvalidConfig(format!("cannot read config file {}: {}", path.display(), e))
    })?;
    Ok(parse_config_text(&text))
}

/// Searches PATH for an executable, the way `which` would.
pub fn find_in_path(tool: &str) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(tool))
        .find(|candidate| candidate.is_file())
}

fn absolute(path: &str, cwd: &Path) -> PathBuf {
    let path = PathBuf::from(path);
    if path.is_absolute() { path } else { cwd.join(path) }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "yes" | "1" | "on")
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, PipelineError> {
    value
        .parse()
        .map_err(|_| PipelineError::InvalidConfig(format!("{} must be numeric, got '{}'", key, value)))
}

fn resolve_tools(file: &HashMap<String, String>, cwd: &Path) -> ToolPaths {
    let mut tools = ToolPaths::default();
    info!("Checking environment for dependencies:");
    for &tool in ALL_TOOLS {
        let configured = TOOL_CONFIG_KEYS
            .get(tool)
            .and_then(|key| file.get(*key))
            .map(|value| absolute(value, cwd));
        match configured.or_else(|| find_in_path(tool)) {
            Some(path) => {
                info!("{:20} {}", tool, path.display());
                tools.insert(tool, path);
            }
            None => {
                let key = TOOL_CONFIG_KEYS.get(tool).copied().unwrap_or(tool);
                warn!("{:20} NOT FOUND, must be defined in config file as {}: <path>", tool, key);
            }
        }
    }
    tools
}

/// Builds the immutable run configuration. Command-line values win over the config file.
pub fn build_run_config(
    args: &Arguments,
    cwd: &Path,
    detected_cores: usize,
) -> Result<RunConfig, PipelineError> {
    let file = match &args.config {
        Some(path) => {
            info!("Loading configuration from {}", path);
            load_config_file(&absolute(path, cwd))?
        }
        None => HashMap::default(),
    };

    let mut inputs: Vec<(Origin, PathBuf)> = Vec::new();
    for (origin, cli_values, key) in [
        (Origin::Microbial, &args.mic, "MIC"),
        (Origin::Eukaryote, &args.euk, "EUK"),
    ] {
        if !cli_values.is_empty() {
            inputs.extend(cli_values.iter().map(|p| (origin, absolute(p, cwd))));
        } else if let Some(listed) = file.get(key) {
            inputs.extend(
                listed
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(|p| (origin, absolute(p, cwd))),
            );
        }
    }
    if inputs.is_empty() {
        return Err(PipelineError::InvalidConfig(
            "at least one of --mic or --euk must be declared on the command line or in the config file".to_string(),
        ));
    }

    let out_dir = match args.out_dir.as_deref().or(file.get("DIR_OUT").map(String::as_str)) {
        Some(dir) => absolute(dir, cwd),
        None => cwd.join("pipeline"),
    };

    let db_dir = match args.db_dir.as_deref().or(file.get("DIR_DB").map(String::as_str)) {
        Some(dir) => absolute(dir, cwd),
        None => cwd.join("cerberusDB"),
    };

    let hmm_library = match args.hmm.as_deref().or(file.get("HMM").map(String::as_str)) {
        Some(path) => absolute(path, cwd),
        None => db_dir.join(FOAM_HMM),
    };

    let min_score = match (args.min_score, file.get("MIN_SCORE")) {
        (Some(score), _) => score,
        (None, Some(value)) => parse_number("MIN_SCORE", value)?,
        (None, None) => DEFAULT_MIN_SCORE,
    };
    if !min_score.is_finite() {
        return Err(PipelineError::InvalidConfig(format!("invalid minimum score {}", min_score)));
    }

    let threads = match (args.threads, file.get("CPUS")) {
        (Some(n), _) => n,
        (None, Some(value)) => parse_number("CPUS", value)?,
        (None, None) => detected_cores,
    }
    .max(1);

    let workers = match (args.workers, file.get("WORKERS")) {
        (Some(n), _) => n,
        (None, Some(value)) => parse_number("WORKERS", value)?,
        (None, None) => detected_cores,
    }
    .max(1);

    let replace = args.replace || file.get("REPLACE").is_some_and(|v| parse_flag(v));
    let decon_reference = file.get("REFSEQ").map(|p| absolute(p, cwd));

    Ok(RunConfig {
        out_dir,
        db_dir,
        hmm_library,
        decon_reference,
        tools: resolve_tools(&file, cwd),
        inputs,
        min_score,
        threads,
        workers,
        replace,
    })
}
