/// Functions and structs for invoking external tools and creating their command-line arguments

use std::fs::File;
use std::path::Path;
use std::process::Stdio;

use anyhow::anyhow;
use log::warn;
use tokio::process::Command;

use crate::config::defs::{PipelineError, RunConfig, STDERR_LOG, STDOUT_LOG};
use crate::utils::work::Key;


pub mod fastqc {
    use std::path::Path;

    pub fn arg_generator(threads: usize, out_dir: &Path, inputs: &[&Path]) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("-o".to_string());
        args_vec.push(out_dir.to_string_lossy().to_string());
        args_vec.push("-t".to_string());
        args_vec.push(threads.to_string());
        args_vec.extend(inputs.iter().map(|p| p.to_string_lossy().to_string()));
        args_vec
    }
}

pub mod fastp {
    use std::path::Path;

    pub struct FastpConfig<'a> {
        pub inputs: &'a [&'a Path],
        pub outputs: &'a [&'a Path],
        pub report_dir: &'a Path,
    }

    pub fn arg_generator(threads: usize, fastp_config: &FastpConfig) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        for (flag, path) in ["-i", "-I"].iter().zip(fastp_config.inputs) {
            args_vec.push(flag.to_string());
            args_vec.push(path.to_string_lossy().to_string());
        }
        for (flag, path) in ["-o", "-O"].iter().zip(fastp_config.outputs) {
            args_vec.push(flag.to_string());
            args_vec.push(path.to_string_lossy().to_string());
        }
        args_vec.push("-j".to_string());
        args_vec.push(fastp_config.report_dir.join("fastp.json").to_string_lossy().to_string());
        args_vec.push("-h".to_string());
        args_vec.push(fastp_config.report_dir.join("fastp.html").to_string_lossy().to_string());
        args_vec.push("-w".to_string());
        args_vec.push(threads.to_string());
        args_vec
    }
}

pub mod bbduk {
    use std::path::Path;

    pub struct BbdukConfig<'a> {
        pub inputs: &'a [&'a Path],
        pub outputs: &'a [&'a Path],
        pub matched: &'a Path,
        pub stats: &'a Path,
        pub reference: Option<&'a Path>,
    }

    fn kv(key: &str, path: &Path) -> String {
        format!("{}={}", key, path.display())
    }

    pub fn arg_generator(bbduk_config: &BbdukConfig) -> Vec<String> {
        let mut args_vec: Vec<String> = vec!["-Xmx1g".to_string()];
        let paired = bbduk_config.inputs.len() == 2;
        if paired {
            args_vec.push(kv("in1", bbduk_config.inputs[0]));
            args_vec.push(kv("in2", bbduk_config.inputs[1]));
            for (key, path) in ["out1", "out2"].iter().zip(bbduk_config.outputs) {
                args_vec.push(kv(key, path));
            }
            args_vec.push("qtrim=r".to_string());
            args_vec.push("trimq=25".to_string());
            args_vec.push("maq=25".to_string());
        } else {
            for path in bbduk_config.inputs.iter().take(1) {
                args_vec.push(kv("in", path));
            }
            for path in bbduk_config.outputs.iter().take(1) {
                args_vec.push(kv("out", path));
            }
            args_vec.push("qin=33".to_string());
            args_vec.push("qtrim=r".to_string());
        }
        args_vec.push("minlen=50".to_string());
        args_vec.push(kv("outm", bbduk_config.matched));
        if let Some(reference) = bbduk_config.reference {
            args_vec.push(kv("ref", reference));
        }
        args_vec.push("k=31".to_string());
        args_vec.push(kv("stats", bbduk_config.stats));
        args_vec
    }
}

pub mod prodigal {
    use std::path::Path;

    pub fn arg_generator(input: &Path, genes: &Path, proteins: &Path) -> Vec<String> {
        vec![
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-o".to_string(),
            genes.to_string_lossy().to_string(),
            "-a".to_string(),
            proteins.to_string_lossy().to_string(),
            "-f".to_string(),
            "gff".to_string(),
            "-p".to_string(),
            "meta".to_string(),
            "-q".to_string(),
        ]
    }
}

pub mod fgs {
    use std::path::{Path, PathBuf};

    /// FragGeneScan++ looks for its models in a `train` directory beside the binary.
    pub fn train_dir(fgs: &Path) -> PathBuf {
        fgs.parent()
            .map(|dir| dir.join("train"))
            .unwrap_or_else(|| PathBuf::from("train"))
    }

    /// `out_prefix` gains `.faa`/`.ffn`/`.out` extensions from the tool itself.
    pub fn arg_generator(fgs: &Path, input: &Path, out_prefix: &Path, threads: usize) -> Vec<String> {
        vec![
            "-s".to_string(),
            input.to_string_lossy().to_string(),
            "-o".to_string(),
            out_prefix.to_string_lossy().to_string(),
            "-w".to_string(),
            "1".to_string(),
            "-r".to_string(),
            train_dir(fgs).to_string_lossy().to_string(),
            "-t".to_string(),
            "complete".to_string(),
            "-p".to_string(),
            threads.to_string(),
        ]
    }
}

pub mod hmmsearch {
    use std::path::Path;

    pub fn arg_generator(threads: usize, hmm: &Path, domtbl: &Path, proteins: &Path) -> Vec<String> {
        vec![
            "--cpu".to_string(),
            threads.to_string(),
            "--domtblout".to_string(),
            domtbl.to_string_lossy().to_string(),
            hmm.to_string_lossy().to_string(),
            proteins.to_string_lossy().to_string(),
        ]
    }
}


/// Runs one external tool to completion with stdout/stderr captured to
/// `stdout.txt`/`stderr.txt` in `log_dir`.
///
/// # Arguments
///
/// * `config` - RunConfig holding the resolved tool paths.
/// * `tool` - Tool tag, e.g. FASTP_TAG.
/// * `args` - Arguments from the tool's arg_generator.
/// * `log_dir` - The work item's output directory.
///
/// # Returns
/// Ok(()) on a zero exit status, ToolExecution otherwise.
pub async fn run_tool(
    config: &RunConfig,
    tool: &str,
    args: Vec<String>,
    log_dir: &Path,
) -> Result<(), PipelineError> {
    let tool_error = |error: String| PipelineError::ToolExecution { tool: tool.to_string(), error };

    let stdout = File::create(log_dir.join(STDOUT_LOG)).map_err(|e| tool_error(e.to_string()))?;
    let stderr = File::create(log_dir.join(STDERR_LOG)).map_err(|e| tool_error(e.to_string()))?;

    let program = config.tools.get(tool);
    let status = Command::new(&program)
        .args(&args)
        .current_dir(log_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .status()
        .await
        .map_err(|e| tool_error(format!("failed to spawn {}: {}. Is {} installed?", program.display(), e, tool)))?;

    if status.success() {
        Ok(())
    } else {
        Err(tool_error(format!("exited with {}", status)))
    }
}


/// Confirms a tool left behind the artifact it was asked to write.
pub fn expect_output(tool: &str, path: &Path) -> Result<(), PipelineError> {
    if path.exists() {
        Ok(())
    } else {
        Err(PipelineError::ToolExecution {
            tool: tool.to_string(),
            error: format!("expected output {} was not produced", path.display()),
        })
    }
}


/// Turns a stage failure into an absent result for that key only.
pub fn absorb<T>(stage: &str, key: &Key, result: Result<T, PipelineError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("{} failed for {}: {}", stage, key, e);
            None
        }
    }
}


/// Wraps non-tool I/O failures (directory setup, conversions) for `absorb`.
pub fn io_failure(stage: &str, e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Other(anyhow!("{}: {}", stage, e))
}
