// Stage functions: one per pipeline step, each absorbing its own failures
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::FutureExt;
use log::{debug, info};
use tokio::task;

use crate::config::defs::{
    Origin, PipelineError, RunConfig, Step, BBDUK_TAG, COMBINED_DIR, FASTP_TAG, FASTQC_TAG, FGS_TAG,
    GZIP_EXT, HMMSEARCH_TAG, PRODIGAL_TAG, ROLLUP_FILE,
};
use crate::utils::command::{absorb, bbduk, expect_output, fastp, fastqc, fgs, hmmsearch, io_failure, prodigal, run_tool};
use crate::utils::dispatch::Stage;
use crate::utils::fastx;
use crate::utils::file::{extension_remover, sequence_stem};
use crate::utils::hierarchy::{build_tree, chart_levels, read_rollup, Scheme};
use crate::utils::hmmer::resolve_best_hits_file;
use crate::utils::report::ChartSink;
use crate::utils::rollup::{write_rollup, OntologyTables};
use crate::utils::stats::{collect_sample_stats, StatsSources, StatsTable};
use crate::utils::work::{Key, Payload, WorkItem};

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Same shape as `payload`, one output per read file, named `<prefix><input name>`.
fn mirror_reads(payload: &Payload, out_dir: &Path, prefix: &str) -> Option<Payload> {
    let rename = |p: &Path| out_dir.join(format!("{}{}", prefix, file_name(p)));
    match payload {
        Payload::Single(p) => Some(Payload::Single(rename(p))),
        Payload::Paired(r1, r2) => Some(Payload::Paired(rename(r1), rename(r2))),
        Payload::Directory(_) => None,
    }
}

/// Runs blocking file work off the async workers.
async fn blocking<T, F>(stage: &'static str, work: F) -> Result<T, PipelineError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(work)
        .await
        .map_err(|e| io_failure(stage, e))?
        .map_err(PipelineError::from)
}

/// Read-quality report for raw reads (`step_02-QC`) or, nested under `quality`,
/// for trimmed reads (`step_03-trim`).
pub fn check_quality(config: Arc<RunConfig>, step: Step) -> Stage {
    let stage = Stage::new("check_quality", step, move |item: WorkItem| {
        let config = config.clone();
        async move {
            let result: Result<Payload, PipelineError> = async {
                let args = fastqc::arg_generator(config.threads, &item.out_path, &item.payload.paths());
                run_tool(&config, FASTQC_TAG, args, &item.out_path).await?;
                Ok(Payload::Directory(item.out_path.clone()))
            }
            .await;
            absorb("check_quality", &item.key, result)
        }
        .boxed()
    });
    match step {
        Step::Qc => stage,
        _ => stage.with_subdir("quality"),
    }
}

pub fn trim_reads(config: Arc<RunConfig>) -> Stage {
    Stage::new("trim_reads", Step::Trim, move |item: WorkItem| {
        let config = config.clone();
        async move {
            let result: Result<Payload, PipelineError> = async {
                let output = mirror_reads(&item.payload, &item.out_path, "trim_")
                    .ok_or_else(|| PipelineError::InvalidInput(format!("{} is not a read file", item.payload)))?;
                let args = fastp::arg_generator(
                    config.threads,
                    &fastp::FastpConfig {
                        inputs: &item.payload.paths(),
                        outputs: &output.paths(),
                        report_dir: &item.out_path,
                    },
                );
                run_tool(&config, FASTP_TAG, args, &item.out_path).await?;
                for path in output.paths() {
                    expect_output(FASTP_TAG, path)?;
                }
                Ok(output)
            }
            .await;
            absorb("trim_reads", &item.key, result)
        }
        .boxed()
    })
}

pub fn decon_reads(config: Arc<RunConfig>) -> Stage {
    Stage::new("decon_reads", Step::Decontaminate, move |item: WorkItem| {
        let config = config.clone();
        async move {
            let result: Result<Payload, PipelineError> = async {
                let output = mirror_reads(&item.payload, &item.out_path, "decon_")
                    .ok_or_else(|| PipelineError::InvalidInput(format!("{} is not a read file", item.payload)))?;
                let matched = item.out_path.join("matched.fastq");
                let stats = item.out_path.join("stats.txt");
                let args = bbduk::arg_generator(&bbduk::BbdukConfig {
                    inputs: &item.payload.paths(),
                    outputs: &output.paths(),
                    matched: &matched,
                    stats: &stats,
                    reference: config.decon_reference.as_deref(),
                });
                run_tool(&config, BBDUK_TAG, args, &item.out_path).await?;
                for path in output.paths() {
                    expect_output(BBDUK_TAG, path)?;
                }
                Ok(output)
            }
            .await;
            absorb("decon_reads", &item.key, result)
        }
        .boxed()
    })
}

/// `<stem>_clean.<ext>`, keeping the contig file's own sequence extension.
fn clean_name(input: &Path) -> String {
    let (_, exts) = extension_remover(input);
    let ext = exts
        .iter()
        .find(|e| !e.eq_ignore_ascii_case(GZIP_EXT))
        .map(String::as_str)
        .unwrap_or("fasta");
    format!("{}_clean.{}", sequence_stem(input), ext)
}

/// Contigs: splits every sequence on `N` runs.
pub fn remove_n(config: Arc<RunConfig>) -> Stage {
    Stage::new("remove_N", Step::Format, move |item: WorkItem| {
        let replace = config.replace;
        async move {
            let result: Result<Payload, PipelineError> = async {
                let Payload::Single(input) = item.payload.clone() else {
                    return Err(PipelineError::InvalidInput(format!("{} is not a contig file", item.payload)));
                };
                let output = item.out_path.join(clean_name(&input));
                if !replace && output.exists() {
                    info!("{} exists, skipping", output.display());
                    return Ok(Payload::Single(output));
                }
                let target = output.clone();
                let written = blocking("remove_N", move || fastx::remove_n(&input, &target)).await?;
                debug!("{}: {} contig pieces", item.key, written);
                Ok(Payload::Single(output))
            }
            .await;
            absorb("remove_N", &item.key, result)
        }
        .boxed()
    })
}

/// Reads: FASTQ to FASTA. Both mates of a pair land in one `.fna`.
pub fn reformat(config: Arc<RunConfig>) -> Stage {
    Stage::new("reformat", Step::Format, move |item: WorkItem| {
        let replace = config.replace;
        async move {
            let result: Result<Payload, PipelineError> = async {
                let inputs: Vec<PathBuf> = match &item.payload {
                    Payload::Directory(_) => {
                        return Err(PipelineError::InvalidInput(format!("{} is not a read file", item.payload)));
                    }
                    payload => payload.paths().into_iter().map(Path::to_path_buf).collect(),
                };
                let output = item.out_path.join(format!("{}.fna", item.key.name));
                if !replace && output.exists() {
                    info!("{} exists, skipping", output.display());
                    return Ok(Payload::Single(output));
                }
                let target = output.clone();
                let written = blocking("reformat", move || {
                    let refs: Vec<&Path> = inputs.iter().map(PathBuf::as_path).collect();
                    fastx::fastq_to_fasta(&refs, &target)
                })
                .await?;
                debug!("{}: {} reads converted", item.key, written);
                Ok(Payload::Single(output))
            }
            .await;
            absorb("reformat", &item.key, result)
        }
        .boxed()
    })
}

/// Gene caller chosen per sample origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneCaller {
    Prodigal,
    FragGeneScan,
}

impl GeneCaller {
    pub fn for_origin(origin: Origin) -> Self {
        match origin {
            Origin::Microbial => GeneCaller::Prodigal,
            Origin::Eukaryote => GeneCaller::FragGeneScan,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            GeneCaller::Prodigal => PRODIGAL_TAG,
            GeneCaller::FragGeneScan => FGS_TAG,
        }
    }

    /// Arguments plus the protein FASTA the call will write.
    pub fn invocation(&self, config: &RunConfig, input: &Path, out_dir: &Path) -> (Vec<String>, PathBuf) {
        let proteins = out_dir.join("proteins.faa");
        let args = match self {
            GeneCaller::Prodigal => prodigal::arg_generator(input, &out_dir.join("genes.gff"), &proteins),
            GeneCaller::FragGeneScan => {
                fgs::arg_generator(&config.tools.get(FGS_TAG), input, &out_dir.join("proteins"), config.threads)
            }
        };
        (args, proteins)
    }
}

pub fn find_orf(config: Arc<RunConfig>) -> Stage {
    Stage::new("find_ORF", Step::GeneCall, move |item: WorkItem| {
        let config = config.clone();
        async move {
            let result: Result<Payload, PipelineError> = async {
                let Payload::Single(input) = &item.payload else {
                    return Err(PipelineError::InvalidInput(format!("{} is not a FASTA file", item.payload)));
                };
                let caller = GeneCaller::for_origin(item.key.origin);
                let (args, proteins) = caller.invocation(&config, input, &item.out_path);
                run_tool(&config, caller.tag(), args, &item.out_path).await?;
                expect_output(caller.tag(), &proteins)?;
                Ok(Payload::Single(proteins))
            }
            .await;
            absorb("find_ORF", &item.key, result)
        }
        .boxed()
    })
}

pub fn hmm_search(config: Arc<RunConfig>) -> Stage {
    Stage::new("hmm_search", Step::Hmmer, move |item: WorkItem| {
        let config = config.clone();
        async move {
            let result: Result<Payload, PipelineError> = async {
                let Payload::Single(proteins) = &item.payload else {
                    return Err(PipelineError::InvalidInput(format!("{} is not a protein file", item.payload)));
                };
                let domtbl = item.out_path.join(format!("{}.FOAM.tbl", item.key));
                let args = hmmsearch::arg_generator(config.threads, &config.hmm_library, &domtbl, proteins);
                run_tool(&config, HMMSEARCH_TAG, args, &item.out_path).await?;
                expect_output(HMMSEARCH_TAG, &domtbl)?;
                Ok(Payload::Single(domtbl))
            }
            .await;
            absorb("hmm_search", &item.key, result)
        }
        .boxed()
    })
}

/// Best hits per query, rolled up against both ontology tables.
pub fn parse_hmmer(config: Arc<RunConfig>, tables: Arc<OntologyTables>) -> Stage {
    Stage::new("parse_hmmer", Step::Parse, move |item: WorkItem| {
        let min_score = config.min_score;
        let tables = tables.clone();
        async move {
            let result: Result<Payload, PipelineError> = async {
                let Payload::Single(domtbl) = item.payload.clone() else {
                    return Err(PipelineError::InvalidInput(format!("{} is not a search table", item.payload)));
                };
                let rollup = item.out_path.join(ROLLUP_FILE);
                let target = rollup.clone();
                let ids = blocking("parse_hmmer", move || {
                    let best = resolve_best_hits_file(&domtbl, min_score)?;
                    let records = tables.rollup(&best);
                    write_rollup(&target, &records)?;
                    Ok(records.len())
                })
                .await?;
                debug!("{}: {} ontology ids", item.key, ids);
                Ok(Payload::Single(rollup))
            }
            .await;
            absorb("parse_hmmer", &item.key, result)
        }
        .boxed()
    })
}

/// Both hierarchies as chart levels, plus the rollup table, handed to `sink`.
pub fn create_report(sink: Arc<dyn ChartSink>) -> Stage {
    Stage::new("create_report", Step::Visualize, move |item: WorkItem| {
        let sink = sink.clone();
        async move {
            let result: Result<Payload, PipelineError> = async {
                let Payload::Single(rollup) = item.payload.clone() else {
                    return Err(PipelineError::InvalidInput(format!("{} is not a rollup file", item.payload)));
                };
                let out_dir = item.out_path.clone();
                blocking("create_report", move || {
                    let records = read_rollup(&rollup)?;
                    for scheme in [Scheme::Foam, Scheme::Kegg] {
                        let charts = chart_levels(&build_tree(&records, scheme));
                        sink.submit_charts(&out_dir, scheme, &charts)?;
                    }
                    sink.submit_table(&out_dir, &records)?;
                    Ok(())
                })
                .await?;
                Ok(Payload::Directory(item.out_path.clone()))
            }
            .await;
            absorb("create_report", &item.key, result)
        }
        .boxed()
    })
}

/// Every key's statistics as one table in `step_09-visualizeData/combined`.
pub async fn write_stats(
    config: Arc<RunConfig>,
    sink: Arc<dyn ChartSink>,
    samples: Vec<(Key, StatsSources)>,
) -> Result<PathBuf, PipelineError> {
    let out_dir = config.step_dir(Step::Visualize).join(COMBINED_DIR);
    let target = out_dir.clone();
    let min_score = config.min_score;
    blocking("write_stats", move || {
        fs::create_dir_all(&target)?;
        let samples = samples
            .iter()
            .map(|(key, sources)| collect_sample_stats(&key.to_string(), sources, min_score))
            .collect();
        sink.submit_stats(&target, &StatsTable { samples })?;
        Ok(())
    })
    .await?;
    Ok(out_dir)
}

/// Copies the declared input list into `step_01-loadFiles`.
pub fn record_inputs(config: &RunConfig, lines: &[String]) -> Result<(), PipelineError> {
    let dir = config.step_dir(Step::LoadFiles);
    fs::create_dir_all(&dir).map_err(|e| PipelineError::IOError(e.to_string()))?;
    fs::write(dir.join("inputs.tsv"), lines.join("\n") + "\n").map_err(|e| PipelineError::IOError(e.to_string()))
}
