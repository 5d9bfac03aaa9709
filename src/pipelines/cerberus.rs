// Coordinator: classifies inputs and walks every key through the nine steps
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};
use log::{debug, info, warn};
use tokio::task::JoinHandle;

use crate::config::defs::{Origin, PipelineError, RunConfig, Step, STDERR_LOG};
use crate::pipelines::stages::{
    check_quality, create_report, decon_reads, find_orf, hmm_search, parse_hmmer, record_inputs,
    reformat, remove_n, trim_reads, write_stats,
};
use crate::utils::dispatch::{dispatch, DispatchContext, Stage};
use crate::utils::file::{find_mate, sequence_kind, sequence_stem, R1R2Result, SequenceKind};
use crate::utils::report::{ChartSink, TsvReportWriter};
use crate::utils::rollup::OntologyTables;
use crate::utils::stats::StatsSources;
use crate::utils::work::{merge, sorted_keys, Key, Payload, StageResult};

/// Keyed inputs split by the stage they enter at.
#[derive(Debug, Default)]
pub struct Intake {
    pub reads: StageResult,
    pub contigs: StageResult,
    pub proteins: StageResult,
    /// `key<TAB>kind<TAB>payload` per accepted input, in classification order.
    pub manifest: Vec<String>,
}

impl Intake {
    pub fn is_empty(&self) -> bool {
        self.reads.is_empty() && self.contigs.is_empty() && self.proteins.is_empty()
    }

    fn contains(&self, key: &Key) -> bool {
        self.reads.contains_key(key) || self.contigs.contains_key(key) || self.proteins.contains_key(key)
    }

    fn insert(&mut self, kind: SequenceKind, key: Key, payload: Payload) {
        self.manifest.push(format!("{}\t{:?}\t{}", key, kind, payload));
        let target = match kind {
            SequenceKind::Reads => &mut self.reads,
            SequenceKind::Contigs => &mut self.contigs,
            SequenceKind::Protein => &mut self.proteins,
        };
        target.insert(key, payload);
    }
}

/// Directories expand to the sequence files they directly contain, sorted by name.
fn expand_input(origin: Origin, path: &Path) -> Vec<(Origin, PathBuf)> {
    if path.is_file() {
        return vec![(origin, path.to_path_buf())];
    }
    if !path.is_dir() {
        warn!("{} does not exist, skipping", path.display());
        return Vec::new();
    }
    let mut files: Vec<PathBuf> = match fs::read_dir(path) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && sequence_kind(p).is_some())
            .collect(),
        Err(e) => {
            warn!("Cannot read directory {}: {}", path.display(), e);
            return Vec::new();
        }
    };
    files.sort();
    files.into_iter().map(|p| (origin, p)).collect()
}

/// Assigns every usable input a key and an entry stage.
///
/// FASTQ files whose R2 mate is also given become one `Paired` payload keyed by
/// the shared prefix. Unusable inputs are skipped with a warning, as are inputs
/// whose key is already taken.
pub fn classify_inputs(inputs: &[(Origin, PathBuf)]) -> Intake {
    let files: Vec<(Origin, PathBuf)> = inputs
        .iter()
        .flat_map(|(origin, path)| expand_input(*origin, path))
        .collect();
    let given: HashSet<&Path> = files.iter().map(|(_, p)| p.as_path()).collect();

    let mut pairs: HashMap<PathBuf, R1R2Result> = HashMap::default();
    let mut mates: HashSet<PathBuf> = HashSet::default();
    for (_, path) in &files {
        if sequence_kind(path) != Some(SequenceKind::Reads) || mates.contains(path) {
            continue;
        }
        if let Some(pair) = find_mate(path, |mate| {
            mate != path.as_path() && given.contains(mate) && !pairs.contains_key(mate)
        }) {
            mates.insert(pair.r2_path.clone());
            pairs.insert(path.clone(), pair);
        }
    }

    let mut intake = Intake::default();
    for (origin, path) in &files {
        if mates.contains(path) {
            continue;
        }
        let Some(kind) = sequence_kind(path) else {
            warn!("{} is not a recognised sequence file, skipping", path.display());
            continue;
        };
        let (name, payload) = match pairs.remove(path) {
            Some(pair) => (pair.prefix, Payload::Paired(path.clone(), pair.r2_path)),
            None => (sequence_stem(path), Payload::Single(path.clone())),
        };
        let key = Key::new(*origin, name);
        if intake.contains(&key) {
            warn!("Duplicate sample {} from {}, skipping", key, path.display());
            continue;
        }
        intake.insert(kind, key, payload);
    }
    intake
}

/// Keys that entered a stage but produced nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct StageDrops {
    pub stage: &'static str,
    pub keys: Vec<Key>,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub dropped: Vec<StageDrops>,
    /// Keys that reached the report step.
    pub completed: Vec<Key>,
}

impl RunSummary {
    fn record(&mut self, stage: &Stage, entered: Vec<Key>, output: &StageResult) {
        let keys: Vec<Key> = entered.into_iter().filter(|k| !output.contains_key(k)).collect();
        if keys.is_empty() {
            return;
        }
        let names: Vec<String> = keys.iter().map(Key::to_string).collect();
        warn!("{}: no result for {}", stage.name, names.join(", "));
        self.dropped.push(StageDrops { stage: stage.name, keys });
    }

    pub fn dropped_count(&self) -> usize {
        self.dropped.iter().map(|d| d.keys.len()).sum()
    }
}

fn entered(inputs: &StageResult) -> Vec<Key> {
    sorted_keys(inputs).into_iter().cloned().collect()
}

async fn run_stage(stage: &Stage, inputs: StageResult, ctx: &DispatchContext, summary: &mut RunSummary) -> StageResult {
    if inputs.is_empty() {
        return StageResult::default();
    }
    let keys = entered(&inputs);
    let output = dispatch(stage, inputs, ctx).await;
    summary.record(stage, keys, &output);
    output
}

/// Diagnostic dispatch whose results nothing downstream consumes.
fn spawn_side_branch(stage: Stage, inputs: StageResult, ctx: &DispatchContext) -> (Stage, Vec<Key>, JoinHandle<StageResult>) {
    let keys = entered(&inputs);
    let ctx = ctx.clone();
    let task_stage = stage.clone();
    let handle = tokio::spawn(async move { dispatch(&task_stage, inputs, &ctx).await });
    (stage, keys, handle)
}

fn single_path(result: &StageResult, key: &Key) -> Option<PathBuf> {
    match result.get(key) {
        Some(Payload::Single(path)) => Some(path.clone()),
        _ => None,
    }
}

/// Statistics sources for every key that reached the format or search step.
fn stats_sources(
    config: &RunConfig,
    nucleotides: &StageResult,
    searchable: &StageResult,
    hits: &StageResult,
    rollups: &StageResult,
) -> Vec<(Key, StatsSources)> {
    let mut keys: Vec<Key> = merge(nucleotides.clone(), searchable.clone()).into_keys().collect();
    keys.sort();
    keys.into_iter()
        .map(|key| {
            let step_log = |step: Step| {
                Some(config.step_dir(step).join(key.to_string()).join(STDERR_LOG)).filter(|p| p.exists())
            };
            let sources = StatsSources {
                trim_log: step_log(Step::Trim),
                decon_log: step_log(Step::Decontaminate),
                nucleotides: single_path(nucleotides, &key),
                proteins: single_path(searchable, &key),
                search_table: single_path(hits, &key),
                rollup: single_path(rollups, &key),
            };
            (key, sources)
        })
        .collect()
}

pub async fn run(config: Arc<RunConfig>) -> Result<RunSummary, PipelineError> {
    run_with_sink(config, Arc::new(TsvReportWriter)).await
}

/// Runs the whole pipeline, handing chart data to `sink`.
///
/// Only configuration problems and missing reference tables are errors. Any
/// per-key failure just removes that key from later steps and is listed in the
/// returned summary.
pub async fn run_with_sink(config: Arc<RunConfig>, sink: Arc<dyn ChartSink>) -> Result<RunSummary, PipelineError> {
    let start = Instant::now();

    let intake = classify_inputs(&config.inputs);
    if intake.is_empty() {
        return Err(PipelineError::InvalidInput("no usable sequence files were given".to_string()));
    }
    info!(
        "Loaded {} read, {} contig and {} protein samples",
        intake.reads.len(),
        intake.contigs.len(),
        intake.proteins.len()
    );

    let tables = Arc::new(OntologyTables::load(&config.foam_table(), &config.kegg_table())?);

    let ctx = DispatchContext::new(&config)
        .await
        .map_err(|e| PipelineError::IOError(e.to_string()))?;
    record_inputs(&config, &intake.manifest)?;

    let Intake { reads, contigs, proteins, .. } = intake;
    let mut summary = RunSummary::default();
    let mut side_branches = Vec::new();

    if !reads.is_empty() {
        side_branches.push(spawn_side_branch(check_quality(config.clone(), Step::Qc), reads.clone(), &ctx));
    }

    let trimmed = run_stage(&trim_reads(config.clone()), reads, &ctx, &mut summary).await;
    if !trimmed.is_empty() {
        side_branches.push(spawn_side_branch(check_quality(config.clone(), Step::Trim), trimmed.clone(), &ctx));
    }
    let decontaminated = run_stage(&decon_reads(config.clone()), trimmed, &ctx, &mut summary).await;

    // Both format branches share one barrier.
    let remove_n_stage = remove_n(config.clone());
    let reformat_stage = reformat(config.clone());
    let (contig_keys, read_keys) = (entered(&contigs), entered(&decontaminated));
    let (cleaned, fasta) = tokio::join!(
        dispatch(&remove_n_stage, contigs, &ctx),
        dispatch(&reformat_stage, decontaminated, &ctx)
    );
    summary.record(&remove_n_stage, contig_keys, &cleaned);
    summary.record(&reformat_stage, read_keys, &fasta);

    let nucleotides = merge(cleaned, fasta);
    let translated = run_stage(&find_orf(config.clone()), nucleotides.clone(), &ctx, &mut summary).await;
    let searchable = merge(translated, proteins);
    let hits = run_stage(&hmm_search(config.clone()), searchable.clone(), &ctx, &mut summary).await;
    let rollups = run_stage(&parse_hmmer(config.clone(), tables), hits.clone(), &ctx, &mut summary).await;
    let reports = run_stage(&create_report(sink.clone()), rollups.clone(), &ctx, &mut summary).await;

    for (stage, keys, handle) in side_branches {
        match handle.await {
            Ok(output) => summary.record(&stage, keys, &output),
            Err(e) => warn!("{} side branch aborted: {}", stage.name, e),
        }
    }

    let samples = stats_sources(&config, &nucleotides, &searchable, &hits, &rollups);
    match write_stats(config.clone(), sink, samples).await {
        Ok(dir) => debug!("Statistics written to {}", dir.display()),
        Err(e) => warn!("Statistics not written: {}", e),
    }

    summary.completed = entered(&reports);
    debug!("Completed keys: {:?}", summary.completed.iter().map(Key::to_string).collect::<Vec<_>>());
    info!(
        "Finished {} samples ({} dropped along the way) in {:.2} seconds",
        summary.completed.len(),
        summary.dropped_count(),
        start.elapsed().as_secs_f64()
    );
    Ok(summary)
}
