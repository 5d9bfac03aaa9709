use std::path::{Path, PathBuf};
use lazy_static::lazy_static;
use fxhash::FxHashMap as HashMap;
use thiserror::Error;

// External software
pub const FASTQC_TAG: &str = "fastqc";
pub const FASTP_TAG: &str = "fastp";
pub const BBDUK_TAG: &str = "bbduk.sh";
pub const PRODIGAL_TAG: &str = "prodigal";
pub const FGS_TAG: &str = "FGS+";
pub const HMMSEARCH_TAG: &str = "hmmsearch";

lazy_static! {
    /// Config-file keys that override the PATH lookup of each tool.
    pub static ref TOOL_CONFIG_KEYS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::default();
        m.insert(FASTQC_TAG, "EXE_FASTQC");
        m.insert(FASTP_TAG, "EXE_FASTP");
        m.insert(BBDUK_TAG, "EXE_BBDUK");
        m.insert(PRODIGAL_TAG, "EXE_PRODIGAL");
        m.insert(FGS_TAG, "EXE_FGS+");
        m.insert(HMMSEARCH_TAG, "EXE_HMMSEARCH");
        m
    };
}

pub const ALL_TOOLS: &[&str] = &[FASTQC_TAG, FASTP_TAG, BBDUK_TAG, PRODIGAL_TAG, FGS_TAG, HMMSEARCH_TAG];

// Static Filenames
pub const TIME_LOG: &str = "time.txt";
pub const STDOUT_LOG: &str = "stdout.txt";
pub const STDERR_LOG: &str = "stderr.txt";
pub const FOAM_ONTOLOGY: &str = "FOAM-onto_rel1.tsv";
pub const KEGG_CLASSIFICATION: &str = "KO_classification.txt";
pub const FOAM_HMM: &str = "FOAM-hmm_rel1a.hmm";
pub const ROLLUP_FILE: &str = "FOAM.BH.KO.rollup";
pub const COMBINED_DIR: &str = "combined";

// Static Parameters
pub const DEFAULT_MIN_SCORE: f64 = 25.0;
pub const FASTA_LINE_WIDTH: usize = 80;
pub const ONTOLOGY_TAG: &str = "KO:";
pub const MISSING_LABEL: &str = "NA";

pub const FASTQ_EXTS: &[&str] = &["fastq", "fq"];
pub const FASTA_EXTS: &[&str] = &["fasta", "fa", "fna", "ffn"];
pub const AMINO_EXTS: &[&str] = &["faa"];
pub const GZIP_EXT: &str = "gz";

/// Output step directories, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    LoadFiles,
    Qc,
    Trim,
    Decontaminate,
    Format,
    GeneCall,
    Hmmer,
    Parse,
    Visualize,
}

impl Step {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Step::LoadFiles => "step_01-loadFiles",
            Step::Qc => "step_02-QC",
            Step::Trim => "step_03-trim",
            Step::Decontaminate => "step_04-decontaminate",
            Step::Format => "step_05-format",
            Step::GeneCall => "step_06-geneCall",
            Step::Hmmer => "step_07-hmmer",
            Step::Parse => "step_08-parse",
            Step::Visualize => "step_09-visualizeData",
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{tool} failed: {error}")]
    ToolExecution { tool: String, error: String },

    #[error("missing reference table: {0}")]
    MissingReference(PathBuf),

    #[error("I/O error: {0}")]
    IOError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Sample origin, fixed when the input is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Origin {
    Microbial,
    Eukaryote,
}

impl Origin {
    pub fn prefix(&self) -> &'static str {
        match self {
            Origin::Microbial => "mic",
            Origin::Eukaryote => "euk",
        }
    }
}

/// Resolved executable for each external tool.
#[derive(Debug, Clone, Default)]
pub struct ToolPaths {
    paths: HashMap<&'static str, PathBuf>,
}

impl ToolPaths {
    pub fn insert(&mut self, tag: &'static str, path: PathBuf) {
        self.paths.insert(tag, path);
    }

    /// Falls back to the bare tool name so a missing tool fails at spawn time, per key.
    pub fn get(&self, tag: &str) -> PathBuf {
        self.paths
            .get(tag)
            .cloned()
            .unwrap_or_else(|| PathBuf::from(tag))
    }
}

/// Immutable run configuration, built once in main and shared by every stage.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub out_dir: PathBuf,
    pub db_dir: PathBuf,
    pub hmm_library: PathBuf,
    pub decon_reference: Option<PathBuf>,
    pub tools: ToolPaths,
    pub inputs: Vec<(Origin, PathBuf)>,
    pub min_score: f64,
    pub threads: usize,
    pub workers: usize,
    pub replace: bool,
}

impl RunConfig {
    pub fn foam_table(&self) -> PathBuf {
        self.db_dir.join(FOAM_ONTOLOGY)
    }

    pub fn kegg_table(&self) -> PathBuf {
        self.db_dir.join(KEGG_CLASSIFICATION)
    }

    pub fn step_dir(&self, step: Step) -> PathBuf {
        self.out_dir.join(step.dir_name())
    }

    pub fn time_log(&self) -> PathBuf {
        self.out_dir.join(TIME_LOG)
    }

    /// Minimal config rooted at `out_dir`, for library callers and tests.
    pub fn with_out_dir(out_dir: &Path) -> Self {
        RunConfig {
            out_dir: out_dir.to_path_buf(),
            db_dir: out_dir.to_path_buf(),
            hmm_library: out_dir.join(FOAM_HMM),
            decon_reference: None,
            tools: ToolPaths::default(),
            inputs: Vec::new(),
            min_score: DEFAULT_MIN_SCORE,
            threads: 1,
            workers: 1,
            replace: false,
        }
    }
}
