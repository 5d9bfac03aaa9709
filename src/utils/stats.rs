// Per-sample statistics: sequence composition, trimming and decontamination counts
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use log::debug;
use regex::Regex;
use seq_io::fasta::Reader as FastaReader;

use crate::utils::fastx::SequenceRecord;
use crate::utils::file::open_maybe_gzipped;
use crate::utils::hierarchy::read_rollup;
use crate::utils::hmmer::resolve_best_hits_file;
use crate::utils::rollup::placeholder;

pub const N_STAT_LEVELS: [u64; 4] = [25, 50, 75, 90];

/// fastp "Filtering result" lines and the column each one fills.
const FASTP_FIELDS: [(&str, &str); 8] = [
    ("reads passed filter", "trim: passed"),
    ("reads failed due to low quality", "trim: low quality"),
    ("reads failed due to too many N", "trim: too many Ns"),
    ("reads failed due to too short", "trim: too short"),
    ("reads failed due to low complexity", "trim: low complexity"),
    ("reads with adapter trimmed", "trim: adapter trimmed"),
    ("bases trimmed due to adapters", "trim: bases: adapters"),
    ("Duplication rate", "trim: duplication rate %"),
];

const BBDUK_FIELDS: [(&str, &str); 4] = [
    ("Contaminants", "contaminants"),
    ("QTrimmed", "QTrimmed"),
    ("Total Removed", "total removed"),
    ("Result", "result"),
];

/// Length and composition summary of one FASTA file.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceStats {
    pub sequences: u64,
    pub total_length: u64,
    pub gc_count: u64,
    /// `(level, length)` for N25, N50, N75 and N90.
    pub n_stats: Vec<(u64, u64)>,
}

impl SequenceStats {
    pub fn from_lengths(mut lengths: Vec<u64>, gc_count: u64) -> Self {
        lengths.sort_unstable_by(|a, b| b.cmp(a));
        let total_length: u64 = lengths.iter().sum();
        let n_stats = N_STAT_LEVELS
            .iter()
            .map(|&level| {
                let mut covered = 0;
                let length = lengths
                    .iter()
                    .find(|&&len| {
                        covered += len;
                        covered * 100 >= total_length * level
                    })
                    .copied()
                    .unwrap_or(0);
                (level, length)
            })
            .collect();
        SequenceStats {
            sequences: lengths.len() as u64,
            total_length,
            gc_count,
            n_stats,
        }
    }

    pub fn gc_percent(&self) -> f64 {
        if self.total_length == 0 {
            return 0.0;
        }
        self.gc_count as f64 * 100.0 / self.total_length as f64
    }
}

pub fn sequence_stats(path: &Path) -> Result<SequenceStats> {
    let reader = FastaReader::new(open_maybe_gzipped(path)?);
    let mut lengths = Vec::new();
    let mut gc_count = 0;
    for result in reader.into_records() {
        let record: SequenceRecord = result?.into();
        let seq = record.seq();
        gc_count += seq.iter().filter(|&&b| matches!(b, b'G' | b'g' | b'C' | b'c')).count() as u64;
        lengths.push(seq.len() as u64);
    }
    Ok(SequenceStats::from_lengths(lengths, gc_count))
}

/// Values from the "Filtering result" block of fastp's stderr, in column order.
/// Lines fastp did not print are left out.
pub fn parse_fastp_filtering(text: &str) -> Result<Vec<(String, String)>> {
    let Some((_, block)) = text.split_once("Filtering result:") else {
        return Ok(Vec::new());
    };
    let mut values = Vec::new();
    for (line, label) in FASTP_FIELDS {
        let pattern = format!(r"(?m)^\s*{}:\s*([0-9.]+)", regex::escape(line));
        let re = Regex::new(&pattern).map_err(|e| anyhow!("Regex error: {}", e))?;
        if let Some(caps) = re.captures(block) {
            values.push((label.to_string(), caps[1].to_string()));
        }
    }
    Ok(values)
}

/// Read and base counts from the removal summary bbduk prints to stderr.
pub fn parse_bbduk_removal(text: &str) -> Result<Vec<(String, String)>> {
    let mut values = Vec::new();
    for (line, label) in BBDUK_FIELDS {
        let pattern = format!(
            r"(?m)^{}:\s*([0-9]+) reads \([0-9.%]*\)\s*([0-9]+) bases",
            regex::escape(line)
        );
        let re = Regex::new(&pattern).map_err(|e| anyhow!("Regex error: {}", e))?;
        if let Some(caps) = re.captures(text) {
            values.push((format!("decon: reads {}", label), caps[1].to_string()));
            values.push((format!("decon: bases {}", label), caps[2].to_string()));
        }
    }
    Ok(values)
}

/// Hit-derived counts for one protein set.
#[derive(Debug, Clone, PartialEq)]
pub struct ProteinStats {
    pub proteins: u64,
    pub average_length: f64,
    pub above_min_score: u64,
    pub foam_ids: u64,
    pub kegg_ids: u64,
}

/// Where one key's statistics come from. Missing sources are skipped.
#[derive(Debug, Clone, Default)]
pub struct StatsSources {
    pub trim_log: Option<PathBuf>,
    pub decon_log: Option<PathBuf>,
    pub nucleotides: Option<PathBuf>,
    pub proteins: Option<PathBuf>,
    pub search_table: Option<PathBuf>,
    pub rollup: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleStats {
    pub key: String,
    pub values: Vec<(String, String)>,
}

impl SampleStats {
    pub fn new(key: impl Into<String>) -> Self {
        SampleStats { key: key.into(), values: Vec::new() }
    }

    pub fn push(&mut self, label: impl Into<String>, value: impl ToString) {
        self.values.push((label.into(), value.to_string()));
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v.as_str())
    }

    fn add_sequence_stats(&mut self, stats: &SequenceStats) {
        self.push("Sequence count", stats.sequences);
        self.push("Total length", stats.total_length);
        self.push("GC count", stats.gc_count);
        self.push("GC %", format!("{:.2}", stats.gc_percent()));
        for (level, length) in &stats.n_stats {
            self.push(format!("N{}", level), length);
        }
    }

    fn add_protein_stats(&mut self, stats: &ProteinStats) {
        self.push("Total Protein Count", stats.proteins);
        self.push("Average Protein Length", format!("{:.2}", stats.average_length));
        self.push("Proteins Above Min Score", stats.above_min_score);
        self.push("FOAM KO Count", stats.foam_ids);
        self.push("KEGG KO Count", stats.kegg_ids);
    }
}

fn protein_stats(sources: &StatsSources, min_score: f64) -> Result<Option<ProteinStats>> {
    let Some(proteins) = &sources.proteins else {
        return Ok(None);
    };
    let sequences = sequence_stats(proteins)?;
    let average_length = if sequences.sequences == 0 {
        0.0
    } else {
        sequences.total_length as f64 / sequences.sequences as f64
    };
    let above_min_score = match &sources.search_table {
        Some(table) => resolve_best_hits_file(table, min_score)?.len() as u64,
        None => 0,
    };
    let (mut foam_ids, mut kegg_ids) = (0, 0);
    if let Some(rollup) = &sources.rollup {
        let missing = placeholder();
        for record in read_rollup(rollup)? {
            foam_ids += u64::from(record.foam != missing);
            kegg_ids += u64::from(record.kegg != missing);
        }
    }
    Ok(Some(ProteinStats {
        proteins: sequences.sequences,
        average_length,
        above_min_score,
        foam_ids,
        kegg_ids,
    }))
}

fn read_log(path: &Option<PathBuf>) -> Option<String> {
    let path = path.as_ref()?;
    match fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(e) => {
            debug!("No log at {}: {}", path.display(), e);
            None
        }
    }
}

/// Everything known about one key. A source that cannot be read only leaves
/// its columns out.
pub fn collect_sample_stats(key: &str, sources: &StatsSources, min_score: f64) -> SampleStats {
    let mut sample = SampleStats::new(key);

    if let Some(text) = read_log(&sources.trim_log) {
        match parse_fastp_filtering(&text) {
            Ok(values) => sample.values.extend(values),
            Err(e) => debug!("{}: trim stats unavailable: {}", key, e),
        }
    }
    if let Some(text) = read_log(&sources.decon_log) {
        match parse_bbduk_removal(&text) {
            Ok(values) => sample.values.extend(values),
            Err(e) => debug!("{}: decontamination stats unavailable: {}", key, e),
        }
    }
    if let Some(path) = &sources.nucleotides {
        match sequence_stats(path) {
            Ok(stats) => sample.add_sequence_stats(&stats),
            Err(e) => debug!("{}: cannot read {}: {}", key, path.display(), e),
        }
    }
    match protein_stats(sources, min_score) {
        Ok(Some(stats)) => sample.add_protein_stats(&stats),
        Ok(None) => {}
        Err(e) => debug!("{}: protein stats unavailable: {}", key, e),
    }
    sample
}

/// Combined table: one row per statistic, one column per sample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsTable {
    pub samples: Vec<SampleStats>,
}

impl StatsTable {
    /// Every statistic any sample has, in first-seen order.
    pub fn labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = Vec::new();
        for sample in &self.samples {
            for (label, _) in &sample.values {
                if !labels.contains(&label.as_str()) {
                    labels.push(label);
                }
            }
        }
        labels
    }

    pub fn to_tsv(&self) -> String {
        let mut out = String::from("statistic");
        for sample in &self.samples {
            out.push('\t');
            out.push_str(&sample.key);
        }
        out.push('\n');
        for label in self.labels() {
            out.push_str(label);
            for sample in &self.samples {
                out.push('\t');
                out.push_str(sample.get(label).unwrap_or(""));
            }
            out.push('\n');
        }
        out
    }
}
