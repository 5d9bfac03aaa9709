// hmmsearch --domtblout parsing and best-hit selection
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::Result;
use fxhash::FxHashMap as HashMap;

use crate::config::defs::ONTOLOGY_TAG;

pub const QUERY_COL: usize = 0;
pub const TOKEN_COL: usize = 3;
pub const SCORE_COL: usize = 13;

/// One candidate alignment from the search-result table.
#[derive(Debug, Clone, PartialEq)]
pub struct HitLine {
    pub query: String,
    pub score: f64,
    pub fields: Vec<String>,
}

impl HitLine {
    /// `None` for comments and for lines without a numeric score column.
    pub fn parse_line(line: &str) -> Option<Self> {
        if line.starts_with('#') {
            return None;
        }
        let fields: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        let query = fields.get(QUERY_COL)?.clone();
        let score: f64 = fields.get(SCORE_COL)?.parse().ok()?;
        if score.is_nan() {
            return None;
        }
        Some(HitLine { query, score, fields })
    }

    /// Distinct ontology ids carried by the token column, in first-seen order.
    ///
    /// Tokens look like `KO:K00001_suffix`; the id is the text between the first
    /// `:` and the next `_`.
    pub fn ontology_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        let Some(column) = self.fields.get(TOKEN_COL) else {
            return ids;
        };
        for token in column.split(',') {
            if !token.contains(ONTOLOGY_TAG) {
                continue;
            }
            let id = token
                .split_once(':')
                .map(|(_, rest)| rest.split('_').next().unwrap_or(""))
                .unwrap_or("");
            if !id.is_empty() && !ids.iter().any(|seen| seen == id) {
                ids.push(id.to_string());
            }
        }
        ids
    }
}

/// One resolved line per query.
pub type BestHits = HashMap<String, HitLine>;

/// Streams a search-result table and keeps the top-scoring line per query.
///
/// Lines scoring below `min_score` are dropped. A later line replaces the kept
/// one only on a strictly greater score, so ties keep the first-seen line.
///
/// # Arguments
///
/// * `reader` - Any buffered reader over the table.
/// * `min_score` - Inclusive score threshold.
///
/// # Returns
/// BestHits keyed by query id.
pub fn resolve_best_hits<R: BufRead>(reader: R, min_score: f64) -> Result<BestHits> {
    let mut best: BestHits = HashMap::default();
    for line in reader.lines() {
        let line = line?;
        let Some(hit) = HitLine::parse_line(&line) else {
            continue;
        };
        if hit.score < min_score {
            continue;
        }
        match best.get(&hit.query) {
            Some(kept) if hit.score <= kept.score => {}
            _ => {
                best.insert(hit.query.clone(), hit);
            }
        }
    }
    Ok(best)
}

pub fn resolve_best_hits_file(path: &Path, min_score: f64) -> Result<BestHits> {
    resolve_best_hits(BufReader::new(File::open(path)?), min_score)
}
