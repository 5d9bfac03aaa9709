// Ontology rollup: best hits -> per-id counts joined against FOAM and KEGG tables
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::Result;
use fxhash::FxHashMap as HashMap;
use log::info;

use crate::config::defs::{PipelineError, MISSING_LABEL};
use crate::utils::hmmer::BestHits;

#[derive(Debug, Clone, PartialEq)]
pub struct RollupRecord {
    pub id: String,
    pub count: u64,
    pub foam: Vec<String>,
    pub kegg: Vec<String>,
}

impl RollupRecord {
    /// `id<TAB>count<TAB>[foam]<TAB>[kegg]`
    pub fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}",
            self.id,
            self.count,
            format_label_list(&self.foam),
            format_label_list(&self.kegg)
        )
    }
}

fn quote_label(label: &str) -> String {
    if label.contains('\'') && !label.contains('"') {
        return format!("\"{}\"", label.replace('\\', "\\\\"));
    }
    format!("'{}'", label.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Renders labels as `['A','B']`. Labels holding a single quote switch to double quotes.
pub fn format_label_list(labels: &[String]) -> String {
    let quoted: Vec<String> = labels.iter().map(|l| quote_label(l)).collect();
    format!("[{}]", quoted.join(","))
}

pub fn placeholder() -> Vec<String> {
    vec![MISSING_LABEL.to_string()]
}

/// The two static reference tables, loaded once and shared read-only.
#[derive(Debug, Default)]
pub struct OntologyTables {
    pub foam: HashMap<String, Vec<String>>,
    pub kegg: HashMap<String, Vec<String>>,
}

impl OntologyTables {
    /// Loads both tables. Either one missing or unreadable is fatal.
    pub fn load(foam_path: &Path, kegg_path: &Path) -> Result<Self, PipelineError> {
        let read = |path: &Path| {
            fs::read_to_string(path).map_err(|_| PipelineError::MissingReference(path.to_path_buf()))
        };
        let foam = parse_foam_table(&read(foam_path)?);
        let kegg = parse_kegg_table(&read(kegg_path)?);
        info!(
            "Loaded {} FOAM and {} KEGG ontology entries",
            foam.len(),
            kegg.len()
        );
        Ok(OntologyTables { foam, kegg })
    }

    /// Counts each id once per best-hit line that carries it and emits one
    /// record per id, sorted ascending by id.
    pub fn rollup(&self, hits: &BestHits) -> Vec<RollupRecord> {
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for hit in hits.values() {
            for id in hit.ontology_ids() {
                *counts.entry(id).or_insert(0) += 1;
            }
        }
        counts
            .into_iter()
            .map(|(id, count)| RollupRecord {
                foam: self.foam.get(&id).cloned().unwrap_or_else(placeholder),
                kegg: self.kegg.get(&id).cloned().unwrap_or_else(placeholder),
                id,
                count,
            })
            .collect()
    }
}

/// Table A: header row, then `L1 L2 L3 L4 ID ...`. Later rows win on duplicate ids.
pub fn parse_foam_table(text: &str) -> HashMap<String, Vec<String>> {
    let mut table = HashMap::default();
    for line in text.lines().skip(1) {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 5 || fields[4].is_empty() {
            continue;
        }
        let labels = fields[..4].iter().map(|s| s.to_string()).collect();
        table.insert(fields[4].to_string(), labels);
    }
    table
}

/// Table B: an indented tree flattened into rows.
///
/// A non-blank first column opens a tier-1 label, a non-blank second column a
/// tier-2 label and a non-blank third column a pathway (named by the fourth
/// column). Rows with the three leading columns blank are leaves: id in the
/// fourth column, description fields after it. Leaves inherit the most recent
/// tier-1/tier-2/pathway; leaves before any of them are skipped.
pub fn parse_kegg_table(text: &str) -> HashMap<String, Vec<String>> {
    let mut table = HashMap::default();
    let mut tier_1: Option<String> = None;
    let mut tier_2: Option<String> = None;
    let mut pathway: Option<String> = None;

    for line in text.lines() {
        let fields: Vec<&str> = line.split('\t').collect();
        let col = |i: usize| fields.get(i).copied().unwrap_or("");
        if !col(0).is_empty() {
            tier_1 = Some(col(0).to_string());
            continue;
        }
        if !col(1).is_empty() {
            tier_2 = Some(col(1).to_string());
            continue;
        }
        if !col(2).is_empty() {
            pathway = Some(col(3).to_string());
            continue;
        }
        let id = col(3);
        if id.is_empty() {
            continue;
        }
        let (Some(t1), Some(t2), Some(p)) = (&tier_1, &tier_2, &pathway) else {
            continue;
        };
        let mut labels = vec![t1.clone(), t2.clone(), p.clone()];
        labels.extend(fields.iter().skip(4).map(|s| s.to_string()));
        table.insert(id.to_string(), labels);
    }
    table
}

pub fn write_rollup(path: &Path, records: &[RollupRecord]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for record in records {
        writeln!(writer, "{}", record.to_line())?;
    }
    writer.flush()?;
    Ok(())
}
