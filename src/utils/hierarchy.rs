// Rollup artifact reader and per-scheme 4-level count trees
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::Result;
use fxhash::FxHashMap as HashMap;

use crate::utils::rollup::RollupRecord;

pub const MAX_DEPTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Foam,
    Kegg,
}

impl Scheme {
    pub fn name(&self) -> &'static str {
        match self {
            Scheme::Foam => "FOAM",
            Scheme::Kegg => "KEGG",
        }
    }

    pub fn labels<'a>(&self, record: &'a RollupRecord) -> &'a [String] {
        match self {
            Scheme::Foam => &record.foam,
            Scheme::Kegg => &record.kegg,
        }
    }
}

/// Parses a `['A','B']` style list. Accepts either quote character, optional
/// spaces around separators and backslash escapes inside a label.
pub fn parse_label_list(text: &str) -> Option<Vec<String>> {
    let inner = text.trim().strip_prefix('[')?.strip_suffix(']')?;
    let mut labels = Vec::new();
    let mut chars = inner.chars().peekable();
    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let Some(quote) = chars.next() else {
            break;
        };
        if quote != '\'' && quote != '"' {
            return None;
        }
        let mut label = String::new();
        loop {
            match chars.next()? {
                '\\' => label.push(chars.next()?),
                c if c == quote => break,
                c => label.push(c),
            }
        }
        labels.push(label);
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        match chars.next() {
            None => break,
            Some(',') => continue,
            Some(_) => return None,
        }
    }
    Some(labels)
}

/// Inverse of `RollupRecord::to_line`. `None` for malformed lines.
pub fn parse_rollup_line(line: &str) -> Option<RollupRecord> {
    let mut fields = line.split('\t');
    let id = fields.next()?.to_string();
    let count = fields.next()?.trim().parse().ok()?;
    let foam = parse_label_list(fields.next()?)?;
    let kegg = parse_label_list(fields.next()?)?;
    if id.is_empty() {
        return None;
    }
    Some(RollupRecord { id, count, foam, kegg })
}

pub fn read_rollup(path: &Path) -> Result<Vec<RollupRecord>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for line in reader.lines() {
        if let Some(record) = parse_rollup_line(&line?) {
            records.push(record);
        }
    }
    Ok(records)
}

/// Labels a row contributes, in order, stopping at the first empty label.
fn row_labels(labels: &[String]) -> impl Iterator<Item = &String> {
    labels.iter().take_while(|name| !name.is_empty())
}

/// Occurrence index keyed by label name, regardless of level.
///
/// The first row naming a label seeds it with that row's count; every later row
/// naming it adds one. A name repeated inside one row counts once.
pub fn label_index(records: &[RollupRecord], scheme: Scheme) -> HashMap<String, u64> {
    let mut index: HashMap<String, u64> = HashMap::default();
    for record in records {
        let mut seen: Vec<&str> = Vec::new();
        for name in row_labels(scheme.labels(record)) {
            if seen.contains(&name.as_str()) {
                continue;
            }
            seen.push(name);
            index
                .entry(name.clone())
                .and_modify(|count| *count += 1)
                .or_insert(record.count);
        }
    }
    index
}

#[derive(Debug, Clone, PartialEq)]
pub struct HierarchyNode {
    pub name: String,
    pub count: u64,
    pub children: Vec<HierarchyNode>,
    // child name -> position in `children`
    positions: HashMap<String, usize>,
}

impl HierarchyNode {
    pub fn new(name: &str, count: u64) -> Self {
        HierarchyNode {
            name: name.to_string(),
            count,
            children: Vec::new(),
            positions: HashMap::default(),
        }
    }

    fn child_mut(&mut self, name: &str, index: &HashMap<String, u64>) -> &mut HierarchyNode {
        let pos = match self.positions.get(name) {
            Some(&pos) => pos,
            None => {
                let count = index.get(name).copied().unwrap_or(0);
                self.children.push(HierarchyNode::new(name, count));
                let pos = self.children.len() - 1;
                self.positions.insert(name.to_string(), pos);
                pos
            }
        };
        &mut self.children[pos]
    }
}

/// Builds the tree for one scheme. The returned root is unnamed; its children
/// are the level-1 labels in first-seen order.
///
/// Labels past the third all sit at level 4, as siblings under the row's
/// level-3 node.
pub fn build_tree(records: &[RollupRecord], scheme: Scheme) -> HierarchyNode {
    let index = label_index(records, scheme);
    let mut root = HierarchyNode::new("", 0);
    for record in records {
        let labels: Vec<&String> = row_labels(scheme.labels(record)).collect();
        let mut node = &mut root;
        for name in labels.iter().take(MAX_DEPTH - 1) {
            node = node.child_mut(name, &index);
        }
        for name in labels.iter().skip(MAX_DEPTH - 1) {
            node.child_mut(name, &index);
        }
    }
    root
}

/// One bar chart handed to the reporting side.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartLevel {
    pub title: String,
    pub labels: Vec<String>,
    pub values: Vec<u64>,
}

fn push_levels(node: &HierarchyNode, title: String, depth: usize, charts: &mut Vec<ChartLevel>) {
    if node.children.is_empty() {
        return;
    }
    charts.push(ChartLevel {
        title,
        labels: node.children.iter().map(|c| c.name.clone()).collect(),
        values: node.children.iter().map(|c| c.count).collect(),
    });
    for child in &node.children {
        push_levels(child, format!("Level {}: {}", depth + 1, child.name), depth + 1, charts);
    }
}

/// Flattens a tree into charts: `Level 1` for the roots, then `Level N: <parent>`
/// for every node with children.
pub fn chart_levels(root: &HierarchyNode) -> Vec<ChartLevel> {
    let mut charts = Vec::new();
    push_levels(root, "Level 1".to_string(), 1, &mut charts);
    charts
}
