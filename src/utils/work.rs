// Keyed work items shared by every pipeline stage
use std::fmt;
use std::path::{Path, PathBuf};

use fxhash::FxHashMap as HashMap;

use crate::config::defs::Origin;

/// Stable sample identifier. The origin is decided once, at classification time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    pub origin: Origin,
    pub name: String,
}

impl Key {
    pub fn new(origin: Origin, name: impl Into<String>) -> Self {
        Key { origin, name: name.into() }
    }
}

/// Renders as `<origin>_<name>`, which is also the per-key directory name.
impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.origin.prefix(), self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Single(PathBuf),
    Paired(PathBuf, PathBuf),
    Directory(PathBuf),
}

impl Payload {
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            Payload::Single(p) | Payload::Directory(p) => vec![p.as_path()],
            Payload::Paired(r1, r2) => vec![r1.as_path(), r2.as_path()],
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Single(p) => write!(f, "{}", p.display()),
            Payload::Paired(r1, r2) => write!(f, "({}, {})", r1.display(), r2.display()),
            Payload::Directory(p) => write!(f, "{}/", p.display()),
        }
    }
}

/// One unit of dispatched work. Consumed by exactly one worker.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub key: Key,
    pub payload: Payload,
    pub out_path: PathBuf,
}

/// Keyed stage output. Keys whose stage function failed are simply absent.
pub type StageResult = HashMap<Key, Payload>;

/// Union of two keyed results; entries of `other` win on collision.
pub fn merge(mut base: StageResult, other: StageResult) -> StageResult {
    base.extend(other);
    base
}

pub fn sorted_keys(result: &StageResult) -> Vec<&Key> {
    let mut keys: Vec<&Key> = result.keys().collect();
    keys.sort();
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display_carries_origin() {
        assert_eq!(Key::new(Origin::Microbial, "soil").to_string(), "mic_soil");
        assert_eq!(Key::new(Origin::Eukaryote, "algae").to_string(), "euk_algae");
    }

    #[test]
    fn test_merge_prefers_other() {
        let key = Key::new(Origin::Microbial, "a");
        let mut base = StageResult::default();
        base.insert(key.clone(), Payload::Single(PathBuf::from("old")));
        let mut other = StageResult::default();
        other.insert(key.clone(), Payload::Single(PathBuf::from("new")));
        other.insert(Key::new(Origin::Eukaryote, "b"), Payload::Directory(PathBuf::from("d")));

        let merged = merge(base, other);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[&key], Payload::Single(PathBuf::from("new")));
    }
}
