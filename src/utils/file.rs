use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use fxhash::FxHashMap as HashMap;
use lazy_static::lazy_static;

use crate::config::defs::{AMINO_EXTS, FASTA_EXTS, FASTQ_EXTS, GZIP_EXT};

lazy_static! {
    static ref R1_R2_TAGS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::default();
        m.insert("R1", "R2");
        m.insert("r1", "r2");
        m.insert("1", "2");
        m.insert("FWD", "REV");
        m.insert("fwd", "rev");
        m.insert("PE1", "PE2");
        m.insert("pe1", "pe2");
        m.insert("READ1", "READ2");
        m
    };
}

/// Sequence file kinds accepted at intake. Each kind enters the pipeline at a different stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceKind {
    Reads,
    Contigs,
    Protein,
}

pub fn is_gzipped(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut buffer = [0u8; 2];
    match file.read_exact(&mut buffer) {
        Ok(()) => Ok(buffer == [0x1F, 0x8B]), // Gzip magic bytes
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Enum to hold either an uncompressed or gzipped file reader
pub enum FileReader {
    Uncompressed(BufReader<File>),
    Gzipped(MultiGzDecoder<BufReader<File>>),
}

impl Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            FileReader::Uncompressed(r) => r.read(buf),
            FileReader::Gzipped(r) => r.read(buf),
        }
    }
}

pub fn open_maybe_gzipped(path: &Path) -> io::Result<FileReader> {
    let gz = is_gzipped(path)?;
    let reader = BufReader::new(File::open(path)?);
    Ok(if gz {
        FileReader::Gzipped(MultiGzDecoder::new(reader))
    } else {
        FileReader::Uncompressed(reader)
    })
}

fn is_known_ext(ext: &str) -> bool {
    ext.eq_ignore_ascii_case(GZIP_EXT)
        || FASTQ_EXTS
            .iter()
            .chain(FASTA_EXTS)
            .chain(AMINO_EXTS)
            .any(|e| e.eq_ignore_ascii_case(ext))
}

/// Strips trailing sequence extensions, e.g. `reads.fastq.gz` -> (`reads`, [`fastq`, `gz`]).
///
/// # Arguments
///
/// * `path` - Any file path.
///
/// # Returns
/// (path without the recognised extensions, extensions in file order)
pub fn extension_remover(path: &Path) -> (PathBuf, Vec<String>) {
    let mut stem = path.to_path_buf();
    let mut extensions = Vec::new();
    while let Some(ext) = stem.extension().map(|e| e.to_string_lossy().to_string()) {
        if !is_known_ext(&ext) {
            break;
        }
        extensions.push(ext);
        stem.set_extension("");
    }
    extensions.reverse();
    (stem, extensions)
}

/// Classifies a path by its sequence extension. Checks extensions, not the body.
pub fn sequence_kind(path: &Path) -> Option<SequenceKind> {
    let (_, extensions) = extension_remover(path);
    let ext = extensions
        .iter()
        .find(|e| !e.eq_ignore_ascii_case(GZIP_EXT))?;
    let matches = |list: &[&str]| list.iter().any(|e| e.eq_ignore_ascii_case(ext));
    if matches(FASTQ_EXTS) {
        Some(SequenceKind::Reads)
    } else if matches(FASTA_EXTS) {
        Some(SequenceKind::Contigs)
    } else if matches(AMINO_EXTS) {
        Some(SequenceKind::Protein)
    } else {
        None
    }
}

/// Bare file name without sequence extensions.
pub fn sequence_stem(path: &Path) -> String {
    let (stem, _) = extension_remover(path);
    stem.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "sample".to_string())
}

#[derive(Debug, PartialEq)]
pub struct R1R2Result {
    /// Name shared by both mates, e.g. `soil` for `soil_R1.fastq.gz`.
    pub prefix: String,
    /// Where the R2 mate would sit, next to the R1 file.
    pub r2_path: PathBuf,
}

/// Every reading of a read file name as an R1 mate, most specific first.
///
/// Each delimiter-separated part of the stem that is an R1 tag yields one
/// candidate. Later parts come first, so `x_1_R1` is tried as tag `R1` before
/// tag `1`.
///
/// # Arguments
///
/// * `path` - Read file, e.g. `/data/soil_R1.fastq.gz`.
///
/// # Returns
/// Candidates in preference order, empty when the name carries no R1 tag.
pub fn r1r2_candidates(path: &Path) -> Vec<R1R2Result> {
    let delimiters = ['_', '.', '-'];
    let (stem, extensions) = extension_remover(path);
    let Some(filename) = stem.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
        return Vec::new();
    };

    let mut candidates = Vec::new();
    for delimiter in delimiters {
        let sep = delimiter.to_string();
        let parts: Vec<&str> = filename.split(delimiter).collect();
        for (index, part) in parts.iter().enumerate().skip(1).rev() {
            let Some(r2_tag) = R1_R2_TAGS.get(*part) else {
                continue;
            };
            let mut mate = parts.clone();
            mate[index] = *r2_tag;
            let mut mate_name = mate.join(sep.as_str());
            for ext in &extensions {
                mate_name.push('.');
                mate_name.push_str(ext);
            }
            candidates.push(R1R2Result {
                prefix: parts[..index].join(sep.as_str()),
                r2_path: path.with_file_name(mate_name),
            });
        }
    }
    candidates
}

/// The first R1 reading whose mate satisfies `is_given`.
pub fn find_mate(path: &Path, is_given: impl Fn(&Path) -> bool) -> Option<R1R2Result> {
    r1r2_candidates(path)
        .into_iter()
        .find(|candidate| is_given(&candidate.r2_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_remover_keeps_dotted_names() {
        let (stem, exts) = extension_remover(Path::new("/data/sample.v2.fastq.gz"));
        assert_eq!(stem, PathBuf::from("/data/sample.v2"));
        assert_eq!(exts, vec!["fastq".to_string(), "gz".to_string()]);
    }

    #[test]
    fn test_sequence_kind() {
        assert_eq!(sequence_kind(Path::new("a.fq.gz")), Some(SequenceKind::Reads));
        assert_eq!(sequence_kind(Path::new("a.FNA")), Some(SequenceKind::Contigs));
        assert_eq!(sequence_kind(Path::new("a.faa")), Some(SequenceKind::Protein));
        assert_eq!(sequence_kind(Path::new("a.txt")), None);
        assert_eq!(sequence_kind(Path::new("a.gz")), None);
    }

    #[test]
    fn test_r1r2_candidates() {
        let candidates = r1r2_candidates(Path::new("/data/soil_R1.fastq.gz"));
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].prefix, "soil");
        assert_eq!(candidates[0].r2_path, PathBuf::from("/data/soil_R2.fastq.gz"));

        let candidates = r1r2_candidates(Path::new("lake.1.fq"));
        assert_eq!(candidates[0].r2_path, PathBuf::from("lake.2.fq"));
        assert!(r1r2_candidates(Path::new("/data/soil.fastq")).is_empty());
        assert!(r1r2_candidates(Path::new("/data/R1.fastq")).is_empty());
    }

    #[test]
    fn test_numeric_part_before_r1_tag() {
        let candidates = r1r2_candidates(Path::new("/data/sample_1_R1.fastq"));
        let mates: Vec<&Path> = candidates.iter().map(|c| c.r2_path.as_path()).collect();
        assert_eq!(mates, vec![Path::new("/data/sample_1_R2.fastq"), Path::new("/data/sample_2_R1.fastq")]);

        let given = PathBuf::from("/data/sample_1_R2.fastq");
        let pair = find_mate(Path::new("/data/sample_1_R1.fastq"), |p| p == given).unwrap();
        assert_eq!(pair.prefix, "sample_1");

        // Only the numeric reading has a mate on disk.
        let given = PathBuf::from("/data/sample_2_R1.fastq");
        let pair = find_mate(Path::new("/data/sample_1_R1.fastq"), |p| p == given).unwrap();
        assert_eq!(pair.prefix, "sample");
    }

    #[test]
    fn test_is_gzipped_on_short_file() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("one.fa");
        std::fs::write(&path, b">")?;
        assert!(!is_gzipped(&path)?);
        Ok(())
    }
}
