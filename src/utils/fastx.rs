use seq_io::fasta::{Reader as FastaReader, OwnedRecord as FastaOwnedRecord};
use seq_io::fastq::{Reader as FastqReader, OwnedRecord as FastqOwnedRecord};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::Result;

use crate::config::defs::FASTA_LINE_WIDTH;
use crate::utils::file::open_maybe_gzipped;

/// Defines FASTA and FASTQ as part of a unified FASTX structure.
#[derive(Clone, Debug)]
pub enum SequenceRecord {
    Fasta {
        id: String,
        desc: Option<String>,
        seq: Vec<u8>,
    },
    Fastq {
        id: String,
        desc: Option<String>,
        seq: Vec<u8>,
        qual: Vec<u8>,
    },
}

impl SequenceRecord {
    pub fn id(&self) -> &str {
        match self {
            SequenceRecord::Fasta { id, .. } => id,
            SequenceRecord::Fastq { id, .. } => id,
        }
    }

    pub fn desc(&self) -> Option<&str> {
        match self {
            SequenceRecord::Fasta { desc, .. } => desc.as_deref(),
            SequenceRecord::Fastq { desc, .. } => desc.as_deref(),
        }
    }

    pub fn seq(&self) -> &[u8] {
        match self {
            SequenceRecord::Fasta { seq, .. } => seq,
            SequenceRecord::Fastq { seq, .. } => seq,
        }
    }
}

impl From<FastaOwnedRecord> for SequenceRecord {
    fn from(record: FastaOwnedRecord) -> Self {
        let (id, desc) = parse_header(&record.head, '>');
        SequenceRecord::Fasta {
            id,
            desc,
            seq: record.seq,
        }
    }
}

impl From<FastqOwnedRecord> for SequenceRecord {
    fn from(record: FastqOwnedRecord) -> Self {
        let (id, desc) = parse_header(&record.head, '@');
        SequenceRecord::Fastq {
            id,
            desc,
            seq: record.seq,
            qual: record.qual,
        }
    }
}

/// Parses a FASTX header.
///
/// # Arguments
///
/// * `head` - Header line of a FASTX record.
/// * 'prefix' - Leading, defining character of the header. > for FASTA, @ for FASTQ.
///
/// # Returns
/// Tuple: (id, desc) split of header on whitespace.
///
fn parse_header(head: &[u8], prefix: char) -> (String, Option<String>) {
    let head_str = String::from_utf8_lossy(head).into_owned();
    let parts: Vec<&str> = head_str.splitn(2, |c: char| c.is_whitespace()).collect();
    let id = parts[0].trim_start_matches(prefix).to_string();
    let desc = parts.get(1).map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    (id, desc)
}

pub fn write_fasta_record<W: Write>(
    writer: &mut W,
    id: &str,
    desc: Option<&str>,
    seq: &[u8],
) -> io::Result<()> {
    // Write header
    writer.write_all(b">")?;
    writer.write_all(id.as_bytes())?;
    if let Some(desc) = desc {
        writer.write_all(b" ")?;
        writer.write_all(desc.as_bytes())?;
    }
    writer.write_all(b"\n")?;

    for chunk in seq.chunks(FASTA_LINE_WIDTH) {
        writer.write_all(chunk)?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}

/// Splits `seq` on runs of ambiguous bases, dropping empty pieces.
pub fn split_on_n(seq: &[u8]) -> Vec<&[u8]> {
    seq.split(|&b| b == b'N' || b == b'n')
        .filter(|piece| !piece.is_empty())
        .collect()
}

/// Writes a contig FASTA with every `N` run removed.
///
/// A sequence containing no `N` is copied through (re-wrapped). Otherwise each
/// remaining piece becomes its own record `<id>_<i>`, numbered from 1, keeping
/// the record's description.
///
/// # Arguments
///
/// * `input` - FASTA file, optionally gzipped.
/// * `output` - Cleaned FASTA to write.
///
/// # Returns
/// Number of records written.
pub fn remove_n(input: &Path, output: &Path) -> Result<u64> {
    let reader = FastaReader::new(open_maybe_gzipped(input)?);
    let mut writer = BufWriter::new(File::create(output)?);
    let mut written = 0;

    for result in reader.into_records() {
        let record: SequenceRecord = result?.into();
        let seq = record.seq();
        if !seq.iter().any(|&b| b == b'N' || b == b'n') {
            write_fasta_record(&mut writer, record.id(), record.desc(), seq)?;
            written += 1;
            continue;
        }
        for (i, piece) in split_on_n(seq).into_iter().enumerate() {
            let id = format!("{}_{}", record.id(), i + 1);
            write_fasta_record(&mut writer, &id, record.desc(), piece)?;
            written += 1;
        }
    }
    writer.flush()?;
    Ok(written)
}

/// Drops quality scores: every FASTQ record in `inputs`, in order, becomes a FASTA record.
///
/// # Arguments
///
/// * `inputs` - One FASTQ, or both mates of a pair (written R1 then R2).
/// * `output` - FASTA file to write.
///
/// # Returns
/// Number of records written.
pub fn fastq_to_fasta(inputs: &[&Path], output: &Path) -> Result<u64> {
    let mut writer = BufWriter::new(File::create(output)?);
    let mut written = 0;
    for input in inputs {
        let reader = FastqReader::new(open_maybe_gzipped(input)?);
        for result in reader.into_records() {
            let record: SequenceRecord = result?.into();
            write_fasta_record(&mut writer, record.id(), record.desc(), record.seq())?;
            written += 1;
        }
    }
    writer.flush()?;
    Ok(written)
}
