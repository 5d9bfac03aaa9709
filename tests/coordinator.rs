#![cfg(unix)]

use anyhow::Result;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cerberus_pipelines::config::defs::{
    Origin, RunConfig, BBDUK_TAG, COMBINED_DIR, FASTP_TAG, FASTQC_TAG, FGS_TAG, FOAM_ONTOLOGY, HMMSEARCH_TAG,
    KEGG_CLASSIFICATION, PRODIGAL_TAG,
};
use cerberus_pipelines::pipelines::cerberus::run_with_sink;
use cerberus_pipelines::utils::report::TsvReportWriter;
use cerberus_pipelines::utils::work::Key;

const FASTQC: &str = r#"#!/bin/sh
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2;;
    -t) shift 2;;
    *) echo "$1" >> "@LOG@"; touch "$out/$(basename "$1")_fastqc.html"; shift;;
  esac
done
"#;

const FASTP: &str = r#"#!/bin/sh
while [ $# -gt 0 ]; do
  case "$1" in -i) in1="$2";; -o) out1="$2";; esac
  shift
done
cp "$in1" "$out1"
printf 'Filtering result:\nreads passed filter: 2\nreads failed due to low quality: 0\n' >&2
"#;

const BBDUK: &str = r#"#!/bin/sh
for arg in "$@"; do
  case "$arg" in
    in=*) input="${arg#*=}";;
    out=*) output="${arg#*=}";;
  esac
done
cp "$input" "$output"
printf 'Total Removed:\t0 reads (0.00%%) \t0 bases (0.00%%)\nResult:\t2 reads (100.00%%) \t16 bases (100.00%%)\n' >&2
"#;

const PRODIGAL: &str = r#"#!/bin/sh
while [ $# -gt 0 ]; do
  case "$1" in -i) input="$2";; -a) proteins="$2";; esac
  shift
done
echo "$input" >> "@LOG@"
printf '>p1\nMKVLA\n>p2\nMSTQ\n' > "$proteins"
"#;

const HMMSEARCH: &str = r#"#!/bin/sh
while [ $# -gt 0 ]; do
  case "$1" in --domtblout) table="$2";; esac
  last="$1"
  shift
done
echo "$last" >> "@LOG@"
printf '# target name\np1 - 300 KO:K00002_y - 250 1e-10 50.0 0.1 1 1 1e-12 1e-10 60.0 0.1 1 250 1 250 1 250 0.95 -\n' > "$table"
"#;

fn write_tool(dir: &Path, name: &str, template: &str, log: &Path) -> Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, template.replace("@LOG@", &log.to_string_lossy()))?;
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
    Ok(path)
}

fn logged(path: &Path) -> Result<Vec<String>> {
    Ok(fs::read_to_string(path)?.lines().map(str::to_string).collect())
}

fn files_under(dir: &Path, found: &mut Vec<PathBuf>) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            files_under(&path, found)?;
        } else {
            found.push(path);
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_keys_flow_through_every_stage() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let bin = dir.path().join("bin");
    fs::create_dir_all(&bin)?;
    let qc_log = dir.path().join("qc.log");
    let gene_log = dir.path().join("gene_calls.log");
    let search_log = dir.path().join("searches.log");

    fs::write(dir.path().join(FOAM_ONTOLOGY), "L1\tL2\tL3\tL4\tKO\nEnergy\tMethane\tM1\tm1\tK00002\n")?;
    fs::write(dir.path().join(KEGG_CLASSIFICATION), "Top\t\t\t\n\tMid\t\t\n\t\t1\tPath\n\t\t\tK00001\tdesc\n")?;

    let reads = dir.path().join("lake.fastq");
    fs::write(&reads, "@r1\nACGTACGT\n+\nIIIIIIII\n@r2\nGGCCAATT\n+\nIIIIIIII\n")?;
    let contigs = dir.path().join("asm.fasta");
    fs::write(&contigs, ">c1\nACGTACGTNNNNGGCCGGCC\n")?;
    let proteins = dir.path().join("genes.faa");
    fs::write(&proteins, ">g1\nMKV\n")?;
    let euk_contigs = dir.path().join("deep.fasta");
    fs::write(&euk_contigs, ">e1\nATATATATGC\n")?;

    let mut config = RunConfig::with_out_dir(&dir.path().join("run"));
    config.db_dir = dir.path().to_path_buf();
    config.workers = 2;
    config.tools.insert(FASTQC_TAG, write_tool(&bin, "fastqc", FASTQC, &qc_log)?);
    config.tools.insert(FASTP_TAG, write_tool(&bin, "fastp", FASTP, &qc_log)?);
    config.tools.insert(BBDUK_TAG, write_tool(&bin, "bbduk.sh", BBDUK, &qc_log)?);
    config.tools.insert(PRODIGAL_TAG, write_tool(&bin, "prodigal", PRODIGAL, &gene_log)?);
    config.tools.insert(HMMSEARCH_TAG, write_tool(&bin, "hmmsearch", HMMSEARCH, &search_log)?);
    config.tools.insert(FGS_TAG, bin.join("no-FGS-here"));
    config.inputs = vec![
        (Origin::Microbial, reads.clone()),
        (Origin::Microbial, contigs),
        (Origin::Microbial, proteins.clone()),
        (Origin::Eukaryote, euk_contigs),
    ];

    let summary = run_with_sink(Arc::new(config), Arc::new(TsvReportWriter)).await?;
    let run = dir.path().join("run");

    assert_eq!(
        summary.completed,
        vec![
            Key::new(Origin::Microbial, "asm"),
            Key::new(Origin::Microbial, "genes"),
            Key::new(Origin::Microbial, "lake"),
        ]
    );
    assert_eq!(summary.dropped.len(), 1);
    assert_eq!(summary.dropped[0].stage, "find_ORF");
    assert_eq!(summary.dropped[0].keys, vec![Key::new(Origin::Eukaryote, "deep")]);

    // Gene calling sees the N-cleaned contigs and the reformatted reads only.
    let mut called = logged(&gene_log)?;
    called.sort();
    assert_eq!(
        called,
        vec![
            run.join("step_05-format/mic_asm/asm_clean.fasta").to_string_lossy().to_string(),
            run.join("step_05-format/mic_lake/lake.fna").to_string_lossy().to_string(),
        ]
    );

    // Given proteins skip gene calling and join the called ones at the search.
    let searched = logged(&search_log)?;
    assert_eq!(searched.len(), 3);
    assert!(searched.contains(&proteins.to_string_lossy().to_string()));
    assert!(searched.contains(&run.join("step_06-geneCall/mic_asm/proteins.faa").to_string_lossy().to_string()));

    // Both QC branches ran and were joined before the run returned.
    let checked = logged(&qc_log)?;
    assert!(checked.contains(&reads.to_string_lossy().to_string()));
    assert!(checked.contains(&run.join("step_03-trim/mic_lake/trim_lake.fastq").to_string_lossy().to_string()));
    assert!(run.join("step_02-QC/mic_lake/lake.fastq_fastqc.html").exists());
    assert!(run.join("step_03-trim/mic_lake/quality/trim_lake.fastq_fastqc.html").exists());

    // Nothing downstream consumed a QC report.
    for line in called.iter().chain(&searched) {
        assert!(!line.contains("step_02-QC") && !line.contains("quality"), "{}", line);
    }
    let mut later = Vec::new();
    for step in ["step_04-decontaminate", "step_05-format", "step_06-geneCall", "step_07-hmmer", "step_08-parse"] {
        files_under(&run.join(step), &mut later)?;
    }
    assert!(!later.is_empty());
    assert!(later.iter().all(|p| !p.to_string_lossy().contains("_fastqc")));

    for key in ["mic_asm", "mic_genes", "mic_lake"] {
        assert!(run.join("step_09-visualizeData").join(key).join("FOAM_levels.tsv").exists());
    }
    assert!(!run.join("step_09-visualizeData/euk_deep").exists());

    let stats = fs::read_to_string(run.join("step_09-visualizeData").join(COMBINED_DIR).join("stats.tsv"))?;
    let header: Vec<&str> = stats.lines().next().unwrap_or_default().split('\t').collect();
    let lake = header.iter().position(|h| *h == "mic_lake").unwrap();
    assert!(header.contains(&"euk_deep"));
    let passed: Vec<&str> = stats
        .lines()
        .find(|line| line.starts_with("trim: passed\t"))
        .unwrap()
        .split('\t')
        .collect();
    assert_eq!(passed[lake], "2");
    let removed = stats.lines().find(|line| line.starts_with("decon: reads total removed\t")).unwrap();
    assert_eq!(removed.split('\t').nth(lake), Some("0"));
    let foam_ids = stats.lines().find(|line| line.starts_with("FOAM KO Count\t")).unwrap();
    assert_eq!(foam_ids.split('\t').nth(lake), Some("1"));
    Ok(())
}
