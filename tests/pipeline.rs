use anyhow::Result;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use cerberus_pipelines::config::defs::{
    Origin, PipelineError, RunConfig, Step, FOAM_ONTOLOGY, HMMSEARCH_TAG, KEGG_CLASSIFICATION, ROLLUP_FILE, TIME_LOG,
};
use cerberus_pipelines::pipelines::cerberus::run_with_sink;
use cerberus_pipelines::pipelines::stages::{create_report, parse_hmmer};
use cerberus_pipelines::utils::dispatch::{dispatch, DispatchContext};
use cerberus_pipelines::utils::hierarchy::Scheme;
use cerberus_pipelines::utils::report::TsvReportWriter;
use cerberus_pipelines::utils::rollup::OntologyTables;
use cerberus_pipelines::utils::work::{Key, Payload, StageResult};


fn write_tables(db_dir: &Path) -> Result<()> {
    fs::write(db_dir.join(FOAM_ONTOLOGY), "L1\tL2\tL3\tL4\tKO\nA\tB\tC\tD\tK00002\n")?;
    fs::write(db_dir.join(KEGG_CLASSIFICATION), "Top\t\t\t\n\tMid\t\t\n\t\t1\tPath\n\t\t\tK00001\tdesc\n")?;
    Ok(())
}


#[tokio::test]
async fn test_missing_search_tool_drops_keys_but_run_succeeds() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_tables(dir.path())?;
    let proteins = dir.path().join("genes.faa");
    fs::write(&proteins, ">p1\nMKV\n")?;

    let mut config = RunConfig::with_out_dir(&dir.path().join("run"));
    config.db_dir = dir.path().to_path_buf();
    config.tools.insert(HMMSEARCH_TAG, dir.path().join("no-hmmsearch-here"));
    config.inputs = vec![
        (Origin::Microbial, proteins.clone()),
        (Origin::Eukaryote, proteins),
    ];

    let summary = run_with_sink(Arc::new(config), Arc::new(TsvReportWriter)).await?;
    assert!(summary.completed.is_empty());
    assert_eq!(summary.dropped.len(), 1);
    assert_eq!(summary.dropped[0].stage, "hmm_search");
    assert_eq!(summary.dropped[0].keys.len(), 2);

    let run = dir.path().join("run");
    let manifest = fs::read_to_string(run.join(Step::LoadFiles.dir_name()).join("inputs.tsv"))?;
    assert_eq!(manifest.lines().count(), 2);
    assert!(run.join("step_07-hmmer/mic_genes/stderr.txt").exists());
    assert_eq!(fs::read_to_string(run.join(TIME_LOG))?.lines().count(), 2);
    Ok(())
}


#[tokio::test]
async fn test_missing_reference_aborts() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let proteins = dir.path().join("genes.faa");
    fs::write(&proteins, ">p1\nMKV\n")?;

    let mut config = RunConfig::with_out_dir(dir.path());
    config.inputs = vec![(Origin::Microbial, proteins)];
    let result = run_with_sink(Arc::new(config), Arc::new(TsvReportWriter)).await;
    assert!(matches!(result, Err(PipelineError::MissingReference(_))));
    Ok(())
}


#[tokio::test]
async fn test_no_usable_inputs_is_an_error() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_tables(dir.path())?;
    let mut config = RunConfig::with_out_dir(dir.path());
    config.inputs = vec![(Origin::Microbial, dir.path().join("absent.fastq"))];
    let result = run_with_sink(Arc::new(config), Arc::new(TsvReportWriter)).await;
    assert!(matches!(result, Err(PipelineError::InvalidInput(_))));
    Ok(())
}


#[tokio::test]
async fn test_parse_and_report_stages() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_tables(dir.path())?;
    let config = Arc::new(RunConfig::with_out_dir(dir.path()));
    let tables = Arc::new(OntologyTables::load(&config.foam_table(), &config.kegg_table())?);
    let ctx = DispatchContext::new(&config).await?;

    let domtbl = dir.path().join("hits.tbl");
    let row = |q: &str, tok: &str, score: u32| format!("{} - 1 {} - 1 0 0 0 1 1 0 0 {} 0\n", q, tok, score);
    fs::write(&domtbl, row("Q1", "KO:K00002_y", 30) + &row("Q2", "KO:K00002_y", 60) + &row("Q3", "KO:K00001_z", 26))?;

    let key = Key::new(Origin::Microbial, "lake");
    let mut inputs = StageResult::default();
    inputs.insert(key.clone(), Payload::Single(domtbl));

    let rollups = dispatch(&parse_hmmer(config.clone(), tables), inputs, &ctx).await;
    let rollup_path = dir.path().join("step_08-parse/mic_lake").join(ROLLUP_FILE);
    assert_eq!(rollups[&key], Payload::Single(rollup_path.clone()));
    assert_eq!(
        fs::read_to_string(&rollup_path)?,
        "K00001\t1\t['NA']\t['Top','Mid','Path','desc']\nK00002\t2\t['A','B','C','D']\t['NA']\n"
    );

    let reports = dispatch(&create_report(Arc::new(TsvReportWriter)), rollups, &ctx).await;
    let report_dir = dir.path().join("step_09-visualizeData/mic_lake");
    assert_eq!(reports[&key], Payload::Directory(report_dir.clone()));
    let foam_levels = fs::read_to_string(TsvReportWriter::levels_path(&report_dir, Scheme::Foam))?;
    assert!(foam_levels.lines().any(|l| l == "Level 1\tA\t2"));
    assert!(foam_levels.lines().any(|l| l == "Level 4: C\tD\t2"));
    assert!(TsvReportWriter::table_path(&report_dir).exists());
    Ok(())
}
