use anyhow::Result;
use futures::FutureExt;
use std::path::PathBuf;
use std::time::Duration;

use cerberus_pipelines::config::defs::{Origin, RunConfig, Step, TIME_LOG};
use cerberus_pipelines::utils::dispatch::{dispatch, DispatchContext, Stage};
use cerberus_pipelines::utils::work::{Key, Payload, StageResult};


fn keyed_inputs(n: usize) -> StageResult {
    (0..n)
        .map(|i| {
            let key = Key::new(Origin::Microbial, format!("s{}", i));
            (key, Payload::Single(PathBuf::from(format!("/in/s{}.faa", i))))
        })
        .collect()
}


#[tokio::test]
async fn test_one_failing_key_is_dropped() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut config = RunConfig::with_out_dir(dir.path());
    config.workers = 3;
    let ctx = DispatchContext::new(&config).await?;

    let stage = Stage::new("hmm_search", Step::Hmmer, |item| {
        async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if item.key.name == "s3" {
                None
            } else {
                Some(Payload::Single(item.out_path.join("hits.tbl")))
            }
        }
        .boxed()
    });

    let n = 8;
    let output = dispatch(&stage, keyed_inputs(n), &ctx).await;
    assert_eq!(output.len(), n - 1);
    assert!(!output.contains_key(&Key::new(Origin::Microbial, "s3")));

    let hit = &output[&Key::new(Origin::Microbial, "s0")];
    assert_eq!(*hit, Payload::Single(dir.path().join("step_07-hmmer/mic_s0/hits.tbl")));
    assert!(dir.path().join("step_07-hmmer/mic_s3").is_dir());

    let timings = std::fs::read_to_string(dir.path().join(TIME_LOG))?;
    let lines: Vec<&str> = timings.lines().collect();
    assert_eq!(lines.len(), n);
    for line in lines {
        let fields: Vec<&str> = line.split('\t').collect();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0], "hmm_search");
        assert!(fields[1].starts_with("step_07-hmmer/mic_s"));
        assert!(fields[2].ends_with(" seconds"));
    }
    Ok(())
}


#[tokio::test]
async fn test_panicking_worker_does_not_fail_the_batch() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let ctx = DispatchContext::new(&RunConfig::with_out_dir(dir.path())).await?;

    let stage = Stage::new("parse_hmmer", Step::Parse, |item| {
        async move {
            if item.key.name == "s1" {
                panic!("malformed work item");
            }
            Some(item.payload)
        }
        .boxed()
    });

    let output = dispatch(&stage, keyed_inputs(3), &ctx).await;
    assert_eq!(output.len(), 2);
    Ok(())
}


#[tokio::test]
async fn test_empty_stage_returns_empty() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let ctx = DispatchContext::new(&RunConfig::with_out_dir(dir.path())).await?;
    let stage = Stage::new("trim_reads", Step::Trim, |item| async move { Some(item.payload) }.boxed());
    assert!(dispatch(&stage, StageResult::default(), &ctx).await.is_empty());
    Ok(())
}
