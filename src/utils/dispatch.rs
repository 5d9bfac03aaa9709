// src/utils/dispatch.rs: parallel fan-out of one stage over its keyed inputs
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use futures::future::{join_all, BoxFuture};
use log::{debug, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, Semaphore};

use crate::config::defs::{RunConfig, Step};
use crate::utils::system::host_name;
use crate::utils::work::{Key, Payload, StageResult, WorkItem};

/// A stage function. It must absorb its own failures: `None` means "no result for this key".
pub type StageFn = Arc<dyn Fn(WorkItem) -> BoxFuture<'static, Option<Payload>> + Send + Sync>;

#[derive(Clone)]
pub struct Stage {
    pub name: &'static str,
    pub step: Step,
    pub subdir: Option<&'static str>,
    pub func: StageFn,
}

impl Stage {
    pub fn new<F>(name: &'static str, step: Step, func: F) -> Self
    where
        F: Fn(WorkItem) -> BoxFuture<'static, Option<Payload>> + Send + Sync + 'static,
    {
        Stage { name, step, subdir: None, func: Arc::new(func) }
    }

    /// Nests every key's output one level deeper, e.g. `step_03-trim/<key>/quality`.
    pub fn with_subdir(mut self, subdir: &'static str) -> Self {
        self.subdir = Some(subdir);
        self
    }

    /// Output location relative to the run directory.
    pub fn relative_path(&self, key: &Key) -> PathBuf {
        let path = Path::new(self.step.dir_name()).join(key.to_string());
        match self.subdir {
            Some(sub) => path.join(sub),
            None => path,
        }
    }
}

/// Shared `time.txt`. One locked `write_all` per record keeps lines whole.
pub struct TimeLog {
    file: Mutex<tokio::fs::File>,
}

impl TimeLog {
    pub async fn open(path: &Path) -> Result<Self> {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(TimeLog { file: Mutex::new(file) })
    }

    pub async fn record(&self, function: &str, path: &Path, seconds: f64) -> Result<()> {
        let line = format!("{}\t{}\t{:.2} seconds\n", function, path.display(), seconds);
        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Everything a dispatch needs besides the stage and its inputs.
#[derive(Clone)]
pub struct DispatchContext {
    pub out_dir: PathBuf,
    pub permits: Arc<Semaphore>,
    pub time_log: Arc<TimeLog>,
    pub host: String,
}

impl DispatchContext {
    pub async fn new(config: &RunConfig) -> Result<Self> {
        fs::create_dir_all(&config.out_dir)?;
        Ok(DispatchContext {
            out_dir: config.out_dir.clone(),
            permits: Arc::new(Semaphore::new(config.workers.max(1))),
            time_log: Arc::new(TimeLog::open(&config.time_log()).await?),
            host: host_name(),
        })
    }
}

/// Runs `stage` once per keyed input and waits for all of them.
///
/// The barrier is all-of: the call returns only after every task has finished,
/// so one stalled task holds the whole stage. Items run concurrently up to the
/// context's permit count. Nothing is retried, and a key whose stage function
/// returns `None` (or whose task panics) is left out of the result.
pub async fn dispatch(stage: &Stage, inputs: StageResult, ctx: &DispatchContext) -> StageResult {
    let mut keys = Vec::with_capacity(inputs.len());
    let mut handles = Vec::with_capacity(inputs.len());

    for (key, payload) in inputs {
        let relative = stage.relative_path(&key);
        let out_path = ctx.out_dir.join(&relative);
        if let Err(e) = fs::create_dir_all(&out_path) {
            warn!("{} | {}: cannot create {}: {}", stage.name, key, out_path.display(), e);
            continue;
        }

        let item = WorkItem { key: key.clone(), payload, out_path };
        let func = stage.func.clone();
        let permits = ctx.permits.clone();
        let time_log = ctx.time_log.clone();
        let host = ctx.host.clone();
        let name = stage.name;

        handles.push(tokio::spawn(async move {
            let _permit = permits.acquire_owned().await.ok();
            info!("{} | {} | {}", host, name, relative.display());
            let start = Instant::now();
            let result = func(item).await;
            let elapsed = start.elapsed().as_secs_f64();
            if let Err(e) = time_log.record(name, &relative, elapsed).await {
                warn!("Failed to append timing for {}: {}", relative.display(), e);
            }
            result
        }));
        keys.push(key);
    }

    let mut outputs = StageResult::default();
    for (key, joined) in keys.into_iter().zip(join_all(handles).await) {
        match joined {
            Ok(Some(payload)) => {
                debug!("{} | {} -> {}", stage.name, key, payload);
                outputs.insert(key, payload);
            }
            Ok(None) => debug!("{} | {} produced no result", stage.name, key),
            Err(e) => warn!("{} | {} worker aborted: {}", stage.name, key, e),
        }
    }
    outputs
}
