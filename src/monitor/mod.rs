//! Host health snapshot for the admin dashboard.
//!
//! Cheap figures (uptime, load, memory) are read from `/proc`. Disk and folder
//! usage shell out to `df` and `du`; folder probes fan out with bounded
//! concurrency, a per-probe timeout and an overall deadline. A probe that fails
//! or runs out of time is reported in `probe_errors` and the snapshot is
//! marked `degraded`, keeping whatever finished.

mod host;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

use crate::config::MonitorConfig;

pub use host::{CpuLoad, DiskUsage, MemoryUsage};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FolderUsage {
    pub folder: String,
    pub size: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProbeError {
    pub probe: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorSnapshot {
    pub status: &'static str,
    pub uptime: String,
    pub cpu_cores: usize,
    pub cpu_load: CpuLoad,
    pub memory: MemoryUsage,
    pub disks: Vec<DiskUsage>,
    pub folder_usages: Vec<FolderUsage>,
    pub probe_errors: Vec<ProbeError>,
}

pub struct Monitor {
    root: PathBuf,
    cfg: MonitorConfig,
    proc_dir: PathBuf,
    du_program: String,
    df_program: String,
}

impl Monitor {
    /// Folder probes cover the top-level directories under `root`.
    pub fn new(root: impl Into<PathBuf>, cfg: MonitorConfig) -> Self {
        Self {
            root: root.into(),
            cfg,
            proc_dir: PathBuf::from("/proc"),
            du_program: "du".to_string(),
            df_program: "df".to_string(),
        }
    }

    pub fn with_proc_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.proc_dir = dir.into();
        self
    }

    pub fn with_programs(mut self, du: impl Into<String>, df: impl Into<String>) -> Self {
        self.du_program = du.into();
        self.df_program = df.into();
        self
    }

    pub async fn snapshot(&self) -> MonitorSnapshot {
        let mut errors = Vec::new();

        let uptime = self
            .read_proc("uptime", host::parse_uptime)
            .await
            .unwrap_or_else(|e| record(&mut errors, "uptime", e, String::new()));
        let cpu_load = self
            .read_proc("loadavg", host::parse_loadavg)
            .await
            .unwrap_or_else(|e| record(&mut errors, "loadavg", e, CpuLoad::default()));
        let memory = self
            .read_proc("meminfo", host::parse_meminfo)
            .await
            .unwrap_or_else(|e| record(&mut errors, "meminfo", e, MemoryUsage::default()));

        let disks = match self.disks().await {
            Ok(d) => d,
            Err(e) => record(&mut errors, "df", e, Vec::new()),
        };

        let (folder_usages, probe_errors) = self.folder_usages().await;
        errors.extend(probe_errors);

        let cpu_cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        let status = if errors.is_empty() { "ok" } else { "degraded" };
        debug!(target: "monitor", status, folders = folder_usages.len(), errors = errors.len(), "snapshot taken");
        MonitorSnapshot { status, uptime, cpu_cores, cpu_load, memory, disks, folder_usages, probe_errors: errors }
    }

    async fn read_proc<T>(&self, name: &str, parse: fn(&str) -> crate::error::AppResult<T>) -> Result<T, String> {
        let raw = tokio::fs::read_to_string(self.proc_dir.join(name)).await.map_err(|e| e.to_string())?;
        parse(&raw).map_err(|e| e.message().to_string())
    }

    async fn disks(&self) -> Result<Vec<DiskUsage>, String> {
        let out = run_probe(
            Command::new(&self.df_program).args(["-h", "--output=source,fstype,size,used,avail,pcent,target"]),
            self.cfg.probe_timeout,
        )
        .await?;
        Ok(host::parse_df(&out))
    }

    /// One `du -sk` per top-level directory, at most `max_concurrent_probes` at a time.
    async fn folder_usages(&self) -> (Vec<FolderUsage>, Vec<ProbeError>) {
        let mut usages = Vec::new();
        let mut errors = Vec::new();

        let folders = match top_level_dirs(&self.root).await {
            Ok(f) => f,
            Err(e) => {
                errors.push(ProbeError { probe: "folders".into(), error: e });
                return (usages, errors);
            }
        };

        let deadline = Instant::now() + self.cfg.deadline;
        let permits = Arc::new(Semaphore::new(self.cfg.max_concurrent_probes.max(1)));
        let mut set = JoinSet::new();
        for (name, path) in folders.iter().cloned() {
            let permits = permits.clone();
            let program = self.du_program.clone();
            let per_probe = self.cfg.probe_timeout;
            set.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return (name, Err("probe pool closed".to_string()));
                };
                let mut cmd = Command::new(program);
                cmd.arg("-sk").arg(&path);
                let result = run_probe(&mut cmd, per_probe).await.and_then(|out| {
                    host::parse_du_kib(&out).map(host::human_kib).ok_or_else(|| "unreadable du output".to_string())
                });
                (name, result)
            });
        }

        let mut finished = std::collections::HashSet::new();
        loop {
            match tokio::time::timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok((name, result)))) => {
                    finished.insert(name.clone());
                    match result {
                        Ok(size) => usages.push(FolderUsage { folder: name, size }),
                        Err(error) => errors.push(ProbeError { probe: format!("du {}", name), error }),
                    }
                }
                Ok(Some(Err(join_err))) => {
                    errors.push(ProbeError { probe: "du".into(), error: join_err.to_string() });
                }
                Ok(None) => break,
                Err(_) => {
                    // dropping the set aborts the tasks; kill_on_drop reaps the children
                    set.abort_all();
                    for (name, _) in folders.iter().filter(|(n, _)| !finished.contains(n)) {
                        errors.push(ProbeError { probe: format!("du {}", name), error: "deadline exceeded".into() });
                    }
                    warn!(target: "monitor", "folder usage deadline exceeded");
                    break;
                }
            }
        }
        usages.sort_by(|a, b| a.folder.cmp(&b.folder));
        (usages, errors)
    }
}

fn record<T>(errors: &mut Vec<ProbeError>, probe: &str, error: String, fallback: T) -> T {
    warn!(target: "monitor", probe, %error, "probe failed");
    errors.push(ProbeError { probe: probe.to_string(), error });
    fallback
}

async fn top_level_dirs(root: &Path) -> Result<Vec<(String, PathBuf)>, String> {
    let mut rd = tokio::fs::read_dir(root).await.map_err(|e| e.to_string())?;
    let mut dirs = Vec::new();
    while let Some(entry) = rd.next_entry().await.map_err(|e| e.to_string())? {
        // file_type does not follow symlinks
        if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            dirs.push((entry.file_name().to_string_lossy().into_owned(), entry.path()));
        }
    }
    dirs.sort();
    Ok(dirs)
}

async fn run_probe(cmd: &mut Command, limit: Duration) -> Result<String, String> {
    let child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| format!("spawn failed: {}", e))?;
    match timeout(limit, child.wait_with_output()).await {
        Ok(Ok(out)) if out.status.success() => Ok(String::from_utf8_lossy(&out.stdout).into_owned()),
        Ok(Ok(out)) => Err(format!(
            "exited with {}: {}",
            out.status,
            String::from_utf8_lossy(&out.stderr).trim()
        )),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("timed out after {:?}", limit)),
    }
}
