use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use crate::error::ShellError;
use crate::pipes::{syscall, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Running,
    Exited(i32),
    Signaled(Signal),
    /// The process was collected by someone else; its status is unknown.
    Lost,
}

impl StageStatus {
    fn from_wait(status: WaitStatus) -> Self {
        match status {
            WaitStatus::Exited(_, code) => StageStatus::Exited(code),
            WaitStatus::Signaled(_, signal, _) => StageStatus::Signaled(signal),
            _ => StageStatus::Running,
        }
    }

    pub fn is_done(self) -> bool {
        self != StageStatus::Running
    }

    pub fn success(self) -> bool {
        self == StageStatus::Exited(0)
    }

    /// Shell-style exit code: 128 + signal number for a killed process.
    pub fn code(self) -> Option<i32> {
        match self {
            StageStatus::Exited(code) => Some(code),
            StageStatus::Signaled(signal) => Some(128 + signal as i32),
            StageStatus::Running | StageStatus::Lost => None,
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Running => f.write_str("running"),
            StageStatus::Exited(code) => write!(f, "exited with code {}", code),
            StageStatus::Signaled(signal) => write!(f, "terminated by {}", signal),
            StageStatus::Lost => f.write_str("status unavailable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub pid: Pid,
    pub program: String,
    pub status: StageStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineResult {
    pub stages: Vec<StageReport>,
    /// Set when the pipeline was detached as a background job.
    pub job: Option<u32>,
}

impl PipelineResult {
    pub fn is_detached(&self) -> bool {
        self.job.is_some() && self.stages.iter().any(|s| !s.status.is_done())
    }

    /// Every stage has terminated with status zero.
    pub fn success(&self) -> bool {
        self.stages.iter().all(|s| s.status.success())
    }

    /// Indices of stages that terminated unsuccessfully.
    pub fn failed_stages(&self) -> Vec<usize> {
        self.stages
            .iter()
            .enumerate()
            .filter(|(_, s)| s.status.is_done() && !s.status.success())
            .map(|(i, _)| i)
            .collect()
    }

    /// Exit code of the last stage, `None` while it is still running.
    pub fn exit_code(&self) -> Option<i32> {
        self.stages.last().and_then(|s| s.status.code())
    }
}

/// A background job the reaper found fully terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCompletion {
    pub id: u32,
    pub command: String,
    pub result: PipelineResult,
}

#[derive(Debug)]
struct Job {
    command: String,
    stages: Vec<StageReport>,
}

impl Job {
    /// Collect any stage that has terminated, without blocking.
    fn poll(&mut self) {
        for stage in self.stages.iter_mut().filter(|s| !s.status.is_done()) {
            stage.status = match syscall(|| waitpid(stage.pid, Some(WaitPidFlag::WNOHANG))) {
                Ok(status) => StageStatus::from_wait(status),
                Err(Errno::ECHILD) => StageStatus::Lost,
                Err(e) => {
                    eprintln!("minsh: cannot check process {}: {}", stage.pid, e);
                    StageStatus::Running
                }
            };
        }
    }

    fn is_done(&self) -> bool {
        self.stages.iter().all(|s| s.status.is_done())
    }
}

#[derive(Debug, Default)]
struct JobTable {
    jobs: BTreeMap<u32, Job>,
    next_id: u32,
}

/// Background jobs awaiting collection.
///
/// Clones share the same table, so a reaper running beside the read-loop
/// sees the jobs the loop registers.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    table: Arc<Mutex<JobTable>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, JobTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a launched pipeline and return its job id.
    pub fn add_job(&self, command: String, stages: Vec<StageReport>) -> u32 {
        let mut table = self.lock();
        table.next_id += 1;
        let id = table.next_id;
        table.jobs.insert(id, Job { command, stages });
        id
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().jobs.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Collect every job whose stages have all terminated.
    ///
    /// Never blocks; returns an empty list when nothing has finished.
    pub fn reap(&self) -> Vec<JobCompletion> {
        let mut table = self.lock();
        let mut completed = Vec::new();

        for (id, job) in table.jobs.iter_mut() {
            job.poll();
            if job.is_done() {
                completed.push(*id);
            }
        }

        completed
            .into_iter()
            .filter_map(|id| {
                let job = table.jobs.remove(&id)?;
                Some(JobCompletion {
                    id,
                    command: job.command,
                    result: PipelineResult { stages: job.stages, job: Some(id) },
                })
            })
            .collect()
    }
}

/// Wait for a foreground pipeline, or hand a background one to the registry.
///
/// Foreground stages are waited for by pid, so background children are left
/// for `JobRegistry::reap`.
pub fn supervise(
    stages: Vec<Stage>,
    background: bool,
    registry: &JobRegistry,
    command: &str,
) -> Result<PipelineResult, ShellError> {
    let mut reports: Vec<StageReport> = stages
        .into_iter()
        .map(|stage| StageReport { pid: stage.pid, program: stage.program, status: StageStatus::Running })
        .collect();

    if background {
        let id = registry.add_job(command.to_string(), reports.clone());
        return Ok(PipelineResult { stages: reports, job: Some(id) });
    }

    let mut failure = None;
    for report in reports.iter_mut() {
        // Keep collecting after an error so no stage is left a zombie.
        report.status = match syscall(|| waitpid(report.pid, None)) {
            Ok(status) => StageStatus::from_wait(status),
            Err(Errno::ECHILD) => StageStatus::Lost,
            Err(source) => {
                failure.get_or_insert(ShellError::Wait { pid: report.pid, source });
                StageStatus::Lost
            }
        };
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(PipelineResult { stages: reports, job: None }),
    }
}
