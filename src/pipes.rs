use std::collections::VecDeque;
use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};

use nix::errno::Errno;
use nix::sys::signal::{signal, SigHandler, Signal};
use nix::sys::wait::waitpid;
use nix::unistd::{self, execvp, fork, setpgid, ForkResult, Pid};

use crate::command::{Command, Pipeline};
use crate::error::ShellError;
use crate::redirects::StageDescriptors;

/// A launched stage as seen from the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub pid: Pid,
    pub program: String,
}

/// Exit status of a child whose program could not be found.
pub const NOT_FOUND: i32 = 127;
/// Exit status of a child whose program could not be executed.
pub const NOT_EXECUTABLE: i32 = 126;

/// Retry a system call interrupted by a signal.
pub fn syscall<F, T>(f: F) -> nix::Result<T>
where
    F: Fn() -> nix::Result<T>,
{
    loop {
        match f() {
            Err(Errno::EINTR) => (),
            result => return result,
        }
    }
}

fn argv(command: &Command) -> Result<Vec<CString>, ShellError> {
    command
        .args
        .iter()
        .map(|arg| CString::new(arg.as_bytes()))
        .collect::<Result<_, _>>()
        .map_err(|_| ShellError::BadArgument { program: command.program().to_string() })
}

fn install(fd: Option<BorrowedFd<'_>>, target: RawFd) -> nix::Result<()> {
    match fd {
        Some(fd) => syscall(|| Errno::result(unsafe { libc::dup2(fd.as_raw_fd(), target) })).map(drop),
        None => Ok(()),
    }
}

fn report(program: &[u8], reason: &str) {
    let stderr = io::stderr();
    let _ = unistd::write(&stderr, program);
    let _ = unistd::write(&stderr, b": ");
    let _ = unistd::write(&stderr, reason.as_bytes());
    let _ = unistd::write(&stderr, b"\n");
}

/// Runs in the forked child: install the stage's streams and exec.
fn exec_stage(descriptors: StageDescriptors, pending: VecDeque<StageDescriptors>, argv: &[CString], group: Option<Pid>) -> ! {
    // Descriptors of later stages are not ours.
    drop(pending);

    if let Some(pgid) = group {
        let _ = setpgid(Pid::from_raw(0), pgid);
    }
    // The Rust runtime ignores SIGPIPE and an ignored disposition survives exec.
    let _ = unsafe { signal(Signal::SIGPIPE, SigHandler::SigDfl) };

    let program = argv[0].as_bytes();
    let installed = install(descriptors.stdin.as_fd(), libc::STDIN_FILENO)
        .and_then(|()| install(descriptors.stdout.as_fd(), libc::STDOUT_FILENO));
    if let Err(e) = installed {
        report(program, e.desc());
        unsafe { libc::_exit(NOT_EXECUTABLE) }
    }
    drop(descriptors);

    let code = match execvp::<CString>(&argv[0], argv) {
        Ok(never) => match never {},
        Err(Errno::ENOENT) => {
            report(program, "command not found");
            NOT_FOUND
        }
        Err(e) => {
            report(program, e.desc());
            NOT_EXECUTABLE
        }
    };
    unsafe { libc::_exit(code) }
}

/// Wait for stages that were launched before a later stage failed to start.
fn drain(stages: &[Stage]) {
    for stage in stages {
        let _ = syscall(|| waitpid(stage.pid, None));
    }
}

/// Start one process per stage, left to right.
///
/// Each stage's descriptors are dropped in the shell as soon as that stage
/// has been forked, so the shell never holds a pipe's write end once its
/// writer exists and readers see end-of-stream when writers exit.
/// Background pipelines get their own process group, led by the first stage.
///
/// A program that cannot be executed only fails its own stage (the child
/// exits with 127 or 126). If the OS refuses to create a process, the stages
/// already started are waited for and the error is returned.
pub fn launch(pipeline: &Pipeline, descriptors: Vec<StageDescriptors>) -> Result<Vec<Stage>, ShellError> {
    let argvs = pipeline.commands.iter().map(argv).collect::<Result<Vec<_>, _>>()?;
    let mut pending: VecDeque<StageDescriptors> = descriptors.into();
    let mut stages: Vec<Stage> = Vec::with_capacity(argvs.len());
    let mut group: Option<Pid> = None;

    for (command, argv) in pipeline.commands.iter().zip(&argvs) {
        let Some(current) = pending.pop_front() else {
            break;
        };
        let child_group = pipeline.background.then(|| group.unwrap_or(Pid::from_raw(0)));

        match unsafe { fork() } {
            Ok(ForkResult::Parent { child }) => {
                if child_group.is_some() {
                    let pgid = group.unwrap_or(child);
                    // Also done by the child; whichever runs first wins.
                    let _ = setpgid(child, pgid);
                    group = Some(pgid);
                }
                stages.push(Stage { pid: child, program: command.program().to_string() });
                drop(current);
            }
            Ok(ForkResult::Child) => exec_stage(current, pending, argv, child_group),
            Err(e) => {
                drop(current);
                drop(pending);
                drain(&stages);
                return Err(ShellError::Fork(e));
            }
        }
    }

    Ok(stages)
}
