use std::fs::{File, OpenOptions};
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use nix::fcntl::OFlag;
use nix::unistd;

use crate::command::Pipeline;
use crate::error::ShellError;

const NULL_DEVICE: &str = "/dev/null";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    Read,
    /// Create if missing, truncate, write; new files get mode 0644.
    Truncate,
}

/// Where one standard stream of a stage comes from.
///
/// Owned descriptors are closed when the value is dropped, so a stage's
/// descriptors are released on every path out of the launcher.
#[derive(Debug)]
pub enum Endpoint {
    Inherited,
    PipeEnd(OwnedFd),
    File(File),
}

impl Endpoint {
    fn open(path: &Path, mode: FileMode) -> Result<Self, ShellError> {
        let mut options = OpenOptions::new();
        match mode {
            FileMode::Read => options.read(true),
            FileMode::Truncate => options.write(true).create(true).truncate(true).mode(0o644),
        };

        let file = options.open(path).map_err(|source| ShellError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Endpoint::File(file))
    }

    /// Descriptor to install, or `None` to keep the inherited stream.
    pub fn as_fd(&self) -> Option<BorrowedFd<'_>> {
        match self {
            Endpoint::Inherited => None,
            Endpoint::PipeEnd(fd) => Some(fd.as_fd()),
            Endpoint::File(file) => Some(file.as_fd()),
        }
    }

    #[cfg(test)]
    pub fn is_inherited(&self) -> bool {
        matches!(self, Endpoint::Inherited)
    }

    #[cfg(test)]
    pub fn is_pipe(&self) -> bool {
        matches!(self, Endpoint::PipeEnd(_))
    }
}

#[derive(Debug)]
pub struct StageDescriptors {
    pub stdin: Endpoint,
    pub stdout: Endpoint,
}

/// Resolve the standard input and output of every stage.
///
/// Redirection files are opened and all inter-stage pipes created before
/// anything is launched; on error every descriptor acquired so far is
/// closed. Pipe ends are close-on-exec so a stage only keeps the two
/// streams installed as its stdin and stdout.
///
/// Streams not covered by a redirection or a pipe are inherited from the
/// shell, with one exception: the first stage of a background pipeline
/// without `<` reads from `/dev/null`, not the shell's stdin, so a
/// single-stage `cmd &` does not pass the terminal through.
pub fn wire(pipeline: &Pipeline) -> Result<Vec<StageDescriptors>, ShellError> {
    let count = pipeline.commands.len();

    let first_stdin = match (&pipeline.input, pipeline.background) {
        (Some(path), _) => Endpoint::open(path, FileMode::Read)?,
        (None, true) => Endpoint::open(Path::new(NULL_DEVICE), FileMode::Read)?,
        (None, false) => Endpoint::Inherited,
    };
    let last_stdout = match &pipeline.output {
        Some(path) => Endpoint::open(path, FileMode::Truncate)?,
        None => Endpoint::Inherited,
    };

    let mut stages = Vec::with_capacity(count);
    let mut stdin = first_stdin;
    for _ in 1..count {
        let (read_end, write_end) = unistd::pipe2(OFlag::O_CLOEXEC).map_err(ShellError::Pipe)?;
        stages.push(StageDescriptors { stdin, stdout: Endpoint::PipeEnd(write_end) });
        stdin = Endpoint::PipeEnd(read_end);
    }
    stages.push(StageDescriptors { stdin, stdout: last_stdout });

    Ok(stages)
}
