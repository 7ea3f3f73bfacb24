use std::io;
use std::path::PathBuf;

use nix::unistd::Pid;
use thiserror::Error;

use crate::tokenizer::Token;

/// Malformed input. Nothing has been opened or spawned when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxError {
    #[error("missing command")]
    MissingCommand,
    #[error("expected file name after '{0}'")]
    MissingRedirectTarget(char),
    #[error("file name too long (limit {limit}): {name}")]
    NameTooLong { name: String, limit: usize },
    #[error("too many arguments (limit {0})")]
    TooManyArgs(usize),
    #[error("too many commands in pipeline (limit {0})")]
    TooManyCommands(usize),
    #[error("argument too long (limit {0} bytes)")]
    WordTooLong(usize),
    #[error("line too long (limit {0} bytes)")]
    LineTooLong(usize),
    #[error("unexpected {0}")]
    Unexpected(Token),
}

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("syntax error: {0}")]
    Syntax(#[from] SyntaxError),
    #[error("cannot open {}: {source}", .path.display())]
    Open { path: PathBuf, source: io::Error },
    #[error("cannot create pipe: {0}")]
    Pipe(nix::Error),
    #[error("{program}: argument contains a NUL byte")]
    BadArgument { program: String },
    #[error("cannot create process: {0}")]
    Fork(nix::Error),
    #[error("cannot wait for process {pid}: {source}")]
    Wait { pid: Pid, source: nix::Error },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input line; the user is prompted again.
    Syntax,
    /// A redirection file or pipe could not be set up; nothing was launched.
    Resource,
    /// A stage could not be turned into a runnable program.
    Launch,
    /// The OS refused to create or wait for a process.
    Fatal,
}

impl ShellError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ShellError::Syntax(_) => ErrorKind::Syntax,
            ShellError::Open { .. } | ShellError::Pipe(_) => ErrorKind::Resource,
            ShellError::BadArgument { .. } => ErrorKind::Launch,
            ShellError::Fork(_) | ShellError::Wait { .. } => ErrorKind::Fatal,
        }
    }

    /// Status reported for a line that failed before producing a result.
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Syntax => 2,
            _ => 1,
        }
    }
}
