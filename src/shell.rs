use std::io::{self, BufRead, Write};

use colored::Colorize;
use nix::sys::signal::Signal;

use crate::command::Pipeline;
use crate::error::{ShellError, SyntaxError};
use crate::jobs::{self, JobCompletion, JobRegistry, PipelineResult, StageStatus};
use crate::limits::Limits;
use crate::pipes::{self, NOT_EXECUTABLE, NOT_FOUND};
use crate::prompt::Prompt;
use crate::redirects;
use crate::signal_handler::SignalHandler;
use crate::tokenizer::tokenize;

pub struct Shell {
    limits: Limits,
    job_manager: JobRegistry,
    prompt: Prompt,
    signals: SignalHandler,
}

impl Shell {
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            job_manager: JobRegistry::new(),
            prompt: Prompt::new(),
            signals: SignalHandler::new(),
        }
    }

    /// Parse and run one input line.
    ///
    /// Foreground pipelines are waited for; background pipelines return as
    /// soon as every stage has been created.
    pub fn run_line(&mut self, line: &str) -> Result<PipelineResult, ShellError> {
        let line = line.trim_end_matches('\n');
        if line.len() > self.limits.max_line {
            return Err(SyntaxError::LineTooLong(self.limits.max_line).into());
        }

        let tokens = tokenize(line, &self.limits)?;
        let pipeline = Pipeline::parse(&tokens, &self.limits)?;
        let descriptors = redirects::wire(&pipeline)?;
        let stages = pipes::launch(&pipeline, descriptors)?;
        jobs::supervise(stages, pipeline.background, &self.job_manager, line.trim())
    }

    /// Collect background jobs that have finished since the last call.
    pub fn reap_background_jobs(&self) -> Vec<JobCompletion> {
        self.job_manager.reap()
    }

    pub fn report_error(error: &ShellError) {
        eprintln!("{} {}", "minsh:".red().bold(), error);
    }

    fn report_result(result: &PipelineResult) {
        if let Some(id) = result.job.filter(|_| result.is_detached()) {
            if let Some(last) = result.stages.last() {
                println!("[{}] {}", id, last.pid);
            }
            return;
        }

        let count = result.stages.len();
        for index in result.failed_stages() {
            let stage = &result.stages[index];
            if worth_reporting(index, count, stage.status) {
                eprintln!("{}: {}", stage.program.yellow(), stage.status);
            }
        }
    }

    fn report_completion(done: &JobCompletion) {
        let state = match done.result.exit_code() {
            Some(0) => "Done".to_string(),
            Some(code) => format!("Exit {}", code),
            None => "Done".to_string(),
        };
        println!("[{}] {}  {}", done.id, state, done.command);
    }

    /// Run one line and turn the outcome into a process exit code.
    pub fn run_command(&mut self, line: &str) -> i32 {
        match self.run_line(line) {
            Ok(result) => {
                Self::report_result(&result);
                if result.is_detached() {
                    0
                } else {
                    result.exit_code().unwrap_or(1)
                }
            }
            Err(e) => {
                Self::report_error(&e);
                e.exit_code()
            }
        }
    }

    /// Interactive read-loop: reap, prompt, read, run, until end of input.
    pub fn run(&mut self) {
        if let Err(e) = self.signals.setup_handler() {
            eprintln!("{} cannot install SIGINT handler: {}", "minsh:".red().bold(), e);
        }

        let stdin = io::stdin();
        self.read_loop(&mut stdin.lock());
    }

    fn read_loop(&mut self, input: &mut impl BufRead) {
        loop {
            for done in self.reap_background_jobs() {
                Self::report_completion(&done);
            }

            let prompt = self.prompt.get_string();
            print!("{}", prompt);
            let _ = io::stdout().flush();
            self.signals.set_prompt(Some(prompt));

            let read = next_input_line(input);
            self.signals.set_prompt(None);

            match read {
                Ok(None) => break,
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    self.run_command(&line);
                }
                Err(e) => {
                    eprintln!("Error reading input: {}", e);
                    break;
                }
            }
        }
        println!("\nexit");
    }
}

/// Read one line, `None` at end of input.
///
/// Bytes that are not UTF-8 are replaced rather than ending the session; the
/// line still runs and fails on its own.
fn next_input_line(input: &mut impl BufRead) -> io::Result<Option<String>> {
    let mut buf = Vec::new();
    if input.read_until(b'\n', &mut buf)? == 0 {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

/// Whether a failed stage deserves a line of its own.
///
/// A writer killed by SIGPIPE before the last stage only saw its reader
/// finish early (`yes | head -n 1`).
fn worth_reporting(index: usize, count: usize, status: StageStatus) -> bool {
    match status {
        // The child already said why.
        StageStatus::Exited(NOT_FOUND) | StageStatus::Exited(NOT_EXECUTABLE) => false,
        StageStatus::Signaled(Signal::SIGPIPE) => index + 1 == count,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::time::{Duration, Instant};

    fn shell() -> Shell {
        Shell::new(Limits::default())
    }

    #[test]
    fn single_stage_with_redirections() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let output = dir.path().join("out.txt");
        std::fs::write(&input, "hello pipes\n").unwrap();

        let line = format!("tr a-z A-Z < {} > {}\n", input.display(), output.display());
        let result = shell().run_line(&line).unwrap();
        assert!(result.success());
        assert_eq!(result.stages.len(), 1);
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "HELLO PIPES\n");
    }

    #[test]
    fn three_stage_chain_preserves_content() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.txt");

        let line = format!("echo one two three | cat | cat > {}", output.display());
        let result = shell().run_line(&line).unwrap();
        assert!(result.success(), "{:?}", result);
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "one two three\n");
    }

    #[test]
    fn syntax_errors_launch_nothing() {
        let mut shell = shell();
        for line in ["", "| wc", "a | b | c | d | e | f", "cmd1 | cmd2 < in.txt", "ls > out junk"] {
            let err = shell.run_line(line).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Syntax, "{}", line);
        }
    }

    #[test]
    fn overlong_line_is_a_syntax_error() {
        let mut shell = Shell::new(Limits { max_line: 16, ..Limits::default() });
        let err = shell.run_line("echo 0123456789 abcdef").unwrap_err();
        assert!(matches!(err, ShellError::Syntax(SyntaxError::LineTooLong(16))));
    }

    #[test]
    fn unopenable_output_creates_no_process() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");

        let line = format!("touch {} > /nonexistent-dir-for-minsh/out.txt", marker.display());
        let err = shell().run_line(&line).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resource);
        assert!(!marker.exists());
    }

    #[test]
    fn missing_program_is_isolated_to_its_stage() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.txt");

        let line = format!("echo kept | minsh-no-such-program-xyz | cat > {}", output.display());
        let result = shell().run_line(&line).unwrap();
        assert!(!result.success());
        assert_eq!(result.failed_stages(), vec![1]);
        assert_eq!(result.stages[1].status, StageStatus::Exited(NOT_FOUND));
        assert_eq!(result.stages[2].status, StageStatus::Exited(0));
    }

    #[test]
    fn background_returns_before_the_pipeline_ends() {
        let mut shell = shell();
        let started = Instant::now();
        let result = shell.run_line("sleep 1 &").unwrap();
        assert!(started.elapsed() < Duration::from_millis(900));
        assert!(result.is_detached());

        let deadline = Instant::now() + Duration::from_secs(10);
        let done = loop {
            let done = shell.reap_background_jobs();
            if !done.is_empty() || Instant::now() > deadline {
                break done;
            }
            std::thread::sleep(Duration::from_millis(50));
        };
        assert_eq!(done.len(), 1);
        assert_eq!(Some(done[0].id), result.job);
        assert!(done[0].result.success());
        assert!(shell.reap_background_jobs().is_empty());
    }

    #[test]
    fn reap_without_jobs_is_a_no_op() {
        assert!(shell().reap_background_jobs().is_empty());
    }

    #[test]
    fn run_command_exit_codes() {
        let mut shell = shell();
        assert_eq!(shell.run_command("true"), 0);
        assert_eq!(shell.run_command("false"), 1);
        assert_eq!(shell.run_command("true | false"), 1);
        assert_eq!(shell.run_command("| true"), 2);
    }

    #[test]
    fn invalid_utf8_line_does_not_end_input() {
        let mut input = io::Cursor::new(b"echo before\n\xff\xfe\necho after\n".to_vec());
        assert_eq!(next_input_line(&mut input).unwrap().as_deref(), Some("echo before\n"));
        assert_eq!(next_input_line(&mut input).unwrap().as_deref(), Some("\u{FFFD}\u{FFFD}\n"));
        assert_eq!(next_input_line(&mut input).unwrap().as_deref(), Some("echo after\n"));
        assert_eq!(next_input_line(&mut input).unwrap(), None);
    }

    #[test]
    fn read_loop_runs_lines_after_invalid_utf8() {
        let _guard = crate::signal_handler::INTERRUPT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().unwrap();
        let before = dir.path().join("before.txt");
        let after = dir.path().join("after.txt");

        let mut script = format!("echo before > {}\n", before.display()).into_bytes();
        script.extend_from_slice(b"\xff\xfe\n");
        script.extend_from_slice(format!("echo after > {}\n", after.display()).as_bytes());

        shell().read_loop(&mut io::Cursor::new(script));
        assert_eq!(std::fs::read_to_string(&before).unwrap(), "before\n");
        assert_eq!(std::fs::read_to_string(&after).unwrap(), "after\n");
    }

    #[test]
    fn early_reader_exit_is_not_reported() {
        let result = shell().run_line("yes | head -n 1 > /dev/null").unwrap();
        assert_eq!(result.stages[0].status, StageStatus::Signaled(Signal::SIGPIPE));
        assert_eq!(result.exit_code(), Some(0));
        assert!(!worth_reporting(0, 2, result.stages[0].status));
    }

    #[test]
    fn reported_failures() {
        assert!(worth_reporting(0, 2, StageStatus::Exited(1)));
        assert!(worth_reporting(1, 2, StageStatus::Signaled(Signal::SIGPIPE)));
        assert!(worth_reporting(0, 2, StageStatus::Signaled(Signal::SIGKILL)));
        assert!(!worth_reporting(1, 2, StageStatus::Exited(NOT_FOUND)));
        assert!(!worth_reporting(0, 1, StageStatus::Exited(NOT_EXECUTABLE)));
    }
}
