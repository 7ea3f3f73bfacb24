/// Longest accepted input line, and longest single word on it.
pub const MAXLINE: usize = 1024;
/// Most arguments one command may carry, program name included.
pub const MAXARG: usize = 20;
/// Most commands one pipeline may chain.
pub const PIPELINE: usize = 5;
/// Redirection file names must be shorter than this.
pub const MAXNAME: usize = 100;

/// Upper bounds enforced while tokenizing and parsing a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_line: usize,
    pub max_args: usize,
    pub max_stages: usize,
    pub max_name: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_line: MAXLINE,
            max_args: MAXARG,
            max_stages: PIPELINE,
            max_name: MAXNAME,
        }
    }
}

impl Limits {
    /// Apply a `--max-*` flag. Returns `Ok(false)` if the flag is not a limit.
    pub fn apply_flag(&mut self, flag: &str, value: Option<&str>) -> Result<bool, String> {
        let slot = match flag {
            "--max-line" => &mut self.max_line,
            "--max-args" => &mut self.max_args,
            "--max-stages" => &mut self.max_stages,
            "--max-name" => &mut self.max_name,
            _ => return Ok(false),
        };

        let value = value.ok_or_else(|| format!("{}: missing value", flag))?;
        match value.parse::<usize>() {
            Ok(n) if n > 0 => {
                *slot = n;
                Ok(true)
            }
            _ => Err(format!("{}: expected a positive integer, got '{}'", flag, value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let limits = Limits::default();
        assert_eq!(limits.max_args, 20);
        assert_eq!(limits.max_stages, 5);
        assert_eq!(limits.max_name, 100);
        assert_eq!(limits.max_line, 1024);
    }

    #[test]
    fn apply_flag_overrides() {
        let mut limits = Limits::default();
        assert_eq!(limits.apply_flag("--max-stages", Some("8")), Ok(true));
        assert_eq!(limits.max_stages, 8);
        assert_eq!(limits.apply_flag("-c", Some("ls")), Ok(false));
        assert!(limits.apply_flag("--max-args", Some("0")).is_err());
        assert!(limits.apply_flag("--max-name", None).is_err());
    }
}
