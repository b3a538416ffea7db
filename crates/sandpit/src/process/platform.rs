//! Host shell selection

use std::path::{Path, PathBuf};

use tokio::process::Command;

/// Shell used to interpret command lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostShell {
    program: PathBuf,
    args: Vec<String>,
}

impl HostShell {
    /// Shell native to the host
    ///
    /// PowerShell on Windows; bash on unix when installed, otherwise `sh`.
    pub fn detect() -> Self {
        if cfg!(windows) {
            return Self::with_program("powershell.exe");
        }
        let bash = Path::new("/bin/bash");
        if bash.exists() {
            Self::with_program(bash)
        } else {
            Self::with_program("/bin/sh")
        }
    }

    /// Use a specific shell binary
    ///
    /// The flag that introduces the command line is picked from the binary
    /// name: `-Command` for PowerShell, `/C` for cmd, `-c` for everything else.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        let stem = program
            .file_stem()
            .map(|s| s.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        let args = match stem.as_str() {
            "powershell" | "pwsh" => vec!["-NoProfile", "-NonInteractive", "-Command"],
            "cmd" => vec!["/C"],
            _ => vec!["-c"],
        };
        Self {
            program,
            args: args.into_iter().map(str::to_owned).collect(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Build a command that runs `line` through this shell
    pub fn command(&self, line: &str) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).arg(line);
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posix_shell_uses_dash_c() {
        let shell = HostShell::with_program("/bin/sh");
        assert_eq!(shell.args, vec!["-c"]);
        assert_eq!(shell.program(), Path::new("/bin/sh"));
    }

    #[test]
    fn powershell_uses_command_flag() {
        let shell = HostShell::with_program("powershell.exe");
        assert_eq!(shell.args.last().map(String::as_str), Some("-Command"));
        assert!(shell.args.iter().any(|a| a == "-NoProfile"));
    }

    #[test]
    fn cmd_uses_slash_c() {
        let shell = HostShell::with_program("CMD.EXE");
        assert_eq!(shell.args, vec!["/C"]);
    }

    #[cfg(unix)]
    #[test]
    fn detect_picks_existing_posix_shell() {
        let shell = HostShell::detect();
        assert!(shell.program().exists());
        assert_eq!(shell.args, vec!["-c"]);
    }

    #[test]
    fn command_appends_line_after_flag() {
        let shell = HostShell::with_program("/bin/sh");
        let command = shell.command("echo hi");
        let args: Vec<_> = command.as_std().get_args().collect();
        assert_eq!(args, vec!["-c", "echo hi"]);
    }
}
