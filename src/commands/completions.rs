//! Completions command implementation
//!
//! Generates a shell completion script on stdout; redirect it to the
//! location your shell loads completions from, e.g.
//!
//! ```bash
//! repo-consolidate completions zsh > ~/.zfunc/_repo-consolidate
//! ```

use anyhow::Result;
use clap::{Args, CommandFactory};
use clap_complete::{generate, Shell};
use std::io;

use crate::cli::Cli;

/// Generate shell completion scripts
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// The shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Execute the `completions` command.
pub fn execute(args: CompletionsArgs) -> Result<()> {
    generate(
        args.shell,
        &mut Cli::command(),
        "repo-consolidate",
        &mut io::stdout(),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_generated_script_names_the_binary() {
        let mut buf = Vec::new();
        generate(Shell::Bash, &mut Cli::command(), "repo-consolidate", &mut buf);
        let script = String::from_utf8(buf).unwrap();
        assert!(script.contains("repo-consolidate"));
    }

    #[test]
    fn test_unsupported_shell_rejected() {
        assert!(Cli::try_parse_from(["repo-consolidate", "completions", "tcsh"]).is_err());
    }
}
