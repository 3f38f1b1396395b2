//! Queues a guest executable for the loader.

use std::{fs, path::PathBuf, process::ExitCode};

use anyhow::Context;
use clap::{Parser, error::ErrorKind};
use mizu_rt::{Config, LauncherQueue};

#[derive(Debug, Parser)]
#[command(name = "hlaunch", version, about = "Queue a guest executable for the mizu loader")]
struct Cli {
    /// Guest executable to launch.
    path: PathBuf,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            let _ = err.print();
            return ExitCode::FAILURE;
        }
    };

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("hlaunch: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let path = fs::canonicalize(&cli.path)
        .with_context(|| format!("cannot resolve {}", cli.path.display()))?;
    let config = Config::load().context("cannot read the configuration")?;
    let queue = LauncherQueue::open_sender(&config.loader.queue)
        .with_context(|| format!("cannot open {}", config.loader.queue))?;
    queue
        .send(&path)
        .with_context(|| format!("cannot queue {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_shape() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_exactly_one_path() {
        let cli = Cli::try_parse_from(["hlaunch", "game.nro"]).unwrap();
        assert_eq!(cli.path, PathBuf::from("game.nro"));
        assert!(Cli::try_parse_from(["hlaunch"]).is_err());
        assert!(Cli::try_parse_from(["hlaunch", "a.nro", "b.nro"]).is_err());
    }

    #[test]
    fn test_missing_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli {
            path: dir.path().join("missing.nro"),
        };
        assert!(run(&cli).is_err());
    }
}
