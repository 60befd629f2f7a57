//! Preinstall command - install a file by its SHA-256.

use std::path::PathBuf;

use console::style;

use super::common::interactive_download;
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the preinstall command.
pub struct PreinstallArgs {
    pub hash: String,
    pub target: PathBuf,
    pub link_dir: Option<PathBuf>,
    pub verbose: bool,
}

/// Run the preinstall command.
pub fn run(args: PreinstallArgs) -> Result<(), CliError> {
    let hash = args.hash.trim();
    if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(CliError::InvalidArgument(format!(
            "'{}' is not a SHA-256 hex digest",
            args.hash
        )));
    }

    let runner = CliRunner::new(args.verbose)?;
    runner.log_startup("preinstall");
    let gallery = runner.gallery()?;

    let (bar, options) = interactive_download()?;
    let result = gallery.preinstaller().install_by_hash(
        hash,
        &args.target,
        args.link_dir.as_deref(),
        &options,
    );
    bar.finish_and_clear();
    let outcome = result?;

    if outcome.downloaded {
        println!("{} {}", style("Installed:").green(), outcome.target.display());
    } else {
        println!(
            "{} {}",
            style("Already installed:").green(),
            outcome.target.display()
        );
    }
    if let Some(link) = outcome.link {
        println!("Linked:    {}", link.display());
    }
    Ok(())
}
