//! Fetch command - download a model version into the cache.

use civitai_gallery::{ArtifactKind, ArtifactSource};
use console::style;

use super::common::{interactive_download, parse_version_id};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Run the fetch command.
pub fn run(version_id: &str, kind: ArtifactKind, verbose: bool) -> Result<(), CliError> {
    let version_id = parse_version_id(version_id)?;
    let runner = CliRunner::new(verbose)?;
    runner.log_startup("fetch");
    let gallery = runner.gallery()?;

    if let Some(path) = gallery.cache(kind).cached(&version_id)? {
        println!("{} {}", style("Cached:").green(), path.display());
        return Ok(());
    }

    println!("Fetching {} {} ...", kind, version_id);
    let (bar, options) = interactive_download()?;
    let result = gallery.ensure_with(kind, &version_id, &options);
    bar.finish_and_clear();

    let path = result?;
    println!("{} {}", style("Downloaded:").green(), path.display());
    Ok(())
}
