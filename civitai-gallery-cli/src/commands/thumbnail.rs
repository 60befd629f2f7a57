//! Thumbnail command - fetch and render a version's preview image.

use super::common::parse_version_id;
use crate::error::CliError;
use crate::runner::CliRunner;

/// Run the thumbnail command.
pub fn run(version_id: &str, data_url: bool, verbose: bool) -> Result<(), CliError> {
    let version_id = parse_version_id(version_id)?;
    let runner = CliRunner::new(verbose)?;
    runner.log_startup("thumbnail");
    let gallery = runner.gallery()?;
    let thumbnails = gallery.thumbnails();

    if data_url {
        match thumbnails.load_thumbnail(&version_id)? {
            Some(url) => println!("{}", url),
            None => println!("(no preview image)"),
        }
        return Ok(());
    }

    match thumbnails.thumbnail_path(&version_id)? {
        Some(path) => println!("{}", path.display()),
        None => println!("(no preview image)"),
    }
    Ok(())
}
