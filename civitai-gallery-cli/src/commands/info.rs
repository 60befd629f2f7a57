//! Info command - show registry metadata for a model version.

use civitai_gallery::config::format_size;
use civitai_gallery::variant::select_variant;
use civitai_gallery::ArtifactKind;

use super::common::parse_version_id;
use crate::error::CliError;
use crate::runner::CliRunner;

/// Run the info command.
pub fn run(version_id: &str, verbose: bool) -> Result<(), CliError> {
    let version_id = parse_version_id(version_id)?;
    let runner = CliRunner::new(verbose)?;
    runner.log_startup("info");
    let gallery = runner.gallery()?;
    let preference = runner.config().preference();

    let metadata = gallery.metadata(&version_id)?;

    println!("Model Version {}", version_id);
    println!("==================");
    println!();
    if let Some(name) = &metadata.model.name {
        println!("Model:    {}", name);
    }
    if let Some(name) = &metadata.name {
        println!("Version:  {}", name);
    }
    println!("Type:     {}", metadata.model_type());
    println!("Download: {}", metadata.download_url);
    println!("Images:   {}", metadata.images.len());
    println!();

    let selection = select_variant(metadata.variants(), &preference);
    println!(
        "Files (preferred: {} {} {}):",
        preference.fp, preference.size, preference.format
    );
    if metadata.files.is_empty() {
        println!("  (none listed)");
    }
    for (index, file) in metadata.files.iter().enumerate() {
        let marker = match &selection {
            Some(s) if s.index == index => "*",
            _ => " ",
        };
        let variant = &file.metadata;
        println!(
            "{} {} [{} {} {}]{}",
            marker,
            file.name.as_deref().unwrap_or("(unnamed)"),
            variant.fp.as_deref().unwrap_or("-"),
            variant.size.as_deref().unwrap_or("-"),
            variant.format.as_deref().unwrap_or("-"),
            file.sha256()
                .map(|h| format!(" sha256:{}", h))
                .unwrap_or_default(),
        );
    }
    match &selection {
        Some(s) => println!("Selected: {:?} match", s.tier),
        None => println!("Selected: server default (no file with the preferred size)"),
    }

    let kind = ArtifactKind::ALL
        .iter()
        .copied()
        .find(|k| k.registry_type() == metadata.model_type());
    if let Some(kind) = kind {
        println!();
        match gallery.cache(kind).cached(&version_id)? {
            Some(path) => {
                let size = path.metadata().map(|m| m.len()).unwrap_or(0);
                println!("Cached:   {} ({})", path.display(), format_size(size));
            }
            None => println!("Cached:   no"),
        }
    }

    Ok(())
}
