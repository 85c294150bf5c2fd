use super::{IgnoreArgs, load_ignore_rules};
use crate::progress::Spinner;
use acrflow_config::Settings;
use acrflow_context::{ContextArchive, ContextError, SealedArchive};
use colored::Colorize;
use std::path::Path;

pub fn handle(
    settings: &Settings,
    context: &Path,
    output: &Path,
    ignore: &IgnoreArgs,
) -> anyhow::Result<()> {
    let sealed = pack_context(settings, context, output, ignore)?;

    println!(
        "{} Packed {} files into {} ({})",
        "✓".green(),
        sealed.files().len(),
        sealed.path().display().to_string().cyan(),
        format_size(sealed.size())
    );
    Ok(())
}

/// Package `context` into `output`, honoring every configured ignore source.
pub fn pack_context(
    settings: &Settings,
    context: &Path,
    output: &Path,
    ignore: &IgnoreArgs,
) -> anyhow::Result<SealedArchive> {
    if !context.is_dir() {
        anyhow::bail!("Context directory not found: {}", context.display());
    }

    let spinner = Spinner::new(&format!("Packing {}...", context.display()));
    match build_archive(settings, context, output, ignore) {
        Ok(sealed) => {
            spinner.finish_and_clear();
            Ok(sealed)
        }
        Err(e) => {
            spinner.finish_error(&e.to_string());
            Err(anyhow::anyhow!(e.user_message()))
        }
    }
}

fn build_archive(
    settings: &Settings,
    context: &Path,
    output: &Path,
    ignore: &IgnoreArgs,
) -> Result<SealedArchive, ContextError> {
    // パターンはアーカイブ作成前に全てコンパイルしておく
    let rules = load_ignore_rules(settings, context, ignore)?;

    let mut archive = ContextArchive::create(output)?;
    archive.with_ignore(rules).add_directory(context)?;
    archive.seal()
}

fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;

    let bytes = bytes as f64;
    if bytes >= MB {
        format!("{:.1} MB", bytes / MB)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes / KB)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }
}
