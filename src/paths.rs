use crate::settings::{APP_NAME, Settings};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub struct DataPaths {
    pub progress_file: PathBuf,
    pub annotations_file: PathBuf,
    pub output_dir: PathBuf,
}

/// Resolve where progress, annotations and images live. Explicit
/// directories win over settings, settings over XDG defaults.
/// Creates the directories if they don't exist.
pub fn resolve_data_paths(
    settings: &Settings,
    data_dir: Option<&Path>,
    output_dir: Option<&Path>,
) -> Result<DataPaths> {
    let data_dir = match data_dir.map(Path::to_path_buf).or_else(|| settings.data_dir.clone()) {
        Some(dir) => dir,
        None => dirs::data_dir()
            .context("Could not determine data directory")?
            .join(APP_NAME),
    };
    let output_dir = output_dir
        .map(Path::to_path_buf)
        .or_else(|| settings.output_dir.clone())
        .unwrap_or_else(|| data_dir.join("pages"));

    fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory: {data_dir:?}"))?;
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create output directory: {output_dir:?}"))?;

    Ok(DataPaths {
        progress_file: data_dir.join("revised_pages.json"),
        annotations_file: data_dir.join("wbw_data.json"),
        output_dir,
    })
}

/// Compute the XDG-compliant log file path.
/// Uses `state_dir` on platforms that have it, falls back to `cache_dir`.
pub fn resolve_log_path() -> Result<PathBuf> {
    let base = dirs::state_dir()
        .or_else(dirs::cache_dir)
        .context("Could not determine state or cache directory")?;

    let log_dir = base.join(APP_NAME);
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {log_dir:?}"))?;

    Ok(log_dir.join("murajaah.log"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_explicit_dirs_win() {
        let temp_dir = TempDir::new().unwrap();
        let data = temp_dir.path().join("data");
        let out = temp_dir.path().join("out");
        let mut settings = Settings::default();
        settings.data_dir = Some(temp_dir.path().join("ignored"));

        let paths = resolve_data_paths(&settings, Some(&data), Some(&out)).unwrap();
        assert_eq!(paths.progress_file, data.join("revised_pages.json"));
        assert_eq!(paths.annotations_file, data.join("wbw_data.json"));
        assert_eq!(paths.output_dir, out);
        assert!(out.is_dir());
        assert!(!temp_dir.path().join("ignored").exists());
    }

    #[test]
    fn test_output_defaults_under_data_dir() {
        let temp_dir = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.data_dir = Some(temp_dir.path().to_path_buf());

        let paths = resolve_data_paths(&settings, None, None).unwrap();
        assert_eq!(paths.output_dir, temp_dir.path().join("pages"));
        assert!(paths.output_dir.is_dir());
    }
}
