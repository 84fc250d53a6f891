use std::ffi::OsStr;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{anyhow, bail, Context, Result};

static TEMP_SERIAL: AtomicU64 = AtomicU64::new(0);

/// Writes text to `path` through a sibling temp file and a rename, so a
/// crashed writer can never leave a half-written file behind.
pub fn write_text_atomic(path: &Path, content: &str) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(OsStr::to_str)
        .ok_or_else(|| anyhow!("destination '{}' has no usable file name", path.display()))?;
    if path.is_dir() {
        bail!("destination '{}' is a directory", path.display());
    }

    let parent_dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent_dir)
        .with_context(|| format!("failed to create {}", parent_dir.display()))?;

    let serial = TEMP_SERIAL.fetch_add(1, Ordering::Relaxed);
    let temp_path = parent_dir.join(format!(
        ".{file_name}.{}-{serial}.part",
        std::process::id()
    ));
    std::fs::write(&temp_path, content)
        .with_context(|| format!("failed to stage {}", temp_path.display()))?;
    std::fs::rename(&temp_path, path).with_context(|| {
        format!(
            "failed to move {} into place at {}",
            temp_path.display(),
            path.display()
        )
    })?;
    Ok(())
}
