use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::system_paths::staging_file;

/// Write `bytes` to a staging sibling, then rename it over `target`.
/// Readers see either the previous document or the new one, never a mix.
pub fn write_atomic(target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match target.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
        _ => std::path::PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;
    let next_path = staging_file(target);
    {
        let mut f = File::create(&next_path)?;
        f.write_all(bytes)?;
        f.flush()?;
        // Best-effort durability of file contents
        let _ = f.sync_all();
    }
    // Windows cannot rename over an existing file.
    if cfg!(windows) && target.exists() {
        let _ = std::fs::remove_file(target);
    }
    if let Err(e) = std::fs::rename(&next_path, target) {
        let _ = std::fs::remove_file(&next_path);
        return Err(e);
    }
    // Best-effort directory flush
    let _ = fsync_dir(&dir);
    Ok(())
}

fn fsync_dir(dir: &Path) -> std::io::Result<()> {
    // Not all platforms expose a stable dir fsync; attempt to open and sync.
    let f = File::open(dir)?;
    let _ = f.sync_all();
    Ok(())
}
