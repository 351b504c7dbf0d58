pub mod cert_stores;
pub mod cipher;
pub mod key_stores;

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

/// Atomically write `bytes` to `path` through a temp file in the same
/// directory. With `private` set the file is readable by its owner only.
pub(crate) fn write_file_atomic(path: &Path, bytes: &[u8], private: bool) -> std::io::Result<()> {
    staged_file(path, bytes, private)?
        .persist(path)
        .map_err(|e| e.error)?;
    Ok(())
}

/// Like [`write_file_atomic`], but never replaces an existing file. Fails
/// with `ErrorKind::AlreadyExists` when `path` is already taken, so
/// concurrent creators agree on one winner.
pub(crate) fn create_file_atomic(path: &Path, bytes: &[u8], private: bool) -> std::io::Result<()> {
    staged_file(path, bytes, private)?
        .persist_noclobber(path)
        .map_err(|e| e.error)?;
    Ok(())
}

fn staged_file(path: &Path, bytes: &[u8], private: bool) -> std::io::Result<NamedTempFile> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = if private { 0o600 } else { 0o644 };
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = private;
    Ok(tmp)
}
