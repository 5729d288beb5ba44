use crate::paths::MendPaths;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};

/// Exclusive run lock backed by `.mend/LOCK`. Only one cycle or apply run may
/// own the working tree at a time. Released on drop.
///
/// While held, the file names its holder as `pid=<n> acquired=<rfc3339>`.
pub struct RunLock {
    _file: File,
}

impl RunLock {
    /// Try to acquire the lock without blocking.
    pub fn acquire(paths: &MendPaths) -> anyhow::Result<Self> {
        paths.ensure_layout()?;
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&paths.lock_file)
            .map_err(|e| {
                anyhow::anyhow!("cannot open lock file {}: {}", paths.lock_file.display(), e)
            })?;

        if file.try_lock_exclusive().is_err() {
            let holder = read_holder(&mut file);
            anyhow::bail!(
                "workspace is locked by another process ({}; {})",
                holder.as_deref().unwrap_or("holder unknown"),
                paths.lock_file.display()
            );
        }

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        writeln!(
            file,
            "pid={} acquired={}",
            std::process::id(),
            mend_core::now_rfc3339()
        )?;
        file.flush()?;

        Ok(Self { _file: file })
    }
}

/// Holder line left by the current owner. `None` when unreadable or empty.
fn read_holder(file: &mut File) -> Option<String> {
    let mut text = String::new();
    file.read_to_string(&mut text).ok()?;
    let line = text.lines().next()?.trim();
    (!line.is_empty()).then(|| line.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_until_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let p = MendPaths::discover(tmp.path());

        let lock = RunLock::acquire(&p).unwrap();
        assert!(RunLock::acquire(&p).is_err());
        drop(lock);
        let _again = RunLock::acquire(&p).unwrap();
    }

    #[test]
    fn contention_error_names_the_holder() {
        let tmp = tempfile::tempdir().unwrap();
        let p = MendPaths::discover(tmp.path());
        let pid = format!("pid={}", std::process::id());

        let _lock = RunLock::acquire(&p).unwrap();
        let written = std::fs::read_to_string(&p.lock_file).unwrap();
        assert!(written.starts_with(&pid));
        assert!(written.contains("acquired="));

        let err = RunLock::acquire(&p).err().unwrap().to_string();
        assert!(err.contains("locked by another process"));
        assert!(err.contains(&pid));
    }
}
