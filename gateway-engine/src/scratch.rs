//! C7 — per-engine scratch directory for on-disk source/artifact files.
//!
//! PHP and Java need a real file on disk; everything else pipes source on
//! the command line. Grounded on the teacher's
//! `handlers.rs::browse_directory` use of
//! `std::env::temp_dir().join(format!("jaskier_browse_{}.ps1", std::process::id()))`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use rand::Rng;

/// Entries older than this are considered orphaned and swept (spec §4.7).
const ORPHAN_HORIZON: Duration = Duration::from_secs(60);

pub struct ScratchDir {
    root: PathBuf,
    counter: AtomicU64,
}

impl ScratchDir {
    /// Create the scratch root under the OS temp directory, named with this
    /// process's PID so concurrent engine instances never collide.
    pub fn create() -> std::io::Result<Self> {
        let root = std::env::temp_dir().join(format!("gateway-{}", std::process::id()));
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            counter: AtomicU64::new(0),
        })
    }

    /// For tests: an isolated scratch dir rooted at a caller-supplied path.
    pub fn at(root: PathBuf) -> std::io::Result<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            counter: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// A unique file name inside the scratch root: a monotonic counter plus
    /// a random suffix, so even many executions per millisecond never
    /// collide.
    pub fn unique_path(&self, file_name: &str) -> PathBuf {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let suffix: u32 = rand::thread_rng().gen();
        self.root.join(format!("{seq:x}-{suffix:08x}-{file_name}"))
    }

    /// Write `contents` to a fresh unique path and return it.
    pub fn write_unique(&self, file_name: &str, contents: &[u8]) -> std::io::Result<PathBuf> {
        let path = self.unique_path(file_name);
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Create a fresh, empty, uniquely-named directory inside the scratch
    /// root. Used by handlers that need an exact, caller-chosen file name
    /// inside an otherwise-collision-free location — `unique_path`'s
    /// `{seq}-{suffix}-` prefix on the file name itself would rename the
    /// file, which `javac` rejects for `public class NAME` sources (it
    /// requires the source file to be named exactly `NAME.java`).
    pub fn create_unique_dir(&self) -> std::io::Result<PathBuf> {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let suffix: u32 = rand::thread_rng().gen();
        let dir = self.root.join(format!("{seq:x}-{suffix:08x}"));
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Best-effort removal of a single path. Every exit path of an
    /// execution calls this for the files it created, in addition to the
    /// periodic sweep below (spec invariant 5).
    pub fn unlink(&self, path: &Path) {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(?path, error = %e, "scratch: failed to unlink file");
            }
        }
    }

    /// Best-effort recursive removal of a directory this engine created
    /// (e.g. a Java execution's per-run directory holding its `.java` and
    /// `.class` files).
    pub fn remove_dir(&self, path: &Path) {
        if let Err(e) = std::fs::remove_dir_all(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(?path, error = %e, "scratch: failed to remove directory");
            }
        }
    }

    /// Remove entries whose modification time is older than
    /// [`ORPHAN_HORIZON`], catching orphans left behind by crashed or
    /// otherwise-abandoned executions. Never removes files newer than the
    /// horizon, so it cannot race a live execution's own files.
    pub fn sweep(&self) -> usize {
        let now = SystemTime::now();
        let mut removed = 0;

        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "scratch: sweep failed to read directory");
                return 0;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(metadata) = entry.metadata() else { continue };
            let Ok(modified) = metadata.modified() else { continue };
            let age = now.duration_since(modified).unwrap_or_default();

            if age > ORPHAN_HORIZON {
                if metadata.is_dir() {
                    if std::fs::remove_dir_all(&path).is_ok() {
                        removed += 1;
                    }
                } else if std::fs::remove_file(&path).is_ok() {
                    removed += 1;
                }
            }
        }

        removed
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}
