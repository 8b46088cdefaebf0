//! Size-rotated log file with age and count based backup pruning.
//!
//! The active file is renamed to `<stem>-<timestamp>.<ext>` when a write
//! would push it past the size threshold, and a fresh file is opened in its
//! place. Backups are pruned by count (newest kept) and by the age encoded
//! in their name.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use tracing_subscriber::fmt::MakeWriter;

const BACKUP_TIME_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.3f";

/// Rotation limits. `None` disables the corresponding limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Roll over before the active file would exceed this many bytes.
    pub max_bytes: Option<u64>,

    /// Delete backups older than this.
    pub max_age: Option<Duration>,

    /// Keep at most this many backups.
    pub max_backups: Option<usize>,
}

impl RotationPolicy {
    /// A policy that never rotates and never prunes.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Build a policy from config-style values where zero means unlimited.
    pub fn from_limits(max_size_mb: u64, max_age_days: u64, max_backups: usize) -> Self {
        let non_zero = |v: u64| (v > 0).then_some(v);
        Self {
            max_bytes: non_zero(max_size_mb).map(|mb| mb.saturating_mul(1024 * 1024)),
            max_age: non_zero(max_age_days).map(|days| Duration::days(days as i64)),
            max_backups: (max_backups > 0).then_some(max_backups),
        }
    }
}

struct ActiveFile {
    file: File,
    size: u64,
}

struct Shared {
    path: PathBuf,
    policy: RotationPolicy,
    active: Mutex<ActiveFile>,
}

/// A log file that rotates itself. Clones write to the same file.
#[derive(Clone)]
pub struct RotatingFile {
    shared: Arc<Shared>,
}

impl RotatingFile {
    /// Open (or create) the active file in append mode.
    ///
    /// Parent directories are created as needed. Existing backups are
    /// pruned against the policy straight away.
    pub fn open(path: impl Into<PathBuf>, policy: RotationPolicy) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = open_append(&path)?;
        let size = file.metadata()?.len();

        let rotating = Self {
            shared: Arc::new(Shared {
                path,
                policy,
                active: Mutex::new(ActiveFile { file, size }),
            }),
        };
        rotating.prune()?;
        Ok(rotating)
    }

    fn lock(&self) -> MutexGuard<'_, ActiveFile> {
        self.shared.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one record, rolling the file over first if it would overflow.
    fn write_record(&self, buf: &[u8]) -> io::Result<()> {
        let rotated = {
            let mut active = self.lock();
            let rotated = match self.shared.policy.max_bytes {
                Some(limit) => active.size > 0 && active.size + buf.len() as u64 > limit,
                None => false,
            };
            if rotated {
                self.rotate(&mut active)?;
            }
            active.file.write_all(buf)?;
            active.size += buf.len() as u64;
            rotated
        };

        if rotated {
            if let Err(e) = self.prune() {
                eprintln!(
                    "failed to prune log backups for {}: {}",
                    self.shared.path.display(),
                    e
                );
            }
        }
        Ok(())
    }

    fn rotate(&self, active: &mut ActiveFile) -> io::Result<()> {
        let backup = backup_path(&self.shared.path, Utc::now());
        fs::rename(&self.shared.path, &backup)?;
        active.file = open_append(&self.shared.path)?;
        active.size = 0;
        Ok(())
    }

    /// Existing backups, newest first.
    pub fn backups(&self) -> io::Result<Vec<PathBuf>> {
        Ok(self
            .list_backups()?
            .into_iter()
            .map(|(_, path)| path)
            .collect())
    }

    fn list_backups(&self) -> io::Result<Vec<(DateTime<Utc>, PathBuf)>> {
        let path = &self.shared.path;
        let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(dir) => dir.to_path_buf(),
            None => PathBuf::from("."),
        };
        let (prefix, suffix) = backup_affixes(path);

        let mut backups = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some(stamp) = name
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_suffix(suffix.as_str()))
            else {
                continue;
            };
            if let Ok(time) = NaiveDateTime::parse_from_str(stamp, BACKUP_TIME_FORMAT) {
                backups.push((time.and_utc(), entry.path()));
            }
        }

        backups.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(backups)
    }

    /// Delete backups beyond the count limit or older than the age limit.
    ///
    /// Returns the number of files removed.
    pub fn prune(&self) -> io::Result<usize> {
        let policy = self.shared.policy;
        if policy.max_backups.is_none() && policy.max_age.is_none() {
            return Ok(0);
        }

        let cutoff = policy.max_age.map(|age| Utc::now() - age);
        let mut removed = 0;
        for (index, (time, path)) in self.list_backups()?.into_iter().enumerate() {
            let over_count = policy.max_backups.is_some_and(|max| index >= max);
            let too_old = cutoff.is_some_and(|cutoff| time < cutoff);
            if over_count || too_old {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

impl std::fmt::Debug for RotatingFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotatingFile")
            .field("path", &self.shared.path)
            .field("policy", &self.shared.policy)
            .finish()
    }
}

/// Writer handed to the formatting layer for a single record.
pub struct RotatingFileWriter<'a> {
    file: &'a RotatingFile,
}

impl Write for RotatingFileWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write_record(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.lock().file.flush()
    }
}

impl<'a> MakeWriter<'a> for RotatingFile {
    type Writer = RotatingFileWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        RotatingFileWriter { file: self }
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// `("site-", ".log")` for `logs/site.log`.
fn backup_affixes(path: &Path) -> (String, String) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    (format!("{stem}-"), suffix)
}

fn backup_path(path: &Path, at: DateTime<Utc>) -> PathBuf {
    let (prefix, suffix) = backup_affixes(path);
    let name = format!("{}{}{}", prefix, at.format(BACKUP_TIME_FORMAT), suffix);
    path.with_file_name(name)
}
