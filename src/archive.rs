// 🗄️ Snapshot Archive - uploaded files kept by date
//
// Each accepted upload is moved to `{dir}/{po|bl}.csv.{YYYY-MM-DD}`. The
// newest archived snapshot is the "previous" side of the next diff.

use crate::records::DatasetKind;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Archive file prefix for a dataset ("po" / "bl")
pub fn archive_prefix(kind: DatasetKind) -> String {
    kind.code().to_lowercase()
}

/// "po.csv.2024-03-07"
pub fn archive_name(kind: DatasetKind, date: NaiveDate) -> String {
    format!("{}.csv.{}", archive_prefix(kind), date.format("%Y-%m-%d"))
}

/// "differencesPO.2024-03-07.csv"
pub fn diff_filename(kind: DatasetKind, date: NaiveDate) -> String {
    format!("differences{}.{}.csv", kind.code(), date.format("%Y-%m-%d"))
}

/// Removed records of the last diff, read back by the next merge
pub fn removed_cache_path(dir: &Path, kind: DatasetKind) -> PathBuf {
    dir.join(format!("removed_cache_{}.csv", kind.code()))
}

/// Move an uploaded file into the archive, readable by everyone
pub fn archive_upload(src: &Path, dir: &Path, kind: DatasetKind, date: NaiveDate) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create archive dir {:?}", dir))?;
    let dest = dir.join(archive_name(kind, date));

    // rename fails across filesystems (uploads live in a temp dir)
    if fs::rename(src, &dest).is_err() {
        fs::copy(src, &dest)
            .with_context(|| format!("Failed to archive {:?} to {:?}", src, dest))?;
        fs::remove_file(src).with_context(|| format!("Failed to remove {:?}", src))?;
    }

    set_readable(&dest)?;
    info!(from = ?src, to = ?dest, "snapshot archived");

    Ok(dest)
}

/// Copy a file into the archive, leaving the source in place
pub fn archive_copy(src: &Path, dir: &Path, kind: DatasetKind, date: NaiveDate) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create archive dir {:?}", dir))?;
    let dest = dir.join(archive_name(kind, date));

    fs::copy(src, &dest).with_context(|| format!("Failed to archive {:?} to {:?}", src, dest))?;
    set_readable(&dest)?;
    info!(from = ?src, to = ?dest, "snapshot archived");

    Ok(dest)
}

#[cfg(unix)]
fn set_readable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o644))
        .with_context(|| format!("Failed to set permissions on {:?}", path))
}

#[cfg(not(unix))]
fn set_readable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Newest archived snapshot of a dataset, by modification time
pub fn most_recent(dir: &Path, kind: DatasetKind) -> Result<Option<PathBuf>> {
    if !dir.exists() {
        return Ok(None);
    }

    let prefix = format!("{}.csv.", archive_prefix(kind));
    let mut candidates = Vec::new();

    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read archive dir {:?}", dir))? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(&prefix) {
            continue;
        }

        let modified = entry.metadata()?.modified()?;
        candidates.push((modified, name, entry.path()));
    }

    candidates.sort();
    Ok(candidates.pop().map(|(_, _, path)| path))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_names() {
        let day = date(2024, 3, 7);
        assert_eq!(archive_name(DatasetKind::PropertyOwners, day), "po.csv.2024-03-07");
        assert_eq!(diff_filename(DatasetKind::BusinessLicenses, day), "differencesBL.2024-03-07.csv");
        assert_eq!(
            removed_cache_path(Path::new("/srv"), DatasetKind::PropertyOwners),
            PathBuf::from("/srv/removed_cache_PO.csv")
        );
    }

    #[test]
    fn test_archive_and_most_recent() {
        let uploads = tempfile::tempdir().unwrap();
        let archive = tempfile::tempdir().unwrap();

        assert_eq!(most_recent(archive.path(), DatasetKind::PropertyOwners).unwrap(), None);

        let first = uploads.path().join("first.csv");
        fs::write(&first, "a").unwrap();
        archive_upload(&first, archive.path(), DatasetKind::PropertyOwners, date(2024, 1, 1)).unwrap();

        let second = uploads.path().join("second.csv");
        fs::write(&second, "b").unwrap();
        let dest =
            archive_upload(&second, archive.path(), DatasetKind::PropertyOwners, date(2024, 2, 1)).unwrap();

        assert!(!second.exists());
        assert_eq!(fs::read_to_string(&dest).unwrap(), "b");

        let latest = most_recent(archive.path(), DatasetKind::PropertyOwners).unwrap().unwrap();
        assert_eq!(latest, dest);

        // Other dataset has no snapshots yet
        assert_eq!(most_recent(archive.path(), DatasetKind::BusinessLicenses).unwrap(), None);
    }

    #[test]
    fn test_archive_copy_keeps_source() {
        let uploads = tempfile::tempdir().unwrap();
        let archive = tempfile::tempdir().unwrap();

        let src = uploads.path().join("bl.csv");
        fs::write(&src, "x").unwrap();
        let dest = archive_copy(&src, archive.path(), DatasetKind::BusinessLicenses, date(2024, 5, 1)).unwrap();

        assert!(src.exists());
        assert_eq!(dest.file_name().unwrap(), "bl.csv.2024-05-01");
    }

    #[test]
    fn test_most_recent_missing_dir() {
        let result = most_recent(Path::new("/nonexistent/archive"), DatasetKind::BusinessLicenses).unwrap();
        assert!(result.is_none());
    }
}
