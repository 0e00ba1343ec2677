//! The archive commands, one function each.

use std::path::Path;

use cbase::Result;

use crate::archive::Archive;

pub mod backup;
pub mod printproto;
pub mod restore;
pub mod validate;

pub use backup::{backup, BackupOptions, BackupStats};
pub use printproto::{file_kind, printproto, FileKind};
pub use restore::{restore, RestoreStats};
pub use validate::{validate, ValidateReport};

/// Make a new, empty archive.
pub fn init(dir: &Path) -> Result<Archive> {
    Archive::create(dir)
}

#[cfg(test)]
mod test_ops {
    use super::*;
    use crate::test_fixtures::{pattern, write_file};
    use cbase::ProblemResult;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn backup_restore_validate() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        write_file(&src, "fileA", b"hello\n");
        write_file(&src, "fileB", &pattern(200_000));

        let archive_dir = tmp.path().join("archive");
        init(&archive_dir).unwrap();

        let options = BackupOptions {
            base_dir: Some(src.clone()),
            ..BackupOptions::default()
        };
        let stats = backup(&["fileA", "fileB"], &archive_dir, &options).unwrap();
        assert_eq!(stats.files, 2);
        assert_eq!(stats.plain_bytes, 200_006);

        let out = tmp.path().join("outDir");
        let restored = restore(&archive_dir, &out).unwrap();
        assert_eq!(restored.files, 2);
        for name in ["fileA", "fileB"] {
            assert_eq!(fs::read(out.join(name)).unwrap(), fs::read(src.join(name)).unwrap());
        }

        let report = validate(&archive_dir).unwrap();
        assert!(!report.has_problems(), "{:?}", report.problems);
        assert_eq!(report.files, 2);
    }

    #[test]
    fn init_twice() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("archive");
        init(&dir).unwrap();

        let err = init(&dir).unwrap_err();
        assert_eq!(err.result(), Some(ProblemResult::AlreadyExists));
    }

    #[test]
    fn backup_needs_archive() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "a", b"a");
        let options = BackupOptions {
            base_dir: Some(tmp.path().to_path_buf()),
            ..BackupOptions::default()
        };

        let err = backup(&["a"], &tmp.path().join("archive"), &options).unwrap_err();
        assert_eq!(err.problem().unwrap().shortform(), "archive.head.unreadable");
    }
}
