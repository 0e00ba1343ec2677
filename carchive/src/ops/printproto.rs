use std::fmt::Debug;
use std::path::Path;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use cbase::{Problem, ProblemResult, Result, Stamp};

use crate::archive::{ArchiveHead, ARCHIVE_HEAD_NAME};
use crate::band::{BandHead, BandTail, BAND_HEAD_NAME, BAND_TAIL_NAME};
use crate::block::{parse_block_filename, BlockFile, BlockIndex};
use crate::record::{read_record, RecordKind};

/// What an archive file holds, judging by its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Record(RecordKind),
    /// Compressed block content, which has no record to print
    DataFile,
    Unknown,
}

pub fn file_kind(path: &Path) -> FileKind {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name,
        None => return FileKind::Unknown,
    };

    match name {
        ARCHIVE_HEAD_NAME => FileKind::Record(RecordKind::ArchiveHead),
        BAND_HEAD_NAME => FileKind::Record(RecordKind::BandHead),
        BAND_TAIL_NAME => FileKind::Record(RecordKind::BandTail),
        _ => match parse_block_filename(name) {
            Some(BlockFile::Index(_)) => FileKind::Record(RecordKind::BlockIndex),
            Some(BlockFile::Data(_)) => FileKind::DataFile,
            None => FileKind::Unknown,
        },
    }
}

fn stamp_time(unixtime: i64) -> String {
    OffsetDateTime::from_unix_timestamp(unixtime)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| unixtime.to_string())
}

fn describe<T: Debug>(record: &T, stamp: &Stamp) -> String {
    format!(
        "{:#?}\n# written {} by {} running conserve {}\n",
        record,
        stamp_time(stamp.unixtime),
        stamp.hostname,
        stamp.software_version
    )
}

/// Render the record stored at `path` as text.
pub fn printproto(path: &Path) -> Result<String> {
    match file_kind(path) {
        FileKind::Record(RecordKind::ArchiveHead) => {
            let head: ArchiveHead = read_record(path)?;
            Ok(describe(&head, &head.stamp))
        }
        FileKind::Record(RecordKind::BandHead) => {
            let head: BandHead = read_record(path)?;
            Ok(describe(&head, &head.stamp))
        }
        FileKind::Record(RecordKind::BandTail) => {
            let tail: BandTail = read_record(path)?;
            Ok(describe(&tail, &tail.stamp))
        }
        FileKind::Record(RecordKind::BlockIndex) => {
            let index: BlockIndex = read_record(path)?;
            Ok(describe(&index, &index.stamp))
        }
        FileKind::DataFile => Problem::new("printproto", "file", ProblemResult::WrongType)
            .path(path)
            .os_error("block data files don't hold a record")
            .signal(),
        FileKind::Unknown => Problem::new("printproto", "file", ProblemResult::WrongType)
            .path(path)
            .os_error("can't tell the record type from the file name")
            .signal(),
    }
}

#[cfg(test)]
mod test_printproto {
    use super::*;
    use crate::archive::Archive;
    use crate::band::BandId;
    use crate::ops::backup::{backup, BackupOptions};
    use crate::test_fixtures::write_file;
    use tempfile::TempDir;

    #[test]
    fn kinds_from_names() {
        assert_eq!(
            file_kind(Path::new("x/CONSERVE-ARCHIVE")),
            FileKind::Record(RecordKind::ArchiveHead)
        );
        assert_eq!(file_kind(Path::new("b0000/BAND-HEAD")), FileKind::Record(RecordKind::BandHead));
        assert_eq!(file_kind(Path::new("BAND-TAIL")), FileKind::Record(RecordKind::BandTail));
        assert_eq!(file_kind(Path::new("a000012")), FileKind::Record(RecordKind::BlockIndex));
        assert_eq!(file_kind(Path::new("d000012")), FileKind::DataFile);
        assert_eq!(file_kind(Path::new("a12")), FileKind::Unknown);
        assert_eq!(file_kind(Path::new("notes.txt")), FileKind::Unknown);
        assert_eq!(file_kind(Path::new("/")), FileKind::Unknown);
    }

    #[test]
    fn stamp_times() {
        assert_eq!(stamp_time(0), "1970-01-01T00:00:00Z");
        assert_eq!(stamp_time(1_000_000_000), "2001-09-09T01:46:40Z");
    }

    #[test]
    fn prints_every_record() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        write_file(&src, "hello.txt", b"hello");
        let archive = Archive::create(&tmp.path().join("archive")).unwrap();
        let options = BackupOptions {
            base_dir: Some(src),
            ..BackupOptions::default()
        };
        backup(&["hello.txt"], archive.base_dir(), &options).unwrap();

        let text = printproto(&archive.base_dir().join(ARCHIVE_HEAD_NAME)).unwrap();
        assert!(text.starts_with("ArchiveHead {"));
        assert!(text.contains("\"conserve archive\""));
        assert!(text.contains("# written "));

        let band_dir = archive.band_directory(BandId::ZERO);
        let text = printproto(&band_dir.join(BAND_HEAD_NAME)).unwrap();
        assert!(text.contains("band_number: \"0000\""));
        let text = printproto(&band_dir.join(BAND_TAIL_NAME)).unwrap();
        assert!(text.contains("block_count: 1"));
        let text = printproto(&band_dir.join("a000000")).unwrap();
        assert!(text.contains("\"hello.txt\""));
        assert!(text.contains("data_length: 5"));
    }

    #[test]
    fn data_and_unknown_files_are_refused() {
        let tmp = TempDir::new().unwrap();
        let data = write_file(tmp.path(), "d000000", b"");
        let other = write_file(tmp.path(), "README", b"");

        let err = printproto(&data).unwrap_err();
        assert_eq!(err.problem().unwrap().shortform(), "printproto.file.wrong-type");
        let err = printproto(&other).unwrap_err();
        assert_eq!(err.result(), Some(ProblemResult::WrongType));
    }

    #[test]
    fn missing_record() {
        let tmp = TempDir::new().unwrap();

        let err = printproto(&tmp.path().join(BAND_TAIL_NAME)).unwrap_err();
        assert_eq!(err.problem().unwrap().shortform(), "band.tail.missing");
    }
}
