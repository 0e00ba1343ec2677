use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use cbase::{Error, IoContext, Problem, ProblemResult, Result, Stamp};

use crate::band::{BandDescriptor, BandId, BandWriter};
use crate::record::{read_record, write_record, Record, RecordKind};

pub const ARCHIVE_HEAD_NAME: &str = "CONSERVE-ARCHIVE";
pub const ARCHIVE_MAGIC: &str = "conserve archive";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveHead {
    pub magic: String,
    pub stamp: Stamp,
}

impl Record for ArchiveHead {
    const KIND: RecordKind = RecordKind::ArchiveHead;
}

/// An archive directory: a header plus a sequence of bands.
#[derive(Debug)]
pub struct Archive {
    base_dir: PathBuf,
    head: ArchiveHead,
}

impl Archive {
    /// Make a new archive in a directory that must not exist yet.
    pub fn create(base_dir: &Path) -> Result<Archive> {
        info!("create archive in {}", base_dir.display());
        match fs::create_dir(base_dir) {
            Ok(()) => (),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Problem::new("archive", "directory", ProblemResult::AlreadyExists)
                    .path(base_dir)
                    .os_error(e)
                    .signal();
            }
            Err(e) => return Err(Error::io(base_dir, e)),
        }

        let head = ArchiveHead {
            magic: ARCHIVE_MAGIC.to_string(),
            stamp: Stamp::now(),
        };
        write_record(&head, &base_dir.join(ARCHIVE_HEAD_NAME))?;

        Ok(Archive {
            base_dir: base_dir.to_path_buf(),
            head,
        })
    }

    /// Open an existing archive, checking its header.
    pub fn open(base_dir: &Path) -> Result<Archive> {
        info!("open archive in {}", base_dir.display());
        let head_path = base_dir.join(ARCHIVE_HEAD_NAME);

        // Not an archive at all, rather than an archive missing its head
        if let Err(e) = fs::symlink_metadata(&head_path) {
            if e.kind() == ErrorKind::NotFound {
                return Problem::new("archive", "head", ProblemResult::Unreadable)
                    .path(&head_path)
                    .os_error(e)
                    .signal();
            }
        }
        let head: ArchiveHead = read_record(&head_path)?;

        if head.magic != ARCHIVE_MAGIC {
            return Problem::new("archive", "head", ProblemResult::BadMagic)
                .path(&head_path)
                .os_error(format!("wrong magic: {:?}", head.magic))
                .signal();
        }

        Ok(Archive {
            base_dir: base_dir.to_path_buf(),
            head,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn head(&self) -> &ArchiveHead {
        &self.head
    }

    pub fn band_directory(&self, id: BandId) -> PathBuf {
        self.base_dir.join(id.dir_name())
    }

    /// Every band in the archive, complete or not, in order.
    pub fn list_bands(&self) -> Result<Vec<BandId>> {
        let mut bands = Vec::new();
        for entry in fs::read_dir(&self.base_dir).with_path(&self.base_dir)? {
            let entry = entry.with_path(&self.base_dir)?;
            let is_dir = entry.file_type().with_path(entry.path())?.is_dir();
            if let (true, Some(name)) = (is_dir, entry.file_name().to_str()) {
                if let Some(id) = BandId::from_dir_name(name) {
                    bands.push(id);
                }
            }
        }
        bands.sort();
        Ok(bands)
    }

    /// The most recently completed band: the highest numbered one with both
    /// a head and a tail.
    ///
    /// Newer bands left without a tail by an interrupted backup are passed
    /// over here; [`Archive::list_bands`] still finds them.
    pub fn last_band_name(&self) -> Result<Option<BandId>> {
        for id in self.list_bands()?.into_iter().rev() {
            let desc = BandDescriptor::new(self, id);
            if desc.head_path().is_file() && desc.tail_path().is_file() {
                return Ok(Some(id));
            }
            debug!("band {} is not complete", id);
        }
        Ok(None)
    }

    /// Allocate the next band number and start writing it.
    ///
    /// Numbers follow the highest band present, complete or not.
    pub fn start_band(&self) -> Result<BandWriter> {
        let id = match self.list_bands()?.last() {
            None => BandId::ZERO,
            Some(last) => match last.next() {
                Some(id) => id,
                None => {
                    return Problem::new("band", "directory", ProblemResult::Corrupt)
                        .path(self.band_directory(*last))
                        .os_error("no band numbers left after this one")
                        .signal();
                }
            },
        };
        let mut writer = BandWriter::new(self, id);
        writer.start()?;
        Ok(writer)
    }
}
