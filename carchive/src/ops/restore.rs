use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use log::{info, warn};

use cbase::{Error, IoContext, Problem, ProblemResult, Result};

use crate::archive::Archive;
use crate::band::{BandId, BandReader};
use crate::block::FileType;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RestoreStats {
    pub band: Option<BandId>,
    pub files: usize,
    pub blocks: usize,
    pub skipped: usize,
    pub bytes: u64,
}

/// Restore the most recently completed band of the archive into `dest_dir`,
/// which must not exist yet.
pub fn restore(archive_dir: &Path, dest_dir: &Path) -> Result<RestoreStats> {
    let archive = Archive::open(archive_dir)?;
    let id = match archive.last_band_name()? {
        Some(id) => id,
        None => {
            return Problem::new("archive", "band", ProblemResult::Missing)
                .path(archive_dir)
                .os_error("archive has no complete bands to restore")
                .signal();
        }
    };
    for newer in archive.list_bands()?.into_iter().filter(|b| *b > id) {
        warn!("skipping incomplete band {} in favor of {}", newer, id);
    }
    let mut band = BandReader::open(&archive, id)?;

    match fs::create_dir(dest_dir) {
        Ok(()) => (),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Problem::new("restore", "dest", ProblemResult::AlreadyExists)
                .path(dest_dir)
                .os_error(e)
                .signal();
        }
        Err(e) => return Err(Error::io(dest_dir, e)),
    }

    let mut stats = RestoreStats {
        band: Some(id),
        ..RestoreStats::default()
    };

    while !band.done() {
        let mut block = band.read_next_block()?;
        while let Some(entry) = block.file_entry() {
            let entry = entry.clone();
            if entry.file_type != FileType::Regular {
                info!("SKIP {:?}: {}", entry.file_type, entry.path);
                stats.skipped += 1;
                block.advance()?;
                continue;
            }

            let restore_path = entry.path.below(dest_dir);
            if let Some(parent) = restore_path.parent() {
                fs::create_dir_all(parent).with_path(parent)?;
            }
            info!("RESTORE: {}", entry.path);
            block.restore_file(&restore_path)?;
            block.advance()?;

            stats.files += 1;
            stats.bytes += entry.data_length;
        }
        block.check_end()?;
        stats.blocks += 1;
    }

    Ok(stats)
}
