use std::path::Path;

use log::{info, warn};

use cbase::{Error, Problem, ProblemResult, Result};

use crate::archive::Archive;
use crate::band::{BandId, BandReader};
use crate::block::{BlockReader, FileType};

/// Everything `validate` found, good and bad.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidateReport {
    pub problems: Vec<Problem>,
    pub bands: usize,
    pub blocks: usize,
    pub files: usize,
    pub bytes: u64,
}

impl ValidateReport {
    pub fn has_problems(&self) -> bool {
        !self.problems.is_empty()
    }

    fn add(&mut self, problem: Problem) {
        problem.log();
        self.problems.push(problem);
    }

    /// Keep a problem and carry on; anything else stops the scan.
    fn note<T>(&mut self, result: Result<T>) -> Result<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(Error::Problem(p)) => {
                self.problems.push(p);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Read every band and block in the archive and check it all hangs together.
///
/// Structural problems are collected in the report rather than returned, so
/// one damaged block doesn't hide problems in the rest of the archive. OS
/// errors still stop the scan.
pub fn validate(archive_dir: &Path) -> Result<ValidateReport> {
    let archive = Archive::open(archive_dir)?;
    let mut report = ValidateReport::default();

    for id in archive.list_bands()? {
        validate_band(&archive, id, &mut report)?;
    }

    if report.has_problems() {
        warn!("{} problems found in {}", report.problems.len(), archive_dir.display());
    } else {
        info!(
            "validated {} bands, {} blocks, {} files",
            report.bands, report.blocks, report.files
        );
    }
    Ok(report)
}

fn validate_band(archive: &Archive, id: BandId, report: &mut ValidateReport) -> Result<()> {
    let mut band = match report.note(BandReader::open(archive, id))? {
        Some(band) => band,
        None => return Ok(()),
    };
    report.bands += 1;

    while !band.done() {
        if let Some(mut block) = report.note(band.read_next_block())? {
            validate_block(&mut block, report)?;
            report.blocks += 1;
        }
    }
    Ok(())
}

fn validate_block(block: &mut BlockReader, report: &mut ValidateReport) -> Result<()> {
    let index_compression = block.index().compression;
    let index_path = block.descriptor().index_path().to_path_buf();

    while let Some(entry) = block.file_entry() {
        let entry = entry.clone();

        if entry.file_type != FileType::Regular {
            report.add(
                Problem::new("block", "index", ProblemResult::WrongType)
                    .path(&index_path)
                    .os_error(format!("{} is a {:?}", entry.path, entry.file_type)),
            );
        }
        if entry.compression != index_compression {
            report.add(
                Problem::new("block", "index", ProblemResult::Inconsistent)
                    .path(&index_path)
                    .os_error(format!(
                        "{} compressed with {:?} in a {:?} block",
                        entry.path, entry.compression, index_compression
                    )),
            );
        }

        match block.verify_file() {
            Ok(()) => (),
            Err(Error::Problem(p)) if p.result == ProblemResult::HashMismatch => {
                // The stream is still in step, so the rest of the block can be checked
                report.problems.push(p);
            }
            Err(Error::Problem(p)) => {
                report.problems.push(p);
                return Ok(());
            }
            Err(e) => return Err(e),
        }
        report.files += 1;
        report.bytes += entry.data_length;
        block.advance()?;
    }

    report.note(block.check_end())?;
    Ok(())
}
