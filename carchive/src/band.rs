//! Bands: one backup run each.
//!
//! A band directory `bNNNN` holds a head record written when the run starts,
//! the run's blocks, and a tail record written only when the run finished
//! cleanly. A head without a tail means the run was interrupted.
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use cbase::{Error, Problem, ProblemResult, Result, Stamp};

use crate::archive::Archive;
use crate::block::{BlockReader, BlockWriter};
use crate::codec::DEFAULT_COMPRESSION_LEVEL;
use crate::record::{read_record, write_record, Record, RecordKind};

pub const BAND_HEAD_NAME: &str = "BAND-HEAD";
pub const BAND_TAIL_NAME: &str = "BAND-TAIL";

/// Sequential band number, shown zero-padded to four digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BandId(u32);

impl BandId {
    pub const ZERO: BandId = BandId(0);

    pub fn new(number: u32) -> BandId {
        BandId(number)
    }

    pub fn number(&self) -> u32 {
        self.0
    }

    /// The following band number, or `None` once numbers run out.
    pub fn next(&self) -> Option<BandId> {
        self.0.checked_add(1).map(BandId)
    }

    pub fn dir_name(&self) -> String {
        format!("b{}", self)
    }

    /// Recognize a `bNNNN` band directory name, in exactly the form
    /// [`BandId::dir_name`] produces.
    pub fn from_dir_name(name: &str) -> Option<BandId> {
        let digits = name.strip_prefix('b')?;
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let id = BandId(digits.parse().ok()?);
        if id.dir_name() == name {
            Some(id)
        } else {
            None
        }
    }
}

impl fmt::Display for BandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandHead {
    pub band_number: String,
    pub start_unixtime: i64,
    pub source_hostname: String,
    pub stamp: Stamp,
}

impl Record for BandHead {
    const KIND: RecordKind = RecordKind::BandHead;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandTail {
    pub band_number: String,
    pub end_unixtime: i64,
    pub block_count: i32,
    pub stamp: Stamp,
}

impl Record for BandTail {
    const KIND: RecordKind = RecordKind::BandTail;
}

/// Where a band lives, shared by the reader and writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandDescriptor {
    id: BandId,
    directory: PathBuf,
}

impl BandDescriptor {
    pub fn new(archive: &Archive, id: BandId) -> Self {
        BandDescriptor {
            id,
            directory: archive.band_directory(id),
        }
    }

    pub fn id(&self) -> BandId {
        self.id
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn head_path(&self) -> PathBuf {
        self.directory.join(BAND_HEAD_NAME)
    }

    pub fn tail_path(&self) -> PathBuf {
        self.directory.join(BAND_TAIL_NAME)
    }
}

/// Holds an open, writable band.
///
/// Blocks are allocated from it one after another; once every block is
/// finished, [`BandWriter::finish`] closes the band.
pub struct BandWriter {
    desc: BandDescriptor,
    next_block_number: u32,
    compression_level: i32,
}

impl BandWriter {
    pub fn new(archive: &Archive, id: BandId) -> Self {
        BandWriter {
            desc: BandDescriptor::new(archive, id),
            next_block_number: 0,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }

    pub fn descriptor(&self) -> &BandDescriptor {
        &self.desc
    }

    pub fn id(&self) -> BandId {
        self.desc.id()
    }

    pub fn directory(&self) -> &Path {
        self.desc.directory()
    }

    pub fn set_compression_level(&mut self, level: i32) {
        self.compression_level = level;
    }

    /// Create the band directory and write its head.
    pub fn start(&mut self) -> Result<()> {
        let directory = self.desc.directory();
        match fs::create_dir(directory) {
            Ok(()) => (),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Problem::new("band", "directory", ProblemResult::AlreadyExists)
                    .path(directory)
                    .os_error(e)
                    .signal();
            }
            Err(e) => return Err(Error::io(directory, e)),
        }

        let stamp = Stamp::now();
        let head = BandHead {
            band_number: self.desc.id().to_string(),
            start_unixtime: stamp.unixtime,
            source_hostname: stamp.hostname.clone(),
            stamp,
        };
        write_record(&head, &self.desc.head_path())?;
        info!("start band {} in {}", self.desc.id(), directory.display());
        Ok(())
    }

    /// Numbers are handed out once each, even if the block is never finished.
    pub fn next_block_number(&mut self) -> u32 {
        let number = self.next_block_number;
        self.next_block_number += 1;
        number
    }

    pub fn start_block(&mut self) -> Result<BlockWriter> {
        let number = self.next_block_number();
        BlockWriter::create(self.desc.directory(), number, self.compression_level)
    }

    /// Write the tail, marking the band complete.
    pub fn finish(self) -> Result<BandId> {
        let tail_path = self.desc.tail_path();
        let block_count = match i32::try_from(self.next_block_number) {
            Ok(count) => count,
            Err(e) => {
                return Problem::new("band", "tail", ProblemResult::Corrupt)
                    .path(&tail_path)
                    .os_error(e)
                    .signal();
            }
        };

        let stamp = Stamp::now();
        let tail = BandTail {
            band_number: self.desc.id().to_string(),
            end_unixtime: stamp.unixtime,
            block_count,
            stamp,
        };
        write_record(&tail, &tail_path)?;
        info!("finish band in {}", self.desc.directory().display());
        Ok(self.desc.id())
    }
}

/// Scans through a complete band, one block at a time, in order.
pub struct BandReader {
    desc: BandDescriptor,
    head: BandHead,
    tail: BandTail,
    blocks_read: u32,
}

impl BandReader {
    pub fn open(archive: &Archive, id: BandId) -> Result<BandReader> {
        let desc = BandDescriptor::new(archive, id);
        let head: BandHead = read_record(&desc.head_path())?;

        let tail: BandTail = match read_record(&desc.tail_path()) {
            Ok(tail) => tail,
            Err(e) if e.result() == Some(ProblemResult::Missing) => {
                return Problem::new("band", "tail", ProblemResult::Incomplete)
                    .path(desc.tail_path())
                    .os_error("band has a head but no tail")
                    .signal();
            }
            Err(e) => return Err(e),
        };

        if head.band_number != tail.band_number {
            return Problem::new("band", "tail", ProblemResult::Inconsistent)
                .path(desc.tail_path())
                .os_error(format!(
                    "head band number {:?} but tail band number {:?}",
                    head.band_number, tail.band_number
                ))
                .signal();
        }
        if head.band_number != id.to_string() {
            return Problem::new("band", "head", ProblemResult::Inconsistent)
                .path(desc.head_path())
                .os_error(format!("band number {:?} in {}", head.band_number, id.dir_name()))
                .signal();
        }
        if tail.block_count < 0 {
            return Problem::new("band", "tail", ProblemResult::Corrupt)
                .path(desc.tail_path())
                .os_error(format!("negative block count {}", tail.block_count))
                .signal();
        }

        info!("start reading band {}", head.band_number);
        Ok(BandReader {
            desc,
            head,
            tail,
            blocks_read: 0,
        })
    }

    pub fn id(&self) -> BandId {
        self.desc.id()
    }

    pub fn directory(&self) -> &Path {
        self.desc.directory()
    }

    pub fn head(&self) -> &BandHead {
        &self.head
    }

    pub fn tail(&self) -> &BandTail {
        &self.tail
    }

    pub fn block_count(&self) -> u32 {
        self.tail.block_count as u32
    }

    pub fn done(&self) -> bool {
        self.blocks_read >= self.block_count()
    }

    /// Number of the block most recently handed out, if any.
    pub fn current_block_number(&self) -> Option<u32> {
        self.blocks_read.checked_sub(1)
    }

    /// Open the next block in sequence.
    ///
    /// The position moves on even if the block can't be opened, so a caller
    /// can note the problem and carry on with the following block.
    pub fn read_next_block(&mut self) -> Result<BlockReader> {
        if self.done() {
            return Problem::new("band", "block", ProblemResult::OutOfOrder)
                .path(self.desc.directory())
                .os_error(format!("all {} blocks already read", self.block_count()))
                .signal();
        }
        let number = self.blocks_read;
        self.blocks_read += 1;
        BlockReader::open(self.desc.directory(), number)
    }
}
