//! Blocks: a compressed data file plus the index describing what's in it.
//!
//! Within a band, block `N` owns two files: the index `aNNNNNN` and the data
//! `dNNNNNN`. The index is only written once the data stream has been fully
//! flushed, so an index on disk means its data file is structurally complete.
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use cbase::buf::{fill_buf, COPY_BUF_SIZE};
use cbase::hash::{ContentHash, ContentHasher};
use cbase::{Apath, Error, IoContext, Problem, ProblemResult, Result, Stamp};

use crate::codec::{DataReader, DataWriter};
use crate::record::{read_record, write_record, Record, RecordKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    Regular,
    Directory,
    Symlink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compression {
    Zstd,
}

/// One stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: Apath,
    /// Plaintext length of the content in the data stream
    pub data_length: u64,
    pub file_type: FileType,
    pub compression: Compression,
    pub content_hash: ContentHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockIndex {
    pub files: Vec<FileEntry>,
    pub compression: Compression,
    pub stamp: Stamp,
}

impl Record for BlockIndex {
    const KIND: RecordKind = RecordKind::BlockIndex;
}

pub fn index_filename(block_number: u32) -> String {
    format!("a{:06}", block_number)
}

pub fn data_filename(block_number: u32) -> String {
    format!("d{:06}", block_number)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockFile {
    Index(u32),
    Data(u32),
}

/// Recognize `aNNNNNN` and `dNNNNNN` block file names.
pub fn parse_block_filename(name: &str) -> Option<BlockFile> {
    let kind = name.get(..1)?;
    let digits = name.get(1..)?;
    if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let number = digits.parse().ok()?;
    match kind {
        "a" => Some(BlockFile::Index(number)),
        "d" => Some(BlockFile::Data(number)),
        _ => None,
    }
}

/// Location of a block on disk, shared by the reader and writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDescriptor {
    directory: PathBuf,
    number: u32,
    index_path: PathBuf,
    data_path: PathBuf,
}

impl BlockDescriptor {
    pub fn new(directory: &Path, number: u32) -> Self {
        BlockDescriptor {
            directory: directory.to_path_buf(),
            number,
            index_path: directory.join(index_filename(number)),
            data_path: directory.join(data_filename(number)),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockStats {
    pub files: usize,
    pub plain_bytes: u64,
    pub compressed_bytes: u64,
}

pub struct BlockWriter {
    desc: BlockDescriptor,
    data: DataWriter,
    files: Vec<FileEntry>,
    buf: Vec<u8>,
    /// Set once a file failed partway, leaving content with no entry
    failed: bool,
}

impl BlockWriter {
    /// Start a new block; its data file must not already exist.
    pub fn create(directory: &Path, number: u32, compression_level: i32) -> Result<BlockWriter> {
        let desc = BlockDescriptor::new(directory, number);
        let data = DataWriter::create(desc.data_path(), compression_level)?;
        debug!("start block {} in {}", number, directory.display());

        Ok(BlockWriter {
            desc,
            data,
            files: Vec::new(),
            buf: vec![0; COPY_BUF_SIZE],
            failed: false,
        })
    }

    pub fn descriptor(&self) -> &BlockDescriptor {
        &self.desc
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn plain_bytes(&self) -> u64 {
        self.data.plain_bytes()
    }

    /// Store a file under the apath derived from its own path.
    pub fn add_file<P: AsRef<Path>>(&mut self, source_path: P) -> Result<()> {
        let source_path = source_path.as_ref();
        let apath = Apath::from_path(source_path)?;
        self.add_file_as(source_path, apath)
    }

    /// Store the content of `source_path` under `apath`.
    ///
    /// `apath` must sort strictly after every path already in the block.
    pub fn add_file_as(&mut self, source_path: &Path, apath: Apath) -> Result<()> {
        self.check_not_failed()?;
        if let Some(last) = self.files.last() {
            if apath <= last.path {
                return Problem::new("block", "index", ProblemResult::OutOfOrder)
                    .path(source_path)
                    .os_error(format!("{} does not sort after {}", apath, last.path))
                    .signal();
            }
        }

        let mut source = File::open(source_path).with_path(source_path)?;
        self.store(&mut source, source_path, apath)
    }

    /// Stream `source` into the data file and record its entry.
    fn store<R: Read>(&mut self, source: &mut R, source_path: &Path, apath: Apath) -> Result<()> {
        let mut hasher = ContentHasher::new();
        let mut data_length = 0u64;
        loop {
            let filled = fill_buf(source, &mut self.buf).with_path(source_path);
            let len = match filled {
                Ok((true, 0)) => break,
                Ok((_, len)) => len,
                Err(e) => {
                    self.failed = data_length > 0;
                    return Err(e);
                }
            };
            if let Err(e) = self.data.append(&self.buf[..len]) {
                self.failed = true;
                return Err(e);
            }
            hasher.update(&self.buf[..len]);
            data_length += len as u64;
        }

        debug!("stored {} ({} bytes) in block {}", apath, data_length, self.desc.number());
        self.files.push(FileEntry {
            path: apath,
            data_length,
            file_type: FileType::Regular,
            compression: Compression::Zstd,
            content_hash: hasher.finalize(),
        });
        Ok(())
    }

    fn check_not_failed(&self) -> Result<()> {
        if self.failed {
            Problem::new("block", "data", ProblemResult::Corrupt)
                .path(self.desc.data_path())
                .os_error("an earlier file failed partway through the data stream")
                .signal()
        } else {
            Ok(())
        }
    }

    /// Close the data stream, then write the index.
    ///
    /// A block that had a file fail partway is refused, leaving no index.
    pub fn finish(self) -> Result<BlockStats> {
        self.check_not_failed()?;
        let BlockWriter { desc, data, files, .. } = self;
        let data_stats = data.finish()?;

        let index = BlockIndex {
            files,
            compression: Compression::Zstd,
            stamp: Stamp::now(),
        };
        write_record(&index, desc.index_path())?;
        info!("write block index in {}", desc.index_path().display());

        Ok(BlockStats {
            files: index.files.len(),
            plain_bytes: data_stats.plain_bytes,
            compressed_bytes: data_stats.compressed_bytes,
        })
    }
}

/// Replays a block's entries in index order.
///
/// Content comes off a forward-only stream, so each entry's data can be taken
/// once, in order. Advancing past an entry whose data wasn't taken reads it
/// off and drops it to keep the stream lined up with the index.
pub struct BlockReader {
    desc: BlockDescriptor,
    index: BlockIndex,
    data: DataReader,
    file_number: usize,
    consumed: bool,
}

impl BlockReader {
    pub fn open(directory: &Path, number: u32) -> Result<BlockReader> {
        let desc = BlockDescriptor::new(directory, number);
        let index: BlockIndex = read_record(desc.index_path())?;
        check_index(&index, desc.index_path())?;
        let data = DataReader::open(desc.data_path())?;
        debug!("open block {} with {} files", number, index.files.len());

        Ok(BlockReader {
            desc,
            index,
            data,
            file_number: 0,
            consumed: false,
        })
    }

    pub fn descriptor(&self) -> &BlockDescriptor {
        &self.desc
    }

    pub fn index(&self) -> &BlockIndex {
        &self.index
    }

    pub fn file_index(&self) -> usize {
        self.file_number
    }

    pub fn done(&self) -> bool {
        self.file_number >= self.index.files.len()
    }

    pub fn file_entry(&self) -> Option<&FileEntry> {
        self.index.files.get(self.file_number)
    }

    pub fn file_path(&self) -> Option<&Apath> {
        self.file_entry().map(|entry| &entry.path)
    }

    /// Move to the next entry.
    pub fn advance(&mut self) -> Result<()> {
        if self.done() {
            return Ok(());
        }
        if !self.consumed {
            let data_length = self.index.files[self.file_number].data_length;
            self.data.skip(data_length)?;
        }
        self.file_number += 1;
        self.consumed = false;
        Ok(())
    }

    fn take_current(&mut self) -> Result<FileEntry> {
        let entry = match self.index.files.get(self.file_number) {
            Some(entry) => entry.clone(),
            None => {
                return Problem::new("block", "index", ProblemResult::OutOfOrder)
                    .path(self.desc.index_path())
                    .os_error("no current file, block is done")
                    .signal();
            }
        };
        if self.consumed {
            return Problem::new("block", "data", ProblemResult::OutOfOrder)
                .path(self.desc.data_path())
                .os_error(format!("data for {} was already read", entry.path))
                .signal();
        }
        self.consumed = true;
        Ok(entry)
    }

    fn check_hash(&self, entry: &FileEntry, actual: ContentHash) -> Result<()> {
        if actual == entry.content_hash {
            Ok(())
        } else {
            Problem::new("block", "data", ProblemResult::HashMismatch)
                .path(self.desc.data_path())
                .os_error(format!(
                    "{}: stored hash {} but content hashes to {}",
                    entry.path, entry.content_hash, actual
                ))
                .signal()
        }
    }

    /// Write the current entry's content into a new file at `restore_path`.
    ///
    /// The file is created exclusively: an existing file or symlink at that
    /// path is never followed or overwritten.
    pub fn restore_file(&mut self, restore_path: &Path) -> Result<()> {
        let entry = self.take_current()?;

        let file = match OpenOptions::new().write(true).create_new(true).open(restore_path) {
            Ok(f) => f,
            Err(e) => {
                // Keep the stream in step for whoever carries on
                self.data.skip(entry.data_length)?;
                if e.kind() == ErrorKind::AlreadyExists {
                    return Problem::new("restore", "file", ProblemResult::AlreadyExists)
                        .path(restore_path)
                        .os_error(e)
                        .signal();
                }
                return Err(Error::io(restore_path, e));
            }
        };

        info!(
            "attempt to restore {} bytes to {}",
            entry.data_length,
            restore_path.display()
        );
        let mut out = BufWriter::new(file);
        let actual = self
            .data
            .extract_with(entry.data_length, |data| out.write_all(data).with_path(restore_path))?;
        let file = out
            .into_inner()
            .map_err(|e| Error::io(restore_path, e.into_error()))?;
        file.sync_all().with_path(restore_path)?;

        self.check_hash(&entry, actual)
    }

    /// Read the current entry's content and check it against its length and hash.
    pub fn verify_file(&mut self) -> Result<()> {
        let entry = self.take_current()?;
        let actual = self.data.skip(entry.data_length)?;
        self.check_hash(&entry, actual)
    }

    /// Once every entry is done, check the data stream ends right there.
    pub fn check_end(&mut self) -> Result<()> {
        while !self.done() {
            self.advance()?;
        }
        if self.data.at_end()? {
            Ok(())
        } else {
            Problem::new("block", "data", ProblemResult::Corrupt)
                .path(self.desc.data_path())
                .os_error("data continues past the last indexed file")
                .signal()
        }
    }
}

/// Every stored path must be well formed and sort strictly after the one before.
fn check_index(index: &BlockIndex, index_path: &Path) -> Result<()> {
    let mut last: Option<&Apath> = None;

    for entry in &index.files {
        if !entry.path.is_valid() {
            return Problem::new("block", "index", ProblemResult::BadPath)
                .path(index_path)
                .os_error(format!("invalid stored path {:?}", entry.path.components()))
                .signal();
        }
        if let Some(last) = last {
            if entry.path <= *last {
                return Problem::new("block", "index", ProblemResult::OutOfOrder)
                    .path(index_path)
                    .os_error(format!("{} does not sort after {}", entry.path, last))
                    .signal();
            }
        }
        last = Some(&entry.path);
    }
    Ok(())
}
