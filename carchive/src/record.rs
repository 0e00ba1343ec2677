//! Structured record files
//!
//! Every metadata file in an archive (archive head, band head and tail, block
//! index) holds exactly one frame. The frame layout borrows from PNG chunks:
//! a length and type up front with their own checksum, so that a torn or
//! truncated write is caught before the payload is even looked at. Everything
//! is little endian.
//!
//! | Type    | Name            | Description |
//! | ------: | --------------- | ----------- |
//! | u32     | length          | Length of the payload, at most [`MAX_RECORD_SIZE`] |
//! | [u8; 4] | tag             | Record type, see [`RecordKind`] |
//! | u16     | header checksum | xxHash32 of <code>length \|\| tag</code>, truncated |
//! | [u8; N] | payload         | bincode encoding of the record |
//! | u32     | checksum        | xxHash32 of `payload` |
//!
//! Nothing may follow the frame.
use std::fmt::Debug;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, ErrorKind, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use cbase::hash::Checksum;
use cbase::{Error, IoContext, Problem, ProblemResult, Result};

pub const MAX_RECORD_SIZE: usize = 64 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    ArchiveHead,
    BandHead,
    BandTail,
    BlockIndex,
}

impl RecordKind {
    pub fn tag(self) -> &'static [u8; 4] {
        match self {
            RecordKind::ArchiveHead => b"ARCH",
            RecordKind::BandHead => b"BHED",
            RecordKind::BandTail => b"BTAL",
            RecordKind::BlockIndex => b"BIDX",
        }
    }

    /// Object name used when reporting problems with this record.
    pub fn object(self) -> &'static str {
        match self {
            RecordKind::ArchiveHead => "archive",
            RecordKind::BandHead | RecordKind::BandTail => "band",
            RecordKind::BlockIndex => "block",
        }
    }

    pub fn part(self) -> &'static str {
        match self {
            RecordKind::ArchiveHead | RecordKind::BandHead => "head",
            RecordKind::BandTail => "tail",
            RecordKind::BlockIndex => "index",
        }
    }
}

/// A value that is stored on its own in a record file.
pub trait Record: Serialize + DeserializeOwned + Debug {
    const KIND: RecordKind;
}

#[derive(Error, Debug)]
pub enum FrameError {
    #[error(transparent)]
    IO(#[from] io::Error),
    #[error("permitted max record size exceeded")]
    MaxLength,
    #[error("header checksum failed")]
    HeaderChecksum,
    #[error("checksum failed")]
    DataChecksum,
    #[error("unexpected record tag {0:?}")]
    WrongTag([u8; 4]),
    #[error("trailing data after record")]
    TrailingData,
}

fn header_checksum(len: u32, tag: &[u8; 4]) -> u16 {
    let mut hash = Checksum::new();
    hash.update(&len.to_le_bytes());
    hash.update(tag);
    hash.finalize() as u16
}

pub fn write_frame<W: Write>(writer: &mut W, tag: &[u8; 4], data: &[u8]) -> io::Result<usize> {
    if data.len() > MAX_RECORD_SIZE {
        return Err(io::Error::new(ErrorKind::InvalidInput, FrameError::MaxLength));
    }
    let len = data.len() as u32;
    let trailing_hash = {
        let mut hash = Checksum::new();
        hash.update(data);
        hash.finalize()
    };

    writer.write_u32::<LittleEndian>(len)?;
    writer.write_all(tag)?;
    writer.write_u16::<LittleEndian>(header_checksum(len, tag))?;
    writer.write_all(data)?;
    writer.write_u32::<LittleEndian>(trailing_hash)?;

    Ok(4 + 4 + 2 + data.len() + 4)
}

/// Read the single frame in `reader`, which must carry `tag`.
pub fn read_frame<R: Read>(reader: &mut R, tag: &[u8; 4]) -> std::result::Result<Vec<u8>, FrameError> {
    let len = reader.read_u32::<LittleEndian>()?;
    let found = {
        let mut found = [0u8; 4];
        reader.read_exact(&mut found)?;
        found
    };
    let header_hash = reader.read_u16::<LittleEndian>()?;

    if header_checksum(len, &found) != header_hash {
        return Err(FrameError::HeaderChecksum);
    }
    if &found != tag {
        return Err(FrameError::WrongTag(found));
    }
    let len = len as usize;
    if len > MAX_RECORD_SIZE {
        return Err(FrameError::MaxLength);
    }

    let mut data = vec![0; len];
    reader.read_exact(&mut data[..])?;
    let entry_hash = reader.read_u32::<LittleEndian>()?;

    let mut hash = Checksum::new();
    hash.update(&data[..]);
    if hash.finalize() != entry_hash {
        return Err(FrameError::DataChecksum);
    }

    let mut probe = [0u8; 1];
    loop {
        match reader.read(&mut probe) {
            Ok(0) => return Ok(data),
            Ok(_) => return Err(FrameError::TrailingData),
            Err(e) if e.kind() == ErrorKind::Interrupted => (),
            Err(e) => return Err(e.into()),
        }
    }
}

/// Serialize `record` into a new file at `path`.
///
/// The file must not already exist, records are never overwritten.
pub fn write_record<T: Record>(record: &T, path: &Path) -> Result<()> {
    let kind = T::KIND;
    let payload = bincode::serialize(record)
        .map_err(|e| Error::io(path, io::Error::new(ErrorKind::InvalidData, e)))?;

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Problem::new(kind.object(), kind.part(), ProblemResult::AlreadyExists)
                .path(path)
                .os_error(e)
                .signal();
        }
        Err(e) => return Err(Error::io(path, e)),
    };

    let mut frame = Vec::with_capacity(payload.len() + 14);
    write_frame(&mut frame, kind.tag(), &payload).with_path(path)?;
    file.write_all(&frame).with_path(path)?;
    file.sync_all().with_path(path)?;

    debug!("wrote {:?} record of {} bytes to {}", kind, frame.len(), path.display());
    Ok(())
}

/// Read and decode the record stored at `path`.
///
/// A missing file is reported as [`ProblemResult::Missing`], any damage to
/// the frame or payload as [`ProblemResult::Unreadable`].
pub fn read_record<T: Record>(path: &Path) -> Result<T> {
    let kind = T::KIND;
    let unreadable = |detail: String| {
        Problem::new(kind.object(), kind.part(), ProblemResult::Unreadable)
            .path(path)
            .os_error(detail)
            .signal()
    };

    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Problem::new(kind.object(), kind.part(), ProblemResult::Missing)
                .path(path)
                .os_error(e)
                .signal();
        }
        Err(e) => return Err(Error::io(path, e)),
    };

    let payload = match read_frame(&mut BufReader::new(file), kind.tag()) {
        Ok(payload) => payload,
        Err(FrameError::IO(e)) if e.kind() == ErrorKind::UnexpectedEof => {
            return unreadable("record is truncated".to_string());
        }
        Err(FrameError::IO(e)) => return Err(Error::io(path, e)),
        Err(e) => return unreadable(e.to_string()),
    };

    match bincode::deserialize(&payload) {
        Ok(record) => Ok(record),
        Err(e) => unreadable(e.to_string()),
    }
}
