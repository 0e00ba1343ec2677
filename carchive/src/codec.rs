//! Compressed block data streams
//!
//! A block's data file is a single zstd frame holding the content of every
//! stored file back to back. There is no framing between files; the block
//! index records how many plaintext bytes belong to each, and the reader
//! walks forward through the stream taking exactly that many. Nothing here
//! can seek.
use std::cmp;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use zstd::stream::read::Decoder;
use zstd::stream::write::Encoder;

use cbase::buf::COPY_BUF_SIZE;
use cbase::hash::{ContentHash, ContentHasher};
use cbase::{Error, IoContext, Problem, ProblemResult, Result};

pub const DEFAULT_COMPRESSION_LEVEL: i32 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataStats {
    pub plain_bytes: u64,
    pub compressed_bytes: u64,
}

/// Writes the compressed data file of a block.
///
/// [`DataWriter::finish`] must be called for the stream to be complete. A
/// writer dropped without finishing still closes off the codec and releases
/// the file, but the data file is then considered corrupt.
pub struct DataWriter {
    path: PathBuf,
    encoder: Option<Encoder<'static, BufWriter<File>>>,
    plain_bytes: u64,
}

impl DataWriter {
    pub fn create(path: &Path, compression_level: i32) -> Result<DataWriter> {
        let file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Problem::new("block", "data", ProblemResult::AlreadyExists)
                    .path(path)
                    .os_error(e)
                    .signal();
            }
            Err(e) => return Err(Error::io(path, e)),
        };

        let mut encoder = Encoder::new(BufWriter::new(file), compression_level).with_path(path)?;
        encoder.include_checksum(true).with_path(path)?;

        Ok(DataWriter {
            path: path.to_path_buf(),
            encoder: Some(encoder),
            plain_bytes: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Plaintext bytes appended so far
    pub fn plain_bytes(&self) -> u64 {
        self.plain_bytes
    }

    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        let encoder = match self.encoder.as_mut() {
            Some(encoder) => encoder,
            None => {
                return Err(Error::io(
                    &self.path,
                    io::Error::new(ErrorKind::Other, "data stream already finished"),
                ))
            }
        };
        encoder.write_all(data).with_path(&self.path)?;
        self.plain_bytes += data.len() as u64;
        Ok(())
    }

    /// Write the codec trailer and flush everything through to disk.
    pub fn finish(mut self) -> Result<DataStats> {
        let encoder = match self.encoder.take() {
            Some(encoder) => encoder,
            None => {
                return Err(Error::io(
                    &self.path,
                    io::Error::new(ErrorKind::Other, "data stream already finished"),
                ))
            }
        };

        let writer = encoder.finish().with_path(&self.path)?;
        let file = writer
            .into_inner()
            .map_err(|e| Error::io(&self.path, e.into_error()))?;
        file.sync_all().with_path(&self.path)?;
        let compressed_bytes = file.metadata().with_path(&self.path)?.len();

        debug!(
            "finished data stream {}: {} bytes compressed to {}",
            self.path.display(),
            self.plain_bytes,
            compressed_bytes
        );
        Ok(DataStats {
            plain_bytes: self.plain_bytes,
            compressed_bytes,
        })
    }
}

impl Drop for DataWriter {
    fn drop(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            warn!("data stream {} abandoned before finish", self.path.display());
            match encoder.finish() {
                Ok(mut writer) => {
                    if let Err(e) = writer.flush() {
                        warn!("failed to flush {}: {}", self.path.display(), e);
                    }
                }
                Err(e) => warn!("failed to close codec for {}: {}", self.path.display(), e),
            }
        }
    }
}

/// Reads a block's data file forward, handing out exactly the requested
/// number of decompressed bytes per call.
pub struct DataReader {
    path: PathBuf,
    decoder: Decoder<'static, BufReader<File>>,
    buf: Vec<u8>,
}

impl DataReader {
    pub fn open(path: &Path) -> Result<DataReader> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Problem::new("block", "data", ProblemResult::Missing)
                    .path(path)
                    .os_error(e)
                    .signal();
            }
            Err(e) => return Err(Error::io(path, e)),
        };
        let decoder = Decoder::new(file).with_path(path)?;

        Ok(DataReader {
            path: path.to_path_buf(),
            decoder,
            buf: vec![0; COPY_BUF_SIZE],
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn truncated<T>(&self, detail: String) -> Result<T> {
        Problem::new("block", "data", ProblemResult::TruncatedStream)
            .path(&self.path)
            .os_error(detail)
            .signal()
    }

    /// Pull exactly `len` bytes off the stream, passing them to `sink` in
    /// pieces, and return the hash of everything extracted.
    pub fn extract_with<F>(&mut self, len: u64, mut sink: F) -> Result<ContentHash>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        let mut hasher = ContentHasher::new();
        let mut remaining = len;

        while remaining > 0 {
            let want = cmp::min(remaining, self.buf.len() as u64) as usize;
            let got = match self.decoder.read(&mut self.buf[..want]) {
                Ok(0) => {
                    return self.truncated(format!(
                        "stream ended early; still wanted {} bytes",
                        remaining
                    ));
                }
                Ok(got) => got,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return self.truncated(format!("decompress failed: {}", e)),
            };
            hasher.update(&self.buf[..got]);
            sink(&self.buf[..got])?;
            remaining -= got as u64;
        }

        Ok(hasher.finalize())
    }

    pub fn extract(&mut self, len: u64) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.extract_with(len, |data| {
            out.extend_from_slice(data);
            Ok(())
        })?;
        Ok(out)
    }

    /// Consume `len` bytes without keeping them.
    pub fn skip(&mut self, len: u64) -> Result<ContentHash> {
        self.extract_with(len, |_| Ok(()))
    }

    /// True if the stream ends cleanly here.
    ///
    /// Anything other than a clean end (more content, or bytes that don't
    /// decode) is reported as a corrupt data file.
    pub fn at_end(&mut self) -> Result<bool> {
        let mut probe = [0u8; 1];
        loop {
            match self.decoder.read(&mut probe) {
                Ok(0) => return Ok(true),
                Ok(_) => return Ok(false),
                Err(e) if e.kind() == ErrorKind::Interrupted => (),
                Err(e) => {
                    return Problem::new("block", "data", ProblemResult::Corrupt)
                        .path(&self.path)
                        .os_error(e)
                        .signal();
                }
            }
        }
    }
}

#[cfg(test)]
mod test_codec {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8 ^ (i / 251) as u8).collect()
    }

    fn write_stream(path: &Path, parts: &[&[u8]]) -> DataStats {
        let mut writer = DataWriter::create(path, DEFAULT_COMPRESSION_LEVEL).unwrap();
        for part in parts {
            writer.append(part).unwrap();
        }
        writer.finish().unwrap()
    }

    #[test]
    fn round_trip_sizes() {
        let tmp = TempDir::new().unwrap();

        for (i, size) in [0usize, 1, 65535, 65536, (1 << 20) + 1].iter().enumerate() {
            let path = tmp.path().join(format!("d{:06}", i));
            let data = pattern(*size);
            let stats = write_stream(&path, &[&data]);
            assert_eq!(stats.plain_bytes, *size as u64);

            let mut reader = DataReader::open(&path).unwrap();
            assert_eq!(reader.extract(*size as u64).unwrap(), data);
            assert!(reader.at_end().unwrap());
        }
    }

    #[test]
    fn bounded_extraction_across_appends() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("d000000");
        write_stream(&path, &[b"hello", b" ", b"world", b"!"]);

        let mut reader = DataReader::open(&path).unwrap();
        assert_eq!(reader.extract(3).unwrap(), b"hel");
        assert_eq!(reader.extract(0).unwrap(), b"");
        assert_eq!(reader.extract(6).unwrap(), b"lo wor");
        assert!(!reader.at_end().unwrap());
    }

    #[test]
    fn extraction_hash_matches_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("d000000");
        let data = pattern(100_000);
        write_stream(&path, &[&data]);

        let mut reader = DataReader::open(&path).unwrap();
        assert_eq!(reader.skip(100_000).unwrap(), ContentHash::of(&data));
    }

    #[test]
    fn stream_ends_early() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("d000000");
        write_stream(&path, &[b"short"]);

        let mut reader = DataReader::open(&path).unwrap();
        let err = reader.extract(10).unwrap_err();
        assert_eq!(err.result(), Some(ProblemResult::TruncatedStream));
    }

    #[test]
    fn truncated_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("d000000");
        let data = pattern(200_000);
        write_stream(&path, &[&data]);

        let on_disk = fs::read(&path).unwrap();
        fs::write(&path, &on_disk[..on_disk.len() / 2]).unwrap();

        let mut reader = DataReader::open(&path).unwrap();
        let err = reader.extract(200_000).unwrap_err();
        assert_eq!(err.result(), Some(ProblemResult::TruncatedStream));
    }

    #[test]
    fn create_is_exclusive() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("d000000");
        write_stream(&path, &[b"x"]);

        let err = DataWriter::create(&path, DEFAULT_COMPRESSION_LEVEL).err().unwrap();
        assert_eq!(err.result(), Some(ProblemResult::AlreadyExists));
    }

    #[test]
    fn missing_file() {
        let tmp = TempDir::new().unwrap();

        let err = DataReader::open(&tmp.path().join("d000009")).err().unwrap();
        assert_eq!(err.result(), Some(ProblemResult::Missing));
    }

    #[test]
    fn dropped_writer_still_closes_stream() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("d000000");
        {
            let mut writer = DataWriter::create(&path, DEFAULT_COMPRESSION_LEVEL).unwrap();
            writer.append(b"abandoned").unwrap();
        }

        let mut reader = DataReader::open(&path).unwrap();
        assert_eq!(reader.extract(9).unwrap(), b"abandoned");
    }
}
