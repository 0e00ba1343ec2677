pub mod archive;
pub mod band;
pub mod block;
pub mod codec;
pub mod ops;
pub mod record;

#[cfg(test)]
mod test_fixtures;

pub use archive::Archive;
pub use band::{BandId, BandReader, BandWriter};
pub use block::{BlockReader, BlockWriter, Compression, FileEntry, FileType};
pub use codec::{DataReader, DataWriter};
