use std::fs;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use log::{info, warn};

use cbase::{Apath, IoContext, Problem, ProblemResult, Result};

use crate::archive::Archive;
use crate::band::BandId;
use crate::block::BlockStats;
use crate::codec::DEFAULT_COMPRESSION_LEVEL;

pub const DEFAULT_MAX_BLOCK_BYTES: u64 = 64 << 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupOptions {
    pub compression_level: i32,
    /// Most plaintext bytes in one block, unless a single file is bigger
    pub max_block_bytes: u64,
    /// Read sources relative to this directory and store them relative to it
    pub base_dir: Option<PathBuf>,
}

impl Default for BackupOptions {
    fn default() -> Self {
        BackupOptions {
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            max_block_bytes: DEFAULT_MAX_BLOCK_BYTES,
            base_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BackupStats {
    pub band: Option<BandId>,
    pub files: usize,
    pub blocks: usize,
    pub skipped: usize,
    pub plain_bytes: u64,
    pub compressed_bytes: u64,
}

impl BackupStats {
    fn add_block(&mut self, block: BlockStats) {
        self.files += block.files;
        self.blocks += 1;
        self.plain_bytes += block.plain_bytes;
        self.compressed_bytes += block.compressed_bytes;
    }
}

fn source_apath(path: &Path, base_dir: Option<&Path>) -> Result<Apath> {
    match base_dir {
        None => Apath::from_path(path),
        Some(base) => match path.strip_prefix(base) {
            Ok(relative) => Apath::from_path(relative),
            Err(_) => Problem::new("backup", "source", ProblemResult::BadPath)
                .path(path)
                .os_error(format!("not inside {}", base.display()))
                .signal(),
        },
    }
}

/// A regular file to store, with its length when it was found.
struct Source {
    apath: Apath,
    path: PathBuf,
    len: u64,
}

/// Expand the sources into the regular files to store, sorted by apath.
fn collect_sources<P: AsRef<Path>>(
    sources: &[P],
    base_dir: Option<&Path>,
    stats: &mut BackupStats,
) -> Result<Vec<Source>> {
    let mut files = Vec::new();

    for source in sources {
        let source = match base_dir {
            Some(base) => base.join(source),
            None => source.as_ref().to_path_buf(),
        };
        let meta = fs::symlink_metadata(&source).with_path(&source)?;

        if meta.is_file() {
            files.push(Source {
                apath: source_apath(&source, base_dir)?,
                len: meta.len(),
                path: source,
            });
        } else if meta.is_dir() {
            let walker = WalkBuilder::new(&source)
                .follow_links(false)
                .standard_filters(false)
                .sort_by_file_name(|a, b| a.cmp(b))
                .build();

            for entry in walker {
                match entry {
                    Ok(e) => match e.file_type() {
                        Some(ft) if ft.is_file() => {
                            let len = fs::symlink_metadata(e.path()).with_path(e.path())?.len();
                            files.push(Source {
                                apath: source_apath(e.path(), base_dir)?,
                                path: e.path().to_path_buf(),
                                len,
                            });
                        }
                        Some(ft) if ft.is_dir() => (),
                        _ => {
                            info!("SKIP: {}", e.path().display());
                            stats.skipped += 1;
                        }
                    },
                    Err(e) => {
                        warn!("can't read source entry: {}", e);
                        stats.skipped += 1;
                    }
                }
            }
        } else {
            info!("SKIP: {}", source.display());
            stats.skipped += 1;
        }
    }

    files.sort_by(|a, b| a.apath.cmp(&b.apath));
    files.dedup_by(|a, b| a.apath == b.apath);
    Ok(files)
}

/// Store `sources` as a new band in the archive at `archive_dir`.
///
/// Directories are walked for the regular files below them. Everything goes
/// into the band in increasing apath order. A new block starts before any
/// file that would take the current one past `max_block_bytes`.
pub fn backup<P: AsRef<Path>>(
    sources: &[P],
    archive_dir: &Path,
    options: &BackupOptions,
) -> Result<BackupStats> {
    let mut stats = BackupStats::default();
    let files = collect_sources(sources, options.base_dir.as_deref(), &mut stats)?;

    let archive = Archive::open(archive_dir)?;
    let mut band = archive.start_band()?;
    band.set_compression_level(options.compression_level);

    let mut block = band.start_block()?;
    for source in files {
        let fits = block.plain_bytes().saturating_add(source.len) <= options.max_block_bytes;
        if block.file_count() > 0 && !fits {
            stats.add_block(block.finish()?);
            block = band.start_block()?;
        }
        info!("COMP: {}", source.path.display());
        block.add_file_as(&source.path, source.apath)?;
    }
    stats.add_block(block.finish()?);
    stats.band = Some(band.finish()?);

    Ok(stats)
}
