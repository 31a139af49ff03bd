//! Creation pipeline: directory of section files + sidecar header → container.
//!
//! The sidecar seeds the section table; offsets, sizes and digests are
//! recomputed slot by slot while payloads are written, and the finished
//! superblock overwrites the placeholder at the end. A slot whose source
//! file is missing is compacted out of the table and the same index is
//! re-attempted, because the removal shifts a different entry into place.

use std::borrow::Cow;
use std::fs::{self, File};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::codec::{BackwardLz77, Codec};
use crate::error::{ExeFsError, Result};
use crate::fsio::pad_to;
use crate::paths::SectionPathMap;
use crate::superblock::{Superblock, BLOCK_SIZE, SECTION_COUNT, SUPERBLOCK_SIZE};

#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// Sidecar file whose first 0x200 bytes seed the superblock.
    pub header_path: PathBuf,
    /// Run the code section (slot 0) through the codec before writing it.
    pub compress_code: bool,
    pub verbose: bool,
    pub path_map: SectionPathMap,
}

impl CreateOptions {
    pub fn new(header_path: impl Into<PathBuf>) -> Self {
        Self {
            header_path: header_path.into(),
            compress_code: false,
            verbose: false,
            path_map: SectionPathMap::default(),
        }
    }
}

enum SectionOutcome {
    /// Payload written and padded; the next section starts at this offset.
    Written { next_offset: u32 },
    /// Slot has no name and contributes nothing.
    Empty,
    /// Source file could not be opened; the slot must be compacted away.
    Missing(PathBuf),
    /// Slot failed for a reason compaction cannot fix.
    Failed(ExeFsError),
}

/// Build `container` from the files in `in_dir` named by the sidecar header,
/// using the built-in backward LZ77 codec for the code section when requested.
pub fn create(container: &Path, in_dir: &Path, options: &CreateOptions) -> Result<()> {
    create_with_codec(container, in_dir, &BackwardLz77, options)
}

pub fn create_with_codec(
    container: &Path,
    in_dir: &Path,
    codec: &dyn Codec,
    options: &CreateOptions,
) -> Result<()> {
    let mut sb = load_header(&options.header_path, options.verbose)?;
    let mut out = File::create(container).map_err(|source| ExeFsError::Open {
        path: container.to_owned(),
        source,
    })?;
    // Placeholder; rewritten with final offsets, sizes and digests below.
    sb.write(&mut out)?;

    let mut attempted = 0;
    let mut failed = 0;
    let mut next_offset: u32 = 0;
    let mut index = 0;
    while index < SECTION_COUNT {
        match create_section(&mut out, &mut sb, index, next_offset, in_dir, codec, options) {
            SectionOutcome::Written { next_offset: end } => {
                attempted += 1;
                next_offset = end;
                index += 1;
            }
            SectionOutcome::Empty => index += 1,
            SectionOutcome::Missing(path) => {
                if options.verbose {
                    println!("INFO: {} is missing, section dropped", path.display());
                }
                // The removal shifts later entries into this index, so the
                // same index is re-attempted rather than advanced past.
                sb.remove_section(index);
            }
            SectionOutcome::Failed(err) => {
                attempted += 1;
                failed += 1;
                eprintln!("ERROR: section {}: {err}", sb.sections[index].name_lossy());
                index += 1;
            }
        }
    }

    out.seek(SeekFrom::Start(0))?;
    sb.write(&mut out)?;

    if failed == 0 {
        Ok(())
    } else {
        Err(ExeFsError::Partial { failed, attempted })
    }
}

fn load_header(path: &Path, verbose: bool) -> Result<Superblock> {
    let mut file = File::open(path).map_err(|source| ExeFsError::Open {
        path: path.to_owned(),
        source,
    })?;
    let actual = file.metadata()?.len();
    if actual < SUPERBLOCK_SIZE as u64 {
        return Err(ExeFsError::HeaderTooShort { actual });
    }
    if verbose {
        println!("load: {}", path.display());
    }
    Ok(Superblock::read(&mut file)?)
}

fn create_section(
    out: &mut File,
    sb: &mut Superblock,
    index: usize,
    next_offset: u32,
    in_dir: &Path,
    codec: &dyn Codec,
    options: &CreateOptions,
) -> SectionOutcome {
    if sb.sections[index].is_empty() {
        return SectionOutcome::Empty;
    }
    let name = sb.sections[index].name_lossy();
    let (file_name, known) = options.path_map.resolve(&name, index);
    if !known && options.verbose {
        println!("INFO: unknown section name {name}");
    }
    let path = in_dir.join(file_name);

    let data = match fs::read(&path) {
        Ok(data) => data,
        Err(_) => return SectionOutcome::Missing(path),
    };
    if options.verbose {
        println!("load: {}", path.display());
    }

    match write_payload(out, sb, index, next_offset, &data, codec, options) {
        Ok(next) => SectionOutcome::Written { next_offset: next },
        Err(err) => SectionOutcome::Failed(err),
    }
}

fn write_payload(
    out: &mut File,
    sb: &mut Superblock,
    index: usize,
    next_offset: u32,
    data: &[u8],
    codec: &dyn Codec,
    options: &CreateOptions,
) -> Result<u32> {
    out.seek(SeekFrom::Start(SUPERBLOCK_SIZE as u64 + u64::from(next_offset)))?;

    let bytes: Cow<[u8]> = if index == 0 && options.compress_code {
        match codec.compress(data) {
            Ok(compressed) => Cow::Owned(compressed),
            Err(err) => {
                // Store the section raw instead.
                if options.verbose {
                    println!("INFO: code section stored uncompressed ({err})");
                }
                Cow::Borrowed(data)
            }
        }
    } else {
        Cow::Borrowed(data)
    };

    // The digest always covers the bytes physically written.
    sb.set_digest(index, Sha256::digest(bytes.as_ref()).into());
    sb.sections[index].offset = next_offset;
    sb.sections[index].size = bytes.len() as u32;
    out.write_all(&bytes)?;
    let end = pad_to(out, BLOCK_SIZE)?;
    Ok((end - SUPERBLOCK_SIZE as u64) as u32)
}
