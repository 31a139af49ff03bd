//! Extraction pipeline: container → directory of section files.
//!
//! Per-slot failures are reported and aggregated rather than aborting the
//! run; whatever can be extracted is. Only the entry steps (container open,
//! output directory creation) are fatal.

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::codec::{BackwardLz77, Codec};
use crate::error::{ExeFsError, Result};
use crate::fsio::copy_range;
use crate::paths::SectionPathMap;
use crate::superblock::{self, Superblock, SECTION_COUNT, SUPERBLOCK_SIZE};

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// When set, the raw superblock bytes are exported verbatim here.
    pub header_path: Option<PathBuf>,
    /// Run the code section (slot 0) through the codec before writing it.
    pub decompress_code: bool,
    pub verbose: bool,
    pub path_map: SectionPathMap,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            header_path: None,
            decompress_code: false,
            verbose: false,
            path_map: SectionPathMap::default(),
        }
    }
}

/// Check whether `path` starts with a plausible ExeFS superblock.
/// An unreadable or too-short file is simply "not ExeFS", never an error.
pub fn is_exefs_file(path: &Path) -> bool {
    match File::open(path) {
        Ok(file) => superblock::sniff(file),
        Err(_) => false,
    }
}

/// Extract every present section of `container` into `out_dir`, using the
/// built-in backward LZ77 codec for the code section when requested.
pub fn extract(container: &Path, out_dir: &Path, options: &ExtractOptions) -> Result<()> {
    extract_with_codec(container, out_dir, &BackwardLz77, options)
}

pub fn extract_with_codec(
    container: &Path,
    out_dir: &Path,
    codec: &dyn Codec,
    options: &ExtractOptions,
) -> Result<()> {
    let mut file = File::open(container).map_err(|source| ExeFsError::Open {
        path: container.to_owned(),
        source,
    })?;
    let sb = Superblock::read_lenient(&mut file)?;
    fs::create_dir_all(out_dir).map_err(|source| ExeFsError::Directory {
        path: out_dir.to_owned(),
        source,
    })?;

    let mut attempted = 0;
    let mut failed = 0;
    match &options.header_path {
        Some(path) => {
            attempted += 1;
            if let Err(err) = export_header(&sb, path, options.verbose) {
                eprintln!("ERROR: header export to {}: {err}", path.display());
                failed += 1;
            }
        }
        None if options.verbose => println!("INFO: exefs header is not exported"),
        None => {}
    }

    for index in 0..SECTION_COUNT {
        if sb.sections[index].is_empty() {
            continue;
        }
        attempted += 1;
        if let Err(err) = extract_section(&mut file, &sb, index, out_dir, codec, options) {
            eprintln!("ERROR: section {}: {err}", sb.sections[index].name_lossy());
            failed += 1;
        }
    }

    if failed == 0 {
        Ok(())
    } else {
        Err(ExeFsError::Partial { failed, attempted })
    }
}

fn export_header(sb: &Superblock, path: &Path, verbose: bool) -> Result<()> {
    let mut out = File::create(path).map_err(|source| ExeFsError::Open {
        path: path.to_owned(),
        source,
    })?;
    if verbose {
        println!("save: {}", path.display());
    }
    sb.write(&mut out)?;
    Ok(())
}

fn extract_section(
    file: &mut File,
    sb: &Superblock,
    index: usize,
    out_dir: &Path,
    codec: &dyn Codec,
    options: &ExtractOptions,
) -> Result<()> {
    let header = &sb.sections[index];
    let name = header.name_lossy();
    let (file_name, known) = options.path_map.resolve(&name, index);
    if !known && options.verbose {
        println!("INFO: unknown section name {name}");
    }
    let path = out_dir.join(file_name);
    let mut out = File::create(&path).map_err(|source| ExeFsError::Open {
        path: path.clone(),
        source,
    })?;
    if options.verbose {
        println!("save: {}", path.display());
    }

    let payload_offset = SUPERBLOCK_SIZE as u64 + u64::from(header.offset);
    if index == 0 && options.decompress_code {
        match decompress_payload(file, payload_offset, header.size, codec) {
            Ok(raw) => {
                out.write_all(&raw)?;
                return Ok(());
            }
            Err(err) => {
                // Keep the still-compressed bytes rather than a truncated
                // file, and report the slot as failed.
                copy_range(file, &mut out, payload_offset, u64::from(header.size))?;
                return Err(err);
            }
        }
    }
    copy_range(file, &mut out, payload_offset, u64::from(header.size))?;
    Ok(())
}

fn decompress_payload(
    file: &mut File,
    offset: u64,
    size: u32,
    codec: &dyn Codec,
) -> Result<Vec<u8>> {
    let mut compressed = vec![0u8; size as usize];
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut compressed)?;
    let uncompressed_size = codec.uncompressed_size(&compressed)?;
    Ok(codec.decompress(&compressed, uncompressed_size)?)
}
