use exefs::codec::{Codec, CodecError};
use exefs::superblock::{SectionHeader, Superblock, BLOCK_SIZE, DIGEST_LEN, SUPERBLOCK_SIZE};
use exefs::{
    create, create_with_codec, extract, extract_with_codec, is_exefs_file, CreateOptions,
    ExeFsError, ExtractOptions, SectionPathMap,
};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn sha(data: &[u8]) -> [u8; DIGEST_LEN] {
    Sha256::digest(data).into()
}

fn pseudo_random(len: usize) -> Vec<u8> {
    let mut state = 0x1234_5678u32;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 24) as u8
        })
        .collect()
}

/// Lay out a container exactly the way the creation pipeline does:
/// superblock, then block-padded payloads in slot order.
fn build_container(path: &Path, specs: &[(&[u8], &[u8])]) {
    let mut sb = Superblock::default();
    let mut body: Vec<u8> = Vec::new();
    for (i, (name, data)) in specs.iter().enumerate() {
        let mut header = SectionHeader::default();
        header.name[..name.len()].copy_from_slice(name);
        header.offset = body.len() as u32;
        header.size = data.len() as u32;
        sb.sections[i] = header;
        sb.set_digest(i, sha(data));
        body.extend_from_slice(data);
        let padded = (body.len() as u64).next_multiple_of(BLOCK_SIZE) as usize;
        body.resize(padded, 0);
    }
    let mut bytes = Vec::with_capacity(SUPERBLOCK_SIZE + body.len());
    sb.write(&mut bytes).unwrap();
    bytes.extend_from_slice(&body);
    fs::write(path, bytes).unwrap();
}

/// Sidecar header naming the given sections, with zeroed offsets and sizes.
fn seed_header(tmp: &TempDir, names: &[&[u8]]) -> PathBuf {
    let mut seed = Superblock::default();
    for (i, name) in names.iter().enumerate() {
        let mut header = SectionHeader::default();
        header.name[..name.len()].copy_from_slice(name);
        seed.sections[i] = header;
    }
    let path = tmp.path().join("seed-header.bin");
    let mut bytes = Vec::new();
    seed.write(&mut bytes).unwrap();
    fs::write(&path, bytes).unwrap();
    path
}

fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn extracts_exactly_the_present_sections() {
    let tmp = TempDir::new().unwrap();
    let container = tmp.path().join("a.exefs");
    let out = tmp.path().join("out");
    let code = vec![0xC0u8; 0x1000];
    let icon = vec![0x1Cu8; 0x200];
    build_container(&container, &[(b"code", &code), (b"icon", &icon)]);
    assert!(is_exefs_file(&container));

    extract(&container, &out, &ExtractOptions::default()).unwrap();

    assert_eq!(dir_entries(&out), ["code.bin", "icon.icn"]);
    assert_eq!(fs::read(out.join("code.bin")).unwrap(), code);
    assert_eq!(fs::read(out.join("icon.icn")).unwrap(), icon);
}

#[test]
fn create_reproduces_an_extracted_container() {
    let tmp = TempDir::new().unwrap();
    let container = tmp.path().join("a.exefs");
    let out = tmp.path().join("out");
    let header = tmp.path().join("header.bin");
    let code: Vec<u8> = (0..0x1234).map(|i| (i % 251) as u8).collect();
    let banner = vec![0xB4u8; 0x777];
    build_container(&container, &[(b"code", &code), (b"banner", &banner)]);

    let options = ExtractOptions {
        header_path: Some(header.clone()),
        ..Default::default()
    };
    extract(&container, &out, &options).unwrap();
    let original = fs::read(&container).unwrap();
    assert_eq!(fs::read(&header).unwrap(), &original[..SUPERBLOCK_SIZE]);

    let rebuilt = tmp.path().join("b.exefs");
    create(&rebuilt, &out, &CreateOptions::new(&header)).unwrap();
    assert_eq!(fs::read(&rebuilt).unwrap(), original);
}

#[test]
fn missing_source_compacts_the_table() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("in");
    fs::create_dir(&dir).unwrap();
    let code = vec![1u8; 0x300];
    let banner = vec![2u8; 0x180];
    fs::write(dir.join("code.bin"), &code).unwrap();
    fs::write(dir.join("banner.bnr"), &banner).unwrap();
    // The sidecar names three sections; icon.icn is deliberately absent.
    let header = seed_header(&tmp, &[b"code", b"icon", b"banner"]);

    let container = tmp.path().join("a.exefs");
    create(&container, &dir, &CreateOptions::new(&header)).unwrap();

    let sb = Superblock::read(File::open(&container).unwrap()).unwrap();
    assert_eq!(sb.sections[0].name_bytes(), b"code");
    assert_eq!(sb.sections[1].name_bytes(), b"banner");
    assert!(sb.sections[2].is_empty());
    assert_eq!(sb.sections[0].offset, 0);
    assert_eq!(sb.sections[1].offset, 0x400); // 0x300 padded up to a block
    assert_eq!(*sb.digest(0), sha(&code));
    assert_eq!(*sb.digest(1), sha(&banner));

    let raw = fs::read(&container).unwrap();
    assert_eq!(
        &raw[SUPERBLOCK_SIZE + 0x400..SUPERBLOCK_SIZE + 0x400 + 0x180],
        &banner[..]
    );
    assert_eq!(raw.len(), SUPERBLOCK_SIZE + 0x400 + 0x200);
}

#[test]
fn failed_decompression_falls_back_to_raw_bytes() {
    let tmp = TempDir::new().unwrap();
    let container = tmp.path().join("a.exefs");
    let out = tmp.path().join("out");
    // Not a valid backward LZ77 stream.
    let garbage = vec![0u8; 0x40];
    build_container(&container, &[(b"code", &garbage)]);

    let options = ExtractOptions {
        decompress_code: true,
        ..Default::default()
    };
    let err = extract(&container, &out, &options).unwrap_err();
    assert!(matches!(err, ExeFsError::Partial { failed: 1, attempted: 1 }));
    assert_eq!(fs::read(out.join("code.bin")).unwrap(), garbage);
}

#[test]
fn incompressible_code_is_stored_raw() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("in");
    fs::create_dir(&dir).unwrap();
    let code = pseudo_random(300);
    fs::write(dir.join("code.bin"), &code).unwrap();
    let header = seed_header(&tmp, &[b"code"]);

    let container = tmp.path().join("a.exefs");
    let mut options = CreateOptions::new(&header);
    options.compress_code = true;
    create(&container, &dir, &options).unwrap();

    let sb = Superblock::read(File::open(&container).unwrap()).unwrap();
    assert_eq!(sb.sections[0].size as usize, code.len());
    assert_eq!(*sb.digest(0), sha(&code));
    let raw = fs::read(&container).unwrap();
    assert_eq!(&raw[SUPERBLOCK_SIZE..SUPERBLOCK_SIZE + code.len()], &code[..]);
}

#[test]
fn compressed_code_round_trips_through_both_pipelines() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("in");
    fs::create_dir(&dir).unwrap();
    let code = b"void loop() { step(); }\n".repeat(256);
    fs::write(dir.join("code.bin"), &code).unwrap();
    let header = seed_header(&tmp, &[b"code"]);

    let container = tmp.path().join("a.exefs");
    let mut options = CreateOptions::new(&header);
    options.compress_code = true;
    create(&container, &dir, &options).unwrap();

    let sb = Superblock::read(File::open(&container).unwrap()).unwrap();
    assert!((sb.sections[0].size as usize) < code.len());
    // The stored digest covers the compressed bytes actually written.
    let raw = fs::read(&container).unwrap();
    let stored = &raw[SUPERBLOCK_SIZE..SUPERBLOCK_SIZE + sb.sections[0].size as usize];
    assert_eq!(*sb.digest(0), sha(stored));

    let out = tmp.path().join("out");
    let extract_options = ExtractOptions {
        decompress_code: true,
        ..Default::default()
    };
    extract(&container, &out, &extract_options).unwrap();
    assert_eq!(fs::read(out.join("code.bin")).unwrap(), code);
}

#[test]
fn short_sidecar_header_is_fatal() {
    let tmp = TempDir::new().unwrap();
    let header = tmp.path().join("header.bin");
    fs::write(&header, [0u8; 0x100]).unwrap();

    let err = create(
        &tmp.path().join("a.exefs"),
        tmp.path(),
        &CreateOptions::new(&header),
    )
    .unwrap_err();
    assert!(matches!(err, ExeFsError::HeaderTooShort { actual: 0x100 }));
}

#[test]
fn unknown_names_fall_back_to_name_dot_bin() {
    let tmp = TempDir::new().unwrap();
    let container = tmp.path().join("a.exefs");
    build_container(&container, &[(b"code", &[9u8; 16]), (b"extra", &[8u8; 16])]);

    let out = tmp.path().join("out");
    extract(&container, &out, &ExtractOptions::default()).unwrap();
    assert_eq!(dir_entries(&out), ["code.bin", "extra.bin"]);
}

#[test]
fn injected_path_map_overrides_the_defaults() {
    let tmp = TempDir::new().unwrap();
    let container = tmp.path().join("a.exefs");
    build_container(&container, &[(b"code", &[9u8; 16]), (b"icon", &[8u8; 16])]);

    let out = tmp.path().join("out");
    let options = ExtractOptions {
        path_map: SectionPathMap::empty().with_entry("icon", "icon.dat"),
        ..Default::default()
    };
    extract(&container, &out, &options).unwrap();
    assert_eq!(dir_entries(&out), ["code.bin", "icon.dat"]);
}

/// Refuses every operation, so both pipelines must take their fallbacks.
struct RefusingCodec;

impl Codec for RefusingCodec {
    fn uncompressed_size(&self, _compressed: &[u8]) -> Result<u32, CodecError> {
        Err(CodecError::Corrupt("refused"))
    }

    fn decompress(&self, _compressed: &[u8], _size: u32) -> Result<Vec<u8>, CodecError> {
        Err(CodecError::Corrupt("refused"))
    }

    fn compress(&self, _raw: &[u8]) -> Result<Vec<u8>, CodecError> {
        Err(CodecError::Inflate)
    }
}

#[test]
fn injected_codec_failures_take_both_fallback_paths() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("in");
    fs::create_dir(&dir).unwrap();
    let code = vec![0x5Au8; 0x240];
    fs::write(dir.join("code.bin"), &code).unwrap();
    let header = seed_header(&tmp, &[b"code"]);

    // Creation succeeds by storing the section raw.
    let container = tmp.path().join("a.exefs");
    let mut create_options = CreateOptions::new(&header);
    create_options.compress_code = true;
    create_with_codec(&container, &dir, &RefusingCodec, &create_options).unwrap();
    let sb = Superblock::read(File::open(&container).unwrap()).unwrap();
    assert_eq!(sb.sections[0].size as usize, code.len());

    // Extraction writes the raw bytes but reports the slot as failed.
    let out = tmp.path().join("out");
    let extract_options = ExtractOptions {
        decompress_code: true,
        ..Default::default()
    };
    let err = extract_with_codec(&container, &out, &RefusingCodec, &extract_options).unwrap_err();
    assert!(matches!(err, ExeFsError::Partial { failed: 1, attempted: 1 }));
    assert_eq!(fs::read(out.join("code.bin")).unwrap(), code);
}
