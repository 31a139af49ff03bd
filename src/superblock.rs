use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// Number of section slots in every superblock.
pub const SECTION_COUNT: usize = 8;
/// Fixed length of a section name, NUL-padded.
pub const NAME_LEN: usize = 8;
/// SHA-256 output length.
pub const DIGEST_LEN: usize = 32;
pub const RESERVED_LEN: usize = 0x80;
/// On-disk size of the whole superblock: 8 headers + 8 digests + reserved.
pub const SUPERBLOCK_SIZE: usize = 0x200;
/// Section payloads are padded to multiples of this.
pub const BLOCK_SIZE: u64 = 0x200;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SectionHeader {
    pub name: [u8; NAME_LEN],
    /// Payload offset relative to the end of the superblock.
    pub offset: u32,
    /// Payload length in bytes as written on disk.
    pub size: u32,
}

impl SectionHeader {
    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut name = [0u8; NAME_LEN];
        reader.read_exact(&mut name)?;
        let offset = reader.read_u32::<LittleEndian>()?;
        let size = reader.read_u32::<LittleEndian>()?;
        Ok(Self { name, offset, size })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.name)?;
        writer.write_u32::<LittleEndian>(self.offset)?;
        writer.write_u32::<LittleEndian>(self.size)
    }

    /// An empty name marks the slot as unused.
    pub fn is_empty(&self) -> bool {
        self.name[0] == 0
    }

    /// Name bytes up to the first NUL.
    pub fn name_bytes(&self) -> &[u8] {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        &self.name[..end]
    }

    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(self.name_bytes()).into_owned()
    }
}

/// In-memory superblock: section table, digest table and reserved tail.
///
/// The digest table is stored in reverse slot order on disk: section `i`
/// owns digest entry `SECTION_COUNT - 1 - i`. Use [`Superblock::digest`]
/// and [`Superblock::set_digest`] instead of indexing `digests` directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Superblock {
    pub sections: [SectionHeader; SECTION_COUNT],
    pub digests: [[u8; DIGEST_LEN]; SECTION_COUNT],
    pub reserved: [u8; RESERVED_LEN],
}

impl Default for Superblock {
    fn default() -> Self {
        Self {
            sections: [SectionHeader::default(); SECTION_COUNT],
            digests: [[0; DIGEST_LEN]; SECTION_COUNT],
            reserved: [0; RESERVED_LEN],
        }
    }
}

impl Superblock {
    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut sb = Self::default();
        for section in &mut sb.sections {
            *section = SectionHeader::read(&mut reader)?;
        }
        for digest in &mut sb.digests {
            reader.read_exact(digest)?;
        }
        reader.read_exact(&mut sb.reserved)?;
        Ok(sb)
    }

    /// Like [`Superblock::read`], but a short source leaves the trailing
    /// fields zeroed instead of failing.
    pub fn read_lenient<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut buf = [0u8; SUPERBLOCK_SIZE];
        let mut filled = 0;
        while filled < SUPERBLOCK_SIZE {
            match reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Self::read(&buf[..])
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        for section in &self.sections {
            section.write(&mut writer)?;
        }
        for digest in &self.digests {
            writer.write_all(digest)?;
        }
        writer.write_all(&self.reserved)
    }

    pub fn digest(&self, section: usize) -> &[u8; DIGEST_LEN] {
        &self.digests[SECTION_COUNT - 1 - section]
    }

    pub fn set_digest(&mut self, section: usize, digest: [u8; DIGEST_LEN]) {
        self.digests[SECTION_COUNT - 1 - section] = digest;
    }

    /// Structural self-identification: there is no magic number, only the
    /// requirement that slot 0 starts at offset 0 and the reserved region
    /// is untouched.
    pub fn is_exefs(&self) -> bool {
        self.sections[0].offset == 0 && self.reserved.iter().all(|&b| b == 0)
    }

    /// Remove slot `index`, shifting every later header down by one and the
    /// digest table in the mirrored direction, then zeroing the vacated
    /// header slot and its digest.
    pub fn remove_section(&mut self, index: usize) {
        self.sections.copy_within(index + 1.., index);
        self.sections[SECTION_COUNT - 1] = SectionHeader::default();
        // Sections index+1..8 own digest entries 0..7-index.
        self.digests.copy_within(..SECTION_COUNT - 1 - index, 1);
        self.digests[0] = [0; DIGEST_LEN];
    }
}

/// Sniff a byte source for the superblock invariant. Short sources are
/// zero-filled before evaluation; an unreadable source is simply not ExeFS.
pub fn sniff<R: Read>(reader: R) -> bool {
    match Superblock::read_lenient(reader) {
        Ok(sb) => sb.is_exefs(),
        Err(_) => false,
    }
}
