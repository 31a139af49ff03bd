//! Offset-ranged copies and zero padding over seekable files.

use std::io::{self, Read, Seek, SeekFrom, Write};

const COPY_BUF: usize = 64 * 1024;

/// Copy `len` bytes from `src` starting at `offset` into `dst`.
pub fn copy_range<R, W>(src: &mut R, dst: &mut W, offset: u64, len: u64) -> io::Result<()>
where
    R: Read + Seek,
    W: Write,
{
    src.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; COPY_BUF.min(len.max(1) as usize)];
    let mut remaining = len;
    while remaining > 0 {
        let want = buf.len().min(remaining as usize);
        src.read_exact(&mut buf[..want])?;
        dst.write_all(&buf[..want])?;
        remaining -= want as u64;
    }
    Ok(())
}

/// Pad `file` with zero bytes up to the next multiple of `align` and return
/// the new stream position.
pub fn pad_to<W>(file: &mut W, align: u64) -> io::Result<u64>
where
    W: Write + Seek,
{
    let pos = file.stream_position()?;
    let target = pos.next_multiple_of(align);
    if target > pos {
        let zeros = vec![0u8; (target - pos) as usize];
        file.write_all(&zeros)?;
    }
    Ok(target)
}
