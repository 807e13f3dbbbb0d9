//! On-disk shard format constants, TOC, and footer.
//!
//! A shard is a single immutable file. Sections are laid out front to back;
//! the footer's table of contents is the only self-describing locator, so a
//! reader first parses the fixed-size tail at EOF, verifies magic, version
//! and checksum, then walks the TOC. Unknown section kinds are tolerated.
//! All integers are big-endian.

use crate::error::{Result, ShardError};
use crate::utils::encoding::{put_u16_be, put_u32_be, put_u64_be, SliceReader};

pub const MAGIC: [u8; 4] = *b"CSRD";

/// Current shard format version
pub const FORMAT_VERSION: u32 = 1;
/// Oldest format version this reader still opens
pub const MIN_FORMAT_VERSION: u32 = 1;

/// Header flag: ngrams were computed over case-folded codepoints
pub const FLAG_CASE_FOLDED: u32 = 1;

/// Header: magic, version, flags
pub const HEADER_LEN: usize = 4 + 4 + 4;

/// Fixed tail at EOF: toc_offset u64, checksum u32, version u32, magic
pub const TAIL_LEN: usize = 8 + 4 + 4 + 4;

/// Section kinds, in file order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SectionKind {
    Header = 0,
    Content = 1,
    Filenames = 2,
    Newlines = 3,
    DocMeta = 4,
    NgramBuckets = 5,
    BucketOffsets = 6,
    PostingData = 7,
    PostingOffsets = 8,
    Repos = 9,
    Metadata = 10,
}

/// One TOC entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    pub kind: u16,
    pub offset: u64,
    pub len: u64,
}

/// Footer table of contents
#[derive(Debug, Clone, Default)]
pub struct Toc {
    pub sections: Vec<Section>,
}

impl Toc {
    pub fn push(&mut self, kind: SectionKind, offset: u64, len: u64) {
        self.sections.push(Section {
            kind: kind as u16,
            offset,
            len,
        });
    }

    /// Byte range of a known section; errors when the shard lacks it or the
    /// range falls outside the file.
    pub fn range(&self, kind: SectionKind, file_len: usize) -> Result<std::ops::Range<usize>> {
        let sec = self
            .sections
            .iter()
            .find(|s| s.kind == kind as u16)
            .ok_or_else(|| ShardError::format(format!("missing section {kind:?}")))?;
        let start = sec.offset as usize;
        let end = start
            .checked_add(sec.len as usize)
            .ok_or_else(|| ShardError::format("section range overflow"))?;
        if end > file_len {
            return Err(ShardError::format(format!(
                "section {kind:?} extends past end of file"
            )));
        }
        Ok(start..end)
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        put_u32_be(buf, self.sections.len() as u32);
        for s in &self.sections {
            put_u16_be(buf, s.kind);
            put_u64_be(buf, s.offset);
            put_u64_be(buf, s.len);
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut r = SliceReader::new(buf);
        let count = r.read_u32_be()? as usize;
        let mut sections = Vec::with_capacity(count);
        for _ in 0..count {
            sections.push(Section {
                kind: r.read_u16_be()?,
                offset: r.read_u64_be()?,
                len: r.read_u64_be()?,
            });
        }
        Ok(Self { sections })
    }
}

/// Parsed fixed tail
#[derive(Debug, Clone, Copy)]
pub struct Tail {
    pub toc_offset: u64,
    pub checksum: u32,
    pub version: u32,
}

/// Encode the shard header at the front of the file
pub fn encode_header(buf: &mut Vec<u8>, flags: u32) {
    buf.extend_from_slice(&MAGIC);
    put_u32_be(buf, FORMAT_VERSION);
    put_u32_be(buf, flags);
}

/// Parse and validate the header; returns flags
pub fn parse_header(buf: &[u8]) -> Result<u32> {
    let mut r = SliceReader::new(buf);
    let magic = r.read_bytes(4)?;
    if magic != MAGIC {
        return Err(ShardError::format("bad magic in header"));
    }
    let version = r.read_u32_be()?;
    check_version(version)?;
    r.read_u32_be()
}

/// Append the footer: TOC followed by the fixed tail. The checksum field is
/// written as zero; callers patch it after computing the file checksum.
pub fn encode_footer(buf: &mut Vec<u8>, toc: &Toc) {
    let toc_offset = buf.len() as u64;
    toc.encode(buf);
    put_u64_be(buf, toc_offset);
    put_u32_be(buf, 0); // checksum placeholder
    put_u32_be(buf, FORMAT_VERSION);
    buf.extend_from_slice(&MAGIC);
}

/// Byte position of the checksum field within a complete file
pub fn checksum_pos(file_len: usize) -> usize {
    file_len - 12
}

/// Checksum of the whole file except the 4 checksum bytes themselves
pub fn file_checksum(buf: &[u8]) -> u32 {
    let pos = checksum_pos(buf.len());
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&buf[..pos]);
    hasher.update(&buf[pos + 4..]);
    hasher.finalize()
}

pub fn check_version(version: u32) -> Result<()> {
    if !(MIN_FORMAT_VERSION..=FORMAT_VERSION).contains(&version) {
        return Err(ShardError::Version {
            found: version,
            min: MIN_FORMAT_VERSION,
            max: FORMAT_VERSION,
        });
    }
    Ok(())
}

/// Parse the fixed tail at EOF, validating magic and version bounds
pub fn parse_tail(file: &[u8]) -> Result<Tail> {
    if file.len() < HEADER_LEN + TAIL_LEN {
        return Err(ShardError::format("file too small to be a shard"));
    }
    let tail = &file[file.len() - TAIL_LEN..];
    let mut r = SliceReader::new(tail);
    let toc_offset = r.read_u64_be()?;
    let checksum = r.read_u32_be()?;
    let version = r.read_u32_be()?;
    let magic = r.read_bytes(4)?;
    if magic != MAGIC {
        return Err(ShardError::format("bad magic in footer"));
    }
    check_version(version)?;
    if toc_offset as usize >= file.len() - TAIL_LEN {
        return Err(ShardError::format("footer TOC offset out of range"));
    }
    Ok(Tail {
        toc_offset,
        checksum,
        version,
    })
}

/// Verify the stored checksum against the file bytes
pub fn verify_checksum(file: &[u8], tail: &Tail) -> Result<()> {
    let computed = file_checksum(file);
    if computed != tail.checksum {
        return Err(ShardError::Checksum {
            stored: tail.checksum,
            computed,
        });
    }
    Ok(())
}
