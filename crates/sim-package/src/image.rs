//! Flat binary image of a file set
//!
//! Used to exchange a device filesystem with other tools independently of
//! the package container. Layout, all integers little-endian:
//!
//! ```text
//! magic     4 bytes  "VFSI"
//! version   u8       1
//! count     u32
//! entries   count × { path_len u16, path (UTF-8), data_len u32, data }
//! checksum  u32      CRC-32 of every preceding byte
//! ```
//!
//! The count and every file length must fit in a u32, so a single file can
//! hold at most 4 GiB.

use std::collections::BTreeSet;

use crate::error::FormatError;
use crate::fileset::VirtualFileSet;
use crate::path::validate_path;

/// Magic bytes at the start of every image
pub const MAGIC: [u8; 4] = *b"VFSI";

/// Current image version
pub const VERSION: u8 = 1;

const HEADER_LEN: usize = MAGIC.len() + 1 + 4;
const CHECKSUM_LEN: usize = 4;

/// Encode a file set as an image
pub fn encode(files: &VirtualFileSet) -> Result<Vec<u8>, FormatError> {
    let count = u32::try_from(files.len()).map_err(|_| FormatError::TooManyFiles(files.len()))?;

    let mut out = Vec::with_capacity(HEADER_LEN + files.total_size() + CHECKSUM_LEN);
    out.extend_from_slice(&MAGIC);
    out.push(VERSION);
    out.extend_from_slice(&count.to_le_bytes());

    for (path, contents) in files.iter() {
        let data_len = data_len(path, contents.len())?;
        // Paths are capped at MAX_PATH_LEN, so the length fits a u16
        out.extend_from_slice(&(path.len() as u16).to_le_bytes());
        out.extend_from_slice(path.as_bytes());
        out.extend_from_slice(&data_len.to_le_bytes());
        out.extend_from_slice(contents);
    }

    let checksum = crc32fast::hash(&out);
    out.extend_from_slice(&checksum.to_le_bytes());
    Ok(out)
}

/// Length field for a file's data
fn data_len(path: &str, len: usize) -> Result<u32, FormatError> {
    u32::try_from(len).map_err(|_| FormatError::FileTooLarge {
        path: path.to_string(),
        len,
    })
}

/// Decode an image into a file set
pub fn decode(bytes: &[u8]) -> Result<VirtualFileSet, FormatError> {
    if bytes.len() < HEADER_LEN + CHECKSUM_LEN {
        return Err(FormatError::Truncated {
            needed: HEADER_LEN + CHECKSUM_LEN - bytes.len(),
        });
    }

    let mut magic = [0u8; 4];
    magic.copy_from_slice(&bytes[..4]);
    if magic != MAGIC {
        return Err(FormatError::BadMagic(magic));
    }

    let (body, trailer) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    let expected = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let actual = crc32fast::hash(body);
    if expected != actual {
        return Err(FormatError::ChecksumMismatch { expected, actual });
    }

    let mut reader = Reader::new(&body[MAGIC.len()..]);
    let version = reader.u8()?;
    if version != VERSION {
        return Err(FormatError::UnsupportedVersion(version));
    }

    let count = reader.u32()? as usize;
    let mut seen = BTreeSet::new();
    let mut files = VirtualFileSet::new();
    for _ in 0..count {
        let path_len = reader.u16()? as usize;
        let path = std::str::from_utf8(reader.take(path_len)?)
            .map_err(|_| FormatError::InvalidUtf8Path)?
            .to_string();
        validate_path(&path)?;
        let data_len = reader.u32()? as usize;
        let data = reader.take(data_len)?.to_vec();

        if !seen.insert(path.clone()) {
            return Err(FormatError::DuplicatePath(path));
        }
        files.add(path, data)?;
    }

    if reader.remaining() > 0 {
        return Err(FormatError::TrailingBytes(reader.remaining()));
    }
    Ok(files)
}

/// Cursor over image bytes
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], FormatError> {
        if self.remaining() < n {
            return Err(FormatError::Truncated {
                needed: n - self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, FormatError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, FormatError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> VirtualFileSet {
        let mut set = VirtualFileSet::new();
        set.add("main.script", b"println \"boot\"".to_vec()).unwrap();
        set.add("data/table.bin", vec![0u8, 1, 2, 255]).unwrap();
        set
    }

    /// Re-seal a body with a valid checksum so later checks are reached
    fn reseal(mut body: Vec<u8>) -> Vec<u8> {
        let checksum = crc32fast::hash(&body);
        body.extend_from_slice(&checksum.to_le_bytes());
        body
    }

    #[test]
    fn test_empty_set_layout() {
        let bytes = encode(&VirtualFileSet::new()).unwrap();
        assert_eq!(&bytes[..4], b"VFSI");
        assert_eq!(bytes[4], VERSION);
        assert_eq!(&bytes[5..9], &[0, 0, 0, 0]);
        assert_eq!(bytes.len(), HEADER_LEN + CHECKSUM_LEN);
        assert_eq!(decode(&bytes).unwrap(), VirtualFileSet::new());
    }

    #[test]
    fn test_data_len_limit() {
        assert_eq!(data_len("a", 7), Ok(7));
        assert_eq!(data_len("a", u32::MAX as usize), Ok(u32::MAX));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_oversized_file_rejected() {
        let len = u32::MAX as usize + 1;
        assert_eq!(
            data_len("big.bin", len),
            Err(FormatError::FileTooLarge {
                path: "big.bin".into(),
                len
            })
        );
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = encode(&sample()).unwrap();
        bytes[0] = b'X';
        assert!(matches!(decode(&bytes), Err(FormatError::BadMagic(_))));
    }

    #[test]
    fn test_corruption_detected() {
        let mut bytes = encode(&sample()).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;
        assert!(matches!(
            decode(&bytes),
            Err(FormatError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_too_short() {
        assert!(matches!(
            decode(b"VFSI"),
            Err(FormatError::Truncated { needed: 9 })
        ));
    }

    #[test]
    fn test_truncated_entry() {
        let bytes = encode(&sample()).unwrap();
        let body = bytes[..bytes.len() - CHECKSUM_LEN - 3].to_vec();
        assert!(matches!(
            decode(&reseal(body)),
            Err(FormatError::Truncated { needed: 3 })
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let bytes = encode(&sample()).unwrap();
        let mut body = bytes[..bytes.len() - CHECKSUM_LEN].to_vec();
        body[4] = 9;
        assert_eq!(decode(&reseal(body)), Err(FormatError::UnsupportedVersion(9)));
    }

    #[test]
    fn test_trailing_bytes() {
        let bytes = encode(&sample()).unwrap();
        let mut body = bytes[..bytes.len() - CHECKSUM_LEN].to_vec();
        body.extend_from_slice(b"junk");
        assert_eq!(decode(&reseal(body)), Err(FormatError::TrailingBytes(4)));
    }

    #[test]
    fn test_duplicate_path() {
        let mut body = Vec::new();
        body.extend_from_slice(&MAGIC);
        body.push(VERSION);
        body.extend_from_slice(&2u32.to_le_bytes());
        for _ in 0..2 {
            body.extend_from_slice(&1u16.to_le_bytes());
            body.push(b'a');
            body.extend_from_slice(&0u32.to_le_bytes());
        }
        assert_eq!(
            decode(&reseal(body)),
            Err(FormatError::DuplicatePath("a".into()))
        );
    }

    #[test]
    fn test_invalid_path_rejected() {
        let mut body = Vec::new();
        body.extend_from_slice(&MAGIC);
        body.push(VERSION);
        body.extend_from_slice(&1u32.to_le_bytes());
        body.extend_from_slice(&3u16.to_le_bytes());
        body.extend_from_slice(b"/ab");
        body.extend_from_slice(&0u32.to_le_bytes());
        assert!(matches!(
            decode(&reseal(body)),
            Err(FormatError::InvalidPath(_))
        ));
    }
}
