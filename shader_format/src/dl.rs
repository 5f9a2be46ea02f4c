//! The DL container: an ordered list of short strings or raw blobs with a
//! length-prefixed serialized form.
//!
//! SH and SB embed DL files for their name pools (magic number hidden); the
//! position of an entry inside the pool is the stable id every other
//! component uses to refer to it.

use bytes::{Buf, BufMut};

use crate::{is_ascii, DataSizeType, Decode, Encode, EofError, Error, SHORT_STRING_MAX};

pub const DL_MAGIC: u32 = 0x4C44_696F;
pub const DL_VERSION: u8 = 0x12;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum DlDataType {
    Data = 0,
    Ascii = 1,
    Utf8 = 2,
}

impl DlDataType {
    fn from_u8(value: u8) -> Result<Self, Error> {
        match value {
            0 => Ok(Self::Data),
            1 => Ok(Self::Ascii),
            2 => Ok(Self::Utf8),
            _ => Err(Error::InvalidInput("unknown DL data type")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DlFile {
    data_type: DlDataType,
    hide_magic: bool,
    entries: Vec<Vec<u8>>,
}

impl DlFile {
    pub fn new(data_type: DlDataType, hide_magic: bool) -> Self {
        Self {
            data_type,
            hide_magic,
            entries: Vec::new(),
        }
    }

    pub fn data_type(&self) -> DlDataType {
        self.data_type
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, index: usize) -> &[u8] {
        &self.entries[index]
    }

    /// Entry as a string. Valid for `Ascii` and `Utf8` pools, whose entries
    /// are validated on insert.
    pub fn string(&self, index: usize) -> &str {
        debug_assert_ne!(self.data_type, DlDataType::Data);
        core::str::from_utf8(&self.entries[index]).expect("pool entry validated on insert")
    }

    /// Position of `needle` within `[start, end)`, or `None`.
    ///
    /// Comparison is case-sensitive byte equality.
    pub fn find(&self, start: usize, end: usize, needle: &[u8]) -> Option<usize> {
        let end = end.min(self.entries.len());
        self.entries
            .get(start..end)?
            .iter()
            .position(|e| e == needle)
            .map(|i| i + start)
    }

    pub fn push_string(&mut self, value: &str) -> Result<usize, Error> {
        if value.len() > SHORT_STRING_MAX {
            return Err(Error::CapacityExceeded("DL string entry above 65534 bytes"));
        }

        if self.data_type == DlDataType::Ascii && !is_ascii(value.as_bytes()) {
            return Err(Error::InvariantViolation("non ASCII string in ASCII pool"));
        }

        self.entries.push(value.as_bytes().to_vec());
        Ok(self.entries.len() - 1)
    }

    pub fn push_data(&mut self, value: Vec<u8>) -> Result<usize, Error> {
        if self.data_type != DlDataType::Data {
            return Err(Error::InvariantViolation("raw entry in string pool"));
        }

        self.entries.push(value);
        Ok(self.entries.len() - 1)
    }

    pub fn write<B>(&self, mut buf: B)
    where
        B: BufMut,
    {
        if !self.hide_magic {
            DL_MAGIC.encode(&mut buf);
        }

        let count_type = DataSizeType::required(self.entries.len() as u64);
        let largest = self.entries.iter().map(Vec::len).max().unwrap_or(0);
        let length_type = DataSizeType::required(largest as u64);

        DL_VERSION.encode(&mut buf);
        (self.data_type as u8).encode(&mut buf);
        ((count_type as u8) | (length_type as u8) << 2).encode(&mut buf);
        0u8.encode(&mut buf);

        count_type.write(&mut buf, self.entries.len() as u64);

        for entry in &self.entries {
            length_type.write(&mut buf, entry.len() as u64);
        }

        for entry in &self.entries {
            buf.put_slice(entry);
        }
    }

    pub fn read<B>(mut buf: B, hide_magic: bool) -> Result<Self, Error>
    where
        B: Buf,
    {
        if !hide_magic {
            let magic = u32::decode(&mut buf)?;
            if magic != DL_MAGIC {
                return Err(Error::InvalidInput("bad DL magic number"));
            }
        }

        let version = u8::decode(&mut buf)?;
        if version != DL_VERSION {
            return Err(Error::InvalidInput("unsupported DL version"));
        }

        let data_type = DlDataType::from_u8(u8::decode(&mut buf)?)?;
        let size_types = u8::decode(&mut buf)?;
        if size_types >> 4 != 0 {
            return Err(Error::InvalidInput("reserved DL size type bits set"));
        }

        let padding = u8::decode(&mut buf)?;
        if padding != 0 {
            return Err(Error::InvalidInput("non zero DL padding"));
        }

        let count_type = DataSizeType::from_bits(size_types);
        let length_type = DataSizeType::from_bits(size_types >> 2);

        let count = count_type.read(&mut buf)?;
        let mut lengths = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            lengths.push(length_type.read(&mut buf)? as usize);
        }

        let mut entries = Vec::with_capacity(lengths.len());

        for len in lengths {
            if buf.remaining() < len {
                return Err(Error::UnexpectedEof(EofError {
                    on: "DL entry",
                    remaining: buf.remaining(),
                    expected: len,
                }));
            }

            let mut entry = vec![0; len];
            buf.copy_to_slice(&mut entry);

            match data_type {
                DlDataType::Data => {}
                DlDataType::Ascii => {
                    if !is_ascii(&entry) {
                        return Err(Error::InvalidInput("non ASCII entry in ASCII pool"));
                    }
                }
                DlDataType::Utf8 => {
                    if core::str::from_utf8(&entry).is_err() {
                        return Err(Error::InvalidInput("invalid UTF-8 entry in UTF-8 pool"));
                    }
                }
            }

            entries.push(entry);
        }

        Ok(Self {
            data_type,
            hide_magic,
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{DlDataType, DlFile, Error};

    #[test]
    fn test_find_region() {
        let mut dl = DlFile::new(DlDataType::Ascii, true);
        for s in ["alpha", "beta", "gamma", "beta"] {
            dl.push_string(s).unwrap();
        }

        assert_eq!(dl.find(0, usize::MAX, b"beta"), Some(1));
        assert_eq!(dl.find(2, usize::MAX, b"beta"), Some(3));
        assert_eq!(dl.find(0, 1, b"beta"), None);
        assert_eq!(dl.find(0, usize::MAX, b"Beta"), None);
    }

    #[test]
    fn test_ascii_rejects_utf8() {
        let mut dl = DlFile::new(DlDataType::Ascii, true);
        assert!(matches!(
            dl.push_string("gr\u{fc}n"),
            Err(Error::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_reflexive() {
        for hide_magic in [false, true] {
            let mut dl = DlFile::new(DlDataType::Utf8, hide_magic);
            dl.push_string("main").unwrap();
            dl.push_string("gr\u{fc}n").unwrap();
            dl.push_string("").unwrap();

            let mut buf = Vec::new();
            dl.write(&mut buf);

            let read = DlFile::read(&buf[..], hide_magic).unwrap();
            assert_eq!(read, dl);
        }
    }

    #[test]
    fn test_reflexive_data() {
        let mut dl = DlFile::new(DlDataType::Data, true);
        dl.push_data(vec![1, 2, 3, 255]).unwrap();
        dl.push_data(Vec::new()).unwrap();

        let mut buf = Vec::new();
        dl.write(&mut buf);
        assert_eq!(DlFile::read(&buf[..], true).unwrap(), dl);
    }

    #[test]
    fn test_bad_magic() {
        let dl = DlFile::new(DlDataType::Ascii, false);
        let mut buf = Vec::new();
        dl.write(&mut buf);
        buf[0] ^= 0xFF;

        assert!(matches!(
            DlFile::read(&buf[..], false),
            Err(Error::InvalidInput(_))
        ));
    }
}
