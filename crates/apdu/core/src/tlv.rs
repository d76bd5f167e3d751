//! Simple TLV record lists used as command and response payloads
//!
//! Records are kept in wire order. Duplicated tags are preserved and unknown tags are carried
//! through untouched, so a list can be decoded, inspected and re-encoded without loss.

use bytes::{BufMut, Bytes, BytesMut};
use iso7816_tlv::simple::{Tag, Tlv};

use crate::{Error, Result};

/// A single tag/value pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlvRecord {
    /// One byte tag
    pub tag: u8,
    /// Raw value bytes
    pub value: Bytes,
}

impl TlvRecord {
    /// Create a record from a tag and value
    pub fn new(tag: u8, value: impl Into<Bytes>) -> Self {
        Self {
            tag,
            value: value.into(),
        }
    }

    fn encode_into(&self, buf: &mut BytesMut) -> Result<()> {
        let tag = Tag::try_from(self.tag)?;
        let tlv = Tlv::new(tag, self.value.to_vec())?;
        buf.put_slice(&tlv.to_vec());
        Ok(())
    }
}

/// Ordered list of TLV records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlvList {
    records: Vec<TlvRecord>,
}

impl TlvList {
    /// Create an empty list
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Decode a payload into records
    ///
    /// An empty payload yields an empty list. Truncated or otherwise malformed input is an
    /// error; nothing is silently dropped.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut records = Vec::new();
        let mut rest = data;

        while !rest.is_empty() {
            let (parsed, remaining) = Tlv::parse(rest);
            let tlv = parsed?;
            records.push(TlvRecord {
                tag: tlv.tag().into(),
                value: Bytes::copy_from_slice(tlv.value()),
            });
            rest = remaining;
        }

        Ok(Self { records })
    }

    /// Encode the list back into its wire form
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        for record in &self.records {
            record.encode_into(&mut buf)?;
        }
        Ok(buf.freeze())
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the list has no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over all records in wire order
    pub fn iter(&self) -> impl Iterator<Item = &TlvRecord> {
        self.records.iter()
    }

    /// Whether a record with the given tag is present
    pub fn contains(&self, tag: u8) -> bool {
        self.records.iter().any(|r| r.tag == tag)
    }

    /// Value of the first record with the given tag
    pub fn bytes(&self, tag: u8) -> Option<&[u8]> {
        self.records
            .iter()
            .find(|r| r.tag == tag)
            .map(|r| r.value.as_ref())
    }

    /// Values of every record with the given tag, in order
    pub fn all(&self, tag: u8) -> impl Iterator<Item = &[u8]> {
        self.records
            .iter()
            .filter(move |r| r.tag == tag)
            .map(|r| r.value.as_ref())
    }

    /// Value of a record that must be present
    pub fn require(&self, tag: u8) -> Result<&[u8]> {
        self.bytes(tag).ok_or(Error::missing(tag))
    }

    /// Single byte value
    pub fn u8(&self, tag: u8) -> Result<Option<u8>> {
        match self.bytes(tag) {
            None => Ok(None),
            Some([b]) => Ok(Some(*b)),
            Some(_) => Err(Error::invalid(tag, "is not a single byte")),
        }
    }

    /// Big-endian integer value of one or two bytes
    pub fn u16(&self, tag: u8) -> Result<Option<u16>> {
        self.bytes(tag)
            .map(|v| match v.len() {
                1 | 2 => Ok(v.iter().fold(0u16, |acc, b| (acc << 8) | u16::from(*b))),
                _ => Err(Error::invalid(tag, "is not a 16-bit integer")),
            })
            .transpose()
    }

    /// Big-endian integer value of one to four bytes
    pub fn u32(&self, tag: u8) -> Result<Option<u32>> {
        self.bytes(tag)
            .map(|v| match v.len() {
                1..=4 => Ok(v.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b))),
                _ => Err(Error::invalid(tag, "is not a 32-bit integer")),
            })
            .transpose()
    }

    /// UTF-8 string value, with trailing NUL padding removed
    pub fn utf8(&self, tag: u8) -> Result<Option<String>> {
        self.bytes(tag)
            .map(|v| {
                let trimmed = v.split(|b| *b == 0).next().unwrap_or_default();
                std::str::from_utf8(trimmed)
                    .map(str::to_owned)
                    .map_err(|_| Error::invalid(tag, "is not valid UTF-8"))
            })
            .transpose()
    }

    /// Decode the value of a record as a nested list
    pub fn nested(&self, tag: u8) -> Result<Option<TlvList>> {
        self.bytes(tag).map(Self::from_bytes).transpose()
    }

    /// Append a raw record
    pub fn push(&mut self, tag: u8, value: impl Into<Bytes>) -> &mut Self {
        self.records.push(TlvRecord::new(tag, value));
        self
    }

    /// Append a record only when a value is present
    pub fn push_opt(&mut self, tag: u8, value: Option<impl Into<Bytes>>) -> &mut Self {
        if let Some(value) = value {
            self.push(tag, value);
        }
        self
    }

    /// Append a single byte record
    pub fn push_u8(&mut self, tag: u8, value: u8) -> &mut Self {
        self.push(tag, vec![value])
    }

    /// Append a big-endian two byte record
    pub fn push_u16(&mut self, tag: u8, value: u16) -> &mut Self {
        self.push(tag, value.to_be_bytes().to_vec())
    }

    /// Append a big-endian four byte record
    pub fn push_u32(&mut self, tag: u8, value: u32) -> &mut Self {
        self.push(tag, value.to_be_bytes().to_vec())
    }

    /// Append a UTF-8 string record
    pub fn push_str(&mut self, tag: u8, value: &str) -> &mut Self {
        self.push(tag, value.as_bytes().to_vec())
    }

    /// Append a nested list as the value of one record
    pub fn push_nested(&mut self, tag: u8, list: &TlvList) -> Result<&mut Self> {
        let inner = list.to_bytes()?;
        Ok(self.push(tag, inner))
    }
}

impl FromIterator<TlvRecord> for TlvList {
    fn from_iter<I: IntoIterator<Item = TlvRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for TlvList {
    type Item = TlvRecord;
    type IntoIter = std::vec::IntoIter<TlvRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}
