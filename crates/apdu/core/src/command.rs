//! Command APDU framing
//!
//! A command is a four byte header (CLA INS P1 P2) followed by an optional data field and an
//! optional expected response length. Two length forms exist: short, where Lc and Le take a
//! byte each, and extended, where Lc is `00 hi lo` and Le is two bytes (three without data).

use bytes::{BufMut, Bytes, BytesMut};

use crate::{Error, Result};

/// How Lc and Le are written on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthForm {
    /// One byte Lc and Le, data up to 255 bytes
    Short,
    /// Three byte Lc, two or three byte Le, data up to 65535 bytes
    Extended,
}

impl LengthForm {
    /// The form needed for a data field of `lc` bytes and an optional `le`
    pub const fn for_lengths(lc: usize, le: Option<u16>) -> Self {
        let le_extended = match le {
            Some(le) => le > 0x100,
            None => false,
        };
        if lc > 0xFF || le_extended {
            Self::Extended
        } else {
            Self::Short
        }
    }

    const fn lc_size(self) -> usize {
        match self {
            Self::Short => 1,
            Self::Extended => 3,
        }
    }

    const fn le_size(self, has_data: bool) -> usize {
        match (self, has_data) {
            (Self::Short, _) => 1,
            (Self::Extended, true) => 2,
            (Self::Extended, false) => 3,
        }
    }
}

/// Anything that can be framed as a command APDU
pub trait ApduCommand {
    /// Class byte
    fn class(&self) -> u8;

    /// Instruction byte
    fn instruction(&self) -> u8;

    /// First parameter
    fn p1(&self) -> u8;

    /// Second parameter
    fn p2(&self) -> u8;

    /// Data field, `None` or empty when the command carries no data
    fn data(&self) -> Option<&[u8]>;

    /// Expected response length
    fn expected_length(&self) -> Option<u16> {
        None
    }

    /// Header bytes in wire order
    fn header(&self) -> [u8; 4] {
        [self.class(), self.instruction(), self.p1(), self.p2()]
    }

    /// Length form this command is framed with
    fn length_form(&self) -> LengthForm {
        LengthForm::for_lengths(self.data().map_or(0, <[u8]>::len), self.expected_length())
    }

    /// Size of the framed command in bytes
    fn command_length(&self) -> usize {
        let form = self.length_form();
        let data_len = self.data().map_or(0, <[u8]>::len);

        let body = if data_len > 0 { form.lc_size() + data_len } else { 0 };
        let le = match self.expected_length() {
            Some(_) => form.le_size(data_len > 0),
            None => 0,
        };
        4 + body + le
    }

    /// Frame the command
    fn to_bytes(&self) -> Bytes {
        let form = self.length_form();
        let mut buffer = BytesMut::with_capacity(self.command_length());
        buffer.put_slice(&self.header());

        let data = self.data().filter(|d| !d.is_empty());
        if let Some(data) = data {
            match form {
                LengthForm::Short => buffer.put_u8(data.len() as u8),
                LengthForm::Extended => {
                    debug_assert!(data.len() <= 0xFFFF);
                    buffer.put_u8(0x00);
                    buffer.put_u16(data.len() as u16);
                }
            }
            buffer.put_slice(data);
        }

        if let Some(le) = self.expected_length() {
            match form {
                LengthForm::Short => buffer.put_u8(le as u8),
                LengthForm::Extended => {
                    if data.is_none() {
                        buffer.put_u8(0x00);
                    }
                    buffer.put_u16(le);
                }
            }
        }

        buffer.freeze()
    }
}

/// A plain command APDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Class byte
    pub cla: u8,
    /// Instruction byte
    pub ins: u8,
    /// First parameter
    pub p1: u8,
    /// Second parameter
    pub p2: u8,
    /// Data field
    pub data: Option<Bytes>,
    /// Expected response length
    pub le: Option<u16>,
}

impl Command {
    /// A command with only a header
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: None,
        }
    }

    /// Attach a data field
    pub fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub const fn with_le(mut self, le: u16) -> Self {
        self.le = Some(le);
        self
    }

    /// Parse a framed command in either length form
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let [cla, ins, p1, p2, body @ ..] = raw else {
            return Err(Error::InvalidCommandLength(raw.len()));
        };
        let mut command = Self::new(*cla, *ins, *p1, *p2);

        let (lc, rest, form) = match body {
            [] => return Ok(command),
            [le] => return Ok(command.with_le(u16::from(*le))),
            [0x00, hi, lo] => return Ok(command.with_le(u16::from_be_bytes([*hi, *lo]))),
            [0x00, hi, lo, rest @ ..] => (
                usize::from(u16::from_be_bytes([*hi, *lo])),
                rest,
                LengthForm::Extended,
            ),
            [lc, rest @ ..] => (usize::from(*lc), rest, LengthForm::Short),
        };

        if rest.len() < lc {
            return Err(Error::InvalidCommandLength(raw.len()));
        }
        let (data, trailer) = rest.split_at(lc);
        command.le = match (form, trailer) {
            (_, []) => None,
            (LengthForm::Short, [le]) => Some(u16::from(*le)),
            (LengthForm::Extended, [hi, lo]) => Some(u16::from_be_bytes([*hi, *lo])),
            _ => return Err(Error::InvalidCommandLength(raw.len())),
        };
        if !data.is_empty() {
            command.data = Some(Bytes::copy_from_slice(data));
        }

        Ok(command)
    }
}

impl ApduCommand for Command {
    fn class(&self) -> u8 {
        self.cla
    }

    fn instruction(&self) -> u8 {
        self.ins
    }

    fn p1(&self) -> u8 {
        self.p1
    }

    fn p2(&self) -> u8 {
        self.p2
    }

    fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    fn expected_length(&self) -> Option<u16> {
        self.le
    }
}
