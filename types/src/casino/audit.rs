use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, FixedSize, Read, ReadExt, Write};
use serde::{Deserialize, Serialize};

use super::{read_string, string_encode_size, write_string, MAX_ACCOUNT_ID_LENGTH, MAX_NOTE_LENGTH};

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info = 0,
    Warning = 1,
    Critical = 2,
}

impl TryFrom<u8> for Severity {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Severity::Info),
            1 => Ok(Severity::Warning),
            2 => Ok(Severity::Critical),
            _ => Err(()),
        }
    }
}

impl Write for Severity {
    fn write(&self, writer: &mut impl BufMut) {
        (*self as u8).write(writer);
    }
}

impl Read for Severity {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let value = u8::read(reader)?;
        Severity::try_from(value).map_err(|_| Error::InvalidEnum(value))
    }
}

impl EncodeSize for Severity {
    fn encode_size(&self) -> usize {
        u8::SIZE
    }
}

/// One entry of the admin audit trail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub seq: u64,
    pub timestamp_ms: u64,
    pub actor: String,
    pub action: String,
    pub details: String,
    pub severity: Severity,
}

impl Write for AuditEntry {
    fn write(&self, writer: &mut impl BufMut) {
        self.seq.write(writer);
        self.timestamp_ms.write(writer);
        write_string(&self.actor, writer);
        write_string(&self.action, writer);
        write_string(&self.details, writer);
        self.severity.write(writer);
    }
}

impl Read for AuditEntry {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            seq: u64::read(reader)?,
            timestamp_ms: u64::read(reader)?,
            actor: read_string(reader, MAX_ACCOUNT_ID_LENGTH)?,
            action: read_string(reader, MAX_NOTE_LENGTH)?,
            details: read_string(reader, MAX_NOTE_LENGTH)?,
            severity: Severity::read(reader)?,
        })
    }
}

impl EncodeSize for AuditEntry {
    fn encode_size(&self) -> usize {
        self.seq.encode_size()
            + self.timestamp_ms.encode_size()
            + string_encode_size(&self.actor)
            + string_encode_size(&self.action)
            + string_encode_size(&self.details)
            + self.severity.encode_size()
    }
}
