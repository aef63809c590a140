//! Length-prefixed string encoding shared by the persisted records.
//!
//! Strings are a `u32` byte length followed by UTF-8. Readers take a bound so a corrupt length
//! never allocates more than the field allows.

use bytes::{Buf, BufMut};
use commonware_codec::{Error, FixedSize, ReadExt, Write};

pub fn write_string(s: &str, writer: &mut impl BufMut) {
    (s.len() as u32).write(writer);
    writer.put_slice(s.as_bytes());
}

pub fn read_string(reader: &mut impl Buf, max_len: usize) -> Result<String, Error> {
    let len = u32::read(reader)? as usize;
    if len > max_len {
        return Err(Error::Invalid("String", "too long"));
    }
    if reader.remaining() < len {
        return Err(Error::EndOfBuffer);
    }
    let mut raw = vec![0u8; len];
    reader.copy_to_slice(&mut raw);
    String::from_utf8(raw).map_err(|_| Error::Invalid("String", "invalid UTF-8"))
}

pub fn string_encode_size(s: &str) -> usize {
    u32::SIZE + s.len()
}

/// Presence byte, then the string when present.
pub fn write_opt_string(s: Option<&str>, writer: &mut impl BufMut) {
    s.is_some().write(writer);
    if let Some(s) = s {
        write_string(s, writer);
    }
}

pub fn read_opt_string(reader: &mut impl Buf, max_len: usize) -> Result<Option<String>, Error> {
    match bool::read(reader)? {
        true => read_string(reader, max_len).map(Some),
        false => Ok(None),
    }
}

pub fn opt_string_encode_size(s: Option<&str>) -> usize {
    u8::SIZE + s.map_or(0, string_encode_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn account_id_round_trips_within_bound() {
        let mut buf = BytesMut::new();
        write_string("0712345678", &mut buf);
        assert_eq!(buf.len(), string_encode_size("0712345678"));

        let mut reader = buf.as_ref();
        assert_eq!(read_string(&mut reader, 10).unwrap(), "0712345678");
        assert!(reader.is_empty());

        let mut reader = buf.as_ref();
        assert!(matches!(
            read_string(&mut reader, 9),
            Err(Error::Invalid("String", "too long"))
        ));
    }

    #[test]
    fn short_or_invalid_payloads_rejected() {
        let mut buf = BytesMut::new();
        (8u32).write(&mut buf);
        buf.extend_from_slice(b"root");
        assert!(matches!(
            read_string(&mut buf.as_ref(), 64),
            Err(Error::EndOfBuffer)
        ));

        let mut buf = BytesMut::new();
        (2u32).write(&mut buf);
        buf.extend_from_slice(&[0xc3, 0x28]);
        assert!(matches!(
            read_string(&mut buf.as_ref(), 64),
            Err(Error::Invalid("String", "invalid UTF-8"))
        ));
    }

    #[test]
    fn room_note_presence_survives() {
        let mut buf = BytesMut::new();
        write_opt_string(Some("turbo"), &mut buf);
        write_opt_string(None, &mut buf);
        assert_eq!(
            buf.len(),
            opt_string_encode_size(Some("turbo")) + opt_string_encode_size(None)
        );

        let mut reader = buf.as_ref();
        assert_eq!(
            read_opt_string(&mut reader, 32).unwrap().as_deref(),
            Some("turbo")
        );
        assert_eq!(read_opt_string(&mut reader, 32).unwrap(), None);
    }

    #[test]
    fn random_bytes_never_exceed_bound() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..300 {
            let len = rng.gen_range(0..256);
            let noise: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            if let Ok(s) = read_string(&mut noise.as_slice(), 32) {
                assert!(s.len() <= 32);
            }
        }
    }
}
