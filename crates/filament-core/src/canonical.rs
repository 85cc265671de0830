//! Canonical byte layout for hashing and signing.
//!
//! The canonical form is a total, deterministic mapping: fields in a fixed
//! order, integers fixed-width big-endian, variable-length byte strings
//! length-prefixed with a u32, variant tags as a single leading byte. Two
//! semantically identical values always produce byte-identical output.
//! This layout is what record ids and detached signatures commit to; it is
//! deliberately independent of any wire or snapshot serialization.

/// Append-only canonical byte builder.
#[derive(Default)]
pub struct CanonicalWriter {
    buf: Vec<u8>,
}

impl CanonicalWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn put_u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn put_u64(&mut self, v: u64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    /// Length-prefixed (u32 big-endian) byte string.
    pub fn put_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.put_u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Length-prefixed UTF-8 string.
    pub fn put_str(&mut self, s: &str) -> &mut Self {
        self.put_bytes(s.as_bytes())
    }

    /// Fixed-width 32-byte digest or id, no length prefix.
    pub fn put_digest(&mut self, digest: &[u8; 32]) -> &mut Self {
        self.buf.extend_from_slice(digest);
        self
    }

    /// An absent optional id contributes a single zero byte; a present one
    /// contributes 0x01 followed by the 32 digest bytes.
    pub fn put_opt_digest(&mut self, digest: Option<&[u8; 32]>) -> &mut Self {
        match digest {
            None => self.put_u8(0),
            Some(d) => {
                self.put_u8(1);
                self.put_digest(d)
            }
        }
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_width_big_endian() {
        let mut w = CanonicalWriter::new();
        w.put_u64(1);
        assert_eq!(w.finish(), vec![0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn length_prefixed_strings() {
        let mut w = CanonicalWriter::new();
        w.put_str("ab");
        assert_eq!(w.finish(), vec![0, 0, 0, 2, b'a', b'b']);
    }

    #[test]
    fn optional_digest_tagging() {
        let mut absent = CanonicalWriter::new();
        absent.put_opt_digest(None);
        assert_eq!(absent.finish(), vec![0]);

        let mut present = CanonicalWriter::new();
        present.put_opt_digest(Some(&[7u8; 32]));
        let bytes = present.finish();
        assert_eq!(bytes[0], 1);
        assert_eq!(&bytes[1..], &[7u8; 32]);
    }

    #[test]
    fn identical_input_identical_output() {
        let build = || {
            let mut w = CanonicalWriter::new();
            w.put_u8(2).put_str("transfer").put_u64(42);
            w.finish()
        };
        assert_eq!(build(), build());
    }
}
