use std::fmt;

/// Decode a little endian UTF-16 string that ends at the first NUL code unit
/// or at the end of the buffer, whichever comes first.
pub fn c_wide_string(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|&c| c != 0)
        .collect();

    String::from_utf16_lossy(&units)
}

pub struct PrintableSpoke<'a>(&'a [u8]);

impl<'a> PrintableSpoke<'a> {
    pub fn new<T>(data: &'a T) -> PrintableSpoke<'a>
    where
        T: ?Sized + AsRef<[u8]> + 'a,
    {
        PrintableSpoke(data.as_ref())
    }
}

// One character per 8 bytes, each byte holds two 4 bit pixels
impl fmt::Display for PrintableSpoke<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn intensity(sum: u32) -> char {
            match sum {
                0..8 => ' ',
                8..512 => '.',
                _ => '*',
            }
        }

        write!(f, "[")?;
        for chunk in self.0.chunks(8) {
            if chunk.len() > 4 {
                let sum: u32 = chunk.iter().map(|&b| (b & 0x0f) as u32 + (b >> 4) as u32).sum();
                write!(f, "{}", intensity(sum))?;
            }
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_string_stops_at_nul() {
        let mut bytes = Vec::new();
        for c in "Jan 21 2016".encode_utf16() {
            bytes.extend_from_slice(&c.to_le_bytes());
        }
        bytes.extend_from_slice(&[0, 0, b'x', 0]);

        assert_eq!(c_wide_string(&bytes), "Jan 21 2016");
    }

    #[test]
    fn wide_string_without_terminator() {
        assert_eq!(c_wide_string(&[b'1', 0, b'2', 0, b'3']), "12");
        assert_eq!(c_wide_string(&[]), "");
    }

    #[test]
    fn printable_spoke() {
        let mut data = vec![0u8; 16];
        data.extend_from_slice(&[0xff; 16]);
        assert_eq!(format!("{}", PrintableSpoke::new(&data)), "[  ..]");
    }
}
