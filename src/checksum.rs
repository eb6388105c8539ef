/// Largest prime below 2^16
const MOD_ADLER: u32 = 65521;
/// Largest n such that 255n(n+1)/2 + (n+1)(MOD_ADLER-1) fits in a u32
const NMAX: usize = 5552;

/// Streaming Adler-32 checksum, as stamped into the `ADLR` trailer
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct Adler32 {
    s1: u32,
    s2: u32,
}

impl Default for Adler32 {
    fn default() -> Self {
        Self::new()
    }
}

impl Adler32 {
    pub fn new() -> Adler32 {
        Adler32 { s1: 1, s2: 0 }
    }

    /// Resumes from a previously computed checksum
    pub fn from_checksum(checksum: u32) -> Adler32 {
        Adler32 {
            s1: checksum & 0xFFFF,
            s2: checksum >> 16,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        for chunk in data.chunks(NMAX) {
            for byte in chunk {
                self.s1 += *byte as u32;
                self.s2 += self.s1;
            }
            self.s1 %= MOD_ADLER;
            self.s2 %= MOD_ADLER;
        }
    }

    pub fn checksum(&self) -> u32 {
        (self.s2 << 16) | self.s1
    }
}

/// Compute the Adler-32 checksum of a whole buffer
pub fn adler32(data: &[u8]) -> u32 {
    let mut adler = Adler32::new();
    adler.update(data);
    adler.checksum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vectors() {
        assert_eq!(adler32(b""), 1);
        assert_eq!(adler32(b"a"), 0x0062_0062);
        assert_eq!(adler32(b"abc"), 0x024D_0127);
        assert_eq!(adler32(b"Wh"), 0x0118_00C0);
        assert_eq!(adler32(b"Wikipedia"), 0x11E6_0398);
        assert_eq!(adler32(b"message digest"), 0x2975_0586);
    }

    #[test]
    fn long_input_wraps_modulus() {
        let data: Vec<u8> = (0..=255u8).cycle().take(256 * 40).collect();
        assert_eq!(adler32(&data), 0xF475_ED1E);
    }

    #[test]
    fn streaming_matches_one_shot() {
        let data: Vec<u8> = (0..=255u8).cycle().take(256 * 40).collect();
        let mut adler = Adler32::new();
        for piece in data.chunks(777) {
            adler.update(piece);
        }
        assert_eq!(adler.checksum(), adler32(&data));

        let (head, tail) = data.split_at(4000);
        let mut resumed = Adler32::from_checksum(adler32(head));
        resumed.update(tail);
        assert_eq!(resumed.checksum(), adler32(&data));
    }
}
