//! 4-bit IMA (Intel/DVI) ADPCM as used by Pleo USF sounds.
//!
//! Both directions start from a zero prediction and the smallest step, and
//! pack two samples per byte with the first sample in the high nibble.

const INDEX_TABLE: [i32; 16] = [-1, -1, -1, -1, 2, 4, 6, 8, -1, -1, -1, -1, 2, 4, 6, 8];

const MAX_STEP_INDEX: i32 = 88;
const STEP_TABLE: [i32; MAX_STEP_INDEX as usize + 1] = [
    7, 8, 9, 10, 11, 12, 13, 14, 16, 17, 19, 21, 23, 25, 28, 31, 34, 37, 41, 45, 50, 55, 60, 66,
    73, 80, 88, 97, 107, 118, 130, 143, 157, 173, 190, 209, 230, 253, 279, 307, 337, 371, 408,
    449, 494, 544, 598, 658, 724, 796, 876, 963, 1060, 1166, 1282, 1411, 1552, 1707, 1878, 2066,
    2272, 2499, 2749, 3024, 3327, 3660, 4026, 4428, 4871, 5358, 5894, 6484, 7132, 7845, 8630,
    9493, 10442, 11487, 12635, 13899, 15289, 16818, 18500, 20350, 22385, 24623, 27086, 29794,
    32767,
];

/// Width and encoding of a raw PCM sample
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum SampleWidth {
    /// Unsigned 8-bit, silence at 128
    U8,
    /// Signed 16-bit little-endian
    I16,
    /// Signed 32-bit little-endian; only the upper 16 bits are coded
    I32,
}

impl SampleWidth {
    pub fn bytes(self) -> usize {
        match self {
            SampleWidth::U8 => 1,
            SampleWidth::I16 => 2,
            SampleWidth::I32 => 4,
        }
    }

    pub fn from_bits(bits: u16) -> Option<SampleWidth> {
        match bits {
            8 => Some(SampleWidth::U8),
            16 => Some(SampleWidth::I16),
            32 => Some(SampleWidth::I32),
            _ => None,
        }
    }

    fn read(self, sample: &[u8]) -> i32 {
        match self {
            SampleWidth::U8 => sample[0] as i32 - 128,
            SampleWidth::I16 => i16::from_le_bytes([sample[0], sample[1]]) as i32,
            SampleWidth::I32 => {
                i32::from_le_bytes([sample[0], sample[1], sample[2], sample[3]]) >> 16
            }
        }
    }

    fn push(self, value: i32, out: &mut Vec<u8>) {
        match self {
            SampleWidth::U8 => out.push((value + 128).clamp(0, 255) as u8),
            SampleWidth::I16 => out.extend_from_slice(&(value as i16).to_le_bytes()),
            SampleWidth::I32 => out.extend_from_slice(&(value << 16).to_le_bytes()),
        }
    }
}

#[derive(Debug, Default)]
struct Predictor {
    value: i32,
    index: i32,
}

impl Predictor {
    fn step(&self) -> i32 {
        STEP_TABLE[self.index as usize]
    }

    /// Applies a 4-bit code, returning the new predicted sample
    fn apply(&mut self, code: u8) -> i32 {
        let step = self.step();
        let magnitude = code & 7;
        let mut diff = step >> 3;
        if magnitude & 4 != 0 {
            diff += step;
        }
        if magnitude & 2 != 0 {
            diff += step >> 1;
        }
        if magnitude & 1 != 0 {
            diff += step >> 2;
        }
        if code & 8 != 0 {
            self.value -= diff;
        } else {
            self.value += diff;
        }
        self.value = self.value.clamp(-32768, 32767);
        self.index = (self.index + INDEX_TABLE[code as usize]).clamp(0, MAX_STEP_INDEX);
        self.value
    }

    /// Picks the code that best approximates `sample` and applies it
    fn encode(&mut self, sample: i32) -> u8 {
        let mut diff = sample - self.value;
        let sign = if diff < 0 {
            diff = -diff;
            8
        } else {
            0
        };
        let mut step = self.step();
        let mut code = 0;
        if diff >= step {
            code = 4;
            diff -= step;
        }
        step >>= 1;
        if diff >= step {
            code |= 2;
            diff -= step;
        }
        step >>= 1;
        if diff >= step {
            code |= 1;
        }
        let code = code | sign;
        self.apply(code);
        code
    }
}

/// Compresses raw PCM samples to ADPCM. A trailing odd sample is dropped.
pub fn encode_adpcm(pcm: &[u8], width: SampleWidth) -> Vec<u8> {
    let mut predictor = Predictor::default();
    let mut out = Vec::with_capacity(pcm.len() / (2 * width.bytes()) + 1);
    let mut high = None;
    for sample in pcm.chunks_exact(width.bytes()) {
        let code = predictor.encode(width.read(sample));
        match high.take() {
            None => high = Some(code),
            Some(first) => out.push(first << 4 | code),
        }
    }
    out
}

/// Expands ADPCM data to raw PCM samples of the given width
pub fn decode_adpcm(adpcm: &[u8], width: SampleWidth) -> Vec<u8> {
    let mut predictor = Predictor::default();
    let mut out = Vec::with_capacity(adpcm.len() * 2 * width.bytes());
    for byte in adpcm {
        for code in [byte >> 4, byte & 0x0F].iter().copied() {
            let value = predictor.apply(code);
            width.push(value, &mut out);
        }
    }
    out
}
