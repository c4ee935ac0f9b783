//! SECS-I block checksum

/// Block checksum calculator
///
/// The checksum is the arithmetic sum of the header and data bytes,
/// truncated to 16 bits. The length byte is not included.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChecksumCalc {
    sum: u16,
}

impl ChecksumCalc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.sum = 0;
    }

    pub fn update(&mut self, byte: u8) {
        self.sum = self.sum.wrapping_add(byte as u16);
    }

    pub fn update_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.update(byte);
        }
    }

    pub fn value(&self) -> u16 {
        self.sum
    }
}

/// Checksum of `bytes`
pub fn checksum(bytes: &[u8]) -> u16 {
    let mut calc = ChecksumCalc::new();
    calc.update_bytes(bytes);
    calc.value()
}
