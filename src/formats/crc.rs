//! CRC-64-ISO checksum utilities for the snapshot footer.

use crc::{Crc, CRC_64_GO_ISO};

pub const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_GO_ISO);

/// Compute CRC-64 checksum for a byte slice
pub fn checksum(data: &[u8]) -> u64 {
    CRC64.checksum(data)
}

/// Incremental CRC-64 digest
pub struct Digest {
    digest: crc::Digest<'static, u64>,
}

impl Digest {
    pub fn new() -> Self {
        Self {
            digest: CRC64.digest(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    pub fn finalize(self) -> u64 {
        self.digest.finalize()
    }
}

impl Default for Digest {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc64_incremental_matches_one_shot() {
        let data = b"wait-entry/ride-exit";
        let mut digest = Digest::new();
        digest.update(&data[..7]);
        digest.update(&data[7..]);
        assert_eq!(digest.finalize(), checksum(data));
    }
}
