pub mod commander;
pub mod config;
pub mod crtp;
pub mod error;
pub mod telemetry;

pub use crtp::{CrtpPacket, CrtpPort};
pub use error::ProtoError;

/// Low byte of the sum of every byte. Shared by CRTP and configuration frames.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

#[cfg(test)]
mod tests {
    use super::checksum;

    #[test]
    fn checksum_wraps_modulo_256() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[0x01, 0x02, 0x03]), 0x06);
        assert_eq!(checksum(&[0xFF, 0x02]), 0x01);
        assert_eq!(checksum(&[0x80; 4]), 0x00);
    }
}
