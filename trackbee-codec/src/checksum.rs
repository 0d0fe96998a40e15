//! Checksum and check-digit families used across vendor wire formats.
//!
//! Verification is always recompute-and-compare; the wire value is never
//! trusted on its own. The CRC families are declared as [`crc::Algorithm`]
//! constants so a protocol module can also feed a [`crc::Digest`]
//! incrementally when it encodes replies.

/// CRC-16/CCITT, also known as CRC-16/KERMIT. Reflected, init 0.
pub const CRC_16_CCITT: crc::Algorithm<u16> = crc::CRC_16_KERMIT;

/// CRC-16/CCITT-FALSE (CRC-16/IBM-3740). Unreflected, init 0xffff.
pub const CRC_16_CCITT_FALSE: crc::Algorithm<u16> = crc::CRC_16_IBM_3740;

/// CRC-16/X.25 (CRC-16/IBM-SDLC). The GT06 family of trackers checksums
/// with this one.
pub const CRC_16_X25: crc::Algorithm<u16> = crc::CRC_16_IBM_SDLC;

/// Plain CRC-32 (ISO-HDLC).
pub const CRC_32: crc::Algorithm<u32> = crc::CRC_32_ISO_HDLC;

/// Checksum family selected by a protocol's framing configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChecksumFamily {
    Crc16Ccitt,
    Crc16CcittFalse,
    Crc16X25,
    Crc32,
    /// Byte-wise XOR over the covered range, one byte wide.
    Xor8,
}

impl ChecksumFamily {
    /// Width of the checksum on the wire, in bytes.
    pub fn width(&self) -> usize {
        match self {
            Self::Crc16Ccitt | Self::Crc16CcittFalse | Self::Crc16X25 => 2,
            Self::Crc32 => 4,
            Self::Xor8 => 1,
        }
    }

    /// Computes the checksum over `data`, widened to `u32`.
    pub fn compute(&self, data: &[u8]) -> u32 {
        match self {
            Self::Crc16Ccitt => {
                const CRC: crc::Crc<u16> = crc::Crc::<u16>::new(&CRC_16_CCITT);
                CRC.checksum(data).into()
            }
            Self::Crc16CcittFalse => {
                const CRC: crc::Crc<u16> = crc::Crc::<u16>::new(&CRC_16_CCITT_FALSE);
                CRC.checksum(data).into()
            }
            Self::Crc16X25 => {
                const CRC: crc::Crc<u16> = crc::Crc::<u16>::new(&CRC_16_X25);
                CRC.checksum(data).into()
            }
            Self::Crc32 => {
                const CRC: crc::Crc<u32> = crc::Crc::<u32>::new(&CRC_32);
                CRC.checksum(data)
            }
            Self::Xor8 => xor8(data).into(),
        }
    }

    /// Recomputes over `data` and compares against the wire value.
    pub fn verify(&self, data: &[u8], wire: u32) -> bool {
        self.compute(data) == wire
    }
}

/// Byte-wise XOR over `data`.
pub fn xor8(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, byte| acc ^ byte)
}

/// Validates a number whose last decimal digit is a Luhn check digit.
///
/// Used for device identifiers embedded as a numeric unit ID rather than a
/// full IMEI. `luhn_valid(0)` is true (a lone check digit of 0).
pub fn luhn_valid(number: u64) -> bool {
    luhn_check_digit(number / 10) == (number % 10) as u8
}

/// Derives the Luhn check digit for `number`.
pub fn luhn_check_digit(mut number: u64) -> u8 {
    let mut sum = 0u64;
    let mut double = true;
    while number > 0 {
        let mut digit = number % 10;
        if double {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
        double = !double;
        number /= 10;
    }
    ((10 - sum % 10) % 10) as u8
}

#[cfg(test)]
mod tests {
    use crate::checksum::{
        ChecksumFamily,
        luhn_check_digit,
        luhn_valid,
        xor8,
    };

    const CHECK_INPUT: &[u8] = b"123456789";

    #[test]
    fn known_check_values() {
        assert_eq!(ChecksumFamily::Crc16Ccitt.compute(CHECK_INPUT), 0x2189);
        assert_eq!(ChecksumFamily::Crc16CcittFalse.compute(CHECK_INPUT), 0x29b1);
        assert_eq!(ChecksumFamily::Crc16X25.compute(CHECK_INPUT), 0x906e);
        assert_eq!(ChecksumFamily::Crc32.compute(CHECK_INPUT), 0xcbf43926);
        assert_eq!(xor8(CHECK_INPUT), 0x31);
    }

    #[test]
    fn single_byte_flip_fails_verification() {
        let families = [
            ChecksumFamily::Crc16Ccitt,
            ChecksumFamily::Crc16CcittFalse,
            ChecksumFamily::Crc16X25,
            ChecksumFamily::Crc32,
            ChecksumFamily::Xor8,
        ];

        for family in families {
            let wire = family.compute(CHECK_INPUT);
            assert!(family.verify(CHECK_INPUT, wire));

            for index in 0..CHECK_INPUT.len() {
                let mut corrupted = CHECK_INPUT.to_vec();
                corrupted[index] ^= 0x01;
                assert!(
                    !family.verify(&corrupted, wire),
                    "{family:?} did not detect a flip at byte {index}"
                );
            }
        }
    }

    #[test]
    fn luhn_imei() {
        // 490154203237518 is the GSM documentation example IMEI.
        assert!(luhn_valid(490154203237518));
        assert!(!luhn_valid(490154203237517));
        assert_eq!(luhn_check_digit(49015420323751), 8);
    }

    #[test]
    fn luhn_zero() {
        assert_eq!(luhn_check_digit(0), 0);
        assert!(luhn_valid(0));
    }
}
