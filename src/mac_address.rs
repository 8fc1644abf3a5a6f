//! Hardware address of a sensor, the key of the device roster.
//!
//! Configuration files spell addresses in all sorts of ways. Parsing accepts
//! either case and `:` or `-` separators; `Display` always produces the
//! canonical `A4:C1:38:12:34:56` form used in logs and diagnostics.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const OCTETS: usize = 6;

/// A Bluetooth device address as six raw octets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct MacAddress(pub [u8; OCTETS]);

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, octet) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{octet:02X}")?;
        }
        Ok(())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseMacError {
    #[error("expected {OCTETS} octets, found {0}")]
    OctetCount(usize),
    #[error("octet {position} ('{octet}') is not two hex digits")]
    BadOctet { position: usize, octet: String },
}

impl FromStr for MacAddress {
    type Err = ParseMacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let octets: Vec<&str> = s.trim().split([':', '-']).collect();
        if octets.len() != OCTETS {
            return Err(ParseMacError::OctetCount(octets.len()));
        }

        let mut bytes = [0u8; OCTETS];
        for (position, (slot, octet)) in bytes.iter_mut().zip(&octets).enumerate() {
            let valid = octet.len() == 2 && octet.bytes().all(|b| b.is_ascii_hexdigit());
            *slot = valid
                .then(|| u8::from_str_radix(octet, 16).ok())
                .flatten()
                .ok_or_else(|| ParseMacError::BadOctet {
                    position,
                    octet: octet.to_string(),
                })?;
        }

        Ok(MacAddress(bytes))
    }
}

#[cfg(feature = "bluer")]
impl From<bluer::Address> for MacAddress {
    fn from(addr: bluer::Address) -> Self {
        Self(addr.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_display() {
        let addr = MacAddress([0xa4, 0xc1, 0x38, 0x0b, 0x00, 0xff]);
        assert_eq!(addr.to_string(), "A4:C1:38:0B:00:FF");
    }

    #[test]
    fn test_spellings_resolve_to_same_address() {
        let canonical: MacAddress = "A4:C1:38:12:34:56".parse().unwrap();
        for spelling in ["a4:c1:38:12:34:56", "A4-C1-38-12-34-56", " a4:C1:38:12:34:56\n"] {
            assert_eq!(spelling.parse::<MacAddress>().unwrap(), canonical, "{spelling:?}");
        }
        assert_eq!(canonical.to_string(), "A4:C1:38:12:34:56");
    }

    #[test]
    fn test_wrong_octet_count() {
        assert_eq!(
            "A4C138123456".parse::<MacAddress>(),
            Err(ParseMacError::OctetCount(1))
        );
        assert_eq!(
            "A4:C1:38:12:34".parse::<MacAddress>(),
            Err(ParseMacError::OctetCount(5))
        );
        assert_eq!(
            "A4:C1:38:12:34:56:78".parse::<MacAddress>(),
            Err(ParseMacError::OctetCount(7))
        );
    }

    #[test]
    fn test_bad_octets() {
        assert_eq!(
            "A4:C1:38:12:34:ZZ".parse::<MacAddress>(),
            Err(ParseMacError::BadOctet {
                position: 5,
                octet: "ZZ".to_string()
            })
        );
        assert_eq!(
            "A4:C1:3:12:34:56".parse::<MacAddress>(),
            Err(ParseMacError::BadOctet {
                position: 2,
                octet: "3".to_string()
            })
        );
        // from_str_radix alone would accept a sign
        assert!(matches!(
            "A4:C1:38:+1:34:56".parse::<MacAddress>(),
            Err(ParseMacError::BadOctet { position: 3, .. })
        ));
    }
}
