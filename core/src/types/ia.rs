use core::fmt;
use core::str::FromStr;

use crate::error::Error;

/// Isolation domain identifier
pub type Isd = u16;

/// Autonomous system number, limited to 48 bits
pub type Asn = u64;

/// Largest valid AS number
pub const MAX_ASN: Asn = (1 << 48) - 1;

/// AS numbers up to this value are written in BGP-style decimal
const MAX_BGP_ASN: Asn = u32::MAX as Asn;

/// [IsdAs] identifies a routing domain, and is used to track where
/// a path segment originated.
///
/// The text form is `<isd>-<as>`, where the AS is either a decimal BGP AS
/// number or three colon-separated 16-bit hex groups (`1-ff00:0:110`).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct IsdAs {
    pub isd: Isd,
    pub asn: Asn,
}

impl IsdAs {
    pub const fn new(isd: Isd, asn: Asn) -> Self {
        Self { isd, asn }
    }

    /// Zero identifiers are used as a wildcard / unset value
    pub fn is_zero(&self) -> bool {
        self.isd == 0 && self.asn == 0
    }

    /// Check the AS number fits in 48 bits, wider values cannot be packed
    pub fn is_valid(&self) -> bool {
        self.asn <= MAX_ASN
    }
}

impl From<IsdAs> for u64 {
    fn from(ia: IsdAs) -> Self {
        ((ia.isd as u64) << 48) | (ia.asn & MAX_ASN)
    }
}

impl From<u64> for IsdAs {
    fn from(v: u64) -> Self {
        Self {
            isd: (v >> 48) as Isd,
            asn: v & MAX_ASN,
        }
    }
}

impl fmt::Display for IsdAs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.asn <= MAX_BGP_ASN {
            return write!(f, "{}-{}", self.isd, self.asn);
        }

        write!(
            f,
            "{}-{:x}:{:x}:{:x}",
            self.isd,
            (self.asn >> 32) & 0xffff,
            (self.asn >> 16) & 0xffff,
            self.asn & 0xffff
        )
    }
}

impl FromStr for IsdAs {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (isd, asn) = s.split_once('-').ok_or(Error::InvalidIsdAs)?;

        let isd = isd.parse::<Isd>().map_err(|_| Error::InvalidIsdAs)?;
        let asn = parse_asn(asn)?;

        Ok(Self { isd, asn })
    }
}

fn parse_asn(s: &str) -> Result<Asn, Error> {
    if !s.contains(':') {
        let asn = s.parse::<Asn>().map_err(|_| Error::InvalidIsdAs)?;
        if asn > MAX_BGP_ASN {
            return Err(Error::InvalidIsdAs);
        }
        return Ok(asn);
    }

    let mut asn: Asn = 0;
    let mut groups = 0;

    for g in s.split(':') {
        if g.is_empty() || g.len() > 4 {
            return Err(Error::InvalidIsdAs);
        }
        let v = u16::from_str_radix(g, 16).map_err(|_| Error::InvalidIsdAs)?;
        asn = (asn << 16) | v as Asn;
        groups += 1;
    }

    if groups != 3 {
        return Err(Error::InvalidIsdAs);
    }

    Ok(asn)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parse_display_isd_as() {
        let tests = [
            ("1-ff00:0:110", IsdAs::new(1, 0xff00_0000_0110)),
            ("2-64512", IsdAs::new(2, 64512)),
            ("0-0", IsdAs::new(0, 0)),
        ];

        for (s, ia) in tests {
            assert_eq!(s.parse::<IsdAs>(), Ok(ia));
            assert_eq!(ia.to_string(), s);
        }
    }

    #[test]
    fn reject_invalid_isd_as() {
        for s in ["", "1", "1-", "-1", "1-ff00:0", "1-ff00:0:110:1", "1-fffff:0:0", "1-4294967296", "70000-1"] {
            assert_eq!(s.parse::<IsdAs>(), Err(Error::InvalidIsdAs), "input: '{s}'");
        }
    }

    #[test]
    fn isd_as_packing() {
        let ia = IsdAs::new(7, 0xff00_0000_0222);
        let raw = u64::from(ia);

        assert_eq!(raw >> 48, 7);
        assert_eq!(IsdAs::from(raw), ia);
        assert!(IsdAs::default().is_zero());

        assert!(IsdAs::new(1, MAX_ASN).is_valid());
        assert!(!IsdAs::new(1, MAX_ASN + 1).is_valid());
    }
}
