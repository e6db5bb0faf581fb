use core::fmt;
use core::str::FromStr;

use crate::error::Error;

bitflags::bitflags! {
    /// Purposes a stored beacon qualifies for
    #[derive(Default)]
    #[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
    pub struct Usage: u8 {
        /// Usable for up-segment registration
        const UP_REG      = 0b0000_0001;
        /// Usable for down-segment registration
        const DOWN_REG    = 0b0000_0010;
        /// Usable for core-segment registration
        const CORE_REG    = 0b0000_0100;
        /// Usable for propagation to neighbours
        const PROPAGATION = 0b0000_1000;
    }
}

const USAGE_NAMES: &[(Usage, &str)] = &[
    (Usage::UP_REG, "up_reg"),
    (Usage::DOWN_REG, "down_reg"),
    (Usage::CORE_REG, "core_reg"),
    (Usage::PROPAGATION, "prop"),
];

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }

        let mut first = true;
        for (flag, name) in USAGE_NAMES {
            if !self.contains(*flag) {
                continue;
            }
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{name}")?;
            first = false;
        }

        Ok(())
    }
}

/// Parse a comma-separated list of usage names, eg. `prop,up_reg`
impl FromStr for Usage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut usage = Usage::empty();

        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let flag = match part.to_ascii_lowercase().as_str() {
                "none" => Usage::empty(),
                "propagation" => Usage::PROPAGATION,
                name => USAGE_NAMES
                    .iter()
                    .find(|(_, n)| *n == name)
                    .map(|(f, _)| *f)
                    .ok_or_else(|| Error::InvalidUsage(part.to_string()))?,
            };
            usage |= flag;
        }

        Ok(usage)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn usage_names() {
        let u: Usage = "prop, up_reg".parse().unwrap();
        assert_eq!(u, Usage::PROPAGATION | Usage::UP_REG);
        assert_eq!(u.to_string(), "up_reg,prop");

        assert_eq!("none".parse::<Usage>(), Ok(Usage::empty()));
        assert_eq!(Usage::empty().to_string(), "none");

        assert_eq!(
            "prop,bogus".parse::<Usage>(),
            Err(Error::InvalidUsage("bogus".to_string()))
        );
    }
}
