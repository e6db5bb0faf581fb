use core::fmt;

/// Length of content-derived segment identifiers
pub const SEGMENT_ID_LEN: usize = 32;

macro_rules! content_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
        pub struct $name([u8; SEGMENT_ID_LEN]);

        impl $name {
            pub const fn new(v: [u8; SEGMENT_ID_LEN]) -> Self {
                Self(v)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<[u8; SEGMENT_ID_LEN]> for $name {
            fn from(v: [u8; SEGMENT_ID_LEN]) -> Self {
                Self(v)
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = core::array::TryFromSliceError;

            fn try_from(v: &[u8]) -> Result<Self, Self::Error> {
                Ok(Self(v.try_into()?))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", bs58::encode(&self.0).into_string())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }
    };
}

content_id!(
    SegmentId,
    "Identifies the hops of a path segment, independent of timestamps and signatures"
);

content_id!(
    FullId,
    "Identifies a specific instance of a path segment, including info fields and signatures"
);
