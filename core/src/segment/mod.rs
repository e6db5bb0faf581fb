//! Path segment model
//!
//! A [Segment] is the partially constructed path carried by a beacon, made up
//! of an [Info] field set by the originating domain and one [AsEntry] for each
//! domain the beacon has traversed.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};

use crate::error::Error;
use crate::types::{FullId, IsdAs, SegmentId};

mod wire;
pub use wire::*;

/// Maximum lifetime of a hop field
pub const MAX_HOP_TTL_MS: i64 = 24 * 60 * 60 * 1000;

/// Hop expiry granularity, hop fields expire after `(exp_time + 1) * EXP_TIME_UNIT_MS`
pub const EXP_TIME_UNIT_MS: i64 = MAX_HOP_TTL_MS / 256;

/// Segment information set by the originating domain
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Info {
    /// Origination time, whole seconds
    pub timestamp: DateTime<Utc>,
    /// Segment identifier used by the data plane
    pub seg_id: u16,
}

/// Entry added by each domain a beacon traverses
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct AsEntry {
    /// Domain creating the entry
    pub local: IsdAs,
    /// Domain the beacon is forwarded to
    pub next: IsdAs,
    pub ingress: u16,
    pub egress: u16,
    /// Relative hop expiry, see [EXP_TIME_UNIT_MS]
    pub exp_time: u8,
    pub mtu: u16,
    pub signature: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Segment {
    pub info: Info,
    pub as_entries: Vec<AsEntry>,
}

/// A received [Segment] along with the local interface it arrived on
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Beacon {
    pub segment: Segment,
    pub in_if_id: u16,
}

impl Segment {
    pub fn new(info: Info, as_entries: Vec<AsEntry>) -> Self {
        Self { info, as_entries }
    }

    /// Content identifier over the traversed domains and interfaces.
    ///
    /// This excludes timestamps and signatures so re-originated instances of
    /// the same path share an ID.
    pub fn id(&self) -> SegmentId {
        let mut h = Sha256::new();

        for e in &self.as_entries {
            h.update(u64::from(e.local).to_be_bytes());
            h.update(e.ingress.to_be_bytes());
            h.update(e.egress.to_be_bytes());
        }

        SegmentId::new(h.finalize().into())
    }

    /// Content identifier over the full segment, including info fields and signatures
    pub fn full_id(&self) -> FullId {
        let mut h = Sha256::new();

        h.update(self.id());
        h.update(self.info.timestamp.timestamp().to_be_bytes());
        h.update(self.info.seg_id.to_be_bytes());

        for e in &self.as_entries {
            h.update(u64::from(e.next).to_be_bytes());
            h.update([e.exp_time]);
            h.update(e.mtu.to_be_bytes());
            h.update(&e.signature);
        }

        FullId::new(h.finalize().into())
    }

    /// Domain the segment was originated by
    pub fn first_ia(&self) -> Option<IsdAs> {
        self.as_entries.first().map(|e| e.local)
    }

    pub fn hop_count(&self) -> usize {
        self.as_entries.len()
    }

    /// Latest expiry of any hop in the segment
    pub fn max_expiry(&self) -> Result<DateTime<Utc>, Error> {
        let max_exp = self
            .as_entries
            .iter()
            .map(|e| e.exp_time)
            .max()
            .ok_or(Error::NoAsEntries)?;

        let ttl = Duration::milliseconds((max_exp as i64 + 1) * EXP_TIME_UNIT_MS);

        self.info
            .timestamp
            .checked_add_signed(ttl)
            .ok_or(Error::InvalidTimestamp)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    pub(crate) fn test_segment(ts: i64, hops: &[(u64, u8)]) -> Segment {
        let info = Info {
            timestamp: Utc.timestamp_opt(ts, 0).unwrap(),
            seg_id: 0x1234,
        };

        let as_entries = hops
            .iter()
            .enumerate()
            .map(|(i, (asn, exp_time))| AsEntry {
                local: IsdAs::new(1, *asn),
                next: IsdAs::new(1, asn + 1),
                ingress: i as u16,
                egress: i as u16 + 1,
                exp_time: *exp_time,
                mtu: 1472,
                signature: vec![0xa5; 8 + i],
            })
            .collect();

        Segment::new(info, as_entries)
    }

    #[test]
    fn segment_ids() {
        let a = test_segment(1_000, &[(10, 63), (11, 63)]);
        let mut b = test_segment(2_000, &[(10, 63), (11, 63)]);

        // Timestamps do not affect the segment id but do change the full id
        assert_eq!(a.id(), b.id());
        assert_ne!(a.full_id(), b.full_id());

        // Signatures only impact the full id
        b.info.timestamp = a.info.timestamp;
        b.as_entries[1].signature = vec![0x5a; 4];
        assert_eq!(a.id(), b.id());
        assert_ne!(a.full_id(), b.full_id());

        let c = test_segment(1_000, &[(10, 63), (12, 63)]);
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn segment_expiry() {
        let s = test_segment(1_000, &[(10, 0), (11, 255), (12, 3)]);

        // Longest lived hop determines segment expiry
        assert_eq!(
            s.max_expiry().unwrap(),
            Utc.timestamp_opt(1_000 + 24 * 60 * 60, 0).unwrap()
        );

        let s = test_segment(1_000, &[(10, 0)]);
        assert_eq!(
            s.max_expiry().unwrap(),
            Utc.timestamp_opt(1_337, 500_000_000).unwrap()
        );

        let s = test_segment(1_000, &[]);
        assert_eq!(s.max_expiry(), Err(Error::NoAsEntries));
        assert_eq!(s.first_ia(), None);
    }
}
