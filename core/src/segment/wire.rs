//! Byte-level encoding for path segments
//!
//! ```text
//! info:     timestamp u32 | seg_id u16 | n_entries u8
//! as_entry: local u64 | next u64 | ingress u16 | egress u16 | exp_time u8 | mtu u16 | sig_len u16 | sig
//! ```
//!
//! All fields are little endian.

use byteorder::{ByteOrder, LittleEndian};
use chrono::{TimeZone, Utc};
use encdec::{DecodeOwned, Encode};

use super::{AsEntry, Info, Segment};
use crate::error::Error;
use crate::types::IsdAs;

/// Encoded length of segment [Info]
pub const INFO_LEN: usize = 7;

/// Encoded length of an [AsEntry] excluding the signature
pub const AS_ENTRY_LEN: usize = 25;

/// Encode a segment for storage
pub fn pack_beacon(segment: &Segment) -> Result<Vec<u8>, Error> {
    let mut buff = vec![0u8; segment.encode_len()?];
    let n = segment.encode(&mut buff)?;
    buff.truncate(n);
    Ok(buff)
}

/// Decode a stored segment, the whole buffer must be consumed
pub fn unpack_beacon(buff: &[u8]) -> Result<Segment, Error> {
    let (segment, n) = Segment::decode_owned(buff)?;

    if n != buff.len() {
        return Err(Error::TrailingBytes(buff.len() - n));
    }

    Ok(segment)
}

impl Encode for Segment {
    type Error = Error;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        let entries: usize = self
            .as_entries
            .iter()
            .map(|e| AS_ENTRY_LEN + e.signature.len())
            .sum();

        Ok(INFO_LEN + entries)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        if self.as_entries.is_empty() {
            return Err(Error::InvalidSegment("no AS entries"));
        }
        if self.as_entries.len() > u8::MAX as usize {
            return Err(Error::InvalidSegment("too many AS entries"));
        }
        if buff.len() < self.encode_len()? {
            return Err(Error::BufferLength);
        }

        let timestamp = u32::try_from(self.info.timestamp.timestamp())
            .map_err(|_| Error::InvalidSegment("timestamp out of range"))?;

        let mut n = 0;

        LittleEndian::write_u32(&mut buff[n..], timestamp);
        n += 4;

        LittleEndian::write_u16(&mut buff[n..], self.info.seg_id);
        n += 2;

        buff[n] = self.as_entries.len() as u8;
        n += 1;

        for e in &self.as_entries {
            n += encode_entry(e, &mut buff[n..])?;
        }

        Ok(n)
    }
}

fn encode_entry(e: &AsEntry, buff: &mut [u8]) -> Result<usize, Error> {
    if !e.local.is_valid() || !e.next.is_valid() {
        return Err(Error::InvalidSegment("AS number out of range"));
    }

    let sig_len =
        u16::try_from(e.signature.len()).map_err(|_| Error::InvalidSegment("signature too long"))?;

    let mut n = 0;

    LittleEndian::write_u64(&mut buff[n..], e.local.into());
    n += 8;

    LittleEndian::write_u64(&mut buff[n..], e.next.into());
    n += 8;

    LittleEndian::write_u16(&mut buff[n..], e.ingress);
    n += 2;

    LittleEndian::write_u16(&mut buff[n..], e.egress);
    n += 2;

    buff[n] = e.exp_time;
    n += 1;

    LittleEndian::write_u16(&mut buff[n..], e.mtu);
    n += 2;

    LittleEndian::write_u16(&mut buff[n..], sig_len);
    n += 2;

    buff[n..][..e.signature.len()].copy_from_slice(&e.signature);
    n += e.signature.len();

    Ok(n)
}

impl DecodeOwned for Segment {
    type Output = Segment;

    type Error = Error;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        if buff.len() < INFO_LEN {
            return Err(Error::BufferLength);
        }

        let mut n = 0;

        let timestamp = LittleEndian::read_u32(&buff[n..]);
        n += 4;

        let seg_id = LittleEndian::read_u16(&buff[n..]);
        n += 2;

        let count = buff[n] as usize;
        n += 1;

        if count == 0 {
            return Err(Error::InvalidSegment("no AS entries"));
        }

        let timestamp = Utc
            .timestamp_opt(timestamp as i64, 0)
            .single()
            .ok_or(Error::InvalidTimestamp)?;

        let mut as_entries = Vec::with_capacity(count);
        for _ in 0..count {
            let (e, m) = decode_entry(&buff[n..])?;
            as_entries.push(e);
            n += m;
        }

        Ok((
            Segment {
                info: Info { timestamp, seg_id },
                as_entries,
            },
            n,
        ))
    }
}

fn decode_entry(buff: &[u8]) -> Result<(AsEntry, usize), Error> {
    if buff.len() < AS_ENTRY_LEN {
        return Err(Error::BufferLength);
    }

    let mut n = 0;

    let local = IsdAs::from(LittleEndian::read_u64(&buff[n..]));
    n += 8;

    let next = IsdAs::from(LittleEndian::read_u64(&buff[n..]));
    n += 8;

    let ingress = LittleEndian::read_u16(&buff[n..]);
    n += 2;

    let egress = LittleEndian::read_u16(&buff[n..]);
    n += 2;

    let exp_time = buff[n];
    n += 1;

    let mtu = LittleEndian::read_u16(&buff[n..]);
    n += 2;

    let sig_len = LittleEndian::read_u16(&buff[n..]) as usize;
    n += 2;

    if buff.len() < n + sig_len {
        return Err(Error::BufferLength);
    }
    let signature = buff[n..][..sig_len].to_vec();
    n += sig_len;

    Ok((
        AsEntry {
            local,
            next,
            ingress,
            egress,
            exp_time,
            mtu,
            signature,
        },
        n,
    ))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::segment::tests::test_segment;

    #[test]
    fn pack_unpack_segment() {
        let s = test_segment(1_700_000_000, &[(10, 63), (0xff00_0000_0110, 12), (12, 255)]);

        let packed = pack_beacon(&s).unwrap();
        assert_eq!(packed.len(), s.encode_len().unwrap());

        let decoded = unpack_beacon(&packed).unwrap();
        assert_eq!(decoded, s);
        assert_eq!(decoded.id(), s.id());
        assert_eq!(decoded.full_id(), s.full_id());
    }

    #[test]
    fn reject_invalid_segments() {
        let empty = test_segment(1_000, &[]);
        assert_eq!(
            pack_beacon(&empty),
            Err(Error::InvalidSegment("no AS entries"))
        );

        let mut s = test_segment(1_000, &[(10, 1)]);
        s.as_entries[0].signature = vec![0u8; u16::MAX as usize + 1];
        assert_eq!(
            pack_beacon(&s),
            Err(Error::InvalidSegment("signature too long"))
        );

        let mut s = test_segment(1_000, &[(10, 1), (11, 1)]);
        s.as_entries[1].local = IsdAs::new(1, (1 << 48) | 5);
        assert_eq!(
            pack_beacon(&s),
            Err(Error::InvalidSegment("AS number out of range"))
        );

        let mut s = test_segment(1_000, &[(10, 1)]);
        s.as_entries[0].next = IsdAs::new(1, u64::MAX);
        assert_eq!(
            pack_beacon(&s),
            Err(Error::InvalidSegment("AS number out of range"))
        );

        let s = test_segment(-1, &[(10, 1)]);
        assert_eq!(
            pack_beacon(&s),
            Err(Error::InvalidSegment("timestamp out of range"))
        );
    }

    #[test]
    fn reject_malformed_buffers() {
        let s = test_segment(1_000, &[(10, 1), (11, 2)]);
        let packed = pack_beacon(&s).unwrap();

        // Truncated in info, entry header, and signature
        for len in [3, INFO_LEN + 4, packed.len() - 1] {
            assert_eq!(unpack_beacon(&packed[..len]), Err(Error::BufferLength));
        }

        let mut extended = packed.clone();
        extended.extend_from_slice(&[0, 0]);
        assert_eq!(unpack_beacon(&extended), Err(Error::TrailingBytes(2)));

        assert_eq!(
            unpack_beacon(&[0u8; INFO_LEN]),
            Err(Error::InvalidSegment("no AS entries"))
        );
    }
}
