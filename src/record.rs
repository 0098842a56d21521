//! Record codec (spec §4.A): pack/unpack log record headers, transaction
//! commit records, and per-record CRC/length validation.
//!
//! On-disk format (little-endian throughout), see spec §6:
//!
//! ```text
//! [ header_crc:u32 ][ total_len:u32 ][ rec_type:u8 ][ op:u8 ][ reserved:u16 ]
//! [ rid:u64 ][ gen:u64 ][ txid:u64 ][ seqno:u64 ][ cnid:u64 ]
//! [ key_len:u32 ][ value_len:u32 ][ reserved:u32 ]
//! [ key bytes ][ value bytes ]
//! [ payload_crc:u32 ]
//! ```
//!
//! `header_crc` covers every header byte from `total_len` onward.
//! `payload_crc` covers the raw key+value bytes (empty for tx-meta/skip
//! records). `value_len == NIL_VALUE_LEN` marks a delete with no value.

use std::convert::TryInto;

use crate::error::{ReplayError, Result};

pub const HEADER_LEN: usize = 64;
const TRAILER_LEN: usize = 4;

/// Sentinel `value_len` meaning "no value" (a delete, as opposed to a put of
/// a zero-length value).
pub const NIL_VALUE_LEN: u32 = u32::MAX;

/// `op` value on a [`RecordType::Skip`] record that marks the end of a
/// record group: the offset beyond which only transaction fragments may
/// legally appear (spec glossary: "record-group end").
pub const EORG_MARKER: u8 = 1;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum RecordType {
    NonTxMutation = 0,
    TxMutation = 1,
    TxMeta = 2,
    Skip = 3,
}

impl RecordType {
    fn from_u8(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::NonTxMutation),
            1 => Some(Self::TxMutation),
            2 => Some(Self::TxMeta),
            3 => Some(Self::Skip),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Op {
    Put = 0,
    Del = 1,
    PDel = 2,
}

impl Op {
    fn from_u8(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Put),
            1 => Some(Self::Del),
            2 => Some(Self::PDel),
            _ => None,
        }
    }
}

/// Tx-meta subtype, carried in the `op` byte of a [`RecordType::TxMeta`]
/// record.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum TxMeta {
    Begin = 0,
    Commit = 1,
    Abort = 2,
}

impl TxMeta {
    fn from_u8(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Begin),
            1 => Some(Self::Commit),
            2 => Some(Self::Abort),
            _ => None,
        }
    }
}

/// Min/max accumulator over seqno/gen/txid, folded across every valid
/// record seen in a file (spec §4.C).
#[derive(Clone, Copy, Debug)]
pub struct MinMaxInfo {
    pub min_seqno: u64,
    pub max_seqno: u64,
    pub min_gen: u64,
    pub max_gen: u64,
    pub min_txid: u64,
    pub max_txid: u64,
}

impl MinMaxInfo {
    pub const UNSET: u64 = u64::MAX;

    pub fn empty() -> Self {
        Self {
            min_seqno: Self::UNSET,
            max_seqno: 0,
            min_gen: Self::UNSET,
            max_gen: 0,
            min_txid: Self::UNSET,
            max_txid: 0,
        }
    }

    fn observe(&mut self, seqno: u64, gen: u64, txid: u64) {
        self.min_seqno = self.min_seqno.min(seqno);
        self.max_seqno = self.max_seqno.max(seqno);
        self.min_gen = self.min_gen.min(gen);
        self.max_gen = self.max_gen.max(gen);
        if txid != 0 {
            self.min_txid = self.min_txid.min(txid);
            self.max_txid = self.max_txid.max(txid);
        }
    }

    pub fn merge(&mut self, other: &Self) {
        self.min_seqno = self.min_seqno.min(other.min_seqno);
        self.max_seqno = self.max_seqno.max(other.max_seqno);
        self.min_gen = self.min_gen.min(other.min_gen);
        self.max_gen = self.max_gen.max(other.max_gen);
        self.min_txid = self.min_txid.min(other.min_txid);
        self.max_txid = self.max_txid.max(other.max_txid);
    }
}

/// A decoded header, shared shape for all record types (spec §3 "Log
/// record").
#[derive(Clone, Copy, Debug)]
struct Header {
    rec_type: RecordType,
    op: u8,
    rid: u64,
    gen: u64,
    txid: u64,
    seqno: u64,
    cnid: u64,
    key_len: u32,
    value_len: u32,
    total_len: u32,
}

fn header_crc(buf: &[u8; HEADER_LEN]) -> u32 {
    crc32c::crc32c(&buf[4..HEADER_LEN])
}

fn decode_header(buf: &[u8]) -> Option<Header> {
    if buf.len() < HEADER_LEN {
        return None;
    }
    let raw: &[u8; HEADER_LEN] = buf[..HEADER_LEN].try_into().ok()?;
    let stored_crc = u32::from_le_bytes(raw[0..4].try_into().unwrap());
    if header_crc(raw) != stored_crc {
        return None;
    }

    let total_len = u32::from_le_bytes(raw[4..8].try_into().unwrap());
    let rec_type = RecordType::from_u8(raw[8])?;
    let op = raw[9];
    let rid = u64::from_le_bytes(raw[12..20].try_into().unwrap());
    let gen = u64::from_le_bytes(raw[20..28].try_into().unwrap());
    let txid = u64::from_le_bytes(raw[28..36].try_into().unwrap());
    let seqno = u64::from_le_bytes(raw[36..44].try_into().unwrap());
    let cnid = u64::from_le_bytes(raw[44..52].try_into().unwrap());
    let key_len = u32::from_le_bytes(raw[52..56].try_into().unwrap());
    let value_len = u32::from_le_bytes(raw[56..60].try_into().unwrap());

    Some(Header {
        rec_type,
        op,
        rid,
        gen,
        txid,
        seqno,
        cnid,
        key_len,
        value_len,
        total_len,
    })
}

fn encode_header(h: &Header) -> [u8; HEADER_LEN] {
    let mut buf = [0u8; HEADER_LEN];
    buf[4..8].copy_from_slice(&h.total_len.to_le_bytes());
    buf[8] = h.rec_type as u8;
    buf[9] = h.op;
    buf[12..20].copy_from_slice(&h.rid.to_le_bytes());
    buf[20..28].copy_from_slice(&h.gen.to_le_bytes());
    buf[28..36].copy_from_slice(&h.txid.to_le_bytes());
    buf[36..44].copy_from_slice(&h.seqno.to_le_bytes());
    buf[44..52].copy_from_slice(&h.cnid.to_le_bytes());
    buf[52..56].copy_from_slice(&h.key_len.to_le_bytes());
    buf[56..60].copy_from_slice(&h.value_len.to_le_bytes());
    let crc = header_crc(&buf);
    buf[0..4].copy_from_slice(&crc.to_le_bytes());
    buf
}

/// The total on-disk length of the record starting at `buf[0]`, as declared
/// by its header. Only meaningful once the header has been validated.
pub fn reclen_total(buf: &[u8]) -> usize {
    decode_header(buf).map(|h| h.total_len as usize).unwrap_or(0)
}

pub fn is_skip(buf: &[u8]) -> bool {
    decode_header(buf).is_some_and(|h| h.rec_type == RecordType::Skip)
}

pub fn is_txmeta(buf: &[u8]) -> bool {
    decode_header(buf).is_some_and(|h| h.rec_type == RecordType::TxMeta)
}

pub fn is_txcommit(buf: &[u8]) -> bool {
    decode_header(buf)
        .is_some_and(|h| h.rec_type == RecordType::TxMeta && TxMeta::from_u8(h.op) == Some(TxMeta::Commit))
}

fn payload_range(total_len: usize) -> Option<std::ops::Range<usize>> {
    if total_len < HEADER_LEN + TRAILER_LEN {
        return None;
    }
    Some(HEADER_LEN..total_len - TRAILER_LEN)
}

/// Validate the record starting at `buf[0]`, which corresponds to absolute
/// file offset `abs_off` in a file of `file_size` bytes.
///
/// Returns `false` without touching `end_of_record_group` to signal a torn
/// tail (caller decides fatal-vs-truncate based on whether the file's
/// ending offset was already known, per spec §4.C). Returns `true` on a
/// valid record, folding it into `minmax` if given and setting
/// `end_of_record_group` when the record is the group-end marker.
#[allow(clippy::too_many_arguments)]
pub fn is_valid(
    buf: &[u8],
    abs_off: u64,
    file_size: u64,
    rec_off: &mut u64,
    minmax: Option<&mut MinMaxInfo>,
    end_of_record_group: &mut bool,
) -> bool {
    *end_of_record_group = false;

    let remaining = file_size.saturating_sub(abs_off) as usize;
    if remaining < HEADER_LEN {
        return false;
    }

    let Some(header) = decode_header(buf) else {
        return false;
    };

    if header.total_len as usize > remaining {
        return false;
    }
    let Some(prange) = payload_range(header.total_len as usize) else {
        return false;
    };
    let payload = &buf[prange.clone()];
    let stored_payload_crc = u32::from_le_bytes(buf[prange.end..prange.end + 4].try_into().unwrap());
    if crc32c::crc32c(payload) != stored_payload_crc {
        return false;
    }

    *rec_off = abs_off + header.total_len as u64;

    if let Some(mm) = minmax {
        match header.rec_type {
            RecordType::NonTxMutation | RecordType::TxMutation => {
                mm.observe(header.seqno, header.gen, header.txid);
            }
            RecordType::TxMeta if TxMeta::from_u8(header.op) == Some(TxMeta::Commit) => {
                mm.observe(header.seqno, header.gen, header.txid);
            }
            _ => {}
        }
    }

    if header.rec_type == RecordType::Skip && header.op == EORG_MARKER {
        *end_of_record_group = true;
    }

    true
}

/// A decoded mutation record (non-tx or tx), ready for insertion into a
/// replay generation's ordering tree.
#[derive(Clone, Debug)]
pub struct Record {
    pub rid: u64,
    pub gen: u64,
    pub txid: u64,
    pub seqno: u64,
    pub cnid: u64,
    pub op: Op,
    pub key: Vec<u8>,
    /// `None` for a delete.
    pub value: Option<Vec<u8>>,
    pub is_tx: bool,
}

/// Decode the mutation payload of the record at `buf[0]`.
///
/// The caller must have already established the record is valid and of
/// type [`RecordType::NonTxMutation`] or [`RecordType::TxMutation`].
pub fn unpack(buf: &[u8]) -> Result<Record> {
    let header = decode_header(buf).ok_or(ReplayError::BugAssertion("unpack on invalid record"))?;
    if header.rec_type != RecordType::NonTxMutation && header.rec_type != RecordType::TxMutation {
        return Err(ReplayError::BugAssertion("unpack called on non-mutation record"));
    }
    let op = Op::from_u8(header.op).ok_or(ReplayError::BugAssertion("unknown mutation op"))?;

    let key_start = HEADER_LEN;
    let key_end = key_start + header.key_len as usize;
    let key = buf[key_start..key_end].to_vec();
    let value_start = key_start + align8(header.key_len as usize);

    let value = if header.value_len == NIL_VALUE_LEN {
        None
    } else {
        let value_end = value_start + header.value_len as usize;
        Some(buf[value_start..value_end].to_vec())
    };

    Ok(Record {
        rid: header.rid,
        gen: header.gen,
        txid: header.txid,
        seqno: header.seqno,
        cnid: header.cnid,
        op,
        key,
        value,
        is_tx: header.rec_type == RecordType::TxMutation,
    })
}

/// A transaction commit descriptor (spec §3).
#[derive(Clone, Copy, Debug)]
pub struct CommitDescriptor {
    pub txid: u64,
    pub commit_seqno: u64,
    pub final_rid: u64,
    pub gen: u64,
}

pub fn unpack_tx_commit(buf: &[u8]) -> Result<CommitDescriptor> {
    let header = decode_header(buf).ok_or(ReplayError::BugAssertion("unpack_tx_commit on invalid record"))?;
    if !is_txcommit(buf) {
        return Err(ReplayError::BugAssertion("unpack_tx_commit called on non-commit record"));
    }
    Ok(CommitDescriptor {
        txid: header.txid,
        commit_seqno: header.seqno,
        final_rid: header.rid,
        gen: header.gen,
    })
}

/// Pad `len` up to the next 8-byte boundary, per spec §6's key/value
/// alignment rule.
fn align8(len: usize) -> usize {
    (len + 7) & !7
}

fn encode_payload(out: &mut Vec<u8>, key: &[u8], value: Option<&[u8]>) {
    let key_pad = align8(key.len()) - key.len();
    out.extend_from_slice(key);
    out.extend(std::iter::repeat(0).take(key_pad));
    if let Some(value) = value {
        let value_pad = align8(value.len()) - value.len();
        out.extend_from_slice(value);
        out.extend(std::iter::repeat(0).take(value_pad));
    }
}

/// Encode a mutation record. Used by tests to build synthetic log files.
#[allow(clippy::too_many_arguments)]
pub fn encode_mutation(
    out: &mut Vec<u8>,
    rid: u64,
    gen: u64,
    txid: u64,
    seqno: u64,
    cnid: u64,
    op: Op,
    key: &[u8],
    value: Option<&[u8]>,
) {
    let mut payload = Vec::new();
    encode_payload(&mut payload, key, value);
    let value_len = value.map(|v| v.len() as u32).unwrap_or(NIL_VALUE_LEN);

    let header = Header {
        rec_type: if txid != 0 {
            RecordType::TxMutation
        } else {
            RecordType::NonTxMutation
        },
        op: op as u8,
        rid,
        gen,
        txid,
        seqno,
        cnid,
        key_len: key.len() as u32,
        value_len,
        total_len: (HEADER_LEN + payload.len() + TRAILER_LEN) as u32,
    };

    out.extend_from_slice(&encode_header(&header));
    let payload_crc = crc32c::crc32c(&payload);
    out.extend_from_slice(&payload);
    out.extend_from_slice(&payload_crc.to_le_bytes());
}

/// Encode a transaction meta record (begin/commit/abort).
pub fn encode_txmeta(out: &mut Vec<u8>, meta: TxMeta, rid: u64, gen: u64, txid: u64, commit_seqno: u64) {
    let header = Header {
        rec_type: RecordType::TxMeta,
        op: meta as u8,
        rid,
        gen,
        txid,
        seqno: commit_seqno,
        cnid: 0,
        key_len: 0,
        value_len: 0,
        total_len: (HEADER_LEN + TRAILER_LEN) as u32,
    };
    out.extend_from_slice(&encode_header(&header));
    out.extend_from_slice(&0u32.to_le_bytes());
}

/// Encode a skip/padding record, optionally marking it as the
/// end-of-record-group marker.
pub fn encode_skip(out: &mut Vec<u8>, rid: u64, gen: u64, pad_len: usize, eorg: bool) {
    let payload = vec![0u8; pad_len];
    let header = Header {
        rec_type: RecordType::Skip,
        op: if eorg { EORG_MARKER } else { 0 },
        rid,
        gen,
        txid: 0,
        seqno: 0,
        cnid: 0,
        key_len: 0,
        value_len: 0,
        total_len: (HEADER_LEN + payload.len() + TRAILER_LEN) as u32,
    };
    out.extend_from_slice(&encode_header(&header));
    let crc = crc32c::crc32c(&payload);
    out.extend_from_slice(&payload);
    out.extend_from_slice(&crc.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU8;

    use proptest::prelude::*;

    use super::*;

    fn valid_at(buf: &[u8]) -> bool {
        let mut off = 0u64;
        let mut eorg = false;
        is_valid(buf, 0, buf.len() as u64, &mut off, None, &mut eorg)
    }

    #[test]
    fn mutation_roundtrip() {
        let mut buf = Vec::new();
        encode_mutation(&mut buf, 1, 5, 0, 11, 7, Op::Put, b"hello", Some(b"world"));
        assert!(valid_at(&buf));
        let rec = unpack(&buf).unwrap();
        assert_eq!(rec.rid, 1);
        assert_eq!(rec.gen, 5);
        assert_eq!(rec.seqno, 11);
        assert_eq!(rec.cnid, 7);
        assert_eq!(rec.key, b"hello");
        assert_eq!(rec.value.as_deref(), Some(&b"world"[..]));
        assert!(!rec.is_tx);
    }

    #[test]
    fn delete_has_no_value() {
        let mut buf = Vec::new();
        encode_mutation(&mut buf, 2, 5, 0, 12, 7, Op::Del, b"hello", None);
        let rec = unpack(&buf).unwrap();
        assert_eq!(rec.value, None);
    }

    #[test]
    fn tx_commit_roundtrip() {
        let mut buf = Vec::new();
        encode_txmeta(&mut buf, TxMeta::Commit, 9, 3, 100, 21);
        assert!(is_txcommit(&buf));
        assert!(is_txmeta(&buf));
        let desc = unpack_tx_commit(&buf).unwrap();
        assert_eq!(desc.txid, 100);
        assert_eq!(desc.commit_seqno, 21);
        assert_eq!(desc.final_rid, 9);
        assert_eq!(desc.gen, 3);
    }

    #[test]
    fn bitflip_in_payload_fails_checksum() {
        let mut buf = Vec::new();
        encode_mutation(&mut buf, 1, 5, 0, 11, 7, Op::Put, b"hello", Some(b"world"));
        let flip_at = HEADER_LEN + 2;
        buf[flip_at] ^= 0xff;
        assert!(!valid_at(&buf));
    }

    #[test]
    fn bitflip_in_header_fails_checksum() {
        let mut buf = Vec::new();
        encode_mutation(&mut buf, 1, 5, 0, 11, 7, Op::Put, b"hello", Some(b"world"));
        buf[20] ^= 0xff;
        assert!(!valid_at(&buf));
    }

    proptest! {
        #[test]
        fn bitflip_anywhere_fails_checksum(pos in 0..HEADER_LEN, mask in any::<NonZeroU8>()) {
            let mut buf = Vec::new();
            encode_mutation(&mut buf, 1, 5, 0, 11, 7, Op::Put, b"hello", Some(b"world"));
            buf[pos] ^= mask.get();
            prop_assert!(!valid_at(&buf));
        }
    }

    #[test]
    fn truncated_record_is_torn_not_corrupt() {
        let mut buf = Vec::new();
        encode_mutation(&mut buf, 1, 5, 0, 11, 7, Op::Put, b"hello", Some(b"world"));
        buf.truncate(buf.len() - 3);
        let mut off = 0u64;
        let mut eorg = false;
        assert!(!is_valid(&buf, 0, buf.len() as u64, &mut off, None, &mut eorg));
    }

    #[test]
    fn end_of_record_group_marker() {
        let mut buf = Vec::new();
        encode_skip(&mut buf, 3, 5, 8, true);
        let mut off = 0u64;
        let mut eorg = false;
        assert!(is_valid(&buf, 0, buf.len() as u64, &mut off, None, &mut eorg));
        assert!(eorg);
        assert!(is_skip(&buf));
    }
}
