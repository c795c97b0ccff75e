//! Declarative packet layouts.
//!
//! Every packet the link carries is described by a static
//! [`PacketLayout`]: which API identifier frames it, its packet type, its
//! payload length, and an offset-ordered list of [`Field`]s.  Building
//! and reading packets walks these tables; no code outside this module
//! knows a byte offset.
//!
//! ```text
//! outbound (API 0x01)  [api][frame_id][dest:2][options][type][data..]
//! inbound  (API 0x81)  [api][source:2][rssi][options][type][data..]
//! tx result (API 0x89) [api][frame_id][status]
//! modem    (API 0x8A)  [api][status]
//! ```

use heapless::Vec;

use super::cipher::{KeyStream, KEY_LEN};
use crate::error::CodecError;
use crate::link::MAX_PAYLOAD_LEN;

/// Frame id a fresh builder starts with.  Any non-zero id requests a
/// transmit result; the codec numbers its own frames.
pub const FRAME_ID: u8 = 0x01;

/// Number of telemetry bytes carried by a report.
pub const TELEMETRY_LEN: usize = 12;

/// An assembled payload, ready for framing.
pub type Payload = Vec<u8, MAX_PAYLOAD_LEN>;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Semantic packet kinds carried in the packet-type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Peer status report (telemetry).
    Report = 0x00,
    /// FARMER asks a DOG to pair.
    PairRequest = 0x01,
    /// DOG accepts the pairing.
    Ack = 0x02,
    /// FARMER hands over the session key.
    KeyExchange = 0x03,
    /// Encrypted control snapshot.
    Control = 0x04,
    /// Rewind the key stream to index 0.
    ResetEncryption = 0x05,
}

impl PacketType {
    pub const fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0x00 => Some(Self::Report),
            0x01 => Some(Self::PairRequest),
            0x02 => Some(Self::Ack),
            0x03 => Some(Self::KeyExchange),
            0x04 => Some(Self::Control),
            0x05 => Some(Self::ResetEncryption),
            _ => None,
        }
    }
}

/// Radio API identifiers (first payload byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ApiId {
    /// Outbound transmit request.
    Transmit = 0x01,
    /// Inbound data from a peer.
    Receive = 0x81,
    /// Delivery result for an earlier transmit.
    TxStatus = 0x89,
    /// Radio (re)started.
    ModemStatus = 0x8A,
}

impl ApiId {
    pub const fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0x01 => Some(Self::Transmit),
            0x81 => Some(Self::Receive),
            0x89 => Some(Self::TxStatus),
            0x8A => Some(Self::ModemStatus),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Layout description
// ---------------------------------------------------------------------------

/// Named payload fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldId {
    ApiId,
    FrameId,
    /// Destination (outbound) or source (inbound) address, big-endian.
    Address,
    Rssi,
    Options,
    PacketType,
    DogTag,
    Key,
    AccelFrontBack,
    AccelRightLeft,
    Controls,
    Telemetry,
    DeliveryStatus,
    ModemStatus,
}

/// How a field's bytes appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Plain,
    /// XORed with the session key stream, one key byte per field byte.
    KeyStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub id: FieldId,
    pub offset: usize,
    pub width: usize,
    pub encoding: Encoding,
}

impl Field {
    const fn plain(id: FieldId, offset: usize, width: usize) -> Self {
        Self {
            id,
            offset,
            width,
            encoding: Encoding::Plain,
        }
    }

    const fn keyed(id: FieldId, offset: usize, width: usize) -> Self {
        Self {
            id,
            offset,
            width,
            encoding: Encoding::KeyStream,
        }
    }

    fn range(&self) -> core::ops::Range<usize> {
        self.offset..self.offset + self.width
    }
}

/// Static description of one packet.  `fields` is sorted by offset.
#[derive(Debug, PartialEq, Eq)]
pub struct PacketLayout {
    pub name: &'static str,
    pub api: ApiId,
    pub packet_type: Option<PacketType>,
    pub length: usize,
    pub fields: &'static [Field],
}

impl PacketLayout {
    pub fn field(&self, id: FieldId) -> Option<&Field> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// True if any field travels under the key stream.
    pub fn is_keyed(&self) -> bool {
        self.fields.iter().any(|f| f.encoding == Encoding::KeyStream)
    }

    /// Key-stream bytes consumed by one packet of this layout.
    pub fn keyed_len(&self) -> usize {
        self.fields
            .iter()
            .filter(|f| f.encoding == Encoding::KeyStream)
            .map(|f| f.width)
            .sum()
    }
}

// ── Outbound ──────────────────────────────────────────────────

pub static PAIR_REQUEST: PacketLayout = PacketLayout {
    name: "pair-request",
    api: ApiId::Transmit,
    packet_type: Some(PacketType::PairRequest),
    length: 7,
    fields: &[
        Field::plain(FieldId::ApiId, 0, 1),
        Field::plain(FieldId::FrameId, 1, 1),
        Field::plain(FieldId::Address, 2, 2),
        Field::plain(FieldId::Options, 4, 1),
        Field::plain(FieldId::PacketType, 5, 1),
        Field::plain(FieldId::DogTag, 6, 1),
    ],
};

pub static KEY_EXCHANGE: PacketLayout = PacketLayout {
    name: "key-exchange",
    api: ApiId::Transmit,
    packet_type: Some(PacketType::KeyExchange),
    length: 6 + KEY_LEN,
    fields: &[
        Field::plain(FieldId::ApiId, 0, 1),
        Field::plain(FieldId::FrameId, 1, 1),
        Field::plain(FieldId::Address, 2, 2),
        Field::plain(FieldId::Options, 4, 1),
        Field::plain(FieldId::PacketType, 5, 1),
        Field::plain(FieldId::Key, 6, KEY_LEN),
    ],
};

pub static CONTROL: PacketLayout = PacketLayout {
    name: "control",
    api: ApiId::Transmit,
    packet_type: Some(PacketType::Control),
    length: 9,
    fields: &[
        Field::plain(FieldId::ApiId, 0, 1),
        Field::plain(FieldId::FrameId, 1, 1),
        Field::plain(FieldId::Address, 2, 2),
        Field::plain(FieldId::Options, 4, 1),
        Field::keyed(FieldId::PacketType, 5, 1),
        Field::keyed(FieldId::AccelFrontBack, 6, 1),
        Field::keyed(FieldId::AccelRightLeft, 7, 1),
        Field::keyed(FieldId::Controls, 8, 1),
    ],
};

pub static RESET_REQUEST: PacketLayout = PacketLayout {
    name: "reset-encryption",
    api: ApiId::Transmit,
    packet_type: Some(PacketType::ResetEncryption),
    length: 6,
    fields: &[
        Field::plain(FieldId::ApiId, 0, 1),
        Field::plain(FieldId::FrameId, 1, 1),
        Field::plain(FieldId::Address, 2, 2),
        Field::plain(FieldId::Options, 4, 1),
        Field::plain(FieldId::PacketType, 5, 1),
    ],
};

// ── Inbound ───────────────────────────────────────────────────

const INBOUND_HEADER: [Field; 5] = [
    Field::plain(FieldId::ApiId, 0, 1),
    Field::plain(FieldId::Address, 1, 2),
    Field::plain(FieldId::Rssi, 3, 1),
    Field::plain(FieldId::Options, 4, 1),
    Field::plain(FieldId::PacketType, 5, 1),
];

pub static ACK: PacketLayout = PacketLayout {
    name: "ack",
    api: ApiId::Receive,
    packet_type: Some(PacketType::Ack),
    length: 6,
    fields: &INBOUND_HEADER,
};

pub static REPORT: PacketLayout = PacketLayout {
    name: "report",
    api: ApiId::Receive,
    packet_type: Some(PacketType::Report),
    length: 6 + TELEMETRY_LEN,
    fields: &[
        Field::plain(FieldId::ApiId, 0, 1),
        Field::plain(FieldId::Address, 1, 2),
        Field::plain(FieldId::Rssi, 3, 1),
        Field::plain(FieldId::Options, 4, 1),
        Field::plain(FieldId::PacketType, 5, 1),
        Field::plain(FieldId::Telemetry, 6, TELEMETRY_LEN),
    ],
};

pub static RESET_NOTICE: PacketLayout = PacketLayout {
    name: "reset-encryption",
    api: ApiId::Receive,
    packet_type: Some(PacketType::ResetEncryption),
    length: 6,
    fields: &INBOUND_HEADER,
};

pub static TX_STATUS: PacketLayout = PacketLayout {
    name: "tx-status",
    api: ApiId::TxStatus,
    packet_type: None,
    length: 3,
    fields: &[
        Field::plain(FieldId::ApiId, 0, 1),
        Field::plain(FieldId::FrameId, 1, 1),
        Field::plain(FieldId::DeliveryStatus, 2, 1),
    ],
};

pub static MODEM_STATUS: PacketLayout = PacketLayout {
    name: "modem-status",
    api: ApiId::ModemStatus,
    packet_type: None,
    length: 2,
    fields: &[
        Field::plain(FieldId::ApiId, 0, 1),
        Field::plain(FieldId::ModemStatus, 1, 1),
    ],
};

/// Every known layout.
pub static LAYOUTS: [&PacketLayout; 9] = [
    &PAIR_REQUEST,
    &KEY_EXCHANGE,
    &CONTROL,
    &RESET_REQUEST,
    &ACK,
    &REPORT,
    &RESET_NOTICE,
    &TX_STATUS,
    &MODEM_STATUS,
];

/// Layout used to send `packet_type`.
pub fn outbound(packet_type: PacketType) -> Result<&'static PacketLayout, CodecError> {
    lookup(ApiId::Transmit, Some(packet_type)).ok_or(CodecError::NotBuildable(packet_type))
}

/// Layout for `api` carrying `packet_type` (`None` for radio status frames).
pub fn lookup(api: ApiId, packet_type: Option<PacketType>) -> Option<&'static PacketLayout> {
    LAYOUTS
        .iter()
        .copied()
        .find(|l| l.api == api && l.packet_type == packet_type)
}

// ---------------------------------------------------------------------------
// Building
// ---------------------------------------------------------------------------

/// Fills a layout's fields, then encodes it.
///
/// The API id, frame id and packet type are filled from the layout; every
/// other field defaults to zero until set.
pub struct PacketBuilder {
    layout: &'static PacketLayout,
    bytes: [u8; MAX_PAYLOAD_LEN],
}

impl PacketBuilder {
    pub fn new(layout: &'static PacketLayout) -> Self {
        let mut bytes = [0u8; MAX_PAYLOAD_LEN];
        for field in layout.fields {
            match field.id {
                FieldId::ApiId => bytes[field.offset] = layout.api as u8,
                FieldId::FrameId => bytes[field.offset] = FRAME_ID,
                FieldId::PacketType => {
                    if let Some(t) = layout.packet_type {
                        bytes[field.offset] = t as u8;
                    }
                }
                _ => {}
            }
        }
        Self { layout, bytes }
    }

    /// Write `value` into field `id`; the width must match exactly.
    pub fn set(&mut self, id: FieldId, value: &[u8]) -> Result<&mut Self, CodecError> {
        let field = self.layout.field(id).ok_or(CodecError::NoSuchField(id))?;
        if value.len() != field.width {
            return Err(CodecError::FieldWidth {
                offset: field.offset,
                expected: field.width,
                got: value.len(),
            });
        }
        self.bytes[field.range()].copy_from_slice(value);
        Ok(self)
    }

    pub fn set_u8(&mut self, id: FieldId, value: u8) -> Result<&mut Self, CodecError> {
        self.set(id, &[value])
    }

    pub fn set_u16(&mut self, id: FieldId, value: u16) -> Result<&mut Self, CodecError> {
        self.set(id, &value.to_be_bytes())
    }

    /// Apply key-stream encoding in wire order and return the payload.
    ///
    /// A layout with key-stream fields needs `keys`; the stream advances
    /// once per encoded byte.
    pub fn finish(&self, keys: Option<&mut KeyStream>) -> Result<Payload, CodecError> {
        let mut bytes = self.bytes;
        if self.layout.is_keyed() {
            let ty = self.layout.packet_type.unwrap_or(PacketType::Control);
            let keys = keys.ok_or(CodecError::NotPaired(ty))?;
            apply_keystream(self.layout, &mut bytes, keys);
        }
        Payload::from_slice(&bytes[..self.layout.length]).map_err(|()| CodecError::Malformed {
            api: self.layout.api as u8,
            len: self.layout.length,
        })
    }
}

fn apply_keystream(layout: &PacketLayout, bytes: &mut [u8], keys: &mut KeyStream) {
    for field in layout.fields {
        if field.encoding == Encoding::KeyStream {
            for b in &mut bytes[field.range()] {
                *b = keys.apply(*b);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// A received payload matched against its layout.
#[derive(Debug, Clone, Copy)]
pub struct PacketView<'a> {
    layout: &'static PacketLayout,
    bytes: &'a [u8],
}

impl<'a> PacketView<'a> {
    /// Match `bytes` against the layout named by its API id and (for data
    /// frames) its packet-type byte, taken as plaintext.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, CodecError> {
        let malformed = CodecError::Malformed {
            api: bytes.first().copied().unwrap_or(0),
            len: bytes.len(),
        };
        let api = bytes.first().copied().and_then(ApiId::from_u8).ok_or(malformed)?;
        let packet_type = match api {
            ApiId::Transmit | ApiId::Receive => {
                let ty = bytes.get(5).copied().and_then(PacketType::from_u8).ok_or(malformed)?;
                Some(ty)
            }
            ApiId::TxStatus | ApiId::ModemStatus => None,
        };
        let layout = lookup(api, packet_type).ok_or(malformed)?;
        Self::with_layout(layout, bytes)
    }

    /// Match `bytes` against a known layout.
    pub fn with_layout(layout: &'static PacketLayout, bytes: &'a [u8]) -> Result<Self, CodecError> {
        if bytes.len() != layout.length {
            return Err(CodecError::Malformed {
                api: layout.api as u8,
                len: bytes.len(),
            });
        }
        Ok(Self { layout, bytes })
    }

    pub fn layout(&self) -> &'static PacketLayout {
        self.layout
    }

    pub fn field(&self, id: FieldId) -> Option<&'a [u8]> {
        self.layout.field(id).map(|f| &self.bytes[f.range()])
    }

    pub fn u8(&self, id: FieldId) -> Option<u8> {
        self.field(id).and_then(|b| b.first().copied())
    }

    pub fn u16(&self, id: FieldId) -> Option<u16> {
        self.field(id)
            .and_then(|b| <[u8; 2]>::try_from(b).ok())
            .map(u16::from_be_bytes)
    }
}

/// Reverse the key-stream fields of `layout` in place.
pub fn decode_in_place(layout: &PacketLayout, bytes: &mut [u8], keys: &mut KeyStream) -> Result<(), CodecError> {
    if bytes.len() != layout.length {
        return Err(CodecError::Malformed {
            api: layout.api as u8,
            len: bytes.len(),
        });
    }
    apply_keystream(layout, bytes, keys);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts_are_well_formed() {
        for layout in LAYOUTS {
            let mut end = 0;
            for f in layout.fields {
                assert_eq!(f.offset, end, "{}: gap or overlap at {:?}", layout.name, f.id);
                end = f.offset + f.width;
            }
            assert_eq!(end, layout.length, "{}", layout.name);
            assert!(layout.length <= MAX_PAYLOAD_LEN);
        }
    }

    #[test]
    fn wire_lengths_match_protocol() {
        assert_eq!(PAIR_REQUEST.length, 7);
        assert_eq!(KEY_EXCHANGE.length, 38);
        assert_eq!(CONTROL.length, 9);
        assert_eq!(RESET_REQUEST.length, 6);
        assert_eq!(REPORT.length, 18);
        assert_eq!(CONTROL.keyed_len(), 4);
    }

    #[test]
    fn builds_pair_request() {
        let payload = PacketBuilder::new(&PAIR_REQUEST)
            .set_u16(FieldId::Address, 0xFFFF)
            .and_then(|b| b.set_u8(FieldId::DogTag, 0x39))
            .and_then(|b| b.finish(None))
            .unwrap();
        assert_eq!(payload.as_slice(), &[0x01, 0x01, 0xFF, 0xFF, 0x00, 0x01, 0x39]);
    }

    #[test]
    fn control_needs_keys_and_encrypts_header_and_data() {
        let mut b = PacketBuilder::new(&CONTROL);
        b.set_u16(FieldId::Address, 0x2085).unwrap();
        b.set_u8(FieldId::AccelFrontBack, 0x10).unwrap();
        assert_eq!(b.finish(None), Err(CodecError::NotPaired(PacketType::Control)));

        let key: [u8; KEY_LEN] = core::array::from_fn(|i| 0xA0 + i as u8);
        let mut ks = KeyStream::from_key(key);
        for _ in 0..30 {
            ks.apply(0);
        }
        let payload = b.finish(Some(&mut ks)).unwrap();
        assert_eq!(payload[5], 0x04 ^ key[30]);
        assert_eq!(payload[6], 0x10 ^ key[31]);
        assert_eq!(payload[7], key[0]);
        assert_eq!(ks.index(), 2);
        assert_eq!(&payload[2..4], &[0x20, 0x85]);
    }

    #[test]
    fn width_and_membership_are_checked() {
        let mut b = PacketBuilder::new(&KEY_EXCHANGE);
        assert!(matches!(
            b.set(FieldId::Key, &[0; 4]),
            Err(CodecError::FieldWidth { offset: 6, expected: 32, got: 4 })
        ));
        assert!(matches!(
            b.set_u8(FieldId::DogTag, 1),
            Err(CodecError::NoSuchField(FieldId::DogTag))
        ));
    }

    #[test]
    fn inbound_only_types_are_not_buildable() {
        assert_eq!(outbound(PacketType::Ack), Err(CodecError::NotBuildable(PacketType::Ack)));
        assert_eq!(outbound(PacketType::Report), Err(CodecError::NotBuildable(PacketType::Report)));
        assert!(outbound(PacketType::Control).is_ok());
    }

    #[test]
    fn parses_inbound_report() {
        let mut raw = [0u8; 18];
        raw[..6].copy_from_slice(&[0x81, 0x20, 0x85, 0xC0, 0x00, 0x00]);
        raw[6] = 0x01;
        let view = PacketView::parse(&raw).unwrap();
        assert_eq!(view.layout().name, "report");
        assert_eq!(view.u16(FieldId::Address), Some(0x2085));
        assert_eq!(view.u8(FieldId::Rssi), Some(0xC0));
        assert_eq!(view.field(FieldId::Telemetry).unwrap()[0], 0x01);
    }

    #[test]
    fn parse_rejects_unknown_and_short() {
        assert!(PacketView::parse(&[0x42, 0, 0]).is_err());
        assert!(PacketView::parse(&[0x81, 0x20, 0x85, 0, 0, 0x09]).is_err());
        assert!(PacketView::parse(&[0x81, 0x20, 0x85, 0, 0, 0x00]).is_err());
        assert!(PacketView::parse(&[]).is_err());
        assert_eq!(
            PacketView::parse(&[0x89, 0x01, 0x00]).unwrap().u8(FieldId::DeliveryStatus),
            Some(0)
        );
    }

    #[test]
    fn decode_in_place_reverses_build() {
        let key: [u8; KEY_LEN] = core::array::from_fn(|i| (i as u8).wrapping_mul(37));
        let mut tx = KeyStream::from_key(key);
        let mut rx = tx.clone();
        let mut b = PacketBuilder::new(&CONTROL);
        b.set_u8(FieldId::Controls, 0x01).unwrap();
        let mut payload = b.finish(Some(&mut tx)).unwrap();

        decode_in_place(&CONTROL, &mut payload, &mut rx).unwrap();
        let view = PacketView::with_layout(&CONTROL, &payload).unwrap();
        assert_eq!(view.u8(FieldId::PacketType), Some(0x04));
        assert_eq!(view.u8(FieldId::Controls), Some(0x01));
        assert_eq!(rx.index(), tx.index());
    }
}
