//! ASN.1 BER/DER TLV decoding (spec.md section 4.2 "ASN.1 TLV"), shared by
//! the TLS certificate parser.

use crate::datum::Datum;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Integer,
    BitString,
    OctetString,
    Null,
    Oid,
    Utf8String,
    PrintableString,
    Ia5String,
    UtcTime,
    GeneralizedTime,
    Sequence,
    Set,
    Other(u8),
}

impl Tag {
    fn from_byte(b: u8) -> Tag {
        match b & 0x1F {
            0x02 => Tag::Integer,
            0x03 => Tag::BitString,
            0x04 => Tag::OctetString,
            0x05 => Tag::Null,
            0x06 => Tag::Oid,
            0x0C => Tag::Utf8String,
            0x13 => Tag::PrintableString,
            0x16 => Tag::Ia5String,
            0x17 => Tag::UtcTime,
            0x18 => Tag::GeneralizedTime,
            0x10 => Tag::Sequence,
            0x11 => Tag::Set,
            other => Tag::Other(other),
        }
    }
}

pub struct Tlv<'a> {
    pub tag: Tag,
    pub constructed: bool,
    pub value: Datum<'a>,
}

/// Read one tag-length-value element. Supports single-byte tags (no
/// high-tag-number form) and both short- and long-form (1-4 byte) lengths.
/// Empties the datum on truncation.
pub fn read_tlv<'a>(d: &mut Datum<'a>) -> Option<Tlv<'a>> {
    let tag_byte = d.read_uint_be(1)? as u8;
    let constructed = tag_byte & 0x20 != 0;
    let len_byte = d.read_uint_be(1)? as u8;
    let length = if len_byte & 0x80 == 0 {
        len_byte as usize
    } else {
        let n = (len_byte & 0x7F) as usize;
        if n == 0 || n > 4 {
            d.fail();
            return None;
        }
        d.read_uint_be(n)? as usize
    };
    let (value, rest) = d.split(length);
    if value.remaining() != length {
        d.fail();
        return None;
    }
    *d = rest;
    Some(Tlv { tag: Tag::from_byte(tag_byte), constructed, value })
}

/// Decode an OID value (the content bytes of an OID TLV, not including
/// tag/length) into dotted-decimal form: the first byte encodes the first
/// two arcs as `40*arc1 + arc2`; subsequent arcs are base-128
/// variable-length, MSB-continuation encoded.
pub fn decode_oid(value: &[u8]) -> Option<String> {
    if value.is_empty() {
        return None;
    }
    let first = value[0];
    let (arc1, arc2) = if first < 40 {
        (0, first as u32)
    } else if first < 80 {
        (1, first as u32 - 40)
    } else {
        (2, first as u32 - 80)
    };
    let mut arcs = vec![arc1, arc2];
    let mut acc: u32 = 0;
    for &b in &value[1..] {
        acc = (acc << 7) | u32::from(b & 0x7F);
        if b & 0x80 == 0 {
            arcs.push(acc);
            acc = 0;
        }
    }
    Some(arcs.iter().map(u32::to_string).collect::<Vec<_>>().join("."))
}

/// Encode a dotted-decimal OID string back into its base-128 arc encoding.
/// Used by tests and by round-trip validation of the known-OID dictionary;
/// returns `None` for a string with fewer than two arcs or a non-numeric arc.
pub fn encode_oid(dotted: &str) -> Option<Vec<u8>> {
    let arcs: Vec<u32> = dotted.split('.').map(|s| s.parse().ok()).collect::<Option<_>>()?;
    if arcs.len() < 2 {
        return None;
    }
    let mut out = vec![(arcs[0] * 40 + arcs[1]) as u8];
    for &arc in &arcs[2..] {
        out.extend(encode_base128(arc));
    }
    Some(out)
}

fn encode_base128(mut value: u32) -> Vec<u8> {
    let mut groups = vec![(value & 0x7F) as u8];
    value >>= 7;
    while value > 0 {
        groups.push((value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }
    groups.reverse();
    groups
}

/// Look up a human-readable name for a well-known OID; anything else is
/// rendered as the dotted-decimal string itself by the caller.
pub fn well_known_oid_name(dotted: &str) -> Option<&'static str> {
    Some(match dotted {
        "2.5.4.3" => "commonName",
        "2.5.4.6" => "countryName",
        "2.5.4.7" => "localityName",
        "2.5.4.8" => "stateOrProvinceName",
        "2.5.4.10" => "organizationName",
        "2.5.4.11" => "organizationalUnitName",
        "1.2.840.113549.1.1.1" => "rsaEncryption",
        "1.2.840.113549.1.1.11" => "sha256WithRSAEncryption",
        "1.2.840.10045.2.1" => "id-ecPublicKey",
        _ => return None,
    })
}

/// Expand a UTCTime value `YYMMDDhhmmssZ` into a GeneralizedTime-style
/// `YYYYMMDDHHMMSSZ` string, applying the RFC 5280 pivot year rule
/// (`YY < 50` -> `20YY`, else `19YY`). Returns `None` for malformed input;
/// comparison of the result is then plain lexicographic ordering.
pub fn expand_utc_time(utc: &str) -> Option<String> {
    let digits = utc.strip_suffix('Z')?;
    if digits.len() != 12 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let yy: u32 = digits[0..2].parse().ok()?;
    let year = if yy < 50 { 2000 + yy } else { 1900 + yy };
    Some(format!("{year:04}{}Z", &digits[2..]))
}
