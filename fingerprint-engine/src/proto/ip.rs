//! IPv4 / IPv6 network-layer parsing, with optional GRE unwrapping
//! (spec.md section 4.8 step 2).

use crate::datum::Datum;
use std::net::{Ipv4Addr, Ipv6Addr};

const PROTO_TCP: u8 = 6;
const PROTO_UDP: u8 = 17;
const PROTO_GRE: u8 = 47;

const PROTO_HOPOPT: u8 = 0;
const PROTO_ROUTING: u8 = 43;
const PROTO_FRAGMENT: u8 = 44;
const PROTO_DSTOPTS: u8 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpAddrPair {
    V4 { src: Ipv4Addr, dst: Ipv4Addr },
    V6 { src: Ipv6Addr, dst: Ipv6Addr },
}

pub struct IpPacket<'a> {
    pub addrs: IpAddrPair,
    pub protocol: u8,
    pub payload: Datum<'a>,
}

/// Parse an IPv4 header, honouring the header-length field (options are
/// skipped). `gre_enabled` controls whether protocol 47 is unwrapped and the
/// inner header parsed recursively; otherwise GRE is returned as an opaque
/// payload with `protocol == 47`.
pub fn parse_v4(mut d: Datum, gre_enabled: bool) -> Option<IpPacket> {
    let first = d.read_uint_be(1)? as u8;
    let version = first >> 4;
    let ihl = (first & 0x0F) as usize;
    if version != 4 || ihl < 5 {
        return None;
    }
    d.skip(1); // DSCP/ECN
    let total_len = d.read_uint_be(2)? as usize;
    d.skip(4); // identification, flags/frag offset
    d.skip(1); // TTL
    let protocol = d.read_uint_be(1)? as u8;
    d.skip(2); // header checksum
    let src = read_v4_addr(&mut d)?;
    let dst = read_v4_addr(&mut d)?;
    // skip any IPv4 options beyond the fixed 20-byte header
    let options_len = ihl.saturating_sub(5) * 4;
    d.skip(options_len);

    let addrs = IpAddrPair::V4 { src, dst };
    if protocol == PROTO_GRE && gre_enabled {
        let inner = peel_gre(d)?;
        return parse_v4(inner, gre_enabled).or_else(|| {
            Some(IpPacket { addrs, protocol: PROTO_GRE, payload: Datum::empty() })
        });
    }

    // Trim to declared total_len when the capture carries link-layer padding.
    let payload = if total_len > ihl * 4 {
        let body_len = (total_len - ihl * 4).min(d.remaining());
        d.split(body_len).0
    } else {
        d
    };

    Some(IpPacket { addrs, protocol, payload })
}

/// Parse a (fixed 40-byte) IPv6 header, then walk any chain of extension
/// headers (Hop-by-Hop, Routing, Fragment, Destination Options) down to the
/// real transport protocol, so a packet with 0, 1, or 2 extension headers
/// all yield the same `protocol`/payload split (spec.md section 8).
pub fn parse_v6(mut d: Datum) -> Option<IpPacket> {
    let first = d.read_uint_be(1)? as u8;
    if first >> 4 != 6 {
        return None;
    }
    d.skip(3); // rest of version/traffic class/flow label
    d.skip(2); // payload length (trusted to match remaining bytes)
    let mut next_header = d.read_uint_be(1)? as u8;
    d.skip(1); // hop limit
    let src = read_v6_addr(&mut d)?;
    let dst = read_v6_addr(&mut d)?;

    loop {
        match next_header {
            PROTO_HOPOPT | PROTO_ROUTING | PROTO_DSTOPTS => {
                let nh = d.read_uint_be(1)? as u8;
                let hdr_ext_len = d.read_uint_be(1)? as usize;
                // length is in 8-octet units, not counting the first 8 octets,
                // of which 2 (next header, hdr ext len) are already consumed.
                d.skip((hdr_ext_len + 1) * 8 - 2);
                next_header = nh;
            }
            PROTO_FRAGMENT => {
                let nh = d.read_uint_be(1)? as u8;
                d.skip(1); // reserved
                d.skip(2); // fragment offset, reserved, M flag
                d.skip(4); // identification
                next_header = nh;
            }
            _ => break,
        }
    }

    Some(IpPacket { addrs: IpAddrPair::V6 { src, dst }, protocol: next_header, payload: d })
}

fn read_v4_addr(d: &mut Datum) -> Option<Ipv4Addr> {
    let raw = d.read_uint_be(4)? as u32;
    Some(Ipv4Addr::from(raw))
}

fn read_v6_addr(d: &mut Datum) -> Option<Ipv6Addr> {
    let mut bytes = Vec::with_capacity(16);
    if !d.read_bytes(16, &mut bytes) {
        return None;
    }
    let arr: [u8; 16] = bytes.try_into().ok()?;
    Some(Ipv6Addr::from(arr))
}

/// Peel a minimal GRE header (no checksum/key/sequence flags supported) and
/// return the datum positioned at the encapsulated IP header.
fn peel_gre(mut d: Datum) -> Option<Datum> {
    let flags_version = d.read_uint_be(2)? as u16;
    d.skip(2); // protocol type (assumed to be IP; caller re-dispatches on version nibble)
    if flags_version & 0x8000 != 0 {
        d.skip(4); // checksum + reserved1
    }
    if flags_version & 0x1000 != 0 {
        d.skip(4); // key
    }
    if flags_version & 0x0800 != 0 {
        d.skip(4); // sequence number
    }
    if d.is_empty() {
        None
    } else {
        Some(d)
    }
}

pub fn is_tcp(protocol: u8) -> bool {
    protocol == PROTO_TCP
}

pub fn is_udp(protocol: u8) -> bool {
    protocol == PROTO_UDP
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4_header(protocol: u8, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![0x45, 0x00];
        let total_len = (20 + payload.len()) as u16;
        buf.extend_from_slice(&total_len.to_be_bytes());
        buf.extend_from_slice(&[0, 0, 0, 0]); // id, flags/frag
        buf.push(64); // ttl
        buf.push(protocol);
        buf.extend_from_slice(&[0, 0]); // checksum
        buf.extend_from_slice(&Ipv4Addr::new(10, 0, 0, 1).octets());
        buf.extend_from_slice(&Ipv4Addr::new(10, 0, 0, 2).octets());
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn ipv4_header_parses_addresses_and_protocol() {
        let buf = v4_header(PROTO_TCP, b"tcp-bytes");
        let pkt = parse_v4(Datum::new(&buf), false).expect("parses");
        assert_eq!(
            pkt.addrs,
            IpAddrPair::V4 { src: Ipv4Addr::new(10, 0, 0, 1), dst: Ipv4Addr::new(10, 0, 0, 2) }
        );
        assert_eq!(pkt.protocol, PROTO_TCP);
        assert_eq!(pkt.payload.as_slice(), b"tcp-bytes");
    }

    #[test]
    fn ipv4_options_are_skipped() {
        let mut buf = vec![0x46, 0x00]; // ihl=6 -> 4 extra option bytes
        buf.extend_from_slice(&(24u16 + 4).to_be_bytes());
        buf.extend_from_slice(&[0, 0, 0, 0]);
        buf.push(64);
        buf.push(PROTO_UDP);
        buf.extend_from_slice(&[0, 0]);
        buf.extend_from_slice(&Ipv4Addr::new(1, 2, 3, 4).octets());
        buf.extend_from_slice(&Ipv4Addr::new(5, 6, 7, 8).octets());
        buf.extend_from_slice(&[0xAA; 4]); // options
        buf.extend_from_slice(b"data");
        let pkt = parse_v4(Datum::new(&buf), false).expect("parses");
        assert_eq!(pkt.payload.as_slice(), b"data");
    }

    #[test]
    fn truncated_header_returns_none() {
        assert!(parse_v4(Datum::new(&[0x45, 0x00]), false).is_none());
    }

    #[test]
    fn gre_unwraps_to_inner_ipv4_when_enabled() {
        let inner = v4_header(PROTO_TCP, b"inner-payload");
        let mut gre = vec![0x00, 0x00, 0x08, 0x00]; // no optional fields, proto=IP
        gre.extend_from_slice(&inner);
        let outer = v4_header(PROTO_GRE, &gre);
        let pkt = parse_v4(Datum::new(&outer), true).expect("parses");
        assert_eq!(pkt.protocol, PROTO_TCP);
        assert_eq!(pkt.payload.as_slice(), b"inner-payload");
    }

    #[test]
    fn gre_left_opaque_when_disabled() {
        let outer = v4_header(PROTO_GRE, &[0xDE, 0xAD]);
        let pkt = parse_v4(Datum::new(&outer), false).expect("parses");
        assert_eq!(pkt.protocol, PROTO_GRE);
    }

    #[test]
    fn ipv6_header_parses_addresses() {
        let mut buf = vec![0x60, 0x00, 0x00, 0x00];
        buf.extend_from_slice(&0u16.to_be_bytes());
        buf.push(PROTO_UDP);
        buf.push(64);
        buf.extend_from_slice(&Ipv6Addr::LOCALHOST.octets());
        buf.extend_from_slice(&Ipv6Addr::UNSPECIFIED.octets());
        buf.extend_from_slice(b"udp-data");
        let pkt = parse_v6(Datum::new(&buf)).expect("parses");
        assert_eq!(
            pkt.addrs,
            IpAddrPair::V6 { src: Ipv6Addr::LOCALHOST, dst: Ipv6Addr::UNSPECIFIED }
        );
        assert_eq!(pkt.payload.as_slice(), b"udp-data");
    }

    fn v6_header(next_header: u8, rest: &[u8]) -> Vec<u8> {
        let mut buf = vec![0x60, 0x00, 0x00, 0x00];
        buf.extend_from_slice(&0u16.to_be_bytes());
        buf.push(next_header);
        buf.push(64);
        buf.extend_from_slice(&Ipv6Addr::LOCALHOST.octets());
        buf.extend_from_slice(&Ipv6Addr::UNSPECIFIED.octets());
        buf.extend_from_slice(rest);
        buf
    }

    /// Hop-by-Hop, Routing, Fragment, and Destination Options extension
    /// header octets, each chaining to the next and finally to UDP, with 8
    /// bytes of filler payload after. One 8-octet Hop-by-Hop header: next
    /// header, hdr ext len = 0 (=> 8 total octets), 6 bytes of options.
    fn hop_by_hop(next_header: u8) -> Vec<u8> {
        let mut h = vec![next_header, 0];
        h.extend_from_slice(&[0u8; 6]);
        h
    }

    fn fragment_header(next_header: u8) -> Vec<u8> {
        let mut h = vec![next_header, 0];
        h.extend_from_slice(&[0u8; 6]);
        h
    }

    #[test]
    fn ipv6_with_no_extension_headers_reaches_udp_payload() {
        let buf = v6_header(PROTO_UDP, b"udp-data");
        let pkt = parse_v6(Datum::new(&buf)).expect("parses");
        assert_eq!(pkt.protocol, PROTO_UDP);
        assert_eq!(pkt.payload.as_slice(), b"udp-data");
    }

    #[test]
    fn ipv6_with_one_extension_header_reaches_udp_payload() {
        let mut rest = hop_by_hop(PROTO_UDP);
        rest.extend_from_slice(b"udp-data");
        let buf = v6_header(PROTO_HOPOPT, &rest);
        let pkt = parse_v6(Datum::new(&buf)).expect("parses");
        assert_eq!(pkt.protocol, PROTO_UDP);
        assert_eq!(pkt.payload.as_slice(), b"udp-data");
    }

    #[test]
    fn ipv6_with_two_extension_headers_reaches_udp_payload() {
        let mut rest = hop_by_hop(PROTO_FRAGMENT);
        rest.extend_from_slice(&fragment_header(PROTO_UDP));
        rest.extend_from_slice(b"udp-data");
        let buf = v6_header(PROTO_HOPOPT, &rest);
        let pkt = parse_v6(Datum::new(&buf)).expect("parses");
        assert_eq!(pkt.protocol, PROTO_UDP);
        assert_eq!(pkt.payload.as_slice(), b"udp-data");
        assert_eq!(
            pkt.addrs,
            IpAddrPair::V6 { src: Ipv6Addr::LOCALHOST, dst: Ipv6Addr::UNSPECIFIED }
        );
    }
}
