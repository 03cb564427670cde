//! Ethernet / 802.1Q / 802.1ad link-layer peeling (spec.md section 4.8 step 1).

use crate::datum::Datum;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86DD;
const ETHERTYPE_VLAN: u16 = 0x8100;
const ETHERTYPE_QINQ: u16 = 0x88A8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtherType {
    Ipv4,
    Ipv6,
    Other(u16),
}

/// Result of peeling Ethernet and any stacked VLAN tags: the next-layer
/// ethertype and the remaining datum positioned at the start of that layer's
/// header. An empty datum signals a malformed or too-short frame.
pub struct EthernetFrame<'a> {
    pub ether_type: EtherType,
    pub vlan_ids: Vec<u16>,
    pub payload: Datum<'a>,
}

/// Peel a 14-byte Ethernet header, plus up to two stacked VLAN tags
/// (802.1Q / 802.1ad double-tagging), returning the inner ethertype and the
/// datum positioned at the start of the next header. Truncated frames
/// produce an empty payload datum.
pub fn parse(mut d: Datum) -> EthernetFrame {
    // dst mac, src mac
    d.skip(12);
    let mut vlan_ids = Vec::new();
    let mut ether_type = match d.read_uint_be(2) {
        Some(v) => v as u16,
        None => return EthernetFrame { ether_type: EtherType::Other(0), vlan_ids, payload: Datum::empty() },
    };

    for _ in 0..2 {
        if ether_type != ETHERTYPE_VLAN && ether_type != ETHERTYPE_QINQ {
            break;
        }
        let Some(tci) = d.read_uint_be(2) else {
            return EthernetFrame { ether_type: EtherType::Other(0), vlan_ids, payload: Datum::empty() };
        };
        vlan_ids.push((tci & 0x0FFF) as u16);
        match d.read_uint_be(2) {
            Some(v) => ether_type = v as u16,
            None => {
                return EthernetFrame { ether_type: EtherType::Other(0), vlan_ids, payload: Datum::empty() }
            }
        }
    }

    let resolved = match ether_type {
        ETHERTYPE_IPV4 => EtherType::Ipv4,
        ETHERTYPE_IPV6 => EtherType::Ipv6,
        other => EtherType::Other(other),
    };
    EthernetFrame { ether_type: resolved, vlan_ids, payload: d }
}
