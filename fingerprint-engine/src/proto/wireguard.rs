//! WireGuard handshake message-type detection (spec.md section 4.2).
//!
//! Everything past the message type and sender index in a WireGuard
//! handshake is encrypted or padded with random-looking ephemeral key
//! material, so there is no algorithm negotiation to fingerprint the way
//! TLS or SSH offer. The engine records only the message type and the
//! handshake's fixed total length, which is itself a (weak) signal since
//! the three handshake message types each have a distinct, constant size.

use crate::datum::Datum;
use crate::json::JsonBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireguardMessageType {
    HandshakeInitiation,
    HandshakeResponse,
    CookieReply,
    TransportData,
}

#[derive(Debug)]
pub struct WireguardMessage {
    pub message_type: WireguardMessageType,
    pub sender_index: u32,
    pub total_len: usize,
}

impl WireguardMessage {
    pub fn parse(d: &mut Datum) -> Option<WireguardMessage> {
        let total_len = d.remaining();
        let message_type = match d.read_uint_be(1)? as u8 {
            1 => WireguardMessageType::HandshakeInitiation,
            2 => WireguardMessageType::HandshakeResponse,
            3 => WireguardMessageType::CookieReply,
            4 => WireguardMessageType::TransportData,
            _ => {
                d.fail();
                return None;
            }
        };
        d.skip(3); // reserved, must be zero
        let sender_index = d.read_uint_be(4)? as u32;

        let expected_min = match message_type {
            WireguardMessageType::HandshakeInitiation => 148,
            WireguardMessageType::HandshakeResponse => 92,
            WireguardMessageType::CookieReply => 64,
            WireguardMessageType::TransportData => 32,
        };
        if total_len < expected_min {
            d.fail();
            return None;
        }

        Some(WireguardMessage { message_type, sender_index, total_len })
    }

    pub fn fingerprint(&self) -> String {
        format!("({:?})({})", self.message_type, self.total_len)
    }

    pub fn write_json(&self, obj: &mut JsonBuffer) {
        obj.key("message_type");
        obj.str_value(match self.message_type {
            WireguardMessageType::HandshakeInitiation => "handshake_initiation",
            WireguardMessageType::HandshakeResponse => "handshake_response",
            WireguardMessageType::CookieReply => "cookie_reply",
            WireguardMessageType::TransportData => "transport_data",
        });
        obj.key("sender_index");
        obj.u64_value(self.sender_index as u64);
    }
}
