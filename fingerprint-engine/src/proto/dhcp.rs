//! DHCP (BOOTP) message parsing (spec.md section 4.2): fixed header plus
//! the option 55 (Parameter Request List), which drives the fingerprint.

use crate::datum::Datum;
use crate::json::JsonBuffer;

const MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];
const OPT_PARAMETER_REQUEST_LIST: u8 = 55;
const OPT_MESSAGE_TYPE: u8 = 53;
const OPT_END: u8 = 255;
const OPT_PAD: u8 = 0;

#[derive(Debug, Default)]
pub struct DhcpMessage {
    pub op: u8,
    pub message_type: u8,
    pub parameter_request_list: Vec<u8>,
}

impl DhcpMessage {
    pub fn is_not_empty(&self) -> bool {
        self.op != 0
    }

    pub fn parse(d: &mut Datum) -> DhcpMessage {
        let Some(op) = d.read_uint_be(1) else {
            d.fail();
            return DhcpMessage::default();
        };
        d.skip(1); // htype
        d.skip(1); // hlen
        d.skip(1); // hops
        d.skip(4); // xid
        d.skip(2); // secs
        d.skip(2); // flags
        d.skip(4); // ciaddr
        d.skip(4); // yiaddr
        d.skip(4); // siaddr
        d.skip(4); // giaddr
        d.skip(16); // chaddr
        d.skip(64); // sname
        d.skip(128); // file

        let mut cookie = Vec::new();
        if !d.read_bytes(4, &mut cookie) || cookie != MAGIC_COOKIE {
            d.fail();
            return DhcpMessage::default();
        }

        let mut message_type = 0u8;
        let mut parameter_request_list = Vec::new();
        loop {
            let Some(code) = d.read_uint_be(1) else { break };
            let code = code as u8;
            if code == OPT_END || code == OPT_PAD {
                if code == OPT_END {
                    break;
                }
                continue;
            }
            let Some(len) = d.read_uint_be(1) else { break };
            let mut value = Vec::new();
            if !d.read_bytes(len as usize, &mut value) {
                break;
            }
            match code {
                OPT_MESSAGE_TYPE => message_type = value.first().copied().unwrap_or(0),
                OPT_PARAMETER_REQUEST_LIST => parameter_request_list = value,
                _ => {}
            }
        }

        DhcpMessage { op: op as u8, message_type, parameter_request_list }
    }

    /// Fingerprint over the DHCP message type and the client's requested
    /// parameter ordering, the classic DHCP fingerprinting signal.
    pub fn fingerprint(&self) -> String {
        let params: Vec<String> = self.parameter_request_list.iter().map(|p| format!("{p:02x}")).collect();
        format!("({:02x})({})", self.message_type, params.join(","))
    }

    pub fn write_json(&self, obj: &mut JsonBuffer) {
        obj.key("op");
        obj.u64_value(self.op as u64);
        obj.key("message_type");
        obj.u64_value(self.message_type as u64);
        obj.key("parameter_request_list");
        obj.open_array();
        for p in &self.parameter_request_list {
            obj.u64_value(*p as u64);
        }
        obj.close_array();
    }
}
