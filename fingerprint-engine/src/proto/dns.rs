//! DNS message parsing (spec.md section 4.2), question section only —
//! first-flight queries are what the engine fingerprints.

use crate::datum::Datum;
use crate::json::JsonBuffer;

#[derive(Debug, Default)]
pub struct DnsMessage {
    pub transaction_id: u16,
    pub is_response: bool,
    pub opcode: u8,
    pub questions: Vec<DnsQuestion>,
}

#[derive(Debug, Clone)]
pub struct DnsQuestion {
    pub name: String,
    pub qtype: u16,
    pub qclass: u16,
}

impl DnsMessage {
    pub fn is_not_empty(&self) -> bool {
        !self.questions.is_empty()
    }

    /// Parse the DNS header and question section from a UDP payload. DNS has
    /// no continuation semantics over UDP, so there is no `additional_bytes_needed`
    /// signal: a short message is simply malformed.
    pub fn parse(d: &mut Datum) -> DnsMessage {
        let full = d.as_slice();
        let Some(transaction_id) = d.read_uint_be(2) else {
            d.fail();
            return DnsMessage::default();
        };
        let Some(flags) = d.read_uint_be(2) else {
            d.fail();
            return DnsMessage::default();
        };
        let Some(qdcount) = d.read_uint_be(2) else {
            d.fail();
            return DnsMessage::default();
        };
        d.skip(6); // ancount, nscount, arcount

        let is_response = flags & 0x8000 != 0;
        let opcode = ((flags >> 11) & 0x0F) as u8;

        let mut questions = Vec::with_capacity(qdcount as usize);
        for _ in 0..qdcount.min(64) {
            match parse_question(d, full) {
                Some(q) => questions.push(q),
                None => {
                    d.fail();
                    return DnsMessage::default();
                }
            }
        }

        DnsMessage { transaction_id: transaction_id as u16, is_response, opcode, questions }
    }

    /// Fingerprint over the ordered sequence of `(qtype, qclass)` pairs;
    /// query names themselves are carried separately in the JSON record.
    pub fn fingerprint(&self) -> String {
        let parts: Vec<String> =
            self.questions.iter().map(|q| format!("{:04x}{:04x}", q.qtype, q.qclass)).collect();
        format!("({})", parts.join(","))
    }

    pub fn write_json(&self, obj: &mut JsonBuffer) {
        obj.key("transaction_id");
        obj.u64_value(self.transaction_id as u64);
        obj.key("response");
        obj.bool_value(self.is_response);
        obj.key("questions");
        obj.open_array();
        for q in &self.questions {
            obj.open_object();
            obj.key("name");
            obj.str_value(&q.name);
            obj.key("type");
            obj.u64_value(q.qtype as u64);
            obj.key("class");
            obj.u64_value(q.qclass as u64);
            obj.close_object();
        }
        obj.close_array();
    }
}

/// Parse one question, including compressed-name pointer following
/// (bounded to avoid following a pointer loop).
fn parse_question(d: &mut Datum, full_message: &[u8]) -> Option<DnsQuestion> {
    let name = parse_name(d, full_message, 0)?;
    let qtype = d.read_uint_be(2)? as u16;
    let qclass = d.read_uint_be(2)? as u16;
    Some(DnsQuestion { name, qtype, qclass })
}

fn parse_name(d: &mut Datum, full_message: &[u8], depth: u8) -> Option<String> {
    if depth > 8 {
        return None;
    }
    let mut labels = Vec::new();
    loop {
        let len = d.read_uint_be(1)? as u8;
        if len == 0 {
            break;
        }
        if len & 0xC0 == 0xC0 {
            let low = d.read_uint_be(1)? as u8;
            let offset = (((len & 0x3F) as usize) << 8) | low as usize;
            let pointee = full_message.get(offset..)?;
            let mut inner = Datum::new(pointee);
            let rest = parse_name(&mut inner, full_message, depth + 1)?;
            labels.push(rest);
            break;
        }
        let mut bytes = Vec::new();
        if !d.read_bytes(len as usize, &mut bytes) {
            return None;
        }
        labels.push(String::from_utf8_lossy(&bytes).into_owned());
    }
    Some(labels.join("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_name(name: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        for label in name.split('.') {
            buf.push(label.len() as u8);
            buf.extend_from_slice(label.as_bytes());
        }
        buf.push(0);
        buf
    }

    fn query(name: &str, qtype: u16, qclass: u16) -> Vec<u8> {
        let mut buf = vec![0x12, 0x34]; // transaction id
        buf.extend_from_slice(&0x0100u16.to_be_bytes()); // standard query, recursion desired
        buf.extend_from_slice(&1u16.to_be_bytes()); // qdcount
        buf.extend_from_slice(&[0u8; 6]); // an/ns/ar count
        buf.extend_from_slice(&encode_name(name));
        buf.extend_from_slice(&qtype.to_be_bytes());
        buf.extend_from_slice(&qclass.to_be_bytes());
        buf
    }

    #[test]
    fn query_parses_name_and_question_fields() {
        let buf = query("example.com", 1, 1);
        let msg = DnsMessage::parse(&mut Datum::new(&buf));
        assert!(msg.is_not_empty());
        assert!(!msg.is_response);
        assert_eq!(msg.questions.len(), 1);
        assert_eq!(msg.questions[0].name, "example.com");
        assert_eq!(msg.questions[0].qtype, 1);
    }

    #[test]
    fn response_flag_is_detected() {
        let mut buf = query("example.com", 1, 1);
        buf[2] |= 0x80;
        let msg = DnsMessage::parse(&mut Datum::new(&buf));
        assert!(msg.is_response);
    }

    #[test]
    fn truncated_message_is_malformed() {
        let msg = DnsMessage::parse(&mut Datum::new(&[0u8; 4]));
        assert!(!msg.is_not_empty());
    }

    #[test]
    fn fingerprint_reflects_qtype_and_qclass() {
        let buf = query("a.example.com", 28, 1);
        let fp = DnsMessage::parse(&mut Datum::new(&buf)).fingerprint();
        assert_eq!(fp, "(001c0001)");
    }
}
