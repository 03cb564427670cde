//! TLS / DTLS record and handshake parsing (spec.md sections 4.2, 4.8).
//!
//! Fingerprint strings follow the field-sequence convention common to
//! passive TLS fingerprinting: `(version)(cipher-suites)(extension-types)`
//! as parenthesised, concatenated big-endian hex, so two ClientHellos with
//! the same client-visible shape produce byte-identical fingerprint
//! strings regardless of extension *content* (SNI value, key-share bytes).

use crate::datum::Datum;
use crate::json::JsonBuffer;

const EXT_SERVER_NAME: u16 = 0x0000;
const EXT_SUPPORTED_VERSIONS: u16 = 0x002B;

const HS_CLIENT_HELLO: u8 = 0x01;
const HS_SERVER_HELLO: u8 = 0x02;
const HS_CERTIFICATE: u8 = 0x0B;

/// Outcome of stripping one record-layer header.
enum Record<'a> {
    /// `content_type`, with the datum advanced past it and positioned at
    /// the handshake fragment of the declared length.
    Fragment(u8, Datum<'a>),
    /// The header itself was unreadable (truncated before the length
    /// field) or the record is self-evidently malformed.
    Malformed,
    /// The header parsed cleanly but fewer bytes are available than the
    /// record declares; this many more bytes are needed.
    Incomplete(usize),
}

/// Strip one TLS (or DTLS) record-layer header, returning the handshake
/// fragment bytes and, for DTLS, discarding the epoch/sequence-number
/// fields the record layer carries but the handshake body does not need.
fn strip_record_header(mut d: Datum, is_dtls: bool) -> Record {
    let Some(content_type) = d.read_uint_be(1) else { return Record::Malformed };
    d.skip(2); // version
    if is_dtls {
        d.skip(8); // epoch + 48-bit sequence number
    }
    let Some(len) = d.read_uint_be(2) else { return Record::Malformed };
    let len = len as usize;
    if d.remaining() < len {
        return Record::Incomplete(len - d.remaining());
    }
    let (fragment, _) = d.split(len);
    Record::Fragment(content_type as u8, fragment)
}

/// A parsed ClientHello, holding only the client-visible shape needed for
/// fingerprinting and SNI extraction. `additional_bytes_needed` is nonzero
/// when the record/handshake framing promised more bytes than were
/// supplied, signalling the caller to wait for reassembly.
#[derive(Debug, Default)]
pub struct ClientHello {
    pub legacy_version: u16,
    pub cipher_suites: Vec<u16>,
    pub extension_types: Vec<u16>,
    pub server_name: Option<String>,
    pub supported_versions: Vec<u16>,
    pub additional_bytes_needed: usize,
}

impl ClientHello {
    pub fn is_not_empty(&self) -> bool {
        self.additional_bytes_needed == 0 && !self.cipher_suites.is_empty()
    }

    /// Parse a ClientHello from a TLS (or DTLS, `is_dtls = true`) record.
    /// `d` must be positioned at the start of the record; on return it is
    /// advanced past the consumed record, or emptied on malformed input.
    pub fn parse(d: &mut Datum, is_dtls: bool) -> ClientHello {
        let fragment = match strip_record_header(*d, is_dtls) {
            Record::Fragment(0x16, fragment) => fragment,
            Record::Fragment(_, _) | Record::Malformed => {
                d.fail();
                return ClientHello::default();
            }
            Record::Incomplete(needed) => {
                return ClientHello { additional_bytes_needed: needed, ..ClientHello::default() }
            }
        };
        let mut hs = fragment;
        let Some(hs_type) = hs.read_uint_be(1) else {
            d.fail();
            return ClientHello::default();
        };
        if hs_type as u8 != HS_CLIENT_HELLO {
            d.fail();
            return ClientHello::default();
        }
        let Some(hs_len) = hs.read_uint_be(3) else {
            d.fail();
            return ClientHello::default();
        };
        if is_dtls {
            hs.skip(8); // message_seq, fragment_offset (3), fragment_length (3) ignored for single-fragment case
        }
        if hs.remaining() < hs_len as usize {
            return ClientHello {
                additional_bytes_needed: hs_len as usize - hs.remaining(),
                ..ClientHello::default()
            };
        }

        let legacy_version = match hs.read_uint_be(2) {
            Some(v) => v as u16,
            None => {
                d.fail();
                return ClientHello::default();
            }
        };
        hs.skip(32); // client random
        let Some(session_id_len) = hs.read_uint_be(1) else {
            d.fail();
            return ClientHello::default();
        };
        hs.skip(session_id_len as usize);
        if is_dtls {
            let Some(cookie_len) = hs.read_uint_be(1) else {
                d.fail();
                return ClientHello::default();
            };
            hs.skip(cookie_len as usize);
        }

        let Some(cs_len) = hs.read_uint_be(2) else {
            d.fail();
            return ClientHello::default();
        };
        let (mut cs_data, rest) = hs.split(cs_len as usize);
        hs = rest;
        let mut cipher_suites = Vec::new();
        while cs_data.is_not_empty() {
            match cs_data.read_uint_be(2) {
                Some(v) => cipher_suites.push(v as u16),
                None => break,
            }
        }

        let Some(comp_len) = hs.read_uint_be(1) else {
            d.fail();
            return ClientHello::default();
        };
        hs.skip(comp_len as usize);

        let mut extension_types = Vec::new();
        let mut server_name = None;
        let mut supported_versions = Vec::new();
        if hs.is_not_empty() {
            if let Some(ext_total_len) = hs.read_uint_be(2) {
                let (mut ext_data, _) = hs.split(ext_total_len as usize);
                while ext_data.is_not_empty() {
                    let Some(ext_type) = ext_data.read_uint_be(2) else { break };
                    let Some(ext_len) = ext_data.read_uint_be(2) else { break };
                    let (body, rest) = ext_data.split(ext_len as usize);
                    ext_data = rest;
                    extension_types.push(ext_type as u16);
                    match ext_type as u16 {
                        EXT_SERVER_NAME => {
                            server_name = parse_server_name_extension(body);
                        }
                        EXT_SUPPORTED_VERSIONS => {
                            supported_versions = parse_supported_versions(body);
                        }
                        _ => {}
                    }
                }
            }
        }

        ClientHello {
            legacy_version,
            cipher_suites,
            extension_types,
            server_name,
            supported_versions,
            additional_bytes_needed: 0,
        }
    }

    /// The deterministic fingerprint string: `(version)(ciphersuites)(exts)`.
    pub fn fingerprint(&self) -> String {
        format!(
            "({:04x})({})({})",
            self.legacy_version,
            hex_join(&self.cipher_suites),
            hex_join(&self.extension_types),
        )
    }

    pub fn write_json(&self, obj: &mut JsonBuffer) {
        obj.key("version");
        obj.u64_value(self.legacy_version as u64);
        obj.key("cipher_suites");
        obj.open_array();
        for cs in &self.cipher_suites {
            obj.u64_value(*cs as u64);
        }
        obj.close_array();
        obj.key("extensions");
        obj.open_array();
        for e in &self.extension_types {
            obj.u64_value(*e as u64);
        }
        obj.close_array();
        if let Some(sni) = &self.server_name {
            obj.key("server_name");
            obj.str_value(sni);
        }
    }
}

/// A parsed ServerHello: just enough to fingerprint the server's reply
/// (negotiated version, selected cipher suite, extension types present).
#[derive(Debug, Default)]
pub struct ServerHello {
    pub legacy_version: u16,
    pub cipher_suite: u16,
    pub extension_types: Vec<u16>,
    pub additional_bytes_needed: usize,
}

impl ServerHello {
    pub fn is_not_empty(&self) -> bool {
        self.additional_bytes_needed == 0 && self.cipher_suite != 0
    }

    pub fn parse(d: &mut Datum, is_dtls: bool) -> ServerHello {
        let fragment = match strip_record_header(*d, is_dtls) {
            Record::Fragment(0x16, fragment) => fragment,
            Record::Fragment(_, _) | Record::Malformed => {
                d.fail();
                return ServerHello::default();
            }
            Record::Incomplete(needed) => {
                return ServerHello { additional_bytes_needed: needed, ..ServerHello::default() }
            }
        };
        let mut hs = fragment;
        let Some(hs_type) = hs.read_uint_be(1) else {
            d.fail();
            return ServerHello::default();
        };
        if hs_type as u8 != HS_SERVER_HELLO {
            d.fail();
            return ServerHello::default();
        }
        let Some(hs_len) = hs.read_uint_be(3) else {
            d.fail();
            return ServerHello::default();
        };
        if is_dtls {
            hs.skip(8);
        }
        if hs.remaining() < hs_len as usize {
            return ServerHello {
                additional_bytes_needed: hs_len as usize - hs.remaining(),
                ..ServerHello::default()
            };
        }

        let Some(legacy_version) = hs.read_uint_be(2) else {
            d.fail();
            return ServerHello::default();
        };
        hs.skip(32); // server random
        let Some(session_id_len) = hs.read_uint_be(1) else {
            d.fail();
            return ServerHello::default();
        };
        hs.skip(session_id_len as usize);
        if is_dtls {
            // DTLS 1.2 ServerHello carries no cookie; nothing extra to skip.
        }
        let Some(cipher_suite) = hs.read_uint_be(2) else {
            d.fail();
            return ServerHello::default();
        };
        hs.skip(1); // compression method

        let mut extension_types = Vec::new();
        if hs.is_not_empty() {
            if let Some(ext_total_len) = hs.read_uint_be(2) {
                let (mut ext_data, _) = hs.split(ext_total_len as usize);
                while ext_data.is_not_empty() {
                    let Some(ext_type) = ext_data.read_uint_be(2) else { break };
                    let Some(ext_len) = ext_data.read_uint_be(2) else { break };
                    let (_, rest) = ext_data.split(ext_len as usize);
                    ext_data = rest;
                    extension_types.push(ext_type as u16);
                }
            }
        }

        ServerHello {
            legacy_version: legacy_version as u16,
            cipher_suite: cipher_suite as u16,
            extension_types,
            additional_bytes_needed: 0,
        }
    }

    pub fn fingerprint(&self) -> String {
        format!("({:04x})({:04x})({})", self.legacy_version, self.cipher_suite, hex_join(&self.extension_types))
    }

    pub fn write_json(&self, obj: &mut JsonBuffer) {
        obj.key("version");
        obj.u64_value(self.legacy_version as u64);
        obj.key("cipher_suite");
        obj.u64_value(self.cipher_suite as u64);
        obj.key("extensions");
        obj.open_array();
        for e in &self.extension_types {
            obj.u64_value(*e as u64);
        }
        obj.close_array();
    }
}

/// First certificate in a Certificate handshake message's chain, as a raw
/// DER blob; X.509 field decoding is left to `asn1::read_tlv` callers.
#[derive(Debug, Default)]
pub struct Certificate {
    pub der: Vec<u8>,
    pub additional_bytes_needed: usize,
}

impl Certificate {
    pub fn is_not_empty(&self) -> bool {
        self.additional_bytes_needed == 0 && !self.der.is_empty()
    }

    pub fn parse(d: &mut Datum, is_dtls: bool) -> Certificate {
        let fragment = match strip_record_header(*d, is_dtls) {
            Record::Fragment(0x16, fragment) => fragment,
            Record::Fragment(_, _) | Record::Malformed => {
                d.fail();
                return Certificate::default();
            }
            Record::Incomplete(needed) => {
                return Certificate { additional_bytes_needed: needed, ..Certificate::default() }
            }
        };
        let mut hs = fragment;
        let Some(hs_type) = hs.read_uint_be(1) else {
            d.fail();
            return Certificate::default();
        };
        if hs_type as u8 != HS_CERTIFICATE {
            d.fail();
            return Certificate::default();
        }
        let Some(hs_len) = hs.read_uint_be(3) else {
            d.fail();
            return Certificate::default();
        };
        if is_dtls {
            hs.skip(8);
        }
        if hs.remaining() < hs_len as usize {
            return Certificate {
                additional_bytes_needed: hs_len as usize - hs.remaining(),
                ..Certificate::default()
            };
        }

        let Some(_chain_len) = hs.read_uint_be(3) else {
            d.fail();
            return Certificate::default();
        };
        let Some(cert_len) = hs.read_uint_be(3) else {
            d.fail();
            return Certificate::default();
        };
        let mut der = Vec::new();
        if !hs.read_bytes(cert_len as usize, &mut der) {
            d.fail();
            return Certificate::default();
        }
        Certificate { der, additional_bytes_needed: 0 }
    }
}

fn parse_server_name_extension(mut body: Datum) -> Option<String> {
    let list_len = body.read_uint_be(2)?;
    let (mut list, _) = body.split(list_len as usize);
    let name_type = list.read_uint_be(1)?;
    if name_type != 0 {
        return None;
    }
    let name_len = list.read_uint_be(2)?;
    let mut bytes = Vec::new();
    if !list.read_bytes(name_len as usize, &mut bytes) {
        return None;
    }
    String::from_utf8(bytes).ok()
}

fn parse_supported_versions(mut body: Datum) -> Vec<u16> {
    let mut versions = Vec::new();
    let Some(len) = body.read_uint_be(1) else { return versions };
    let (mut list, _) = body.split(len as usize);
    while list.is_not_empty() {
        match list.read_uint_be(2) {
            Some(v) => versions.push(v as u16),
            None => break,
        }
    }
    versions
}

fn hex_join(values: &[u16]) -> String {
    values.iter().map(|v| format!("{v:04x}")).collect::<Vec<_>>().join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_hello_record(cipher_suites: &[u16], extensions: &[(u16, &[u8])], sni: Option<&str>) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&0x0303u16.to_be_bytes()); // legacy_version
        body.extend_from_slice(&[0u8; 32]); // random
        body.push(0); // session_id_len
        body.extend_from_slice(&((cipher_suites.len() * 2) as u16).to_be_bytes());
        for cs in cipher_suites {
            body.extend_from_slice(&cs.to_be_bytes());
        }
        body.push(1); // compression methods len
        body.push(0); // null compression

        let mut ext_bytes = Vec::new();
        if let Some(name) = sni {
            let mut sni_ext = Vec::new();
            let mut entry = vec![0u8]; // name_type = host_name
            entry.extend_from_slice(&(name.len() as u16).to_be_bytes());
            entry.extend_from_slice(name.as_bytes());
            sni_ext.extend_from_slice(&(entry.len() as u16).to_be_bytes());
            sni_ext.extend_from_slice(&entry);
            ext_bytes.extend_from_slice(&EXT_SERVER_NAME.to_be_bytes());
            ext_bytes.extend_from_slice(&(sni_ext.len() as u16).to_be_bytes());
            ext_bytes.extend_from_slice(&sni_ext);
        }
        for (ty, data) in extensions {
            ext_bytes.extend_from_slice(&ty.to_be_bytes());
            ext_bytes.extend_from_slice(&(data.len() as u16).to_be_bytes());
            ext_bytes.extend_from_slice(data);
        }
        body.extend_from_slice(&(ext_bytes.len() as u16).to_be_bytes());
        body.extend_from_slice(&ext_bytes);

        let mut handshake = vec![HS_CLIENT_HELLO];
        handshake.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
        handshake.extend_from_slice(&body);

        let mut record = vec![0x16, 0x03, 0x01];
        record.extend_from_slice(&(handshake.len() as u16).to_be_bytes());
        record.extend_from_slice(&handshake);
        record
    }

    #[test]
    fn client_hello_parses_ciphers_extensions_and_sni() {
        let record = client_hello_record(&[0x1301, 0x1302], &[(0x000A, &[0x00, 0x02, 0x00, 0x1D])], Some("example.com"));
        let mut d = Datum::new(&record);
        let ch = ClientHello::parse(&mut d, false);
        assert!(ch.is_not_empty());
        assert_eq!(ch.cipher_suites, vec![0x1301, 0x1302]);
        assert!(ch.extension_types.contains(&0x0000));
        assert!(ch.extension_types.contains(&0x000A));
        assert_eq!(ch.server_name.as_deref(), Some("example.com"));
    }

    #[test]
    fn fingerprint_is_deterministic_across_sni_values() {
        let a = client_hello_record(&[0x1301], &[], Some("a.example.com"));
        let b = client_hello_record(&[0x1301], &[], Some("b.example.org"));
        let fp_a = ClientHello::parse(&mut Datum::new(&a), false).fingerprint();
        let fp_b = ClientHello::parse(&mut Datum::new(&b), false).fingerprint();
        assert_eq!(fp_a, fp_b);
    }

    #[test]
    fn truncated_client_hello_signals_additional_bytes_needed() {
        let full = client_hello_record(&[0x1301, 0x1302], &[], Some("example.com"));
        let truncated = &full[..full.len() - 10];
        let mut d = Datum::new(truncated);
        let ch = ClientHello::parse(&mut d, false);
        assert!(!ch.is_not_empty());
        assert!(ch.additional_bytes_needed > 0);
    }

    #[test]
    fn malformed_client_hello_empties_datum() {
        let mut d = Datum::new(&[0x16, 0x03, 0x01, 0x00, 0x01, 0xFF]);
        let ch = ClientHello::parse(&mut d, false);
        assert!(!ch.is_not_empty());
        assert!(d.is_empty());
    }
}
