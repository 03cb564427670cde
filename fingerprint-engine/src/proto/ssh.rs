//! SSH version-exchange line and KEXINIT parsing (spec.md section 4.2).
//!
//! The version line ("SSH-2.0-...\r\n") and the KEXINIT packet's ordered
//! algorithm name-lists are both visible before any encryption begins, and
//! together they form the SSH fingerprinting surface.

use crate::datum::Datum;
use crate::json::JsonBuffer;

#[derive(Debug, Default)]
pub struct SshVersion {
    pub banner: String,
    pub additional_bytes_needed: usize,
}

impl SshVersion {
    pub fn is_not_empty(&self) -> bool {
        self.additional_bytes_needed == 0 && !self.banner.is_empty()
    }

    pub fn parse(d: &mut Datum) -> SshVersion {
        let end = d.find_delim(b"\r\n");
        if end == d.remaining() {
            return SshVersion { additional_bytes_needed: 1, ..SshVersion::default() };
        }
        let (head, _) = d.split(end);
        let Ok(banner) = std::str::from_utf8(head.as_slice()) else {
            d.fail();
            return SshVersion::default();
        };
        if !banner.starts_with("SSH-") {
            d.fail();
            return SshVersion::default();
        }
        SshVersion { banner: banner.to_string(), additional_bytes_needed: 0 }
    }

    pub fn fingerprint(&self) -> String {
        format!("({})", self.banner)
    }

    pub fn write_json(&self, obj: &mut JsonBuffer) {
        obj.key("banner");
        obj.str_value(&self.banner);
    }
}

const SSH_MSG_KEXINIT: u8 = 20;

#[derive(Debug, Default)]
pub struct SshKexInit {
    pub kex_algorithms: Vec<String>,
    pub server_host_key_algorithms: Vec<String>,
    pub encryption_algorithms_client_to_server: Vec<String>,
    pub mac_algorithms_client_to_server: Vec<String>,
    pub compression_algorithms_client_to_server: Vec<String>,
    pub additional_bytes_needed: usize,
}

impl SshKexInit {
    pub fn is_not_empty(&self) -> bool {
        self.additional_bytes_needed == 0 && !self.kex_algorithms.is_empty()
    }

    /// Parse a binary SSH packet: `length(4) | padding_len(1) | payload | padding`.
    /// Payload starts with the message type byte, then sixteen bytes of
    /// cookie, then five comma-separated name-lists relevant here (the rest
    /// of the fourteen KEXINIT name-lists are skipped).
    pub fn parse(d: &mut Datum) -> SshKexInit {
        let Some(packet_len) = d.read_uint_be(4) else {
            return SshKexInit { additional_bytes_needed: 4, ..SshKexInit::default() };
        };
        let packet_len = packet_len as usize;
        if d.remaining() < packet_len {
            let needed = packet_len - d.remaining();
            return SshKexInit { additional_bytes_needed: needed, ..SshKexInit::default() };
        }
        let (mut payload, _) = d.split(packet_len);

        let Some(padding_len) = payload.read_uint_be(1) else {
            d.fail();
            return SshKexInit::default();
        };
        let Some(msg_type) = payload.read_uint_be(1) else {
            d.fail();
            return SshKexInit::default();
        };
        if msg_type as u8 != SSH_MSG_KEXINIT {
            d.fail();
            return SshKexInit::default();
        }
        payload.skip(16); // cookie

        let mut lists = Vec::with_capacity(5);
        for _ in 0..5 {
            let Some(len) = payload.read_uint_be(4) else {
                d.fail();
                return SshKexInit::default();
            };
            let mut bytes = Vec::new();
            if !payload.read_bytes(len as usize, &mut bytes) {
                d.fail();
                return SshKexInit::default();
            }
            lists.push(String::from_utf8_lossy(&bytes).into_owned());
        }
        let _ = padding_len;

        let split_list = |s: &str| -> Vec<String> {
            if s.is_empty() {
                Vec::new()
            } else {
                s.split(',').map(String::from).collect()
            }
        };

        SshKexInit {
            kex_algorithms: split_list(&lists[0]),
            server_host_key_algorithms: split_list(&lists[1]),
            encryption_algorithms_client_to_server: split_list(&lists[2]),
            mac_algorithms_client_to_server: split_list(&lists[3]),
            compression_algorithms_client_to_server: split_list(&lists[4]),
            additional_bytes_needed: 0,
        }
    }

    /// Fingerprint over the ordered algorithm name-lists, joined the way
    /// JA3-style fingerprints join TLS cipher/extension lists.
    pub fn fingerprint(&self) -> String {
        format!(
            "({})({})({})({})({})",
            self.kex_algorithms.join(","),
            self.server_host_key_algorithms.join(","),
            self.encryption_algorithms_client_to_server.join(","),
            self.mac_algorithms_client_to_server.join(","),
            self.compression_algorithms_client_to_server.join(",")
        )
    }

    pub fn write_json(&self, obj: &mut JsonBuffer) {
        obj.key("kex_algorithms");
        obj.open_array();
        for a in &self.kex_algorithms {
            obj.str_value(a);
        }
        obj.close_array();
        obj.key("server_host_key_algorithms");
        obj.open_array();
        for a in &self.server_host_key_algorithms {
            obj.str_value(a);
        }
        obj.close_array();
        obj.key("encryption_algorithms_client_to_server");
        obj.open_array();
        for a in &self.encryption_algorithms_client_to_server {
            obj.str_value(a);
        }
        obj.close_array();
    }
}
