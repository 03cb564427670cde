//! Packet filter configuration string (spec.md section 6): a comma-separated
//! selector list such as `"tls,http,dns"` enabling per-protocol emission.
//! Unknown tokens are a configuration error, not silently ignored.

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tls,
    Http,
    Dns,
    Ssh,
    Dhcp,
    Quic,
    Tcp,
    Udp,
    Wireguard,
    Dtls,
}

impl Protocol {
    fn from_token(token: &str) -> Option<Protocol> {
        Some(match token {
            "tls" => Protocol::Tls,
            "http" => Protocol::Http,
            "dns" => Protocol::Dns,
            "ssh" => Protocol::Ssh,
            "dhcp" => Protocol::Dhcp,
            "quic" => Protocol::Quic,
            "tcp" => Protocol::Tcp,
            "udp" => Protocol::Udp,
            "wireguard" => Protocol::Wireguard,
            "dtls" => Protocol::Dtls,
            _ => return None,
        })
    }
}

/// The set of protocols enabled for record emission. An empty filter
/// (constructed from an empty string) enables everything, matching the
/// "no filter configured" default.
#[derive(Debug, Clone)]
pub struct PacketFilter {
    enabled: Vec<Protocol>,
    allow_all: bool,
}

impl PacketFilter {
    pub fn parse(cfg: &str) -> Result<PacketFilter> {
        let cfg = cfg.trim();
        if cfg.is_empty() {
            return Ok(PacketFilter { enabled: Vec::new(), allow_all: true });
        }
        let mut enabled = Vec::new();
        for token in cfg.split(',') {
            let token = token.trim();
            match Protocol::from_token(token) {
                Some(p) => enabled.push(p),
                None => return Err(EngineError::Config(format!("unknown packet filter token: {token}"))),
            }
        }
        Ok(PacketFilter { enabled, allow_all: false })
    }

    pub fn allows(&self, protocol: Protocol) -> bool {
        self.allow_all || self.enabled.contains(&protocol)
    }

    pub fn allow_all() -> PacketFilter {
        PacketFilter { enabled: Vec::new(), allow_all: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_allows_everything() {
        let f = PacketFilter::parse("").unwrap();
        assert!(f.allows(Protocol::Tls));
        assert!(f.allows(Protocol::Dns));
    }

    #[test]
    fn comma_separated_list_enables_only_named_protocols() {
        let f = PacketFilter::parse("tls,http,dns").unwrap();
        assert!(f.allows(Protocol::Tls));
        assert!(f.allows(Protocol::Http));
        assert!(f.allows(Protocol::Dns));
        assert!(!f.allows(Protocol::Quic));
    }

    #[test]
    fn unknown_token_is_an_error() {
        assert!(PacketFilter::parse("tls,bogus").is_err());
    }

    #[test]
    fn whitespace_around_tokens_is_trimmed() {
        let f = PacketFilter::parse(" tls , http ").unwrap();
        assert!(f.allows(Protocol::Tls));
        assert!(f.allows(Protocol::Http));
    }
}
