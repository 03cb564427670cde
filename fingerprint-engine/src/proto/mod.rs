//! Protocol parsers (spec.md section 4.2): link/network/transport framing,
//! message-type probing, and the handshake/message parsers each protocol
//! fingerprint is built from.

pub mod asn1;
pub mod dhcp;
pub mod dns;
pub mod eth;
pub mod http;
pub mod ip;
pub mod probe;
pub mod quic;
pub mod ssh;
pub mod tcp;
pub mod tls;
pub mod udp;
pub mod wireguard;

pub use dhcp::DhcpMessage;
pub use dns::{DnsMessage, DnsQuestion};
pub use eth::{EtherType, EthernetFrame};
pub use http::{HttpRequest, HttpResponse};
pub use ip::{IpAddrPair, IpPacket};
pub use probe::{probe_tcp, probe_udp, TcpMessageType, UdpMessageType};
pub use ssh::{SshKexInit, SshVersion};
pub use tcp::TcpSegment;
pub use tls::{Certificate, ClientHello, ServerHello};
pub use udp::UdpDatagram;
pub use wireguard::{WireguardMessage, WireguardMessageType};
