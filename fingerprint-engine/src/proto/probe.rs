//! Message-type probes (spec.md section 4.2): a short constant-time
//! signature match over the first bytes of a payload, used to dispatch to
//! the right handshake parser before committing to a full parse.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpMessageType {
    HttpRequest,
    HttpResponse,
    TlsClientHello,
    TlsServerHello,
    TlsCertificate,
    Ssh,
    SshKex,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UdpMessageType {
    Quic,
    Wireguard,
    Dns,
    DtlsClientHello,
    DtlsServerHello,
    DtlsCertificate,
    Dhcp,
    Vxlan,
    Unknown,
}

const VXLAN_PORT: u16 = 4789;

const TLS_HANDSHAKE: u8 = 0x16;
const TLS_HS_CLIENT_HELLO: u8 = 0x01;
const TLS_HS_SERVER_HELLO: u8 = 0x02;
const TLS_HS_CERTIFICATE: u8 = 0x0B;

const DTLS_HANDSHAKE: u8 = 0x16;

const HTTP_METHODS: &[&[u8]] =
    &[b"GET ", b"POST ", b"PUT ", b"HEAD ", b"DELETE ", b"OPTIONS ", b"PATCH ", b"CONNECT "];

/// Classify a TCP payload's message type from its leading bytes. Never
/// reads past the given slice.
pub fn probe_tcp(payload: &[u8]) -> TcpMessageType {
    if payload.starts_with(b"HTTP/") {
        return TcpMessageType::HttpResponse;
    }
    for method in HTTP_METHODS {
        if payload.starts_with(method) {
            return TcpMessageType::HttpRequest;
        }
    }
    if payload.len() >= 6 && payload[0] == TLS_HANDSHAKE && payload[1] == 0x03 {
        match payload[5] {
            TLS_HS_CLIENT_HELLO => return TcpMessageType::TlsClientHello,
            TLS_HS_SERVER_HELLO => return TcpMessageType::TlsServerHello,
            TLS_HS_CERTIFICATE => return TcpMessageType::TlsCertificate,
            _ => {}
        }
    }
    if payload.len() >= 4 && &payload[0..4] == b"SSH-" {
        return TcpMessageType::Ssh;
    }
    // Binary SSH_MSG_KEXINIT (code 20) inside the encrypted-looking binary
    // packet protocol, once the version-exchange line has already passed.
    if payload.len() >= 6 && payload[5] == 20 {
        return TcpMessageType::SshKex;
    }
    TcpMessageType::Unknown
}

/// Classify a UDP payload's message type, falling back to well-known
/// destination ports (5353 -> DNS, 4789 -> VXLAN). VXLAN-wrapped traffic is
/// reported as such but not decapsulated; the inner frame is out of scope
/// for this probe.
pub fn probe_udp(payload: &[u8], dst_port: u16) -> UdpMessageType {
    if dst_port == VXLAN_PORT {
        return UdpMessageType::Vxlan;
    }
    if payload.len() >= 2 && payload[0] & 0x80 != 0 {
        // QUIC long-header Initial packets set the fixed bit (0x40) and the
        // long-header bit (0x80); short-header packets are not first-flight.
        return UdpMessageType::Quic;
    }
    if payload.len() >= 14 && payload[0] == DTLS_HANDSHAKE {
        match payload[13] {
            TLS_HS_CLIENT_HELLO => return UdpMessageType::DtlsClientHello,
            TLS_HS_SERVER_HELLO => return UdpMessageType::DtlsServerHello,
            TLS_HS_CERTIFICATE => return UdpMessageType::DtlsCertificate,
            _ => {}
        }
    }
    if payload.len() >= 4 && payload[0] == 0x01 && payload[1] == 0 && payload[2] == 0 && payload[3] == 0 {
        return UdpMessageType::Wireguard;
    }
    if payload.len() >= 12 && is_dns_header(payload) {
        return UdpMessageType::Dns;
    }
    if payload.len() >= 4 && (payload[0] == 0x01 || payload[0] == 0x02) && payload[1] <= 6 {
        return UdpMessageType::Dhcp;
    }
    if dst_port == 5353 && payload.len() >= 12 && is_dns_header(payload) {
        return UdpMessageType::Dns;
    }
    UdpMessageType::Unknown
}

fn is_dns_header(payload: &[u8]) -> bool {
    let qdcount = u16::from_be_bytes([payload[4], payload[5]]);
    let opcode = (payload[2] >> 3) & 0x0F;
    qdcount > 0 && qdcount < 64 && opcode <= 2
}
