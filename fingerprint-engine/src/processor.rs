//! Per-worker packet processor (spec.md section 4.8): the pipeline that
//! turns one captured packet into at most one JSON record.
//!
//! Every stage between `process()`'s entry and its `Option<String>` return is
//! total: a malformed, truncated, or filtered-out packet produces `None`,
//! never a propagated error (spec.md section 7 — `EngineError` is reserved
//! for init-time failures and never appears on this path). One `Processor`
//! owns its own flow tables and reassembler and is meant to be run on a
//! single worker thread; the fingerprint database and prevalence sets are
//! `Arc`-shared read-only state.

use crate::classifier::{analyze, AnalysisResult, AnalysisStatus, FingerprintDb, FingerprintPrevalence};
use crate::datum::Datum;
use crate::filter::{PacketFilter, Protocol};
use crate::flow::{FlowKey, IpFlowTable, TcpFlowTable};
use crate::json::JsonBuffer;
use crate::proto::eth::EtherType;
use crate::proto::ip::IpAddrPair;
use crate::proto::probe::{TcpMessageType, UdpMessageType};
use crate::proto::tcp::TcpSegment;
use crate::proto::udp::UdpDatagram;
use crate::proto::{dhcp, dns, eth, http, ip, probe, quic, ssh, tcp, tls, udp, wireguard};
use crate::reassembly::Reassembler;
use crate::stats::{self, Stats};
use std::sync::Arc;

/// Packet-capture timestamp, `secs` in the table/TTL unit the flow tables and
/// reassembler operate on (spec.md section 5: "packet-timestamp units, not
/// wall clock").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub secs: u64,
    pub micros: u32,
}

/// Per-worker tunables (spec.md section 6). Resource loading (the fingerprint
/// database, prevalence sets, subnet table) happens once at startup and is
/// handed to every worker as `Arc` state; this struct covers only what
/// affects the per-packet pipeline itself.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub gre_enabled: bool,
    pub do_analysis: bool,
    pub metadata_output: bool,
    pub dns_json_output: bool,
    pub certs_json_output: bool,
    pub output_tcp_initial_data: bool,
    pub output_udp_initial_data: bool,
    pub filter: PacketFilter,
    pub flow_table_capacity: usize,
    pub reassembly_capacity: usize,
    pub reassembly_ttl_seconds: u64,
    pub json_capacity: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        ProcessorConfig {
            gre_enabled: true,
            do_analysis: true,
            metadata_output: true,
            dns_json_output: false,
            certs_json_output: false,
            output_tcp_initial_data: false,
            output_udp_initial_data: false,
            filter: PacketFilter::allow_all(),
            flow_table_capacity: 65_536,
            reassembly_capacity: 4_096,
            reassembly_ttl_seconds: 60,
            json_capacity: 8_192,
        }
    }
}

impl ProcessorConfig {
    /// Build from a loaded [`crate::config::Config`], keeping the
    /// implementation-level tunables (flow table sizes, reassembly TTL,
    /// JSON buffer capacity, GRE support) at their defaults since spec.md's
    /// Config surface doesn't expose them.
    pub fn from_config(cfg: &crate::config::Config) -> Result<Self, String> {
        Ok(ProcessorConfig {
            do_analysis: cfg.output.do_analysis,
            metadata_output: cfg.output.metadata_output,
            dns_json_output: cfg.output.dns_json_output,
            certs_json_output: cfg.output.certs_json_output,
            output_tcp_initial_data: cfg.output.output_tcp_initial_data,
            output_udp_initial_data: cfg.output.output_udp_initial_data,
            filter: cfg.filter.compile()?,
            ..ProcessorConfig::default()
        })
    }
}

/// One packet-processor instance, per spec.md section 5 owned exclusively by
/// a single worker thread: no locking on any field here.
pub struct Processor {
    ip_flows: IpFlowTable,
    tcp_flows: TcpFlowTable,
    reassembler: Reassembler,
    config: ProcessorConfig,
    db: Arc<FingerprintDb>,
    prevalence: Arc<FingerprintPrevalence>,
    stats: Arc<Stats>,
}

/// A handshake message recovered either directly from one packet or from a
/// completed TCP reassembly. Dispatch happens once per variant in
/// `build_tcp_record`; the `additional_bytes_needed`/`is_not_empty` pair
/// lets `process_tcp_data` stay generic over which protocol it is holding.
enum TcpHandshakeMessage {
    ClientHello(tls::ClientHello),
    ServerHello(tls::ServerHello),
    Certificate(tls::Certificate),
    HttpRequest(http::HttpRequest),
    HttpResponse(http::HttpResponse),
    SshVersion(ssh::SshVersion),
    SshKex(ssh::SshKexInit),
}

impl TcpHandshakeMessage {
    fn additional_bytes_needed(&self) -> usize {
        match self {
            TcpHandshakeMessage::ClientHello(m) => m.additional_bytes_needed,
            TcpHandshakeMessage::ServerHello(m) => m.additional_bytes_needed,
            TcpHandshakeMessage::Certificate(m) => m.additional_bytes_needed,
            TcpHandshakeMessage::HttpRequest(m) => m.additional_bytes_needed,
            TcpHandshakeMessage::HttpResponse(m) => m.additional_bytes_needed,
            TcpHandshakeMessage::SshVersion(m) => m.additional_bytes_needed,
            TcpHandshakeMessage::SshKex(m) => m.additional_bytes_needed,
        }
    }

    fn is_not_empty(&self) -> bool {
        match self {
            TcpHandshakeMessage::ClientHello(m) => m.is_not_empty(),
            TcpHandshakeMessage::ServerHello(m) => m.is_not_empty(),
            TcpHandshakeMessage::Certificate(m) => m.is_not_empty(),
            TcpHandshakeMessage::HttpRequest(m) => m.is_not_empty(),
            TcpHandshakeMessage::HttpResponse(m) => m.is_not_empty(),
            TcpHandshakeMessage::SshVersion(m) => m.is_not_empty(),
            TcpHandshakeMessage::SshKex(m) => m.is_not_empty(),
        }
    }
}

/// Dispatch a fresh (non-continuation) payload to the right handshake parser
/// based on `probe::probe_tcp`'s signature match. `Unknown` carries nothing
/// worth reassembling or emitting.
fn parse_tcp_handshake(kind: TcpMessageType, d: &mut Datum) -> Option<TcpHandshakeMessage> {
    Some(match kind {
        TcpMessageType::TlsClientHello => TcpHandshakeMessage::ClientHello(tls::ClientHello::parse(d, false)),
        TcpMessageType::TlsServerHello => TcpHandshakeMessage::ServerHello(tls::ServerHello::parse(d, false)),
        TcpMessageType::TlsCertificate => TcpHandshakeMessage::Certificate(tls::Certificate::parse(d, false)),
        TcpMessageType::HttpRequest => TcpHandshakeMessage::HttpRequest(http::HttpRequest::parse(d)),
        TcpMessageType::HttpResponse => TcpHandshakeMessage::HttpResponse(http::HttpResponse::parse(d)),
        TcpMessageType::Ssh => TcpHandshakeMessage::SshVersion(ssh::SshVersion::parse(d)),
        TcpMessageType::SshKex => TcpHandshakeMessage::SshKex(ssh::SshKexInit::parse(d)),
        TcpMessageType::Unknown => return None,
    })
}

fn make_flow_key(addrs: IpAddrPair, src_port: u16, dst_port: u16, protocol: u8) -> FlowKey {
    match addrs {
        IpAddrPair::V4 { src, dst } => FlowKey::v4(src, dst, src_port, dst_port, protocol),
        IpAddrPair::V6 { src, dst } => FlowKey::v6(src, dst, src_port, dst_port, protocol),
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Append an `analysis` object to `obj` when the classifier attributed the
/// flow to a specific process. `Randomized`/`Unlabeled`/`NoInfo` carry
/// nothing printable and are left out of the record entirely.
fn write_analysis(obj: &mut JsonBuffer, result: &AnalysisResult) {
    if result.status != AnalysisStatus::Labeled {
        return;
    }
    let Some(process_name) = &result.process_name else { return };
    obj.key("analysis");
    obj.open_object();
    obj.key("process");
    obj.str_value(process_name);
    obj.key("score");
    obj.f64_value(result.probability);
    if let Some(m) = result.malware {
        obj.key("malware");
        obj.bool_value(m);
    }
    if let Some(mp) = result.malware_probability {
        obj.key("malware_score");
        obj.f64_value(mp);
    }
    if !result.os_info.is_empty() {
        obj.key("os_info");
        obj.open_array();
        for (name, count) in &result.os_info {
            obj.open_object();
            obj.key("name");
            obj.str_value(name);
            obj.key("count");
            obj.u64_value(*count);
            obj.close_object();
        }
        obj.close_array();
    }
    obj.close_object();
}

impl Processor {
    pub fn new(
        config: ProcessorConfig,
        db: Arc<FingerprintDb>,
        prevalence: Arc<FingerprintPrevalence>,
        stats: Arc<Stats>,
    ) -> Self {
        Processor {
            ip_flows: IpFlowTable::with_capacity(config.flow_table_capacity),
            tcp_flows: TcpFlowTable::with_capacity(config.flow_table_capacity),
            reassembler: Reassembler::new(config.reassembly_capacity, config.reassembly_ttl_seconds),
            config,
            db,
            prevalence,
            stats,
        }
    }

    /// Run the full link -> network -> transport -> message pipeline on one
    /// captured frame. `None` covers every non-emitting outcome: unsupported
    /// link/network layer, unsupported transport protocol, a filtered-out
    /// protocol, a zero-byte payload, or a still-incomplete reassembly.
    pub fn process(&mut self, packet: &[u8], ts: Timestamp) -> Option<String> {
        for _ in self.reassembler.reap(ts.secs) {
            self.stats.bump(stats::REASSEMBLY_REAPS);
        }

        let frame = eth::parse(Datum::new(packet));
        if frame.payload.is_empty() {
            return None;
        }
        let ip_packet = match frame.ether_type {
            EtherType::Ipv4 => ip::parse_v4(frame.payload, self.config.gre_enabled),
            EtherType::Ipv6 => ip::parse_v6(frame.payload),
            EtherType::Other(_) => None,
        }?;

        let record = if ip::is_tcp(ip_packet.protocol) {
            let seg = tcp::parse(ip_packet.payload)?;
            self.process_tcp(ip_packet.addrs, seg, &ts)
        } else if ip::is_udp(ip_packet.protocol) {
            let dg = udp::parse(ip_packet.payload)?;
            self.process_udp(ip_packet.addrs, dg, &ts)
        } else {
            None
        };
        if record.is_some() {
            self.stats.bump(&stats::record_emitted("total"));
        }
        record
    }

    fn note_analysis(&self, result: &AnalysisResult) {
        match result.status {
            AnalysisStatus::Labeled => self.stats.bump(stats::CLASSIFIER_HIT),
            AnalysisStatus::Randomized => self.stats.bump(stats::CLASSIFIER_RANDOMIZED),
            AnalysisStatus::Unlabeled => self.stats.bump(stats::CLASSIFIER_MISS),
            AnalysisStatus::NoInfo => {}
        }
    }

    fn process_tcp(&mut self, addrs: IpAddrPair, seg: TcpSegment, ts: &Timestamp) -> Option<String> {
        let key = make_flow_key(addrs, seg.src_port, seg.dst_port, 6);

        if seg.is_syn() || seg.is_syn_ack() {
            self.tcp_flows.syn_packet(key, ts.secs, seg.seq);
            return self.maybe_emit_tcp_syn(&key, ts, seg.window, seg.flags);
        }

        let payload = seg.payload.as_slice();
        self.process_tcp_data(key, ts, seg.seq, payload)
    }

    fn maybe_emit_tcp_syn(&self, key: &FlowKey, ts: &Timestamp, window: u16, flags: u8) -> Option<String> {
        if !self.config.output_tcp_initial_data || !self.config.filter.allows(Protocol::Tcp) {
            return None;
        }
        let fp = format!("({window:04x})({flags:02x})");
        let mut obj = self.start_record(key, ts, "tcp");
        obj.key("fingerprints").open_object().key("tcp").str_value(&fp).close_object();
        if self.config.metadata_output {
            obj.key("tcp").open_object();
            obj.key("window");
            obj.u64_value(window as u64);
            obj.key("flags");
            obj.u64_value(flags as u64);
            obj.close_object();
        }
        obj.close_object();
        obj.finish()
    }

    /// Dispatch one TCP data segment: a fresh segment is probed and parsed
    /// directly; a segment belonging to an already-pending reassembly is
    /// never re-probed, only appended (spec.md section 4.4).
    fn process_tcp_data(&mut self, key: FlowKey, ts: &Timestamp, seq: u32, payload: &[u8]) -> Option<String> {
        if payload.is_empty() {
            return None;
        }

        if self.reassembler.is_pending(&key) {
            return match self.reassembler.check_packet(key, ts.secs, seq, payload) {
                Some(buf) => self.finish_tcp_reassembly(key, ts, &buf),
                None => None,
            };
        }

        // When this worker saw the flow's SYN, only the first data-bearing
        // segment is eligible for fingerprinting; a retransmission of that
        // same segment must not produce a second record (spec.md section
        // 3/4.3). Flows whose SYN was never observed (capture starting
        // mid-stream) have no basis to judge "first" from, so they fall
        // through unguarded.
        if self.tcp_flows.contains(&key) && !self.tcp_flows.is_first_data_packet(&key, ts.secs, seq) {
            return None;
        }

        let kind = probe::probe_tcp(payload);
        let msg = parse_tcp_handshake(kind, &mut Datum::new(payload))?;
        let needed = msg.additional_bytes_needed();
        if needed > 0 {
            // `needed` from the parser counts bytes still required *beyond*
            // what this segment already carries; the reassembler wants the
            // total buffered length at completion.
            self.reassembler.copy_packet(key, ts.secs, seq, payload, payload.len() + needed);
            return None;
        }
        if !msg.is_not_empty() {
            return None;
        }
        self.build_tcp_record(&key, ts, msg)
    }

    fn finish_tcp_reassembly(&mut self, key: FlowKey, ts: &Timestamp, buf: &[u8]) -> Option<String> {
        let kind = probe::probe_tcp(buf);
        let msg = parse_tcp_handshake(kind, &mut Datum::new(buf))?;
        if !msg.is_not_empty() {
            return None;
        }
        self.build_tcp_record(&key, ts, msg)
    }

    fn start_record(&self, key: &FlowKey, ts: &Timestamp, protocol_name: &str) -> JsonBuffer {
        let mut obj = JsonBuffer::with_capacity(self.config.json_capacity);
        obj.open_object();
        obj.key("src_ip");
        obj.str_value(&key.src_ip().to_string());
        obj.key("dst_ip");
        obj.str_value(&key.dst_ip().to_string());
        obj.key("protocol");
        obj.str_value(protocol_name);
        obj.key("src_port");
        obj.u64_value(key.src_port as u64);
        obj.key("dst_port");
        obj.u64_value(key.dst_port as u64);
        obj.key("event_start");
        obj.str_value(&format!("{}.{:06}", ts.secs, ts.micros));
        obj
    }

    fn build_tcp_record(&self, key: &FlowKey, ts: &Timestamp, msg: TcpHandshakeMessage) -> Option<String> {
        match msg {
            TcpHandshakeMessage::ClientHello(ch) => {
                if !self.config.filter.allows(Protocol::Tls) {
                    return None;
                }
                let fp = ch.fingerprint();
                let mut obj = self.start_record(key, ts, "tcp");
                obj.key("fingerprints").open_object().key("tls").str_value(&fp).close_object();
                if self.config.metadata_output {
                    obj.key("tls").open_object();
                    ch.write_json(&mut obj);
                    obj.close_object();
                }
                if self.config.do_analysis {
                    let result = analyze(
                        &self.db,
                        &self.prevalence,
                        &fp,
                        ch.server_name.as_deref().unwrap_or(""),
                        key.dst_ip(),
                        key.dst_port,
                    );
                    self.note_analysis(&result);
                    write_analysis(&mut obj, &result);
                }
                obj.close_object();
                obj.finish()
            }
            TcpHandshakeMessage::ServerHello(sh) => {
                if !self.config.filter.allows(Protocol::Tls) {
                    return None;
                }
                let fp = sh.fingerprint();
                let mut obj = self.start_record(key, ts, "tcp");
                obj.key("fingerprints").open_object().key("tls_server").str_value(&fp).close_object();
                if self.config.metadata_output {
                    obj.key("tls").open_object();
                    sh.write_json(&mut obj);
                    obj.close_object();
                }
                obj.close_object();
                obj.finish()
            }
            TcpHandshakeMessage::Certificate(cert) => {
                if !self.config.certs_json_output || !self.config.filter.allows(Protocol::Tls) {
                    return None;
                }
                let mut obj = self.start_record(key, ts, "tcp");
                obj.key("tls").open_object();
                obj.key("certificate_der");
                obj.str_value(&hex_encode(&cert.der));
                obj.close_object();
                obj.close_object();
                obj.finish()
            }
            TcpHandshakeMessage::HttpRequest(req) => {
                if !self.config.filter.allows(Protocol::Http) {
                    return None;
                }
                let fp = req.fingerprint();
                let mut obj = self.start_record(key, ts, "tcp");
                obj.key("fingerprints").open_object().key("http").str_value(&fp).close_object();
                if self.config.metadata_output {
                    obj.key("http").open_object();
                    req.write_json(&mut obj);
                    obj.close_object();
                }
                obj.close_object();
                obj.finish()
            }
            TcpHandshakeMessage::HttpResponse(resp) => {
                if !self.config.filter.allows(Protocol::Http) {
                    return None;
                }
                let fp = resp.fingerprint();
                let mut obj = self.start_record(key, ts, "tcp");
                obj.key("fingerprints").open_object().key("http_server").str_value(&fp).close_object();
                if self.config.metadata_output {
                    obj.key("http").open_object();
                    resp.write_json(&mut obj);
                    obj.close_object();
                }
                obj.close_object();
                obj.finish()
            }
            TcpHandshakeMessage::SshVersion(v) => {
                if !self.config.filter.allows(Protocol::Ssh) {
                    return None;
                }
                let fp = v.fingerprint();
                let mut obj = self.start_record(key, ts, "tcp");
                obj.key("fingerprints").open_object().key("ssh").str_value(&fp).close_object();
                if self.config.metadata_output {
                    obj.key("ssh").open_object();
                    v.write_json(&mut obj);
                    obj.close_object();
                }
                obj.close_object();
                obj.finish()
            }
            TcpHandshakeMessage::SshKex(k) => {
                if !self.config.filter.allows(Protocol::Ssh) {
                    return None;
                }
                let fp = k.fingerprint();
                let mut obj = self.start_record(key, ts, "tcp");
                obj.key("fingerprints").open_object().key("ssh_kex").str_value(&fp).close_object();
                if self.config.metadata_output {
                    obj.key("ssh").open_object();
                    k.write_json(&mut obj);
                    obj.close_object();
                }
                obj.close_object();
                obj.finish()
            }
        }
    }

    fn process_udp(&mut self, addrs: IpAddrPair, dg: UdpDatagram, ts: &Timestamp) -> Option<String> {
        let key = make_flow_key(addrs, dg.src_port, dg.dst_port, 17);
        let payload = dg.payload.as_slice();
        if payload.is_empty() {
            return None;
        }

        match probe::probe_udp(payload, dg.dst_port) {
            UdpMessageType::Quic => {
                if !self.config.filter.allows(Protocol::Quic) {
                    return None;
                }
                let ch = quic::parse_initial(&mut Datum::new(payload))?;
                if !ch.is_not_empty() {
                    return None;
                }
                let fp = ch.fingerprint();
                let mut obj = self.start_record(&key, ts, "udp");
                obj.key("fingerprints").open_object().key("quic").str_value(&fp).close_object();
                if self.config.metadata_output {
                    obj.key("quic").open_object();
                    ch.write_json(&mut obj);
                    obj.close_object();
                }
                if self.config.do_analysis {
                    let result = analyze(
                        &self.db,
                        &self.prevalence,
                        &fp,
                        ch.server_name.as_deref().unwrap_or(""),
                        key.dst_ip(),
                        key.dst_port,
                    );
                    self.note_analysis(&result);
                    write_analysis(&mut obj, &result);
                }
                obj.close_object();
                obj.finish()
            }
            UdpMessageType::Dns => {
                if !self.config.dns_json_output || !self.config.filter.allows(Protocol::Dns) {
                    return None;
                }
                let msg = dns::DnsMessage::parse(&mut Datum::new(payload));
                if !msg.is_not_empty() {
                    return None;
                }
                let mut obj = self.start_record(&key, ts, "udp");
                obj.key("dns").open_object();
                msg.write_json(&mut obj);
                obj.close_object();
                obj.close_object();
                obj.finish()
            }
            UdpMessageType::Dhcp => {
                if !self.config.filter.allows(Protocol::Dhcp) {
                    return None;
                }
                let msg = dhcp::DhcpMessage::parse(&mut Datum::new(payload));
                if !msg.is_not_empty() {
                    return None;
                }
                let fp = msg.fingerprint();
                let mut obj = self.start_record(&key, ts, "udp");
                obj.key("fingerprints").open_object().key("dhcp").str_value(&fp).close_object();
                if self.config.metadata_output {
                    obj.key("dhcp").open_object();
                    msg.write_json(&mut obj);
                    obj.close_object();
                }
                obj.close_object();
                obj.finish()
            }
            UdpMessageType::DtlsClientHello => {
                if !self.config.filter.allows(Protocol::Dtls) {
                    return None;
                }
                let ch = tls::ClientHello::parse(&mut Datum::new(payload), true);
                if !ch.is_not_empty() {
                    return None;
                }
                let fp = ch.fingerprint();
                let mut obj = self.start_record(&key, ts, "udp");
                obj.key("fingerprints").open_object().key("dtls").str_value(&fp).close_object();
                if self.config.metadata_output {
                    obj.key("tls").open_object();
                    ch.write_json(&mut obj);
                    obj.close_object();
                }
                obj.close_object();
                obj.finish()
            }
            UdpMessageType::DtlsServerHello => {
                if !self.config.filter.allows(Protocol::Dtls) {
                    return None;
                }
                let sh = tls::ServerHello::parse(&mut Datum::new(payload), true);
                if !sh.is_not_empty() {
                    return None;
                }
                let fp = sh.fingerprint();
                let mut obj = self.start_record(&key, ts, "udp");
                obj.key("fingerprints").open_object().key("dtls").str_value(&fp).close_object();
                if self.config.metadata_output {
                    obj.key("tls").open_object();
                    sh.write_json(&mut obj);
                    obj.close_object();
                }
                obj.close_object();
                obj.finish()
            }
            UdpMessageType::DtlsCertificate => {
                if !self.config.certs_json_output || !self.config.filter.allows(Protocol::Dtls) {
                    return None;
                }
                let cert = tls::Certificate::parse(&mut Datum::new(payload), true);
                if !cert.is_not_empty() {
                    return None;
                }
                let mut obj = self.start_record(&key, ts, "udp");
                obj.key("tls").open_object();
                obj.key("certificate_der");
                obj.str_value(&hex_encode(&cert.der));
                obj.close_object();
                obj.close_object();
                obj.finish()
            }
            UdpMessageType::Wireguard => {
                if !self.config.filter.allows(Protocol::Wireguard) || !self.config.metadata_output {
                    return None;
                }
                let msg = wireguard::WireguardMessage::parse(&mut Datum::new(payload))?;
                let mut obj = self.start_record(&key, ts, "udp");
                obj.key("wireguard").open_object();
                msg.write_json(&mut obj);
                obj.close_object();
                obj.close_object();
                obj.finish()
            }
            UdpMessageType::Vxlan => {
                tracing::debug!(dst_port = dg.dst_port, "vxlan traffic observed, decapsulation out of scope");
                None
            }
            UdpMessageType::Unknown => {
                if !self.config.output_udp_initial_data || !self.config.filter.allows(Protocol::Udp) {
                    return None;
                }
                if !self.ip_flows.flow_is_new(key, ts.secs) {
                    return None;
                }
                let mut obj = self.start_record(&key, ts, "udp");
                obj.key("udp").open_object();
                obj.key("payload");
                obj.str_value(&hex_encode(payload));
                obj.close_object();
                obj.close_object();
                obj.finish()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn tcp_frame(src_port: u16, dst_port: u16, seq: u32, flags: u8, payload: &[u8]) -> Vec<u8> {
        let mut tcp_bytes = Vec::new();
        tcp_bytes.extend_from_slice(&src_port.to_be_bytes());
        tcp_bytes.extend_from_slice(&dst_port.to_be_bytes());
        tcp_bytes.extend_from_slice(&seq.to_be_bytes());
        tcp_bytes.extend_from_slice(&0u32.to_be_bytes());
        let offset_flags = (5u16 << 12) | flags as u16;
        tcp_bytes.extend_from_slice(&offset_flags.to_be_bytes());
        tcp_bytes.extend_from_slice(&65535u16.to_be_bytes());
        tcp_bytes.extend_from_slice(&[0, 0]);
        tcp_bytes.extend_from_slice(&[0, 0]);
        tcp_bytes.extend_from_slice(payload);

        let mut ip_bytes = vec![0x45, 0x00];
        let total_len = (20 + tcp_bytes.len()) as u16;
        ip_bytes.extend_from_slice(&total_len.to_be_bytes());
        ip_bytes.extend_from_slice(&[0, 0, 0, 0]);
        ip_bytes.push(64);
        ip_bytes.push(6);
        ip_bytes.extend_from_slice(&[0, 0]);
        ip_bytes.extend_from_slice(&Ipv4Addr::new(10, 0, 0, 1).octets());
        ip_bytes.extend_from_slice(&Ipv4Addr::new(93, 184, 216, 34).octets());
        ip_bytes.extend_from_slice(&tcp_bytes);

        let mut eth_bytes = vec![0u8; 12];
        eth_bytes.extend_from_slice(&0x0800u16.to_be_bytes());
        eth_bytes.extend_from_slice(&ip_bytes);
        eth_bytes
    }

    fn udp_frame(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
        let mut udp_bytes = Vec::new();
        udp_bytes.extend_from_slice(&src_port.to_be_bytes());
        udp_bytes.extend_from_slice(&dst_port.to_be_bytes());
        udp_bytes.extend_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
        udp_bytes.extend_from_slice(&[0, 0]);
        udp_bytes.extend_from_slice(payload);

        let mut ip_bytes = vec![0x45, 0x00];
        let total_len = (20 + udp_bytes.len()) as u16;
        ip_bytes.extend_from_slice(&total_len.to_be_bytes());
        ip_bytes.extend_from_slice(&[0, 0, 0, 0]);
        ip_bytes.push(64);
        ip_bytes.push(17);
        ip_bytes.extend_from_slice(&[0, 0]);
        ip_bytes.extend_from_slice(&Ipv4Addr::new(10, 0, 0, 1).octets());
        ip_bytes.extend_from_slice(&Ipv4Addr::new(10, 0, 0, 2).octets());
        ip_bytes.extend_from_slice(&udp_bytes);

        let mut eth_bytes = vec![0u8; 12];
        eth_bytes.extend_from_slice(&0x0800u16.to_be_bytes());
        eth_bytes.extend_from_slice(&ip_bytes);
        eth_bytes
    }

    fn client_hello_record(cipher_suites: &[u16], sni: Option<&str>) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&0x0303u16.to_be_bytes());
        body.extend_from_slice(&[0u8; 32]);
        body.push(0);
        body.extend_from_slice(&((cipher_suites.len() * 2) as u16).to_be_bytes());
        for cs in cipher_suites {
            body.extend_from_slice(&cs.to_be_bytes());
        }
        body.push(1);
        body.push(0);

        let mut ext_bytes = Vec::new();
        if let Some(name) = sni {
            let mut entry = vec![0u8];
            entry.extend_from_slice(&(name.len() as u16).to_be_bytes());
            entry.extend_from_slice(name.as_bytes());
            let mut sni_ext = Vec::new();
            sni_ext.extend_from_slice(&(entry.len() as u16).to_be_bytes());
            sni_ext.extend_from_slice(&entry);
            ext_bytes.extend_from_slice(&0u16.to_be_bytes());
            ext_bytes.extend_from_slice(&(sni_ext.len() as u16).to_be_bytes());
            ext_bytes.extend_from_slice(&sni_ext);
        }
        // padding extension to push the record comfortably past a couple
        // hundred bytes, so the reassembly test has something to split.
        let padding = vec![0u8; 220];
        ext_bytes.extend_from_slice(&0x0015u16.to_be_bytes());
        ext_bytes.extend_from_slice(&(padding.len() as u16).to_be_bytes());
        ext_bytes.extend_from_slice(&padding);

        body.extend_from_slice(&(ext_bytes.len() as u16).to_be_bytes());
        body.extend_from_slice(&ext_bytes);

        let mut handshake = vec![0x01u8];
        handshake.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
        handshake.extend_from_slice(&body);

        let mut record = vec![0x16, 0x03, 0x01];
        record.extend_from_slice(&(handshake.len() as u16).to_be_bytes());
        record.extend_from_slice(&handshake);
        record
    }

    fn test_processor() -> Processor {
        Processor::new(ProcessorConfig::default(), Arc::new(FingerprintDb::new()), Arc::new(FingerprintPrevalence::new(100)), Arc::new(Stats::new(true, 1000)))
    }

    #[test]
    fn zero_byte_tcp_payload_produces_no_record() {
        let mut p = test_processor();
        let frame = tcp_frame(4000, 443, 1000, tcp::FLAG_ACK, &[]);
        assert_eq!(p.process(&frame, Timestamp { secs: 0, micros: 0 }), None);
    }

    #[test]
    fn single_packet_client_hello_produces_tls_fingerprint_and_analysis() {
        let mut db = FingerprintDb::new();
        let record = client_hello_record(&[0x1301, 0x1302], Some("example.com"));
        let fp = tls::ClientHello::parse(&mut Datum::new(&record), false).fingerprint();
        let line = format!(
            r#"{{"str_repr":"{fp}","total_count":10,"process_info":[{{"process":"curl","count":10}}]}}"#
        );
        db.process_line(&line, 0.0, 0.0, false, Arc::new(crate::asn::SubnetTable::new()));

        let mut p = Processor::new(ProcessorConfig::default(), Arc::new(db), Arc::new(FingerprintPrevalence::new(100)), Arc::new(Stats::new(true, 1000)));
        let frame = tcp_frame(4000, 443, 1000, tcp::FLAG_ACK | tcp::FLAG_PSH, &record);
        let out = p.process(&frame, Timestamp { secs: 1, micros: 0 }).expect("record emitted");
        assert!(out.contains(&format!("\"tls\":\"{fp}\"")));
        assert!(out.contains("\"process\":\"curl\""));
    }

    #[test]
    fn client_hello_split_across_two_segments_reassembles_into_one_record() {
        let mut p = test_processor();
        let record = client_hello_record(&[0x1301], Some("example.com"));
        let split_at = record.len() / 2;
        let (first, second) = record.split_at(split_at);

        let frame1 = tcp_frame(4000, 443, 1000, tcp::FLAG_ACK | tcp::FLAG_PSH, first);
        assert_eq!(p.process(&frame1, Timestamp { secs: 0, micros: 0 }), None);

        let seq2 = 1000u32.wrapping_add(first.len() as u32);
        let frame2 = tcp_frame(4000, 443, seq2, tcp::FLAG_ACK | tcp::FLAG_PSH, second);
        let out = p.process(&frame2, Timestamp { secs: 0, micros: 1 }).expect("reassembled record");
        assert!(out.contains("\"tls\":"));
    }

    #[test]
    fn retransmitted_first_data_segment_does_not_duplicate_the_record() {
        let mut p = test_processor();
        let syn_seq = 1000u32;
        let syn = tcp_frame(4000, 443, syn_seq, tcp::FLAG_SYN, &[]);
        assert_eq!(p.process(&syn, Timestamp { secs: 0, micros: 0 }), None);

        let record = client_hello_record(&[0x1301], Some("example.com"));
        let data_seq = syn_seq.wrapping_add(1);
        let frame = tcp_frame(4000, 443, data_seq, tcp::FLAG_ACK | tcp::FLAG_PSH, &record);

        let first = p.process(&frame, Timestamp { secs: 0, micros: 1 });
        assert!(first.is_some(), "first data segment must fingerprint");

        // Same segment arrives again (a TCP retransmission): must not emit
        // a second record for the same flow.
        let retransmit = p.process(&frame, Timestamp { secs: 0, micros: 2 });
        assert_eq!(retransmit, None);
    }

    #[test]
    fn tcp_syn_fingerprint_is_gated_by_output_tcp_initial_data() {
        let mut config = ProcessorConfig::default();
        config.output_tcp_initial_data = false;
        let mut p = Processor::new(config, Arc::new(FingerprintDb::new()), Arc::new(FingerprintPrevalence::new(100)), Arc::new(Stats::new(true, 1000)));
        let frame = tcp_frame(4000, 443, 1000, tcp::FLAG_SYN, &[]);
        assert_eq!(p.process(&frame, Timestamp { secs: 0, micros: 0 }), None);

        let mut config = ProcessorConfig::default();
        config.output_tcp_initial_data = true;
        let mut p = Processor::new(config, Arc::new(FingerprintDb::new()), Arc::new(FingerprintPrevalence::new(100)), Arc::new(Stats::new(true, 1000)));
        let out = p.process(&frame, Timestamp { secs: 0, micros: 0 }).expect("syn record emitted");
        assert!(out.contains("\"fingerprints\":{\"tcp\":"));
    }

    #[test]
    fn dhcp_discover_produces_fingerprint() {
        let mut p = test_processor();
        let mut payload = vec![1u8];
        payload.extend_from_slice(&[0u8; 1 + 1 + 1 + 4 + 2 + 2 + 4 + 4 + 4 + 4 + 16 + 64 + 128]);
        payload.extend_from_slice(&[0x63, 0x82, 0x53, 0x63]);
        payload.extend_from_slice(&[53, 1, 1]); // message type = DISCOVER
        payload.extend_from_slice(&[55, 3, 1, 3, 6]); // parameter request list
        payload.push(255);

        let frame = udp_frame(68, 67, &payload);
        let out = p.process(&frame, Timestamp { secs: 0, micros: 0 }).expect("dhcp record emitted");
        assert!(out.contains("\"dhcp\":"));
    }

    #[test]
    fn dns_query_is_suppressed_unless_dns_json_output_enabled() {
        let mut query = vec![0x12, 0x34, 0x01, 0x00];
        query.extend_from_slice(&1u16.to_be_bytes());
        query.extend_from_slice(&[0u8; 6]);
        query.push(7);
        query.extend_from_slice(b"example");
        query.push(3);
        query.extend_from_slice(b"com");
        query.push(0);
        query.extend_from_slice(&1u16.to_be_bytes());
        query.extend_from_slice(&1u16.to_be_bytes());

        let frame = udp_frame(5353, 53, &query);

        let mut p = test_processor();
        assert_eq!(p.process(&frame, Timestamp { secs: 0, micros: 0 }), None);

        let mut config = ProcessorConfig::default();
        config.dns_json_output = true;
        let mut p = Processor::new(config, Arc::new(FingerprintDb::new()), Arc::new(FingerprintPrevalence::new(100)), Arc::new(Stats::new(true, 1000)));
        let out = p.process(&frame, Timestamp { secs: 0, micros: 0 }).expect("dns record emitted");
        assert!(out.contains("\"dns\":"));
        assert!(!out.contains("\"fingerprints\""));
    }

    #[test]
    fn packet_filter_suppresses_disallowed_protocols() {
        let mut config = ProcessorConfig::default();
        config.filter = PacketFilter::parse("http").unwrap();
        let mut p = Processor::new(config, Arc::new(FingerprintDb::new()), Arc::new(FingerprintPrevalence::new(100)), Arc::new(Stats::new(true, 1000)));

        let record = client_hello_record(&[0x1301], None);
        let frame = tcp_frame(4000, 443, 1000, tcp::FLAG_ACK | tcp::FLAG_PSH, &record);
        assert_eq!(p.process(&frame, Timestamp { secs: 0, micros: 0 }), None);
    }

    #[test]
    fn vxlan_traffic_is_dropped_without_a_record() {
        let mut p = test_processor();
        let frame = udp_frame(53000, 4789, &[0x08, 0x00, 0x00, 0x00, 0, 0, 0, 1]);
        assert_eq!(p.process(&frame, Timestamp { secs: 0, micros: 0 }), None);
    }
}
