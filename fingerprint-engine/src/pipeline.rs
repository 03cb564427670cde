//! Multi-threaded run loop (spec.md section 5): one [`Processor`] per worker
//! thread, each worker fed by a bounded channel and draining into its own
//! output channel; a single writer thread is the sole consumer of every
//! worker's output. Packets are sharded across workers by flow hash so that
//! all packets belonging to one flow land on the same worker and keep their
//! relative order.

use crate::classifier::{FingerprintDb, FingerprintPrevalence};
use crate::datum::Datum;
use crate::error::Result;
use crate::output::RecordWriter;
use crate::packet_source::PacketSource;
use crate::proto::eth::{self, EtherType};
use crate::proto::ip::{self, IpAddrPair};
use crate::stats::Stats;
use crate::{Processor, ProcessorConfig, Timestamp};
use ahash::RandomState;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::Arc;
use std::thread;

/// What a worker does when its output channel is full (spec.md section 7:
/// "output ring full either blocks or drops with a counter increment").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputPolicy {
    Block,
    Drop,
}

struct PacketJob {
    ts: Timestamp,
    bytes: Vec<u8>,
}

pub struct Pipeline {
    num_workers: usize,
    channel_capacity: usize,
    output_policy: OutputPolicy,
}

impl Pipeline {
    pub fn new(num_workers: usize, channel_capacity: usize, output_policy: OutputPolicy) -> Self {
        let num_workers = num_workers.max(1);
        Pipeline { num_workers, channel_capacity, output_policy }
    }

    /// Drains `source` to completion, dispatching packets to workers and
    /// writing every emitted record through `writer`. Returns once the
    /// source is exhausted and every worker has drained.
    pub fn run<W: RecordWriter + 'static>(
        &self,
        mut source: impl PacketSource,
        mut writer: W,
        processor_config: ProcessorConfig,
        db: Arc<FingerprintDb>,
        prevalence: Arc<FingerprintPrevalence>,
        stats: Arc<Stats>,
    ) -> Result<()> {
        let mut job_txs = Vec::with_capacity(self.num_workers);
        let mut record_rxs = Vec::with_capacity(self.num_workers);
        let mut handles = Vec::with_capacity(self.num_workers);

        for _ in 0..self.num_workers {
            let (job_tx, job_rx) = bounded::<PacketJob>(self.channel_capacity);
            let (record_tx, record_rx) = bounded::<String>(self.channel_capacity);
            job_txs.push(job_tx);
            record_rxs.push(record_rx);

            let config = processor_config.clone();
            let db = Arc::clone(&db);
            let prevalence = Arc::clone(&prevalence);
            let stats = Arc::clone(&stats);
            let policy = self.output_policy;
            handles.push(thread::spawn(move || {
                worker_loop(job_rx, record_tx, config, db, prevalence, stats, policy)
            }));
        }

        let writer_stats = Arc::clone(&stats);
        let writer_handle =
            thread::spawn(move || writer_loop(record_rxs, &mut writer, &writer_stats));

        let num_workers = self.num_workers as u64;
        loop {
            match source.next_packet()? {
                Some((ts, bytes)) => {
                    let shard = (flow_hash(&bytes) % num_workers) as usize;
                    if job_txs[shard].send(PacketJob { ts, bytes }).is_err() {
                        break;
                    }
                }
                None => break,
            }
        }

        drop(job_txs);
        for handle in handles {
            let _ = handle.join();
        }
        let _ = writer_handle.join();
        Ok(())
    }
}

fn worker_loop(
    job_rx: Receiver<PacketJob>,
    record_tx: Sender<String>,
    config: ProcessorConfig,
    db: Arc<FingerprintDb>,
    prevalence: Arc<FingerprintPrevalence>,
    stats: Arc<Stats>,
    policy: OutputPolicy,
) {
    let mut processor = Processor::new(config, db, prevalence, Arc::clone(&stats));
    for job in job_rx.iter() {
        if let Some(record) = processor.process(&job.bytes, job.ts) {
            match policy {
                OutputPolicy::Block => {
                    let _ = record_tx.send(record);
                }
                OutputPolicy::Drop => {
                    if record_tx.try_send(record).is_err() {
                        stats.bump(crate::stats::OUTPUT_DROPPED);
                    }
                }
            }
        }
    }
}

fn writer_loop(record_rxs: Vec<Receiver<String>>, writer: &mut impl RecordWriter, stats: &Stats) {
    let mut select = crossbeam_channel::Select::new();
    for rx in &record_rxs {
        select.recv(rx);
    }

    let mut live = record_rxs.len();
    while live > 0 {
        let op = select.select();
        let index = op.index();
        match op.recv(&record_rxs[index]) {
            Ok(record) => {
                if writer.write_record(&record).is_err() {
                    stats.bump(crate::stats::OUTPUT_WRITE_ERRORS);
                }
            }
            Err(_) => {
                select.remove(index);
                live -= 1;
            }
        }
    }
    let _ = writer.flush();
}

/// Hashes the flow identity (addresses, ports, protocol) when the packet
/// parses far enough to expose one, falling back to hashing the raw bytes
/// for anything that doesn't (unparseable packets have no flow to preserve
/// order for anyway).
fn flow_hash(packet: &[u8]) -> u64 {
    static HASHER_STATE: std::sync::OnceLock<RandomState> = std::sync::OnceLock::new();
    let mut hasher = HASHER_STATE.get_or_init(RandomState::new).build_hasher();
    let eth_frame = eth::parse(Datum::new(packet));
    if !matches!(eth_frame.ether_type, EtherType::Ipv4 | EtherType::Ipv6) {
        packet.hash(&mut hasher);
        return hasher.finish();
    }
    let ip_packet = match eth_frame.ether_type {
        EtherType::Ipv4 => ip::parse_v4(eth_frame.payload, true),
        EtherType::Ipv6 => ip::parse_v6(eth_frame.payload),
        EtherType::Other(_) => None,
    };
    match ip_packet {
        Some(pkt) => {
            hash_addrs(pkt.addrs, &mut hasher);
            pkt.protocol.hash(&mut hasher);
            // First 4 bytes of the transport header are the src/dst ports
            // for both TCP and UDP; fold them in so flows on the same host
            // pair still shard across workers.
            let ports = pkt.payload.as_slice();
            ports[..ports.len().min(4)].hash(&mut hasher);
            hasher.finish()
        }
        None => {
            packet.hash(&mut hasher);
            hasher.finish()
        }
    }
}

fn hash_addrs(addrs: IpAddrPair, hasher: &mut impl Hasher) {
    match addrs {
        IpAddrPair::V4 { src, dst } => {
            src.octets().hash(hasher);
            dst.octets().hash(hasher);
        }
        IpAddrPair::V6 { src, dst } => {
            src.octets().hash(hasher);
            dst.octets().hash(hasher);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_flow_always_hashes_to_the_same_shard() {
        let packet = vec![0u8; 64];
        assert_eq!(flow_hash(&packet), flow_hash(&packet));
    }
}
