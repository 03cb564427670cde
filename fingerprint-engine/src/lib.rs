#![forbid(unsafe_code)]

//! Passive network-traffic fingerprinting and analysis engine.
//!
//! Packets in, one JSON record (or none) out: [`processor::Processor`] is
//! the single entry point most callers need. Everything else in this crate
//! — protocol parsers, flow tables, the TCP reassembler, the classifier —
//! is the machinery `Processor` composes; see their module docs for the
//! per-component contracts (spec.md section 4).

pub mod archive;
pub mod asn;
pub mod classifier;
pub mod config;
pub mod datum;
pub mod error;
pub mod filter;
pub mod flow;
pub mod json;
pub mod lru;
pub mod output;
pub mod packet_source;
pub mod pipeline;
pub mod processor;
pub mod proto;
pub mod reassembly;
pub mod stats;
pub mod telemetry;

pub use config::{load_from_path, Config};
pub use error::{EngineError, Result};
pub use processor::{Processor, ProcessorConfig, Timestamp};
