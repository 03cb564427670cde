#![forbid(unsafe_code)]

use clap::Parser;
use fingerprint_engine::archive::{PlainDirArchive, ResourceArchive};
use fingerprint_engine::asn::SubnetTable;
use fingerprint_engine::classifier::{FingerprintDb, FingerprintPrevalence};
use fingerprint_engine::output::LineWriter;
use fingerprint_engine::packet_source::FramedStdinSource;
use fingerprint_engine::pipeline::{OutputPolicy, Pipeline};
use fingerprint_engine::stats::Stats;
use fingerprint_engine::{load_from_path, EngineError, ProcessorConfig, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Passive network-traffic fingerprinting engine")]
struct Cli {
    /// Path to configuration TOML file
    #[arg(short, long, value_name = "FILE", default_value = "fingerprint.toml")]
    config: PathBuf,

    /// Number of worker threads, each running its own flow tables and reassembler
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Bounded channel capacity per worker, both inbound packets and outbound records
    #[arg(long, default_value_t = 4096)]
    channel_capacity: usize,

    /// What a worker does when its output channel is full
    #[arg(long, value_enum, default_value_t = OutputPolicyArg::Block)]
    output_policy: OutputPolicyArg,

    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum OutputPolicyArg {
    Block,
    Drop,
}

impl From<OutputPolicyArg> for OutputPolicy {
    fn from(value: OutputPolicyArg) -> Self {
        match value {
            OutputPolicyArg::Block => OutputPolicy::Block,
            OutputPolicyArg::Drop => OutputPolicy::Drop,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = fingerprint_engine::telemetry::init_tracing(&cli.log_level, false) {
        eprintln!("failed to initialise logging: {err}");
        std::process::exit(1);
    }

    if let Err(err) = run(cli) {
        error!(%err, "fingerprint-cli exited with error");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let cfg = load_from_path(&cli.config)?;
    info!(resources = %cfg.resources.resources, "configuration loaded");

    let key = cfg.resources.decoded_key().map_err(EngineError::Config)?;
    let archive = PlainDirArchive::new(cfg.resources.resources.clone(), key, cfg.resources.key_type);
    let entries = archive.entries()?;

    let mut fingerprint_db_bytes = None;
    let mut prevalence_bytes = None;
    let mut pyasn_bytes = None;
    for entry in entries {
        match entry.name {
            "fingerprint_db.json" => fingerprint_db_bytes = Some(entry.bytes),
            "fp_prevalence_tls.txt" => prevalence_bytes = Some(entry.bytes),
            "pyasn.db" => pyasn_bytes = Some(entry.bytes),
            _ => {}
        }
    }

    let subnets = Arc::new(pyasn_bytes.map(|b| SubnetTable::load(&b)).unwrap_or_else(SubnetTable::new));

    let db = Arc::new(fingerprint_db_bytes.map_or_else(FingerprintDb::new, |bytes| {
        FingerprintDb::load_ndjson(
            &bytes,
            cfg.thresholds.fp_proc_threshold,
            cfg.thresholds.proc_dst_threshold,
            cfg.output.report_os,
            Arc::clone(&subnets),
        )
    }));

    let prevalence = Arc::new(
        prevalence_bytes
            .map(|bytes| FingerprintPrevalence::load_known(&bytes, 100_000))
            .unwrap_or_default(),
    );

    let stats = Arc::new(Stats::new(cfg.output.do_stats, cfg.output.max_stats_entries));
    let processor_config = ProcessorConfig::from_config(&cfg).map_err(EngineError::Config)?;

    info!(
        fingerprints = db.len(),
        known_prevalent = prevalence.known_len(),
        subnets = subnets.len(),
        "resources loaded"
    );

    let pipeline = Pipeline::new(cli.workers, cli.channel_capacity, cli.output_policy.into());
    let source = FramedStdinSource::new(std::io::stdin().lock());
    let writer = LineWriter::new(std::io::stdout().lock());

    pipeline.run(source, writer, processor_config, db, prevalence, Arc::clone(&stats))?;

    if cfg.output.do_stats {
        for (key, value) in stats.snapshot() {
            info!(counter = %key, value, "stats");
        }
    }
    Ok(())
}
