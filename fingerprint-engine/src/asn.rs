//! ASN / subnet longest-prefix-match table (spec.md section 4.5).
//!
//! Built once from `pyasn.db`-style text lines (`"ip\tprefix_len\tasn"`),
//! `process_final()` sorts for lookup, and the table is immutable
//! thereafter — read-only, lock-free lookups from every worker thread
//! (spec.md section 5).

use ipnet::Ipv4Net;
use std::net::Ipv4Addr;
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct SubnetEntry {
    prefix: u32,
    mask_len: u8,
    asn: u32,
}

/// An ordered, immutable longest-prefix-match table over IPv4 subnets.
pub struct SubnetTable {
    entries: Vec<SubnetEntry>,
    finalised: bool,
}

impl SubnetTable {
    pub fn new() -> Self {
        SubnetTable { entries: Vec::new(), finalised: false }
    }

    /// Build a finalised table from a `pyasn.db` buffer.
    pub fn load(bytes: &[u8]) -> Self {
        let mut table = SubnetTable::new();
        let text = String::from_utf8_lossy(bytes);
        for line in text.lines() {
            if !line.trim().is_empty() {
                table.add_line(line);
            }
        }
        table.process_final();
        table
    }

    /// Feed one `"ip\tprefix_len\tasn"` line. Malformed lines are skipped
    /// and logged, matching the "skip, don't crash" hot-path discipline
    /// used elsewhere in the engine.
    pub fn add_line(&mut self, line: &str) {
        let mut parts = line.trim().split('\t');
        let (Some(ip_str), Some(mask_str), Some(asn_str)) =
            (parts.next(), parts.next(), parts.next())
        else {
            debug!(line, "subnet table: malformed line, skipping");
            return;
        };

        let Ok(ip) = Ipv4Addr::from_str(ip_str) else {
            debug!(line, "subnet table: unparsable address, skipping");
            return;
        };
        let Ok(mask_len) = mask_str.parse::<u8>() else {
            debug!(line, "subnet table: unparsable mask length, skipping");
            return;
        };
        // Per spec.md design note (a): "unknown" ASN strings are skipped,
        // not coerced to 0 — 0 is reserved for "no match" on lookup.
        if asn_str.eq_ignore_ascii_case("unknown") {
            return;
        }
        let Ok(asn) = asn_str.parse::<u32>() else {
            debug!(line, "subnet table: unparsable asn, skipping");
            return;
        };
        if mask_len > 32 {
            debug!(line, "subnet table: mask length out of range, skipping");
            return;
        }

        let prefix = masked(u32::from(ip), mask_len);
        self.entries.push(SubnetEntry { prefix, mask_len, asn });
    }

    /// Sort by descending mask length, then ascending prefix, and freeze the
    /// table for lookups. Must be called once before `get_asn_info`.
    pub fn process_final(&mut self) {
        self.entries.sort_by(|a, b| b.mask_len.cmp(&a.mask_len).then(a.prefix.cmp(&b.prefix)));
        self.entries.dedup_by_key(|e| (e.mask_len, e.prefix));
        self.finalised = true;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Longest-prefix-match lookup of a dotted-decimal IPv4 address. Returns
    /// `0` on a miss ("unknown"), matching spec.md's "skip"/"0" convention.
    pub fn get_asn_info(&self, ip_str: &str) -> u32 {
        let Ok(ip) = Ipv4Addr::from_str(ip_str) else {
            return 0;
        };
        self.get_asn_info_addr(ip)
    }

    pub fn get_asn_info_addr(&self, ip: Ipv4Addr) -> u32 {
        let target = u32::from(ip);
        // Entries are sorted by descending mask length, so the most
        // specific (longest) match is always encountered first. Within
        // each distinct mask-length "class" the entries are sorted by
        // ascending prefix, which is what makes a binary search valid.
        let mut i = 0;
        while i < self.entries.len() {
            let mask_len = self.entries[i].mask_len;
            let class_end =
                self.entries[i..].iter().take_while(|e| e.mask_len == mask_len).count() + i;
            let class = &self.entries[i..class_end];
            let candidate = masked(target, mask_len);
            if let Ok(pos) = class.binary_search_by_key(&candidate, |e| e.prefix) {
                return class[pos].asn;
            }
            i = class_end;
        }
        0
    }
}

impl Default for SubnetTable {
    fn default() -> Self {
        Self::new()
    }
}

fn masked(addr: u32, mask_len: u8) -> u32 {
    if mask_len == 0 {
        0
    } else {
        addr & (u32::MAX << (32 - mask_len as u32))
    }
}

/// Parse a `prefix/len` CIDR string into the same canonical `(prefix, mask)`
/// shape used above; exposed for callers that already have `ipnet` values
/// (e.g. config-driven static overrides) rather than raw `pyasn.db` lines.
pub fn cidr_to_prefix(net: &Ipv4Net) -> (u32, u8) {
    (masked(u32::from(net.network()), net.prefix_len()), net.prefix_len())
}
