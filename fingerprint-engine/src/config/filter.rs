//! Packet filter configuration string (spec.md section 6).

use crate::filter::PacketFilter;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct FilterConfig {
    /// Comma-separated protocol selector, e.g. `"tls,http,dns"`. Empty
    /// enables every protocol.
    #[serde(default)]
    pub packet_filter_cfg: String,
}

impl FilterConfig {
    pub fn compile(&self) -> Result<PacketFilter, String> {
        PacketFilter::parse(&self.packet_filter_cfg).map_err(|e| e.to_string())
    }
}
