//! Port-name and port-remapping tables used by the classifier
//! (spec.md section 4.6 "Port remapping").

/// Fixed dictionary mapping the service-name strings `fingerprint_db.json`
/// uses for its `portname_applications` keys to numeric ports.
pub fn port_name_to_number(name: &str) -> Option<u16> {
    Some(match name {
        "https" => 443,
        "database" => 448,
        "email" => 465,
        "nntp" => 563,
        "shell" => 614,
        "ldap" => 636,
        "ftp" => 989,
        "nas" => 991,
        "telnet" => 992,
        "irc" => 994,
        "alt-https" => 1443,
        "docker" => 2376,
        "tor" => 8001,
        _ => return None,
    })
}

/// Collapse an observed destination port onto the small canonical set the
/// classifier's update maps are keyed by. Unlisted ports map to `0`
/// ("no port signal").
pub fn remap_port(port: u16) -> u16 {
    match port {
        443 => 443,
        448 => 448,
        465 | 993 | 585 | 995 => 465,
        563 => 563,
        614 => 614,
        636 => 636,
        989 | 990 => 989,
        991 => 991,
        992 => 992,
        994 => 994,
        1443 | 8443 => 1443,
        2376 => 2376,
        8001 | 9000 | 9001 | 9002 | 9101 => 8001,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_collapse_onto_canonical_port() {
        assert_eq!(remap_port(993), 465);
        assert_eq!(remap_port(8443), 1443);
        assert_eq!(remap_port(9000), 8001);
        assert_eq!(remap_port(9001), 8001);
        assert_eq!(remap_port(9002), 8001);
        assert_eq!(remap_port(9101), 8001);
        assert_eq!(remap_port(585), 465);
        assert_eq!(remap_port(990), 989);
        assert_eq!(remap_port(995), 465);
    }

    #[test]
    fn unlisted_port_maps_to_zero() {
        assert_eq!(remap_port(12345), 0);
    }

    #[test]
    fn port_name_dictionary_matches_spec() {
        assert_eq!(port_name_to_number("https"), Some(443));
        assert_eq!(port_name_to_number("tor"), Some(8001));
        assert_eq!(port_name_to_number("made-up"), None);
    }
}
