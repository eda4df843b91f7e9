use std::fmt;
use std::net::Ipv6Addr;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Locality {
    Private,
    LinkLocal,
    Multicast,
    Public,
}

impl Locality {
    /// True for every address that should never leave the local network
    /// for a lookup.
    pub fn is_local(self) -> bool {
        !matches!(self, Locality::Public)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Locality::Private => "PRIVATE",
            Locality::LinkLocal => "LINK_LOCAL",
            Locality::Multicast => "MULTICAST",
            Locality::Public => "PUBLIC",
        }
    }
}

impl fmt::Display for Locality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies a textual address. Never fails; anything unrecognised is
/// `Public`.
pub fn classify(address: &str) -> Locality {
    let address = address.trim();

    if address.contains(':') {
        return address
            .parse::<Ipv6Addr>()
            .map(classify_v6)
            .unwrap_or(Locality::Public);
    }

    let mut octets = address.split('.');
    let first = octets.next().and_then(parse_octet);
    let second = octets.next().and_then(parse_octet);

    if matches!(first, Some(octet) if octet >= 224) {
        return Locality::Multicast;
    }

    if address.starts_with("169.254.") {
        return Locality::LinkLocal;
    }

    if is_private_v4(address, first, second) {
        return Locality::Private;
    }

    Locality::Public
}

fn parse_octet(part: &str) -> Option<u32> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

fn is_private_v4(address: &str, first: Option<u32>, second: Option<u32>) -> bool {
    if address.starts_with("192.168.") || address.starts_with("10.") || address.starts_with("127.") {
        return true;
    }

    // 172.16.0.0/12, compared numerically so 172.2.x and 172.200.x stay public
    address.starts_with("172.")
        && first == Some(172)
        && matches!(second, Some(16..=31))
        && address.split('.').nth(2).is_some()
}

fn classify_v6(ip: Ipv6Addr) -> Locality {
    let head = ip.segments()[0];

    if ip.is_multicast() {
        Locality::Multicast
    } else if head & 0xffc0 == 0xfe80 {
        Locality::LinkLocal
    } else if ip.is_loopback() || head & 0xfe00 == 0xfc00 {
        Locality::Private
    } else {
        Locality::Public
    }
}
