use std::collections::HashSet;
use std::sync::LazyLock;
use regex::Regex;
use crate::config::{AnalysisConfig, HttpsReporting};
use crate::utils::sample_join;
use super::findings::{DedupKey, Finding, FindingKind, Risk};
use super::locality::{classify, Locality};
use super::records::{PacketRecord, PortRecord};

const HTTP_PORT: u16 = 80;
const HTTPS_PORT: u16 = 443;
const DNS_PORT: u16 = 53;

// key=value pairs whose key starts with a credential-ish word: pass=, password=, username=, ...
static CREDENTIAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:pass|user|login|token|auth)\w*=").unwrap()
});

pub fn has_credential_indicator(payload: &str) -> bool {
    CREDENTIAL_RE.is_match(payload)
}

/// Mutable state shared by the rules during a single analysis.
pub struct RuleState {
    seen: HashSet<DedupKey>,
    external: Vec<String>,
    external_seen: HashSet<String>,
    https_reporting: HttpsReporting,
    min_external: usize,
    sample_size: usize,
}

impl RuleState {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            seen: HashSet::new(),
            external: Vec::new(),
            external_seen: HashSet::new(),
            https_reporting: config.https_reporting,
            min_external: config.min_external_destinations.max(1),
            sample_size: config.external_sample_size,
        }
    }

    /// Claims `key`; false if an earlier finding already holds it.
    fn claim(&mut self, key: DedupKey) -> bool {
        self.seen.insert(key)
    }

    fn track_external(&mut self, address: &str) {
        if self.external_seen.insert(address.to_string()) {
            self.external.push(address.to_string());
        }
    }

    pub fn external_destinations(&self) -> &[String] {
        &self.external
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortRule {
    InsecureHttp,
    Dns,
}

impl PortRule {
    pub const DEFAULT_ORDER: [PortRule; 2] = [PortRule::InsecureHttp, PortRule::Dns];

    pub fn evaluate(&self, record: &PortRecord) -> Option<Finding> {
        match self {
            PortRule::InsecureHttp if record.port == HTTP_PORT => Some(Finding::new(
                HTTP_PORT,
                Risk::High,
                FindingKind::PortExposure,
                "Insecure HTTP on port 80 detected. Potential for data interception.",
                "Disable HTTP or force HTTPS redirection.",
            )),
            PortRule::Dns if record.port == DNS_PORT => Some(Finding::new(
                DNS_PORT,
                Risk::Info,
                FindingKind::PortExposure,
                "DNS service detected on port 53.",
                "Ensure DNSSEC is active.",
            )),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketRule {
    CleartextHttp,
    TlsSession,
    ExternalDestination,
    CredentialLeak,
}

impl PacketRule {
    pub const DEFAULT_ORDER: [PacketRule; 4] = [
        PacketRule::CleartextHttp,
        PacketRule::TlsSession,
        PacketRule::ExternalDestination,
        PacketRule::CredentialLeak,
    ];

    /// Runs the rule against an already enriched packet.
    pub fn evaluate(&self, packet: &PacketRecord, state: &mut RuleState) -> Option<Finding> {
        match self {
            PacketRule::CleartextHttp => cleartext_http(packet, state),
            PacketRule::TlsSession => tls_session(packet, state),
            PacketRule::ExternalDestination => {
                if !packet.dest.trim().is_empty() && classify(&packet.dest) == Locality::Public {
                    state.track_external(&packet.dest);
                }
                None
            }
            PacketRule::CredentialLeak => credential_leak(packet, state),
        }
    }
}

fn cleartext_http(packet: &PacketRecord, state: &mut RuleState) -> Option<Finding> {
    if !packet.is_tcp() || !packet.uses_port(HTTP_PORT) {
        return None;
    }
    if !state.claim(DedupKey::new(FindingKind::HttpTraffic, &packet.dest)) {
        return None;
    }

    Some(
        Finding::new(
            HTTP_PORT,
            Risk::High,
            FindingKind::HttpTraffic,
            format!("Unencrypted HTTP traffic detected to {}", packet.dest),
            "Use HTTPS (port 443) instead of HTTP (port 80).",
        )
        .with_detail("Port 80 traffic is NOT encrypted. Data can be intercepted."),
    )
}

fn tls_session(packet: &PacketRecord, state: &mut RuleState) -> Option<Finding> {
    if !packet.is_tcp() || !packet.uses_port(HTTPS_PORT) {
        return None;
    }

    let target = match state.https_reporting {
        HttpsReporting::PerDestination => packet.dest.as_str(),
        HttpsReporting::FirstOnly => "*",
    };
    if !state.claim(DedupKey::new(FindingKind::HttpsTraffic, target)) {
        return None;
    }

    let location = packet.location_tag();
    Some(
        Finding::new(
            HTTPS_PORT,
            Risk::Info,
            FindingKind::HttpsTraffic,
            format!("Encrypted HTTPS traffic to {} ({})", packet.dest, location),
            "No action needed if the destination is expected.",
        )
        .with_detail(format!("TLS on port 443 | Location: {}", location)),
    )
}

fn credential_leak(packet: &PacketRecord, state: &mut RuleState) -> Option<Finding> {
    if !has_credential_indicator(&packet.payload) {
        return None;
    }
    if !state.claim(DedupKey::new(FindingKind::CredentialLeak, &packet.dest)) {
        return None;
    }

    let location = packet.location_tag();
    Some(
        Finding::new(
            packet.dst_port,
            Risk::Critical,
            FindingKind::CredentialLeak,
            format!("Sensitive data leaked to {} ({})", packet.dest, location),
            "IMMEDIATE ACTION: Kill connection and reset passwords.",
        )
        .with_detail(format!(
            "Target: {} | Protocol: {} | Location: {}",
            packet.dest,
            packet.protocol.label(),
            location
        )),
    )
}

/// Summary over everything the packet rules saw; raised at most once.
pub fn external_activity(state: &mut RuleState) -> Option<Finding> {
    let count = state.external.len();
    if count < state.min_external {
        return None;
    }
    if !state.claim(DedupKey::new(FindingKind::NetworkActivity, "external_summary")) {
        return None;
    }

    Some(
        Finding::new(
            0,
            Risk::Medium,
            FindingKind::NetworkActivity,
            format!("High network activity: {} external connections detected", count),
            "Review if all connections are legitimate.",
        )
        .with_detail(format!("IPs: {}", sample_join(&state.external, state.sample_size))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::geo::Location;
    use crate::network::records::Protocol;

    fn state() -> RuleState {
        RuleState::new(&AnalysisConfig::default())
    }

    fn tcp(dest: &str, dst_port: u16, payload: &str) -> PacketRecord {
        let mut packet = PacketRecord::new("192.168.1.20", dest, Protocol::Tcp, 50000, dst_port, payload);
        packet.location = Some(Location::Country("US".to_string()));
        packet
    }

    #[test]
    fn test_credential_indicators() {
        assert!(has_credential_indicator("username=test&password=secret"));
        assert!(has_credential_indicator("PASS=hunter2"));
        assert!(has_credential_indicator("grant=x&Token=abc"));
        assert!(has_credential_indicator("auth=Basic"));
        assert!(!has_credential_indicator("GET /index.html HTTP/1.1"));
        assert!(!has_credential_indicator("password: secret"));
        assert!(!has_credential_indicator(""));
    }

    #[test]
    fn test_port_rules() {
        let http = PortRule::InsecureHttp.evaluate(&PortRecord::new(80)).unwrap();
        assert_eq!(http.risk, Risk::High);
        assert_eq!(http.kind, FindingKind::PortExposure);
        assert_eq!(http.port, 80);

        let dns = PortRule::Dns.evaluate(&PortRecord::new(53)).unwrap();
        assert_eq!(dns.risk, Risk::Info);
        assert!(dns.action.contains("DNSSEC"));

        assert!(PortRule::InsecureHttp.evaluate(&PortRecord::new(53)).is_none());
        assert!(PortRule::Dns.evaluate(&PortRecord::new(22)).is_none());
    }

    #[test]
    fn test_cleartext_http_dedups_per_destination() {
        let mut state = state();
        let rule = PacketRule::CleartextHttp;

        assert!(rule.evaluate(&tcp("8.8.8.8", 80, ""), &mut state).is_some());
        assert!(rule.evaluate(&tcp("8.8.8.8", 80, ""), &mut state).is_none());
        assert!(rule.evaluate(&tcp("1.1.1.1", 80, ""), &mut state).is_some());
    }

    #[test]
    fn test_cleartext_http_matches_source_port_and_requires_tcp() {
        let mut state = state();
        let mut reply = PacketRecord::new("93.184.216.34", "192.168.1.20", Protocol::Tcp, 80, 50000, "");
        reply.location = Some(Location::Local);
        assert!(PacketRule::CleartextHttp.evaluate(&reply, &mut state).is_some());

        let udp = PacketRecord::new("192.168.1.20", "8.8.4.4", Protocol::Udp, 50000, 80, "");
        assert!(PacketRule::CleartextHttp.evaluate(&udp, &mut state).is_none());
    }

    #[test]
    fn test_tls_session_reporting_modes() {
        let mut per_destination = state();
        assert!(PacketRule::TlsSession.evaluate(&tcp("8.8.8.8", 443, ""), &mut per_destination).is_some());
        assert!(PacketRule::TlsSession.evaluate(&tcp("8.8.8.8", 443, ""), &mut per_destination).is_none());
        let second = PacketRule::TlsSession.evaluate(&tcp("1.1.1.1", 443, ""), &mut per_destination).unwrap();
        assert!(second.summary.contains("(US)"));

        let mut first_only = RuleState::new(&AnalysisConfig {
            https_reporting: HttpsReporting::FirstOnly,
            ..AnalysisConfig::default()
        });
        assert!(PacketRule::TlsSession.evaluate(&tcp("8.8.8.8", 443, ""), &mut first_only).is_some());
        assert!(PacketRule::TlsSession.evaluate(&tcp("1.1.1.1", 443, ""), &mut first_only).is_none());
    }

    #[test]
    fn test_credential_leak_not_suppressed_by_http_rule() {
        let mut state = state();
        let packet = tcp("8.8.8.8", 80, "user=admin&pass=admin");

        let http = PacketRule::CleartextHttp.evaluate(&packet, &mut state);
        let leak = PacketRule::CredentialLeak.evaluate(&packet, &mut state).unwrap();

        assert!(http.is_some());
        assert_eq!(leak.risk, Risk::Critical);
        assert_eq!(leak.detail.as_deref(), Some("Target: 8.8.8.8 | Protocol: TCP | Location: US"));
        assert!(PacketRule::CredentialLeak.evaluate(&packet, &mut state).is_none());
    }

    #[test]
    fn test_external_tracking_skips_local_and_blank() {
        let mut state = state();
        for dest in ["8.8.8.8", "10.0.0.1", "", "224.0.0.251", "8.8.8.8", "172.200.1.1"] {
            PacketRule::ExternalDestination.evaluate(&tcp(dest, 53, ""), &mut state);
        }
        assert_eq!(state.external_destinations(), ["8.8.8.8", "172.200.1.1"]);
    }

    #[test]
    fn test_external_activity_threshold_and_sample() {
        let mut state = RuleState::new(&AnalysisConfig {
            min_external_destinations: 4,
            external_sample_size: 2,
            ..AnalysisConfig::default()
        });

        for dest in ["1.1.1.1", "8.8.8.8", "9.9.9.9"] {
            PacketRule::ExternalDestination.evaluate(&tcp(dest, 443, ""), &mut state);
        }
        assert!(external_activity(&mut state).is_none());

        PacketRule::ExternalDestination.evaluate(&tcp("4.4.4.4", 443, ""), &mut state);
        let finding = external_activity(&mut state).unwrap();
        assert_eq!(finding.risk, Risk::Medium);
        assert!(finding.summary.contains("4 external connections"));
        assert_eq!(finding.detail.as_deref(), Some("IPs: 1.1.1.1, 8.8.8.8, ..."));

        assert!(external_activity(&mut state).is_none());
    }
}
