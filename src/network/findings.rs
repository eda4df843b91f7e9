use std::collections::BTreeMap;
use std::fmt;
use serde::{Deserialize, Serialize};
use super::records::PacketRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Risk {
    Info,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Risk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Risk::Info => "INFO",
            Risk::Medium => "MEDIUM",
            Risk::High => "HIGH",
            Risk::Critical => "CRITICAL",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingKind {
    PortExposure,
    HttpTraffic,
    HttpsTraffic,
    CredentialLeak,
    NetworkActivity,
}

impl FindingKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FindingKind::PortExposure => "PORT_EXPOSURE",
            FindingKind::HttpTraffic => "HTTP_TRAFFIC",
            FindingKind::HttpsTraffic => "HTTPS_TRAFFIC",
            FindingKind::CredentialLeak => "CREDENTIAL_LEAK",
            FindingKind::NetworkActivity => "NETWORK_ACTIVITY",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub port: u16,
    pub risk: Risk,
    #[serde(rename = "type")]
    pub kind: FindingKind,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub action: String,
}

impl Finding {
    pub fn new(port: u16, risk: Risk, kind: FindingKind, summary: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            port,
            risk,
            kind,
            summary: summary.into(),
            detail: None,
            action: action.into(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Identity of a finding within one analysis: rule kind plus target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey(String);

impl DedupKey {
    pub fn new(kind: FindingKind, target: &str) -> Self {
        Self(format!("{}:{}", kind.as_str(), target))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    pub findings: Vec<Finding>,
    pub enriched_packets: Vec<PacketRecord>,
}

impl Report {
    pub fn highest_risk(&self) -> Option<Risk> {
        self.findings.iter().map(|f| f.risk).max()
    }

    pub fn count_by_risk(&self) -> BTreeMap<Risk, usize> {
        let mut counts = BTreeMap::new();
        for finding in &self.findings {
            *counts.entry(finding.risk).or_insert(0) += 1;
        }
        counts
    }

    pub fn findings_of(&self, kind: FindingKind) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.kind == kind)
    }
}
