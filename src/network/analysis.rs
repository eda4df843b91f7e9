use std::sync::Arc;
use std::time::Duration;
use serde_json::Value;
use crate::config::{AnalysisConfig, Config};
use crate::{Result, SentryError};
use super::findings::Report;
use super::geo::{GeoLookup, GeoResolver, IpApiLookup, Location};
use super::records::{PacketRecord, PortRecord};
use super::rules::{external_activity, PacketRule, PortRule, RuleState};

/// Turns port and packet records into an ordered, deduplicated report.
pub struct Analyzer<L> {
    resolver: Arc<GeoResolver<L>>,
    config: AnalysisConfig,
    port_rules: Vec<PortRule>,
    packet_rules: Vec<PacketRule>,
}

impl Analyzer<IpApiLookup> {
    /// Builds the production analyzer; geolocation goes over HTTP unless
    /// disabled in `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let resolver = if config.geo.enabled {
            GeoResolver::new(IpApiLookup::new(&config.geo)?, Duration::from_millis(config.geo.timeout_ms))
                .with_concurrency(config.geo.concurrent_lookups)
        } else {
            GeoResolver::disabled()
        };

        Ok(Self::new(resolver, config.analysis.clone()))
    }
}

impl<L: GeoLookup> Analyzer<L> {
    pub fn new(resolver: GeoResolver<L>, config: AnalysisConfig) -> Self {
        Self {
            resolver: Arc::new(resolver),
            config,
            port_rules: PortRule::DEFAULT_ORDER.to_vec(),
            packet_rules: PacketRule::DEFAULT_ORDER.to_vec(),
        }
    }

    pub fn with_packet_rules(mut self, rules: Vec<PacketRule>) -> Self {
        self.packet_rules = rules;
        self
    }

    pub fn with_port_rules(mut self, rules: Vec<PortRule>) -> Self {
        self.port_rules = rules;
        self
    }

    /// Parses the two JSON blobs and analyzes them. Only fails when a blob
    /// is not a JSON array; individual bad records are defaulted.
    pub async fn analyze_json(&self, ports_json: &str, packets_json: &str) -> Result<Report> {
        let ports: Vec<PortRecord> = parse_array(ports_json, "ports")?
            .into_iter()
            .enumerate()
            .map(|(index, value)| {
                let (record, invalid) = PortRecord::from_value(value);
                if !invalid.is_empty() {
                    log::warn!("Port record {} had unusable fields {:?}, using defaults", index, invalid);
                }
                record
            })
            .collect();

        let packets: Vec<PacketRecord> = parse_array(packets_json, "packets")?
            .into_iter()
            .enumerate()
            .map(|(index, value)| {
                let (record, invalid) = PacketRecord::from_value(value);
                if !invalid.is_empty() {
                    log::warn!("Packet record {} had unusable fields {:?}, using defaults", index, invalid);
                }
                record
            })
            .collect();

        Ok(self.analyze(ports, packets).await)
    }

    pub async fn analyze(&self, ports: Vec<PortRecord>, mut packets: Vec<PacketRecord>) -> Report {
        let mut findings = Vec::new();
        let mut state = RuleState::new(&self.config);

        for record in &ports {
            findings.extend(self.port_rules.iter().filter_map(|rule| rule.evaluate(record)));
        }

        let locations = self
            .resolver
            .resolve_all(packets.iter().map(|p| p.dest.as_str()))
            .await;

        for packet in packets.iter_mut() {
            let location = locations.get(packet.dest.as_str()).cloned().unwrap_or(Location::Unknown);
            packet.location = Some(location);

            for rule in &self.packet_rules {
                if let Some(finding) = rule.evaluate(packet, &mut state) {
                    log::debug!("{:?} raised {} finding for {}", rule, finding.risk, packet.dest);
                    findings.push(finding);
                }
            }
        }

        findings.extend(external_activity(&mut state));

        let report = Report {
            findings,
            enriched_packets: packets,
        };
        log::info!(
            "Analyzed {} ports and {} packets: {} findings, highest risk {}",
            ports.len(),
            report.enriched_packets.len(),
            report.findings.len(),
            report.highest_risk().map(|r| r.to_string()).unwrap_or_else(|| "none".to_string())
        );
        report
    }
}

fn parse_array(json: &str, what: &str) -> Result<Vec<Value>> {
    match serde_json::from_str::<Value>(json)? {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        other => Err(SentryError::InvalidInput(format!(
            "{} must be a JSON array, got {}",
            what,
            json_type(&other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
