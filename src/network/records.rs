use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use crate::utils::FieldReader;
use super::geo::Location;

/// A service observed listening on the scanned host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct PortRecord {
    pub port: u16,
}

impl PortRecord {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    /// Decodes one record, returning the names of fields that had to be
    /// replaced by defaults.
    pub fn from_value(value: Value) -> (Self, Vec<&'static str>) {
        let mut reader = FieldReader::new(value);
        let port = reader.port("port");
        let (_, invalid) = reader.finish();
        (Self { port }, invalid)
    }
}

impl From<Value> for PortRecord {
    fn from(value: Value) -> Self {
        Self::from_value(value).0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
    /// Any other transport; keeps the label the capture layer used.
    Other(String),
}

impl Protocol {
    pub fn from_label(label: &str) -> Self {
        let label = label.trim();
        if label.eq_ignore_ascii_case("tcp") {
            Protocol::Tcp
        } else if label.eq_ignore_ascii_case("udp") {
            Protocol::Udp
        } else {
            Protocol::Other(label.to_string())
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Other(label) if !label.is_empty() => label,
            Protocol::Other(_) => "OTHER",
        }
    }
}

impl Default for Protocol {
    fn default() -> Self {
        Protocol::Other(String::new())
    }
}

impl Serialize for Protocol {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// One captured packet as handed over by the capture layer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct PacketRecord {
    pub source: String,
    pub dest: String,
    pub protocol: Protocol,
    pub src_port: u16,
    pub dst_port: u16,
    pub payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    /// Fields this engine does not interpret (timestamp, length, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PacketRecord {
    pub fn new(source: &str, dest: &str, protocol: Protocol, src_port: u16, dst_port: u16, payload: &str) -> Self {
        Self {
            source: source.to_string(),
            dest: dest.to_string(),
            protocol,
            src_port,
            dst_port,
            payload: payload.to_string(),
            location: None,
            extra: Map::new(),
        }
    }

    pub fn from_value(value: Value) -> (Self, Vec<&'static str>) {
        let mut reader = FieldReader::new(value);

        let source = reader.string("source");
        let dest = reader.string("dest");
        let protocol = Protocol::from_label(&reader.string("protocol"));
        let src_port = reader.port("src_port");
        let dst_port = reader.port("dst_port");
        let payload = reader.string("payload");
        // recomputed on every analysis
        reader.discard("location");

        let (extra, invalid) = reader.finish();
        let record = Self {
            source,
            dest,
            protocol,
            src_port,
            dst_port,
            payload,
            location: None,
            extra,
        };
        (record, invalid)
    }

    pub fn is_tcp(&self) -> bool {
        self.protocol == Protocol::Tcp
    }

    pub fn uses_port(&self, port: u16) -> bool {
        self.src_port == port || self.dst_port == port
    }

    pub fn location_tag(&self) -> &str {
        self.location.as_ref().map(Location::as_str).unwrap_or("??")
    }
}

impl From<Value> for PacketRecord {
    fn from(value: Value) -> Self {
        Self::from_value(value).0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_packet_from_sniffer_shape() {
        let raw = json!({
            "timestamp": "12:00:01.123",
            "source": "192.168.1.10",
            "dest": "93.184.216.34",
            "protocol": "tcp",
            "length": 74,
            "info": "192.168.1.10 -> 93.184.216.34",
            "payload": "GET / HTTP/1.1",
            "dst_port": 80,
            "location": ""
        });

        let (packet, invalid) = PacketRecord::from_value(raw);
        assert!(invalid.is_empty());
        assert_eq!(packet.protocol, Protocol::Tcp);
        assert_eq!(packet.dst_port, 80);
        assert_eq!(packet.src_port, 0);
        assert!(packet.location.is_none());
        assert_eq!(packet.extra.get("length"), Some(&json!(74)));
        assert!(!packet.extra.contains_key("location"));
    }

    #[test]
    fn test_packet_serializes_with_extras_and_location() {
        let (mut packet, _) = PacketRecord::from_value(json!({
            "source": "10.0.0.2",
            "dest": "10.0.0.3",
            "protocol": "ICMP",
            "timestamp": "09:15:00.000"
        }));
        packet.location = Some(Location::Local);

        let out = serde_json::to_value(&packet).unwrap();
        assert_eq!(out["protocol"], "ICMP");
        assert_eq!(out["location"], "LOCAL");
        assert_eq!(out["timestamp"], "09:15:00.000");
        assert_eq!(out["src_port"], 0);
        assert_eq!(out["payload"], "");
    }

    #[test]
    fn test_missing_protocol_serializes_as_other() {
        let packet: PacketRecord = serde_json::from_value(json!({"dest": "8.8.8.8"})).unwrap();
        assert_eq!(packet.protocol, Protocol::default());
        assert_eq!(serde_json::to_value(&packet).unwrap()["protocol"], "OTHER");
    }

    #[test]
    fn test_bad_fields_are_defaulted() {
        let (packet, invalid) = PacketRecord::from_value(json!({
            "dest": ["not", "a", "string"],
            "dst_port": "eighty",
            "payload": "user=admin"
        }));

        assert_eq!(packet.dest, "");
        assert_eq!(packet.dst_port, 0);
        assert_eq!(packet.payload, "user=admin");
        assert_eq!(invalid, vec!["dest", "dst_port"]);
    }

    #[test]
    fn test_port_records_are_lenient() {
        let ports: Vec<PortRecord> =
            serde_json::from_str(r#"[{"port": 80, "status": "Open", "service": "HTTP"}, {"port": "53"}, {}, 7]"#).unwrap();

        assert_eq!(ports, vec![PortRecord::new(80), PortRecord::new(53), PortRecord::new(0), PortRecord::new(0)]);
    }

    #[test]
    fn test_uses_port_checks_both_directions() {
        let packet = PacketRecord::new("8.8.8.8", "192.168.1.4", Protocol::Tcp, 443, 51000, "");
        assert!(packet.uses_port(443));
        assert!(!packet.uses_port(80));
        assert_eq!(packet.location_tag(), "??");
    }
}
