pub mod locality;
pub mod geo;
pub mod records;
pub mod findings;
pub mod rules;
pub mod analysis;

pub use locality::{classify, Locality};
pub use geo::{GeoLookup, GeoResolver, IpApiLookup, Location};
pub use records::{PacketRecord, PortRecord, Protocol};
pub use findings::{Finding, FindingKind, Report, Risk};
pub use rules::{PacketRule, PortRule};
pub use analysis::Analyzer;
