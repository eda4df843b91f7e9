use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use serde::{Deserialize, Serialize, Serializer};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use crate::config::GeoConfig;
use crate::utils::expand_endpoint;
use crate::{Result, SentryError};
use super::locality::{classify, Locality};

/// Resolved location of a destination address. Always renders to a
/// non-empty tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    Country(String),
    Local,
    Link,
    Multicast,
    Unknown,
}

impl Location {
    pub fn as_str(&self) -> &str {
        match self {
            Location::Country(code) => code,
            Location::Local => "LOCAL",
            Location::Link => "LINK",
            Location::Multicast => "MCAST",
            Location::Unknown => "??",
        }
    }

    fn for_locality(locality: Locality) -> Option<Self> {
        match locality {
            Locality::Private => Some(Location::Local),
            Locality::LinkLocal => Some(Location::Link),
            Locality::Multicast => Some(Location::Multicast),
            Locality::Public => None,
        }
    }

    fn from_code(code: Option<String>) -> Self {
        match code {
            Some(code) if !code.trim().is_empty() => Location::Country(code.trim().to_string()),
            _ => Location::Unknown,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Location {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Source of country codes for public addresses.
pub trait GeoLookup: Send + Sync + 'static {
    /// Returns the country code for `address`, `None` when the provider
    /// has no answer.
    fn country_code(&self, address: &str) -> impl Future<Output = Result<Option<String>>> + Send;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpApiResponse {
    status: Option<String>,
    message: Option<String>,
    country_code: Option<String>,
}

/// ip-api.com style JSON lookup.
pub struct IpApiLookup {
    client: reqwest::Client,
    endpoint: String,
}

impl IpApiLookup {
    pub fn new(config: &GeoConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

impl GeoLookup for IpApiLookup {
    async fn country_code(&self, address: &str) -> Result<Option<String>> {
        let url = expand_endpoint(&self.endpoint, address);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let body: IpApiResponse = response.json().await?;

        if body.status.as_deref() == Some("fail") {
            return Err(SentryError::InvalidInput(format!(
                "lookup rejected for {}: {}",
                address,
                body.message.unwrap_or_default()
            )));
        }

        Ok(body.country_code)
    }
}

pub struct GeoResolver<L> {
    lookup: Option<L>,
    timeout: Duration,
    concurrency: usize,
}

impl<L: GeoLookup> GeoResolver<L> {
    pub fn new(lookup: L, timeout: Duration) -> Self {
        Self {
            lookup: Some(lookup),
            timeout,
            concurrency: 8,
        }
    }

    /// A resolver that never leaves the host: public addresses resolve
    /// to `??`.
    pub fn disabled() -> Self {
        Self {
            lookup: None,
            timeout: Duration::ZERO,
            concurrency: 1,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub async fn resolve(&self, address: &str) -> Location {
        match Location::for_locality(classify(address)) {
            Some(location) => location,
            None => self.lookup_public(address.trim()).await,
        }
    }

    async fn lookup_public(&self, address: &str) -> Location {
        let Some(lookup) = &self.lookup else {
            return Location::Unknown;
        };

        if address.parse::<IpAddr>().is_err() {
            log::debug!("Skipping geolocation for unparseable address {:?}", address);
            return Location::Unknown;
        }

        match tokio::time::timeout(self.timeout, lookup.country_code(address)).await {
            Ok(Ok(code)) => Location::from_code(code),
            Ok(Err(e)) => {
                log::debug!("Geolocation lookup for {} failed: {}", address, e);
                Location::Unknown
            }
            Err(_) => {
                let e = SentryError::Timeout(format!(
                    "geolocation for {} exceeded {:?}",
                    address, self.timeout
                ));
                log::debug!("{}", e);
                Location::Unknown
            }
        }
    }

    /// Resolves every distinct address once. Local addresses are answered
    /// inline; public ones run concurrently, at most `concurrency` at a time.
    pub async fn resolve_all<I, S>(self: &Arc<Self>, addresses: I) -> HashMap<String, Location>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut resolved = HashMap::new();
        let mut tasks = JoinSet::new();
        let permits = Arc::new(Semaphore::new(self.concurrency));

        for address in addresses {
            let address = address.as_ref();
            if resolved.contains_key(address) {
                continue;
            }

            if let Some(location) = Location::for_locality(classify(address)) {
                resolved.insert(address.to_string(), location);
                continue;
            }

            // placeholder until the task reports back; also dedups pending lookups
            resolved.insert(address.to_string(), Location::Unknown);

            let resolver = Arc::clone(self);
            let permits = Arc::clone(&permits);
            let address = address.to_string();
            tasks.spawn(async move {
                let location = match permits.acquire_owned().await {
                    Ok(_permit) => resolver.resolve(&address).await,
                    Err(_) => Location::Unknown,
                };
                (address, location)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((address, location)) => {
                    resolved.insert(address, location);
                }
                Err(e) => log::warn!("Geolocation task failed: {}", e),
            }
        }

        resolved
    }
}
