//! Best-effort IP geolocation via an externally configured HTTP endpoint.
//!
//! The lookup is fail-open: missing configuration, an empty IP, a timeout,
//! a non-200 response or malformed JSON all yield (None, None) and never
//! surface an error to the caller.

use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub struct GeoIpResolver {
    client: reqwest::Client,
    lookup_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeoIpResponse {
    country_name: Option<String>,
    country: Option<String>,
    city: Option<String>,
}

impl GeoIpResolver {
    /// Create a resolver. `lookup_url` is an endpoint template containing an
    /// `{ip}` placeholder; when None, every lookup returns absent data. The
    /// timeout bounds the latency added to the tracking request.
    pub fn new(lookup_url: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, lookup_url })
    }

    pub fn is_enabled(&self) -> bool {
        self.lookup_url.is_some()
    }

    /// Resolve an IP to (country, city). Never fails.
    pub async fn lookup(&self, ip: &str) -> (Option<String>, Option<String>) {
        let Some(template) = self.lookup_url.as_deref() else {
            return (None, None);
        };
        if ip.is_empty() {
            return (None, None);
        }

        let url = template.replace("{ip}", ip);
        match self.fetch(&url).await {
            Ok(resp) => {
                let country = resp
                    .country_name
                    .filter(|s| !s.is_empty())
                    .or(resp.country)
                    .filter(|s| !s.is_empty());
                let city = resp.city.filter(|s| !s.is_empty());
                (country, city)
            }
            Err(err) => {
                debug!(ip = %ip, error = %err, "geolocation lookup failed, recording scan without location");
                (None, None)
            }
        }
    }

    async fn fetch(&self, url: &str) -> Result<GeoIpResponse> {
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("geolocation endpoint returned {}", resp.status());
        }
        Ok(resp.json::<GeoIpResponse>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_resolver_returns_absent() {
        let resolver = GeoIpResolver::new(None, Duration::from_secs(1)).unwrap();
        assert!(!resolver.is_enabled());
        assert_eq!(resolver.lookup("8.8.8.8").await, (None, None));
    }

    #[tokio::test]
    async fn test_empty_ip_returns_absent() {
        let resolver = GeoIpResolver::new(
            Some("http://127.0.0.1:1/geo/{ip}".to_string()),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(resolver.lookup("").await, (None, None));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_fails_open() {
        // Port 1 should refuse the connection immediately.
        let resolver = GeoIpResolver::new(
            Some("http://127.0.0.1:1/geo/{ip}".to_string()),
            Duration::from_millis(500),
        )
        .unwrap();
        assert_eq!(resolver.lookup("8.8.8.8").await, (None, None));
    }
}
