//! Scan enrichment and analytics aggregation.
//!
//! Enrichment (user-agent classification, IP geolocation) is best-effort:
//! failures degrade to absent data and never fail the tracking request.

pub mod aggregator;
pub mod geoip;
pub mod ip_extractor;
pub mod ua;

pub use aggregator::{AnalyticsAggregator, AnalyticsSummary};
pub use geoip::GeoIpResolver;
pub use ip_extractor::extract_client_ip;
pub use ua::{classify_user_agent, DeviceType, UaInfo};
