//! IP geolocation enrichment
//!
//! Client IPs are resolved to a coarse `{city}, {region}` pair through an
//! HTTP lookup service. Results are kept in an in-process cache for the
//! lifetime of the process.

pub mod cache;
pub mod client;
pub mod resolver;

pub use cache::{GeoCache, GeoEntry};
pub use client::{GeoLookup, GeoResponse, IpInfoClient, LookupError};
pub use resolver::{GeoResolver, ResolveError};
