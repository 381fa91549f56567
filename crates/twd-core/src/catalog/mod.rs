//! Upstream board API: URL layout, JSON model and the fetch client.

mod client;
mod model;
mod urls;

pub use client::{CatalogClient, CurlCatalogClient};
pub use model::{parse_catalog, CatalogEntry, ChildRef, ThreadSnapshot};
pub use urls::{catalog_url, media_url, thread_url};
