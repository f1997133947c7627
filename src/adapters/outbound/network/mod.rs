//! Network adapters for upstream HTTP feeds

mod http_client;

pub use http_client::{ReqwestDownloader, ReqwestPageClient};
