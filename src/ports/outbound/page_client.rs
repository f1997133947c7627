use crate::shared::error::FetchError;
use async_trait::async_trait;

/// A single GET against a paginated endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub url: String,
    pub params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl PageRequest {
    /// URL with the encoded query string appended.
    /// Header values (API keys) are never part of it, so it is safe to log.
    pub fn url_with_query(&self) -> String {
        if self.params.is_empty() {
            return self.url.clone();
        }
        let query: Vec<String> = self
            .params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect();
        format!("{}?{}", self.url, query.join("&"))
    }
}

/// Raw upstream response: status plus body bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// PageClient port for issuing page requests
///
/// Reports transport failures only; status codes are interpreted by the
/// paginated fetcher so retry policy stays in one place.
#[async_trait]
pub trait PageClient: Send + Sync {
    async fn get(&self, request: &PageRequest) -> Result<HttpResponse, FetchError>;
}
