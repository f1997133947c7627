use crate::ports::outbound::{HttpResponse, PageClient, PageRequest, RawDownloader};
use crate::shared::error::FetchError;
use crate::shared::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Builds the shared reqwest client used by every upstream adapter
fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    let version = env!("CARGO_PKG_VERSION");
    let user_agent = format!("cvemate/{}", version);
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .build()?;
    Ok(client)
}

fn transport_error(url: String, err: reqwest::Error) -> FetchError {
    FetchError::Transport {
        url,
        timeout: err.is_timeout(),
        details: err.to_string(),
    }
}

/// ReqwestPageClient adapter for paginated JSON APIs
///
/// Sends the request parameters as an encoded query string and the headers
/// (e.g. the NVD `apiKey`) verbatim. Status codes are passed back untouched.
pub struct ReqwestPageClient {
    client: reqwest::Client,
}

impl ReqwestPageClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl PageClient for ReqwestPageClient {
    async fn get(&self, request: &PageRequest) -> std::result::Result<HttpResponse, FetchError> {
        let url = request.url_with_query();
        let mut builder = self.client.get(&url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(url.clone(), e))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(url, e))?;

        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

/// ReqwestDownloader adapter for single-file feeds
pub struct ReqwestDownloader {
    client: reqwest::Client,
}

impl ReqwestDownloader {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl RawDownloader for ReqwestDownloader {
    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(url.to_string(), e))?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            }
            .into());
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(url.to_string(), e))?;
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clients_build_with_timeout() {
        assert!(ReqwestPageClient::new(Duration::from_secs(120)).is_ok());
        assert!(ReqwestDownloader::new(Duration::from_secs(30)).is_ok());
    }
}
