use crate::ports::outbound::PageRequest;

/// Field names of an index-paginated JSON listing.
///
/// Defaults match the NVD CVE API 2.0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLayout {
    /// Query parameter carrying the index of the first record of a page
    pub start_index_param: String,
    /// Query parameter carrying the requested page size
    pub page_size_param: String,
    /// Response field holding the total record count
    pub total_field: String,
    /// Response field holding the page size the server actually used
    pub page_size_field: String,
    /// Response field holding the page's records
    pub records_field: String,
}

impl Default for PageLayout {
    fn default() -> Self {
        Self {
            start_index_param: "startIndex".to_string(),
            page_size_param: "resultsPerPage".to_string(),
            total_field: "totalResults".to_string(),
            page_size_field: "resultsPerPage".to_string(),
            records_field: "vulnerabilities".to_string(),
        }
    }
}

/// FetchRequest - Internal request DTO for a paginated fetch
///
/// `params` carry the caller's filters (e.g. an incremental time window);
/// paging parameters are added per page by the fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub page_size: u64,
    pub params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub layout: PageLayout,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, page_size: u64) -> Self {
        Self {
            url: url.into(),
            page_size,
            params: Vec::new(),
            headers: Vec::new(),
            layout: PageLayout::default(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Request for the page starting at `start_index`
    pub fn page(&self, start_index: u64) -> PageRequest {
        let mut params = self.params.clone();
        params.push((self.layout.start_index_param.clone(), start_index.to_string()));
        params.push((self.layout.page_size_param.clone(), self.page_size.to_string()));
        PageRequest {
            url: self.url.clone(),
            params,
            headers: self.headers.clone(),
        }
    }
}
