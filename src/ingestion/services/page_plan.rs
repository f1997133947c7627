/// Page layout of a paginated listing, derived from its first page.
///
/// `total_results` is read once and never re-validated: when the upstream
/// count moves during a fetch the remaining pages can overlap or leave a gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagePlan {
    total_results: u64,
    page_size: u64,
}

impl PagePlan {
    /// Builds the plan from the first page.
    ///
    /// The server's reported page size wins over the requested one, unless it
    /// reports zero (empty listing) in which case the requested size is used.
    pub fn from_first_page(total_results: u64, server_page_size: u64, requested_page_size: u64) -> Self {
        let page_size = if server_page_size > 0 {
            server_page_size
        } else {
            requested_page_size.max(1)
        };
        Self {
            total_results,
            page_size,
        }
    }

    pub fn total_results(&self) -> u64 {
        self.total_results
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// `ceil(total_results / page_size)`, at least 1 (the first page always exists)
    pub fn page_count(&self) -> u64 {
        self.total_results.div_ceil(self.page_size).max(1)
    }

    /// Start indexes of every page after the first
    pub fn remaining_start_indexes(&self) -> Vec<u64> {
        (1..self.page_count()).map(|page| page * self.page_size).collect()
    }
}
