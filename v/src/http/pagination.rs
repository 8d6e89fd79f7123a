use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 200;

/// 分页查询参数（page 从 1 开始） / Pagination query (1-based page)
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl PageQuery {
    /// 归一化后的 (page, page_size) / Normalised (page, page_size)
    pub fn normalized(&self) -> (u32, u32) {
        let page = self.page.filter(|p| *p > 0).unwrap_or(1);
        let size = self
            .page_size
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE);
        (page, size)
    }

    pub fn offset(&self) -> u64 {
        let (page, size) = self.normalized();
        (page as u64 - 1) * size as u64
    }

    pub fn limit(&self) -> u64 {
        self.normalized().1 as u64
    }
}

/// 分页结果 / Paged result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> Paged<T> {
    pub fn new(items: Vec<T>, total: u64, query: &PageQuery) -> Self {
        let (page, page_size) = query.normalized();
        Self {
            items,
            total,
            page,
            page_size,
        }
    }
}

pub fn build_link_header(base_url: &str, page: u32, per_page: u32, total: Option<u64>) -> String {
    let mut links: Vec<String> = Vec::new();
    let next = page.saturating_add(1);
    let prev = page.saturating_sub(1);
    let last = total.map(|t| {
        if per_page == 0 { 1 } else { ((t as f64) / (per_page as f64)).ceil().max(1.0) as u32 }
    });

    links.push(format!("<{}?page=1&page_size={}>; rel=\"first\"", base_url, per_page));
    if let Some(l) = last {
        links.push(format!("<{}?page={}&page_size={}>; rel=\"last\"", base_url, l, per_page));
        if page < l {
            links.push(format!("<{}?page={}&page_size={}>; rel=\"next\"", base_url, next, per_page));
        }
    } else {
        links.push(format!("<{}?page={}&page_size={}>; rel=\"next\"", base_url, next, per_page));
    }
    if page > 1 {
        links.push(format!("<{}?page={}&page_size={}>; rel=\"prev\"", base_url, prev, per_page));
    }
    links.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_query_defaults_and_caps() {
        let q = PageQuery::default();
        assert_eq!(q.normalized(), (1, DEFAULT_PAGE_SIZE));
        let q = PageQuery { page: Some(3), page_size: Some(1000) };
        assert_eq!(q.normalized(), (3, MAX_PAGE_SIZE));
        assert_eq!(q.offset(), 2 * MAX_PAGE_SIZE as u64);
    }

    #[test]
    fn test_link_header_build() {
        let h = build_link_header("/api/payable/list", 2, 30, Some(95));
        assert!(h.contains("rel=\"next\""));
        assert!(h.contains("rel=\"prev\""));
        assert!(h.contains("rel=\"last\""));
        assert!(h.contains("page=3"));
        assert!(h.contains("page=1"));
        let last_page = build_link_header("/api/payable/list", 4, 30, Some(95));
        assert!(!last_page.contains("rel=\"next\""));
    }
}
