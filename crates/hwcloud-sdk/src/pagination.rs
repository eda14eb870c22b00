//! List pagination

use crate::client::{RequestOpts, ServiceClient};
use crate::error::{Result, SdkError};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

const DEFAULT_MAX_PAGES: usize = 1000;

/// How a list endpoint hands out its pages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageStrategy {
    /// The endpoint returns everything in one response
    Single,
    /// `offset`/`limit` query parameters; a short page is the last one
    Offset { limit: u32, start: u32 },
    /// `marker`/`limit` query parameters. The next marker is read from the
    /// dotted `next_marker_path`, or taken from the last item's `id` when no
    /// path is set.
    Marker {
        limit: u32,
        next_marker_path: Option<String>,
    },
    /// Absolute URL of the next page at the dotted `next_path`
    Link { next_path: String },
}

/// Walks every page of a list endpoint
#[derive(Debug, Clone)]
pub struct Pager<'a> {
    client: &'a ServiceClient,
    url: String,
    items_key: String,
    strategy: PageStrategy,
    query: Vec<(String, String)>,
    max_pages: usize,
}

impl<'a> Pager<'a> {
    pub fn new(
        client: &'a ServiceClient,
        url: impl Into<String>,
        items_key: impl Into<String>,
        strategy: PageStrategy,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            items_key: items_key.into(),
            strategy,
            query: Vec::new(),
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    /// Extra query parameters sent with every page
    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    pub fn max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Collect the items of every page
    pub async fn all_items<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.all_values()
            .await?
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(SdkError::from))
            .collect()
    }

    /// Collect the raw JSON items of every page
    pub async fn all_values(&self) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut cursor = Cursor::First;
        let mut pages = 0;

        loop {
            if pages == self.max_pages {
                return Err(SdkError::PageLimitExceeded {
                    url: self.url.clone(),
                    max_pages: self.max_pages,
                });
            }
            pages += 1;

            let (url, opts) = self.page_request(&cursor);
            debug!(url = %url, page = pages, "fetching page");
            let body: Value = self.client.get(&url, opts).await?.json()?;
            let page = match body.get(&self.items_key) {
                Some(Value::Array(page)) => page.clone(),
                Some(Value::Null) | None => Vec::new(),
                Some(_) => {
                    return Err(SdkError::MissingKey(format!(
                        "{} (not an array)",
                        self.items_key
                    )));
                }
            };

            let next = self.next_cursor(&cursor, &body, &page);
            items.extend(page);
            match next {
                Some(next) => cursor = next,
                None => return Ok(items),
            }
        }
    }

    fn page_request(&self, cursor: &Cursor) -> (String, RequestOpts) {
        let mut opts = RequestOpts::new();
        for (key, value) in &self.query {
            opts = opts.query(key.clone(), value.clone());
        }

        match (&self.strategy, cursor) {
            (PageStrategy::Single, _) => (self.url.clone(), opts),
            (PageStrategy::Offset { limit, start }, cursor) => {
                let offset = match cursor {
                    Cursor::Offset(offset) => *offset,
                    _ => *start,
                };
                let opts = opts
                    .query("offset", offset.to_string())
                    .query("limit", limit.to_string());
                (self.url.clone(), opts)
            }
            (PageStrategy::Marker { limit, .. }, cursor) => {
                let mut opts = opts.query("limit", limit.to_string());
                if let Cursor::Marker(marker) = cursor {
                    opts = opts.query("marker", marker.clone());
                }
                (self.url.clone(), opts)
            }
            (PageStrategy::Link { .. }, Cursor::Link(next)) => (next.clone(), RequestOpts::new()),
            (PageStrategy::Link { .. }, _) => (self.url.clone(), opts),
        }
    }

    fn next_cursor(&self, current: &Cursor, body: &Value, page: &[Value]) -> Option<Cursor> {
        match &self.strategy {
            PageStrategy::Single => None,
            PageStrategy::Offset { limit, start } => {
                if page.len() < *limit as usize || page.is_empty() {
                    return None;
                }
                let offset = match current {
                    Cursor::Offset(offset) => *offset,
                    _ => *start,
                };
                Some(Cursor::Offset(offset + page.len() as u32))
            }
            PageStrategy::Marker {
                next_marker_path, ..
            } => {
                if page.is_empty() {
                    return None;
                }
                let marker = match next_marker_path {
                    Some(path) => lookup(body, path).and_then(Value::as_str),
                    None => page.last().and_then(|item| item.get("id")).and_then(Value::as_str),
                }
                .filter(|m| !m.is_empty())?;
                if matches!(current, Cursor::Marker(prev) if prev == marker) {
                    return None;
                }
                Some(Cursor::Marker(marker.to_string()))
            }
            PageStrategy::Link { next_path } => {
                let next = lookup(body, next_path)
                    .and_then(Value::as_str)
                    .filter(|n| !n.is_empty())?;
                if matches!(current, Cursor::Link(prev) if prev == next) {
                    return None;
                }
                Some(Cursor::Link(next.to_string()))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Cursor {
    First,
    Offset(u32),
    Marker(String),
    Link(String),
}

/// Follow a dotted path such as `page_info.next_marker`
pub(crate) fn lookup<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.get(segment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_dotted_path() {
        let body = json!({"page_info": {"next_marker": "m2", "current_count": 2}});
        assert_eq!(
            lookup(&body, "page_info.next_marker").and_then(Value::as_str),
            Some("m2")
        );
        assert!(lookup(&body, "page_info.previous_marker").is_none());
        assert!(lookup(&body, "links.next").is_none());
    }
}
