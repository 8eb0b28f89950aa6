//! Console routes the pages navigate to.

use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub path: String,
    pub query: BTreeMap<String, String>,
}

impl Route {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: BTreeMap::new(),
        }
    }

    pub fn with_query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.insert(key.to_string(), value.into());
        self
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)?;
        for (idx, (key, value)) in self.query.iter().enumerate() {
            let sep = if idx == 0 { '?' } else { '&' };
            write!(
                f,
                "{sep}{}={}",
                urlencoding::encode(key),
                urlencoding::encode(value)
            )?;
        }
        Ok(())
    }
}

pub fn admin_blockable(blockable_id: &str) -> Route {
    Route::new(format!("/admin/blockables/{blockable_id}"))
}

/// Admin host detail. Any current search is dropped.
pub fn admin_host(host_id: &str) -> Route {
    Route::new(format!("/admin/hosts/{host_id}"))
}

pub fn admin_host_events(host_id: &str) -> Route {
    Route::new("/admin/events").with_query("hostId", host_id)
}

pub fn host_blockables(host_id: &str) -> Route {
    Route::new(format!("/hosts/{host_id}/blockables"))
}

pub fn host_request_exception(host_id: &str) -> Route {
    Route::new(format!("/hosts/{host_id}/request-exception"))
}
