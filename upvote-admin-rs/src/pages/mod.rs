//! Page controllers for the admin console.
//!
//! Each page owns a [`PageStore`] and talks to the backend through an
//! [`UpvoteClient`] and to the surrounding UI through a
//! [`Shell`](crate::shell::Shell). The shared list/card loading lives in
//! [`EntityPage`].

pub mod event_page;
pub mod host_list;
pub mod host_page;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::client::{Binding, UpvoteClient};
use crate::error::ApiError;
use crate::models::{ClientMode, Host, QueryPage};
use crate::resources::Params;
use crate::shell::ErrorNotifier;

pub use store::{PageStore, Reduce};

/// Card and list data shared by the entity pages.
#[derive(Debug, Clone)]
pub struct EntityState<T> {
    pub request_data: Params,
    pub card: Option<T>,
    pub items: Vec<T>,
    pub cursor: Option<String>,
    pub more: bool,
}

impl<T> Default for EntityState<T> {
    fn default() -> Self {
        Self {
            request_data: Params::new(),
            card: None,
            items: Vec::new(),
            cursor: None,
            more: false,
        }
    }
}

#[derive(Debug)]
pub enum EntityMsg<T> {
    CardLoaded(T),
    ItemsLoaded(QueryPage<T>),
    MoreLoaded(QueryPage<T>),
}

impl<T> EntityState<T> {
    pub fn with_request_data(request_data: Params) -> Self {
        Self {
            request_data,
            ..Self::default()
        }
    }

    pub fn apply(&mut self, msg: EntityMsg<T>) {
        match msg {
            EntityMsg::CardLoaded(card) => self.card = Some(card),
            EntityMsg::ItemsLoaded(page) => {
                self.items = page.content;
                self.cursor = page.cursor;
                self.more = page.more;
            }
            EntityMsg::MoreLoaded(page) => {
                self.items.extend(page.content);
                self.cursor = page.cursor;
                self.more = page.more;
            }
        }
    }

    /// The card plus every loaded row.
    pub fn entities_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.card.iter_mut().chain(self.items.iter_mut())
    }
}

/// Loads one entity kind through a resource binding (single card) and a
/// query binding (list).
pub struct EntityPage<T> {
    client: Arc<UpvoteClient>,
    resource: Binding,
    query: Binding,
    route_id: Option<String>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> EntityPage<T> {
    pub fn new(
        client: Arc<UpvoteClient>,
        resource: Binding,
        query: Binding,
        route_id: Option<String>,
    ) -> Self {
        Self {
            client,
            resource,
            query,
            route_id: route_id.filter(|id| !id.is_empty()),
            _entity: PhantomData,
        }
    }

    pub fn client(&self) -> &UpvoteClient {
        &self.client
    }

    pub fn route_id(&self) -> Option<&str> {
        self.route_id.as_deref()
    }

    /// Fetches the card when the route names one, otherwise the first page
    /// of the list.
    pub async fn load(&self, request_data: &Params) -> Result<EntityMsg<T>, ApiError> {
        match &self.route_id {
            Some(id) => {
                let mut params = request_data.clone();
                params.insert("id".to_string(), id.clone());
                let binding = self.client.binding(self.resource);
                let card = self.client.invoke(binding, "get", &params, None).await?;
                Ok(EntityMsg::CardLoaded(card))
            }
            None => {
                let binding = self.client.binding(self.query);
                let page = self.client.invoke(binding, "query", request_data, None).await?;
                Ok(EntityMsg::ItemsLoaded(page))
            }
        }
    }

    pub async fn load_more(
        &self,
        request_data: &Params,
        cursor: &str,
    ) -> Result<EntityMsg<T>, ApiError> {
        let mut params = request_data.clone();
        params.insert("cursor".to_string(), cursor.to_string());
        let binding = self.client.binding(self.query);
        let page = self.client.invoke(binding, "query", &params, None).await?;
        Ok(EntityMsg::MoreLoaded(page))
    }
}

/// A single server-backed host field, carrying the value to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostPatch {
    ClientMode(Option<ClientMode>),
    ClientModeLock(bool),
    ShouldUploadLogs(bool),
    TransitiveWhitelisting(bool),
    WhitelistRegex(Option<String>),
    BlacklistRegex(Option<String>),
    Hidden(bool),
}

impl HostPatch {
    pub fn apply(&self, host: &mut Host) {
        match self {
            Self::ClientMode(mode) => host.client_mode = *mode,
            Self::ClientModeLock(value) => host.client_mode_lock = *value,
            Self::ShouldUploadLogs(value) => host.should_upload_logs = *value,
            Self::TransitiveWhitelisting(value) => host.transitive_whitelisting_enabled = *value,
            Self::WhitelistRegex(value) => host.directory_whitelist_regex = value.clone(),
            Self::BlacklistRegex(value) => host.directory_blacklist_regex = value.clone(),
            Self::Hidden(value) => host.hidden = *value,
        }
    }

    /// The same field with the value `host` holds now.
    pub fn capture(&self, host: &Host) -> Self {
        match self {
            Self::ClientMode(_) => Self::ClientMode(host.client_mode),
            Self::ClientModeLock(_) => Self::ClientModeLock(host.client_mode_lock),
            Self::ShouldUploadLogs(_) => Self::ShouldUploadLogs(host.should_upload_logs),
            Self::TransitiveWhitelisting(_) => {
                Self::TransitiveWhitelisting(host.transitive_whitelisting_enabled)
            }
            Self::WhitelistRegex(_) => Self::WhitelistRegex(host.directory_whitelist_regex.clone()),
            Self::BlacklistRegex(_) => Self::BlacklistRegex(host.directory_blacklist_regex.clone()),
            Self::Hidden(_) => Self::Hidden(host.hidden),
        }
    }

    /// Update params for fields the backend reads only from the request
    /// params. Empty regexes are left out because the backend skips them.
    pub fn request_params(&self) -> Params {
        let mut params = Params::new();
        let entry = match self {
            Self::WhitelistRegex(Some(value)) => Some(("directoryWhitelistRegex", value)),
            Self::BlacklistRegex(Some(value)) => Some(("directoryBlacklistRegex", value)),
            _ => None,
        };
        if let Some((key, value)) = entry.filter(|(_, value)| !value.is_empty()) {
            params.insert(key.to_string(), value.clone());
        }
        params
    }
}

/// Applies `apply`, awaits `request`, and on failure dispatches `rollback`
/// and hands the error to the notifier. Returns whether the request
/// succeeded.
pub(crate) async fn optimistic<S, F>(
    store: &PageStore<S>,
    notifier: &dyn ErrorNotifier,
    apply: S::Msg,
    rollback: S::Msg,
    request: F,
) -> bool
where
    S: Reduce,
    F: Future<Output = Result<Value, ApiError>>,
{
    store.dispatch(apply);
    match request.await {
        Ok(_) => true,
        Err(err) => {
            warn!("reverting local change: {err}");
            store.dispatch(rollback);
            notifier.notify(&err);
            false
        }
    }
}
