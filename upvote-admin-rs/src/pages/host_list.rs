use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::client::UpvoteClient;
use crate::error::ApiError;
use crate::models::{ExemptionState, Host};
use crate::routes;
use crate::shell::Shell;

use super::{HostPatch, PageStore, Reduce, optimistic};

/// Milliseconds since the last rule sync after which a host counts as stale
/// (30 days).
pub const STALE_THRESHOLD_MS: i64 = 1000 * 60 * 60 * 24 * 30;

#[derive(Debug, Clone, Default)]
pub struct HostListState {
    /// `None` until the first load resolves.
    pub hosts: Option<Vec<Host>>,
    pub show_hidden: bool,
}

#[derive(Debug)]
pub enum HostListMsg {
    HostsLoaded(Vec<Host>),
    ShowHidden(bool),
    Patch { host_id: String, patch: HostPatch },
}

impl Reduce for HostListState {
    type Msg = HostListMsg;

    fn reduce(&mut self, msg: HostListMsg) {
        match msg {
            HostListMsg::HostsLoaded(hosts) => self.hosts = Some(hosts),
            HostListMsg::ShowHidden(show) => self.show_hidden = show,
            HostListMsg::Patch { host_id, patch } => {
                let hosts = self.hosts.iter_mut().flatten();
                for host in hosts.filter(|h| h.id == host_id) {
                    patch.apply(host);
                }
            }
        }
    }
}

pub fn is_mode_locked(host: &Host) -> bool {
    host.client_mode_lock
}

pub fn is_stale(host: &Host) -> bool {
    is_stale_at(host, Utc::now())
}

/// A host with no parseable sync time is stale.
pub fn is_stale_at(host: &Host, now: DateTime<Utc>) -> bool {
    match host.last_rule_sync() {
        Some(synced) => (now - synced).num_milliseconds() >= STALE_THRESHOLD_MS,
        None => true,
    }
}

pub fn is_exemption_status_visible(host: &Host) -> bool {
    host.exemption
        .as_ref()
        .is_some_and(|e| e.state != ExemptionState::Cancelled)
}

pub fn is_exemption_in_bad_state(host: &Host) -> bool {
    host.exemption.as_ref().is_some_and(|e| {
        matches!(e.state, ExemptionState::Denied | ExemptionState::Revoked)
    })
}

pub fn is_exemption_renewable(host: &Host) -> bool {
    host.exemption
        .as_ref()
        .is_some_and(|e| e.state == ExemptionState::Approved)
}

/// The signed-in user's own hosts.
pub struct HostListPage {
    client: Arc<UpvoteClient>,
    shell: Shell,
    store: PageStore<HostListState>,
}

impl HostListPage {
    pub fn new(client: Arc<UpvoteClient>, shell: Shell) -> Self {
        shell.title.set_title("Hosts");
        Self {
            client,
            shell,
            store: PageStore::new("host-list", HostListState::default()),
        }
    }

    pub fn store(&self) -> &PageStore<HostListState> {
        &self.store
    }

    pub async fn init(&self) {
        match self.client.associated_hosts().await {
            Ok(hosts) => self.store.dispatch(HostListMsg::HostsLoaded(hosts)),
            Err(err) => self.report(err),
        }
    }

    pub fn host(&self, host_id: &str) -> Option<Host> {
        self.store.read(|s| {
            s.hosts
                .iter()
                .flatten()
                .find(|host| host.id == host_id)
                .cloned()
        })
    }

    pub fn set_show_hidden(&self, show: bool) {
        self.store.dispatch(HostListMsg::ShowHidden(show));
    }

    /// Loaded hosts, minus hidden ones unless `show_hidden` is on.
    pub fn visible_hosts(&self) -> Vec<Host> {
        self.store.read(|s| {
            s.hosts
                .iter()
                .flatten()
                .filter(|host| s.show_hidden || !host.hidden)
                .cloned()
                .collect()
        })
    }

    pub fn go_to_request_page(&self, host_id: &str) {
        self.shell
            .navigator
            .navigate(&routes::host_request_exception(host_id));
    }

    pub fn go_to_blockables_page(&self, host_id: &str) {
        self.shell.navigator.navigate(&routes::host_blockables(host_id));
    }

    /// Cancels the host's exemption, then reloads the list.
    pub async fn cancel_exemption(&self, host_id: &str) -> bool {
        match self.client.cancel_exemption(host_id).await {
            Ok(_) => {
                self.init().await;
                true
            }
            Err(err) => {
                self.report(err);
                false
            }
        }
    }

    pub async fn toggle_visibility(&self, host_id: &str) -> bool {
        let Some(host) = self.host(host_id) else {
            warn!("host {host_id} is not loaded");
            return false;
        };
        let hidden = !host.hidden;
        let apply = HostListMsg::Patch {
            host_id: host_id.to_string(),
            patch: HostPatch::Hidden(hidden),
        };
        let rollback = HostListMsg::Patch {
            host_id: host_id.to_string(),
            patch: HostPatch::Hidden(host.hidden),
        };
        let request = self.client.set_host_hidden(host_id, hidden);
        optimistic(&self.store, &*self.shell.notifier, apply, rollback, request).await
    }

    fn report(&self, err: ApiError) {
        warn!("host list request failed: {err}");
        self.shell.notifier.notify(&err);
    }
}
