use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use tracing::{debug, warn};

use crate::client::{Binding, UpvoteClient};
use crate::error::ApiError;
use crate::models::{ClientMode, EDIT_HOSTS, Host, User};
use crate::resources::Params;
use crate::routes;
use crate::shell::{PromptRequest, Shell};

use super::{EntityMsg, EntityPage, EntityState, HostPatch, PageStore, Reduce, optimistic};

/// A column the host table shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub key: &'static str,
    pub display_name: &'static str,
}

const fn field(key: &'static str, display_name: &'static str) -> Field {
    Field { key, display_name }
}

pub const BASE_FIELDS: [Field; 3] = [
    field("id", "ID"),
    field("hostname", "Hostname"),
    field("primary_user", "Primary User"),
];

const SANTA_FIELDS: [Field; 3] = [
    field("primary_user", "Primary User"),
    field("serial_num", "Serial Number"),
    field("santa_version", "Santa Version"),
];

#[derive(Debug, Clone)]
pub struct HostPageState {
    pub entity: EntityState<Host>,
    pub user: Option<User>,
    pub fields: Vec<Field>,
    pub visible_details: HashSet<String>,
}

#[derive(Debug)]
pub enum HostPageMsg {
    Entity(EntityMsg<Host>),
    UserLoaded(User),
    Fields(Vec<Field>),
    Patch { host_id: String, patch: HostPatch },
    ShowDetails(String),
    HideDetails(String),
}

impl Reduce for HostPageState {
    type Msg = HostPageMsg;

    fn reduce(&mut self, msg: HostPageMsg) {
        match msg {
            HostPageMsg::Entity(msg) => self.entity.apply(msg),
            HostPageMsg::UserLoaded(user) => self.user = Some(user),
            HostPageMsg::Fields(fields) => self.fields = fields,
            HostPageMsg::Patch { host_id, patch } => {
                for host in self.entity.entities_mut().filter(|h| h.id == host_id) {
                    patch.apply(host);
                }
            }
            HostPageMsg::ShowDetails(host_id) => {
                self.visible_details.insert(host_id);
            }
            HostPageMsg::HideDetails(host_id) => {
                self.visible_details.remove(&host_id);
            }
        }
    }
}

impl HostPageState {
    pub fn host(&self, host_id: &str) -> Option<&Host> {
        self.entity
            .card
            .iter()
            .chain(self.entity.items.iter())
            .find(|host| host.id == host_id)
    }
}

/// Admin host listing and detail.
pub struct HostPage {
    entity: EntityPage<Host>,
    shell: Shell,
    store: PageStore<HostPageState>,
}

impl HostPage {
    pub fn new(
        client: Arc<UpvoteClient>,
        shell: Shell,
        host_id: Option<String>,
        platform: Option<&str>,
    ) -> Self {
        shell.title.set_title("Hosts");

        // Without a platform the listing falls back to `hosts/query/santa`.
        let mut request_data = Params::new();
        if let Some(platform) = platform.filter(|p| !p.is_empty()) {
            request_data.insert("platform".to_string(), platform.to_string());
        }
        let state = HostPageState {
            entity: EntityState::with_request_data(request_data),
            user: None,
            fields: BASE_FIELDS.to_vec(),
            visible_details: HashSet::new(),
        };

        Self {
            entity: EntityPage::new(client, Binding::Hosts, Binding::HostQuery, host_id),
            shell,
            store: PageStore::new("host", state),
        }
    }

    pub fn store(&self) -> &PageStore<HostPageState> {
        &self.store
    }

    pub fn host(&self, host_id: &str) -> Option<Host> {
        self.store.read(|s| s.host(host_id).cloned())
    }

    pub async fn init(&self) {
        tokio::join!(self.load(), self.load_user());
    }

    pub async fn load(&self) {
        let request_data = self.store.read(|s| s.entity.request_data.clone());
        match self.entity.load(&request_data).await {
            Ok(msg) => self.store.dispatch(HostPageMsg::Entity(msg)),
            Err(err) => self.report(err),
        }
    }

    pub async fn load_more(&self) {
        let (request_data, cursor) = self.store.read(|s| {
            let cursor = s.entity.cursor.clone().filter(|_| s.entity.more);
            (s.entity.request_data.clone(), cursor)
        });
        let Some(cursor) = cursor else {
            debug!("no further hosts to load");
            return;
        };
        match self.entity.load_more(&request_data, &cursor).await {
            Ok(msg) => self.store.dispatch(HostPageMsg::Entity(msg)),
            Err(err) => self.report(err),
        }
    }

    async fn load_user(&self) {
        match self.entity.client().get_self().await {
            Ok(user) => self.store.dispatch(HostPageMsg::UserLoaded(user)),
            Err(err) => self.report(err),
        }
    }

    pub fn fields(&self) -> Vec<Field> {
        self.store.read(|s| s.fields.clone())
    }

    pub fn update_to_all(&self) {
        self.store.dispatch(HostPageMsg::Fields(BASE_FIELDS.to_vec()));
    }

    /// Base columns plus the Santa-only ones; a shared key keeps its first slot.
    pub fn update_to_santa(&self) {
        let mut fields = BASE_FIELDS.to_vec();
        for extra in SANTA_FIELDS {
            if !fields.iter().any(|f| f.key == extra.key) {
                fields.push(extra);
            }
        }
        self.store.dispatch(HostPageMsg::Fields(fields));
    }

    pub fn go_to_host_events(&self, host_id: &str) {
        self.shell
            .navigator
            .navigate(&routes::admin_host_events(host_id));
    }

    pub fn go_to_blockables_page(&self, host_id: &str) {
        self.shell.navigator.navigate(&routes::host_blockables(host_id));
    }

    /// Prompts for a new whitelist regex. Cancelling leaves the host alone.
    pub async fn change_whitelist_regex(&self, host_id: &str) -> bool {
        self.change_regex(host_id, RegexKind::Whitelist).await
    }

    pub async fn change_blacklist_regex(&self, host_id: &str) -> bool {
        self.change_regex(host_id, RegexKind::Blacklist).await
    }

    async fn change_regex(&self, host_id: &str, kind: RegexKind) -> bool {
        let Some(host) = self.host(host_id) else {
            warn!("host {host_id} is not loaded");
            return false;
        };
        let current = match kind {
            RegexKind::Whitelist => host.directory_whitelist_regex.clone(),
            RegexKind::Blacklist => host.directory_blacklist_regex.clone(),
        };
        let request = PromptRequest {
            title: format!("{} REGEX", kind.name()),
            text: format!("Enter updated {} REGEX", kind.name().to_lowercase()),
            initial_value: current.unwrap_or_default(),
        };
        let Some(value) = self.shell.prompt.prompt(request).await else {
            debug!("{} regex edit for {host_id} cancelled", kind.name());
            return false;
        };
        let patch = match kind {
            RegexKind::Whitelist => HostPatch::WhitelistRegex(Some(value)),
            RegexKind::Blacklist => HostPatch::BlacklistRegex(Some(value)),
        };
        self.patch_host(host_id, patch).await
    }

    pub async fn request_logs(&self, host_id: &str) -> bool {
        self.patch_host(host_id, HostPatch::ShouldUploadLogs(true))
            .await
    }

    pub fn can_enable_monitor_mode(&self, host: &Host) -> bool {
        host.is_santa_host() && host.is_in_lockdown() && self.user_can_edit_hosts()
    }

    pub async fn enable_monitor_mode(&self, host_id: &str) -> bool {
        self.patch_host(host_id, HostPatch::ClientMode(Some(ClientMode::Monitor)))
            .await
    }

    pub fn can_enable_lockdown_mode(&self, host: &Host) -> bool {
        host.is_santa_host() && !host.is_in_lockdown() && self.user_can_edit_hosts()
    }

    pub async fn enable_lockdown_mode(&self, host_id: &str) -> bool {
        self.patch_host(host_id, HostPatch::ClientMode(Some(ClientMode::Lockdown)))
            .await
    }

    pub fn can_toggle_client_mode_lock(&self, host: &Host) -> bool {
        host.is_santa_host() && self.user_can_edit_hosts()
    }

    pub async fn toggle_client_mode_lock(&self, host_id: &str) -> bool {
        let Some(host) = self.host(host_id) else {
            warn!("host {host_id} is not loaded");
            return false;
        };
        self.patch_host(host_id, HostPatch::ClientModeLock(!host.client_mode_lock))
            .await
    }

    /// Flips transitive whitelisting through its own host route.
    pub async fn toggle_transitive_whitelisting(&self, host_id: &str) -> bool {
        let Some(host) = self.host(host_id) else {
            warn!("host {host_id} is not loaded");
            return false;
        };
        let next = !host.transitive_whitelisting_enabled;
        let patch = HostPatch::TransitiveWhitelisting(next);
        let previous = patch.capture(&host);
        let request = self.entity.client().set_host_transitive(host_id, next);
        self.commit(host_id, patch, previous, request).await
    }

    pub fn user_can_edit_hosts(&self) -> bool {
        self.store.read(|s| {
            s.user
                .as_ref()
                .is_some_and(|user| user.has_permission(EDIT_HOSTS))
        })
    }

    pub fn details_visible(&self, host_id: &str) -> bool {
        self.store.read(|s| s.visible_details.contains(host_id))
    }

    pub fn show_details(&self, host_id: &str) {
        self.store
            .dispatch(HostPageMsg::ShowDetails(host_id.to_string()));
    }

    pub fn hide_details(&self, host_id: &str) {
        self.store
            .dispatch(HostPageMsg::HideDetails(host_id.to_string()));
    }

    /// Writes `patch` locally, posts the patched host, and puts the old value
    /// back if the post fails.
    async fn patch_host(&self, host_id: &str, patch: HostPatch) -> bool {
        let Some(mut host) = self.host(host_id) else {
            warn!("host {host_id} is not loaded");
            return false;
        };
        let previous = patch.capture(&host);
        patch.apply(&mut host);

        let params = patch.request_params();
        let request = self.entity.client().update_host_with(&host, &params);
        self.commit(host_id, patch, previous, request).await
    }

    async fn commit<F>(
        &self,
        host_id: &str,
        patch: HostPatch,
        previous: HostPatch,
        request: F,
    ) -> bool
    where
        F: Future<Output = Result<Value, ApiError>>,
    {
        let apply = HostPageMsg::Patch {
            host_id: host_id.to_string(),
            patch,
        };
        let rollback = HostPageMsg::Patch {
            host_id: host_id.to_string(),
            patch: previous,
        };
        optimistic(&self.store, &*self.shell.notifier, apply, rollback, request).await
    }

    fn report(&self, err: ApiError) {
        warn!("host page request failed: {err}");
        self.shell.notifier.notify(&err);
    }
}

#[derive(Debug, Clone, Copy)]
enum RegexKind {
    Whitelist,
    Blacklist,
}

impl RegexKind {
    fn name(self) -> &'static str {
        match self {
            Self::Whitelist => "Whitelist",
            Self::Blacklist => "Blacklist",
        }
    }
}
