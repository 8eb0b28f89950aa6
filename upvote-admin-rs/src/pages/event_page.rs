use std::sync::Arc;

use tracing::{debug, warn};

use crate::client::{Binding, UpvoteClient};
use crate::error::ApiError;
use crate::models::{CertRef, EventWithContext, Settings};
use crate::resources::Params;
use crate::routes;
use crate::shell::Shell;
use crate::statechip::{ChipTables, PatternCache, UiDisplayState, resolve_display_state_with};

use super::{EntityMsg, EntityPage, EntityState, PageStore, Reduce};

#[derive(Debug, Clone, Default)]
pub struct EventPageState {
    pub host_id: Option<String>,
    pub title: String,
    pub entity: EntityState<EventWithContext>,
    pub settings: Settings,
}

#[derive(Debug)]
pub enum EventPageMsg {
    Entity(EntityMsg<EventWithContext>),
    SettingLoaded { name: &'static str, value: String },
}

impl Reduce for EventPageState {
    type Msg = EventPageMsg;

    fn reduce(&mut self, msg: EventPageMsg) {
        match msg {
            EventPageMsg::Entity(msg) => self.entity.apply(msg),
            EventPageMsg::SettingLoaded { name, value } => {
                self.settings.apply(name, value);
            }
        }
    }
}

/// A row's chip as the view renders it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipView {
    pub state: UiDisplayState,
    pub label: String,
    pub class: Option<String>,
}

/// Admin event listing, optionally filtered to one host.
pub struct EventPage {
    entity: EntityPage<EventWithContext>,
    shell: Shell,
    chips: ChipTables,
    patterns: PatternCache,
    store: PageStore<EventPageState>,
}

impl EventPage {
    /// Sets the page title and request data. Call [`EventPage::init`] to load.
    pub fn new(
        client: Arc<UpvoteClient>,
        shell: Shell,
        chips: ChipTables,
        event_id: Option<String>,
        host_id: Option<String>,
    ) -> Self {
        let host_id = host_id.filter(|id| !id.is_empty());
        let title = match &host_id {
            Some(id) => format!("Events for Host {id}"),
            None => "Events".to_string(),
        };
        shell.title.set_title(&title);

        let mut request_data = Params::new();
        if let Some(id) = &host_id {
            request_data.insert("hostId".to_string(), id.clone());
        }
        request_data.insert("withContext".to_string(), "true".to_string());

        let state = EventPageState {
            host_id,
            title,
            entity: EntityState::with_request_data(request_data),
            settings: Settings::default(),
        };

        Self {
            entity: EntityPage::new(client, Binding::Events, Binding::EventQuery, event_id),
            shell,
            chips,
            patterns: PatternCache::new(),
            store: PageStore::new("event", state),
        }
    }

    pub fn store(&self) -> &PageStore<EventPageState> {
        &self.store
    }

    /// Loads both directory settings and the events. Each load reports its
    /// own failure.
    pub async fn init(&self) {
        let [whitelist, blacklist] = Settings::NAMES;
        tokio::join!(
            self.load_setting(whitelist),
            self.load_setting(blacklist),
            self.load()
        );
    }

    pub async fn load(&self) {
        let request_data = self.store.read(|s| s.entity.request_data.clone());
        match self.entity.load(&request_data).await {
            Ok(msg) => self.store.dispatch(EventPageMsg::Entity(msg)),
            Err(err) => self.report(err),
        }
    }

    /// Fetches the next page when the last one said there is more.
    pub async fn load_more(&self) {
        let (request_data, cursor) = self.store.read(|s| {
            let cursor = s.entity.cursor.clone().filter(|_| s.entity.more);
            (s.entity.request_data.clone(), cursor)
        });
        let Some(cursor) = cursor else {
            debug!("no further events to load");
            return;
        };
        match self.entity.load_more(&request_data, &cursor).await {
            Ok(msg) => self.store.dispatch(EventPageMsg::Entity(msg)),
            Err(err) => self.report(err),
        }
    }

    async fn load_setting(&self, name: &'static str) {
        match self.entity.client().get_setting(name).await {
            Ok(value) => self.store.dispatch(EventPageMsg::SettingLoaded { name, value }),
            Err(err) => self.report(err),
        }
    }

    /// Opens the selected event's blockable in a new window.
    pub fn go_to_blockable(&self) {
        let blockable_id = self.store.read(|s| {
            s.entity
                .card
                .as_ref()
                .and_then(|card| card.event.blockable_id.clone())
        });
        match blockable_id {
            Some(id) => self
                .shell
                .navigator
                .open_in_new_window(&routes::admin_blockable(&id)),
            None => warn!("no blockable to open for the selected event"),
        }
    }

    pub fn go_to_host(&self) {
        let host_id = self.store.read(|s| {
            s.entity
                .card
                .as_ref()
                .and_then(|card| card.event.host_id.clone())
        });
        match host_id {
            Some(id) => self.shell.navigator.navigate(&routes::admin_host(&id)),
            None => warn!("no host to open for the selected event"),
        }
    }

    /// The chip for one row, using the settings loaded so far.
    pub fn display_state(&self, entry: &EventWithContext) -> Option<ChipView> {
        let settings = self.store.read(|s| s.settings.clone());
        let state = resolve_display_state_with(
            &self.patterns,
            entry.blockable.as_ref().map(|b| b.state),
            entry.vote.as_ref(),
            entry.cert.as_ref().and_then(CertRef::entity),
            Some(&entry.event),
            entry.host.as_ref(),
            Some(&settings),
        )?;
        Some(ChipView {
            state,
            label: self.chips.label(state),
            class: self.chips.style_class(state).map(str::to_string),
        })
    }

    fn report(&self, err: ApiError) {
        warn!("event page request failed: {err}");
        self.shell.notifier.notify(&err);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::pages::testing::{RecordingShell, ScriptedTransport, client_for, failure};

    const QUERY: &str = "/api/web/events/query";
    const WHITELIST: &str = "/api/web/settings/santaDirectoryWhitelistRegex";
    const BLACKLIST: &str = "/api/web/settings/santaDirectoryBlacklistRegex";

    fn event_row(id: &str, path: &str, state: &str) -> serde_json::Value {
        json!({
            "event": {
                "id": id,
                "blockableId": format!("b-{id}"),
                "hostId": "H-1",
                "filePath": path
            },
            "blockable": { "id": format!("b-{id}"), "state": state },
            "cert": null,
            "host": { "id": "H-1", "hostname": "mac-01" },
            "vote": null
        })
    }

    #[tokio::test]
    async fn host_filtered_listing_loads_settings_and_rows() {
        let transport = Arc::new(ScriptedTransport::default());
        transport
            .respond(WHITELIST, Ok(json!("^/opt/")))
            .respond(BLACKLIST, Ok(json!("^/tmp/")))
            .respond(
                QUERY,
                Ok(json!({
                    "content": [
                        event_row("e1", "/tmp/evil", "UNTRUSTED"),
                        event_row("e2", "/opt/tool", "UNTRUSTED"),
                        event_row("e3", "/usr/bin/ls", "SUSPECT")
                    ],
                    "cursor": "next",
                    "more": true
                })),
            );
        let ui = RecordingShell::new();
        let page = EventPage::new(
            client_for(transport.clone()),
            ui.shell(),
            ChipTables::default(),
            None,
            Some("H-1".to_string()),
        );
        page.init().await;

        assert_eq!(*ui.titles.borrow(), vec!["Events for Host H-1".to_string()]);
        assert!(ui.errors.borrow().is_empty());

        let query = &transport.requests_to(QUERY)[0];
        assert_eq!(query.query_value("hostId"), Some("H-1"));
        assert_eq!(query.query_value("withContext"), Some("true"));

        let rows = page.store().read(|s| s.entity.items.clone());
        let chips: Vec<_> = rows
            .iter()
            .map(|row| page.display_state(row).map(|chip| chip.state))
            .collect();
        assert_eq!(
            chips,
            vec![
                Some(UiDisplayState::RegexBanned),
                Some(UiDisplayState::RegexWhitelisted),
                Some(UiDisplayState::Flagged),
            ]
        );

        let chip = page.display_state(&rows[0]).unwrap();
        assert_eq!(chip.label, "Regex Banned");
        assert_eq!(chip.class.as_deref(), Some("state-banned"));
    }

    #[tokio::test]
    async fn bundle_rows_with_a_cert_key_load_alongside_binary_rows() {
        let mut bundle = event_row("e2", "/tmp/bundle", "UNTRUSTED");
        bundle["cert"] = json!("ahBzfnVwdm90ZS1zdGFnaW5nchkLEgxDZXJ0aWZpY2F0ZSIHYWJjZGVmAoM");
        let mut binary = event_row("e1", "/usr/bin/ls", "UNTRUSTED");
        binary["cert"] = json!({ "id": "c1", "state": "BANNED" });

        let transport = Arc::new(ScriptedTransport::default());
        transport
            .respond(WHITELIST, Ok(json!("")))
            .respond(BLACKLIST, Ok(json!("^/tmp/")))
            .respond(QUERY, Ok(json!({ "content": [binary, bundle], "more": false })));
        let ui = RecordingShell::new();
        let page = EventPage::new(
            client_for(transport),
            ui.shell(),
            ChipTables::default(),
            None,
            None,
        );
        page.init().await;

        assert!(ui.errors.borrow().is_empty());
        let rows = page.store().read(|s| s.entity.items.clone());
        assert_eq!(rows.len(), 2);
        assert_eq!(
            page.display_state(&rows[0]).map(|chip| chip.state),
            Some(UiDisplayState::CertBanned)
        );
        assert_eq!(
            page.display_state(&rows[1]).map(|chip| chip.state),
            Some(UiDisplayState::RegexBanned)
        );
    }

    #[tokio::test]
    async fn a_failed_setting_is_reported_and_the_rest_still_loads() {
        let transport = Arc::new(ScriptedTransport::default());
        transport
            .respond(WHITELIST, Err(failure(WHITELIST)))
            .respond(BLACKLIST, Ok(json!("^/tmp/")))
            .respond(QUERY, Ok(json!({ "content": [], "more": false })));
        let ui = RecordingShell::new();
        let page = EventPage::new(
            client_for(transport),
            ui.shell(),
            ChipTables::default(),
            None,
            None,
        );
        page.init().await;

        assert_eq!(*ui.titles.borrow(), vec!["Events".to_string()]);
        assert_eq!(*ui.errors.borrow(), vec![failure(WHITELIST)]);
        let settings = page.store().read(|s| s.settings.clone());
        assert_eq!(settings.santa_directory_whitelist_regex, "");
        assert_eq!(settings.santa_directory_blacklist_regex, "^/tmp/");
    }

    #[tokio::test]
    async fn card_navigation_targets_blockable_and_host() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.respond(
            "/api/web/events/e1",
            Ok(event_row("e1", "/tmp/evil", "BANNED")),
        );
        let ui = RecordingShell::new();
        let page = EventPage::new(
            client_for(transport.clone()),
            ui.shell(),
            ChipTables::default(),
            Some("e1".to_string()),
            None,
        );
        page.load().await;

        let request = &transport.requests_to("/api/web/events/e1")[0];
        assert_eq!(request.query_value("withContext"), Some("true"));

        page.go_to_blockable();
        page.go_to_host();
        assert_eq!(*ui.new_windows.borrow(), vec!["/admin/blockables/b-e1".to_string()]);
        assert_eq!(*ui.navigations.borrow(), vec!["/admin/hosts/H-1".to_string()]);
    }

    #[tokio::test]
    async fn load_more_appends_until_the_cursor_runs_out() {
        let transport = Arc::new(ScriptedTransport::default());
        transport
            .respond(
                QUERY,
                Ok(json!({
                    "content": [event_row("e1", "/a", "UNTRUSTED")],
                    "cursor": "c1",
                    "more": true
                })),
            )
            .respond(
                QUERY,
                Ok(json!({
                    "content": [event_row("e2", "/b", "UNTRUSTED")],
                    "cursor": null,
                    "more": false
                })),
            );
        let ui = RecordingShell::new();
        let page = EventPage::new(
            client_for(transport.clone()),
            ui.shell(),
            ChipTables::default(),
            None,
            None,
        );
        page.load().await;
        page.load_more().await;
        page.load_more().await;

        let requests = transport.requests_to(QUERY);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].query_value("cursor"), Some("c1"));
        assert_eq!(page.store().read(|s| s.entity.items.len()), 2);
    }
}
