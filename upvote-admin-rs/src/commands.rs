//! Drives the page controllers from the command line.

use std::cell::{Cell, RefCell};
use std::io::BufRead;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::cli::{BlockableCommands, Commands, EventLink, HostAction, MyHostAction};
use crate::client::UpvoteClient;
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::models::{ClientMode, Host};
use crate::output::{print_action, print_one, print_out};
use crate::pages::event_page::EventPage;
use crate::pages::host_list::{self, HostListPage};
use crate::pages::host_page::HostPage;
use crate::resources::Params;
use crate::routes::Route;
use crate::shell::{ErrorNotifier, Navigator, PageTitle, Prompt, PromptRequest, Shell};

/// Shell for a terminal session: routes become console URLs, errors go to
/// the log, and prompts read a line from stdin unless an answer was given.
pub struct TerminalShell {
    console_base_url: String,
    answer: RefCell<Option<String>>,
    routes: RefCell<Vec<String>>,
    failures: Cell<usize>,
}

impl TerminalShell {
    pub fn new(cfg: &AppConfig) -> Rc<Self> {
        Rc::new(Self {
            console_base_url: cfg.console_url(""),
            answer: RefCell::new(None),
            routes: RefCell::new(Vec::new()),
            failures: Cell::new(0),
        })
    }

    pub fn shell(self: &Rc<Self>) -> Shell {
        Shell {
            navigator: self.clone(),
            notifier: self.clone(),
            title: self.clone(),
            prompt: self.clone(),
        }
    }

    fn preset_answer(&self, answer: Option<String>) {
        *self.answer.borrow_mut() = answer;
    }

    fn take_routes(&self) -> Vec<String> {
        self.routes.take()
    }

    fn failures(&self) -> usize {
        self.failures.get()
    }

    fn record(&self, route: &Route) {
        let url = format!("{}{route}", self.console_base_url);
        info!("route: {url}");
        self.routes.borrow_mut().push(url);
    }
}

impl Navigator for TerminalShell {
    fn navigate(&self, route: &Route) {
        self.record(route);
    }

    fn open_in_new_window(&self, route: &Route) {
        self.record(route);
    }
}

impl ErrorNotifier for TerminalShell {
    fn notify(&self, err: &ApiError) {
        error!("{err}");
        self.failures.set(self.failures.get() + 1);
    }
}

impl PageTitle for TerminalShell {
    fn set_title(&self, title: &str) {
        debug!("page: {title}");
    }
}

#[async_trait(?Send)]
impl Prompt for TerminalShell {
    async fn prompt(&self, request: PromptRequest) -> Option<String> {
        if let Some(answer) = self.answer.borrow_mut().take() {
            return Some(answer);
        }
        eprintln!("{}: {} [{}]", request.title, request.text, request.initial_value);
        tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            match std::io::stdin().lock().read_line(&mut line) {
                Ok(0) | Err(_) => None,
                Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
            }
        })
        .await
        .ok()
        .flatten()
    }
}

#[derive(Debug, Serialize)]
struct EventRow {
    id: String,
    host_id: Option<String>,
    file_path: Option<String>,
    executing_user: Option<String>,
    chip: Option<String>,
    chip_class: Option<String>,
}

#[derive(Debug, Serialize)]
struct HostRow {
    #[serde(flatten)]
    host: Host,
    stale: bool,
    exemption_visible: bool,
    exemption_bad: bool,
    exemption_renewable: bool,
}

pub async fn run(
    command: Commands,
    json: bool,
    cfg: &AppConfig,
    client: Arc<UpvoteClient>,
) -> Result<()> {
    let terminal = TerminalShell::new(cfg);
    let shell = terminal.shell();

    match command {
        Commands::Events { host_id, all } => {
            let page = EventPage::new(client, shell, cfg.chip_tables(), None, host_id);
            page.init().await;
            while all && page.store().read(|s| s.entity.more) && terminal.failures() == 0 {
                page.load_more().await;
            }
            ensure_clean(&terminal)?;
            let rows: Vec<EventRow> = page
                .store()
                .read(|s| s.entity.items.clone())
                .iter()
                .map(|entry| {
                    let chip = page.display_state(entry);
                    EventRow {
                        id: entry.event.id.clone(),
                        host_id: entry.event.host_id.clone(),
                        file_path: entry.event.file_path.clone(),
                        executing_user: entry.event.executing_user.clone(),
                        chip: chip.as_ref().map(|c| c.label.clone()),
                        chip_class: chip.and_then(|c| c.class),
                    }
                })
                .collect();
            print_out(json, &rows, |row| {
                format!(
                    "{}\t{}\t{}\t{}",
                    row.id,
                    row.host_id.as_deref().unwrap_or("-"),
                    row.chip.as_deref().unwrap_or("-"),
                    row.file_path.as_deref().unwrap_or("-"),
                )
            })
        }
        Commands::Event { id, open } => {
            let page = EventPage::new(client, shell, cfg.chip_tables(), Some(id), None);
            page.init().await;
            ensure_clean(&terminal)?;
            let card = page
                .store()
                .read(|s| s.entity.card.clone())
                .context("event not loaded")?;
            match open {
                Some(EventLink::Blockable) => page.go_to_blockable(),
                Some(EventLink::Host) => page.go_to_host(),
                None => {
                    let chip = page.display_state(&card).map(|c| c.label);
                    return print_one(json, card, |card| {
                        format!(
                            "{}\t{}\t{}",
                            card.event.id,
                            chip.as_deref().unwrap_or("-"),
                            card.event.file_path.as_deref().unwrap_or("-"),
                        )
                    });
                }
            }
            print_routes(json, &terminal)
        }
        Commands::Hosts { platform, all } => {
            let page = HostPage::new(client, shell, None, platform.as_deref());
            page.init().await;
            while all && page.store().read(|s| s.entity.more) && terminal.failures() == 0 {
                page.load_more().await;
            }
            ensure_clean(&terminal)?;
            let hosts = page.store().read(|s| s.entity.items.clone());
            print_out(json, &hosts, host_line)
        }
        Commands::Host { id, action } => {
            let page = HostPage::new(client, shell, Some(id.clone()), None);
            page.init().await;
            ensure_clean(&terminal)?;
            let host = page.host(&id).with_context(|| format!("host {id} not loaded"))?;
            let Some(action) = action else {
                return print_one(json, host, host_line);
            };
            host_action(&page, &terminal, &host, action, json).await
        }
        Commands::MyHosts { show_hidden } => {
            let page = HostListPage::new(client, shell);
            page.init().await;
            ensure_clean(&terminal)?;
            page.set_show_hidden(show_hidden);
            let rows: Vec<HostRow> = page
                .visible_hosts()
                .into_iter()
                .map(|host| HostRow {
                    stale: host_list::is_stale(&host),
                    exemption_visible: host_list::is_exemption_status_visible(&host),
                    exemption_bad: host_list::is_exemption_in_bad_state(&host),
                    exemption_renewable: host_list::is_exemption_renewable(&host),
                    host,
                })
                .collect();
            print_out(json, &rows, |row| {
                let mut line = host_line(&row.host);
                if row.stale {
                    line.push_str("\tstale");
                }
                if host_list::is_mode_locked(&row.host) {
                    line.push_str("\tlocked");
                }
                if row.exemption_visible {
                    if let Some(exemption) = &row.host.exemption {
                        line.push_str("\texemption=");
                        line.push_str(exemption.state.as_str());
                    }
                }
                line
            })
        }
        Commands::MyHost { id, action } => {
            let page = HostListPage::new(client, shell);
            page.init().await;
            ensure_clean(&terminal)?;
            match action {
                MyHostAction::ToggleHidden => {
                    let ok = page.toggle_visibility(&id).await;
                    let hidden = page.host(&id).is_some_and(|h| h.hidden);
                    finish(json, &terminal, ok, &format!("host {id} hidden={hidden}"))
                }
                MyHostAction::CancelExemption => {
                    let ok = page.cancel_exemption(&id).await;
                    finish(json, &terminal, ok, &format!("exemption for {id} cancelled"))
                }
                MyHostAction::RequestException => {
                    page.go_to_request_page(&id);
                    print_routes(json, &terminal)
                }
                MyHostAction::Blockables => {
                    page.go_to_blockables_page(&id);
                    print_routes(json, &terminal)
                }
            }
        }
        Commands::Blockable { command } => blockable_command(&client, cfg, command, json).await,
    }
}

async fn host_action(
    page: &HostPage,
    terminal: &TerminalShell,
    host: &Host,
    action: HostAction,
    json: bool,
) -> Result<()> {
    let id = host.id.as_str();
    let ok = match action {
        HostAction::Monitor => {
            if !page.can_enable_monitor_mode(host) {
                bail!("monitor mode cannot be enabled on {id}");
            }
            page.enable_monitor_mode(id).await
        }
        HostAction::Lockdown => {
            if !page.can_enable_lockdown_mode(host) {
                bail!("lockdown mode cannot be enabled on {id}");
            }
            page.enable_lockdown_mode(id).await
        }
        HostAction::ToggleLock => {
            if !page.can_toggle_client_mode_lock(host) {
                bail!("client mode lock cannot be changed on {id}");
            }
            page.toggle_client_mode_lock(id).await
        }
        HostAction::ToggleTransitive => page.toggle_transitive_whitelisting(id).await,
        HostAction::RequestLogs => page.request_logs(id).await,
        HostAction::WhitelistRegex { value } => {
            terminal.preset_answer(value);
            page.change_whitelist_regex(id).await
        }
        HostAction::BlacklistRegex { value } => {
            terminal.preset_answer(value);
            page.change_blacklist_regex(id).await
        }
        HostAction::Events => {
            page.go_to_host_events(id);
            return print_routes(json, terminal);
        }
        HostAction::Blockables => {
            page.go_to_blockables_page(id);
            return print_routes(json, terminal);
        }
    };

    let updated = page.host(id).unwrap_or_else(|| host.clone());
    finish(json, terminal, ok, &host_line(&updated))
}

async fn blockable_command(
    client: &UpvoteClient,
    cfg: &AppConfig,
    command: BlockableCommands,
    json: bool,
) -> Result<()> {
    match command {
        BlockableCommands::Get { id } => {
            let blockable = client.get_blockable(&id).await?;
            print_one(json, blockable, |b| {
                format!(
                    "{}\t{}\t{}",
                    b.id,
                    b.state.as_str(),
                    b.file_name.as_deref().unwrap_or("-")
                )
            })
        }
        BlockableCommands::List {
            platform,
            blockable_type,
        } => {
            let platform = platform.unwrap_or_else(|| cfg.default_platform.clone());
            let page = client
                .query_blockables(&platform, &blockable_type, &Params::new())
                .await?;
            print_out(json, &page.content, |b| {
                format!(
                    "{}\t{}\t{}",
                    b.id,
                    b.state.as_str(),
                    b.file_name.as_deref().unwrap_or("-")
                )
            })
        }
        BlockableCommands::Flag { id, clear } => {
            let mut blockable = client.get_blockable(&id).await?;
            blockable.flagged = !clear;
            client.save_blockable(&blockable).await?;
            print_action(json, true, &format!("{id} flagged={}", blockable.flagged))
        }
        BlockableCommands::Reset { id } => {
            client.reset_blockable(&id).await?;
            print_action(json, true, &format!("{id} reset"))
        }
        BlockableCommands::MarkCompiler { id, clear } => {
            let mut blockable = client.get_blockable(&id).await?;
            blockable.is_compiler = Some(!clear);
            client.update_blockable(&blockable).await?;
            print_action(json, true, &format!("{id} compiler={}", !clear))
        }
    }
}

fn host_line(host: &Host) -> String {
    format!(
        "{}\t{}\t{}\tlock={}",
        host.id,
        host.hostname,
        host.client_mode.map(ClientMode::as_str).unwrap_or("-"),
        host.client_mode_lock,
    )
}

fn ensure_clean(terminal: &TerminalShell) -> Result<()> {
    match terminal.failures() {
        0 => Ok(()),
        n => bail!("{n} request(s) failed"),
    }
}

fn finish(json: bool, terminal: &TerminalShell, ok: bool, message: &str) -> Result<()> {
    print_action(json, ok, message)?;
    ensure_clean(terminal)
}

fn print_routes(json: bool, terminal: &TerminalShell) -> Result<()> {
    print_out(json, &terminal.take_routes(), |url| url.clone())
}
