use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "upvote-admin", version, about = "Upvote admin console")]
pub struct Cli {
    #[arg(long, global = true, help = "Output machine-readable JSON")]
    pub json: bool,
    #[arg(long, global = true, help = "Config file (default: search paths)")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Events with their state chips, optionally for one host.
    Events {
        #[arg(long)]
        host_id: Option<String>,
        #[arg(long, default_value_t = false, help = "Follow the cursor to the end")]
        all: bool,
    },
    Event {
        id: String,
        #[arg(long, value_enum)]
        open: Option<EventLink>,
    },
    /// Admin host listing for a platform.
    Hosts {
        #[arg(long)]
        platform: Option<String>,
        #[arg(long, default_value_t = false)]
        all: bool,
    },
    Host {
        id: String,
        #[command(subcommand)]
        action: Option<HostAction>,
    },
    /// Hosts associated with the signed-in user.
    MyHosts {
        #[arg(long, default_value_t = false)]
        show_hidden: bool,
    },
    MyHost {
        id: String,
        #[command(subcommand)]
        action: MyHostAction,
    },
    Blockable {
        #[command(subcommand)]
        command: BlockableCommands,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventLink {
    Blockable,
    Host,
}

#[derive(Subcommand, Debug)]
pub enum HostAction {
    Monitor,
    Lockdown,
    ToggleLock,
    ToggleTransitive,
    RequestLogs,
    WhitelistRegex {
        #[arg(help = "New regex; prompts on stdin when omitted")]
        value: Option<String>,
    },
    BlacklistRegex {
        #[arg(help = "New regex; prompts on stdin when omitted")]
        value: Option<String>,
    },
    Events,
    Blockables,
}

#[derive(Subcommand, Debug)]
pub enum MyHostAction {
    ToggleHidden,
    CancelExemption,
    RequestException,
    Blockables,
}

#[derive(Subcommand, Debug)]
pub enum BlockableCommands {
    Get {
        id: String,
    },
    List {
        #[arg(long)]
        platform: Option<String>,
        #[arg(long = "type", default_value = "binaries")]
        blockable_type: String,
    },
    Flag {
        id: String,
        #[arg(long, default_value_t = false)]
        clear: bool,
    },
    Reset {
        id: String,
    },
    MarkCompiler {
        id: String,
        #[arg(long, default_value_t = false)]
        clear: bool,
    },
}
