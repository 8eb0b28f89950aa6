use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Permission a user needs before host mode/lock edits are offered.
pub const EDIT_HOSTS: &str = "EDIT_HOSTS";

const SANTA_HOST_CLASS: &str = "SantaHost";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockableState {
    #[default]
    Untrusted,
    ApprovedForLocalWhitelisting,
    Limited,
    GloballyWhitelisted,
    Suspect,
    Banned,
    SilentBanned,
    Pending,
    #[serde(other)]
    Unknown,
}

impl BlockableState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Untrusted => "UNTRUSTED",
            Self::ApprovedForLocalWhitelisting => "APPROVED_FOR_LOCAL_WHITELISTING",
            Self::Limited => "LIMITED",
            Self::GloballyWhitelisted => "GLOBALLY_WHITELISTED",
            Self::Suspect => "SUSPECT",
            Self::Banned => "BANNED",
            Self::SilentBanned => "SILENT_BANNED",
            Self::Pending => "PENDING",
            Self::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMode {
    Monitor,
    Lockdown,
}

impl ClientMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Monitor => "MONITOR",
            Self::Lockdown => "LOCKDOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExemptionState {
    Requested,
    Pending,
    Approved,
    Denied,
    Escalated,
    Cancelled,
    Revoked,
    Expired,
    #[serde(other)]
    Unknown,
}

impl ExemptionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "REQUESTED",
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Denied => "DENIED",
            Self::Escalated => "ESCALATED",
            Self::Cancelled => "CANCELLED",
            Self::Revoked => "REVOKED",
            Self::Expired => "EXPIRED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Blockable {
    pub id: String,
    #[serde(rename = "type", default)]
    pub blockable_type: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub flagged: bool,
    #[serde(default)]
    pub is_compiler: Option<bool>,
    pub state: BlockableState,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub state: BlockableState,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    #[serde(default)]
    pub was_yes_vote: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub blockable_id: Option<String>,
    #[serde(default)]
    pub host_id: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub executing_user: Option<String>,
    #[serde(default)]
    pub occurred_dt: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The `cert` slot of a context row. Bundle events carry the bundle's
/// signing-cert key instead of an embedded certificate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CertRef {
    Entity(Certificate),
    Key(String),
}

impl CertRef {
    pub fn entity(&self) -> Option<&Certificate> {
        match self {
            Self::Entity(cert) => Some(cert),
            Self::Key(_) => None,
        }
    }
}

/// An event as returned by the event endpoints with `withContext=true`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EventWithContext {
    pub event: Event,
    #[serde(default)]
    pub blockable: Option<Blockable>,
    #[serde(default)]
    pub cert: Option<CertRef>,
    #[serde(default)]
    pub host: Option<Host>,
    #[serde(default)]
    pub vote: Option<Vote>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Exemption {
    pub state: ExemptionState,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    pub id: String,
    #[serde(default)]
    pub hostname: String,
    /// Polymodel class chain reported by the backend, e.g. `["Host", "SantaHost"]`.
    #[serde(rename = "class_", default)]
    pub class_chain: Vec<String>,
    #[serde(default)]
    pub primary_user: Option<String>,
    #[serde(default)]
    pub serial_num: Option<String>,
    #[serde(default)]
    pub santa_version: Option<String>,
    #[serde(default)]
    pub client_mode: Option<ClientMode>,
    #[serde(default)]
    pub client_mode_lock: bool,
    #[serde(default)]
    pub should_upload_logs: bool,
    #[serde(default)]
    pub directory_whitelist_regex: Option<String>,
    #[serde(default)]
    pub directory_blacklist_regex: Option<String>,
    #[serde(default)]
    pub transitive_whitelisting_enabled: bool,
    #[serde(default)]
    pub rule_sync_dt: Option<String>,
    #[serde(default)]
    pub exemption: Option<Exemption>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Host {
    pub fn is_santa_host(&self) -> bool {
        self.class_chain.iter().any(|class| class == SANTA_HOST_CLASS)
    }

    pub fn is_in_lockdown(&self) -> bool {
        self.client_mode == Some(ClientMode::Lockdown)
    }

    /// Parsed `ruleSyncDt`. Naive timestamps are taken as UTC.
    pub fn last_rule_sync(&self) -> Option<DateTime<Utc>> {
        self.rule_sync_dt.as_deref().and_then(parse_backend_datetime)
    }
}

pub fn parse_backend_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

/// Global directory regexes, fetched one setting at a time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub santa_directory_whitelist_regex: String,
    pub santa_directory_blacklist_regex: String,
}

impl Settings {
    pub const WHITELIST_REGEX: &'static str = "santaDirectoryWhitelistRegex";
    pub const BLACKLIST_REGEX: &'static str = "santaDirectoryBlacklistRegex";
    pub const NAMES: [&'static str; 2] = [Self::WHITELIST_REGEX, Self::BLACKLIST_REGEX];

    /// Stores a fetched value under its setting name. Unknown names are ignored.
    pub fn apply(&mut self, name: &str, value: String) -> bool {
        match name {
            Self::WHITELIST_REGEX => self.santa_directory_whitelist_regex = value,
            Self::BLACKLIST_REGEX => self.santa_directory_blacklist_regex = value,
            _ => return false,
        }
        true
    }
}

/// One page of a query endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryPage<T> {
    #[serde(default = "Vec::new")]
    pub content: Vec<T>,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub more: bool,
}
