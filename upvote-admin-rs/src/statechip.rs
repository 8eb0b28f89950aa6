//! State chip derivation for blockables.
//!
//! A binary's chip is picked from layered rule sources. Binary-level state
//! outranks certificate state, which outranks host/global directory regexes,
//! which outrank the bare binary state.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::{BlockableState, Certificate, Event, Host, Settings, Vote};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UiDisplayState {
    Whitelisted,
    Available,
    GloballyWhitelisted,
    Banned,
    CertWhitelisted,
    CertBanned,
    RegexWhitelisted,
    RegexBanned,
    AwaitingVotes,
    Flagged,
}

impl UiDisplayState {
    pub const ALL: [UiDisplayState; 10] = [
        Self::Whitelisted,
        Self::Available,
        Self::GloballyWhitelisted,
        Self::Banned,
        Self::CertWhitelisted,
        Self::CertBanned,
        Self::RegexWhitelisted,
        Self::RegexBanned,
        Self::AwaitingVotes,
        Self::Flagged,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Whitelisted => "WHITELISTED",
            Self::Available => "AVAILABLE",
            Self::GloballyWhitelisted => "GLOBALLY_WHITELISTED",
            Self::Banned => "BANNED",
            Self::CertWhitelisted => "CERT_WHITELISTED",
            Self::CertBanned => "CERT_BANNED",
            Self::RegexWhitelisted => "REGEX_WHITELISTED",
            Self::RegexBanned => "REGEX_BANNED",
            Self::AwaitingVotes => "AWAITING_VOTES",
            Self::Flagged => "FLAGGED",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|state| state.as_str() == name)
    }
}

/// Compiled directory regexes keyed by their source text. A pattern that
/// fails to compile is kept as `None`, so it warns once per cache.
#[derive(Debug, Default)]
pub struct PatternCache {
    compiled: RefCell<HashMap<String, Option<Regex>>>,
}

impl PatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Distinct patterns seen so far, valid or not.
    pub fn len(&self) -> usize {
        self.compiled.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_match(&self, path: &str, pattern: &str) -> bool {
        if pattern.is_empty() {
            return false;
        }
        let mut compiled = self.compiled.borrow_mut();
        let entry = compiled
            .entry(pattern.to_string())
            .or_insert_with(|| match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(err) => {
                    warn!("ignoring invalid directory regex {pattern:?}: {err}");
                    None
                }
            });
        entry.as_ref().is_some_and(|re| re.is_match(path))
    }
}

/// Derives the chip for a binary. Returns `None` when no rule source applies.
///
/// Compiles the directory regexes afresh; callers resolving many rows should
/// hold a [`PatternCache`] and use [`resolve_display_state_with`].
pub fn resolve_display_state(
    blockable_state: Option<BlockableState>,
    vote: Option<&Vote>,
    cert: Option<&Certificate>,
    event: Option<&Event>,
    host: Option<&Host>,
    settings: Option<&Settings>,
) -> Option<UiDisplayState> {
    resolve_display_state_with(
        &PatternCache::new(),
        blockable_state,
        vote,
        cert,
        event,
        host,
        settings,
    )
}

pub fn resolve_display_state_with(
    patterns: &PatternCache,
    blockable_state: Option<BlockableState>,
    vote: Option<&Vote>,
    cert: Option<&Certificate>,
    event: Option<&Event>,
    host: Option<&Host>,
    settings: Option<&Settings>,
) -> Option<UiDisplayState> {
    match blockable_state {
        Some(BlockableState::ApprovedForLocalWhitelisting) => {
            return Some(if vote.is_some_and(|v| v.was_yes_vote) {
                UiDisplayState::Whitelisted
            } else {
                UiDisplayState::Available
            });
        }
        Some(BlockableState::Limited | BlockableState::GloballyWhitelisted) => {
            return Some(UiDisplayState::GloballyWhitelisted);
        }
        Some(BlockableState::SilentBanned | BlockableState::Banned) => {
            return Some(UiDisplayState::Banned);
        }
        _ => {}
    }

    if let Some(cert) = cert {
        match cert.state {
            BlockableState::GloballyWhitelisted => return Some(UiDisplayState::CertWhitelisted),
            BlockableState::Banned => return Some(UiDisplayState::CertBanned),
            _ => {}
        }
    }

    if let Some(path) = event
        .and_then(|e| e.file_path.as_deref())
        .filter(|path| !path.is_empty())
    {
        if let Some(state) = resolve_path_rules(patterns, path, host, settings) {
            return Some(state);
        }
    }

    // An event whose path matched nothing lands here too, same as no event.
    match blockable_state {
        Some(BlockableState::Untrusted) => Some(UiDisplayState::AwaitingVotes),
        Some(BlockableState::Suspect) => Some(UiDisplayState::Flagged),
        _ => None,
    }
}

fn resolve_path_rules(
    patterns: &PatternCache,
    path: &str,
    host: Option<&Host>,
    settings: Option<&Settings>,
) -> Option<UiDisplayState> {
    let host_blacklist = host.and_then(|h| h.directory_blacklist_regex.as_deref());
    let global_blacklist = settings.map(|s| s.santa_directory_blacklist_regex.as_str());
    let host_whitelist = host.and_then(|h| h.directory_whitelist_regex.as_deref());
    let global_whitelist = settings.map(|s| s.santa_directory_whitelist_regex.as_str());

    let ordered = [
        (host_blacklist, UiDisplayState::RegexBanned),
        (global_blacklist, UiDisplayState::RegexBanned),
        (host_whitelist, UiDisplayState::RegexWhitelisted),
        (global_whitelist, UiDisplayState::RegexWhitelisted),
    ];

    ordered
        .into_iter()
        .find(|(pattern, _)| pattern.is_some_and(|p| patterns.is_match(path, p)))
        .map(|(_, state)| state)
}

/// Label and style-class lookups for chips.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipTables {
    labels: BTreeMap<UiDisplayState, String>,
    classes: BTreeMap<UiDisplayState, String>,
}

impl Default for ChipTables {
    fn default() -> Self {
        let labels = [
            (UiDisplayState::Whitelisted, "Whitelisted"),
            (UiDisplayState::Available, "Available"),
            (UiDisplayState::GloballyWhitelisted, "Globally Whitelisted"),
            (UiDisplayState::Banned, "Banned"),
            (UiDisplayState::CertWhitelisted, "Cert Whitelisted"),
            (UiDisplayState::CertBanned, "Cert Banned"),
            (UiDisplayState::RegexWhitelisted, "Regex Whitelisted"),
            (UiDisplayState::RegexBanned, "Regex Banned"),
            (UiDisplayState::AwaitingVotes, "Awaiting Votes"),
            (UiDisplayState::Flagged, "Flagged"),
        ];
        let classes = [
            (UiDisplayState::Whitelisted, "state-whitelisted"),
            (UiDisplayState::Available, "state-available"),
            (UiDisplayState::GloballyWhitelisted, "state-whitelisted"),
            (UiDisplayState::Banned, "state-banned"),
            (UiDisplayState::CertWhitelisted, "state-whitelisted"),
            (UiDisplayState::CertBanned, "state-banned"),
            (UiDisplayState::RegexWhitelisted, "state-whitelisted"),
            (UiDisplayState::RegexBanned, "state-banned"),
            (UiDisplayState::AwaitingVotes, "state-pending"),
            (UiDisplayState::Flagged, "state-flagged"),
        ];

        Self {
            labels: labels
                .into_iter()
                .map(|(state, label)| (state, label.to_string()))
                .collect(),
            classes: classes
                .into_iter()
                .map(|(state, class)| (state, class.to_string()))
                .collect(),
        }
    }
}

impl ChipTables {
    /// Applies overrides keyed by chip name. An empty value removes the entry.
    /// Returns the keys that did not name a chip state.
    pub fn with_overrides(
        mut self,
        labels: &BTreeMap<String, String>,
        classes: &BTreeMap<String, String>,
    ) -> (Self, Vec<String>) {
        let mut unknown = Vec::new();
        for (table, overrides) in [(&mut self.labels, labels), (&mut self.classes, classes)] {
            for (key, value) in overrides {
                let Some(state) = UiDisplayState::from_name(key) else {
                    unknown.push(key.clone());
                    continue;
                };
                if value.is_empty() {
                    table.remove(&state);
                } else {
                    table.insert(state, value.clone());
                }
            }
        }
        (self, unknown)
    }

    /// Human label; unmapped states echo their raw name.
    pub fn label(&self, state: UiDisplayState) -> String {
        self.labels
            .get(&state)
            .cloned()
            .unwrap_or_else(|| state.as_str().to_string())
    }

    pub fn style_class(&self, state: UiDisplayState) -> Option<&str> {
        self.classes.get(&state).map(String::as_str)
    }
}
