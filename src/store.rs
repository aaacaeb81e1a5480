//! Durable session store
//!
//! An append-only record of conversation turns keyed by session, persisted
//! as one human-readable JSON document. The whole document is read once at
//! startup and rewritten in full on every recorded turn; turn volume per
//! session is small, so wholesale rewrite beats incremental bookkeeping.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::extract::ExtractedInfo;
use crate::{Error, Result};

/// One completed user/assistant exchange with its extracted facts
///
/// Turns are never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// RFC 3339 timestamp of when the turn was recorded
    pub timestamp: String,
    /// What the user said
    pub user_text: String,
    /// What the assistant replied
    pub assistant_text: String,
    /// Extracted facts, category to ordered matches
    pub extracted_info: ExtractedInfo,
}

/// A search hit: the turn plus where it lives
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Session the turn belongs to
    pub session_id: String,
    /// Zero-based position within the session
    pub turn_index: usize,
    /// The matching turn
    pub turn: ConversationTurn,
}

/// The persisted document: every session, every turn
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct StoreDocument {
    sessions: BTreeMap<String, Vec<ConversationTurn>>,
}

/// File-backed store of per-session conversation turns
pub struct SessionStore {
    path: PathBuf,
    document: StoreDocument,
    current_session: String,
}

impl SessionStore {
    /// Open (or create) a store at `path` and start a fresh session
    ///
    /// A missing or corrupt file yields an empty store: losing history is
    /// recoverable, refusing to start is not.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let document = load_document(&path);

        let mut store = Self {
            path,
            document,
            current_session: String::new(),
        };
        store.current_session = store.allocate_session_id();
        store
    }

    /// The session id turns are currently recorded under
    #[must_use]
    pub fn current_session(&self) -> &str {
        &self.current_session
    }

    /// All session ids present in the store, in order
    #[must_use]
    pub fn session_ids(&self) -> Vec<&str> {
        self.document.sessions.keys().map(String::as_str).collect()
    }

    /// Append a turn to the current session and persist the store
    ///
    /// Persistence is synchronous: the document is fully rewritten before
    /// this returns. A write failure is logged and the turn is kept in
    /// memory, so session summaries still see it.
    pub fn record_turn(
        &mut self,
        user_text: &str,
        assistant_text: &str,
        extracted_info: ExtractedInfo,
    ) -> &ConversationTurn {
        let turn = ConversationTurn {
            timestamp: Local::now().to_rfc3339(),
            user_text: user_text.to_string(),
            assistant_text: assistant_text.to_string(),
            extracted_info,
        };

        let turns = self
            .document
            .sessions
            .entry(self.current_session.clone())
            .or_default();
        turns.push(turn);

        if let Err(e) = self.persist() {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to persist session store, turn held in memory only"
            );
        }

        self.document.sessions[&self.current_session]
            .last()
            .unwrap_or_else(|| unreachable!("turn was just pushed"))
    }

    /// Merge a session's extracted info, deduplicated in first-seen order
    ///
    /// Turns are merged chronologically, and within each category the
    /// first occurrence of a value wins its position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the session id is absent
    pub fn summarize(&self, session_id: &str) -> Result<ExtractedInfo> {
        let turns = self
            .document
            .sessions
            .get(session_id)
            .ok_or_else(|| Error::NotFound(format!("session {session_id}")))?;

        let mut summary = ExtractedInfo::new();
        for turn in turns {
            for (category, values) in &turn.extracted_info {
                let merged = summary.entry(category.clone()).or_default();
                for value in values {
                    if !merged.contains(value) {
                        merged.push(value.clone());
                    }
                }
            }
        }

        Ok(summary)
    }

    /// Find turns whose user or assistant text contains `query`
    ///
    /// Matching is a case-insensitive substring test. Hits are ordered by
    /// session id, then by turn order within the session.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<SearchHit> {
        let needle = query.to_lowercase();
        let mut hits = Vec::new();

        for (session_id, turns) in &self.document.sessions {
            for (turn_index, turn) in turns.iter().enumerate() {
                if turn.user_text.to_lowercase().contains(&needle)
                    || turn.assistant_text.to_lowercase().contains(&needle)
                {
                    hits.push(SearchHit {
                        session_id: session_id.clone(),
                        turn_index,
                        turn: turn.clone(),
                    });
                }
            }
        }

        hits
    }

    /// Allocate a fresh session id and make it current
    ///
    /// Prior sessions are kept.
    pub fn new_session(&mut self) -> String {
        self.current_session = self.allocate_session_id();
        self.current_session.clone()
    }

    /// Time-derived session id, suffixed on collision so ids stay unique
    /// within the store
    ///
    /// The suffix is zero-padded so colliding ids sort in allocation
    /// order; "most recent session" lookups rely on that.
    fn allocate_session_id(&self) -> String {
        let base = Local::now().format("%Y%m%d_%H%M%S").to_string();
        if !self.document.sessions.contains_key(&base) {
            return base;
        }

        let mut n = 2;
        loop {
            let candidate = format!("{base}_{n:02}");
            if !self.document.sessions.contains_key(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Rewrite the full document to disk and flush it
    ///
    /// The document is written to a sibling temp file and renamed over
    /// the target, so a crash mid-write never clobbers the previous
    /// version.
    fn persist(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.document)?;
        let tmp = self.path.with_extension("json.tmp");

        let mut file = std::fs::File::create(&tmp)
            .map_err(|e| Error::Storage(format!("create {}: {e}", tmp.display())))?;
        file.write_all(json.as_bytes())
            .map_err(|e| Error::Storage(format!("write {}: {e}", tmp.display())))?;
        file.sync_all()
            .map_err(|e| Error::Storage(format!("sync {}: {e}", tmp.display())))?;

        std::fs::rename(&tmp, &self.path)
            .map_err(|e| Error::Storage(format!("rename {}: {e}", self.path.display())))?;
        Ok(())
    }
}

/// Read the document at `path`, tolerating absence and corruption
fn load_document(path: &Path) -> StoreDocument {
    if !path.exists() {
        return StoreDocument::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(document) => {
                tracing::debug!(path = %path.display(), "loaded session store");
                document
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "corrupt session store, starting empty"
                );
                StoreDocument::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "unreadable session store, starting empty"
            );
            StoreDocument::default()
        }
    }
}
