use std::collections::{BTreeMap, HashMap};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::message::{Density, FactValue, LoadError, Message};

/// One entry of a context-expanded window.
#[derive(Debug, Clone, Serialize)]
pub struct WindowEntry {
    pub message: Message,
    /// True when this line was directly requested; false for context filler.
    pub is_match: bool,
}

/// Summary statistics for a loaded chatlog.
#[derive(Debug, Serialize)]
pub struct StoreStats {
    pub path: String,
    pub total_messages: usize,
    pub parse_failures: usize,
    pub last_line: u64,
    pub sender_counts: BTreeMap<String, usize>,
}

/// In-memory chatlog snapshot: parsed messages addressable by physical line
/// number, plus a sender index for person-scoped queries.
///
/// Built once per log file and immutable afterwards.
#[derive(Debug)]
pub struct MessageStore {
    path: PathBuf,
    messages: Vec<Message>,
    by_line: HashMap<u64, usize>,
    sender_index: HashMap<String, Vec<u64>>,
    last_line: u64,
    parse_failures: usize,
}

impl MessageStore {
    /// Parse a JSONL chatlog. Each non-empty line must be one JSON record
    /// `{content, timestamp, metadata: {topics, sentiment, facts,
    /// information_density}}`. Malformed lines are skipped and counted.
    ///
    /// The only fatal failures are a missing file and an unreadable file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(LoadError::NotFound(path));
        }
        let file = std::fs::File::open(&path).map_err(|source| LoadError::Io {
            path: path.clone(),
            source,
        })?;

        let mut messages = Vec::new();
        let mut by_line = HashMap::new();
        let mut sender_index: HashMap<String, Vec<u64>> = HashMap::new();
        let mut last_line = 0u64;
        let mut parse_failures = 0usize;

        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line_num = idx as u64 + 1;
            let raw = match line {
                Ok(raw) => raw,
                Err(_) => {
                    parse_failures += 1;
                    last_line = line_num;
                    continue;
                }
            };
            last_line = line_num;
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }
            let message = match parse_record(line_num, trimmed) {
                Some(message) => message,
                None => {
                    parse_failures += 1;
                    continue;
                }
            };
            if !message.sender.is_empty() {
                sender_index
                    .entry(message.sender.clone())
                    .or_default()
                    .push(line_num);
            }
            by_line.insert(line_num, messages.len());
            messages.push(message);
        }

        tracing::info!(
            path = %path.display(),
            count = messages.len(),
            parse_failures,
            "chatlog loaded"
        );

        Ok(Self {
            path,
            messages,
            by_line,
            sender_index,
            last_line,
            parse_failures,
        })
    }

    /// Number of successfully parsed messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Highest physical line number seen in the file (including skipped lines).
    pub fn last_line(&self) -> u64 {
        self.last_line
    }

    /// Count of lines that failed to parse and were skipped.
    pub fn parse_failures(&self) -> usize {
        self.parse_failures
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fetch a message by its 1-indexed line number.
    pub fn get(&self, line: u64) -> Option<&Message> {
        self.by_line.get(&line).map(|&idx| &self.messages[idx])
    }

    /// Iterate all messages in file order.
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    /// Load the requested lines plus a symmetric context window around each.
    ///
    /// The window for line `n` is `[n - before, n + after]` clamped to
    /// `[1, last_line]`. Output is ascending by line, deduplicated, with
    /// `is_match` set only on directly requested lines. Lines in range that
    /// failed to parse simply do not appear.
    pub fn get_by_lines(&self, lines: &[u64], before: u64, after: u64) -> Vec<WindowEntry> {
        let requested: std::collections::HashSet<u64> = lines.iter().copied().collect();
        let mut wanted: Vec<u64> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for &line in lines {
            let start = line.saturating_sub(before).max(1);
            let end = line.saturating_add(after).min(self.last_line.max(1));
            for ln in start..=end {
                if seen.insert(ln) {
                    wanted.push(ln);
                }
            }
        }
        wanted.sort_unstable();

        wanted
            .into_iter()
            .filter_map(|ln| {
                self.get(ln).map(|message| WindowEntry {
                    message: message.clone(),
                    is_match: requested.contains(&ln),
                })
            })
            .collect()
    }

    /// Line numbers of messages whose sender contains `pattern`
    /// (case-insensitive substring). Sorted ascending.
    pub fn lines_by_sender(&self, pattern: &str) -> Vec<u64> {
        let needle = pattern.to_lowercase();
        let mut out: Vec<u64> = self
            .sender_index
            .iter()
            .filter(|(sender, _)| sender.to_lowercase().contains(&needle))
            .flat_map(|(_, lines)| lines.iter().copied())
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// All distinct sender names, sorted.
    pub fn senders(&self) -> Vec<String> {
        let mut out: Vec<String> = self.sender_index.keys().cloned().collect();
        out.sort();
        out
    }

    /// Linear case-insensitive substring scan over message bodies.
    /// When `target_sender` is given, only that sender's messages are scanned
    /// (sender matched by case-insensitive substring as well).
    pub fn search_content(&self, keyword: &str, target_sender: Option<&str>) -> Vec<u64> {
        let needle = keyword.to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let sender_needle = target_sender.map(|s| s.to_lowercase());
        self.messages
            .iter()
            .filter(|m| {
                if let Some(ref sn) = sender_needle {
                    if !m.sender.to_lowercase().contains(sn.as_str()) {
                        return false;
                    }
                }
                m.content.to_lowercase().contains(&needle)
            })
            .map(|m| m.line)
            .collect()
    }

    /// Sorted, deduplicated topic labels across all messages.
    pub fn unique_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .messages
            .iter()
            .flat_map(|m| m.topics.iter().cloned())
            .collect();
        topics.sort();
        topics.dedup();
        topics
    }

    pub fn stats(&self) -> StoreStats {
        let mut sender_counts = BTreeMap::new();
        for (sender, lines) in &self.sender_index {
            sender_counts.insert(sender.clone(), lines.len());
        }
        StoreStats {
            path: self.path.display().to_string(),
            total_messages: self.messages.len(),
            parse_failures: self.parse_failures,
            last_line: self.last_line,
            sender_counts,
        }
    }
}

/// Parse one JSONL record into a [`Message`]. Returns `None` on any shape
/// violation; the caller counts it as a parse failure.
fn parse_record(line: u64, raw: &str) -> Option<Message> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    let obj = value.as_object()?;

    let content = obj.get("content")?.as_str()?.to_string();
    let timestamp = obj
        .get("timestamp")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let metadata = obj.get("metadata").and_then(|v| v.as_object());

    let mut topics: Vec<String> = Vec::new();
    let mut sentiment = String::new();
    let mut facts = BTreeMap::new();
    let mut density = Density::Unknown;

    if let Some(meta) = metadata {
        if let Some(raw_topics) = meta.get("topics").and_then(|v| v.as_array()) {
            for t in raw_topics {
                if let Some(t) = t.as_str() {
                    let t = t.trim();
                    if !t.is_empty() && !topics.iter().any(|existing| existing == t) {
                        topics.push(t.to_string());
                    }
                }
            }
        }
        if let Some(s) = meta.get("sentiment").and_then(|v| v.as_str()) {
            sentiment = s.to_string();
        }
        if let Some(raw_facts) = meta.get("facts").and_then(|v| v.as_object()) {
            for (key, val) in raw_facts {
                if let Some(fv) = FactValue::from_json(val) {
                    facts.insert(key.clone(), fv);
                }
            }
        }
        if let Some(d) = meta.get("information_density").and_then(|v| v.as_str()) {
            density = Density::parse(d);
        }
    }

    let (sender, body) = Message::split_sender(&content);

    Some(Message {
        line,
        sender,
        body,
        content,
        timestamp,
        topics,
        sentiment,
        facts,
        density,
    })
}
