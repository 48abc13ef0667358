//! Bounded, type-aware views over a single key's value.

use crate::config::Settings;
use crate::connection::Handle;
use crate::cursor::ScanCursor;
use crate::error::{BrowserError, BrowserResult};
use crate::value_format;
use redis::Value;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    String,
    List,
    Hash,
    Set,
    SortedSet,
}

impl KeyKind {
    /// Maps a TYPE reply. `none` means the key is absent.
    pub fn from_type_reply(key: &str, type_name: &str) -> BrowserResult<Self> {
        match type_name.trim().to_ascii_lowercase().as_str() {
            "string" => Ok(KeyKind::String),
            "list" => Ok(KeyKind::List),
            "hash" => Ok(KeyKind::Hash),
            "set" => Ok(KeyKind::Set),
            "zset" => Ok(KeyKind::SortedSet),
            "none" => Err(BrowserError::NotFound(key.to_string())),
            other => Err(BrowserError::UnsupportedType {
                key: key.to_string(),
                type_name: other.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyKind::String => "string",
            KeyKind::List => "list",
            KeyKind::Hash => "hash",
            KeyKind::Set => "set",
            KeyKind::SortedSet => "zset",
        }
    }

    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            KeyKind::String | KeyKind::List | KeyKind::Set => &["value"],
            KeyKind::Hash | KeyKind::SortedSet => &["key", "value"],
        }
    }

    fn scan_command(&self) -> Option<&'static str> {
        match self {
            KeyKind::Hash => Some("HSCAN"),
            KeyKind::Set => Some("SSCAN"),
            KeyKind::SortedSet => Some("ZSCAN"),
            KeyKind::String | KeyKind::List => None,
        }
    }

    fn length_command(&self) -> Option<&'static str> {
        match self {
            KeyKind::List => Some("LLEN"),
            KeyKind::Hash => Some("HLEN"),
            KeyKind::Set => Some("SCARD"),
            KeyKind::SortedSet => Some("ZCARD"),
            KeyKind::String => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDescriptor {
    pub name: String,
    pub kind: KeyKind,
    /// Element count reported by the store when the key was loaded.
    pub length: u64,
}

/// What a row points at in the store, captured when the row was read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    /// List element: absolute index plus the element value at load time.
    Index { index: usize, value: Vec<u8> },
    /// Hash field, set member or sorted-set member.
    Member(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub key: Option<String>,
    pub value: String,
}

impl Row {
    fn value(value: String) -> Self {
        Row { key: None, value }
    }

    fn pair(key: String, value: String) -> Self {
        Row {
            key: Some(key),
            value,
        }
    }

    /// Cells in column order.
    pub fn cells(&self) -> Vec<&str> {
        match &self.key {
            Some(key) => vec![key.as_str(), self.value.as_str()],
            None => vec![self.value.as_str()],
        }
    }
}

/// A fixed-size page of rows with the identity of each row alongside.
/// String windows carry a single row and no identities.
#[derive(Debug, Clone, PartialEq)]
pub struct RowWindow {
    pub kind: KeyKind,
    pub rows: Vec<Row>,
    pub identities: Vec<Identity>,
}

impl RowWindow {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn identity(&self, row: usize) -> Option<&Identity> {
        self.identities.get(row)
    }

    pub fn columns(&self) -> &'static [&'static str] {
        self.kind.columns()
    }
}

struct WindowBuilder {
    limit: usize,
    rows: Vec<Row>,
    identities: Vec<Identity>,
    seen: HashSet<Identity>,
}

impl WindowBuilder {
    fn new(limit: usize) -> Self {
        WindowBuilder {
            limit,
            rows: Vec::new(),
            identities: Vec::new(),
            seen: HashSet::new(),
        }
    }

    fn is_full(&self) -> bool {
        self.rows.len() >= self.limit
    }

    /// Takes entries until the window is full. Repeated identities are skipped.
    fn absorb(&mut self, entries: Vec<(Row, Identity)>) {
        for (row, identity) in entries {
            if self.is_full() {
                break;
            }
            if self.seen.insert(identity.clone()) {
                self.rows.push(row);
                self.identities.push(identity);
            }
        }
    }

    fn finish(self, kind: KeyKind) -> RowWindow {
        RowWindow {
            kind,
            rows: self.rows,
            identities: self.identities,
        }
    }
}

fn bytes_of(command: &'static str, value: &Value) -> BrowserResult<Vec<u8>> {
    value_format::value_to_bytes(value).ok_or_else(|| BrowserError::MalformedReply {
        command,
        detail: format!("{:?}", value),
    })
}

fn decode_list_page(start: usize, page: Vec<Value>) -> BrowserResult<Vec<(Row, Identity)>> {
    page.iter()
        .enumerate()
        .map(|(offset, entry)| {
            let value = bytes_of("LRANGE", entry)?;
            Ok((
                Row::value(value_format::format_bytes_inline(&value)),
                Identity::Index {
                    index: start + offset,
                    value,
                },
            ))
        })
        .collect()
}

fn decode_member_batch(kind: KeyKind, batch: Vec<Value>) -> BrowserResult<Vec<(Row, Identity)>> {
    match kind {
        KeyKind::Set => batch
            .iter()
            .map(|entry| {
                let member = bytes_of("SSCAN", entry)?;
                Ok((
                    Row::value(value_format::format_bytes_inline(&member)),
                    Identity::Member(member),
                ))
            })
            .collect(),
        KeyKind::Hash => pairs("HSCAN", &batch)?
            .map(|(field, value)| {
                let field = bytes_of("HSCAN", field)?;
                let value = bytes_of("HSCAN", value)?;
                Ok((
                    Row::pair(
                        value_format::format_bytes_inline(&field),
                        value_format::format_bytes_inline(&value),
                    ),
                    Identity::Member(field),
                ))
            })
            .collect(),
        KeyKind::SortedSet => pairs("ZSCAN", &batch)?
            .map(|(member, score)| {
                let member = bytes_of("ZSCAN", member)?;
                let score = value_format::value_to_f64(score).ok_or_else(|| {
                    BrowserError::MalformedReply {
                        command: "ZSCAN",
                        detail: format!(
                            "score {:?} for member '{}'",
                            score,
                            value_format::format_bytes_inline(&member)
                        ),
                    }
                })?;
                Ok((
                    Row::pair(
                        value_format::format_bytes_inline(&member),
                        value_format::format_score(score),
                    ),
                    Identity::Member(member),
                ))
            })
            .collect(),
        KeyKind::String | KeyKind::List => Err(BrowserError::TypeMismatch {
            operation: "member scan",
            kind: kind.as_str(),
        }),
    }
}

fn pairs<'a>(
    command: &'static str,
    batch: &'a [Value],
) -> BrowserResult<impl Iterator<Item = (&'a Value, &'a Value)>> {
    if batch.len() % 2 != 0 {
        return Err(BrowserError::MalformedReply {
            command,
            detail: format!("odd number of entries ({})", batch.len()),
        });
    }
    Ok(batch.chunks(2).map(|chunk| (&chunk[0], &chunk[1])))
}

/// Upper bound on rows shown for one key, whatever the settings ask for.
pub const MAX_WINDOW: usize = 100;

/// Reads key metadata and bounded windows of key values.
#[derive(Debug, Clone)]
pub struct CollectionReader {
    window_size: usize,
    list_page_size: usize,
}

impl CollectionReader {
    pub fn new(settings: &Settings) -> Self {
        CollectionReader {
            window_size: settings.window_size.clamp(1, MAX_WINDOW),
            list_page_size: settings.list_page_size.max(1),
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Resolves a key's type and authoritative length. Absent keys fail with
    /// `NotFound` before any length query is sent.
    pub async fn load(&self, handle: &mut Handle, name: &str) -> BrowserResult<KeyDescriptor> {
        let type_name = handle.query::<String>(redis::cmd("TYPE").arg(name)).await?;
        let kind = KeyKind::from_type_reply(name, &type_name)?;
        let length = self.length_of(handle, name, kind).await?;
        log::debug!("Loaded '{}' ({}, length {})", name, kind.as_str(), length);
        Ok(KeyDescriptor {
            name: name.to_string(),
            kind,
            length,
        })
    }

    pub async fn length(&self, handle: &mut Handle, descriptor: &KeyDescriptor) -> BrowserResult<u64> {
        self.length_of(handle, &descriptor.name, descriptor.kind).await
    }

    async fn length_of(&self, handle: &mut Handle, name: &str, kind: KeyKind) -> BrowserResult<u64> {
        match kind.length_command() {
            Some(command) => handle.query::<u64>(redis::cmd(command).arg(name)).await,
            None => Ok(1),
        }
    }

    pub async fn window(&self, handle: &mut Handle, descriptor: &KeyDescriptor) -> BrowserResult<RowWindow> {
        match descriptor.kind {
            KeyKind::String => self.string_window(handle, &descriptor.name).await,
            KeyKind::List => self.list_window(handle, &descriptor.name).await,
            kind => self.member_window(handle, &descriptor.name, kind).await,
        }
    }

    async fn string_window(&self, handle: &mut Handle, name: &str) -> BrowserResult<RowWindow> {
        let value = handle
            .query::<Option<Vec<u8>>>(redis::cmd("GET").arg(name))
            .await?
            .ok_or_else(|| BrowserError::NotFound(name.to_string()))?;
        Ok(RowWindow {
            kind: KeyKind::String,
            rows: vec![Row::value(value_format::format_bytes_block(&value))],
            identities: Vec::new(),
        })
    }

    async fn list_window(&self, handle: &mut Handle, name: &str) -> BrowserResult<RowWindow> {
        let mut builder = WindowBuilder::new(self.window_size);
        let mut start = 0usize;
        while !builder.is_full() {
            let stop = start + self.list_page_size - 1;
            let page = handle
                .query::<Vec<Value>>(redis::cmd("LRANGE").arg(name).arg(start).arg(stop))
                .await?;
            let fetched = page.len();
            log::debug!("LRANGE '{}' {}..={} returned {}", name, start, stop, fetched);
            builder.absorb(decode_list_page(start, page)?);
            if fetched < self.list_page_size {
                break;
            }
            start += self.list_page_size;
        }
        Ok(builder.finish(KeyKind::List))
    }

    async fn member_window(&self, handle: &mut Handle, name: &str, kind: KeyKind) -> BrowserResult<RowWindow> {
        let command = kind.scan_command().ok_or(BrowserError::TypeMismatch {
            operation: "member scan",
            kind: kind.as_str(),
        })?;
        let mut builder = WindowBuilder::new(self.window_size);
        let mut cursor = ScanCursor::members(command, name, self.window_size);
        while !builder.is_full() {
            let Some(batch) = cursor.next_batch(handle).await? else {
                break;
            };
            builder.absorb(decode_member_batch(kind, batch)?);
        }
        Ok(builder.finish(kind))
    }
}
