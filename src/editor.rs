//! Mutations of a loaded key, addressed through the identities captured at load time.

use crate::connection::Handle;
use crate::error::{BrowserError, BrowserResult};
use crate::reader::{CollectionReader, Identity, KeyDescriptor, KeyKind, RowWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Loaded,
    Edited,
    Deleted,
}

/// A loaded key, its window and the row identities, bound to one database.
#[derive(Debug, Clone)]
pub struct EditSession {
    db_index: u8,
    descriptor: KeyDescriptor,
    window: RowWindow,
    state: SessionState,
}

impl EditSession {
    pub fn new(db_index: u8, descriptor: KeyDescriptor, window: RowWindow) -> Self {
        EditSession {
            db_index,
            descriptor,
            window,
            state: SessionState::Loaded,
        }
    }

    pub fn db_index(&self) -> u8 {
        self.db_index
    }

    pub fn descriptor(&self) -> &KeyDescriptor {
        &self.descriptor
    }

    pub fn window(&self) -> &RowWindow {
        &self.window
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn identity(&self, row: usize) -> BrowserResult<&Identity> {
        self.window.identity(row).ok_or_else(|| {
            BrowserError::ValidationFailure(format!(
                "row {} is not part of the {}-row window of '{}'",
                row,
                self.window.len(),
                self.descriptor.name
            ))
        })
    }

    fn ensure_live(&self) -> BrowserResult<()> {
        if self.state == SessionState::Deleted {
            return Err(BrowserError::NotFound(self.descriptor.name.clone()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovalOutcome {
    /// Elements the store reported as removed.
    pub removed: u64,
    /// This removal took out the last element, so the key no longer exists.
    pub key_emptied: bool,
    /// The key is gone, whether emptied here or removed by another client
    /// before the call.
    pub key_gone: bool,
}

/// Classifies a removal from the number of elements removed and the length
/// left behind. Only a removal that actually removed something can empty a key.
fn settle_removal(removed: u64, remaining: u64) -> (RemovalOutcome, SessionState) {
    let key_gone = remaining == 0;
    let outcome = RemovalOutcome {
        removed,
        key_emptied: key_gone && removed > 0,
        key_gone,
    };
    let state = if key_gone {
        SessionState::Deleted
    } else {
        SessionState::Edited
    };
    (outcome, state)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NothingToDelete,
}

fn member_bytes<'a>(identity: &'a Identity, kind: KeyKind) -> BrowserResult<&'a [u8]> {
    match identity {
        Identity::Member(member) => Ok(member.as_slice()),
        Identity::Index { .. } => Err(BrowserError::TypeMismatch {
            operation: "member identity",
            kind: kind.as_str(),
        }),
    }
}

/// Command for a value replacement: `SET` for strings, `LSET` for lists.
pub fn plan_set_value(
    descriptor: &KeyDescriptor,
    identity: Option<&Identity>,
    new_value: &str,
) -> BrowserResult<redis::Cmd> {
    match descriptor.kind {
        KeyKind::String => {
            let mut cmd = redis::cmd("SET");
            cmd.arg(&descriptor.name).arg(new_value);
            Ok(cmd)
        }
        KeyKind::List => match identity {
            Some(Identity::Index { index, .. }) => {
                let mut cmd = redis::cmd("LSET");
                cmd.arg(&descriptor.name).arg(*index).arg(new_value);
                Ok(cmd)
            }
            Some(Identity::Member(_)) => Err(BrowserError::TypeMismatch {
                operation: "member identity",
                kind: "list",
            }),
            None => Err(BrowserError::ValidationFailure(
                "a row must be selected to set a list element".to_string(),
            )),
        },
        kind => Err(BrowserError::TypeMismatch {
            operation: "set value",
            kind: kind.as_str(),
        }),
    }
}

/// Remove-then-add pair replacing one member. Validated before anything is sent.
pub fn plan_upsert_member(
    descriptor: &KeyDescriptor,
    old: &Identity,
    new_member: &str,
    new_value: Option<&str>,
) -> BrowserResult<Vec<redis::Cmd>> {
    let kind = descriptor.kind;
    let key = &descriptor.name;
    let (mut remove, mut add) = match kind {
        KeyKind::Hash => (redis::cmd("HDEL"), redis::cmd("HSET")),
        KeyKind::Set => (redis::cmd("SREM"), redis::cmd("SADD")),
        KeyKind::SortedSet => (redis::cmd("ZREM"), redis::cmd("ZADD")),
        KeyKind::String | KeyKind::List => {
            return Err(BrowserError::TypeMismatch {
                operation: "upsert member",
                kind: kind.as_str(),
            })
        }
    };
    let old_member = member_bytes(old, kind)?;
    remove.arg(key).arg(old_member);

    match kind {
        KeyKind::Hash => {
            let value = new_value.ok_or_else(|| {
                BrowserError::ValidationFailure("a hash field needs a value".to_string())
            })?;
            add.arg(key).arg(new_member).arg(value);
        }
        KeyKind::SortedSet => {
            let raw = new_value.ok_or_else(|| {
                BrowserError::ValidationFailure("a sorted-set member needs a score".to_string())
            })?;
            let score = raw.trim().parse::<f64>().ok().filter(|s| !s.is_nan()).ok_or_else(|| {
                BrowserError::ValidationFailure(format!("'{}' is not a numeric score", raw))
            })?;
            add.arg(key).arg(score).arg(new_member);
        }
        _ => {
            add.arg(key).arg(new_member);
        }
    }
    Ok(vec![remove, add])
}

/// Commands removing the given rows. Lists remove one occurrence of each row's
/// value scanning from the head; strings delete the whole key.
pub fn plan_remove_rows(
    descriptor: &KeyDescriptor,
    identities: &[Identity],
) -> BrowserResult<Vec<redis::Cmd>> {
    let kind = descriptor.kind;
    let key = &descriptor.name;
    if kind == KeyKind::String {
        let mut del = redis::cmd("DEL");
        del.arg(key);
        return Ok(vec![del]);
    }
    if identities.is_empty() {
        return Err(BrowserError::ValidationFailure("no rows selected".to_string()));
    }

    if kind == KeyKind::List {
        return identities
            .iter()
            .map(|identity| match identity {
                Identity::Index { value, .. } => {
                    let mut lrem = redis::cmd("LREM");
                    lrem.arg(key).arg(1).arg(value.as_slice());
                    Ok(lrem)
                }
                Identity::Member(_) => Err(BrowserError::TypeMismatch {
                    operation: "member identity",
                    kind: "list",
                }),
            })
            .collect();
    }

    let mut cmd = match kind {
        KeyKind::Hash => redis::cmd("HDEL"),
        KeyKind::Set => redis::cmd("SREM"),
        _ => redis::cmd("ZREM"),
    };
    cmd.arg(key);
    for identity in identities {
        cmd.arg(member_bytes(identity, kind)?);
    }
    Ok(vec![cmd])
}

/// Applies mutations to the key of an [`EditSession`].
///
/// Each store command is sent once; a failure stops the operation where it is.
#[derive(Debug, Clone)]
pub struct EditController {
    reader: CollectionReader,
}

impl EditController {
    pub fn new(reader: CollectionReader) -> Self {
        EditController { reader }
    }

    pub async fn set_value(
        &self,
        handle: &mut Handle,
        session: &mut EditSession,
        identity: Option<&Identity>,
        new_value: &str,
    ) -> BrowserResult<()> {
        session.ensure_live()?;
        let cmd = plan_set_value(&session.descriptor, identity, new_value)?;
        match handle.query::<()>(&cmd).await {
            Ok(()) => {}
            Err(BrowserError::Store(e)) if e.to_string().contains("index out of range") => {
                let index = match identity {
                    Some(Identity::Index { index, .. }) => *index,
                    _ => 0,
                };
                return Err(BrowserError::IndexError {
                    key: session.descriptor.name.clone(),
                    index,
                });
            }
            Err(e) => return Err(e),
        }
        session.state = SessionState::Edited;
        Ok(())
    }

    pub async fn upsert_member(
        &self,
        handle: &mut Handle,
        session: &mut EditSession,
        old: &Identity,
        new_member: &str,
        new_value: Option<&str>,
    ) -> BrowserResult<()> {
        session.ensure_live()?;
        for cmd in plan_upsert_member(&session.descriptor, old, new_member, new_value)? {
            handle.query::<redis::Value>(&cmd).await?;
        }
        session.state = SessionState::Edited;
        Ok(())
    }

    pub async fn remove_rows(
        &self,
        handle: &mut Handle,
        session: &mut EditSession,
        identities: &[Identity],
    ) -> BrowserResult<RemovalOutcome> {
        session.ensure_live()?;
        let mut removed = 0u64;
        for cmd in plan_remove_rows(&session.descriptor, identities)? {
            removed += handle.query::<u64>(&cmd).await?;
        }

        // DEL leaves no string behind whatever it returned.
        let remaining = match session.descriptor.kind {
            KeyKind::String => 0,
            _ => self.reader.length(handle, &session.descriptor).await?,
        };
        let (outcome, state) = settle_removal(removed, remaining);
        session.state = state;
        if outcome.key_gone && !outcome.key_emptied {
            log::warn!(
                "Key '{}' was already gone before removing rows",
                session.descriptor.name
            );
        } else {
            log::info!(
                "Removed {} element(s) from '{}'{}",
                removed,
                session.descriptor.name,
                if outcome.key_emptied { "; key is now gone" } else { "" }
            );
        }
        Ok(outcome)
    }

    pub async fn delete_key(&self, handle: &mut Handle, key: &str) -> BrowserResult<DeleteOutcome> {
        let count = handle.query::<u64>(redis::cmd("DEL").arg(key)).await?;
        if count > 0 {
            log::info!("Deleted key '{}' from DB {}", key, handle.db_index());
            Ok(DeleteOutcome::Deleted)
        } else {
            Ok(DeleteOutcome::NothingToDelete)
        }
    }

    /// Deletes the session's key and marks the session accordingly.
    pub async fn delete_session_key(
        &self,
        handle: &mut Handle,
        session: &mut EditSession,
    ) -> BrowserResult<DeleteOutcome> {
        session.ensure_live()?;
        let outcome = self.delete_key(handle, &session.descriptor.name).await?;
        session.state = SessionState::Deleted;
        Ok(outcome)
    }

    /// Re-reads length and window after a non-destructive edit.
    pub async fn reload(&self, handle: &mut Handle, session: &mut EditSession) -> BrowserResult<()> {
        session.ensure_live()?;
        let descriptor = self.reader.load(handle, &session.descriptor.name).await?;
        let window = self.reader.window(handle, &descriptor).await?;
        session.descriptor = descriptor;
        session.window = window;
        session.state = SessionState::Loaded;
        Ok(())
    }
}
