use crate::config::Settings;
use crate::connection::{ConnectionManager, Handle};
use crate::editor::{DeleteOutcome, EditController, EditSession, RemovalOutcome};
use crate::error::{BrowserError, BrowserResult};
use crate::keyspace::{CategoryCountTable, KeyspaceScanner};
use crate::profiles::ConnectionProfile;
use crate::reader::{CollectionReader, Identity, KeyDescriptor, KeyKind, RowWindow};

/// Command surface used by a presentation layer: one profile, one active
/// database handle and at most one loaded key at a time.
pub struct Browser {
    database_count: u8,
    manager: ConnectionManager,
    scanner: KeyspaceScanner,
    reader: CollectionReader,
    editor: EditController,
    profile: Option<ConnectionProfile>,
    handle: Option<Handle>,
    session: Option<EditSession>,
}

fn not_connected() -> BrowserError {
    BrowserError::ConnectionFailure("no connection; connect to a profile first".to_string())
}

fn no_key_loaded() -> BrowserError {
    BrowserError::ValidationFailure("no key loaded".to_string())
}

impl Browser {
    pub fn new(settings: &Settings) -> Self {
        let reader = CollectionReader::new(settings);
        Browser {
            database_count: settings.database_count,
            manager: ConnectionManager::new(settings),
            scanner: KeyspaceScanner::new(settings),
            editor: EditController::new(reader.clone()),
            reader,
            profile: None,
            handle: None,
            session: None,
        }
    }

    pub async fn test_connection(&self, profile: &ConnectionProfile) -> bool {
        self.manager.test_connection(profile).await
    }

    /// Connects to database 0 of `profile`, dropping any loaded key.
    pub async fn connect(&mut self, profile: ConnectionProfile) -> BrowserResult<()> {
        let handle = self.manager.open(&profile, 0).await?;
        self.profile = Some(profile);
        self.handle = Some(handle);
        self.session = None;
        Ok(())
    }

    /// Liveness of the active handle; `false` when not connected.
    pub async fn ping(&mut self) -> bool {
        match self.handle.as_mut() {
            Some(handle) => handle.ping().await,
            None => false,
        }
    }

    pub fn profile(&self) -> Option<&ConnectionProfile> {
        self.profile.as_ref()
    }

    pub fn active_database(&self) -> Option<u8> {
        self.handle.as_ref().map(Handle::db_index)
    }

    /// Full inventory of every database; replaces the count table.
    pub async fn refresh_counts(&mut self) -> BrowserResult<Vec<String>> {
        let profile = self.profile.as_ref().ok_or_else(not_connected)?;
        let table = self.scanner.scan_all(&self.manager, profile).await?;
        Ok(table.database_summaries())
    }

    pub async fn select_database(&mut self, db_index: u8) -> BrowserResult<()> {
        if db_index >= self.database_count {
            return Err(BrowserError::ValidationFailure(format!(
                "database index must be between 0 and {}",
                self.database_count.saturating_sub(1)
            )));
        }
        let profile = self.profile.as_ref().ok_or_else(not_connected)?;
        let handle = self.manager.open(profile, db_index).await?;
        self.handle = Some(handle);
        self.session = None;
        Ok(())
    }

    pub fn counts(&self) -> &CategoryCountTable {
        self.scanner.table()
    }

    pub fn category_counts(&self, db_index: u8) -> Vec<(String, u64)> {
        self.scanner.table().rows(db_index)
    }

    pub fn database_summaries(&self) -> Vec<String> {
        self.scanner.table().database_summaries()
    }

    /// Loads `name` from the active database. Any previous session is dropped
    /// first, even when the load fails.
    pub async fn load_key(&mut self, name: &str) -> BrowserResult<&KeyDescriptor> {
        self.session = None;
        let handle = self.handle.as_mut().ok_or_else(not_connected)?;
        let descriptor = self.reader.load(handle, name).await?;
        let window = self.reader.window(handle, &descriptor).await?;
        let session = self
            .session
            .insert(EditSession::new(handle.db_index(), descriptor, window));
        Ok(session.descriptor())
    }

    pub fn session(&self) -> Option<&EditSession> {
        self.session.as_ref()
    }

    pub fn window(&self) -> Option<&RowWindow> {
        self.session.as_ref().map(EditSession::window)
    }

    /// Replaces a string value, or the list element shown in `row`.
    pub async fn set_value(&mut self, row: Option<usize>, new_value: &str) -> BrowserResult<()> {
        let handle = self.handle.as_mut().ok_or_else(not_connected)?;
        let session = self.session.as_mut().ok_or_else(no_key_loaded)?;
        let identity = match row {
            Some(row) => Some(session.identity(row)?.clone()),
            None => None,
        };
        self.editor
            .set_value(handle, session, identity.as_ref(), new_value)
            .await?;
        self.editor.reload(handle, session).await
    }

    /// Replaces the member shown in `row` with `new_member` (and `new_value`
    /// as hash value or sorted-set score).
    pub async fn upsert_member(
        &mut self,
        row: usize,
        new_member: &str,
        new_value: Option<&str>,
    ) -> BrowserResult<()> {
        let handle = self.handle.as_mut().ok_or_else(not_connected)?;
        let session = self.session.as_mut().ok_or_else(no_key_loaded)?;
        let old = session.identity(row)?.clone();
        self.editor
            .upsert_member(handle, session, &old, new_member, new_value)
            .await?;
        self.editor.reload(handle, session).await
    }

    /// Removes the given window rows. When this removal empties the key its
    /// category count is decremented once. A key that is gone for any reason
    /// discards the session.
    pub async fn delete_rows(&mut self, rows: &[usize]) -> BrowserResult<RemovalOutcome> {
        let handle = self.handle.as_mut().ok_or_else(not_connected)?;
        let session = self.session.as_mut().ok_or_else(no_key_loaded)?;
        let mut selected: Vec<usize> = rows.to_vec();
        selected.sort_unstable();
        selected.dedup();
        // A string window's single row has no identity; removing it drops the key.
        let identities = if session.descriptor().kind == KeyKind::String {
            Vec::new()
        } else {
            selected
                .iter()
                .map(|row| session.identity(*row).cloned())
                .collect::<BrowserResult<Vec<Identity>>>()?
        };

        let outcome = self.editor.remove_rows(handle, session, &identities).await?;
        if outcome.key_gone {
            if outcome.key_emptied {
                let db_index = session.db_index();
                let key = session.descriptor().name.clone();
                self.scanner.decrement_for_key(db_index, &key);
            }
            self.session = None;
        } else {
            self.editor.reload(handle, session).await?;
        }
        Ok(outcome)
    }

    /// Deletes the loaded key. Counts change only when the store removed it.
    pub async fn delete_key(&mut self) -> BrowserResult<DeleteOutcome> {
        let handle = self.handle.as_mut().ok_or_else(not_connected)?;
        let session = self.session.as_mut().ok_or_else(no_key_loaded)?;
        let outcome = self.editor.delete_session_key(handle, session).await?;
        if outcome == DeleteOutcome::Deleted {
            let db_index = session.db_index();
            let key = session.descriptor().name.clone();
            self.scanner.decrement_for_key(db_index, &key);
        }
        self.session = None;
        Ok(outcome)
    }
}
