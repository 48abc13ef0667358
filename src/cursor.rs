use crate::connection::Handle;
use crate::error::BrowserResult;
use redis::Value;

/// Position in one of the cursor-based scan commands (SCAN, HSCAN, SSCAN, ZSCAN).
///
/// A cursor starts at zero and walks forward until the server hands back zero
/// again. Once finished it stays finished; restarting means building a new one.
#[derive(Debug, Clone)]
pub struct ScanCursor {
    command: &'static str,
    key: Option<String>,
    count: usize,
    position: u64,
    finished: bool,
}

impl ScanCursor {
    /// Cursor over the keys of the handle's database.
    pub fn keyspace(count: usize) -> Self {
        Self::build("SCAN", None, count)
    }

    /// Cursor over the members of one collection key (`HSCAN`, `SSCAN` or `ZSCAN`).
    pub fn members(command: &'static str, key: &str, count: usize) -> Self {
        Self::build(command, Some(key.to_string()), count)
    }

    fn build(command: &'static str, key: Option<String>, count: usize) -> Self {
        ScanCursor {
            command,
            key,
            count,
            position: 0,
            finished: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Records the cursor token the server returned with a batch.
    pub fn advance(&mut self, next: u64) {
        self.position = next;
        if next == 0 {
            self.finished = true;
        }
    }

    fn command(&self) -> redis::Cmd {
        let mut cmd = redis::cmd(self.command);
        if let Some(key) = &self.key {
            cmd.arg(key);
        }
        cmd.arg(self.position).arg("COUNT").arg(self.count);
        cmd
    }

    /// Fetches the next raw batch, or `None` once the cursor is exhausted.
    ///
    /// A batch may be empty while the cursor is still live.
    pub async fn next_batch(&mut self, handle: &mut Handle) -> BrowserResult<Option<Vec<Value>>> {
        if self.finished {
            return Ok(None);
        }
        let (next, batch) = handle.query::<(u64, Vec<Value>)>(&self.command()).await?;
        log::debug!(
            "{} cursor {} -> {} ({} items)",
            self.command,
            self.position,
            next,
            batch.len()
        );
        self.advance(next);
        Ok(Some(batch))
    }
}
