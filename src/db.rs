use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior};

use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod achievements;
pub mod events;
pub mod leaderboards;
pub mod schema;
pub mod stats;
pub mod users;

pub use achievements::*;
pub use events::*;
pub use leaderboards::*;
pub use stats::*;
pub use users::*;

pub type DBResult<T> = Result<T, rusqlite::Error>;

/// How many times a transaction is attempted before a busy database is reported.
pub const MAX_TXN_ATTEMPTS: u32 = 5;

/// How long a single statement waits on a lock held by another connection.
const BUSY_TIMEOUT: Duration = Duration::from_millis(250);

/// Handle on the ledger database file.
///
/// Every invocation opens its own connection; nothing is shared between them
/// except the file itself.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn connect(&self) -> DBResult<Connection> {
        let connection = Connection::open(&self.path)?;
        connection.busy_timeout(BUSY_TIMEOUT)?;
        connection.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        connection.pragma_update(None, "foreign_keys", true)?;
        Ok(connection)
    }

    /// Creates every table if it doesn't exist yet.
    pub fn initialize(&self) -> DBResult<()> {
        let connection = self.connect()?;

        for (name, ddl) in schema::ALL_SCHEMAS {
            log::debug!("[initialize] creating {name} table...");
            connection.execute(ddl, [])?;
        }
        connection.execute_batch(schema::INDEXES)?;

        Ok(())
    }
}

/// Turns a uniqueness/constraint failure into `Ok(false)` for "insert if absent" writes.
pub fn swallow_constraint_violation(err: rusqlite::Error) -> DBResult<bool> {
    match err.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => Ok(false),
        _ => Err(err),
    }
}

/// Whether the error means another connection holds the write lock.
pub fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked)
    )
}

/// Runs `body` inside an immediate transaction, committing on success.
///
/// The write lock is taken when the transaction begins, so everything `body`
/// reads stays valid until commit. When the lock can't be had the whole
/// attempt is rolled back and `body` runs again, up to `MAX_TXN_ATTEMPTS`.
pub fn with_transaction<T, F>(connection: &mut Connection, mut body: F) -> DBResult<T>
where
    F: FnMut(&Transaction) -> DBResult<T>,
{
    let mut attempt = 1;
    loop {
        let result = run_once(connection, &mut body);

        match result {
            Err(err) if is_busy(&err) && attempt < MAX_TXN_ATTEMPTS => {
                log::warn!("[with_transaction] attempt {attempt} hit a busy database, retrying: {err}");
                std::thread::sleep(BUSY_TIMEOUT * attempt);
                attempt += 1;
            }
            Err(err) => {
                log::error!("[with_transaction] giving up after {attempt} attempt(s): {err}");
                return Err(err);
            }
            ok => return ok,
        }
    }
}

fn run_once<T, F>(connection: &mut Connection, body: &mut F) -> DBResult<T>
where
    F: FnMut(&Transaction) -> DBResult<T>,
{
    let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let value = body(&tx)?;
    tx.commit()?;
    Ok(value)
}
