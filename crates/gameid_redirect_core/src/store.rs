use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags, params};
use thiserror::Error;

use crate::identifier::{GameIdentifier, RegionPattern};

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// The page/redirect corpus plus the missing-identifier counters.
pub trait RedirectStore {
    /// Redirect-flagged page titles matching `pattern`, in store order.
    fn find_redirects_matching(&self, pattern: &RegionPattern) -> Result<Vec<String>, StoreError>;

    /// Create the counter for `identifier` at 1, or add 1 to it. Must be a
    /// single atomic operation in the store.
    fn increment_or_insert_missing(&self, identifier: &GameIdentifier) -> Result<(), StoreError>;
}

/// Connection settings for [`SqliteStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    pub db_path: PathBuf,
    pub busy_timeout: Duration,
}

impl StoreSettings {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }
}

/// SQLite-backed store over the `page` and `missing_redirects` tables.
///
/// Matches are returned in ascending `page_id` order, so the resolver's
/// last-wins rule picks the most recently created regional redirect.
pub struct SqliteStore {
    connection: Connection,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open an existing, migrated database. A missing file is an error rather
    /// than a fresh empty corpus.
    pub fn open(settings: &StoreSettings) -> Result<Self, StoreError> {
        let connection = Connection::open_with_flags(
            &settings.db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|source| StoreError::Open {
            path: settings.db_path.clone(),
            source,
        })?;
        connection.busy_timeout(settings.busy_timeout)?;
        Ok(Self {
            connection,
            db_path: settings.db_path.clone(),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Insert a page or update its redirect flag. Only used to seed a local
    /// corpus; resolution never writes to `page`.
    pub fn upsert_page(&self, title: &str, is_redirect: bool) -> Result<(), StoreError> {
        self.connection.execute(
            "INSERT INTO page (page_title, page_is_redirect) VALUES (?1, ?2)
             ON CONFLICT(page_title) DO UPDATE SET page_is_redirect = excluded.page_is_redirect",
            params![title, i64::from(is_redirect)],
        )?;
        Ok(())
    }
}

impl RedirectStore for SqliteStore {
    fn find_redirects_matching(&self, pattern: &RegionPattern) -> Result<Vec<String>, StoreError> {
        // `=` under the default BINARY collation keeps the comparison
        // case-sensitive, and bound parameters keep `%`, `_`, `*` literal.
        let mut statement = self.connection.prepare_cached(
            "SELECT page_title
             FROM page
             WHERE page_is_redirect = 1
               AND length(page_title) = 6
               AND substr(page_title, 1, 3) = ?1
               AND substr(page_title, 5, 2) = ?2
             ORDER BY page_id ASC",
        )?;
        let rows = statement.query_map(params![pattern.prefix(), pattern.suffix()], |row| {
            row.get::<_, String>(0)
        })?;

        let mut titles = Vec::new();
        for row in rows {
            let title = row?;
            if pattern.matches(&title) {
                titles.push(title);
            }
        }
        Ok(titles)
    }

    fn increment_or_insert_missing(&self, identifier: &GameIdentifier) -> Result<(), StoreError> {
        self.connection.execute(
            "INSERT INTO missing_redirects (gameid, count) VALUES (?1, 1)
             ON CONFLICT(gameid) DO UPDATE SET count = count + 1",
            params![identifier.as_str()],
        )?;
        Ok(())
    }
}
