use rusqlite::{OptionalExtension, params};
use serde::Serialize;

use crate::identifier::GameIdentifier;
use crate::store::{SqliteStore, StoreError};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MissingRecord {
    pub gameid: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StoreStats {
    pub pages: u64,
    pub redirects: u64,
    pub missing_identifiers: u64,
    pub missing_hits: u64,
}

/// Most-requested missing identifiers first; ties ordered by identifier.
pub fn list_missing(store: &SqliteStore, limit: usize) -> Result<Vec<MissingRecord>, StoreError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let mut statement = store.connection().prepare(
        "SELECT gameid, count
         FROM missing_redirects
         ORDER BY count DESC, gameid ASC
         LIMIT ?1",
    )?;
    let rows = statement.query_map(params![limit], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;

    let mut records = Vec::new();
    for row in rows {
        let (gameid, count) = row?;
        records.push(MissingRecord {
            gameid,
            count: count_from_sql(count),
        });
    }
    Ok(records)
}

pub fn missing_count(
    store: &SqliteStore,
    identifier: &GameIdentifier,
) -> Result<Option<u64>, StoreError> {
    let count = store
        .connection()
        .query_row(
            "SELECT count FROM missing_redirects WHERE gameid = ?1",
            params![identifier.as_str()],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(count.map(count_from_sql))
}

pub fn store_stats(store: &SqliteStore) -> Result<StoreStats, StoreError> {
    let connection = store.connection();
    let (pages, redirects) = connection.query_row(
        "SELECT COUNT(*), COALESCE(SUM(page_is_redirect = 1), 0) FROM page",
        [],
        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
    )?;
    let (missing_identifiers, missing_hits) = connection.query_row(
        "SELECT COUNT(*), COALESCE(SUM(count), 0) FROM missing_redirects",
        [],
        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
    )?;
    Ok(StoreStats {
        pages: count_from_sql(pages),
        redirects: count_from_sql(redirects),
        missing_identifiers: count_from_sql(missing_identifiers),
        missing_hits: count_from_sql(missing_hits),
    })
}

// COUNT/SUM results are never negative here.
fn count_from_sql(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}
