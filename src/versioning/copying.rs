//! Field-level copying between rows of a versioned table.
//!
//! The copier only moves scalar content columns; identity and versioning
//! bookkeeping columns are never copied, and the entity type can exclude
//! further columns it manages externally. Relations are the caller's
//! responsibility through the `copy_relations` hook, invoked after the
//! scalar copy is saved.

use chrono::NaiveDateTime;
use diesel::{
    prelude::*,
    result::Error as DbError,
    sql_types::{Bool, Integer, Nullable, Timestamp},
};

use crate::db::Connection;
use super::record::{VERSIONING_COLUMNS, Versioned, VersionedRecord};

/// Versioning bookkeeping of a freshly duplicated row.
#[derive(Clone, Copy, Debug)]
pub struct NewVersion {
    pub is_published: bool,
    pub published_counterpart: Option<i32>,
    pub published_at: Option<NaiveDateTime>,
}

/// Content columns of `T` subject to copying, after all exclusions.
pub fn content_columns<T: Versioned>(exclude: &[&str]) -> Vec<&'static str> {
    T::CONTENT_COLUMNS
        .iter()
        .copied()
        .filter(|c| !VERSIONING_COLUMNS.contains(c))
        .filter(|c| !T::COPY_EXCLUDE_COLUMNS.contains(c))
        .filter(|c| !exclude.iter().any(|e| e == c))
        .collect()
}

/// Copy scalar content from one row onto another, in place.
///
/// `exclude` adds caller-supplied exclusions on top of the implicit ones.
/// Bookkeeping columns of the destination are left untouched.
pub fn copy_columns<T: Versioned>(
    dbconn: &Connection,
    from: i32,
    to: i32,
    exclude: &[&str],
) -> Result<(), DbError> {
    let columns = content_columns::<T>(exclude);
    if columns.is_empty() {
        return Ok(());
    }

    diesel::sql_query(copy_query(T::TABLE, &columns))
        .bind::<Integer, _>(from)
        .bind::<Integer, _>(to)
        .execute(dbconn)
        .map(drop)
}

/// Insert a copy of a row, with fresh identity and the given bookkeeping.
pub fn duplicate_row<T: Versioned>(
    dbconn: &Connection,
    source: &VersionedRecord,
    version: NewVersion,
) -> Result<VersionedRecord, DbError> {
    let columns = content_columns::<T>(&[]);

    diesel::sql_query(duplicate_query(T::TABLE, &columns))
        .bind::<Integer, _>(source.id)
        .bind::<Bool, _>(version.is_published)
        .bind::<Nullable<Integer>, _>(version.published_counterpart)
        .bind::<Nullable<Timestamp>, _>(version.published_at)
        .get_result(dbconn)
}

fn copy_query(table: &str, columns: &[&str]) -> String {
    let assignments = columns
        .iter()
        .map(|c| format!("{} = src.{}", c, c))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "UPDATE {table} AS dst SET {assignments} \
         FROM {table} AS src WHERE src.id = $1 AND dst.id = $2",
        table = table,
        assignments = assignments,
    )
}

fn duplicate_query(table: &str, columns: &[&str]) -> String {
    // Trailing separator so an empty content list degenerates cleanly.
    let columns = columns
        .iter()
        .map(|c| format!("{}, ", c))
        .collect::<String>();

    format!(
        "INSERT INTO {table} \
           ({columns}is_published, published_counterpart, published_at, \
            deletion_requested) \
         SELECT {columns}$2, $3, $4, FALSE FROM {table} WHERE id = $1 \
         RETURNING id, is_published, published_counterpart, published_at, \
           deletion_requested",
        table = table,
        columns = columns,
    )
}
