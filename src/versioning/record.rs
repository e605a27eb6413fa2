use chrono::NaiveDateTime;
use diesel::{
    prelude::*,
    result::Error as DbError,
    sql_types::{Bool, Integer, Nullable, Timestamp},
};
use failure::Fail;

use crate::db::Connection;
use super::relations::Relation;

/// Bookkeeping columns every versioned table carries. These are managed by
/// the state machine and never subject to scalar copying.
pub const VERSIONING_COLUMNS: &[&str] = &[
    "id",
    "is_published",
    "published_counterpart",
    "published_at",
    "deletion_requested",
];

/// The versioning bookkeeping portion of a row of a versioned table.
///
/// This is a snapshot valid only for the current call; another process may
/// mutate the draft/published pair between calls, so derived state must
/// always be re-read from the database instead of being cached.
#[derive(Clone, Debug, PartialEq, QueryableByName, Serialize)]
pub struct VersionedRecord {
    #[sql_type = "Integer"]
    pub id: i32,
    /// True on the published copy, false on the draft copy.
    #[sql_type = "Bool"]
    pub is_published: bool,
    /// On a draft row, the row id of its published counterpart, if one
    /// exists. Unique, which is what keeps concurrent `create_draft` calls
    /// from producing two drafts for one published row.
    #[sql_type = "Nullable<Integer>"]
    pub published_counterpart: Option<i32>,
    /// When this row became the published copy.
    #[sql_type = "Nullable<Timestamp>"]
    pub published_at: Option<NaiveDateTime>,
    /// Only meaningful on a published row: queued for deletion.
    #[sql_type = "Bool"]
    pub deletion_requested: bool,
}

/// A record type with a draft/published lifecycle.
///
/// Implementations declare where rows live and which columns carry content,
/// and provide the hooks the state machine consults during transitions. The
/// table must carry the columns listed in [`VERSIONING_COLUMNS`], with
/// a unique constraint on `published_counterpart`.
pub trait Versioned {
    /// Table holding rows of this type.
    const TABLE: &'static str;

    /// Scalar columns copied between the draft and published rows. Identity
    /// and versioning bookkeeping columns are excluded implicitly and must
    /// not be listed here.
    const CONTENT_COLUMNS: &'static [&'static str];

    /// Scalar columns which must never be copied, on top of the implicit
    /// exclusions (externally managed counters and the like).
    const COPY_EXCLUDE_COLUMNS: &'static [&'static str] = &[];

    /// Type carrying authorization state for [`Versioned::user_can_publish`].
    type User;

    /// Foreign-key edges into [`Versioned::TABLE`] held by other tables.
    ///
    /// This is the universe of the relation rewiring pass: whenever an
    /// identity swap occurs, rows in these tables pointing at the old
    /// identity are re-pointed at the new one.
    fn relations() -> &'static [Relation];

    /// Edges the rewiring pass must leave alone, because
    /// [`Versioned::copy_relations`] already manages them (duplicated
    /// children, re-attached associations).
    fn update_relations_exclude(old: &VersionedRecord) -> Vec<Relation> {
        let _ = old;
        Vec::new()
    }

    /// Copy non-scalar relations after a scalar copy from `old` to `new`.
    ///
    /// One-to-many children should be duplicated and re-parented onto `new`;
    /// many-to-many association rows should be re-created against `new`
    /// without duplicating the related rows themselves. Runs inside the
    /// transaction of the transition which triggered the copy.
    fn copy_relations(dbconn: &Connection, old: &VersionedRecord, new: &VersionedRecord)
    -> Result<(), DbError> {
        let _ = (dbconn, old, new);
        Ok(())
    }

    /// Check whether the data and all linked data is ready to publish.
    fn can_publish(dbconn: &Connection, draft: &VersionedRecord)
    -> Result<(), ValidationError> {
        let _ = (dbconn, draft);
        Ok(())
    }

    /// Check whether the user has permissions to publish.
    fn user_can_publish(dbconn: &Connection, record: &VersionedRecord, user: &Self::User)
    -> bool {
        let _ = (dbconn, record, user);
        true
    }
}

/// Content is not ready to be published.
#[derive(Debug, Fail, PartialEq)]
#[fail(display = "{}", _0)]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new<S: Into<String>>(reason: S) -> ValidationError {
        ValidationError(reason.into())
    }
}

const RECORD_COLUMNS: &str =
    "id, is_published, published_counterpart, published_at, deletion_requested";

/// Load the versioning portion of a row.
pub fn find<T: Versioned>(dbconn: &Connection, id: i32)
-> Result<Option<VersionedRecord>, DbError> {
    diesel::sql_query(format!(
        "SELECT {columns} FROM {table} WHERE id = $1",
        columns = RECORD_COLUMNS,
        table = T::TABLE,
    ))
    .bind::<Integer, _>(id)
    .get_result(dbconn)
    .optional()
}

/// Find the draft whose published counterpart is `published`.
pub fn find_draft_of<T: Versioned>(dbconn: &Connection, published: i32)
-> Result<Option<VersionedRecord>, DbError> {
    diesel::sql_query(format!(
        "SELECT {columns} FROM {table} WHERE published_counterpart = $1",
        columns = RECORD_COLUMNS,
        table = T::TABLE,
    ))
    .bind::<Integer, _>(published)
    .get_result(dbconn)
    .optional()
}

/// All published rows of a versioned table.
pub fn all_published<T: Versioned>(dbconn: &Connection)
-> Result<Vec<VersionedRecord>, DbError> {
    diesel::sql_query(format!(
        "SELECT {columns} FROM {table} WHERE is_published ORDER BY id",
        columns = RECORD_COLUMNS,
        table = T::TABLE,
    ))
    .get_results(dbconn)
}

/// All draft rows of a versioned table.
pub fn all_drafts<T: Versioned>(dbconn: &Connection)
-> Result<Vec<VersionedRecord>, DbError> {
    diesel::sql_query(format!(
        "SELECT {columns} FROM {table} WHERE NOT is_published ORDER BY id",
        columns = RECORD_COLUMNS,
        table = T::TABLE,
    ))
    .get_results(dbconn)
}

/// All published rows queued for deletion.
pub fn all_pending_deletion<T: Versioned>(dbconn: &Connection)
-> Result<Vec<VersionedRecord>, DbError> {
    diesel::sql_query(format!(
        "SELECT {columns} FROM {table} \
         WHERE is_published AND deletion_requested ORDER BY id",
        columns = RECORD_COLUMNS,
        table = T::TABLE,
    ))
    .get_results(dbconn)
}

/// One row per logical entity.
///
/// Where both a draft and a published row exist only one of them is
/// returned: the published one, or the draft when `prefer_drafts` is set.
pub fn distinct_versions<T: Versioned>(dbconn: &Connection, prefer_drafts: bool)
-> Result<Vec<VersionedRecord>, DbError> {
    let query = if prefer_drafts {
        format!(
            "SELECT {columns} FROM {table} AS v \
             WHERE NOT v.is_published \
                OR NOT EXISTS (SELECT 1 FROM {table} AS d \
                               WHERE d.published_counterpart = v.id) \
             ORDER BY id",
            columns = RECORD_COLUMNS,
            table = T::TABLE,
        )
    } else {
        format!(
            "SELECT {columns} FROM {table} \
             WHERE is_published OR published_counterpart IS NULL \
             ORDER BY id",
            columns = RECORD_COLUMNS,
            table = T::TABLE,
        )
    };

    diesel::sql_query(query).get_results(dbconn)
}

/// Turn a row into the published copy.
pub(crate) fn mark_published<T: Versioned>(
    dbconn: &Connection,
    id: i32,
    now: NaiveDateTime,
) -> Result<(), DbError> {
    diesel::sql_query(format!(
        "UPDATE {table} SET is_published = TRUE, published_at = $2, \
         published_counterpart = NULL, deletion_requested = FALSE \
         WHERE id = $1",
        table = T::TABLE,
    ))
    .bind::<Integer, _>(id)
    .bind::<Timestamp, _>(now)
    .execute(dbconn)
    .map(drop)
}

/// Point a draft row at its published counterpart.
pub(crate) fn link_draft<T: Versioned>(
    dbconn: &Connection,
    draft: i32,
    published: i32,
) -> Result<(), DbError> {
    diesel::sql_query(format!(
        "UPDATE {table} SET published_counterpart = $2 WHERE id = $1",
        table = T::TABLE,
    ))
    .bind::<Integer, _>(draft)
    .bind::<Integer, _>(published)
    .execute(dbconn)
    .map(drop)
}

/// Set or clear the deletion-request flag on a published row.
pub(crate) fn set_deletion_requested<T: Versioned>(
    dbconn: &Connection,
    id: i32,
    requested: bool,
) -> Result<(), DbError> {
    diesel::sql_query(format!(
        "UPDATE {table} SET deletion_requested = $2 WHERE id = $1",
        table = T::TABLE,
    ))
    .bind::<Integer, _>(id)
    .bind::<Bool, _>(requested)
    .execute(dbconn)
    .map(drop)
}

/// Hard-delete a row.
pub(crate) fn delete_row<T: Versioned>(dbconn: &Connection, id: i32)
-> Result<(), DbError> {
    diesel::sql_query(format!(
        "DELETE FROM {table} WHERE id = $1",
        table = T::TABLE,
    ))
    .bind::<Integer, _>(id)
    .execute(dbconn)
    .map(drop)
}
