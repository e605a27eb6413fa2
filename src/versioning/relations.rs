//! Rewiring of foreign keys held by other tables.
//!
//! When a state transition swaps the identity of a logical entity (a draft
//! row is deleted in favour of its published counterpart), every other row
//! in the data graph holding a foreign key to the old identity must be
//! re-pointed at the new one, or cascades and null-outs would fire against
//! rows which logically still exist.

use diesel::{prelude::*, result::Error as DbError, sql_types::Integer};

use crate::db::Connection;

/// A foreign-key edge into a versioned table, declared statically by the
/// entity type (see [`super::Versioned::relations`]).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
pub struct Relation {
    /// Table holding the foreign key. Many-to-many association tables are
    /// declared here the same way as ordinary tables.
    pub table: &'static str,
    /// Column holding the foreign key.
    pub column: &'static str,
}

impl Relation {
    pub const fn new(table: &'static str, column: &'static str) -> Relation {
        Relation { table, column }
    }
}

/// Re-point every declared reference to `old` at `new`.
///
/// Edges listed in `exclude` are left alone; those are managed manually by
/// the entity's `copy_relations` hook. Must run inside the transaction of
/// the transition which caused the identity swap: a constraint violation
/// here aborts the whole transition.
pub fn rewire(
    dbconn: &Connection,
    relations: &[Relation],
    exclude: &[Relation],
    old: i32,
    new: i32,
) -> Result<(), DbError> {
    for relation in relations {
        if exclude.contains(relation) {
            continue;
        }

        let updated = diesel::sql_query(rewire_query(relation))
            .bind::<Integer, _>(new)
            .bind::<Integer, _>(old)
            .execute(dbconn)?;

        if updated > 0 {
            debug!(
                "rewired {} rows of {}.{} from {} to {}",
                updated, relation.table, relation.column, old, new,
            );
        }
    }

    Ok(())
}

fn rewire_query(relation: &Relation) -> String {
    format!(
        "UPDATE {table} SET {column} = $1 WHERE {column} = $2",
        table = relation.table,
        column = relation.column,
    )
}
