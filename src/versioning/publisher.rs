//! The draft/published state machine for a single logical entity.

use chrono::{NaiveDateTime, Utc};
use diesel::{
    Connection as _Connection,
    prelude::*,
    result::{DatabaseErrorKind, Error as DbError},
};
use failure::Fail;
use std::marker::PhantomData;

use crate::{audit, db::Connection};
use super::{
    copying::{self, NewVersion},
    record::{self, ValidationError, Versioned, VersionedRecord},
    relations,
    state::{self, Action, AvailableAction, StateData},
};

/// State machine over the draft/published pair of one logical entity.
///
/// A publisher wraps whichever row of the pair the caller loaded; every
/// operation and predicate re-reads the pair from the database, so the
/// wrapped row only identifies the entity. Do not hold a publisher across
/// requests: returned records are snapshots valid for the current call only.
pub struct Publisher<'c, T: Versioned> {
    dbconn: &'c Connection,
    record: VersionedRecord,
    _entity: PhantomData<T>,
}

/// Knobs of [`Publisher::publish()`]. The defaults describe the ordinary
/// "publish this draft" operation.
#[derive(Clone, Copy, Debug)]
pub struct PublishOptions {
    /// Run the entity's `can_publish` validation hook first.
    pub validate: bool,
    /// Delete the draft row once published. When false the draft survives,
    /// linked to the published row.
    pub delete: bool,
    /// Re-point third-party references from the draft identity to the
    /// published identity.
    pub update_relations: bool,
    /// Publication timestamp; defaults to the current time.
    pub now: Option<NaiveDateTime>,
}

impl Default for PublishOptions {
    fn default() -> PublishOptions {
        PublishOptions {
            validate: true,
            delete: true,
            update_relations: true,
            now: None,
        }
    }
}

impl<'c, T: Versioned> Publisher<'c, T> {
    /// Load the entity whose row has the given id.
    pub fn by_id(dbconn: &'c Connection, id: i32) -> Result<Self, FindRecordError> {
        record::find::<T>(dbconn, id)?
            .ok_or(FindRecordError::NotFound)
            .map(|record| Publisher::from_record(dbconn, record))
    }

    /// Wrap an already loaded row.
    pub fn from_record(dbconn: &'c Connection, record: VersionedRecord) -> Self {
        Publisher { dbconn, record, _entity: PhantomData }
    }

    /// The row this publisher was constructed from.
    pub fn record(&self) -> &VersionedRecord {
        &self.record
    }

    pub fn into_record(self) -> VersionedRecord {
        self.record
    }

    /// Fresh copy of the wrapped row, or `None` if it has been deleted.
    fn reload(&self) -> Result<Option<VersionedRecord>, DbError> {
        record::find::<T>(self.dbconn, self.record.id)
    }

    /// The draft row of this entity, if one exists.
    pub fn get_draft_version(&self) -> Result<Option<VersionedRecord>, DbError> {
        let current = match self.reload()? {
            Some(current) => current,
            None => return Ok(None),
        };

        if !current.is_published {
            return Ok(Some(current));
        }

        record::find_draft_of::<T>(self.dbconn, current.id)
    }

    /// The published row of this entity, if one exists.
    pub fn get_published_version(&self) -> Result<Option<VersionedRecord>, DbError> {
        let current = match self.reload()? {
            Some(current) => current,
            None => return Ok(None),
        };

        if current.is_published {
            return Ok(Some(current));
        }

        match current.published_counterpart {
            Some(id) => record::find::<T>(self.dbconn, id),
            None => Ok(None),
        }
    }

    pub fn has_pending_changes(&self) -> Result<bool, DbError> {
        self.get_draft_version().map(|draft| draft.is_some())
    }

    pub fn has_published_version(&self) -> Result<bool, DbError> {
        self.get_published_version().map(|published| published.is_some())
    }

    pub fn has_pending_deletion_request(&self) -> Result<bool, DbError> {
        Ok(self.get_published_version()?
            .map_or(false, |published| published.deletion_requested))
    }

    /// Snapshot of derived state for rendering.
    pub fn state(&self) -> Result<StateData, DbError> {
        Ok(StateData::new(
            self.has_published_version()?,
            self.has_pending_changes()?,
            self.has_pending_deletion_request()?,
        ))
    }

    /// Decorate a display label with the entity's workflow status.
    pub fn status_label(&self, label: &str) -> Result<String, DbError> {
        Ok(self.state()?.status_label(label))
    }

    /// Actions a UI should offer for this entity, each tagged with whether
    /// `user` is authorized for it.
    pub fn available_actions(&self, user: &T::User)
    -> Result<Vec<AvailableAction>, DbError> {
        let draft = self.get_draft_version()?;
        let published = self.get_published_version()?;

        // Authorization is checked against the draft when one exists, since
        // that is the row a publish would act on.
        let record = draft.as_ref().or_else(|| published.as_ref());
        let can_publish = record.map_or(false, |record| {
            T::user_can_publish(self.dbconn, record, user)
        });

        Ok(state::available_actions(
            published.is_some(),
            draft.is_some(),
            published.map_or(false, |p| p.deletion_requested),
            can_publish,
        ))
    }

    /// Actions of [`Publisher::available_actions`] the user is authorized
    /// to take.
    pub fn allowed_actions(&self, user: &T::User) -> Result<Vec<Action>, DbError> {
        Ok(self.available_actions(user)?
            .into_iter()
            .filter(|action| action.has_permission)
            .map(|action| action.action)
            .collect())
    }

    /// Create a draft copy of the published row.
    ///
    /// Clears a pending deletion request first, if any. The unique
    /// constraint on `published_counterpart` rejects a second draft for the
    /// same published row, surfaced as [`CreateDraftError::Exists`].
    pub fn create_draft(&self) -> Result<VersionedRecord, CreateDraftError> {
        let draft = self.dbconn.transaction(|| {
            let published = self.get_published_version()?
                .ok_or(CreateDraftError::NotPublished)?;

            if published.deletion_requested {
                record::set_deletion_requested::<T>(self.dbconn, published.id, false)?;
            }

            let draft = copying::duplicate_row::<T>(self.dbconn, &published, NewVersion {
                is_published: false,
                published_counterpart: Some(published.id),
                published_at: None,
            })?;
            T::copy_relations(self.dbconn, &published, &draft)?;

            record::find::<T>(self.dbconn, draft.id)?
                .ok_or_else(|| CreateDraftError::Database(DbError::NotFound))
        })?;

        audit::log(T::TABLE, draft.id, "create-draft", LogCreateDraft {
            published: draft.published_counterpart,
        });

        Ok(draft)
    }

    /// The existing draft, or a fresh one. The flag reports whether a draft
    /// was created by this call.
    pub fn get_or_create_draft(&self)
    -> Result<(VersionedRecord, bool), CreateDraftError> {
        if let Some(draft) = self.get_draft_version()? {
            return Ok((draft, false));
        }
        self.create_draft().map(|draft| (draft, true))
    }

    /// Publish the entity's draft.
    ///
    /// The first time an entity is published its draft row becomes the
    /// published row in place, keeping the identity dependents already point
    /// at. Republishing copies the draft's content onto the existing
    /// published row (whose identity never changes again), re-points
    /// third-party references from the draft to it, and deletes the draft.
    ///
    /// Returns the published row, freshly re-read.
    pub fn publish(&self, options: PublishOptions)
    -> Result<VersionedRecord, PublishError> {
        let PublishOptions { validate, delete, update_relations, now } = options;

        let (published, draft_id) = self.dbconn.transaction::<_, PublishError, _>(|| {
            let draft = self.get_draft_version()?
                .ok_or(PublishError::NothingToPublish)?;

            if validate {
                T::can_publish(self.dbconn, &draft)?;
            }

            let now = now.unwrap_or_else(|| Utc::now().naive_utc());

            let published = match self.get_published_version()? {
                Some(published) => {
                    // Update the live row with the data from the draft.
                    copying::copy_columns::<T>(self.dbconn, draft.id, published.id, &[])?;
                    record::mark_published::<T>(self.dbconn, published.id, now)?;
                    T::copy_relations(self.dbconn, &draft, &published)?;

                    if update_relations {
                        // Anything still pointing at the draft switches to
                        // the live row; otherwise cascade or set-null would
                        // fire once the draft goes away.
                        relations::rewire(
                            self.dbconn,
                            T::relations(),
                            &T::update_relations_exclude(&draft),
                            draft.id,
                            published.id,
                        )?;
                    }

                    if delete {
                        record::delete_row::<T>(self.dbconn, draft.id)?;
                    }

                    published.id
                }
                None if delete => {
                    // First publish: the draft row becomes the published row
                    // in place. No references move, so no rewiring.
                    record::mark_published::<T>(self.dbconn, draft.id, now)?;
                    draft.id
                }
                None => {
                    // First publish with the draft kept alive: the published
                    // row has to be a new copy.
                    let published = copying::duplicate_row::<T>(
                        self.dbconn,
                        &draft,
                        NewVersion {
                            is_published: true,
                            published_counterpart: None,
                            published_at: Some(now),
                        },
                    )?;
                    T::copy_relations(self.dbconn, &draft, &published)?;

                    if update_relations {
                        relations::rewire(
                            self.dbconn,
                            T::relations(),
                            &T::update_relations_exclude(&draft),
                            draft.id,
                            published.id,
                        )?;
                    }

                    record::link_draft::<T>(self.dbconn, draft.id, published.id)?;
                    published.id
                }
            };

            // Re-read, as the row just changed under us.
            let published = record::find::<T>(self.dbconn, published)?
                .ok_or_else(|| PublishError::Database(DbError::NotFound))?;
            Ok((published, draft.id))
        })?;

        audit::log(T::TABLE, published.id, "publish", LogPublish {
            draft: draft_id,
            deleted_draft: delete,
        });

        Ok(published)
    }

    /// Throw away the entity's draft.
    ///
    /// With a published counterpart, references held by third parties are
    /// re-pointed at it before the draft is deleted. Without one there is
    /// nothing to fall back to and the entity is deleted entirely. A missing
    /// draft is a silent no-op.
    pub fn discard_draft(&self, update_relations: bool) -> Result<(), DbError> {
        let discarded = self.dbconn.transaction::<_, DbError, _>(|| {
            let draft = match self.get_draft_version()? {
                Some(draft) => draft,
                None => return Ok(None),
            };

            if let Some(published) = self.get_published_version()? {
                if update_relations {
                    relations::rewire(
                        self.dbconn,
                        T::relations(),
                        &T::update_relations_exclude(&draft),
                        draft.id,
                        published.id,
                    )?;
                }
            }

            record::delete_row::<T>(self.dbconn, draft.id)?;
            Ok(Some(draft.id))
        })?;

        if let Some(id) = discarded {
            audit::log(T::TABLE, id, "discard-draft", ());
        }

        Ok(())
    }

    /// Queue the published row for deletion, discarding any pending draft:
    /// a deletion request supersedes in-flight edits.
    pub fn request_deletion(&self)
    -> Result<VersionedRecord, RequestDeletionError> {
        let published = self.dbconn.transaction(|| {
            let published = self.get_published_version()?
                .ok_or(RequestDeletionError::NotPublished)?;

            record::set_deletion_requested::<T>(self.dbconn, published.id, true)?;

            Publisher::<T>::from_record(self.dbconn, published.clone())
                .discard_draft(true)?;

            record::find::<T>(self.dbconn, published.id)?
                .ok_or_else(|| RequestDeletionError::Database(DbError::NotFound))
        })?;

        audit::log(T::TABLE, published.id, "request-deletion", ());

        Ok(published)
    }

    /// Clear the deletion request flag.
    pub fn discard_deletion_request(&self)
    -> Result<VersionedRecord, RequestDeletionError> {
        let published = self.dbconn.transaction(|| {
            let published = self.get_published_version()?
                .ok_or(RequestDeletionError::NotPublished)?;

            record::set_deletion_requested::<T>(self.dbconn, published.id, false)?;

            record::find::<T>(self.dbconn, published.id)?
                .ok_or_else(|| RequestDeletionError::Database(DbError::NotFound))
        })?;

        audit::log(T::TABLE, published.id, "discard-deletion-request", ());

        Ok(published)
    }

    /// Carry out a requested deletion, permanently removing the published
    /// row. The only operation that removes a published identity.
    pub fn publish_deletion(&self) -> Result<(), PublishDeletionError> {
        let id = self.dbconn.transaction(|| {
            let published = self.get_published_version()?
                .ok_or(PublishDeletionError::NotRequested)?;

            if !published.deletion_requested {
                return Err(PublishDeletionError::NotRequested);
            }

            record::delete_row::<T>(self.dbconn, published.id)?;
            Ok(published.id)
        })?;

        audit::log(T::TABLE, id, "publish-deletion", ());

        Ok(())
    }
}

#[derive(Serialize)]
struct LogCreateDraft {
    published: Option<i32>,
}

#[derive(Serialize)]
struct LogPublish {
    draft: i32,
    deleted_draft: bool,
}

#[derive(Debug, Fail)]
pub enum FindRecordError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    Database(#[cause] DbError),
    /// No record found matching given criteria.
    #[fail(display = "No such record")]
    NotFound,
}

impl_from! { for FindRecordError ;
    DbError => |e| FindRecordError::Database(e),
}

#[derive(Debug, Fail)]
pub enum CreateDraftError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    Database(#[cause] DbError),
    /// Another draft already exists for this published row.
    #[fail(display = "There is already a draft of this record")]
    Exists,
    /// The record has no published row to create a draft from.
    #[fail(display = "Record has no published version to derive a draft from")]
    NotPublished,
}

impl_from! { for CreateDraftError ;
    DbError => |e| match e {
        DbError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) =>
            CreateDraftError::Exists,
        _ => CreateDraftError::Database(e),
    }
}

#[derive(Debug, Fail)]
pub enum PublishError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    Database(#[cause] DbError),
    /// The entity's validation hook rejected the content.
    #[fail(display = "Record cannot be published: {}", _0)]
    Validation(#[cause] ValidationError),
    /// There is no draft to publish.
    #[fail(display = "There is nothing to publish")]
    NothingToPublish,
}

impl_from! { for PublishError ;
    DbError => |e| PublishError::Database(e),
    ValidationError => |e| PublishError::Validation(e),
}

#[derive(Debug, Fail)]
pub enum RequestDeletionError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    Database(#[cause] DbError),
    /// There is no published row to request deletion of.
    #[fail(display = "Record has no published version")]
    NotPublished,
}

impl_from! { for RequestDeletionError ;
    DbError => |e| RequestDeletionError::Database(e),
}

#[derive(Debug, Fail)]
pub enum PublishDeletionError {
    /// Database error.
    #[fail(display = "Database error: {}", _0)]
    Database(#[cause] DbError),
    /// Deletion was never requested for this record.
    #[fail(display = "Deletion of this record has not been requested")]
    NotRequested,
}

impl_from! { for PublishDeletionError ;
    DbError => |e| PublishDeletionError::Database(e),
}
