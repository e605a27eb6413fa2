//! Per-language versioning of translated records.
//!
//! A translated record is split into a language-independent *master* row and
//! one *translation* row per language, each translation independently subject
//! to the draft/published state machine. Draft translations attach to the
//! draft master, published translations to the published master; the master's
//! own draft/published existence is a projection of its translations. A draft
//! master is created on demand when a translation is drafted and collapses
//! once it holds no more draft translations.

use chrono::Utc;
use diesel::{
    Connection as _Connection,
    prelude::*,
    result::Error as DbError,
    sql_types::{Bool, Integer, Nullable, Text, Timestamp},
};
use std::collections::HashMap;

use crate::{audit, db::Connection};
use super::{
    copying::{self, NewVersion},
    publisher::{
        CreateDraftError,
        FindRecordError,
        PublishDeletionError,
        PublishError,
        PublishOptions,
        Publisher,
        RequestDeletionError,
    },
    record::{self, Versioned, VersionedRecord},
    relations,
    state::{self, Action, AvailableAction, StateData},
};

/// A versioned record which is a translation of a versioned master record.
pub trait Translated: Versioned {
    /// The language-independent parent type.
    type Master: Versioned;

    /// Column holding the foreign key to the master's table.
    const MASTER_COLUMN: &'static str = "master";

    /// Column holding the language code.
    const LANGUAGE_COLUMN: &'static str = "language_code";
}

/// The versioning bookkeeping portion of a translation row.
#[derive(Clone, Debug, PartialEq, QueryableByName, Serialize)]
pub struct TranslationRecord {
    #[sql_type = "Integer"]
    pub id: i32,
    /// The master row this translation belongs to. Draft translations hang
    /// off the draft master, published ones off the published master.
    #[sql_type = "Integer"]
    pub master: i32,
    #[sql_type = "Text"]
    pub language_code: String,
    #[sql_type = "Bool"]
    pub is_published: bool,
    #[sql_type = "Nullable<Integer>"]
    pub published_counterpart: Option<i32>,
    #[sql_type = "Nullable<Timestamp>"]
    pub published_at: Option<chrono::NaiveDateTime>,
    #[sql_type = "Bool"]
    pub deletion_requested: bool,
}

impl TranslationRecord {
    /// View of this row as a plain versioned record, for the hooks shared
    /// with the single-entity machinery.
    pub fn version(&self) -> VersionedRecord {
        VersionedRecord {
            id: self.id,
            is_published: self.is_published,
            published_counterpart: self.published_counterpart,
            published_at: self.published_at,
            deletion_requested: self.deletion_requested,
        }
    }
}

fn select_clause<T: Translated>() -> String {
    format!(
        "id, {master} AS master, {language} AS language_code, is_published, \
         published_counterpart, published_at, deletion_requested",
        master = T::MASTER_COLUMN,
        language = T::LANGUAGE_COLUMN,
    )
}

/// Load a translation row.
pub fn find_translation<T: Translated>(dbconn: &Connection, id: i32)
-> Result<Option<TranslationRecord>, DbError> {
    diesel::sql_query(format!(
        "SELECT {columns} FROM {table} WHERE id = $1",
        columns = select_clause::<T>(),
        table = T::TABLE,
    ))
    .bind::<Integer, _>(id)
    .get_result(dbconn)
    .optional()
}

/// Find the translation of a master row in a given language.
pub fn translation_of<T: Translated>(
    dbconn: &Connection,
    master: i32,
    language: &str,
) -> Result<Option<TranslationRecord>, DbError> {
    diesel::sql_query(format!(
        "SELECT {columns} FROM {table} WHERE {master} = $1 AND {lang} = $2",
        columns = select_clause::<T>(),
        table = T::TABLE,
        master = T::MASTER_COLUMN,
        lang = T::LANGUAGE_COLUMN,
    ))
    .bind::<Integer, _>(master)
    .bind::<Text, _>(language)
    .get_result(dbconn)
    .optional()
}

/// All translations attached to a master row.
pub fn translations_of_master<T: Translated>(dbconn: &Connection, master: i32)
-> Result<Vec<TranslationRecord>, DbError> {
    diesel::sql_query(format!(
        "SELECT {columns} FROM {table} WHERE {master} = $1 ORDER BY {lang}",
        columns = select_clause::<T>(),
        table = T::TABLE,
        master = T::MASTER_COLUMN,
        lang = T::LANGUAGE_COLUMN,
    ))
    .bind::<Integer, _>(master)
    .get_results(dbconn)
}

/// Insert a copy of a translation row under another master, keeping the
/// language and content, with the given bookkeeping.
fn duplicate_translation<T: Translated>(
    dbconn: &Connection,
    source: &TranslationRecord,
    master: i32,
    version: NewVersion,
) -> Result<TranslationRecord, DbError> {
    let columns = copying::content_columns::<T>(&[])
        .iter()
        .map(|c| format!("{}, ", c))
        .collect::<String>();

    diesel::sql_query(format!(
        "INSERT INTO {table} \
           ({columns}{master_col}, {lang_col}, is_published, \
            published_counterpart, published_at, deletion_requested) \
         SELECT {columns}$2, {lang_col}, $3, $4, $5, FALSE \
         FROM {table} WHERE id = $1 \
         RETURNING {returning}",
        table = T::TABLE,
        columns = columns,
        master_col = T::MASTER_COLUMN,
        lang_col = T::LANGUAGE_COLUMN,
        returning = select_clause::<T>(),
    ))
    .bind::<Integer, _>(source.id)
    .bind::<Integer, _>(master)
    .bind::<Bool, _>(version.is_published)
    .bind::<Nullable<Integer>, _>(version.published_counterpart)
    .bind::<Nullable<Timestamp>, _>(version.published_at)
    .get_result(dbconn)
}

/// State machine over one language of a translated record.
///
/// Content transitions are delegated to the same rules as [`Publisher`];
/// on top of that the master's own draft/published pair is kept in sync with
/// the presence of draft/published translations.
pub struct TranslationPublisher<'c, T: Translated> {
    dbconn: &'c Connection,
    record: TranslationRecord,
    _entity: std::marker::PhantomData<T>,
}

impl<'c, T: Translated> TranslationPublisher<'c, T> {
    /// Load the translation whose row has the given id.
    pub fn by_id(dbconn: &'c Connection, id: i32) -> Result<Self, FindRecordError> {
        find_translation::<T>(dbconn, id)?
            .ok_or(FindRecordError::NotFound)
            .map(|record| TranslationPublisher::from_record(dbconn, record))
    }

    /// Wrap an already loaded row.
    pub fn from_record(dbconn: &'c Connection, record: TranslationRecord) -> Self {
        TranslationPublisher {
            dbconn,
            record,
            _entity: std::marker::PhantomData,
        }
    }

    pub fn record(&self) -> &TranslationRecord {
        &self.record
    }

    pub fn language_code(&self) -> &str {
        &self.record.language_code
    }

    fn reload(&self) -> Result<Option<TranslationRecord>, DbError> {
        find_translation::<T>(self.dbconn, self.record.id)
    }

    /// The draft translation for this language, if one exists.
    pub fn get_draft_version(&self) -> Result<Option<TranslationRecord>, DbError> {
        let current = match self.reload()? {
            Some(current) => current,
            None => return Ok(None),
        };

        if !current.is_published {
            return Ok(Some(current));
        }

        // Published translation: look for a draft of the same language under
        // the draft master.
        match record::find_draft_of::<T::Master>(self.dbconn, current.master)? {
            Some(draft_master) => {
                translation_of::<T>(self.dbconn, draft_master.id, &current.language_code)
            }
            None => Ok(None),
        }
    }

    /// The published translation for this language, if one exists.
    pub fn get_published_version(&self) -> Result<Option<TranslationRecord>, DbError> {
        let current = match self.reload()? {
            Some(current) => current,
            None => return Ok(None),
        };

        if current.is_published {
            return Ok(Some(current));
        }

        let draft_master = record::find::<T::Master>(self.dbconn, current.master)?;
        match draft_master.and_then(|master| master.published_counterpart) {
            Some(published_master) => {
                translation_of::<T>(self.dbconn, published_master, &current.language_code)
            }
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

    /// Snapshot of this language's derived state for rendering.
    pub fn state(&self) -> Result<StateData, DbError> {
        Ok(StateData::new(
            self.has_published_version()?,
            self.has_pending_changes()?,
            self.has_pending_deletion_request()?,
        ))
    }

    /// Actions a UI should offer for this translation.
    pub fn available_actions(&self, user: &T::User)
    -> Result<Vec<AvailableAction>, DbError> {
        let draft = self.get_draft_version()?;
        let published = self.get_published_version()?;

        let record = draft.as_ref().or_else(|| published.as_ref());
        let can_publish = record.map_or(false, |record| {
            T::user_can_publish(self.dbconn, &record.version(), user)
        });

        Ok(state::available_actions(
            published.is_some(),
            draft.is_some(),
            published.map_or(false, |p| p.deletion_requested),
            can_publish,
        ))
    }

    pub fn allowed_actions(&self, user: &T::User) -> Result<Vec<Action>, DbError> {
        Ok(self.available_actions(user)?
            .into_iter()
            .filter(|action| action.has_permission)
            .map(|action| action.action)
            .collect())
    }

    /// Publish this language's draft translation.
    ///
    /// Ensures a published master exists first (publishing the master with
    /// its draft kept alive, since other languages may still hold drafts),
    /// then publishes the translation against it. Deleting the last draft
    /// translation collapses the draft master, after re-pointing external
    /// references at the published master.
    pub fn publish(&self, options: PublishOptions)
    -> Result<TranslationRecord, PublishError> {
        let PublishOptions { validate, delete, update_relations, now } = options;

        let (published, draft_id) = self.dbconn.transaction::<_, PublishError, _>(|| {
            let draft = self.get_draft_version()?
                .ok_or(PublishError::NothingToPublish)?;

            if validate {
                T::can_publish(self.dbconn, &draft.version())?;
            }

            let now = now.unwrap_or_else(|| Utc::now().naive_utc());

            let draft_master = record::find::<T::Master>(self.dbconn, draft.master)?
                .ok_or(DbError::NotFound)?;
            let master_publisher =
                Publisher::<T::Master>::from_record(self.dbconn, draft_master.clone());

            let published_master = match master_publisher.get_published_version()? {
                Some(published) => published,
                None => master_publisher.publish(PublishOptions {
                    validate: false,
                    delete: false,
                    update_relations: false,
                    now: Some(now),
                })?,
            };

            let published = match translation_of::<T>(
                self.dbconn,
                published_master.id,
                &draft.language_code,
            )? {
                Some(existing) => {
                    // Update the live translation in place.
                    copying::copy_columns::<T>(self.dbconn, draft.id, existing.id, &[])?;
                    record::mark_published::<T>(self.dbconn, existing.id, now)?;
                    existing.id
                }
                None => duplicate_translation::<T>(self.dbconn, &draft, published_master.id,
                    NewVersion {
                        is_published: true,
                        published_counterpart: None,
                        published_at: Some(now),
                    })?.id,
            };

            let published = find_translation::<T>(self.dbconn, published)?
                .ok_or(DbError::NotFound)?;
            T::copy_relations(self.dbconn, &draft.version(), &published.version())?;

            if update_relations {
                relations::rewire(
                    self.dbconn,
                    T::relations(),
                    &T::update_relations_exclude(&draft.version()),
                    draft.id,
                    published.id,
                )?;
            }

            if delete {
                record::delete_row::<T>(self.dbconn, draft.id)?;

                // No draft translations left: the draft master is orphaned.
                if translations_of_master::<T>(self.dbconn, draft_master.id)?.is_empty() {
                    master_publisher.discard_draft(true)?;
                }
            } else {
                record::link_draft::<T>(self.dbconn, draft.id, published.id)?;
            }

            Ok((published, draft.id))
        })?;

        audit::log(T::TABLE, published.id, "publish", LogPublishTranslation {
            draft: draft_id,
            language: &published.language_code,
        });

        Ok(published)
    }

    /// Create a draft of this language's published translation, creating
    /// the draft master first when none exists yet.
    pub fn create_draft(&self) -> Result<TranslationRecord, CreateDraftError> {
        let draft = self.dbconn.transaction(|| {
            let published = self.get_published_version()?
                .ok_or(CreateDraftError::NotPublished)?;

            if published.deletion_requested {
                record::set_deletion_requested::<T>(self.dbconn, published.id, false)?;
            }

            let published_master = record::find::<T::Master>(self.dbconn, published.master)?
                .ok_or_else(|| CreateDraftError::Database(DbError::NotFound))?;
            let (draft_master, _) =
                Publisher::<T::Master>::from_record(self.dbconn, published_master)
                    .get_or_create_draft()?;

            // The unique (master, language) constraint rejects a concurrent
            // second draft of the same translation.
            let draft = duplicate_translation::<T>(self.dbconn, &published, draft_master.id,
                NewVersion {
                    is_published: false,
                    published_counterpart: Some(published.id),
                    published_at: None,
                })?;
            T::copy_relations(self.dbconn, &published.version(), &draft.version())?;

            find_translation::<T>(self.dbconn, draft.id)?
                .ok_or_else(|| CreateDraftError::Database(DbError::NotFound))
        })?;

        audit::log(T::TABLE, draft.id, "create-draft", LogCreateTranslationDraft {
            published: draft.published_counterpart,
            language: &draft.language_code,
        });

        Ok(draft)
    }

    /// The existing draft translation, or a fresh one.
    pub fn get_or_create_draft(&self)
    -> Result<(TranslationRecord, bool), CreateDraftError> {
        if let Some(draft) = self.get_draft_version()? {
            return Ok((draft, false));
        }
        self.create_draft().map(|draft| (draft, true))
    }

    /// Throw away this language's draft translation. Discards the draft
    /// master too when this was its last draft translation.
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
                        &T::update_relations_exclude(&draft.version()),
                        draft.id,
                        published.id,
                    )?;
                }
            }

            let master = draft.master;
            record::delete_row::<T>(self.dbconn, draft.id)?;

            if translations_of_master::<T>(self.dbconn, master)?.is_empty() {
                if let Some(draft_master) = record::find::<T::Master>(self.dbconn, master)? {
                    if !draft_master.is_published {
                        Publisher::<T::Master>::from_record(self.dbconn, draft_master)
                            .discard_draft(update_relations)?;
                    }
                }
            }

            Ok(Some(draft.id))
        })?;

        if let Some(id) = discarded {
            audit::log(T::TABLE, id, "discard-draft", ());
        }

        Ok(())
    }

    /// Queue this language's published translation for deletion, discarding
    /// any pending draft of it.
    pub fn request_deletion(&self)
    -> Result<TranslationRecord, RequestDeletionError> {
        let published = self.dbconn.transaction(|| {
            let published = self.get_published_version()?
                .ok_or(RequestDeletionError::NotPublished)?;

            record::set_deletion_requested::<T>(self.dbconn, published.id, true)?;

            TranslationPublisher::<T>::from_record(self.dbconn, published.clone())
                .discard_draft(true)?;

            find_translation::<T>(self.dbconn, published.id)?
                .ok_or_else(|| RequestDeletionError::Database(DbError::NotFound))
        })?;

        audit::log(T::TABLE, published.id, "request-deletion", ());

        Ok(published)
    }

    /// Clear the deletion request flag on this language's published
    /// translation.
    pub fn discard_deletion_request(&self)
    -> Result<TranslationRecord, RequestDeletionError> {
        let published = self.dbconn.transaction(|| {
            let published = self.get_published_version()?
                .ok_or(RequestDeletionError::NotPublished)?;

            record::set_deletion_requested::<T>(self.dbconn, published.id, false)?;

            find_translation::<T>(self.dbconn, published.id)?
                .ok_or_else(|| RequestDeletionError::Database(DbError::NotFound))
        })?;

        audit::log(T::TABLE, published.id, "discard-deletion-request", ());

        Ok(published)
    }

    /// Carry out a requested deletion of this language's published
    /// translation. Deletes the published master too once its last
    /// translation is gone.
    pub fn publish_deletion(&self) -> Result<(), PublishDeletionError> {
        let id = self.dbconn.transaction(|| {
            let published = self.get_published_version()?
                .ok_or(PublishDeletionError::NotRequested)?;

            if !published.deletion_requested {
                return Err(PublishDeletionError::NotRequested);
            }

            record::delete_row::<T>(self.dbconn, published.id)?;

            if translations_of_master::<T>(self.dbconn, published.master)?.is_empty() {
                record::delete_row::<T::Master>(self.dbconn, published.master)?;
            }

            Ok(published.id)
        })?;

        audit::log(T::TABLE, id, "publish-deletion", ());

        Ok(())
    }
}

#[derive(Serialize)]
struct LogPublishTranslation<'a> {
    draft: i32,
    language: &'a str,
}

#[derive(Serialize)]
struct LogCreateTranslationDraft<'a> {
    published: Option<i32>,
    language: &'a str,
}

/// State of a translated record in one language, for rendering.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TranslationStateData {
    pub language_code: String,
    #[serde(flatten)]
    pub state: StateData,
}

/// Per-language draft/published pairs of a master, keyed by language.
fn gather_translations<T: Translated>(dbconn: &Connection, master: i32)
-> Result<HashMap<String, (Option<TranslationRecord>, Option<TranslationRecord>)>, DbError> {
    let mut languages = HashMap::new();

    let master = match record::find::<T::Master>(dbconn, master)? {
        Some(master) => master,
        None => return Ok(languages),
    };

    let master_publisher = Publisher::<T::Master>::from_record(dbconn, master);
    let mut rows = Vec::new();
    if let Some(draft_master) = master_publisher.get_draft_version()? {
        rows.extend(translations_of_master::<T>(dbconn, draft_master.id)?);
    }
    if let Some(published_master) = master_publisher.get_published_version()? {
        rows.extend(translations_of_master::<T>(dbconn, published_master.id)?);
    }

    for row in rows {
        let entry = languages
            .entry(row.language_code.clone())
            .or_insert((None, None));
        if row.is_published {
            entry.1 = Some(row);
        } else {
            entry.0 = Some(row);
        }
    }

    Ok(languages)
}

/// The preferred row per language of a master: the draft when one exists
/// (published otherwise), or the other way around when `prefer_drafts` is
/// false. Ordered by language code.
pub fn all_translations<T: Translated>(
    dbconn: &Connection,
    master: i32,
    prefer_drafts: bool,
) -> Result<Vec<TranslationRecord>, DbError> {
    let mut translations = gather_translations::<T>(dbconn, master)?
        .into_iter()
        .filter_map(|(_, (draft, published))| if prefer_drafts {
            draft.or(published)
        } else {
            published.or(draft)
        })
        .collect::<Vec<_>>();

    translations.sort_by(|a, b| a.language_code.cmp(&b.language_code));
    Ok(translations)
}

/// Workflow state of every configured language of a master, in configured
/// order.
///
/// Languages with no translation row at all report the `empty` pseudo-state;
/// it is synthesized for display purposes only, never persisted.
pub fn translation_states<T: Translated>(
    dbconn: &Connection,
    master: i32,
    languages: &[&str],
) -> Result<Vec<TranslationStateData>, DbError> {
    let translations = gather_translations::<T>(dbconn, master)?;

    Ok(languages
        .iter()
        .map(|&language| {
            let state = match translations.get(language) {
                Some((draft, published)) => StateData::new(
                    published.is_some(),
                    draft.is_some(),
                    published.as_ref().map_or(false, |p| p.deletion_requested),
                ),
                None => StateData::new(false, false, false),
            };

            TranslationStateData {
                language_code: language.to_string(),
                state,
            }
        })
        .collect())
}
