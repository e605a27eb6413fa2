//! Draft/published workflow for versioned content records.
//!
//! Every record type opting into versioning (by implementing [`Versioned`])
//! can exist as a *draft* row (editable, invisible to consumers) and/or
//! a *published* row (visible, immutable except through the workflow). The
//! [`Publisher`] state machine owns the transitions between the two, keeping
//! foreign keys held by other tables pointing at the correct identity, and
//! [`TranslationPublisher`] applies the same machine independently per
//! language of a translated record.

pub mod copying;
pub mod publisher;
pub mod record;
pub mod relations;
pub mod state;
pub mod translations;

pub use self::{
    copying::NewVersion,
    publisher::{
        CreateDraftError,
        FindRecordError,
        PublishDeletionError,
        PublishError,
        PublishOptions,
        Publisher,
        RequestDeletionError,
    },
    record::{ValidationError, Versioned, VersionedRecord},
    relations::{Relation, rewire},
    state::{Action, AvailableAction, StateData, VersionState},
    translations::{
        Translated,
        TranslationPublisher,
        TranslationRecord,
        TranslationStateData,
        all_translations,
        translation_states,
    },
};
