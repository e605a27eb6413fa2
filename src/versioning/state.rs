//! Derived workflow state and the actions a UI should offer for it.

/// Workflow state of a logical entity, derived from which of its rows exist.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionState {
    /// Published, no draft.
    Published,
    /// Draft only, never published.
    NotPublished,
    /// Published with a draft carrying unpublished edits.
    PendingChanges,
    /// Published and queued for deletion.
    PendingDeletion,
    /// No row at all. Never persisted; synthesized for display of languages
    /// a translated record has no content in.
    Empty,
}

impl VersionState {
    pub fn classify(
        has_published_version: bool,
        has_pending_changes: bool,
        has_pending_deletion_request: bool,
    ) -> VersionState {
        if has_pending_deletion_request {
            VersionState::PendingDeletion
        } else if has_published_version && has_pending_changes {
            VersionState::PendingChanges
        } else if has_published_version {
            VersionState::Published
        } else if has_pending_changes {
            VersionState::NotPublished
        } else {
            VersionState::Empty
        }
    }

    pub fn identifier(&self) -> &'static str {
        match *self {
            VersionState::Published => "published",
            VersionState::NotPublished => "not_published",
            VersionState::PendingChanges => "pending_changes",
            VersionState::PendingDeletion => "pending_deletion",
            VersionState::Empty => "empty",
        }
    }

    /// Human label for rendering.
    pub fn text(&self) -> &'static str {
        match *self {
            VersionState::Published => "Published",
            VersionState::NotPublished => "Not published",
            VersionState::PendingChanges => "Published, pending changes",
            VersionState::PendingDeletion => "Published, pending deletion",
            VersionState::Empty => "No content",
        }
    }
}

/// A snapshot of derived workflow state, consumed purely for rendering.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StateData {
    pub is_published: bool,
    pub has_pending_changes: bool,
    pub has_pending_deletion_request: bool,
    pub identifier: VersionState,
    pub text: &'static str,
}

impl StateData {
    pub fn new(
        has_published_version: bool,
        has_pending_changes: bool,
        has_pending_deletion_request: bool,
    ) -> StateData {
        let identifier = VersionState::classify(
            has_published_version,
            has_pending_changes,
            has_pending_deletion_request,
        );

        StateData {
            is_published: has_published_version,
            has_pending_changes,
            has_pending_deletion_request,
            identifier,
            text: identifier.text(),
        }
    }

    /// Status suffix for object labels, or `None` for clean published state.
    pub fn status_text(&self) -> Option<&'static str> {
        match self.identifier {
            VersionState::PendingDeletion => Some("Pending deletion"),
            VersionState::PendingChanges => Some("Unpublished changes"),
            VersionState::NotPublished => Some("Not published"),
            _ => None,
        }
    }

    /// Decorate a label with the status suffix, e.g. `"About us [NOT
    /// PUBLISHED]"`.
    pub fn status_label(&self, label: &str) -> String {
        match self.status_text() {
            Some(status) => format!("{} [{}]", label, status.to_uppercase()),
            None => label.to_string(),
        }
    }
}

/// A workflow operation a UI can offer.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Publish,
    DiscardDraft,
    CreateDraft,
    RequestDeletion,
    DiscardRequestedDeletion,
    PublishDeletion,
}

/// An offered action, tagged with whether the user is authorized for it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct AvailableAction {
    pub action: Action,
    pub has_permission: bool,
}

/// Actions available in the given derived state.
///
/// `user_can_publish` gates `Publish` and `PublishDeletion`; everything else
/// is available to anyone who can see the record at all.
pub(crate) fn available_actions(
    has_published_version: bool,
    has_pending_changes: bool,
    has_pending_deletion_request: bool,
    user_can_publish: bool,
) -> Vec<AvailableAction> {
    let allowed = |action| AvailableAction { action, has_permission: true };
    let publishing = |action| AvailableAction {
        action,
        has_permission: user_can_publish,
    };

    if has_pending_deletion_request {
        return vec![
            allowed(Action::DiscardRequestedDeletion),
            publishing(Action::PublishDeletion),
        ];
    }

    let mut actions = Vec::new();
    if has_pending_changes {
        actions.push(publishing(Action::Publish));
        if has_published_version {
            actions.push(allowed(Action::DiscardDraft));
        }
    } else if has_published_version {
        actions.push(allowed(Action::CreateDraft));
        actions.push(allowed(Action::RequestDeletion));
    }

    actions
}
