//! Audit trail of workflow transitions.
//!
//! Every state transition performed by the versioning machinery is recorded
//! here, attributed to the actor registered on the current thread. Entries are
//! emitted through the `log` facade under the `publisher::audit` target, as
//! JSON-serializable payloads describing the transition.

use serde::Serialize;
use std::cell::Cell;

std::thread_local! {
    static ACTOR: Cell<Option<Actor>> = Cell::new(None);
}

/// Entity responsible for an action.
#[derive(Clone, Copy, Debug)]
pub enum Actor {
    /// System. This actor is used for actions carried automatically by the
    /// system, and when no actor was registered on the current thread.
    System,
    /// A user.
    User(i32),
}

impl From<i32> for Actor {
    fn from(id: i32) -> Self {
        Actor::User(id)
    }
}

/// Set actor associated with the current thread, returning previous one,
/// if any.
pub fn set_actor<A>(actor: A) -> Option<Actor>
where
    Option<Actor>: From<A>,
{
    ACTOR.with(|c| c.replace(Option::from(actor)))
}

/// Get actor associated with the current thread.
pub fn get_actor() -> Actor {
    ACTOR.with(Cell::get).unwrap_or(Actor::System)
}

/// Run closure in such context that all actions it causes are attributed to
/// the specified actor.
pub fn with_actor<A, F, R>(actor: A, f: F) -> R
where
    Option<Actor>: From<A>,
    F: FnOnce() -> R,
{
    let old = set_actor(actor);
    let r = f();
    set_actor::<Option<Actor>>(old);
    r
}

/// Record an event in the audit trail, attributed to the current actor.
///
/// `context` names the table of the record the event concerns, `context_id`
/// its row, and `kind` the transition performed.
pub fn log<D>(context: &str, context_id: i32, kind: &str, data: D)
where
    D: Serialize,
{
    log_actor(get_actor(), context, context_id, kind, data);
}

/// Record an event in the audit trail, attributed to a specific actor.
pub fn log_actor<A, D>(actor: A, context: &str, context_id: i32, kind: &str, data: D)
where
    Actor: From<A>,
    D: Serialize,
{
    let actor = Actor::from(actor);
    let data = serde_json::to_string(&data)
        .unwrap_or_else(|_| "null".to_string());

    info!(
        target: "publisher::audit",
        "{:?} {} {}:{} {}",
        actor, kind, context, context_id, data,
    );
}
