//! Model lifecycle events.
//!
//! Persistence operations announce themselves through an
//! [`EventDispatcher`]. Events fired *before* an operation (`saving`,
//! `creating`, `updating`, `deleting`, `restoring`) go through
//! [`EventDispatcher::until`], and a listener returning `false` cancels the
//! operation. The rest are fired after the fact.
//!
//! Event names have the form `quarry.{event}: {Model}`:
//!
//! ```rust
//! use quarry_model::events::{event_name, ModelEvent};
//!
//! assert_eq!(event_name(ModelEvent::Saving, "User"), "quarry.saving: User");
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::model::Model;

/// A point in a model's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelEvent {
    Saving,
    Saved,
    Creating,
    Created,
    Updating,
    Updated,
    Deleting,
    Deleted,
    Restoring,
    Restored,
}

impl ModelEvent {
    /// The event name fragment.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Saving => "saving",
            Self::Saved => "saved",
            Self::Creating => "creating",
            Self::Created => "created",
            Self::Updating => "updating",
            Self::Updated => "updated",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
            Self::Restoring => "restoring",
            Self::Restored => "restored",
        }
    }

    /// Whether listeners can cancel the operation.
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            Self::Saving | Self::Creating | Self::Updating | Self::Deleting | Self::Restoring
        )
    }
}

impl fmt::Display for ModelEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The full event name for a model.
pub fn event_name(event: ModelEvent, model: &str) -> String {
    format!("quarry.{}: {}", event, model)
}

/// Receives model events.
pub trait EventDispatcher: Send + Sync {
    /// Fire an event and stop at the first listener returning `false`.
    ///
    /// Returns `false` when a listener vetoed.
    fn until(&self, event: &str, model: &Model) -> bool;

    /// Fire an event to every listener.
    fn fire(&self, event: &str, model: &Model);
}

/// A dispatcher without listeners; nothing is ever cancelled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDispatcher;

impl EventDispatcher for NullDispatcher {
    fn until(&self, _event: &str, _model: &Model) -> bool {
        true
    }

    fn fire(&self, _event: &str, _model: &Model) {}
}

type Listener = Arc<dyn Fn(&Model) -> bool + Send + Sync>;

/// An in-process listener registry.
///
/// ```rust
/// use quarry_model::events::{Dispatcher, ModelEvent};
///
/// let dispatcher = Dispatcher::new();
/// dispatcher.on(ModelEvent::Creating, "User", |user| user.has_attribute("email"));
/// assert!(dispatcher.has_listeners("quarry.creating: User"));
/// ```
#[derive(Default)]
pub struct Dispatcher {
    listeners: RwLock<HashMap<String, Vec<Listener>>>,
}

impl Dispatcher {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen to an event by full name.
    pub fn listen<F>(&self, event: impl Into<String>, listener: F)
    where
        F: Fn(&Model) -> bool + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .entry(event.into())
            .or_default()
            .push(Arc::new(listener));
    }

    /// Listen to a lifecycle event of one model.
    pub fn on<F>(&self, event: ModelEvent, model: &str, listener: F)
    where
        F: Fn(&Model) -> bool + Send + Sync + 'static,
    {
        self.listen(event_name(event, model), listener);
    }

    /// Whether anything listens to an event.
    pub fn has_listeners(&self, event: &str) -> bool {
        self.listeners
            .read()
            .get(event)
            .is_some_and(|listeners| !listeners.is_empty())
    }

    /// Remove every listener of an event.
    pub fn forget(&self, event: &str) {
        self.listeners.write().remove(event);
    }

    // Listeners run outside the lock so they may register others.
    fn listeners_for(&self, event: &str) -> Vec<Listener> {
        self.listeners.read().get(event).cloned().unwrap_or_default()
    }
}

impl EventDispatcher for Dispatcher {
    fn until(&self, event: &str, model: &Model) -> bool {
        self.listeners_for(event)
            .iter()
            .all(|listener| listener(model))
    }

    fn fire(&self, event: &str, model: &Model) {
        for listener in self.listeners_for(event) {
            listener(model);
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.read();
        let mut events: Vec<&String> = listeners.keys().collect();
        events.sort();
        f.debug_struct("Dispatcher").field("events", &events).finish()
    }
}
