use super::state::{ViewOptions, ViewState, project};
use crate::core::DenormalizedRecord;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{Level, event};

/// Listener called with every new [`ViewState`].
pub type Listener = Arc<dyn Fn(&ViewState) + Send + Sync>;

/// Handle returned by [`ViewProjector::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Published {
    state: Option<ViewState>,
    sequence: u64,
}

/// Holds the current view state and notifies subscribers when it changes.
///
/// Listeners run synchronously on the publishing task, after the internal
/// locks are released, so a listener may call back into the projector.
#[derive(Default)]
pub struct ViewProjector {
    published: Mutex<Published>,
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
    next_id: AtomicU64,
    next_sequence: AtomicU64,
}

impl ViewProjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&ViewState) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push((id, Arc::new(listener)));
        }
        id
    }

    /// Returns whether the listener was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        match self.listeners.lock() {
            Ok(mut listeners) => {
                let before = listeners.len();
                listeners.retain(|(candidate, _)| *candidate != id);
                listeners.len() != before
            }
            Err(_) => false,
        }
    }

    pub fn current(&self) -> Option<ViewState> {
        self.published.lock().ok().and_then(|p| p.state.clone())
    }

    /// Projects and publishes in one step.
    pub fn project(&self, records: Vec<DenormalizedRecord>, options: &ViewOptions) -> ViewState {
        let state = project(records, options);
        let sequence = self.next_sequence();
        self.publish(sequence, state.clone());
        state
    }

    /// Token ordering publications made through [`ViewProjector::publish`].
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Publishes `state` unless a newer sequence was already published.
    ///
    /// Listeners only hear about states that differ from the current one.
    /// Returns whether the state was accepted.
    pub fn publish(&self, sequence: u64, state: ViewState) -> bool {
        {
            let Ok(mut published) = self.published.lock() else {
                return false;
            };
            if sequence < published.sequence {
                event!(Level::DEBUG, sequence, latest = published.sequence, "stale view state dropped");
                return false;
            }
            published.sequence = sequence;
            if published.state.as_ref() == Some(&state) {
                return true;
            }
            published.state = Some(state.clone());
        }

        let listeners: Vec<Listener> = match self.listeners.lock() {
            Ok(listeners) => listeners.iter().map(|(_, l)| Arc::clone(l)).collect(),
            Err(_) => Vec::new(),
        };
        for listener in listeners {
            listener(&state);
        }
        true
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().map(|l| l.len()).unwrap_or(0)
    }
}
