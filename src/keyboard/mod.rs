//! Keyboard Binding
//!
//! The host owns a [`KeyDispatcher`] and feeds it every key press. A wizard
//! session holds a [`KeyboardBinding`] on it for exactly as long as it is
//! open: ArrowRight advances, ArrowLeft retreats. Dropping the binding
//! deregisters the handler and stops its task.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crossterm::event::KeyEvent;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::tui::events::keys;
use crate::wizard::WeakController;

type Handler = Arc<dyn Fn(&KeyEvent) + Send + Sync>;

#[derive(Default)]
struct Handlers {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<u64, Handler>>,
}

impl Handlers {
    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Handler>> {
        self.handlers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Fan-out of key presses to every registered handler.
#[derive(Clone, Default)]
pub struct KeyDispatcher {
    inner: Arc<Handlers>,
}

impl KeyDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. It stays registered until the returned
    /// [`Registration`] is dropped.
    pub fn register<F>(&self, handler: F) -> Registration
    where
        F: Fn(&KeyEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.lock().insert(id, Arc::new(handler));
        Registration {
            id,
            dispatcher: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver a key to every handler. Returns how many received it.
    pub fn dispatch(&self, event: &KeyEvent) -> usize {
        // Call outside the lock so handlers may register or drop others.
        let handlers: Vec<Handler> = self.inner.lock().values().cloned().collect();
        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    pub fn handler_count(&self) -> usize {
        self.inner.lock().len()
    }
}

/// Keeps a handler registered while alive.
#[must_use = "the handler is removed as soon as the registration is dropped"]
pub struct Registration {
    id: u64,
    dispatcher: Weak<Handlers>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(dispatcher) = self.dispatcher.upgrade() {
            dispatcher.lock().remove(&self.id);
        }
    }
}

/// Navigation requested by a key press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavCommand {
    Advance,
    Retreat,
}

impl NavCommand {
    pub fn from_key(event: &KeyEvent) -> Option<Self> {
        if keys::is_right(event) {
            Some(Self::Advance)
        } else if keys::is_left(event) {
            Some(Self::Retreat)
        } else {
            None
        }
    }
}

/// Arrow-key navigation scoped to one open wizard session.
pub struct KeyboardBinding {
    _registration: Registration,
    task: JoinHandle<()>,
}

impl KeyboardBinding {
    /// Register on `dispatcher` and start the task that applies commands.
    ///
    /// Must be called inside a tokio runtime. Holds the controller weakly
    /// so the binding never keeps a session alive.
    pub fn acquire(dispatcher: &KeyDispatcher, controller: WeakController) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<NavCommand>();

        let guard = controller.clone();
        let registration = dispatcher.register(move |event| {
            let Some(command) = NavCommand::from_key(event) else {
                return;
            };
            let Some(wizard) = guard.upgrade() else {
                return;
            };
            // Guard at press time: a key pressed while busy is dropped, not queued.
            let allowed = match command {
                NavCommand::Advance => wizard.can_advance(),
                NavCommand::Retreat => wizard.can_retreat(),
            };
            if allowed {
                let _ = tx.send(command);
            }
        });

        let task = tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                let Some(wizard) = controller.upgrade() else {
                    break;
                };
                let result = match command {
                    NavCommand::Advance => wizard.advance().await,
                    NavCommand::Retreat => wizard.retreat(),
                };
                match result {
                    Ok(transition) => {
                        tracing::debug!("Key {:?} -> {:?}", command, transition)
                    }
                    Err(e) => tracing::debug!("Key {:?} ignored: {}", command, e),
                }
            }
        });

        tracing::debug!("Keyboard binding acquired");
        Self {
            _registration: registration,
            task,
        }
    }
}

impl Drop for KeyboardBinding {
    fn drop(&mut self) {
        self.task.abort();
        tracing::debug!("Keyboard binding released");
    }
}
