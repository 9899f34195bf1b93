use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Default)]
struct Registry {
    next_id: u64,
    active: Vec<(u64, &'static str)>,
}

// Process-wide key subscriptions. The newest subscriber sees keys first.
#[derive(Clone, Default)]
pub struct KeyListeners {
    inner: Arc<Mutex<Registry>>,
}

impl KeyListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, name: &'static str) -> KeyListener {
        let mut registry = self.inner.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.active.push((id, name));
        tracing::debug!(name, id, "key listener added");
        KeyListener {
            id,
            listeners: self.clone(),
        }
    }

    pub fn top(&self) -> Option<&'static str> {
        self.inner.lock().active.last().map(|(_, name)| *name)
    }

    pub fn is_subscribed(&self, name: &str) -> bool {
        self.inner
            .lock()
            .active
            .iter()
            .any(|(_, active)| *active == name)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct KeyListener {
    id: u64,
    listeners: KeyListeners,
}

impl Drop for KeyListener {
    fn drop(&mut self) {
        let mut registry = self.listeners.inner.lock();
        registry.active.retain(|(id, _)| *id != self.id);
        tracing::debug!(id = self.id, "key listener removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_unsubscribes_on_drop() {
        let listeners = KeyListeners::new();
        let chat = listeners.subscribe("chat");
        {
            let _search = listeners.subscribe("search");
            assert_eq!(listeners.top(), Some("search"));
            assert_eq!(listeners.len(), 2);
        }
        assert_eq!(listeners.top(), Some("chat"));
        drop(chat);
        assert!(listeners.is_empty());
        assert!(!listeners.is_subscribed("chat"));
    }
}
