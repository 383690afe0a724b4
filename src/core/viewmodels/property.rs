use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::watch;

/// Observable value shared between a producer and any number of observers.
///
/// Observers see the latest value only; intermediate values written while an
/// observer was not looking are skipped.
pub struct Property<T: Clone + Send + Sync> {
    sender: Arc<watch::Sender<T>>,
    name: String,
}

impl<T: Clone + Send + Sync> Clone for Property<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            name: self.name.clone(),
        }
    }
}

impl<T: Clone + Send + Sync> Property<T> {
    pub fn new(initial_value: T, name: impl Into<String>) -> Self {
        let (sender, _) = watch::channel(initial_value);
        Self {
            sender: Arc::new(sender),
            name: name.into(),
        }
    }

    pub fn get(&self) -> T {
        self.sender.borrow().clone()
    }

    pub fn set(&self, new_value: T) {
        self.sender.send_replace(new_value);
    }

    pub fn update<F>(&self, updater: F)
    where
        F: FnOnce(&mut T),
    {
        self.sender.send_modify(updater);
    }

    /// Each call returns an independent subscriber. Dropping it stops
    /// delivery to that subscriber and nothing else.
    pub fn subscribe(&self) -> PropertySubscriber<T> {
        PropertySubscriber {
            receiver: self.sender.subscribe(),
        }
    }

    /// Resolve with the first value, current or future, matching `predicate`
    pub async fn wait_for<F>(&self, mut predicate: F) -> T
    where
        F: FnMut(&T) -> bool,
    {
        let mut receiver = self.sender.subscribe();
        match receiver.wait_for(|value| predicate(value)).await {
            Ok(value) => value.clone(),
            // The sender lives as long as `self`, so this is unreachable in
            // practice; fall back to the current value.
            Err(_) => self.get(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<T: Clone + Send + Sync + Debug> Debug for Property<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Property({})", self.name)
    }
}

// Intentionally not Clone: every observer asks the property for its own.
pub struct PropertySubscriber<T> {
    receiver: watch::Receiver<T>,
}

impl<T: Clone> PropertySubscriber<T> {
    /// Wait for the next change and return the new value.
    /// `None` once the property is gone.
    pub async fn changed(&mut self) -> Option<T> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// The latest value without waiting, marking it seen
    pub fn latest(&mut self) -> T {
        self.receiver.borrow_and_update().clone()
    }

    pub fn has_changed(&self) -> bool {
        self.receiver.has_changed().unwrap_or(false)
    }
}
