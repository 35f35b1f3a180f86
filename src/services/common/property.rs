use std::fmt::Debug;

use futures::stream::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// A reactive property that can be watched for changes.
///
/// When the value changes, all watchers are notified automatically.
/// Each watcher gets the current value immediately when subscribing.
#[derive(Clone)]
pub struct Property<T: Clone + Send + Sync + 'static> {
    tx: watch::Sender<T>,
    rx: watch::Receiver<T>,
}

impl<T: Clone + Send + Sync + 'static> Property<T> {
    /// Create a new property with an initial value.
    pub fn new(initial: T) -> Self {
        let (tx, rx) = watch::channel(initial);
        Self { tx, rx }
    }

    /// Set a new value and notify all watchers.
    ///
    /// Only updates if the value is different (requires PartialEq).
    /// Only accessible within the crate to prevent external modification.
    pub(crate) fn set(&self, new_value: T)
    where
        T: PartialEq,
    {
        let _ = self.tx.send_if_modified(|current| {
            if *current != new_value {
                *current = new_value;
                true
            } else {
                false
            }
        });
    }

    /// Modify the current value in place and notify all watchers.
    pub(crate) fn update(&self, f: impl FnOnce(&mut T))
    where
        T: PartialEq,
    {
        let mut value = self.get();
        f(&mut value);
        self.set(value);
    }

    /// Get the current value.
    ///
    /// This is a synchronous operation that clones the current value.
    pub fn get(&self) -> T {
        self.rx.borrow().clone()
    }

    /// Watch for changes to this property.
    ///
    /// The stream immediately yields the current value, then yields
    /// whenever the value changes.
    pub fn watch(&self) -> impl Stream<Item = T> + Send {
        WatchStream::new(self.rx.clone())
    }
}

impl<T: Clone + Send + Sync + Debug + 'static> Debug for Property<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Property")
            .field("value", &self.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    #[tokio::test]
    async fn watch_yields_current_then_changes() {
        let property = Property::new(1);
        let mut stream = Box::pin(property.watch());

        assert_eq!(stream.next().await, Some(1));

        property.set(2);
        assert_eq!(stream.next().await, Some(2));
    }

    #[test]
    fn set_deduplicates_equal_values() {
        let property = Property::new("a".to_string());
        let mut rx = property.rx.clone();
        rx.mark_unchanged();

        property.set("a".to_string());
        assert!(!rx.has_changed().unwrap_or(true));

        property.set("b".to_string());
        assert!(rx.has_changed().unwrap_or(false));
    }

    #[test]
    fn update_modifies_in_place() {
        let property = Property::new(vec![1, 2]);
        property.update(|v| v.push(3));

        assert_eq!(property.get(), vec![1, 2, 3]);
    }
}
