/// What changed in a [`Drawing`][crate::drawing::Drawing].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    PointAdded,
    StrokeFinished,
    StyleChanged,
    Undone,
    Redone,
}

/// Handle returned by [`Observers::subscribe`], used to unsubscribe again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription(u64);

/// Callbacks notified synchronously whenever the drawing changes.
#[derive(Default)]
pub struct Observers {
    next: u64,
    callbacks: Vec<(Subscription, Box<dyn FnMut(Change)>)>,
}

impl Observers {
    pub fn subscribe(&mut self, callback: impl FnMut(Change) + 'static) -> Subscription {
        let sub = Subscription(self.next);
        self.next += 1;
        self.callbacks.push((sub, Box::new(callback)));
        sub
    }

    /// Removes the callback. Returns `false` if it was already removed.
    pub fn unsubscribe(&mut self, sub: Subscription) -> bool {
        let len = self.callbacks.len();
        self.callbacks.retain(|(s, _)| *s != sub);
        self.callbacks.len() != len
    }

    pub fn notify(&mut self, change: Change) {
        for (_, callback) in &mut self.callbacks {
            callback(change);
        }
    }
}
