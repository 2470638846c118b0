use std::{
    sync::{Arc, Condvar, Mutex, RwLock},
    time::Duration,
};

/// Latest-value cell: one writer replaces the whole value, readers get a
/// shared handle to a complete value and never see a partial write.
#[derive(Debug)]
pub struct Latest<T> {
    inner: RwLock<Option<Arc<T>>>,
}

impl<T> Default for Latest<T> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }
}

impl<T> Latest<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, value: T) {
        let value = Arc::new(value);
        match self.inner.write() {
            Ok(mut g) => *g = Some(value),
            Err(poisoned) => *poisoned.into_inner() = Some(value),
        }
    }

    pub fn get(&self) -> Option<Arc<T>> {
        match self.inner.read() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn clear(&self) {
        match self.inner.write() {
            Ok(mut g) => *g = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }
}

#[derive(Debug)]
struct SlotState<T> {
    value: Option<T>,
    closed: bool,
    dropped: u64,
}

/// Capacity-1 hand-off slot. Publishing over an untaken value discards the
/// old one, consumers always get the freshest value.
#[derive(Debug)]
pub struct SingleSlot<T> {
    state: Mutex<SlotState<T>>,
    ready: Condvar,
}

impl<T> Default for SingleSlot<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(SlotState {
                value: None,
                closed: false,
                dropped: 0,
            }),
            ready: Condvar::new(),
        }
    }
}

impl<T> SingleSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SlotState<T>> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Overwrites any value nobody took yet.
    pub fn publish(&self, value: T) {
        let mut g = self.lock();
        if g.value.replace(value).is_some() {
            g.dropped += 1;
        }
        drop(g);
        self.ready.notify_all();
    }

    /// Blocks until a value is published, returns `None` once the slot is closed.
    pub fn take(&self) -> Option<T> {
        let g = self.lock();
        let mut g = self
            .ready
            .wait_while(g, |st| st.value.is_none() && !st.closed)
            .unwrap_or_else(|p| p.into_inner());
        g.value.take()
    }

    pub fn take_timeout(&self, timeout: Duration) -> Option<T> {
        let g = self.lock();
        let (mut g, _) = self
            .ready
            .wait_timeout_while(g, timeout, |st| st.value.is_none() && !st.closed)
            .unwrap_or_else(|p| p.into_inner());
        g.value.take()
    }

    pub fn try_take(&self) -> Option<T> {
        self.lock().value.take()
    }

    /// Wakes every blocked consumer; later `take` calls return immediately.
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }
}
