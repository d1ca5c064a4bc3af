use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const REAPER_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    Never,
    At(Instant),
}

impl Expiry {
    pub fn from_duration(ttl: Duration) -> Expiry {
        match Instant::now().checked_add(ttl) {
            Some(deadline) => Expiry::At(deadline),
            None => Expiry::At(Instant::now()),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        matches!(self, Expiry::At(deadline) if *deadline <= now)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expiry: Expiry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
    Default,
    Nx,
    Xx,
}

pub struct SetRequest<'a> {
    pub key: &'a [u8],
    pub value: &'a [u8],
    pub expiry: Expiry,
    pub mode: SetMode,
    pub keep_ttl: bool,
}

#[derive(Debug, Default)]
pub struct SetOutcome {
    pub previous: Option<Vec<u8>>,
    pub existed: bool,
    pub was_set: bool,
}

type Store = Mutex<HashMap<Vec<u8>, Entry>>;
type StopSignal = (Mutex<bool>, Condvar);

pub struct Keyspace {
    store: Arc<Store>,
    reaper_stop: Arc<StopSignal>,
    reaper_handle: Option<JoinHandle<()>>,
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Keyspace {
    pub fn new() -> Self {
        let mut ks = Keyspace {
            store: Arc::new(Mutex::new(HashMap::new())),
            reaper_stop: Arc::new((Mutex::new(false), Condvar::new())),
            reaper_handle: None,
        };
        ks.spawn_reaper();
        ks
    }

    fn spawn_reaper(&mut self) {
        let store = self.store.clone();
        let stop = self.reaper_stop.clone();
        self.reaper_handle = Some(thread::spawn(move || Self::reaper_loop(store, stop)));
    }

    fn reaper_loop(store: Arc<Store>, stop: Arc<StopSignal>) {
        let (stop_requested, stop_cv) = &*stop;
        let mut guard = stop_requested.lock().unwrap();
        loop {
            if *guard {
                return;
            }
            drop(guard);

            let now = Instant::now();
            let mut store = store.lock().unwrap();
            store.retain(|_, entry| !entry.expiry.is_expired(now));
            drop(store);

            guard = stop_requested.lock().unwrap();
            let (g, _) = stop_cv.wait_timeout(guard, REAPER_INTERVAL).unwrap();
            guard = g;
        }
    }

    // Lazily removes the entry if it has expired.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let mut store = self.store.lock().unwrap();
        match store.get(key) {
            Some(entry) if entry.expiry.is_expired(Instant::now()) => {
                store.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    pub fn set(&self, req: SetRequest) -> SetOutcome {
        let mut store = self.store.lock().unwrap();

        let now = Instant::now();
        let current = store
            .get(req.key)
            .filter(|entry| !entry.expiry.is_expired(now));
        let existed = current.is_some();

        let was_set = match req.mode {
            SetMode::Default => true,
            SetMode::Nx => !existed,
            SetMode::Xx => existed,
        };

        let previous = current.map(|entry| entry.value.clone());

        if was_set {
            let expiry = if req.keep_ttl {
                match store.get(req.key) {
                    Some(entry) if !entry.expiry.is_expired(now) => entry.expiry,
                    _ => Expiry::Never,
                }
            } else {
                req.expiry
            };
            store.insert(
                req.key.to_vec(),
                Entry {
                    value: req.value.to_vec(),
                    expiry,
                },
            );
        }

        SetOutcome {
            previous,
            existed,
            was_set,
        }
    }

    pub fn delete(&self, key: &[u8]) -> bool {
        let now = Instant::now();
        let mut store = self.store.lock().unwrap();
        match store.remove(key) {
            Some(entry) => !entry.expiry.is_expired(now),
            None => false,
        }
    }
}

impl Drop for Keyspace {
    fn drop(&mut self) {
        if let Some(handle) = self.reaper_handle.take() {
            let (stop_requested, stop_cv) = &*self.reaper_stop;
            *stop_requested.lock().unwrap() = true;
            stop_cv.notify_all();
            let _ = handle.join();
        }
    }
}
