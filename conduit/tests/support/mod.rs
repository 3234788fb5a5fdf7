#![allow(dead_code)]

use conduit::{Connection, Events, Handler};

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Once;

/// Installs a log subscriber once per test binary; `RUST_LOG` selects
/// the level.
pub fn init_tracing() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// What a [`Recorder`] observed.
#[derive(Clone, Default)]
pub struct Log {
    pub events: Rc<RefCell<Vec<Events>>>,
    pub data_calls: Rc<Cell<usize>>,
    pub sendable_calls: Rc<Cell<usize>>,
}

impl Log {
    pub fn events(&self) -> Vec<Events> {
        self.events.borrow().clone()
    }
}

/// A handler that records every callback.
///
/// With `stop_on_event` set, every event also stops the reactor so a test
/// can `run` until the next state change.
pub struct Recorder {
    log: Log,
    stop_on_event: bool,
    stop_at_available: Option<usize>,
}

impl Recorder {
    pub fn new(log: &Log) -> Self {
        Self {
            log: log.clone(),
            stop_on_event: false,
            stop_at_available: None,
        }
    }

    pub fn stop_on_event(mut self) -> Self {
        self.stop_on_event = true;
        self
    }

    pub fn stop_at_available(mut self, n: usize) -> Self {
        self.stop_at_available = Some(n);
        self
    }
}

impl Handler for Recorder {
    fn on_data(&mut self, conn: &Connection) {
        self.log.data_calls.set(self.log.data_calls.get() + 1);

        if self.stop_at_available.is_some_and(|n| conn.available() >= n) {
            conn.reactor().stop();
        }
    }

    fn on_sendable(&mut self, conn: &Connection) {
        self.log.sendable_calls.set(self.log.sendable_calls.get() + 1);
        conn.reactor().stop();
    }

    fn on_event(&mut self, conn: &Connection, events: Events) {
        self.log.events.borrow_mut().push(events);

        if self.stop_on_event {
            conn.reactor().stop();
        }
    }
}
