//! Fan-in signal dispatch: connects exactly once per (object, signal) pair no matter how many
//! clients subscribe, counts subscriptions for lifecycle, and routes emissions onward.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{CoreError, CoreResult};
use crate::meta::{Connection, DispatchFn, MetaObject, Object};
use crate::value::Value;

pub type MetaProviderFn = Rc<dyn Fn(&Object) -> Option<Rc<dyn MetaObject>>>;
pub type EmitFn = Rc<dyn Fn(&Object, usize, &[Value])>;

struct SignalEntry {
    connection: Connection,
    count: usize,
}

struct ObjectEntry {
    object: Object,
    signals: HashMap<usize, SignalEntry>,
}

type ConnTable = RefCell<HashMap<usize, ObjectEntry>>;

/// Holds a connection per (object, signal_index) and a count of how many `connect_to` calls are
/// outstanding against it. When the count drops to zero the native connection is torn down.
pub struct SignalHandler {
    meta_of: MetaProviderFn,
    on_emit: EmitFn,
    table: Rc<ConnTable>,
}

impl SignalHandler {
    pub fn new(meta_of: MetaProviderFn, on_emit: EmitFn) -> Self {
        Self {
            meta_of,
            on_emit,
            table: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    /// Connect to `signal_index` on `object`, or bump the subscription count if already
    /// connected. Errors if the host doesn't know the object or the index isn't a signal.
    pub fn connect_to(&self, object: &Object, signal_index: usize) -> CoreResult<()> {
        let key = object.ptr_id();
        if let Some(entry) = self.table.borrow_mut().get_mut(&key) {
            if let Some(sig) = entry.signals.get_mut(&signal_index) {
                sig.count += 1;
                return Ok(());
            }
        }

        let meta = (self.meta_of)(object)
            .ok_or_else(|| CoreError::UnknownObject(format!("{:?}", object)))?;
        let methods = meta.methods();
        let is_signal = methods
            .get(signal_index)
            .map(|m| m.is_signal)
            .ok_or(CoreError::BadMethod {
                object: format!("{:?}", object),
                index: signal_index,
            })?;
        if !is_signal {
            return Err(CoreError::BadMethod {
                object: format!("{:?}", object),
                index: signal_index,
            });
        }

        let table = self.table.clone();
        let on_emit = self.on_emit.clone();
        let dispatch_object = object.clone();
        let dispatch: DispatchFn = Rc::new(move |args: &[Value]| {
            forward(&table, &on_emit, &dispatch_object, signal_index, args);
        });
        let connection = meta.connect_signal(object, signal_index, dispatch);

        let mut table = self.table.borrow_mut();
        let entry = table.entry(key).or_insert_with(|| ObjectEntry {
            object: object.clone(),
            signals: HashMap::new(),
        });
        entry.signals.insert(signal_index, SignalEntry { connection, count: 1 });
        Ok(())
    }

    /// Decrement the subscription count for (object, signal_index); disconnect natively once it
    /// reaches zero. Decrementing a pair that was never connected is a no-op.
    pub fn disconnect_from(&self, object: &Object, signal_index: usize) {
        let key = object.ptr_id();
        let mut disconnected = None;
        let mut object_now_empty = false;
        {
            let mut table = self.table.borrow_mut();
            if let Some(entry) = table.get_mut(&key) {
                if let Some(sig) = entry.signals.get_mut(&signal_index) {
                    sig.count = sig.count.saturating_sub(1);
                    if sig.count == 0 {
                        disconnected = entry.signals.remove(&signal_index).map(|s| s.connection);
                    }
                }
                object_now_empty = entry.signals.is_empty();
            }
            if object_now_empty {
                table.remove(&key);
            }
        }
        if let Some(connection) = disconnected {
            if let Some(meta) = (self.meta_of)(object) {
                meta.disconnect_signal(&connection);
            }
        }
    }

    /// Forward an emission if the (object, signal_index) pair is still connected; drop otherwise.
    /// Exposed directly so hosts that dispatch signals out-of-band (tests, synthetic events) can
    /// call it without going through a native `Connection`.
    pub fn dispatch(&self, object: &Object, signal_index: usize, args: &[Value]) {
        forward(&self.table, &self.on_emit, object, signal_index, args);
    }

    /// Disconnect every signal currently held.
    pub fn clear(&self) {
        let entries: Vec<(Object, Vec<usize>)> = self
            .table
            .borrow()
            .values()
            .map(|e| (e.object.clone(), e.signals.keys().copied().collect()))
            .collect();
        for (object, signals) in entries {
            for signal_index in signals {
                // Force the count to zero regardless of how many subscribers remain: clear() is a
                // hard teardown, not a balanced unsubscribe.
                loop {
                    let count = self
                        .table
                        .borrow()
                        .get(&object.ptr_id())
                        .and_then(|e| e.signals.get(&signal_index))
                        .map(|s| s.count);
                    match count {
                        Some(_) => self.disconnect_from(&object, signal_index),
                        None => break,
                    }
                }
            }
        }
    }

    /// Disconnect every signal on `object` and drop its entries, regardless of count.
    pub fn remove(&self, object: &Object) {
        let signals: Vec<usize> = self
            .table
            .borrow()
            .get(&object.ptr_id())
            .map(|e| e.signals.keys().copied().collect())
            .unwrap_or_default();
        for signal_index in signals {
            loop {
                let count = self
                    .table
                    .borrow()
                    .get(&object.ptr_id())
                    .and_then(|e| e.signals.get(&signal_index))
                    .map(|s| s.count);
                match count {
                    Some(_) => self.disconnect_from(object, signal_index),
                    None => break,
                }
            }
        }
    }

    #[cfg(test)]
    fn subscription_count(&self, object: &Object, signal_index: usize) -> usize {
        self.table
            .borrow()
            .get(&object.ptr_id())
            .and_then(|e| e.signals.get(&signal_index))
            .map(|s| s.count)
            .unwrap_or(0)
    }
}

fn forward(table: &ConnTable, on_emit: &EmitFn, object: &Object, signal_index: usize, args: &[Value]) {
    let still_connected = table
        .borrow()
        .get(&object.ptr_id())
        .map(|e| e.signals.contains_key(&signal_index))
        .unwrap_or(false);
    if still_connected {
        on_emit(object, signal_index, args);
    }
}
