//! Server side of the channel: owns the registered/wrapped object populations, builds class
//! descriptors, routes signal emissions to property-update batching or straight-through delivery,
//! and answers `Init`/`InvokeMethod`/`ConnectToSignal`/`DisconnectFromSignal`/`SetProperty`.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use crate::config::ChannelConfig;
use crate::error::{CoreError, CoreResult, OrLog};
use crate::message::{key, Message, MessageType};
use crate::meta::{type_code, MetaObject, Object};
use crate::signal_handler::{MetaProviderFn, SignalHandler};
use crate::transport::TransportHandle;
use crate::value::{Value, ValueMap};

/// The `startTimer`/`stopTimer` hook a `Channel` supplies so `Publisher` can arm the
/// property-update flush without owning an event loop itself.
pub trait Timer {
    fn start(&self, interval: std::time::Duration);
    fn stop(&self);
}

struct WrappedObjectInfo {
    object: Object,
    class_info: Value,
    transports: Vec<TransportHandle>,
}

#[derive(Default)]
struct PublisherState {
    registered_objects: HashMap<String, Object>,
    registered_object_ids: HashMap<usize, String>,
    wrapped_objects: HashMap<String, WrappedObjectInfo>,
    wrapped_object_ids: HashMap<usize, String>,
    transported_wrapped_objects: HashMap<usize, HashSet<String>>,
    signal_to_property_map: HashMap<usize, HashMap<usize, HashSet<usize>>>,
    pending_property_args: HashMap<usize, HashMap<usize, Vec<Value>>>,
    /// Properties changed outside of their notify signal (via `property_changed`), flushed the
    /// same way but with no `signals` member of their own.
    pending_direct_properties: HashMap<usize, HashSet<usize>>,
    client_is_idle: bool,
    block_updates: bool,
    property_updates_initialized: bool,
    transports: Vec<TransportHandle>,
}

/// Publishes host objects over one or more transports and keeps every subscribed client's view of
/// their properties current.
pub struct Publisher {
    meta_of: MetaProviderFn,
    signal_handler: SignalHandler,
    timer: Rc<dyn Timer>,
    create_uuid: Rc<dyn Fn() -> String>,
    config: ChannelConfig,
    state: RefCell<PublisherState>,
    /// A handle back to this `Publisher`'s own `Rc`, so a `&self` method can hand an owned `Rc`
    /// to a continuation (e.g. an `InvokeMethod` reply) that must outlive the call. Set once at
    /// construction via `Rc::new_cyclic`; always upgradeable for the struct's own lifetime.
    self_weak: Weak<Publisher>,
}

impl Publisher {
    pub fn new(
        meta_of: MetaProviderFn,
        timer: Rc<dyn Timer>,
        create_uuid: Rc<dyn Fn() -> String>,
        config: ChannelConfig,
    ) -> Rc<Publisher> {
        Rc::new_cyclic(|weak: &Weak<Publisher>| {
            let weak_for_emit = weak.clone();
            let signal_handler = SignalHandler::new(
                meta_of.clone(),
                Rc::new(move |object: &Object, signal_index: usize, args: &[Value]| {
                    if let Some(publisher) = weak_for_emit.upgrade() {
                        publisher.signal_emitted(object, signal_index, args);
                    }
                }),
            );
            let mut state = PublisherState::default();
            state.client_is_idle = config.start_idle;
            Publisher {
                meta_of,
                signal_handler,
                timer,
                create_uuid,
                config,
                state: RefCell::new(state),
                self_weak: weak.clone(),
            }
        })
    }

    fn meta_for(&self, object: &Object) -> CoreResult<Rc<dyn MetaObject>> {
        (self.meta_of)(object).ok_or_else(|| CoreError::UnknownObject(format!("{:?}", object)))
    }

    fn id_of(&self, object: &Object) -> Option<String> {
        let state = self.state.borrow();
        state
            .registered_object_ids
            .get(&object.ptr_id())
            .or_else(|| state.wrapped_object_ids.get(&object.ptr_id()))
            .cloned()
    }

    fn resolve_object(&self, id: &str) -> Option<Object> {
        let state = self.state.borrow();
        state
            .registered_objects
            .get(id)
            .or_else(|| state.wrapped_objects.get(id).map(|w| &w.object))
            .cloned()
    }

    fn target_transports(&self, object: &Object) -> Vec<TransportHandle> {
        let state = self.state.borrow();
        if state.registered_object_ids.contains_key(&object.ptr_id()) {
            state.transports.clone()
        } else if let Some(id) = state.wrapped_object_ids.get(&object.ptr_id()) {
            state.wrapped_objects.get(id).map(|w| w.transports.clone()).unwrap_or_default()
        } else {
            Vec::new()
        }
    }

    /// Register a host object under a stable, caller-chosen id. Registered objects are visible to
    /// every transport on the channel.
    ///
    /// If a client has already run the `Init` handshake, this object's notify signals were never
    /// wired up for it, so its property changes would silently stop reaching that client. We
    /// still wire them up now (newly connecting clients see the object correctly either way), but
    /// warn since the already-connected client's proxy won't know about it until it reconnects.
    pub fn register_object(&self, id: impl Into<String>, object: Object) {
        let id = id.into();
        let already_initialized = {
            let mut state = self.state.borrow_mut();
            if let Some(old) = state.registered_objects.insert(id.clone(), object.clone()) {
                state.registered_object_ids.remove(&old.ptr_id());
            }
            state.registered_object_ids.insert(object.ptr_id(), id.clone());
            state.property_updates_initialized
        };
        if already_initialized {
            log::warn!(
                "register_object: {} registered after property updates were already initialized; \
                 already-connected clients will not see it until they reconnect",
                id
            );
            let class_info = self.class_info_for_object(&object, None);
            self.initialize_property_updates(&object, &class_info);
        }
    }

    pub fn deregister_object(&self, id: &str) {
        let removed = self.state.borrow_mut().registered_objects.remove(id);
        if let Some(object) = removed {
            self.state.borrow_mut().registered_object_ids.remove(&object.ptr_id());
            self.signal_handler.remove(&object);
        }
    }

    pub fn add_transport(&self, transport: TransportHandle) {
        self.state.borrow_mut().transports.push(transport);
    }

    pub fn remove_transport(&self, transport: &TransportHandle) {
        self.transport_removed(transport);
    }

    fn class_info_for_object(&self, object: &Object, transport: Option<&TransportHandle>) -> Value {
        let meta = match self.meta_for(object) {
            Ok(m) => m,
            Err(e) => {
                log::warn!("class_info_for_object: {}", e);
                return Value::Null;
            }
        };
        let methods = meta.methods();
        let properties = meta.properties();
        let enums = meta.enums();

        let mut signals = Vec::new();
        let mut signal_names: HashSet<String> = HashSet::new();
        for (index, method) in methods.iter().enumerate() {
            if index == 0 || !method.is_signal {
                continue;
            }
            if !signal_names.insert(method.name.clone()) {
                continue;
            }
            signals.push(method_entry(index, method));
        }

        let mut methods_out = Vec::new();
        let mut method_names: HashSet<String> = HashSet::new();
        for (index, method) in methods.iter().enumerate() {
            if index == 0 || method.is_signal || !method.is_public {
                continue;
            }
            if !method_names.insert(method.name.clone()) {
                continue;
            }
            methods_out.push(method_entry(index, method));
        }

        let mut properties_out = Vec::new();
        for (index, prop) in properties.iter().enumerate() {
            let signal_info = match prop.notify_signal {
                None => Value::array(vec![]),
                Some(signal_index) => {
                    let signal_name = methods.get(signal_index).map(|m| m.name.as_str()).unwrap_or("");
                    let shortcut = signal_name == format!("{}Changed", prop.name);
                    if shortcut {
                        Value::array(vec![Value::Int32(1), Value::from(signal_index)])
                    } else {
                        Value::array(vec![Value::from(signal_name), Value::from(signal_index)])
                    }
                }
            };
            let raw = meta.read_property(object, index).unwrap_or(Value::Null);
            let wrapped = self.wrap_result(raw, transport);
            properties_out.push(Value::array(vec![
                Value::from(index),
                Value::from(prop.name.clone()),
                signal_info,
                wrapped,
            ]));
        }

        let mut enums_map = ValueMap::new();
        for e in &enums {
            let mut keys = ValueMap::new();
            for (k, v) in &e.keys {
                keys.insert(k.clone(), Value::Int64(*v));
            }
            enums_map.insert(e.name.clone(), Value::map(keys));
        }

        let mut out = ValueMap::new();
        out.insert(key::CLASS, Value::from(meta.class_name().to_string()));
        out.insert(key::SIGNALS, Value::array(signals));
        out.insert(key::METHODS, Value::array(methods_out));
        out.insert(key::PROPERTIES, Value::array(properties_out));
        out.insert(key::ENUMS, Value::map(enums_map));
        Value::map(out)
    }

    fn initialize_property_updates(&self, object: &Object, class_info: &Value) {
        let notify_pairs: Vec<(usize, usize)> = class_info
            .as_map()
            .and_then(|m| m.get(key::PROPERTIES))
            .and_then(|v| v.as_array())
            .map(|properties| {
                properties
                    .iter()
                    .filter_map(|entry| {
                        let fields = entry.as_array()?;
                        let property_index = fields.first()?.as_i64() as usize;
                        let signal_info = fields.get(2)?.as_array()?;
                        if signal_info.len() != 2 {
                            return None;
                        }
                        Some((property_index, signal_info[1].as_i64() as usize))
                    })
                    .collect()
            })
            .unwrap_or_default();

        for (property_index, signal_index) in notify_pairs {
            let already_tracked = self
                .state
                .borrow()
                .signal_to_property_map
                .get(&object.ptr_id())
                .map(|m| m.contains_key(&signal_index))
                .unwrap_or(false);
            if !already_tracked {
                self.signal_handler
                    .connect_to(object, signal_index)
                    .or_log_warn("connecting property notify signal");
            }
            self.state
                .borrow_mut()
                .signal_to_property_map
                .entry(object.ptr_id())
                .or_default()
                .entry(signal_index)
                .or_default()
                .insert(property_index);
        }

        self.signal_handler
            .connect_to(object, 0)
            .or_log_warn("connecting destroyed signal");
    }

    /// Build the `{id: classInfo}` map an `Init` response carries, wiring up property-update
    /// tracking on the first call.
    pub fn initialize_client(&self, transport: &TransportHandle) -> Value {
        let first_time = !self.state.borrow().property_updates_initialized;
        let objects: Vec<(String, Object)> = self
            .state
            .borrow()
            .registered_objects
            .iter()
            .map(|(id, o)| (id.clone(), o.clone()))
            .collect();

        let mut out = ValueMap::new();
        for (id, object) in &objects {
            let info = self.class_info_for_object(object, Some(transport));
            if first_time {
                self.initialize_property_updates(object, &info);
            }
            out.insert(id.clone(), info);
        }
        self.state.borrow_mut().property_updates_initialized = true;
        Value::map(out)
    }

    /// Convert an argument coming from the client: if the target parameter type is `OBJECT`,
    /// resolve the `{__QObject__, id}` reference to a live handle.
    fn to_variant(&self, value: Value, target_type: i32) -> Value {
        if target_type != type_code::OBJECT {
            return value;
        }
        let id = value.as_map().and_then(|m| m.get(key::ID)).map(|v| v.as_str().to_string());
        match id.and_then(|id| self.resolve_object(&id)) {
            Some(object) => Value::Object(object),
            None => {
                log::warn!("to_variant: could not resolve object reference argument");
                value
            }
        }
    }

    /// Wrap a host-side result value for the wire: bare `Value::Object`s become
    /// `{__QObject__, id, data}` references, auto-registering the object as wrapped (scoped to
    /// `transport`, or every known transport if none is given) the first time it's seen.
    pub fn wrap_result(&self, value: Value, transport: Option<&TransportHandle>) -> Value {
        match value {
            Value::Object(object) => self.wrap_object(&object, transport),
            Value::Array(items) => Value::array(
                items
                    .iter()
                    .cloned()
                    .map(|v| self.wrap_result(v, transport))
                    .collect(),
            ),
            Value::Map(map) => {
                let mut out = ValueMap::new();
                for (k, v) in map.iter() {
                    out.insert(k, self.wrap_result(v.clone(), transport));
                }
                Value::map(out)
            }
            other => other,
        }
    }

    pub fn wrap_list(&self, values: &[Value], transport: Option<&TransportHandle>) -> Vec<Value> {
        values.iter().cloned().map(|v| self.wrap_result(v, transport)).collect()
    }

    fn wrap_object(&self, object: &Object, transport: Option<&TransportHandle>) -> Value {
        if let Some(id) = self.id_of(object) {
            return crate::message::qobject_reference(&id, None);
        }

        let id = (self.create_uuid)();
        let targets: Vec<TransportHandle> = match transport {
            Some(t) => vec![t.clone()],
            None => self.state.borrow().transports.clone(),
        };
        {
            let mut state = self.state.borrow_mut();
            state.wrapped_object_ids.insert(object.ptr_id(), id.clone());
            state.wrapped_objects.insert(
                id.clone(),
                WrappedObjectInfo {
                    object: object.clone(),
                    class_info: Value::Null,
                    transports: targets.clone(),
                },
            );
            for t in &targets {
                state
                    .transported_wrapped_objects
                    .entry(t.ptr_id())
                    .or_default()
                    .insert(id.clone());
            }
        }

        let class_info = self.class_info_for_object(object, transport);
        self.initialize_property_updates(object, &class_info);
        if let Some(w) = self.state.borrow_mut().wrapped_objects.get_mut(&id) {
            w.class_info = class_info.clone();
        }
        crate::message::qobject_reference(&id, Some(class_info))
    }

    fn delete_wrapped_object(&self, object: &Object) {
        let id = match self.state.borrow_mut().wrapped_object_ids.remove(&object.ptr_id()) {
            Some(id) => id,
            None => return,
        };
        if let Some(info) = self.state.borrow_mut().wrapped_objects.remove(&id) {
            for t in &info.transports {
                if let Some(ids) = self.state.borrow_mut().transported_wrapped_objects.get_mut(&t.ptr_id()) {
                    ids.remove(&id);
                }
            }
        }
        self.signal_handler.remove(object);
        self.state.borrow_mut().signal_to_property_map.remove(&object.ptr_id());
        self.state.borrow_mut().pending_property_args.remove(&object.ptr_id());
        self.state.borrow_mut().pending_direct_properties.remove(&object.ptr_id());
    }

    /// Invoke `method_index` on `object`, replying to the caller once the host completes it.
    pub fn invoke_method(
        &self,
        object: &Object,
        method_index: usize,
        mut args: Vec<Value>,
        transport: TransportHandle,
        reply_to_client: impl FnOnce(Value) + 'static,
    ) {
        let meta = match self.meta_for(object) {
            Ok(m) => m,
            Err(e) => {
                log::warn!("invoke_method: {}", e);
                reply_to_client(Value::Null);
                return;
            }
        };
        let methods = meta.methods();
        if methods.get(method_index).map(|m| m.name == "deleteLater").unwrap_or(false) {
            self.delete_wrapped_object(object);
            reply_to_client(Value::Null);
            return;
        }
        let method = match methods.get(method_index) {
            Some(m) if !m.is_signal && m.is_public => m.clone(),
            _ => {
                log::warn!("invoke_method: index {} is not an invocable method", method_index);
                reply_to_client(Value::Null);
                return;
            }
        };
        if args.len() > method.param_types.len() {
            log::warn!(
                "invoke_method: {} arg(s) given, {} expected, truncating",
                args.len(),
                method.param_types.len()
            );
            args.truncate(method.param_types.len());
        }
        let coerced: Vec<Value> = args
            .into_iter()
            .enumerate()
            .map(|(i, a)| self.to_variant(a, method.param_types.get(i).copied().unwrap_or(type_code::VOID)))
            .collect();

        let publisher = match self.self_weak.upgrade() {
            Some(p) => p,
            None => return,
        };
        meta.invoke_method(
            object,
            method_index,
            coerced,
            Box::new(move |result| {
                reply_to_client(publisher.wrap_result(result, Some(&transport)));
            }),
        );
    }

    pub fn set_property(&self, object: &Object, property_index: usize, value: Value) -> CoreResult<()> {
        let meta = self.meta_for(object)?;
        let target_type = meta
            .properties()
            .get(property_index)
            .map(|p| p.type_code)
            .ok_or(CoreError::BadProperty { object: format!("{:?}", object), index: property_index })?;
        let coerced = self.to_variant(value, target_type);
        meta.write_property(object, property_index, coerced)
    }

    fn signal_emitted(&self, object: &Object, signal_index: usize, args: &[Value]) {
        let targets = self.target_transports(object);
        if targets.is_empty() {
            if signal_index == 0 {
                self.object_destroyed(object);
            }
            return;
        }

        let is_notify_signal = self
            .state
            .borrow()
            .signal_to_property_map
            .get(&object.ptr_id())
            .map(|m| m.contains_key(&signal_index))
            .unwrap_or(false);

        if !is_notify_signal {
            if let Some(id) = self.id_of(object) {
                let wrapped_args = self.wrap_list(args, None);
                let mut msg = Message::new(MessageType::Signal);
                msg.set(key::OBJECT, id)
                    .set(key::SIGNAL, signal_index as i32)
                    .set(key::ARGS, Value::array(wrapped_args));
                for t in &targets {
                    t.send_message(&msg).or_log_warn("sending signal");
                }
            }
            if signal_index == 0 {
                self.object_destroyed(object);
            }
            return;
        }

        {
            let mut state = self.state.borrow_mut();
            state
                .pending_property_args
                .entry(object.ptr_id())
                .or_default()
                .insert(signal_index, args.to_vec());
        }
        self.warn_if_over_pending_cap(object.ptr_id());

        let (idle, blocked) = {
            let state = self.state.borrow();
            (state.client_is_idle, state.block_updates)
        };
        if idle && !blocked {
            self.timer.start(self.config.property_update_interval());
        }
    }

    /// Queue a property whose value changed without going through its notify signal. Flushed
    /// alongside signal-driven updates, but as a `properties`-only entry with no `signals` member.
    pub fn property_changed(&self, object: &Object, property_index: usize) {
        if self.target_transports(object).is_empty() {
            return;
        }
        {
            let mut state = self.state.borrow_mut();
            state.pending_direct_properties.entry(object.ptr_id()).or_default().insert(property_index);
        }
        self.warn_if_over_pending_cap(object.ptr_id());

        let (idle, blocked) = {
            let state = self.state.borrow();
            (state.client_is_idle, state.block_updates)
        };
        if idle && !blocked {
            self.timer.start(self.config.property_update_interval());
        }
    }

    /// `max_pending_property_updates` is a soft cap: crossing it never drops data, it only warns
    /// that a very chatty object's updates aren't being flushed.
    fn warn_if_over_pending_cap(&self, ptr_id: usize) {
        let cap = self.config.max_pending_property_updates;
        if cap == 0 {
            return;
        }
        let state = self.state.borrow();
        let pending = state.pending_property_args.get(&ptr_id).map(|m| m.len()).unwrap_or(0)
            + state.pending_direct_properties.get(&ptr_id).map(|s| s.len()).unwrap_or(0);
        if pending > cap {
            log::warn!(
                "object has {} pending property update(s) queued, past the configured cap of {}",
                pending,
                cap
            );
        }
    }

    fn object_for_ptr(&self, ptr_id: usize) -> Option<Object> {
        let state = self.state.borrow();
        state
            .registered_object_ids
            .get(&ptr_id)
            .and_then(|id| state.registered_objects.get(id).cloned())
            .or_else(|| {
                state
                    .wrapped_object_ids
                    .get(&ptr_id)
                    .and_then(|id| state.wrapped_objects.get(id).map(|w| w.object.clone()))
            })
    }

    /// Read every property named by `indices` through its meta-property, wrapping object results
    /// for the wire, keyed by `str(propertyIndex)`.
    fn read_properties(&self, object: &Object, meta: &Rc<dyn MetaObject>, indices: impl IntoIterator<Item = usize>) -> ValueMap {
        let mut properties = ValueMap::new();
        for property_index in indices {
            let raw = meta.read_property(object, property_index).unwrap_or(Value::Null);
            properties.insert(property_index.to_string(), self.wrap_result(raw, None));
        }
        properties
    }

    /// Flush every batched property change since the last flush, one `PropertyUpdate` message per
    /// dirty object, and arm nothing further; the embedder's timer calls this when it fires.
    pub fn send_pending_property_updates(&self) {
        if self.state.borrow().block_updates || !self.state.borrow().client_is_idle {
            return;
        }
        let (pending_signals, pending_direct): (
            Vec<(usize, HashMap<usize, Vec<Value>>)>,
            Vec<(usize, HashSet<usize>)>,
        ) = {
            let mut state = self.state.borrow_mut();
            (
                std::mem::take(&mut state.pending_property_args).into_iter().collect(),
                std::mem::take(&mut state.pending_direct_properties).into_iter().collect(),
            )
        };
        if pending_signals.is_empty() && pending_direct.is_empty() {
            return;
        }
        self.timer.stop();
        let mut broadcast_sent = false;

        for (ptr_id, signals) in pending_signals {
            let object = match self.object_for_ptr(ptr_id) {
                Some(o) => o,
                None => continue,
            };
            let targets = self.target_transports(&object);
            if targets.is_empty() {
                continue;
            }
            let id = match self.id_of(&object) {
                Some(id) => id,
                None => continue,
            };
            let meta = match self.meta_for(&object) {
                Ok(m) => m,
                Err(e) => {
                    log::warn!("send_pending_property_updates: {}", e);
                    continue;
                }
            };
            let notify_map = self.state.borrow().signal_to_property_map.get(&ptr_id).cloned().unwrap_or_default();

            let mut sigs = ValueMap::new();
            let mut dirty_property_indices: HashSet<usize> = HashSet::new();
            for (signal_index, args) in &signals {
                sigs.insert(signal_index.to_string(), Value::array(self.wrap_list(args, None)));
                if let Some(indices) = notify_map.get(signal_index) {
                    dirty_property_indices.extend(indices.iter().copied());
                }
            }
            let properties = self.read_properties(&object, &meta, dirty_property_indices);

            let mut entry = ValueMap::new();
            entry.insert(key::OBJECT, Value::from(id));
            entry.insert(key::SIGNALS, Value::map(sigs));
            entry.insert(key::PROPERTIES, Value::map(properties));
            let mut msg = Message::new(MessageType::PropertyUpdate);
            msg.set(key::DATA, Value::map(entry));
            for t in &targets {
                t.send_message(&msg).or_log_warn("sending property update");
                broadcast_sent = true;
            }
        }

        for (ptr_id, indices) in pending_direct {
            let object = match self.object_for_ptr(ptr_id) {
                Some(o) => o,
                None => continue,
            };
            let targets = self.target_transports(&object);
            if targets.is_empty() {
                continue;
            }
            let id = match self.id_of(&object) {
                Some(id) => id,
                None => continue,
            };
            let meta = match self.meta_for(&object) {
                Ok(m) => m,
                Err(e) => {
                    log::warn!("send_pending_property_updates: {}", e);
                    continue;
                }
            };
            let properties = self.read_properties(&object, &meta, indices);

            let mut entry = ValueMap::new();
            entry.insert(key::OBJECT, Value::from(id));
            entry.insert(key::PROPERTIES, Value::map(properties));
            let mut msg = Message::new(MessageType::PropertyUpdate);
            msg.set(key::DATA, Value::map(entry));
            for t in &targets {
                t.send_message(&msg).or_log_warn("sending property update");
                broadcast_sent = true;
            }
        }

        // Re-arm the idle gate only if something actually went out, mirroring the source only
        // calling setClientIsIdle(false) once it has a non-empty flush to send.
        if broadcast_sent {
            self.state.borrow_mut().client_is_idle = false;
        }
    }

    fn object_destroyed(&self, object: &Object) {
        self.delete_wrapped_object(object);
        let id = self.state.borrow_mut().registered_objects.iter().find_map(|(id, o)| {
            if o == object {
                Some(id.clone())
            } else {
                None
            }
        });
        if let Some(id) = id {
            let mut state = self.state.borrow_mut();
            state.registered_objects.remove(&id);
            state.registered_object_ids.remove(&object.ptr_id());
        }
    }

    pub fn set_client_is_idle(&self, idle: bool) {
        self.state.borrow_mut().client_is_idle = idle;
        let has_pending = !self.state.borrow().pending_property_args.is_empty();
        let blocked = self.state.borrow().block_updates;
        if idle && has_pending && !blocked {
            self.timer.start(self.config.property_update_interval());
        }
    }

    pub fn set_block_updates(&self, blocked: bool) {
        self.state.borrow_mut().block_updates = blocked;
        let (idle, has_pending) = {
            let state = self.state.borrow();
            (state.client_is_idle, !state.pending_property_args.is_empty())
        };
        if !blocked && idle && has_pending {
            self.timer.start(self.config.property_update_interval());
        }
    }

    /// Drop every wrapped object scoped only to `transport`, and stop tracking it as a broadcast
    /// target for registered objects.
    pub fn transport_removed(&self, transport: &TransportHandle) {
        let wrapped_ids: Vec<String> = self
            .state
            .borrow_mut()
            .transported_wrapped_objects
            .remove(&transport.ptr_id())
            .unwrap_or_default()
            .into_iter()
            .collect();
        for id in wrapped_ids {
            let still_shared = self
                .state
                .borrow()
                .wrapped_objects
                .get(&id)
                .map(|w| w.transports.iter().any(|t| t != transport))
                .unwrap_or(false);
            if !still_shared {
                if let Some(info) = self.state.borrow_mut().wrapped_objects.remove(&id) {
                    self.state.borrow_mut().wrapped_object_ids.remove(&info.object.ptr_id());
                    self.signal_handler.remove(&info.object);
                }
            } else if let Some(w) = self.state.borrow_mut().wrapped_objects.get_mut(&id) {
                w.transports.retain(|t| t != transport);
            }
        }
        self.state.borrow_mut().transports.retain(|t| t != transport);
    }

    pub fn handle_message(&self, msg: &Message, transport: &TransportHandle) {
        match msg.message_type() {
            MessageType::Idle => self.set_client_is_idle(true),
            MessageType::Init => {
                let id = match msg.id() {
                    Some(id) => id.to_string(),
                    None => {
                        log::warn!("Init message missing id");
                        return;
                    }
                };
                let data = self.initialize_client(transport);
                let mut response = Message::new(MessageType::Response);
                response.set(key::ID, id).set(key::DATA, data);
                transport.send_message(&response).or_log_warn("sending Init response");
            }
            MessageType::Debug => {
                log::debug!("client debug message: {:?}", msg.data());
            }
            MessageType::Invalid => {
                log::warn!("dropping message with unknown or missing type");
            }
            message_type @ (MessageType::InvokeMethod
            | MessageType::ConnectToSignal
            | MessageType::DisconnectFromSignal
            | MessageType::SetProperty) => {
                let object_id = match msg.object() {
                    Some(id) => id.to_string(),
                    None => {
                        log::warn!("{:?} message missing object id", message_type);
                        return;
                    }
                };
                let object = match self.resolve_object(&object_id) {
                    Some(o) => o,
                    None => {
                        log::warn!("{:?} message referenced unknown object {}", message_type, object_id);
                        return;
                    }
                };
                match message_type {
                    MessageType::InvokeMethod => {
                        let id = match msg.id() {
                            Some(id) => id.to_string(),
                            None => {
                                log::warn!("InvokeMethod message missing id");
                                return;
                            }
                        };
                        let method_index = msg.method().unwrap_or(0);
                        let args = msg.args();
                        let reply_transport = transport.clone();
                        self.invoke_method(&object, method_index, args, transport.clone(), move |data| {
                            let mut response = Message::new(MessageType::Response);
                            response.set(key::ID, id).set(key::DATA, data);
                            reply_transport.send_message(&response).or_log_warn("sending InvokeMethod response");
                        });
                    }
                    MessageType::ConnectToSignal => {
                        self.signal_handler
                            .connect_to(&object, msg.signal().unwrap_or(0))
                            .or_log_warn("ConnectToSignal");
                    }
                    MessageType::DisconnectFromSignal => {
                        self.signal_handler.disconnect_from(&object, msg.signal().unwrap_or(0));
                    }
                    MessageType::SetProperty => {
                        let property_index = msg.property().unwrap_or(0);
                        let value = msg.data().cloned().unwrap_or(Value::Null);
                        self.set_property(&object, property_index, value).or_log_warn("SetProperty");
                    }
                    _ => unreachable!(),
                }
            }
            MessageType::Signal | MessageType::PropertyUpdate | MessageType::Response => {
                log::warn!("Publisher received a server-to-client message type from a client");
            }
        }
    }
}

fn method_entry(index: usize, method: &crate::meta::MetaMethod) -> Value {
    Value::array(vec![
        Value::from(method.name.clone()),
        Value::from(index),
        Value::Int32(method.return_type),
        Value::array(method.param_types.iter().map(|t| Value::Int32(*t)).collect()),
        Value::array(method.param_names.iter().cloned().map(Value::from).collect()),
    ])
}
