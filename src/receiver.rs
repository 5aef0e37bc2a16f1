//! Client side of the channel: sends `Init`/`InvokeMethod`/`ConnectToSignal`/
//! `DisconnectFromSignal`/`SetProperty`, and turns incoming `Response`/`Signal`/`PropertyUpdate`
//! messages into materialized proxy objects and callback dispatch.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::OrLog;
use crate::message::{key, Message, MessageType};
use crate::meta::Object;
use crate::transport::TransportHandle;
use crate::value::{Value, ValueMap};

pub type SignalCallback = Rc<dyn Fn(&[Value])>;

enum PendingReply {
    Init(Box<dyn FnOnce()>),
    InvokeMethod(Box<dyn FnOnce(Value)>),
}

/// A live `connect_to_signal` registration. Pass this back to `disconnect_from_signal` to remove
/// exactly this callback; the wire `DisconnectFromSignal` only goes out once the last subscriber
/// for the (object, signal) pair is gone.
pub struct SignalSubscription {
    object_id: String,
    signal_index: usize,
    token: u64,
}

#[derive(Default)]
struct ReceiverState {
    objects: HashMap<String, Object>,
    object_ids: HashMap<usize, String>,
    pending_replies: HashMap<String, PendingReply>,
    signal_callbacks: HashMap<(String, usize), Vec<(u64, SignalCallback)>>,
    next_request_id: u64,
    next_subscription_token: u64,
}

/// Materializes a proxy `Object` for a given id and class descriptor. An embedder supplies this so
/// the host language's generated binding (JS class, Python stub, ...) can be constructed; this
/// crate only tracks the resulting opaque handle.
pub type CreateProxyFn = Rc<dyn Fn(&str, &Value) -> Object>;

pub struct Receiver {
    transport: TransportHandle,
    create_proxy: CreateProxyFn,
    state: RefCell<ReceiverState>,
}

impl Receiver {
    pub fn new(transport: TransportHandle, create_proxy: CreateProxyFn) -> Rc<Receiver> {
        Rc::new(Receiver {
            transport,
            create_proxy,
            state: RefCell::new(ReceiverState::default()),
        })
    }

    fn next_request_id(&self) -> String {
        let mut state = self.state.borrow_mut();
        state.next_request_id += 1;
        state.next_request_id.to_string()
    }

    /// Look up an already-materialized proxy object by the id the server assigned it.
    pub fn object(&self, id: &str) -> Option<Object> {
        self.state.borrow().objects.get(id).cloned()
    }

    /// Send the handshake message; `on_ready` runs once the server's class-info `Response`
    /// arrives and every initial object has been materialized.
    pub fn init(&self, on_ready: impl FnOnce() + 'static) {
        let id = self.next_request_id();
        self.state
            .borrow_mut()
            .pending_replies
            .insert(id.clone(), PendingReply::Init(Box::new(on_ready)));
        let mut msg = Message::new(MessageType::Init);
        msg.set(key::ID, id);
        self.transport.send_message(&msg).or_log_warn("sending Init");
    }

    /// Tell the server this client is idle, letting any batched property updates flush.
    pub fn notify_idle(&self) {
        self.transport
            .send_message(&Message::new(MessageType::Idle))
            .or_log_warn("sending Idle");
    }

    pub fn invoke_method(
        &self,
        object_id: &str,
        method_index: usize,
        args: Vec<Value>,
        reply: impl FnOnce(Value) + 'static,
    ) {
        let id = self.next_request_id();
        self.state
            .borrow_mut()
            .pending_replies
            .insert(id.clone(), PendingReply::InvokeMethod(Box::new(reply)));
        let wrapped_args: Vec<Value> = args.into_iter().map(|v| self.wrap_value(v)).collect();
        let mut msg = Message::new(MessageType::InvokeMethod);
        msg.set(key::ID, id)
            .set(key::OBJECT, object_id)
            .set(key::METHOD, method_index as i32)
            .set(key::ARGS, Value::array(wrapped_args));
        self.transport.send_message(&msg).or_log_warn("sending InvokeMethod");
    }

    pub fn set_property(&self, object_id: &str, property_index: usize, value: Value) {
        let wrapped = self.wrap_value(value);
        let mut msg = Message::new(MessageType::SetProperty);
        msg.set(key::OBJECT, object_id)
            .set(key::PROPERTY, property_index as i32)
            .set(key::DATA, wrapped);
        self.transport.send_message(&msg).or_log_warn("sending SetProperty");
    }

    /// Subscribe `callback` to `signal_index` on `object_id`. The first subscriber for a given
    /// pair triggers a wire `ConnectToSignal`; later ones just add a local fan-out callback.
    pub fn connect_to_signal(
        &self,
        object_id: &str,
        signal_index: usize,
        callback: SignalCallback,
    ) -> SignalSubscription {
        let key = (object_id.to_string(), signal_index);
        let mut state = self.state.borrow_mut();
        let token = state.next_subscription_token;
        state.next_subscription_token += 1;
        let callbacks = state.signal_callbacks.entry(key).or_default();
        let first_subscriber = callbacks.is_empty();
        callbacks.push((token, callback));
        drop(state);

        if first_subscriber {
            let mut msg = Message::new(MessageType::ConnectToSignal);
            msg.set(key::OBJECT, object_id).set(key::SIGNAL, signal_index as i32);
            self.transport.send_message(&msg).or_log_warn("sending ConnectToSignal");
        }
        SignalSubscription { object_id: object_id.to_string(), signal_index, token }
    }

    pub fn disconnect_from_signal(&self, subscription: SignalSubscription) {
        let key = (subscription.object_id.clone(), subscription.signal_index);
        let mut state = self.state.borrow_mut();
        let now_empty = match state.signal_callbacks.get_mut(&key) {
            Some(callbacks) => {
                callbacks.retain(|(token, _)| *token != subscription.token);
                callbacks.is_empty()
            }
            None => false,
        };
        if now_empty {
            state.signal_callbacks.remove(&key);
        }
        drop(state);

        if now_empty {
            let mut msg = Message::new(MessageType::DisconnectFromSignal);
            msg.set(key::OBJECT, subscription.object_id)
                .set(key::SIGNAL, subscription.signal_index as i32);
            self.transport.send_message(&msg).or_log_warn("sending DisconnectFromSignal");
        }
    }

    pub fn handle_message(&self, msg: &Message) {
        match msg.message_type() {
            MessageType::Response => self.handle_response(msg),
            MessageType::Signal => self.handle_signal(msg),
            MessageType::PropertyUpdate => self.handle_property_update(msg),
            MessageType::Invalid => log::warn!("dropping message with unknown or missing type"),
            other => log::warn!("Receiver got an unexpected client-to-server message type: {:?}", other),
        }
    }

    fn handle_response(&self, msg: &Message) {
        let id = match msg.id() {
            Some(id) => id.to_string(),
            None => {
                log::warn!("Response message missing id");
                return;
            }
        };
        let pending = self.state.borrow_mut().pending_replies.remove(&id);
        match pending {
            Some(PendingReply::Init(on_ready)) => {
                let data = msg.data().cloned().unwrap_or(Value::Null);
                self.materialize_objects(&data);
                on_ready();
            }
            Some(PendingReply::InvokeMethod(reply)) => {
                let data = msg.data().cloned().unwrap_or(Value::Null);
                reply(self.unwrap_value(data));
            }
            None => log::warn!("Response for unknown or already-resolved request {}", id),
        }
    }

    fn handle_signal(&self, msg: &Message) {
        let object_id = match msg.object() {
            Some(id) => id.to_string(),
            None => {
                log::warn!("Signal message missing object id");
                return;
            }
        };
        let signal_index = msg.signal().unwrap_or(0);
        let args: Vec<Value> = msg.args().into_iter().map(|v| self.unwrap_value(v)).collect();
        self.dispatch_signal(&object_id, signal_index, &args);
        if signal_index == 0 {
            self.evict_object(&object_id);
        }
    }

    /// A `PropertyUpdate` carries one `{object, signals?, properties?}` entry: `signals` repeats
    /// each dirty notify signal's last emission (dispatched exactly like a `Signal` message would
    /// be), `properties` carries each affected property's current value keyed by
    /// `str(propertyIndex)`. A signal-less direct property change carries `properties` only.
    fn handle_property_update(&self, msg: &Message) {
        let entry = match msg.data().and_then(|v| v.as_map()) {
            Some(m) => m.clone(),
            None => {
                log::warn!("PropertyUpdate message missing its data entry");
                return;
            }
        };
        let object_id = match entry.get(key::OBJECT).map(|v| v.as_str().to_string()) {
            Some(id) if !id.is_empty() => id,
            _ => {
                log::warn!("PropertyUpdate entry missing object id");
                return;
            }
        };
        if let Some(signals) = entry.get(key::SIGNALS).and_then(|v| v.as_map()) {
            for (signal_key, args_value) in signals.iter() {
                let signal_index: usize = match signal_key.parse() {
                    Ok(n) => n,
                    Err(_) => {
                        log::warn!("PropertyUpdate signal key {} is not a signal index", signal_key);
                        continue;
                    }
                };
                let args: Vec<Value> = args_value
                    .as_array()
                    .map(|a| a.iter().cloned().map(|v| self.unwrap_value(v)).collect())
                    .unwrap_or_default();
                self.dispatch_signal(&object_id, signal_index, &args);
            }
        }
        // `properties` repeats each notify signal's payload as a value keyed by property index,
        // and is the only member present for a signal-less direct change; this crate doesn't keep
        // its own property cache on the proxy side, so there's nothing further to apply here.
    }

    fn dispatch_signal(&self, object_id: &str, signal_index: usize, args: &[Value]) {
        let callbacks: Vec<SignalCallback> = self
            .state
            .borrow()
            .signal_callbacks
            .get(&(object_id.to_string(), signal_index))
            .map(|cbs| cbs.iter().map(|(_, cb)| cb.clone()).collect())
            .unwrap_or_default();
        for callback in callbacks {
            callback(args);
        }
    }

    fn evict_object(&self, object_id: &str) {
        let object = self.state.borrow_mut().objects.remove(object_id);
        if let Some(object) = object {
            self.state.borrow_mut().object_ids.remove(&object.ptr_id());
        }
        self.state.borrow_mut().signal_callbacks.retain(|(id, _), _| id != object_id);
    }

    fn materialize_objects(&self, data: &Value) {
        let entries = match data.as_map() {
            Some(m) => m.iter().map(|(k, v)| (k.to_string(), v.clone())).collect::<Vec<_>>(),
            None => return,
        };
        for (id, class_info) in entries {
            self.ensure_object(&id, Some(&class_info));
        }
    }

    fn ensure_object(&self, id: &str, class_info: Option<&Value>) -> Object {
        if let Some(existing) = self.state.borrow().objects.get(id) {
            return existing.clone();
        }
        let info = class_info.cloned().unwrap_or(Value::Null);
        let object = (self.create_proxy)(id, &info);
        let mut state = self.state.borrow_mut();
        state.object_ids.insert(object.ptr_id(), id.to_string());
        state.objects.insert(id.to_string(), object.clone());
        object
    }

    /// Turn a `{__QObject__, id, data?}` reference arriving from the wire into a live proxy
    /// handle, recursing through arrays and maps. Non-reference values pass through untouched.
    fn unwrap_value(&self, value: Value) -> Value {
        if crate::message::is_qobject_reference(&value) {
            let map = value.as_map().cloned().unwrap_or_default();
            let id = map.get(key::ID).map(|v| v.as_str().to_string()).unwrap_or_default();
            let class_info = map.get(key::DATA).cloned();
            return Value::Object(self.ensure_object(&id, class_info.as_ref()));
        }
        match value {
            Value::Array(items) => Value::array(items.iter().cloned().map(|v| self.unwrap_value(v)).collect()),
            Value::Map(map) => {
                let mut out = ValueMap::new();
                for (k, v) in map.iter() {
                    out.insert(k, self.unwrap_value(v.clone()));
                }
                Value::map(out)
            }
            other => other,
        }
    }

    /// The inverse of `unwrap_value`: turn a local proxy `Value::Object` back into the id
    /// reference the server already knows it by, for outgoing args/property values.
    fn wrap_value(&self, value: Value) -> Value {
        match value {
            Value::Object(object) => {
                let id = self.state.borrow().object_ids.get(&object.ptr_id()).cloned();
                match id {
                    Some(id) => crate::message::qobject_reference(&id, None),
                    None => {
                        log::warn!("wrap_value: object has no id known to the server");
                        Value::Null
                    }
                }
            }
            Value::Array(items) => Value::array(items.iter().cloned().map(|v| self.wrap_value(v)).collect()),
            Value::Map(map) => {
                let mut out = ValueMap::new();
                for (k, v) in map.iter() {
                    out.insert(k, self.wrap_value(v.clone()));
                }
                Value::map(out)
            }
            other => other,
        }
    }
}
