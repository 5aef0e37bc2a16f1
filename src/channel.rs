//! The facade an embedder actually holds: one `Publisher` fronting every attached transport, plus
//! one `Receiver` per transport for the objects that transport's remote end publishes back. Most
//! embeddings only use the `Publisher` half (host exposing objects to a script client) or the
//! `Receiver` half (script client consuming host objects), but both run the same wire protocol so
//! nothing stops a peer-to-peer embedding from using both at once.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use crate::config::ChannelConfig;
use crate::meta::{MetaObject, Object};
use crate::publisher::{Publisher, Timer};
use crate::receiver::{CreateProxyFn, Receiver};
use crate::signal_handler::MetaProviderFn;
use crate::transport::TransportHandle;
use crate::value::Value;

/// Embedder-supplied timer control. `Channel::new` adapts a closure pair into this so
/// `Publisher` never has to know how the host's event loop schedules work.
pub struct ClosureTimer {
    start: Box<dyn Fn(Duration)>,
    stop: Box<dyn Fn()>,
}

impl ClosureTimer {
    pub fn new(start: impl Fn(Duration) + 'static, stop: impl Fn() + 'static) -> Rc<Self> {
        Rc::new(Self { start: Box::new(start), stop: Box::new(stop) })
    }
}

impl Timer for ClosureTimer {
    fn start(&self, interval: Duration) {
        (self.start)(interval)
    }
    fn stop(&self) {
        (self.stop)()
    }
}

/// Ties a `Publisher` to every attached transport and gives each transport its own `Receiver` for
/// objects published back the other way.
pub struct Channel {
    publisher: Rc<Publisher>,
    create_proxy: CreateProxyFn,
    receivers: RefCell<HashMap<usize, (TransportHandle, Rc<Receiver>)>>,
}

impl Channel {
    /// `meta_of` resolves a host `Object` to its reflection descriptor (the embedder's "class
    /// registry" lookup). `timer` drives batched property-update flushing. `create_proxy`
    /// materializes a local proxy object for an id + class descriptor the peer published to us.
    /// Wrapped objects get ids from `default_uuid`; use `with_uuid_source` to override that.
    pub fn new(meta_of: MetaProviderFn, timer: Rc<dyn Timer>, create_proxy: CreateProxyFn, config: ChannelConfig) -> Rc<Channel> {
        Self::with_uuid_source(meta_of, timer, Rc::new(default_uuid), create_proxy, config)
    }

    pub fn with_uuid_source(
        meta_of: MetaProviderFn,
        timer: Rc<dyn Timer>,
        create_uuid: Rc<dyn Fn() -> String>,
        create_proxy: CreateProxyFn,
        config: ChannelConfig,
    ) -> Rc<Channel> {
        Rc::new(Channel {
            publisher: Publisher::new(meta_of, timer, create_uuid, config),
            create_proxy,
            receivers: RefCell::new(HashMap::new()),
        })
    }

    pub fn publisher(&self) -> &Rc<Publisher> {
        &self.publisher
    }

    pub fn receiver(&self, transport: &TransportHandle) -> Option<Rc<Receiver>> {
        self.receivers.borrow().get(&transport.ptr_id()).map(|(_, r)| r.clone())
    }

    /// Attach a transport: the `Publisher` starts broadcasting registered objects to it and a
    /// fresh `Receiver` is created to consume whatever the other end publishes back.
    pub fn connect_to(&self, transport: TransportHandle) -> Rc<Receiver> {
        self.publisher.add_transport(transport.clone());
        let receiver = Receiver::new(transport.clone(), self.create_proxy.clone());
        self.receivers.borrow_mut().insert(transport.ptr_id(), (transport, receiver.clone()));
        receiver
    }

    pub fn disconnect_from(&self, transport: &TransportHandle) {
        self.publisher.remove_transport(transport);
        self.receivers.borrow_mut().remove(&transport.ptr_id());
    }

    pub fn register_object(&self, id: impl Into<String>, object: Object) {
        self.publisher.register_object(id, object);
    }

    pub fn register_objects(&self, objects: impl IntoIterator<Item = (String, Object)>) {
        for (id, object) in objects {
            self.publisher.register_object(id, object);
        }
    }

    pub fn deregister_object(&self, id: &str) {
        self.publisher.deregister_object(id);
    }

    pub fn set_block_updates(&self, blocked: bool) {
        self.publisher.set_block_updates(blocked);
    }

    /// Route one decoded wire message, arriving on `transport`, to whichever half (`Publisher` or
    /// the matching `Receiver`) is equipped to answer it.
    pub fn handle_message(&self, message: &crate::message::Message, transport: &TransportHandle) {
        use crate::message::MessageType::*;
        match message.message_type() {
            Init | Idle | Debug | InvokeMethod | ConnectToSignal | DisconnectFromSignal | SetProperty => {
                self.publisher.handle_message(message, transport);
            }
            Response | Signal | PropertyUpdate => {
                match self.receiver(transport) {
                    Some(receiver) => receiver.handle_message(message),
                    None => log::warn!("message for a transport with no attached Receiver"),
                }
            }
            Invalid => log::warn!("dropping message with unknown or missing type"),
        }
    }

    /// Decode `text` as JSON, wrap it as a `Message`, and dispatch it as `handle_message` would.
    pub fn handle_wire_text(&self, text: &str, transport: &TransportHandle) {
        let value = crate::value::from_json(text);
        let map = match value.as_map() {
            Some(m) => m.clone(),
            None => {
                log::warn!("dropping non-object wire message");
                return;
            }
        };
        self.handle_message(&crate::message::Message::from_map(map), transport);
    }

    pub fn send_pending_property_updates(&self) {
        self.publisher.send_pending_property_updates();
    }
}

/// The virtual hooks an embedder must wire up to finish a `Channel`: resolving a live object's
/// reflection descriptor, minting ids for newly-wrapped objects, and driving the property-update
/// timer. `Channel::new` takes these as plain closures/trait objects rather than requiring an
/// embedder to implement a trait, since most embeddings only need a couple of lines for each.
pub fn default_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}
