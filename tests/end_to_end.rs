//! Drives a `Channel` against itself over a `PairedTransport`, covering the handshake, method
//! invocation, batched property notifications, object wrapping, and destruction broadcast.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use qbridge_core::meta::{type_code, Connection, DispatchFn, MetaEnum, MetaMethod, MetaObject, MetaProperty, Object, ReplyFn};
use qbridge_core::{
    Channel, ChannelConfig, ClosureTimer, CoreError, CoreResult, PairedTransport, PairedTransportEnd,
    TransportHandle, Value,
};

struct Widget {
    count: Cell<i32>,
}

const SIG_DESTROYED: usize = 0;
const SIG_COUNT_CHANGED: usize = 1;
const METHOD_BUMP: usize = 2;
const METHOD_SPAWN_CHILD: usize = 3;

/// A host "class" that actually fires its own native signals on state changes, the way a real
/// embedder's generated reflection glue would, rather than a bare recording mock.
struct WidgetClass {
    connections: RefCell<HashMap<(usize, usize), DispatchFn>>,
    connect_count: Cell<usize>,
}

impl WidgetClass {
    fn new() -> Rc<Self> {
        Rc::new(Self { connections: RefCell::new(HashMap::new()), connect_count: Cell::new(0) })
    }

    fn fire(&self, object: &Object, signal_index: usize, args: &[Value]) {
        if let Some(dispatch) = self.connections.borrow().get(&(object.ptr_id(), signal_index)) {
            dispatch(args);
        }
    }
}

impl MetaObject for WidgetClass {
    fn class_name(&self) -> &str {
        "Widget"
    }

    fn properties(&self) -> Vec<MetaProperty> {
        vec![MetaProperty { name: "count".into(), type_code: type_code::INT32, notify_signal: Some(SIG_COUNT_CHANGED) }]
    }

    fn methods(&self) -> Vec<MetaMethod> {
        vec![
            MetaMethod {
                name: "destroyed".into(),
                is_signal: true,
                is_public: false,
                return_type: type_code::VOID,
                param_types: vec![],
                param_names: vec![],
            },
            MetaMethod {
                name: "countChanged".into(),
                is_signal: true,
                is_public: false,
                return_type: type_code::VOID,
                param_types: vec![type_code::INT32],
                param_names: vec!["count".into()],
            },
            MetaMethod {
                name: "bump".into(),
                is_signal: false,
                is_public: true,
                return_type: type_code::INT32,
                param_types: vec![],
                param_names: vec![],
            },
            MetaMethod {
                name: "spawnChild".into(),
                is_signal: false,
                is_public: true,
                return_type: type_code::OBJECT,
                param_types: vec![],
                param_names: vec![],
            },
        ]
    }

    fn enums(&self) -> Vec<MetaEnum> {
        vec![]
    }

    fn read_property(&self, object: &Object, index: usize) -> CoreResult<Value> {
        let widget = object.downcast_ref::<Widget>().expect("Widget object");
        match index {
            0 => Ok(Value::Int32(widget.count.get())),
            _ => Err(CoreError::BadProperty { object: "widget".into(), index }),
        }
    }

    fn write_property(&self, object: &Object, index: usize, value: Value) -> CoreResult<()> {
        let widget = object.downcast_ref::<Widget>().expect("Widget object");
        match index {
            0 => {
                widget.count.set(value.as_i64() as i32);
                Ok(())
            }
            _ => Err(CoreError::BadProperty { object: "widget".into(), index }),
        }
    }

    fn invoke_method(&self, object: &Object, index: usize, _args: Vec<Value>, reply: ReplyFn) {
        let widget = object.downcast_ref::<Widget>().expect("Widget object");
        match index {
            METHOD_BUMP => {
                let new_count = widget.count.get() + 1;
                widget.count.set(new_count);
                self.fire(object, SIG_COUNT_CHANGED, &[Value::Int32(new_count)]);
                reply(Value::Int32(new_count));
            }
            METHOD_SPAWN_CHILD => {
                let child = Object::new(Rc::new(Widget { count: Cell::new(0) }));
                reply(Value::Object(child));
            }
            _ => reply(Value::Null),
        }
    }

    fn connect_signal(&self, object: &Object, signal_index: usize, dispatch: DispatchFn) -> Connection {
        self.connect_count.set(self.connect_count.get() + 1);
        self.connections.borrow_mut().insert((object.ptr_id(), signal_index), dispatch.clone());
        Connection { object: object.clone(), signal_index, receiver: Rc::new(()), dispatch }
    }

    fn disconnect_signal(&self, connection: &Connection) {
        self.connections.borrow_mut().remove(&(connection.object.ptr_id(), connection.signal_index));
    }
}

struct Harness {
    channel: Rc<Channel>,
    class: Rc<WidgetClass>,
    server_transport: TransportHandle,
    client_transport: TransportHandle,
    server_side: Rc<PairedTransport>,
    client_side: Rc<PairedTransport>,
    receiver: Rc<qbridge_core::Receiver>,
}

impl Harness {
    fn new() -> Self {
        let class = WidgetClass::new();
        let meta_of = {
            let class = class.clone();
            Rc::new(move |_o: &Object| Some(class.clone() as Rc<dyn MetaObject>))
        };
        let timer = ClosureTimer::new(|_interval: Duration| {}, || {});
        let create_proxy: Rc<dyn Fn(&str, &Value) -> Object> =
            Rc::new(|id, _info| Object::new(Rc::new(format!("proxy:{}", id))));
        let channel = Channel::new(meta_of, timer, create_proxy, ChannelConfig::default());

        let (server_side, client_side) = PairedTransport::pair();
        let server_transport = TransportHandle::new(PairedTransportEnd::new(client_side.clone()));
        let client_transport = TransportHandle::new(PairedTransportEnd::new(server_side.clone()));
        channel.connect_to(server_transport.clone());
        let receiver = channel.connect_to(client_transport.clone());

        Harness { channel, class, server_transport, client_transport, server_side, client_side, receiver }
    }

    fn pump(&self) {
        self.server_side.drain(|m| self.channel.handle_message(&m, &self.server_transport));
        self.client_side.drain(|m| self.channel.handle_message(&m, &self.client_transport));
    }

    /// Like `pump`, but also hands back every raw `PropertyUpdate` message that crossed to the
    /// client this round, so a test can inspect the wire shape directly rather than only what
    /// the `Receiver`'s signal callbacks surface.
    fn pump_capturing_property_updates(&self) -> Vec<qbridge_core::Message> {
        self.server_side.drain(|m| self.channel.handle_message(&m, &self.server_transport));
        let mut captured = Vec::new();
        self.client_side.drain(|m| {
            if m.message_type() == qbridge_core::MessageType::PropertyUpdate {
                captured.push(m.clone());
            }
            self.channel.handle_message(&m, &self.client_transport);
        });
        captured
    }

    fn register_widget(&self, count: i32) -> Object {
        let widget = Object::new(Rc::new(Widget { count: Cell::new(count) }));
        self.channel.register_object("widget", widget.clone());
        widget
    }
}

#[test]
fn init_handshake_materializes_registered_object() {
    let harness = Harness::new();
    harness.register_widget(0);

    let ready = Rc::new(Cell::new(false));
    let ready_flag = ready.clone();
    harness.receiver.init(move || ready_flag.set(true));
    harness.pump();

    assert!(ready.get());
    assert!(harness.receiver.object("widget").is_some());
}

#[test]
fn invoke_method_returns_host_result_through_the_wire() {
    let harness = Harness::new();
    harness.register_widget(41);
    harness.receiver.init(|| {});
    harness.pump();

    let result = Rc::new(RefCell::new(None));
    let result_slot = result.clone();
    harness.receiver.invoke_method("widget", METHOD_BUMP, vec![], move |v| {
        *result_slot.borrow_mut() = Some(v);
    });
    harness.pump();

    assert_eq!(result.borrow().clone(), Some(Value::Int32(42)));
}

#[test]
fn property_notify_signals_batch_until_idle_then_arrive_as_one_update() {
    let harness = Harness::new();
    let widget = harness.register_widget(0);
    harness.receiver.init(|| {});
    harness.pump();

    let updates = Rc::new(RefCell::new(Vec::new()));
    let updates_slot = updates.clone();
    let _subscription = harness.receiver.connect_to_signal(
        "widget",
        SIG_COUNT_CHANGED,
        Rc::new(move |args: &[Value]| updates_slot.borrow_mut().push(args[0].as_i64())),
    );
    harness.pump();

    harness.receiver.invoke_method("widget", METHOD_BUMP, vec![], |_| {});
    harness.pump();
    harness.receiver.invoke_method("widget", METHOD_BUMP, vec![], |_| {});
    harness.pump();

    assert!(updates.borrow().is_empty(), "notify emissions must not deliver before the client goes idle");

    harness.receiver.notify_idle();
    harness.pump();
    harness.channel.send_pending_property_updates();
    let property_updates = harness.pump_capturing_property_updates();

    assert_eq!(updates.borrow().len(), 1, "both notify emissions must coalesce into one flush");
    assert_eq!(*updates.borrow().last().unwrap(), 2);
    assert_eq!(widget.downcast_ref::<Widget>().unwrap().count.get(), 2);

    assert_eq!(property_updates.len(), 1);
    let entry = property_updates[0].data().unwrap().as_map().unwrap();
    let properties = entry.get(qbridge_core::message::key::PROPERTIES).unwrap().as_map().unwrap();
    assert_eq!(properties.get("0"), Some(&Value::Int32(2)), "count's current value must ride along as a property, not just the notify signal's args");
}

#[test]
fn returned_objects_are_wrapped_and_materialize_as_proxies() {
    let harness = Harness::new();
    harness.register_widget(0);
    harness.receiver.init(|| {});
    harness.pump();

    let child = Rc::new(RefCell::new(None));
    let child_slot = child.clone();
    harness.receiver.invoke_method("widget", METHOD_SPAWN_CHILD, vec![], move |v| {
        *child_slot.borrow_mut() = Some(v);
    });
    harness.pump();

    let child_value = child.borrow().clone().expect("spawnChild should have replied");
    assert!(child_value.is_object(), "wrapped object reference must unwrap to a live proxy");
}

#[test]
fn destroyed_signal_evicts_client_side_object() {
    let harness = Harness::new();
    let widget = harness.register_widget(0);
    harness.receiver.init(|| {});
    harness.pump();
    assert!(harness.receiver.object("widget").is_some());

    // Init wires up the destroyed signal's native connection on first contact; firing it now
    // simulates the host tearing the widget down.
    harness.class.fire(&widget, SIG_DESTROYED, &[]);
    harness.pump();

    assert!(harness.receiver.object("widget").is_none());
}

#[test]
fn connecting_the_same_signal_twice_locally_still_only_connects_once_natively() {
    let harness = Harness::new();
    harness.register_widget(0);
    harness.receiver.init(|| {});
    harness.pump();
    let connect_count_after_init = harness.class.connect_count.get();

    let sub_a = harness.receiver.connect_to_signal("widget", SIG_COUNT_CHANGED, Rc::new(|_| {}));
    harness.pump();
    let connect_count_after_first = harness.class.connect_count.get();

    let sub_b = harness.receiver.connect_to_signal("widget", SIG_COUNT_CHANGED, Rc::new(|_| {}));
    harness.pump();
    let connect_count_after_second = harness.class.connect_count.get();

    assert_eq!(
        connect_count_after_init, connect_count_after_first,
        "count's notify signal is already connected from Init; a client subscription must not reconnect natively"
    );
    assert_eq!(connect_count_after_first, connect_count_after_second);

    harness.receiver.disconnect_from_signal(sub_a);
    harness.receiver.disconnect_from_signal(sub_b);
}
