//! Minimal worked example: one `Channel` publishing a counter object to itself over a
//! `PairedTransport`, driven by a hand-rolled event loop. Run with `RUST_LOG=debug` to see the
//! message traffic.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use qbridge_core::meta::{type_code, Connection, DispatchFn, MetaEnum, MetaMethod, MetaObject, MetaProperty, Object, ReplyFn};
use qbridge_core::{Channel, ChannelConfig, ClosureTimer, PairedTransport, PairedTransportEnd, TransportHandle, Value};

struct Counter {
    value: Cell<i32>,
}

struct CounterClass;

impl MetaObject for CounterClass {
    fn class_name(&self) -> &str {
        "Counter"
    }

    fn properties(&self) -> Vec<MetaProperty> {
        vec![MetaProperty { name: "value".into(), type_code: type_code::INT32, notify_signal: Some(1) }]
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
                name: "valueChanged".into(),
                is_signal: true,
                is_public: false,
                return_type: type_code::VOID,
                param_types: vec![type_code::INT32],
                param_names: vec!["value".into()],
            },
            MetaMethod {
                name: "increment".into(),
                is_signal: false,
                is_public: true,
                return_type: type_code::INT32,
                param_types: vec![],
                param_names: vec![],
            },
        ]
    }

    fn enums(&self) -> Vec<MetaEnum> {
        vec![]
    }

    fn read_property(&self, object: &Object, index: usize) -> qbridge_core::CoreResult<Value> {
        let counter = object.downcast_ref::<Counter>().expect("Counter object");
        match index {
            0 => Ok(Value::Int32(counter.value.get())),
            _ => Err(qbridge_core::CoreError::BadProperty { object: "counter".into(), index }),
        }
    }

    fn write_property(&self, object: &Object, index: usize, value: Value) -> qbridge_core::CoreResult<()> {
        let counter = object.downcast_ref::<Counter>().expect("Counter object");
        match index {
            0 => {
                counter.value.set(value.as_i64() as i32);
                Ok(())
            }
            _ => Err(qbridge_core::CoreError::BadProperty { object: "counter".into(), index }),
        }
    }

    fn invoke_method(&self, object: &Object, index: usize, _args: Vec<Value>, reply: ReplyFn) {
        let counter = object.downcast_ref::<Counter>().expect("Counter object");
        if index == 2 {
            counter.value.set(counter.value.get() + 1);
            reply(Value::Int32(counter.value.get()));
        } else {
            reply(Value::Null);
        }
    }

    fn connect_signal(&self, object: &Object, signal_index: usize, dispatch: DispatchFn) -> Connection {
        log::debug!("native connect to signal {} requested (no native signal source in this demo)", signal_index);
        Connection { object: object.clone(), signal_index, receiver: Rc::new(()), dispatch }
    }

    fn disconnect_signal(&self, _connection: &Connection) {}
}

fn main() {
    env_logger::init();

    let class = Rc::new(CounterClass);
    let meta_of = {
        let class = class.clone();
        Rc::new(move |_o: &Object| Some(class.clone() as Rc<dyn MetaObject>))
    };
    let timer = ClosureTimer::new(
        |interval: Duration| log::debug!("would arm property-update timer for {:?}", interval),
        || log::debug!("would stop property-update timer"),
    );
    let create_proxy: Rc<dyn Fn(&str, &Value) -> Object> =
        Rc::new(|id, _info| Object::new(Rc::new(format!("proxy:{}", id))));

    let channel = Channel::new(meta_of, timer, create_proxy, ChannelConfig::default());

    let counter = Object::new(Rc::new(Counter { value: Cell::new(0) }));
    channel.register_object("counter", counter);

    let (server_side, client_side) = PairedTransport::pair();
    let server_transport = TransportHandle::new(PairedTransportEnd::new(client_side.clone()));
    let client_transport = TransportHandle::new(PairedTransportEnd::new(server_side.clone()));
    let receiver = channel.connect_to(client_transport.clone());

    receiver.init(|| log::info!("client received Init response"));
    server_side.drain(|m| channel.handle_message(&m, &server_transport));
    client_side.drain(|m| channel.handle_message(&m, &client_transport));

    if let Some(counter_proxy) = receiver.object("counter") {
        log::info!("materialized proxy for counter: {:?}", counter_proxy);
    }

    receiver.invoke_method("counter", 2, vec![], |result| {
        log::info!("increment() returned {:?}", result);
    });
    server_side.drain(|m| channel.handle_message(&m, &server_transport));
    client_side.drain(|m| channel.handle_message(&m, &client_transport));
}
