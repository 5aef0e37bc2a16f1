//! Mock host objects and classes used only by this crate's own test suite. Not part of the
//! public API.

#![cfg(test)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{CoreError, CoreResult};
use crate::meta::{Connection, DispatchFn, MetaEnum, MetaMethod, MetaObject, MetaProperty, Object, ReplyFn};
use crate::value::Value;

/// An opaque host object with no behavior of its own; `MockClass` supplies all the reflection.
pub struct MockObject;

impl MockObject {
    pub fn new() -> Self {
        MockObject
    }
}

/// A single host "class": reflection descriptors plus enough bookkeeping to assert on from tests
/// (connect/disconnect counts, invoked methods, live property values).
pub struct MockClass {
    class_name: String,
    methods: RefCell<Vec<MetaMethod>>,
    properties: RefCell<Vec<MetaProperty>>,
    enums: RefCell<Vec<MetaEnum>>,
    connections: RefCell<HashMap<(usize, usize), DispatchFn>>,
    connect_count: Cell<usize>,
    disconnect_count: Cell<usize>,
    property_values: RefCell<HashMap<usize, Value>>,
    invoked: RefCell<Vec<(usize, Vec<Value>)>>,
    invoke_result: RefCell<Value>,
}

impl MockClass {
    pub fn new(class_name: &str) -> Rc<Self> {
        Rc::new(Self {
            class_name: class_name.to_owned(),
            methods: RefCell::new(vec![MetaMethod {
                name: "destroyed".into(),
                is_signal: true,
                is_public: false,
                return_type: crate::meta::type_code::VOID,
                param_types: vec![],
                param_names: vec![],
            }]),
            properties: RefCell::new(Vec::new()),
            enums: RefCell::new(Vec::new()),
            connections: RefCell::new(HashMap::new()),
            connect_count: Cell::new(0),
            disconnect_count: Cell::new(0),
            property_values: RefCell::new(HashMap::new()),
            invoked: RefCell::new(Vec::new()),
            invoke_result: RefCell::new(Value::Null),
        })
    }

    /// Convenience: a class whose only non-destroyed method is the named signal at index 1.
    pub fn with_signal(signal_name: &str) -> Rc<Self> {
        let class = Self::new("Mock");
        class.add_signal(signal_name);
        class
    }

    pub fn add_signal(&self, name: &str) -> usize {
        let mut methods = self.methods.borrow_mut();
        methods.push(MetaMethod {
            name: name.to_owned(),
            is_signal: true,
            is_public: false,
            return_type: crate::meta::type_code::VOID,
            param_types: vec![],
            param_names: vec![],
        });
        methods.len() - 1
    }

    pub fn add_method(&self, name: &str) -> usize {
        let mut methods = self.methods.borrow_mut();
        methods.push(MetaMethod {
            name: name.to_owned(),
            is_signal: false,
            is_public: true,
            return_type: crate::meta::type_code::INT32,
            param_types: vec![],
            param_names: vec![],
        });
        methods.len() - 1
    }

    pub fn add_property(&self, name: &str, notify_signal: Option<usize>) -> usize {
        let mut properties = self.properties.borrow_mut();
        let index = properties.len();
        properties.push(MetaProperty {
            name: name.to_owned(),
            type_code: crate::meta::type_code::INT32,
            notify_signal,
        });
        self.property_values.borrow_mut().insert(index, Value::Null);
        index
    }

    pub fn set_property_value(&self, index: usize, value: Value) {
        self.property_values.borrow_mut().insert(index, value);
    }

    pub fn set_invoke_result(&self, value: Value) {
        *self.invoke_result.borrow_mut() = value;
    }

    pub fn connect_count(&self) -> usize {
        self.connect_count.get()
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnect_count.get()
    }

    pub fn invoked(&self) -> Vec<(usize, Vec<Value>)> {
        self.invoked.borrow().clone()
    }

    /// Simulate the host firing a native signal: invoke whatever dispatch closure is currently
    /// connected for (object, signal_index), if any.
    pub fn fire(&self, object: &Object, signal_index: usize, args: &[Value]) {
        if let Some(dispatch) = self.connections.borrow().get(&(object.ptr_id(), signal_index)) {
            dispatch(args);
        }
    }
}

impl MetaObject for MockClass {
    fn class_name(&self) -> &str {
        &self.class_name
    }

    fn properties(&self) -> Vec<MetaProperty> {
        self.properties.borrow().clone()
    }

    fn methods(&self) -> Vec<MetaMethod> {
        self.methods.borrow().clone()
    }

    fn enums(&self) -> Vec<MetaEnum> {
        self.enums.borrow().clone()
    }

    fn read_property(&self, _object: &Object, index: usize) -> CoreResult<Value> {
        self.property_values
            .borrow()
            .get(&index)
            .cloned()
            .ok_or(CoreError::BadProperty { object: "mock".into(), index })
    }

    fn write_property(&self, _object: &Object, index: usize, value: Value) -> CoreResult<()> {
        if !self.property_values.borrow().contains_key(&index) {
            return Err(CoreError::BadProperty { object: "mock".into(), index });
        }
        self.property_values.borrow_mut().insert(index, value);
        Ok(())
    }

    fn invoke_method(&self, _object: &Object, index: usize, args: Vec<Value>, reply: ReplyFn) {
        self.invoked.borrow_mut().push((index, args));
        reply(self.invoke_result.borrow().clone());
    }

    fn connect_signal(&self, object: &Object, signal_index: usize, dispatch: DispatchFn) -> Connection {
        self.connect_count.set(self.connect_count.get() + 1);
        self.connections
            .borrow_mut()
            .insert((object.ptr_id(), signal_index), dispatch.clone());
        Connection {
            object: object.clone(),
            signal_index,
            receiver: Rc::new(()),
            dispatch,
        }
    }

    fn disconnect_signal(&self, connection: &Connection) {
        self.disconnect_count.set(self.disconnect_count.get() + 1);
        self.connections
            .borrow_mut()
            .remove(&(connection.object.ptr_id(), connection.signal_index));
    }
}
