//! The reflective meta-model the host exposes for its objects: class/property/method/enum
//! descriptors, object identity, and the `Connection` record a `SignalHandler` holds onto.
//!
//! The host's own reflection implementation is out of scope for this crate (see PURPOSE & SCOPE);
//! what lives here is only the interface the core consumes.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::error::CoreResult;
use crate::value::Value;

/// Wire-level type tags used in class descriptors (`returnTypeCode`, `paramTypeCodes[]`, property
/// type). The host assigns these; the core never interprets them beyond `OBJECT`, which is the one
/// value it special-cases in `to_variant`/`wrap_result`.
pub mod type_code {
    pub const VOID: i32 = 0;
    pub const BOOL: i32 = 1;
    pub const INT32: i32 = 2;
    pub const INT64: i32 = 3;
    pub const FLOAT32: i32 = 4;
    pub const FLOAT64: i32 = 5;
    pub const STRING: i32 = 6;
    pub const ARRAY: i32 = 7;
    pub const MAP: i32 = 8;
    pub const OBJECT: i32 = 9;
}

/// An opaque handle to a host object. Identity is pointer identity: two handles are equal iff they
/// point at the same underlying allocation, regardless of what's inside. The core never downcasts
/// these itself; `MetaObject` implementations do, since they know the concrete type.
#[derive(Clone)]
pub struct Object(Rc<dyn Any>);

impl Object {
    pub fn new<T: Any>(inner: Rc<T>) -> Self {
        Object(inner)
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Stable numeric identity for use as a map key where `Object` itself would be awkward.
    pub fn ptr_id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Object {}

impl Hash for Object {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ptr_id().hash(state);
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object(#{:x})", self.ptr_id())
    }
}

/// A descriptor for one property. `notify_signal`, when present, must index a method of
/// `is_signal = true` on the same class.
#[derive(Debug, Clone)]
pub struct MetaProperty {
    pub name: String,
    pub type_code: i32,
    pub notify_signal: Option<usize>,
}

/// A descriptor for one method or signal. `method_index 0` is reserved across every class for the
/// synthetic "destroyed" signal.
#[derive(Debug, Clone)]
pub struct MetaMethod {
    pub name: String,
    pub is_signal: bool,
    pub is_public: bool,
    pub return_type: i32,
    pub param_types: Vec<i32>,
    pub param_names: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MetaEnum {
    pub name: String,
    pub keys: Vec<(String, i64)>,
}

/// A dispatch callback a `MetaObject` invokes when its host-side signal fires. Held by the host's
/// connection bookkeeping; the core only constructs and passes it.
pub type DispatchFn = Rc<dyn Fn(&[Value])>;

/// Continuation an `InvokeMethod` handler calls exactly once with the method's result.
pub type ReplyFn = Box<dyn FnOnce(Value)>;

/// A quadruple (source object, signal index, receiver pointer, dispatch function). Equality
/// compares all four, matching the native connection record this wraps.
#[derive(Clone)]
pub struct Connection {
    pub object: Object,
    pub signal_index: usize,
    pub receiver: Rc<dyn Any>,
    pub dispatch: DispatchFn,
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.object == other.object
            && self.signal_index == other.signal_index
            && Rc::ptr_eq(&self.receiver, &other.receiver)
            && Rc::ptr_eq(&self.dispatch, &other.dispatch)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("object", &self.object)
            .field("signal_index", &self.signal_index)
            .finish()
    }
}

/// The reflective interface the host implements once per class and the core consumes for every
/// instance of that class. An embedder looks one of these up from an `Object` via
/// `Channel`'s `meta_object` hook.
pub trait MetaObject {
    fn class_name(&self) -> &str;

    /// Class-level descriptors. These are read rarely (once per `class_info_for_object` call, or
    /// on a cache miss) so returning owned clones keeps the trait object-safe and avoids tying an
    /// internal `RefCell` borrow to `&self`'s lifetime.
    fn properties(&self) -> Vec<MetaProperty>;
    fn methods(&self) -> Vec<MetaMethod>;
    fn enums(&self) -> Vec<MetaEnum>;

    fn property_index_of(&self, name: &str) -> Option<usize> {
        self.properties().iter().position(|p| p.name == name)
    }

    fn method_index_of(&self, name: &str) -> Option<usize> {
        self.methods().iter().position(|m| m.name == name)
    }

    fn read_property(&self, object: &Object, index: usize) -> CoreResult<Value>;
    fn write_property(&self, object: &Object, index: usize, value: Value) -> CoreResult<()>;

    /// Invoke is asynchronous: the host calls `reply` exactly once, possibly after this call
    /// returns, to deliver the result.
    fn invoke_method(&self, object: &Object, index: usize, args: Vec<Value>, reply: ReplyFn);

    /// Subscribe `dispatch` to `signal_index` on `object`, returning the connection record.
    fn connect_signal(
        &self,
        object: &Object,
        signal_index: usize,
        dispatch: DispatchFn,
    ) -> Connection;

    fn disconnect_signal(&self, connection: &Connection);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(std::cell::Cell<i64>);

    #[test]
    fn objects_wrapping_distinct_allocations_are_unequal() {
        let a = Object::new(Rc::new(Counter(std::cell::Cell::new(0))));
        let b = Object::new(Rc::new(Counter(std::cell::Cell::new(0))));
        assert_ne!(a, b);
    }

    #[test]
    fn cloned_object_handle_is_equal() {
        let a = Object::new(Rc::new(Counter(std::cell::Cell::new(0))));
        let b = a.clone();
        assert_eq!(a, b);
        assert_eq!(a.ptr_id(), b.ptr_id());
    }

    #[test]
    fn downcast_ref_resolves_concrete_type() {
        let a = Object::new(Rc::new(Counter(std::cell::Cell::new(42))));
        let counter = a.downcast_ref::<Counter>().expect("should downcast");
        assert_eq!(counter.0.get(), 42);
    }

    #[test]
    fn connection_equality_requires_all_four_fields() {
        let obj_a = Object::new(Rc::new(Counter(std::cell::Cell::new(0))));
        let obj_b = Object::new(Rc::new(Counter(std::cell::Cell::new(0))));
        let receiver: Rc<dyn Any> = Rc::new(());
        let dispatch: DispatchFn = Rc::new(|_args: &[Value]| {});
        let c1 = Connection {
            object: obj_a.clone(),
            signal_index: 3,
            receiver: receiver.clone(),
            dispatch: dispatch.clone(),
        };
        let c2 = Connection {
            object: obj_a.clone(),
            signal_index: 3,
            receiver: receiver.clone(),
            dispatch: dispatch.clone(),
        };
        assert_eq!(c1, c2);
        let c3 = Connection {
            object: obj_b,
            signal_index: 3,
            receiver,
            dispatch,
        };
        assert_ne!(c1, c3);
    }
}
