//! An object-bridging RPC channel: publishes host objects to a remote script client over JSON,
//! the way a desktop toolkit bridges a native object tree into an embedded web view.
//!
//! [`Publisher`](publisher::Publisher) owns the registered/wrapped object populations on the host
//! side and answers the client's `Init`/`InvokeMethod`/`ConnectToSignal`/`DisconnectFromSignal`/
//! `SetProperty` requests. [`Receiver`](receiver::Receiver) is the client-side mirror: it sends
//! those requests and turns `Signal`/`PropertyUpdate`/`Response` messages into materialized proxy
//! objects and callback dispatch. [`Channel`](channel::Channel) wires a `Publisher` and one
//! `Receiver` per transport together behind a single handle.
//!
//! The wire format is [`Message`](message::Message), a typed facade over [`Value`](value::Value),
//! a JSON-compatible tagged union with `Rc`-backed arrays/maps so cloning a value is always a
//! cheap aliasing view rather than a deep copy.

pub mod channel;
pub mod config;
pub mod error;
pub mod message;
pub mod meta;
pub mod publisher;
pub mod receiver;
pub mod signal_handler;
pub mod transport;
pub mod value;

#[cfg(test)]
mod test_support;

pub use channel::{Channel, ClosureTimer};
pub use config::ChannelConfig;
pub use error::{CoreError, CoreResult, OrLog};
pub use message::{Message, MessageType};
pub use meta::{Connection, MetaEnum, MetaMethod, MetaObject, MetaProperty, Object};
pub use publisher::{Publisher, Timer};
pub use receiver::{Receiver, SignalSubscription};
pub use transport::{PairedTransport, PairedTransportEnd, Transport, TransportHandle};
pub use value::{Value, ValueMap};
