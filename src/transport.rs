//! The `Transport` trait the core sends/receives `Message`s through, plus `PairedTransport`, an
//! in-process loopback implementation shipped for tests and as a worked embedding example. A real
//! network transport (TCP, WebSocket, IPC pipe...) is out of scope for this crate; an embedder
//! implements `Transport` against whatever wire it already owns.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::error::CoreResult;
use crate::message::Message;

pub trait Transport {
    fn send_message(&self, message: &Message) -> CoreResult<()>;
}

/// A reference-counted, identity-comparable handle to a transport. `Channel` keys its transport
/// set by this, the same way it keys objects by `Object`.
#[derive(Clone)]
pub struct TransportHandle(Rc<dyn Transport>);

impl TransportHandle {
    pub fn new(transport: Rc<dyn Transport>) -> Self {
        TransportHandle(transport)
    }

    pub fn ptr_id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub fn send_message(&self, message: &Message) -> CoreResult<()> {
        self.0.send_message(message)
    }
}

impl PartialEq for TransportHandle {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for TransportHandle {}

impl fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransportHandle(#{:x})", self.ptr_id())
    }
}

/// Two in-process endpoints wired back-to-back. Each `send_message` appends to the peer's
/// mailbox; `drain()` hands the accumulated messages to a caller-supplied handler. There's no
/// encode/decode boundary to cross here — this exists to drive `Channel`/`Publisher`/`Receiver`
/// in tests and demos without standing up a real socket.
pub struct PairedTransport {
    inbox: RefCell<VecDeque<Message>>,
}

impl PairedTransport {
    /// Build two ends of a pair. Each end's `send_message` enqueues into the *other* end's inbox.
    pub fn pair() -> (Rc<PairedTransport>, Rc<PairedTransport>) {
        let a = Rc::new(PairedTransport { inbox: RefCell::new(VecDeque::new()) });
        let b = Rc::new(PairedTransport { inbox: RefCell::new(VecDeque::new()) });
        (a, b)
    }

    /// Drain every message sent to this end since the last drain, invoking `handler` for each in
    /// arrival order.
    pub fn drain(&self, mut handler: impl FnMut(Message)) {
        while let Some(msg) = self.inbox.borrow_mut().pop_front() {
            handler(msg);
        }
    }

    fn push(&self, message: Message) {
        self.inbox.borrow_mut().push_back(message);
    }
}

/// Bridges one `PairedTransport` half to the other: sending on `self` enqueues onto `peer`.
pub struct PairedTransportEnd {
    peer: Rc<PairedTransport>,
}

impl PairedTransportEnd {
    pub fn new(peer: Rc<PairedTransport>) -> Rc<Self> {
        Rc::new(Self { peer })
    }
}

impl Transport for PairedTransportEnd {
    fn send_message(&self, message: &Message) -> CoreResult<()> {
        self.peer.push(message.clone());
        Ok(())
    }
}
