//! The service transport capability set and its loopback implementation.
//!
//! [`ServiceTransport`] is the polymorphic surface every transport exposes
//! to the RPC runtime's dispatch loop. [`RawTransport`] implements it over
//! the shared in-memory buffer: receive is a pure handoff (the call is
//! already sitting in the buffer), decode and reply are the two halves of a
//! round trip, and destroy is a no-op because the buffer outlives any one
//! handle.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::buffer::{CodecStream, StreamMode};
use crate::codec::{CodecError, EnvelopeCodec};
use crate::envelope::{CallEnvelope, ReplyEnvelope};
use crate::registry::Slot;

/// Status a transport reports back to the dispatch loop when an operation
/// leaves it usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportStatus {
    /// The transport is idle and ready for the next round trip.
    Idle,
    /// The transport still holds buffered requests.
    ///
    /// Never reported by [`RawTransport`], whose buffer holds exactly one
    /// envelope at a time.
    MoreRequests,
}

/// Terminal failures of a transport handle.
///
/// Either kind leaves the handle dead from the runtime's point of view;
/// there is no retry path, the caller re-acquires a handle from the
/// registry.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The registry slot backing this handle no longer exists.
    #[error("no active raw transport instance")]
    MissingInstance,

    /// The envelope codec rejected the buffer contents.
    #[error("envelope codec failed")]
    Codec(#[from] CodecError),
}

/// Outcome of a fallible transport operation.
pub type TransportResult = Result<TransportStatus, TransportError>;

/// Request-dispatch callback invoked from [`ServiceTransport::receive`].
///
/// The runtime's dispatch loop owns this; it typically builds a
/// [`RequestContext`] over the stream and calls back into
/// [`ServiceTransport::decode`].
pub type DispatchFn = Rc<dyn Fn(&RawTransport, &Rc<RefCell<CodecStream>>) -> TransportResult>;

/// Procedure-processing callback invoked from [`ServiceTransport::decode`]
/// once a call envelope has been decoded into the context.
pub type ProcessFn = Rc<dyn Fn(&mut RequestContext) -> TransportResult>;

/// Per-request state threaded through decode and reply.
///
/// Holds a reference to the transport's stream, the decoded call, and the
/// reply slot the processing callback fills in before calling
/// [`ServiceTransport::reply`].
pub struct RequestContext {
    stream: Rc<RefCell<CodecStream>>,
    /// The decoded call envelope; reinitialized at the start of each decode.
    pub call: CallEnvelope,
    /// The reply envelope to encode; populated by the processing callback.
    pub reply: ReplyEnvelope,
}

impl RequestContext {
    /// Create an empty context over the given stream.
    pub fn new(stream: Rc<RefCell<CodecStream>>) -> Self {
        Self {
            stream,
            call: CallEnvelope::default(),
            reply: ReplyEnvelope::default(),
        }
    }
}

/// Capability set every transport exposes to the RPC runtime.
pub trait ServiceTransport {
    /// Query current liveness/idleness. Never blocks, never fails.
    fn stat(&self) -> TransportStatus;

    /// Hand off buffered input to the dispatch callback.
    ///
    /// # Errors
    ///
    /// Returns `MissingInstance` if the backing instance is gone, otherwise
    /// whatever the dispatch callback yields.
    fn receive(&self) -> TransportResult;

    /// Parse buffered bytes into a call envelope, then invoke processing.
    ///
    /// # Errors
    ///
    /// Returns `Codec` on malformed input; the processing callback is never
    /// invoked in that case.
    fn decode(&self, ctx: &mut RequestContext) -> TransportResult;

    /// Serialize the context's reply envelope into the buffer.
    ///
    /// # Errors
    ///
    /// Returns `MissingInstance` if the backing instance is gone, `Codec`
    /// if the reply cannot be encoded.
    fn reply(&self, ctx: &mut RequestContext) -> TransportResult;

    /// Release transport-owned resources. May be a no-op.
    fn destroy(&self);

    /// Transport-specific out-of-band operation.
    ///
    /// Returns `false` when the request code is unsupported.
    fn control(&self, code: u32, payload: &mut [u8]) -> bool;

    /// Optional integrity-check hook. `None` means not provided.
    fn checksum(&self, _data: &[u8]) -> Option<u32> {
        None
    }

    /// Optional cleanup hook for caller-attached data.
    ///
    /// Returns `false` when the transport provides no cleanup.
    fn free_user_data(&self) -> bool {
        false
    }
}

/// Loopback transport over the registry's shared codec buffer.
///
/// Created only by [`TransportRegistry::create`]; holds a weak reference to
/// the registry slot so that a handle outliving its registry fails with
/// `MissingInstance` instead of touching freed state.
///
/// [`TransportRegistry::create`]: crate::TransportRegistry::create
pub struct RawTransport {
    stream: Rc<RefCell<CodecStream>>,
    codec: Rc<dyn EnvelopeCodec>,
    dispatch: DispatchFn,
    process: ProcessFn,
    slot: Weak<Slot>,
}

impl RawTransport {
    pub(crate) fn new(
        stream: Rc<RefCell<CodecStream>>,
        codec: Rc<dyn EnvelopeCodec>,
        dispatch: DispatchFn,
        process: ProcessFn,
        slot: Weak<Slot>,
    ) -> Self {
        Self {
            stream,
            codec,
            dispatch,
            process,
            slot,
        }
    }

    /// The stream bound to the shared buffer for this transport's lifetime.
    pub fn stream(&self) -> &Rc<RefCell<CodecStream>> {
        &self.stream
    }

    /// Fresh request context over this transport's stream.
    pub fn request_context(&self) -> RequestContext {
        RequestContext::new(self.stream.clone())
    }

    fn instance_alive(&self) -> Result<(), TransportError> {
        let slot = self.slot.upgrade().ok_or(TransportError::MissingInstance)?;
        if slot.borrow().is_none() {
            return Err(TransportError::MissingInstance);
        }
        Ok(())
    }
}

impl ServiceTransport for RawTransport {
    fn stat(&self) -> TransportStatus {
        // The raw transport never reports backlog or closure here.
        TransportStatus::Idle
    }

    fn receive(&self) -> TransportResult {
        self.instance_alive()?;
        tracing::trace!("handing buffered call to dispatch");
        (self.dispatch)(self, &self.stream)
    }

    fn decode(&self, ctx: &mut RequestContext) -> TransportResult {
        ctx.call = CallEnvelope::default();
        let call = {
            let mut stream = ctx.stream.borrow_mut();
            stream.reset(StreamMode::Decode);
            self.codec.decode_call(&mut stream)?
        };
        tracing::trace!(xid = call.xid, procedure = call.procedure, "decoded call");
        ctx.call = call;
        (self.process)(ctx)
    }

    fn reply(&self, ctx: &mut RequestContext) -> TransportResult {
        self.instance_alive()?;
        let mut stream = self.stream.borrow_mut();
        stream.reset(StreamMode::Encode);
        self.codec.encode_reply(&mut stream, &ctx.reply)?;
        // Position read kept so the timing includes the bookkeeping a real
        // transport performs on its outgoing byte count; the value is unused.
        let _ = stream.position();
        tracing::trace!(xid = ctx.reply.xid, "encoded reply");
        Ok(TransportStatus::Idle)
    }

    fn destroy(&self) {
        // The shared buffer is registry-scoped, not handle-scoped; nothing
        // to release.
    }

    fn control(&self, code: u32, _payload: &mut [u8]) -> bool {
        tracing::trace!(code, "control request unsupported");
        false
    }
}
