//! # rawloop
//!
//! In-process loopback transport for an RPC service runtime.
//!
//! A client and server living in one process exchange call and reply
//! envelopes through a shared fixed-capacity buffer, bypassing sockets and
//! the kernel entirely. That makes the request-dispatch path measurable in
//! isolation: the time a round trip takes here is codec cost plus dispatch
//! cost and nothing else. This is a measurement and testing aid, not a
//! production transport.
//!
//! This crate provides:
//! - **`CodecBuffer` / `CodecStream`**: the shared "wire" and the cursors
//!   that read and write it
//! - **`EnvelopeCodec`**: pluggable envelope serialization with a JSON
//!   default
//! - **`ServiceTransport`**: the capability set every transport exposes to
//!   the runtime, implemented by `RawTransport`
//! - **`TransportRegistry`**: explicit owner of the single loopback
//!   instance
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//! use rawloop::{
//!     CallEnvelope, EnvelopeCodec, JsonEnvelopeCodec, ProcessFn, ReplyEnvelope,
//!     ServiceTransport, StreamMode, TransportRegistryBuilder, TransportStatus,
//! };
//!
//! // The procedure side: echo the arguments back.
//! let process: ProcessFn = Rc::new(|ctx| {
//!     ctx.reply = ReplyEnvelope::accepted(&ctx.call, ctx.call.args.clone());
//!     Ok(TransportStatus::Idle)
//! });
//!
//! let registry = TransportRegistryBuilder::new(process).build();
//! let transport = registry.create();
//!
//! // The client side: place a call into the shared buffer.
//! let mut client = registry.client_stream(StreamMode::Encode).expect("created");
//! let call = CallEnvelope { xid: 1, procedure: 2, args: b"hi".to_vec(), ..Default::default() };
//! JsonEnvelopeCodec.encode_call(&mut client, &call).expect("encode");
//!
//! // Drive one round trip through the service side.
//! let mut ctx = transport.request_context();
//! transport.decode(&mut ctx).expect("decode");
//! transport.reply(&mut ctx).expect("reply");
//!
//! // The reply now occupies the slot the call used.
//! let mut reader = registry.client_stream(StreamMode::Decode).expect("created");
//! let reply = JsonEnvelopeCodec.decode_reply(&mut reader).expect("decode");
//! assert_eq!(reply.xid, 1);
//! assert_eq!(reply.body, b"hi".to_vec());
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

/// Shared codec buffer and stream cursor.
pub mod buffer;

/// Envelope framing and serialization.
pub mod codec;

/// Call and reply envelope types.
pub mod envelope;

/// Registry owning the single loopback instance.
pub mod registry;

/// Transport capability trait and the loopback implementation.
pub mod transport;

// Buffer exports
pub use buffer::{CodecBuffer, CodecStream, RAW_MESSAGE_SIZE, StreamError, StreamMode};

// Codec exports
pub use codec::{CodecError, EnvelopeCodec, FRAME_HEADER_SIZE, JsonEnvelopeCodec};

// Envelope exports
pub use envelope::{CallEnvelope, ReplyEnvelope, ReplyStatus};

// Registry exports
pub use registry::{
    ChannelId, EventChannelRegistrar, NoopRegistrar, RawConfig, TransportRegistry,
    TransportRegistryBuilder, flags,
};

// Transport exports
pub use transport::{
    DispatchFn, ProcessFn, RawTransport, RequestContext, ServiceTransport, TransportError,
    TransportResult, TransportStatus,
};
