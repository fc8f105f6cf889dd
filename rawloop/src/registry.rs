//! Registry guarding the single shared loopback instance.
//!
//! The original design kept the buffer and transport in process-wide static
//! storage; here the registry is an explicit object the owning harness
//! constructs once and passes around. "At most one active raw transport" is
//! the registry's contract: repeated [`create`] calls hand back a transport
//! backed by the same buffer instead of allocating a second wire.
//!
//! [`create`]: TransportRegistry::create

use std::cell::RefCell;
use std::rc::Rc;

use crate::buffer::{CodecBuffer, CodecStream, RAW_MESSAGE_SIZE, StreamMode};
use crate::codec::{EnvelopeCodec, JsonEnvelopeCodec};
use crate::transport::{DispatchFn, ProcessFn, RawTransport, ServiceTransport};

/// Identifier of an event channel in the runtime's polling loop.
pub type ChannelId = u32;

/// Registration flags.
pub mod flags {
    /// Pin the transport to the channel it is registered on.
    pub const CHAN_AFFINITY: u32 = 1;
}

/// Event-channel registration service.
///
/// Binds a transport into a server's polling loop. The loopback transport
/// never produces poll events, yet it still registers so its dispatch path
/// is reached the same way a socket-backed transport's would be.
pub trait EventChannelRegistrar {
    /// Register `transport` on `channel` with the given flags.
    fn register(&self, channel: ChannelId, transport: Rc<dyn ServiceTransport>, flags: u32);
}

/// Registrar for harnesses that drive the transport directly and never poll.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRegistrar;

impl EventChannelRegistrar for NoopRegistrar {
    fn register(&self, _channel: ChannelId, _transport: Rc<dyn ServiceTransport>, _flags: u32) {}
}

/// Configuration for the loopback transport.
#[derive(Debug, Clone)]
pub struct RawConfig {
    /// Capacity of the shared codec buffer; fixed once the slot is
    /// populated. No envelope larger than this can cross the loopback.
    pub max_envelope_size: usize,

    /// Event channel the transport registers on.
    pub channel: ChannelId,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            max_envelope_size: RAW_MESSAGE_SIZE,
            channel: 0,
        }
    }
}

/// The populated registry slot: the shared buffer plus the one transport
/// bound to it.
pub(crate) struct ActiveRaw {
    pub(crate) buffer: Rc<RefCell<CodecBuffer>>,
    pub(crate) transport: Rc<RawTransport>,
}

/// Slot holding at most one [`ActiveRaw`] at a time.
pub(crate) type Slot = RefCell<Option<ActiveRaw>>;

/// Builder for [`TransportRegistry`].
///
/// The processing callback is the one thing a harness must always supply;
/// codec, dispatch, registrar, and config all have working defaults.
pub struct TransportRegistryBuilder {
    config: RawConfig,
    codec: Rc<dyn EnvelopeCodec>,
    dispatch: DispatchFn,
    process: ProcessFn,
    registrar: Rc<dyn EventChannelRegistrar>,
}

impl TransportRegistryBuilder {
    /// Start a builder with the given procedure-processing callback.
    pub fn new(process: ProcessFn) -> Self {
        // Default dispatch mirrors the runtime's request path: build a
        // context over the stream and decode.
        let dispatch: DispatchFn = Rc::new(|xprt, _stream| {
            let mut ctx = xprt.request_context();
            xprt.decode(&mut ctx)
        });
        Self {
            config: RawConfig::default(),
            codec: Rc::new(JsonEnvelopeCodec),
            dispatch,
            process,
            registrar: Rc::new(NoopRegistrar),
        }
    }

    /// Override the transport configuration.
    pub fn config(mut self, config: RawConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the envelope codec.
    pub fn codec(mut self, codec: Rc<dyn EnvelopeCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Override the request-dispatch callback invoked from `receive()`.
    pub fn dispatch(mut self, dispatch: DispatchFn) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Override the event-channel registrar.
    pub fn registrar(mut self, registrar: Rc<dyn EventChannelRegistrar>) -> Self {
        self.registrar = registrar;
        self
    }

    /// Build the registry with an empty slot.
    pub fn build(self) -> TransportRegistry {
        TransportRegistry {
            slot: Rc::new(RefCell::new(None)),
            config: self.config,
            codec: self.codec,
            dispatch: self.dispatch,
            process: self.process,
            registrar: self.registrar,
        }
    }
}

/// Owner of the single raw transport and its shared buffer.
pub struct TransportRegistry {
    slot: Rc<Slot>,
    config: RawConfig,
    codec: Rc<dyn EnvelopeCodec>,
    dispatch: DispatchFn,
    process: ProcessFn,
    registrar: Rc<dyn EventChannelRegistrar>,
}

impl TransportRegistry {
    /// Create (or re-acquire) the raw transport.
    ///
    /// Allocates the shared buffer and the transport only on the first call;
    /// later calls observe the populated slot and hand back a handle over
    /// the identical buffer. Every call reinitializes the stream in decode
    /// mode over the full buffer and re-registers the handle with the
    /// event-channel registrar under [`flags::CHAN_AFFINITY`].
    pub fn create(&self) -> Rc<RawTransport> {
        let transport = {
            let mut slot = self.slot.borrow_mut();
            match slot.as_ref() {
                Some(active) => {
                    tracing::debug!("reusing existing raw transport instance");
                    active.transport.clone()
                }
                None => {
                    let buffer =
                        Rc::new(RefCell::new(CodecBuffer::new(self.config.max_envelope_size)));
                    let stream = Rc::new(RefCell::new(CodecStream::new(
                        buffer.clone(),
                        StreamMode::Decode,
                    )));
                    let transport = Rc::new(RawTransport::new(
                        stream,
                        self.codec.clone(),
                        self.dispatch.clone(),
                        self.process.clone(),
                        Rc::downgrade(&self.slot),
                    ));
                    tracing::debug!(
                        capacity = self.config.max_envelope_size,
                        "allocated shared codec buffer"
                    );
                    *slot = Some(ActiveRaw {
                        buffer,
                        transport: transport.clone(),
                    });
                    transport
                }
            }
        };
        transport.stream().borrow_mut().reset(StreamMode::Decode);

        self.registrar.register(
            self.config.channel,
            transport.clone() as Rc<dyn ServiceTransport>,
            flags::CHAN_AFFINITY,
        );
        transport
    }

    /// The shared buffer, if the slot has been populated.
    ///
    /// The harness's client side opens its own [`CodecStream`] over this to
    /// place calls and read replies back.
    pub fn buffer(&self) -> Option<Rc<RefCell<CodecBuffer>>> {
        self.slot.borrow().as_ref().map(|active| active.buffer.clone())
    }

    /// Fresh client-side cursor over the shared buffer.
    pub fn client_stream(&self, mode: StreamMode) -> Option<CodecStream> {
        self.buffer().map(|buffer| CodecStream::new(buffer, mode))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::envelope::CallEnvelope;
    use crate::transport::TransportStatus;

    fn idle_process() -> ProcessFn {
        Rc::new(|_ctx| Ok(TransportStatus::Idle))
    }

    #[derive(Default)]
    struct RecordingRegistrar {
        registrations: Cell<u32>,
        last_channel: Cell<ChannelId>,
        last_flags: Cell<u32>,
    }

    impl EventChannelRegistrar for RecordingRegistrar {
        fn register(&self, channel: ChannelId, _transport: Rc<dyn ServiceTransport>, flags: u32) {
            self.registrations.set(self.registrations.get() + 1);
            self.last_channel.set(channel);
            self.last_flags.set(flags);
        }
    }

    #[test]
    fn test_create_twice_shares_one_buffer() {
        let registry = TransportRegistryBuilder::new(idle_process()).build();

        let first = registry.create();
        let second = registry.create();

        assert!(Rc::ptr_eq(
            first.stream().borrow().buffer(),
            second.stream().borrow().buffer()
        ));
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_create_registers_with_chan_affinity() {
        let registrar = Rc::new(RecordingRegistrar::default());
        let registry = TransportRegistryBuilder::new(idle_process())
            .config(RawConfig {
                channel: 7,
                ..RawConfig::default()
            })
            .registrar(registrar.clone())
            .build();

        registry.create();
        registry.create();

        // Re-registration happens on every create, not just the first.
        assert_eq!(registrar.registrations.get(), 2);
        assert_eq!(registrar.last_channel.get(), 7);
        assert_eq!(registrar.last_flags.get(), flags::CHAN_AFFINITY);
    }

    #[test]
    fn test_create_honors_configured_capacity() {
        let registry = TransportRegistryBuilder::new(idle_process())
            .config(RawConfig {
                max_envelope_size: 128,
                ..RawConfig::default()
            })
            .build();

        registry.create();
        let buffer = registry.buffer().expect("slot populated");
        assert_eq!(buffer.borrow().capacity(), 128);
    }

    #[test]
    fn test_create_reinitializes_stream() {
        let registry = TransportRegistryBuilder::new(idle_process()).build();
        let transport = registry.create();

        transport.stream().borrow_mut().reset(StreamMode::Encode);
        transport
            .stream()
            .borrow_mut()
            .write_bytes(&[1, 2, 3])
            .expect("write");

        let again = registry.create();
        let stream = again.stream().borrow();
        assert_eq!(stream.mode(), StreamMode::Decode);
        assert_eq!(stream.position(), 0);
    }

    #[test]
    fn test_buffer_absent_before_first_create() {
        let registry = TransportRegistryBuilder::new(idle_process()).build();
        assert!(registry.buffer().is_none());
        assert!(registry.client_stream(StreamMode::Encode).is_none());
    }

    #[test]
    fn test_client_stream_shares_transport_buffer() {
        let registry = TransportRegistryBuilder::new(idle_process()).build();
        let transport = registry.create();

        let client = registry
            .client_stream(StreamMode::Encode)
            .expect("slot populated");
        assert!(Rc::ptr_eq(client.buffer(), transport.stream().borrow().buffer()));
    }

    #[test]
    fn test_default_dispatch_reaches_process() {
        let seen = Rc::new(Cell::new(0u32));
        let process: ProcessFn = {
            let seen = seen.clone();
            Rc::new(move |ctx| {
                seen.set(ctx.call.xid);
                Ok(TransportStatus::Idle)
            })
        };
        let registry = TransportRegistryBuilder::new(process).build();
        let transport = registry.create();

        let mut client = registry
            .client_stream(StreamMode::Encode)
            .expect("slot populated");
        JsonEnvelopeCodec
            .encode_call(
                &mut client,
                &CallEnvelope {
                    xid: 11,
                    ..CallEnvelope::default()
                },
            )
            .expect("encode call");

        let status = transport.receive().expect("receive");
        assert_eq!(status, TransportStatus::Idle);
        assert_eq!(seen.get(), 11);
    }
}
