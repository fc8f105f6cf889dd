//! Loopback timing example: measure raw RPC round-trip overhead.
//!
//! Drives a number of call/reply cycles through the in-memory transport and
//! reports the time per round trip. Because no socket or kernel I/O is
//! involved, the figure is pure codec plus dispatch cost.
//!
//! ```bash
//! cargo run --example loopback_timing --release
//! ```

use std::rc::Rc;
use std::time::Instant;

use rawloop::{
    CallEnvelope, EnvelopeCodec, JsonEnvelopeCodec, ProcessFn, ReplyEnvelope, ServiceTransport,
    StreamMode, TransportRegistryBuilder, TransportStatus,
};

const ROUND_TRIPS: u32 = 100_000;
const ARG_BYTES: usize = 256;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let process: ProcessFn = Rc::new(|ctx| {
        ctx.reply = ReplyEnvelope::accepted(&ctx.call, ctx.call.args.clone());
        Ok(TransportStatus::Idle)
    });
    let registry = TransportRegistryBuilder::new(process).build();
    let transport = registry.create();

    tracing::info!(round_trips = ROUND_TRIPS, arg_bytes = ARG_BYTES, "starting");

    let codec = JsonEnvelopeCodec;
    let args = vec![0x5A; ARG_BYTES];
    let start = Instant::now();

    for xid in 1..=ROUND_TRIPS {
        // Client side: place the call into the shared buffer.
        let call = CallEnvelope {
            xid,
            program: 1,
            version: 1,
            procedure: 1,
            args: args.clone(),
        };
        let mut client = registry
            .client_stream(StreamMode::Encode)
            .ok_or("transport not created")?;
        codec.encode_call(&mut client, &call)?;

        // Service side: one decode/reply cycle.
        let mut ctx = transport.request_context();
        transport.decode(&mut ctx)?;
        transport.reply(&mut ctx)?;

        // Client side: read the reply back.
        let mut reader = registry
            .client_stream(StreamMode::Decode)
            .ok_or("transport not created")?;
        let reply = codec.decode_reply(&mut reader)?;
        assert_eq!(reply.xid, xid);
    }

    let elapsed = start.elapsed();
    tracing::info!(
        total_ms = elapsed.as_millis() as u64,
        ns_per_round_trip = (elapsed.as_nanos() / u128::from(ROUND_TRIPS)) as u64,
        "finished"
    );

    Ok(())
}
