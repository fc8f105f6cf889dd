//! Call and reply envelopes exchanged over the loopback buffer.
//!
//! These mirror what a real RPC transport would put on the wire: the call
//! side names a program, version, and procedure plus opaque argument bytes;
//! the reply side carries an accept status and opaque result bytes. Both are
//! matched by `xid`.

use serde::{Deserialize, Serialize};

/// A call envelope as placed into the shared buffer by the client side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEnvelope {
    /// Transaction id matching the call to its reply.
    pub xid: u32,
    /// Remote program number.
    pub program: u32,
    /// Remote program version.
    pub version: u32,
    /// Procedure within the program.
    pub procedure: u32,
    /// Opaque, already-serialized procedure arguments.
    pub args: Vec<u8>,
}

/// Accept status carried by a reply envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyStatus {
    /// The call was dispatched and the body holds its results.
    #[default]
    Accepted,
    /// The program does not export the requested procedure.
    ProcedureUnavailable,
    /// The arguments could not be deserialized by the procedure.
    GarbageArgs,
    /// The procedure failed internally.
    SystemError,
}

/// A reply envelope written back into the shared buffer by [`reply`].
///
/// [`reply`]: crate::ServiceTransport::reply
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    /// Transaction id of the call being answered.
    pub xid: u32,
    /// Whether the call was accepted and how it fared.
    pub status: ReplyStatus,
    /// Opaque, already-serialized procedure results.
    pub body: Vec<u8>,
}

impl ReplyEnvelope {
    /// Build an accepted reply answering `call` with `body`.
    pub fn accepted(call: &CallEnvelope, body: Vec<u8>) -> Self {
        Self {
            xid: call.xid,
            status: ReplyStatus::Accepted,
            body,
        }
    }

    /// Build an error reply answering `call` with the given status.
    pub fn error(call: &CallEnvelope, status: ReplyStatus) -> Self {
        Self {
            xid: call.xid,
            status,
            body: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_envelope_serde_roundtrip() {
        let call = CallEnvelope {
            xid: 7,
            program: 100_003,
            version: 4,
            procedure: 1,
            args: vec![1, 2, 3],
        };

        let json = serde_json::to_string(&call).expect("serialize");
        let decoded: CallEnvelope = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(call, decoded);
    }

    #[test]
    fn test_reply_envelope_serde_roundtrip() {
        let reply = ReplyEnvelope {
            xid: 7,
            status: ReplyStatus::GarbageArgs,
            body: vec![],
        };

        let json = serde_json::to_string(&reply).expect("serialize");
        let decoded: ReplyEnvelope = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(reply, decoded);
    }

    #[test]
    fn test_accepted_reply_takes_call_xid() {
        let call = CallEnvelope {
            xid: 42,
            ..CallEnvelope::default()
        };

        let reply = ReplyEnvelope::accepted(&call, vec![9]);
        assert_eq!(reply.xid, 42);
        assert_eq!(reply.status, ReplyStatus::Accepted);
        assert_eq!(reply.body, vec![9]);
    }

    #[test]
    fn test_error_reply_has_empty_body() {
        let call = CallEnvelope {
            xid: 5,
            ..CallEnvelope::default()
        };

        let reply = ReplyEnvelope::error(&call, ReplyStatus::ProcedureUnavailable);
        assert_eq!(reply.xid, 5);
        assert_eq!(reply.status, ReplyStatus::ProcedureUnavailable);
        assert!(reply.body.is_empty());
    }

    #[test]
    fn test_default_call_is_empty() {
        let call = CallEnvelope::default();
        assert_eq!(call.xid, 0);
        assert!(call.args.is_empty());
    }
}
