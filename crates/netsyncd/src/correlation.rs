//! RPC response correlation
//!
//! A request registers a pending entry under a fresh [`ResponseId`]; the
//! matching response resolves it. Entries record which peer is expected to
//! answer, and a response from anyone else leaves the entry untouched.
//! Ids are registered in increasing order, so every id below the highest one
//! registered that is no longer pending counts as retired.

use netsync_core::{CodecError, PackedReader, PackedWriter, PeerId, ResponseId};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Correlation errors (caller misuse)
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CorrelationError {
    #[error("response id {0:?} is already pending")]
    DuplicateResponseId(ResponseId),
    #[error("response id {0:?} was already used")]
    ReusedResponseId(ResponseId),
}

/// Why a pending request ended without a value
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RpcFailure {
    #[error("request abandoned")]
    Abandoned,
    #[error("responder disconnected")]
    Disconnected,
    #[error("target object or behaviour does not exist on the responder")]
    MissingTarget,
    #[error("responder failed to run the call")]
    RemoteFailed,
    #[error("response did not decode as the expected kind: {0}")]
    DecodeFailed(CodecError),
}

/// Expected type of a response value
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResponseKind {
    Unit,
    Bool,
    U32,
    U64,
    I32,
    I64,
    F32,
    Bytes,
    Text,
}

/// RPC result value
#[derive(Clone, Debug, PartialEq)]
pub enum RpcValue {
    Unit,
    Bool(bool),
    U32(u32),
    U64(u64),
    I32(i32),
    I64(i64),
    F32(f32),
    Bytes(Vec<u8>),
    Text(String),
}

impl RpcValue {
    pub fn kind(&self) -> ResponseKind {
        match self {
            RpcValue::Unit => ResponseKind::Unit,
            RpcValue::Bool(_) => ResponseKind::Bool,
            RpcValue::U32(_) => ResponseKind::U32,
            RpcValue::U64(_) => ResponseKind::U64,
            RpcValue::I32(_) => ResponseKind::I32,
            RpcValue::I64(_) => ResponseKind::I64,
            RpcValue::F32(_) => ResponseKind::F32,
            RpcValue::Bytes(_) => ResponseKind::Bytes,
            RpcValue::Text(_) => ResponseKind::Text,
        }
    }

    /// Write the value without a type tag; the reader supplies the kind
    pub fn encode(&self, writer: &mut PackedWriter) {
        match self {
            RpcValue::Unit => {}
            RpcValue::Bool(v) => writer.write_bool(*v),
            RpcValue::U32(v) => writer.write_u32_packed(*v),
            RpcValue::U64(v) => writer.write_u64_packed(*v),
            RpcValue::I32(v) => writer.write_i32_packed(*v),
            RpcValue::I64(v) => writer.write_i64_packed(*v),
            RpcValue::F32(v) => writer.write_f32(*v),
            RpcValue::Bytes(v) => writer.write_bytes(v),
            RpcValue::Text(v) => writer.write_str(v),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = PackedWriter::new();
        self.encode(&mut writer);
        writer.into_vec()
    }

    /// Decode a complete value of `kind`
    pub fn decode(kind: ResponseKind, bytes: &[u8]) -> Result<Self, CodecError> {
        let mut reader = PackedReader::new(bytes);
        let value = match kind {
            ResponseKind::Unit => RpcValue::Unit,
            ResponseKind::Bool => RpcValue::Bool(reader.read_bool()?),
            ResponseKind::U32 => RpcValue::U32(reader.read_u32_packed()?),
            ResponseKind::U64 => RpcValue::U64(reader.read_u64_packed()?),
            ResponseKind::I32 => RpcValue::I32(reader.read_i32_packed()?),
            ResponseKind::I64 => RpcValue::I64(reader.read_i64_packed()?),
            ResponseKind::F32 => RpcValue::F32(reader.read_f32()?),
            ResponseKind::Bytes => RpcValue::Bytes(reader.read_bytes()?.to_vec()),
            ResponseKind::Text => RpcValue::Text(reader.read_str()?.to_string()),
        };
        reader.finish()?;
        Ok(value)
    }
}

pub type RpcOutcome = Result<RpcValue, RpcFailure>;

/// Result of feeding a response into the table
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveOutcome {
    Resolved,
    /// Not pending (never registered, or already retired)
    UnknownId,
    /// Sent by a peer other than the one the request went to; still pending
    OriginMismatch { expected: PeerId },
    /// Retired with [`RpcFailure::DecodeFailed`]
    DecodeFailed,
    /// The responder reported a failure instead of a value
    Failed,
}

struct PendingResponse {
    expected: ResponseKind,
    origin: PeerId,
    completion: oneshot::Sender<RpcOutcome>,
}

impl PendingResponse {
    fn complete(self, outcome: RpcOutcome) {
        // the caller may have dropped its handle
        let _ = self.completion.send(outcome);
    }
}

/// Caller's side of a pending request
#[derive(Debug)]
pub struct ResponseHandle {
    id: ResponseId,
    rx: oneshot::Receiver<RpcOutcome>,
    outcome: Option<RpcOutcome>,
}

impl ResponseHandle {
    pub fn id(&self) -> ResponseId {
        self.id
    }

    /// Non-blocking check; `None` while the request is still pending
    pub fn try_outcome(&mut self) -> Option<RpcOutcome> {
        if self.outcome.is_none() {
            self.outcome = match self.rx.try_recv() {
                Ok(outcome) => Some(outcome),
                Err(oneshot::error::TryRecvError::Empty) => None,
                Err(oneshot::error::TryRecvError::Closed) => Some(Err(RpcFailure::Abandoned)),
            };
        }
        self.outcome.clone()
    }

    pub async fn wait(self) -> RpcOutcome {
        match self.outcome {
            Some(outcome) => outcome,
            None => self.rx.await.unwrap_or(Err(RpcFailure::Abandoned)),
        }
    }
}

/// Table of requests waiting for a response
#[derive(Default)]
pub struct CorrelationTable {
    next_id: u64,
    /// One past the highest id ever registered
    registered_below: u64,
    pending: HashMap<ResponseId, PendingResponse>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id that is neither pending nor retired
    pub fn allocate_id(&mut self) -> ResponseId {
        let id = ResponseId(self.next_id.max(self.registered_below));
        self.next_id = id.0.saturating_add(1);
        id
    }

    fn is_retired(&self, id: ResponseId) -> bool {
        id.0 < self.registered_below && !self.pending.contains_key(&id)
    }

    pub fn register(
        &mut self,
        id: ResponseId,
        expected: ResponseKind,
        origin: PeerId,
    ) -> Result<ResponseHandle, CorrelationError> {
        if self.pending.contains_key(&id) {
            return Err(CorrelationError::DuplicateResponseId(id));
        }
        if self.is_retired(id) {
            return Err(CorrelationError::ReusedResponseId(id));
        }
        self.registered_below = self.registered_below.max(id.0.saturating_add(1));
        let (completion, rx) = oneshot::channel();
        self.pending.insert(
            id,
            PendingResponse {
                expected,
                origin,
                completion,
            },
        );
        Ok(ResponseHandle {
            id,
            rx,
            outcome: None,
        })
    }

    /// Remove the entry if `origin` is the peer it waits on
    fn take(&mut self, id: ResponseId, origin: PeerId) -> Result<PendingResponse, ResolveOutcome> {
        let Some(entry) = self.pending.get(&id) else {
            debug!("response for unknown id {:?} from {}", id, origin);
            return Err(ResolveOutcome::UnknownId);
        };
        if entry.origin != origin {
            warn!(
                "response {:?} from {} but the request went to {}",
                id, origin, entry.origin
            );
            return Err(ResolveOutcome::OriginMismatch {
                expected: entry.origin,
            });
        }
        self.pending.remove(&id).ok_or(ResolveOutcome::UnknownId)
    }

    pub fn resolve(&mut self, id: ResponseId, origin: PeerId, bytes: &[u8]) -> ResolveOutcome {
        let entry = match self.take(id, origin) {
            Ok(entry) => entry,
            Err(outcome) => return outcome,
        };
        match RpcValue::decode(entry.expected, bytes) {
            Ok(value) => {
                entry.complete(Ok(value));
                ResolveOutcome::Resolved
            }
            Err(e) => {
                warn!("response {:?} failed to decode: {}", id, e);
                entry.complete(Err(RpcFailure::DecodeFailed(e)));
                ResolveOutcome::DecodeFailed
            }
        }
    }

    /// Retire a request the responder could not answer
    pub fn fail(&mut self, id: ResponseId, origin: PeerId, failure: RpcFailure) -> ResolveOutcome {
        match self.take(id, origin) {
            Ok(entry) => {
                entry.complete(Err(failure));
                ResolveOutcome::Failed
            }
            Err(outcome) => outcome,
        }
    }

    /// Give up on a request; returns whether it was pending
    pub fn abandon(&mut self, id: ResponseId) -> bool {
        match self.pending.remove(&id) {
            Some(entry) => {
                entry.complete(Err(RpcFailure::Abandoned));
                true
            }
            None => false,
        }
    }

    /// Fail every request waiting on `peer`; returns how many
    pub fn abandon_peer(&mut self, peer: PeerId) -> usize {
        let ids: Vec<ResponseId> = self
            .pending
            .iter()
            .filter(|(_, entry)| entry.origin == peer)
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            if let Some(entry) = self.pending.remove(id) {
                entry.complete(Err(RpcFailure::Disconnected));
            }
        }
        ids.len()
    }

    pub fn is_pending(&self, id: ResponseId) -> bool {
        self.pending.contains_key(&id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
