//! Wire messages
//!
//! Each message knows how to write itself with the packed codec. Some
//! layouts depend on the shared configuration (prefab sync drops the
//! soft-sync lists, signing adds certificate material to the hail), so both
//! directions take a [`WireContext`].

use crate::certificate::Certificate;
use crate::framing::{Frame, MessageType};
use netsync_core::{
    Error, NetworkConfig, NetworkId, ObjectSpawn, PackedReader, PackedWriter, PeerId,
    ResponseId, Result, SceneIndex, SwitchId,
};

/// Configuration bits that change message layouts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WireContext {
    pub use_prefab_sync: bool,
    pub sign_key_exchange: bool,
}

impl From<&NetworkConfig> for WireContext {
    fn from(config: &NetworkConfig) -> Self {
        Self {
            use_prefab_sync: config.use_prefab_sync,
            sign_key_exchange: config.sign_key_exchange,
        }
    }
}

/// A message with a packed encoding
pub trait WireMessage: Sized {
    fn encode(&self, writer: &mut PackedWriter, ctx: &WireContext) -> Result<()>;
    fn decode(reader: &mut PackedReader<'_>, ctx: &WireContext) -> Result<Self>;

    /// Encode into a frame carrying `message_type`
    fn to_frame(&self, message_type: MessageType, ctx: &WireContext) -> Result<Frame> {
        let mut writer = PackedWriter::new();
        self.encode(&mut writer, ctx)?;
        Ok(Frame::new(message_type, writer.into_vec()))
    }

    /// Decode a complete payload; trailing bytes are an error
    fn from_payload(payload: &[u8], ctx: &WireContext) -> Result<Self> {
        let mut reader = PackedReader::new(payload);
        let message = Self::decode(&mut reader, ctx)?;
        reader.finish()?;
        Ok(message)
    }
}

fn read_key(reader: &mut PackedReader<'_>) -> Result<[u8; 32]> {
    let mut key = [0u8; 32];
    key.copy_from_slice(reader.read_raw(32)?);
    Ok(key)
}

fn read_rest(reader: &mut PackedReader<'_>) -> Result<Vec<u8>> {
    Ok(reader.read_raw(reader.remaining())?.to_vec())
}

fn encode_spawns(
    writer: &mut PackedWriter,
    objects: &[ObjectSpawn],
    use_prefab_sync: bool,
) -> Result<()> {
    for object in objects {
        object.encode(writer, use_prefab_sync)?;
    }
    Ok(())
}

fn decode_spawns(
    reader: &mut PackedReader<'_>,
    count: usize,
    use_prefab_sync: bool,
) -> Result<Vec<ObjectSpawn>> {
    // a hostile count must not drive the allocation
    let mut objects = Vec::with_capacity(count.min(reader.remaining()));
    for _ in 0..count {
        objects.push(ObjectSpawn::decode(reader, use_prefab_sync)?);
    }
    Ok(objects)
}

// =============================================================================
// HANDSHAKE
// =============================================================================

/// Server → client: ephemeral public key, plus certificate and signature
/// when the exchange is signed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateHail {
    pub certificate: Option<Certificate>,
    pub server_public: [u8; 32],
    /// Signature over SHA-256(server_public) by the certificate subject key
    pub signature: Option<Vec<u8>>,
}

impl WireMessage for CertificateHail {
    fn encode(&self, writer: &mut PackedWriter, ctx: &WireContext) -> Result<()> {
        if ctx.sign_key_exchange {
            let certificate = self.certificate.as_ref().ok_or(Error::MissingField("certificate"))?;
            let signature = self.signature.as_ref().ok_or(Error::MissingField("signature"))?;
            writer.write_bytes(&postcard::to_allocvec(certificate)?);
            writer.write_raw(&self.server_public);
            writer.write_bytes(signature);
        } else {
            writer.write_raw(&self.server_public);
        }
        Ok(())
    }

    fn decode(reader: &mut PackedReader<'_>, ctx: &WireContext) -> Result<Self> {
        if ctx.sign_key_exchange {
            let certificate = postcard::from_bytes(reader.read_bytes()?)?;
            let server_public = read_key(reader)?;
            let signature = reader.read_bytes()?.to_vec();
            Ok(Self {
                certificate: Some(certificate),
                server_public,
                signature: Some(signature),
            })
        } else {
            Ok(Self {
                certificate: None,
                server_public: read_key(reader)?,
                signature: None,
            })
        }
    }
}

/// Client → server: ephemeral public key, plus the ownership proof when signed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HailResponse {
    pub client_public: [u8; 32],
    pub proof: Option<[u8; 32]>,
}

impl WireMessage for HailResponse {
    fn encode(&self, writer: &mut PackedWriter, ctx: &WireContext) -> Result<()> {
        writer.write_raw(&self.client_public);
        if ctx.sign_key_exchange {
            let proof = self.proof.as_ref().ok_or(Error::MissingField("proof"))?;
            writer.write_raw(proof);
        }
        Ok(())
    }

    fn decode(reader: &mut PackedReader<'_>, ctx: &WireContext) -> Result<Self> {
        let client_public = read_key(reader)?;
        let proof = if ctx.sign_key_exchange {
            Some(read_key(reader)?)
        } else {
            None
        };
        Ok(Self {
            client_public,
            proof,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Greetings {
    /// Server wall clock, milliseconds since the epoch
    pub timestamp: i64,
}

impl WireMessage for Greetings {
    fn encode(&self, writer: &mut PackedWriter, _ctx: &WireContext) -> Result<()> {
        writer.write_i64_packed(self.timestamp);
        Ok(())
    }

    fn decode(reader: &mut PackedReader<'_>, _ctx: &WireContext) -> Result<Self> {
        Ok(Self {
            timestamp: reader.read_i64_packed()?,
        })
    }
}

// =============================================================================
// CONNECTION
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionRequest {
    pub config_hash: u64,
    /// Opaque payload handed to the approval hook
    pub connection_data: Vec<u8>,
}

impl WireMessage for ConnectionRequest {
    fn encode(&self, writer: &mut PackedWriter, _ctx: &WireContext) -> Result<()> {
        writer.write_u64_packed(self.config_hash);
        writer.write_bytes(&self.connection_data);
        Ok(())
    }

    fn decode(reader: &mut PackedReader<'_>, _ctx: &WireContext) -> Result<Self> {
        Ok(Self {
            config_hash: reader.read_u64_packed()?,
            connection_data: reader.read_bytes()?.to_vec(),
        })
    }
}

/// Approval plus the full object snapshot
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionApproved {
    pub assigned_id: PeerId,
    pub scene: SceneIndex,
    pub switch_id: SwitchId,
    pub network_time: f32,
    pub objects: Vec<ObjectSpawn>,
}

impl WireMessage for ConnectionApproved {
    fn encode(&self, writer: &mut PackedWriter, ctx: &WireContext) -> Result<()> {
        writer.write_u32_packed(self.assigned_id.0);
        writer.write_u32_packed(self.scene.0);
        writer.write_id128(&self.switch_id.0);
        writer.write_f32(self.network_time);
        writer.write_u32_packed(self.objects.len() as u32);
        encode_spawns(writer, &self.objects, ctx.use_prefab_sync)
    }

    fn decode(reader: &mut PackedReader<'_>, ctx: &WireContext) -> Result<Self> {
        let assigned_id = PeerId(reader.read_u32_packed()?);
        let scene = SceneIndex(reader.read_u32_packed()?);
        let switch_id = SwitchId(reader.read_id128()?);
        let network_time = reader.read_f32()?;
        let count = reader.read_u32_packed()? as usize;
        let objects = decode_spawns(reader, count, ctx.use_prefab_sync)?;
        Ok(Self {
            assigned_id,
            scene,
            switch_id,
            network_time,
            objects,
        })
    }
}

// =============================================================================
// OBJECTS
// =============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct AddObject {
    pub spawn: ObjectSpawn,
    /// Optional application payload delivered with the spawn
    pub payload: Option<Vec<u8>>,
}

impl WireMessage for AddObject {
    fn encode(&self, writer: &mut PackedWriter, ctx: &WireContext) -> Result<()> {
        self.spawn.encode(writer, ctx.use_prefab_sync)?;
        match &self.payload {
            Some(payload) => {
                writer.write_bool(true);
                writer.write_bytes(payload);
            }
            None => writer.write_bool(false),
        }
        Ok(())
    }

    fn decode(reader: &mut PackedReader<'_>, ctx: &WireContext) -> Result<Self> {
        let spawn = ObjectSpawn::decode(reader, ctx.use_prefab_sync)?;
        let payload = if reader.read_bool()? {
            Some(reader.read_bytes()?.to_vec())
        } else {
            None
        };
        Ok(Self { spawn, payload })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AddObjects {
    pub objects: Vec<ObjectSpawn>,
}

impl WireMessage for AddObjects {
    fn encode(&self, writer: &mut PackedWriter, ctx: &WireContext) -> Result<()> {
        let count = u16::try_from(self.objects.len())
            .map_err(|_| Error::InvalidConfig("batch exceeds u16 objects".into()))?;
        writer.write_u16_packed(count);
        encode_spawns(writer, &self.objects, ctx.use_prefab_sync)
    }

    fn decode(reader: &mut PackedReader<'_>, ctx: &WireContext) -> Result<Self> {
        let count = reader.read_u16_packed()? as usize;
        Ok(Self {
            objects: decode_spawns(reader, count, ctx.use_prefab_sync)?,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DestroyObject {
    pub network_id: NetworkId,
}

impl WireMessage for DestroyObject {
    fn encode(&self, writer: &mut PackedWriter, _ctx: &WireContext) -> Result<()> {
        writer.write_u64_packed(self.network_id.0);
        Ok(())
    }

    fn decode(reader: &mut PackedReader<'_>, _ctx: &WireContext) -> Result<Self> {
        Ok(Self {
            network_id: NetworkId(reader.read_u64_packed()?),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChangeOwner {
    pub network_id: NetworkId,
    pub owner: PeerId,
}

impl WireMessage for ChangeOwner {
    fn encode(&self, writer: &mut PackedWriter, _ctx: &WireContext) -> Result<()> {
        writer.write_u64_packed(self.network_id.0);
        writer.write_u32_packed(self.owner.0);
        Ok(())
    }

    fn decode(reader: &mut PackedReader<'_>, _ctx: &WireContext) -> Result<Self> {
        Ok(Self {
            network_id: NetworkId(reader.read_u64_packed()?),
            owner: PeerId(reader.read_u32_packed()?),
        })
    }
}

/// Variable delta or full update for one behaviour of an object
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkedVar {
    pub network_id: NetworkId,
    pub behaviour: u16,
    pub data: Vec<u8>,
}

impl WireMessage for NetworkedVar {
    fn encode(&self, writer: &mut PackedWriter, _ctx: &WireContext) -> Result<()> {
        writer.write_u64_packed(self.network_id.0);
        writer.write_u16_packed(self.behaviour);
        writer.write_bytes(&self.data);
        Ok(())
    }

    fn decode(reader: &mut PackedReader<'_>, _ctx: &WireContext) -> Result<Self> {
        Ok(Self {
            network_id: NetworkId(reader.read_u64_packed()?),
            behaviour: reader.read_u16_packed()?,
            data: reader.read_bytes()?.to_vec(),
        })
    }
}

// =============================================================================
// SCENES
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwitchScene {
    pub scene: SceneIndex,
    pub switch_id: SwitchId,
    /// Scene instance id → network id; not sent in prefab-sync mode
    pub soft_sync_objects: Vec<(u64, NetworkId)>,
}

impl WireMessage for SwitchScene {
    fn encode(&self, writer: &mut PackedWriter, ctx: &WireContext) -> Result<()> {
        writer.write_u32_packed(self.scene.0);
        writer.write_id128(&self.switch_id.0);
        if !ctx.use_prefab_sync {
            writer.write_u32_packed(self.soft_sync_objects.len() as u32);
            for (instance_id, network_id) in &self.soft_sync_objects {
                writer.write_u64_packed(*instance_id);
                writer.write_u64_packed(network_id.0);
            }
        }
        Ok(())
    }

    fn decode(reader: &mut PackedReader<'_>, ctx: &WireContext) -> Result<Self> {
        let scene = SceneIndex(reader.read_u32_packed()?);
        let switch_id = SwitchId(reader.read_id128()?);
        let mut soft_sync_objects = Vec::new();
        if !ctx.use_prefab_sync {
            let count = reader.read_u32_packed()? as usize;
            soft_sync_objects.reserve(count.min(reader.remaining()));
            for _ in 0..count {
                let instance_id = reader.read_u64_packed()?;
                let network_id = NetworkId(reader.read_u64_packed()?);
                soft_sync_objects.push((instance_id, network_id));
            }
        }
        Ok(Self {
            scene,
            switch_id,
            soft_sync_objects,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwitchSceneCompleted {
    pub switch_id: SwitchId,
}

impl WireMessage for SwitchSceneCompleted {
    fn encode(&self, writer: &mut PackedWriter, _ctx: &WireContext) -> Result<()> {
        writer.write_id128(&self.switch_id.0);
        Ok(())
    }

    fn decode(reader: &mut PackedReader<'_>, _ctx: &WireContext) -> Result<Self> {
        Ok(Self {
            switch_id: SwitchId(reader.read_id128()?),
        })
    }
}

// =============================================================================
// RPC
// =============================================================================

/// Fire-and-forget RPC; arguments run to the end of the payload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcCall {
    pub network_id: NetworkId,
    pub behaviour: u16,
    pub method_hash: u64,
    pub args: Vec<u8>,
}

impl RpcCall {
    fn encode_target(&self, writer: &mut PackedWriter) {
        writer.write_u64_packed(self.network_id.0);
        writer.write_u16_packed(self.behaviour);
        writer.write_u64_packed(self.method_hash);
    }

    fn decode_target(reader: &mut PackedReader<'_>) -> Result<(NetworkId, u16, u64)> {
        Ok((
            NetworkId(reader.read_u64_packed()?),
            reader.read_u16_packed()?,
            reader.read_u64_packed()?,
        ))
    }
}

impl WireMessage for RpcCall {
    fn encode(&self, writer: &mut PackedWriter, _ctx: &WireContext) -> Result<()> {
        self.encode_target(writer);
        writer.write_raw(&self.args);
        Ok(())
    }

    fn decode(reader: &mut PackedReader<'_>, _ctx: &WireContext) -> Result<Self> {
        let (network_id, behaviour, method_hash) = Self::decode_target(reader)?;
        Ok(Self {
            network_id,
            behaviour,
            method_hash,
            args: read_rest(reader)?,
        })
    }
}

/// RPC expecting a response; the response id precedes the arguments
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcRequest {
    pub call: RpcCall,
    pub response_id: ResponseId,
}

impl WireMessage for RpcRequest {
    fn encode(&self, writer: &mut PackedWriter, _ctx: &WireContext) -> Result<()> {
        self.call.encode_target(writer);
        writer.write_u64_packed(self.response_id.0);
        writer.write_raw(&self.call.args);
        Ok(())
    }

    fn decode(reader: &mut PackedReader<'_>, _ctx: &WireContext) -> Result<Self> {
        let (network_id, behaviour, method_hash) = RpcCall::decode_target(reader)?;
        let response_id = ResponseId(reader.read_u64_packed()?);
        Ok(Self {
            call: RpcCall {
                network_id,
                behaviour,
                method_hash,
                args: read_rest(reader)?,
            },
            response_id,
        })
    }
}

/// How the responder handled a request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RpcStatus {
    Ok = 0,
    /// The object or behaviour does not exist on the responder
    MissingTarget = 1,
    /// The handler ran and failed
    Failed = 2,
}

impl TryFrom<u8> for RpcStatus {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Ok),
            1 => Ok(Self::MissingTarget),
            2 => Ok(Self::Failed),
            other => Err(Error::UnknownRpcStatus(other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcResponse {
    pub response_id: ResponseId,
    pub status: RpcStatus,
    /// Encoded result value, decoded by the caller's expected kind; empty
    /// unless the status is `Ok`
    pub result: Vec<u8>,
}

impl RpcResponse {
    pub fn ok(response_id: ResponseId, result: Vec<u8>) -> Self {
        Self {
            response_id,
            status: RpcStatus::Ok,
            result,
        }
    }

    pub fn failed(response_id: ResponseId, status: RpcStatus) -> Self {
        Self {
            response_id,
            status,
            result: Vec::new(),
        }
    }
}

impl WireMessage for RpcResponse {
    fn encode(&self, writer: &mut PackedWriter, _ctx: &WireContext) -> Result<()> {
        writer.write_u64_packed(self.response_id.0);
        writer.write_u8(self.status as u8);
        writer.write_raw(&self.result);
        Ok(())
    }

    fn decode(reader: &mut PackedReader<'_>, _ctx: &WireContext) -> Result<Self> {
        Ok(Self {
            response_id: ResponseId(reader.read_u64_packed()?),
            status: RpcStatus::try_from(reader.read_u8()?)?,
            result: read_rest(reader)?,
        })
    }
}

// =============================================================================
// MISC
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeSync {
    /// Server network time in seconds
    pub network_time: f32,
}

impl WireMessage for TimeSync {
    fn encode(&self, writer: &mut PackedWriter, _ctx: &WireContext) -> Result<()> {
        writer.write_f32(self.network_time);
        Ok(())
    }

    fn decode(reader: &mut PackedReader<'_>, _ctx: &WireContext) -> Result<Self> {
        Ok(Self {
            network_time: reader.read_f32()?,
        })
    }
}

/// Application message passed through untouched
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CustomMessage {
    pub data: Vec<u8>,
}

impl WireMessage for CustomMessage {
    fn encode(&self, writer: &mut PackedWriter, _ctx: &WireContext) -> Result<()> {
        writer.write_raw(&self.data);
        Ok(())
    }

    fn decode(reader: &mut PackedReader<'_>, _ctx: &WireContext) -> Result<Self> {
        Ok(Self {
            data: read_rest(reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::ServerIdentity;
    use crate::crypto::KeyPair;
    use netsync_core::{CodecError, Pose, SpawnDescriptor, Vec3};

    const SOFT: WireContext = WireContext {
        use_prefab_sync: false,
        sign_key_exchange: false,
    };
    const PREFAB: WireContext = WireContext {
        use_prefab_sync: true,
        sign_key_exchange: false,
    };
    const SIGNED: WireContext = WireContext {
        use_prefab_sync: false,
        sign_key_exchange: true,
    };

    fn spawn(id: u64, descriptor: SpawnDescriptor) -> ObjectSpawn {
        ObjectSpawn {
            is_player_object: false,
            network_id: NetworkId(id),
            owner: PeerId::SERVER,
            is_scene_object: descriptor.is_soft_sync(),
            descriptor,
            pose: Pose::at(Vec3::new(1.0, 2.0, 3.0)),
        }
    }

    fn reencode<M: WireMessage>(message: &M, ctx: &WireContext) -> M {
        let frame = message.to_frame(MessageType::CustomMessage, ctx).unwrap();
        M::from_payload(&frame.payload, ctx).unwrap()
    }

    #[test]
    fn test_signed_hail_layout() {
        let authority = KeyPair::generate();
        let identity = ServerIdentity::issue(&authority, "host").unwrap();
        let hail = CertificateHail {
            certificate: Some(identity.certificate.clone()),
            server_public: [7; 32],
            signature: Some(vec![1; 64]),
        };
        assert_eq!(reencode(&hail, &SIGNED), hail);

        let unsigned = CertificateHail {
            certificate: None,
            server_public: [7; 32],
            signature: None,
        };
        let frame = unsigned.to_frame(MessageType::CertificateHail, &SOFT).unwrap();
        assert_eq!(frame.payload.len(), 32);
        assert!(matches!(
            unsigned.to_frame(MessageType::CertificateHail, &SIGNED),
            Err(Error::MissingField("certificate"))
        ));
    }

    #[test]
    fn test_hail_response_proof_follows_mode() {
        let response = HailResponse {
            client_public: [3; 32],
            proof: Some([9; 32]),
        };
        assert_eq!(reencode(&response, &SIGNED), response);
        let frame = response.to_frame(MessageType::HailResponse, &SOFT).unwrap();
        assert_eq!(frame.payload.len(), 32);
    }

    #[test]
    fn test_approved_snapshot() {
        let approved = ConnectionApproved {
            assigned_id: PeerId(3),
            scene: SceneIndex(1),
            switch_id: SwitchId::generate(),
            network_time: 12.5,
            objects: vec![
                spawn(1, SpawnDescriptor::SoftSync { instance_id: 44 }),
                spawn(2, SpawnDescriptor::Prefab { prefab_hash: 99 }),
            ],
        };
        assert_eq!(reencode(&approved, &SOFT), approved);
    }

    #[test]
    fn test_switch_scene_list_omitted_in_prefab_mode() {
        let switch = SwitchScene {
            scene: SceneIndex(2),
            switch_id: SwitchId::generate(),
            soft_sync_objects: vec![(10, NetworkId(1)), (11, NetworkId(2))],
        };
        assert_eq!(reencode(&switch, &SOFT), switch);

        let decoded = reencode(&switch, &PREFAB);
        assert!(decoded.soft_sync_objects.is_empty());
        assert_eq!(decoded.switch_id, switch.switch_id);
    }

    #[test]
    fn test_rpc_request_layout() {
        let request = RpcRequest {
            call: RpcCall {
                network_id: NetworkId(5),
                behaviour: 1,
                method_hash: 0xfeed,
                args: vec![1, 2, 3],
            },
            response_id: ResponseId(77),
        };
        assert_eq!(reencode(&request, &SOFT), request);

        // trailing bytes belong to the arguments
        let call = RpcCall::from_payload(&[5, 0, 1, 9, 9], &SOFT).unwrap();
        assert_eq!(call.args, vec![9, 9]);
    }

    #[test]
    fn test_rpc_response_status() {
        let ok = RpcResponse::ok(ResponseId(3), vec![0x2a]);
        let mut writer = PackedWriter::new();
        ok.encode(&mut writer, &SOFT).unwrap();
        assert_eq!(writer.into_vec(), vec![3, 0, 0x2a]);
        assert_eq!(reencode(&ok, &SOFT), ok);

        let missing = RpcResponse::failed(ResponseId(4), RpcStatus::MissingTarget);
        assert_eq!(reencode(&missing, &SOFT), missing);

        let err = RpcResponse::from_payload(&[3, 9], &SOFT).unwrap_err();
        assert!(matches!(err, Error::UnknownRpcStatus(9)));
    }

    #[test]
    fn test_truncated_and_trailing() {
        let err = DestroyObject::from_payload(&[], &SOFT).unwrap_err();
        assert!(matches!(err, Error::Codec(CodecError::UnexpectedEof { .. })));

        let err = DestroyObject::from_payload(&[1, 0], &SOFT).unwrap_err();
        assert!(matches!(err, Error::Codec(CodecError::TrailingBytes(1))));
    }

    #[test]
    fn test_hostile_batch_count() {
        let mut writer = PackedWriter::new();
        writer.write_u16_packed(u16::MAX);
        let payload = writer.into_vec();
        assert!(AddObjects::from_payload(&payload, &SOFT).is_err());
    }

    #[test]
    fn test_add_object_payload() {
        let add = AddObject {
            spawn: spawn(8, SpawnDescriptor::Prefab { prefab_hash: 1 }),
            payload: Some(b"hello".to_vec()),
        };
        assert_eq!(reencode(&add, &PREFAB), add);
    }
}
