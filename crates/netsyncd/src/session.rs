//! Network session
//!
//! A [`NetworkSession`] owns everything one peer needs: the peer table, the
//! object registry, the correlation table, the scene coordinator and the
//! dispatch table. Nothing is global, so several sessions (a server and its
//! clients, say) can live in one process.
//!
//! All processing happens inside [`NetworkSession::poll`], on the caller's
//! thread: transport events first, then scene loader completions.

use crate::correlation::{CorrelationError, CorrelationTable, ResponseHandle, ResponseKind, RpcFailure, RpcValue};
use crate::dispatcher::{client_dispatcher, server_dispatcher, Dispatcher, DispatchOutcome, Inbound, ProtocolHandlers};
use crate::registry::{NetworkObjectRecord, Registry, RegistryError};
use crate::scene::{SceneAction, SceneCoordinator, SceneError, SwitchHandle, SwitchOutcome};
use crate::world::{BehaviourEvent, ObjectWorld, RpcInvocation, SceneLoader, WorldError};
use netsync_core::{
    hashing, NetworkConfig, NetworkId, ObjectSpawn, PeerId, Pose, SceneIndex, SpawnDescriptor, SwitchId,
};
use netsync_net::messages::{
    AddObject, AddObjects, CertificateHail, ChangeOwner, ConnectionApproved, ConnectionRequest, CustomMessage,
    DestroyObject, Greetings, HailResponse, NetworkedVar, RpcCall, RpcRequest, RpcResponse, RpcStatus, SwitchScene,
    SwitchSceneCompleted, TimeSync,
};
use netsync_net::{
    ChannelId, ClientHandshake, ConnectionState, Frame, FrameError, HandshakeConfig, HandshakeError, MessageType,
    PeerConnection, ServerHandshake, ServerIdentity, SessionRole, Transport, TransportError, TransportEvent,
    TrustAnchor, WireContext, WireMessage,
};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Session errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("malformed message: {0}")]
    Malformed(#[from] netsync_core::Error),

    #[error("invalid configuration: {0}")]
    Config(netsync_core::Error),

    #[error("framing: {0}")]
    Frame(#[from] FrameError),

    #[error("handshake: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    #[error("configuration hash mismatch from {0}")]
    ConfigMismatch(PeerId),

    #[error("unknown message tag {0}")]
    UnknownTag(u8),

    #[error("unexpected {0:?} in this connection state")]
    Unexpected(MessageType),

    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    #[error("stale reference: {0}")]
    Stale(NetworkId),

    #[error("correlation: {0}")]
    Correlation(#[from] CorrelationError),

    #[error("registry: {0}")]
    Registry(#[from] RegistryError),

    #[error("scene: {0}")]
    Scene(#[from] SceneError),

    #[error("world: {0}")]
    World(#[from] WorldError),

    #[error("peer {0} is not connected")]
    NotConnected(PeerId),

    #[error("operation requires the {0} role")]
    WrongRole(&'static str),
}

/// What the session does with a failure
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Protocol violation: close the connection
    Terminate,
    /// Possible tampering: close the connection and warn
    TerminateSecurity,
    /// Benign race
    Ignore,
    /// Misuse by the local caller
    ReportToCaller,
}

impl SessionError {
    pub fn disposition(&self) -> Disposition {
        match self {
            SessionError::Frame(e) if e.is_security_failure() => Disposition::TerminateSecurity,
            SessionError::Handshake(e) if e.is_security_failure() => Disposition::TerminateSecurity,
            SessionError::Malformed(_)
            | SessionError::Frame(_)
            | SessionError::Handshake(_)
            | SessionError::ConfigMismatch(_)
            | SessionError::UnknownTag(_)
            | SessionError::Unexpected(_) => Disposition::Terminate,
            SessionError::Stale(_) | SessionError::Registry(_) | SessionError::World(_) => Disposition::Ignore,
            SessionError::Config(_)
            | SessionError::Transport(_)
            | SessionError::InvalidState(_)
            | SessionError::Correlation(_)
            | SessionError::Scene(_)
            | SessionError::NotConnected(_)
            | SessionError::WrongRole(_) => Disposition::ReportToCaller,
        }
    }
}

/// Events surfaced to the application
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// Server: a client finished joining
    ClientConnected(PeerId),
    /// Server: a joined client left
    ClientDisconnected(PeerId),
    /// Client: joined, with the id the server assigned
    Connected(PeerId),
    /// Client: the server went away
    Disconnected,
    CustomMessage {
        from: PeerId,
        channel: ChannelId,
        data: Vec<u8>,
    },
    /// Server: a switch progress record ended
    SwitchResolved {
        switch_id: SwitchId,
        outcome: SwitchOutcome,
    },
}

/// Session construction options
#[derive(Clone, Debug, Default)]
pub struct SessionOptions {
    /// Server: the local peer also plays (and acknowledges scene switches)
    pub host_is_client: bool,
    /// Server: certificate used to sign the key exchange
    pub identity: Option<ServerIdentity>,
    /// Client: what the server certificate must chain to
    pub trust_anchor: Option<TrustAnchor>,
    /// Client: opaque payload carried by the connection request
    pub connection_data: Vec<u8>,
    /// Server: prefab spawned as each approved client's player object
    pub player_prefab: Option<u64>,
}

/// Decision of the connection approval hook
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Approval {
    pub approved: bool,
    pub player_prefab: Option<u64>,
    pub pose: Pose,
}

impl Approval {
    pub fn accept() -> Self {
        Self {
            approved: true,
            player_prefab: None,
            pose: Pose::default(),
        }
    }

    pub fn reject() -> Self {
        Self {
            approved: false,
            ..Self::accept()
        }
    }

    pub fn with_player(mut self, prefab_hash: u64, pose: Pose) -> Self {
        self.player_prefab = Some(prefab_hash);
        self.pose = pose;
        self
    }
}

type ApprovalHook = Box<dyn FnMut(PeerId, &[u8]) -> Approval + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Role {
    Server,
    Client,
}

fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// One peer's view of the networked session
pub struct NetworkSession<T, W, S> {
    role: Role,
    config: NetworkConfig,
    wire: WireContext,
    handshake: HandshakeConfig,
    options: SessionOptions,
    transport: T,
    world: W,
    scenes: S,
    local_id: PeerId,
    peers: HashMap<PeerId, PeerConnection>,
    registry: Registry,
    correlation: CorrelationTable,
    coordinator: SceneCoordinator,
    dispatcher: Arc<Dispatcher<Self>>,
    approval: ApprovalHook,
    events: VecDeque<SessionEvent>,
    start: Instant,
    time_offset: f32,
}

impl<T, W, S> NetworkSession<T, W, S>
where
    T: Transport,
    W: ObjectWorld,
    S: SceneLoader,
{
    fn build(
        role: Role,
        config: NetworkConfig,
        transport: T,
        world: W,
        scenes: S,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        config.validate().map_err(SessionError::Config)?;
        let handshake = HandshakeConfig::from(&config);
        let initial = scenes.active_scene();
        let scene_count = config.registered_scenes.len() as u32;
        let (coordinator, dispatcher) = match role {
            Role::Server => {
                if handshake.sign_key_exchange && options.identity.is_none() {
                    return Err(HandshakeError::MissingIdentity.into());
                }
                (
                    SceneCoordinator::server(initial, scene_count, options.host_is_client, config.use_prefab_sync),
                    server_dispatcher::<Self>(),
                )
            }
            Role::Client => {
                if handshake.sign_key_exchange && options.trust_anchor.is_none() {
                    return Err(HandshakeError::MissingTrustAnchor.into());
                }
                (SceneCoordinator::client(initial, scene_count), client_dispatcher::<Self>())
            }
        };
        let player_prefab = options.player_prefab;
        Ok(Self {
            role,
            wire: WireContext::from(&config),
            config,
            handshake,
            options,
            local_id: transport.local_id(),
            transport,
            world,
            scenes,
            peers: HashMap::new(),
            registry: Registry::new(),
            correlation: CorrelationTable::new(),
            coordinator,
            dispatcher: Arc::new(dispatcher),
            approval: Box::new(move |_, _| Approval {
                player_prefab,
                ..Approval::accept()
            }),
            events: VecDeque::new(),
            start: Instant::now(),
            time_offset: 0.0,
        })
    }

    /// Authoritative session; the active scene's content is registered
    /// immediately
    pub fn server(
        config: NetworkConfig,
        transport: T,
        world: W,
        scenes: S,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        let mut session = Self::build(Role::Server, config, transport, world, scenes, options)?;
        let initial = session.scenes.active_scene();
        let registered = session.register_scene_content(initial)?;
        info!(
            "server {} up in {} with {} scene objects",
            session.local_id,
            initial,
            registered.len()
        );
        Ok(session)
    }

    pub fn client(
        config: NetworkConfig,
        transport: T,
        world: W,
        scenes: S,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        Self::build(Role::Client, config, transport, world, scenes, options)
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn is_server(&self) -> bool {
        self.role == Role::Server
    }

    pub fn local_id(&self) -> PeerId {
        self.local_id
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    pub fn scenes(&self) -> &S {
        &self.scenes
    }

    pub fn scenes_mut(&mut self) -> &mut S {
        &mut self.scenes
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn coordinator(&self) -> &SceneCoordinator {
        &self.coordinator
    }

    pub fn pending_requests(&self) -> usize {
        self.correlation.pending_count()
    }

    /// Server: joined clients. Client: the server, once joined
    pub fn connected_peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self
            .peers
            .values()
            .filter(|p| p.is_connected())
            .map(|p| p.id)
            .collect();
        peers.sort();
        peers
    }

    pub fn connection_state(&self, peer: PeerId) -> Option<ConnectionState> {
        self.peers.get(&peer).map(|p| p.state)
    }

    /// Client: joined the server
    pub fn is_connected(&self) -> bool {
        self.peers.get(&PeerId::SERVER).is_some_and(PeerConnection::is_connected)
    }

    /// Seconds on the server's clock
    pub fn network_time(&self) -> f32 {
        self.start.elapsed().as_secs_f32() + self.time_offset
    }

    /// Replace the connection approval hook (used when approval is enabled)
    pub fn set_approval_handler<F>(&mut self, handler: F)
    where
        F: FnMut(PeerId, &[u8]) -> Approval + Send + 'static,
    {
        self.approval = Box::new(handler);
    }

    /// Drain pending events
    pub fn events(&mut self) -> impl Iterator<Item = SessionEvent> + '_ {
        self.events.drain(..)
    }

    // =========================================================================
    // EVENT LOOP
    // =========================================================================

    /// Process everything queued; returns how many events were handled
    pub fn poll(&mut self) -> usize {
        let mut processed = 0;
        while let Some(event) = self.transport.poll_event() {
            processed += 1;
            match event {
                TransportEvent::Connected(peer) => self.on_transport_connected(peer),
                TransportEvent::Disconnected(peer) => self.drop_peer(peer),
                TransportEvent::Packet { from, channel, data } => self.handle_packet(from, channel, &data),
            }
        }
        while let Some(op) = self.scenes.poll_complete() {
            processed += 1;
            let actions = self.coordinator.on_operation_complete(op);
            if let Err(e) = self.run_scene_actions(actions) {
                warn!("scene step failed: {}", e);
            }
        }
        for (switch_id, outcome) in self.coordinator.take_resolved() {
            self.events.push_back(SessionEvent::SwitchResolved { switch_id, outcome });
        }
        processed
    }

    fn on_transport_connected(&mut self, peer: PeerId) {
        match self.role {
            Role::Server => {
                if let Err(e) = self.begin_server_handshake(peer) {
                    self.fail_connection(peer, e);
                }
            }
            Role::Client if peer.is_server() => {
                if let Err(e) = self.begin_client_handshake() {
                    error!("cannot start handshake: {}", e);
                    self.transport.disconnect(peer);
                }
            }
            Role::Client => debug!("ignoring link to non-server peer {}", peer),
        }
    }

    fn begin_server_handshake(&mut self, peer: PeerId) -> Result<(), SessionError> {
        match ServerHandshake::begin(self.handshake, self.options.identity.as_ref())? {
            Some((handshake, hail)) => {
                debug!("sending certificate hail to {}", peer);
                self.peers
                    .insert(peer, PeerConnection::with_server_handshake(peer, handshake));
                let frame = hail.to_frame(MessageType::CertificateHail, &self.wire)?;
                self.send_to(peer, ChannelId::INTERNAL, &frame)
            }
            None => {
                self.peers
                    .insert(peer, PeerConnection::new(peer, ConnectionState::PendingConnection));
                Ok(())
            }
        }
    }

    fn begin_client_handshake(&mut self) -> Result<(), SessionError> {
        let server = PeerId::SERVER;
        if self.handshake.enable_encryption {
            let handshake = ClientHandshake::new(self.handshake, self.options.trust_anchor.clone())?;
            self.peers
                .insert(server, PeerConnection::with_client_handshake(server, handshake));
            Ok(())
        } else {
            self.peers
                .insert(server, PeerConnection::new(server, ConnectionState::PendingConnection));
            self.send_connection_request()
        }
    }

    fn send_connection_request(&mut self) -> Result<(), SessionError> {
        let request = ConnectionRequest {
            config_hash: self.config.config_hash()?,
            connection_data: self.options.connection_data.clone(),
        };
        let frame = request.to_frame(MessageType::ConnectionRequest, &self.wire)?;
        self.send_to(PeerId::SERVER, ChannelId::INTERNAL, &frame)
    }

    fn handle_packet(&mut self, from: PeerId, channel: ChannelId, data: &[u8]) {
        let opened = match self.peers.get_mut(&from) {
            Some(conn) => {
                conn.touch();
                conn.open(data).map(|frame| (frame, conn.state))
            }
            None => {
                debug!("packet from unknown peer {}", from);
                return;
            }
        };
        let (frame, state) = match opened {
            Ok(opened) => opened,
            Err(e) if e.is_replay() => {
                debug!(peer = %from, "dropping replayed packet: {}", e);
                return;
            }
            Err(e) => {
                self.fail_connection(from, e.into());
                return;
            }
        };

        if let Ok(message_type) = frame.message_type() {
            let pre_join = message_type.is_handshake()
                || matches!(
                    message_type,
                    MessageType::ConnectionRequest | MessageType::ConnectionApproved
                );
            if state != ConnectionState::Connected && !pre_join {
                self.fail_connection(from, SessionError::Unexpected(message_type));
                return;
            }
        }

        let dispatcher = Arc::clone(&self.dispatcher);
        match dispatcher.dispatch(self, from, channel, &frame) {
            DispatchOutcome::Handled => {}
            DispatchOutcome::UnknownTag(tag) => self.fail_connection(from, SessionError::UnknownTag(tag)),
            DispatchOutcome::Unhandled(message_type) => {
                self.fail_connection(from, SessionError::Unexpected(message_type))
            }
            DispatchOutcome::Failed(e) => match e.disposition() {
                Disposition::Terminate | Disposition::TerminateSecurity => self.fail_connection(from, e),
                Disposition::Ignore => debug!("ignoring message from {}: {}", from, e),
                Disposition::ReportToCaller => warn!("message from {} not applied: {}", from, e),
            },
        }
    }

    fn fail_connection(&mut self, peer: PeerId, reason: SessionError) {
        if reason.disposition() == Disposition::TerminateSecurity {
            warn!(peer = %peer, "potential active attack, closing connection: {}", reason);
        } else {
            warn!(peer = %peer, "closing connection: {}", reason);
        }
        self.transport.disconnect(peer);
        self.drop_peer(peer);
    }

    /// Forget a peer; safe to call more than once
    fn drop_peer(&mut self, peer: PeerId) {
        let Some(conn) = self.peers.remove(&peer) else {
            return;
        };
        let failed = self.correlation.abandon_peer(peer);
        if failed > 0 {
            debug!("{} requests to {} failed", failed, peer);
        }
        match self.role {
            Role::Server => {
                if !conn.is_connected() {
                    debug!("peer {} left before joining", peer);
                    return;
                }
                info!("client {} disconnected", peer);
                for id in self.registry.owned_by(peer) {
                    self.destroy_and_broadcast(id);
                }
                self.coordinator.on_peer_disconnected(peer);
                self.events.push_back(SessionEvent::ClientDisconnected(peer));
            }
            Role::Client => {
                info!("disconnected from server");
                let ids: Vec<NetworkId> = self.registry.iter().map(|r| r.network_id).collect();
                for id in ids {
                    self.world.destroy(id);
                }
                self.registry.clear();
                self.events.push_back(SessionEvent::Disconnected);
            }
        }
    }

    fn send_to(&mut self, peer: PeerId, channel: ChannelId, frame: &Frame) -> Result<(), SessionError> {
        let conn = self.peers.get_mut(&peer).ok_or(SessionError::NotConnected(peer))?;
        let packet = conn.seal(frame)?;
        self.transport.send(peer, channel, packet)?;
        Ok(())
    }

    /// Send to every joined peer except `except`
    fn broadcast(&mut self, channel: ChannelId, frame: &Frame, except: Option<PeerId>) {
        for peer in self.connected_peers() {
            if Some(peer) == except {
                continue;
            }
            if let Err(e) = self.send_to(peer, channel, frame) {
                error!("send to {} failed: {}", peer, e);
            }
        }
    }

    fn require_role(&self, role: Role) -> Result<(), SessionError> {
        if self.role == role {
            return Ok(());
        }
        Err(SessionError::WrongRole(match role {
            Role::Server => "server",
            Role::Client => "client",
        }))
    }

    fn require_state(&self, peer: PeerId, state: ConnectionState, message: MessageType) -> Result<(), SessionError> {
        match self.peers.get(&peer) {
            Some(conn) if conn.state == state => Ok(()),
            _ => Err(SessionError::Unexpected(message)),
        }
    }

    fn set_state(&mut self, peer: PeerId, state: ConnectionState) {
        if let Some(conn) = self.peers.get_mut(&peer) {
            conn.state = state;
        }
    }

    // =========================================================================
    // OBJECTS
    // =========================================================================

    /// Instantiate and register an object announced by the server
    fn materialize(&mut self, spawn: &ObjectSpawn, payload: Option<&[u8]>) -> Result<(), SessionError> {
        if self.registry.contains(spawn.network_id) {
            debug!("object {} already present", spawn.network_id);
            return Ok(());
        }
        let behaviours = self.world.instantiate(spawn, payload)?;
        self.registry.insert(NetworkObjectRecord::from_spawn(spawn, behaviours))?;
        Ok(())
    }

    fn destroy_local(&mut self, id: NetworkId) -> bool {
        if self.registry.remove(id).is_none() {
            return false;
        }
        self.world.destroy(id);
        true
    }

    fn destroy_and_broadcast(&mut self, id: NetworkId) {
        if !self.destroy_local(id) {
            return;
        }
        match (DestroyObject { network_id: id }).to_frame(MessageType::DestroyObject, &self.wire) {
            Ok(frame) => self.broadcast(ChannelId::INTERNAL, &frame, None),
            Err(e) => error!("cannot encode destroy of {}: {}", id, e),
        }
    }

    /// Give a network identity to every untracked object in `scene`
    fn register_scene_content(&mut self, scene: SceneIndex) -> Result<Vec<ObjectSpawn>, SessionError> {
        let mut spawns = Vec::new();
        for object in self.world.untracked_scene_objects(scene) {
            let network_id = self.registry.allocate_network_id();
            self.world.bind_scene_object(object.instance_id, network_id)?;
            let descriptor = if self.config.use_prefab_sync {
                SpawnDescriptor::Prefab {
                    prefab_hash: object.prefab_hash,
                }
            } else {
                SpawnDescriptor::SoftSync {
                    instance_id: object.instance_id,
                }
            };
            let record = NetworkObjectRecord {
                network_id,
                owner: PeerId::SERVER,
                descriptor,
                is_scene_object: true,
                is_player_object: false,
                pose: object.pose,
                behaviour_count: object.behaviour_count,
            };
            spawns.push(record.to_spawn());
            self.registry.insert(record)?;
        }
        Ok(spawns)
    }

    fn new_spawn(&mut self, prefab_hash: u64, owner: PeerId, pose: Pose, is_player_object: bool) -> Result<ObjectSpawn, SessionError> {
        if !owner.is_server() && !self.peers.get(&owner).is_some_and(PeerConnection::is_connected) {
            return Err(SessionError::NotConnected(owner));
        }
        self.prefab_spawn(prefab_hash, owner, pose, is_player_object)
    }

    /// Spawn record for a registered prefab; the owner is not checked
    fn prefab_spawn(&mut self, prefab_hash: u64, owner: PeerId, pose: Pose, is_player_object: bool) -> Result<ObjectSpawn, SessionError> {
        if !self.config.is_registered_prefab(prefab_hash) {
            return Err(WorldError::UnknownPrefab(prefab_hash).into());
        }
        Ok(ObjectSpawn {
            is_player_object,
            network_id: self.registry.allocate_network_id(),
            owner,
            is_scene_object: false,
            descriptor: SpawnDescriptor::Prefab { prefab_hash },
            pose,
        })
    }

    fn spawn_local(&mut self, spawn: &ObjectSpawn, payload: Option<&[u8]>) -> Result<(), SessionError> {
        let behaviours = self.world.instantiate(spawn, payload)?;
        self.registry.insert(NetworkObjectRecord::from_spawn(spawn, behaviours))?;
        Ok(())
    }

    /// Server: create an object from a registered prefab and replicate it
    pub fn spawn_object(
        &mut self,
        prefab_hash: u64,
        owner: PeerId,
        pose: Pose,
        payload: Option<Vec<u8>>,
    ) -> Result<NetworkId, SessionError> {
        self.require_role(Role::Server)?;
        let spawn = self.new_spawn(prefab_hash, owner, pose, false)?;
        self.spawn_local(&spawn, payload.as_deref())?;
        let frame = AddObject { spawn, payload }.to_frame(MessageType::AddObject, &self.wire)?;
        self.broadcast(ChannelId::INTERNAL, &frame, None);
        debug!("spawned {} for {}", spawn.network_id, owner);
        Ok(spawn.network_id)
    }

    /// Server: create several objects; replicated in batches of at most
    /// `max_batch_objects`
    pub fn spawn_objects(
        &mut self,
        objects: &[(u64, PeerId, Pose)],
    ) -> Result<Vec<NetworkId>, SessionError> {
        self.require_role(Role::Server)?;
        let mut spawns = Vec::with_capacity(objects.len());
        for &(prefab_hash, owner, pose) in objects {
            let spawn = self.new_spawn(prefab_hash, owner, pose, false)?;
            self.spawn_local(&spawn, None)?;
            spawns.push(spawn);
        }
        self.broadcast_spawns(&spawns)?;
        Ok(spawns.iter().map(|s| s.network_id).collect())
    }

    fn broadcast_spawns(&mut self, spawns: &[ObjectSpawn]) -> Result<(), SessionError> {
        let chunk = usize::from(self.config.max_batch_objects.max(1));
        for batch in spawns.chunks(chunk) {
            let frame = AddObjects {
                objects: batch.to_vec(),
            }
            .to_frame(MessageType::AddObjects, &self.wire)?;
            self.broadcast(ChannelId::INTERNAL, &frame, None);
        }
        Ok(())
    }

    /// Server: destroy an object everywhere; returns whether it existed
    pub fn destroy_object(&mut self, id: NetworkId) -> Result<bool, SessionError> {
        self.require_role(Role::Server)?;
        let existed = self.registry.contains(id);
        self.destroy_and_broadcast(id);
        Ok(existed)
    }

    /// Server: hand an object to another peer (a joined client or the server)
    pub fn change_ownership(&mut self, id: NetworkId, owner: PeerId) -> Result<(), SessionError> {
        self.require_role(Role::Server)?;
        if !self.registry.contains(id) {
            return Err(RegistryError::UnknownObject(id).into());
        }
        if !owner.is_server() && !self.peers.get(&owner).is_some_and(PeerConnection::is_connected) {
            return Err(SessionError::NotConnected(owner));
        }
        self.apply_owner_change(id, owner);
        let frame = ChangeOwner { network_id: id, owner }.to_frame(MessageType::ChangeOwner, &self.wire)?;
        self.broadcast(ChannelId::INTERNAL, &frame, None);
        Ok(())
    }

    /// Loss notification, commit, then gain notification
    fn apply_owner_change(&mut self, id: NetworkId, owner: PeerId) {
        let Some(previous) = self.registry.get(id).map(|r| r.owner) else {
            debug!("ownership change for unknown object {}", id);
            return;
        };
        if previous == self.local_id && owner != self.local_id {
            self.world.notify(id, BehaviourEvent::OwnershipLost { owner: previous });
        }
        self.registry.set_owner(id, owner);
        if owner == self.local_id && previous != self.local_id {
            self.world.notify(id, BehaviourEvent::OwnershipGained { owner });
        }
    }

    /// Write networked variables on an object this peer owns (the server
    /// may write any object)
    pub fn send_networked_var(
        &mut self,
        id: NetworkId,
        behaviour: u16,
        data: Vec<u8>,
        full: bool,
    ) -> Result<(), SessionError> {
        let record = self.registry.get(id).ok_or(RegistryError::UnknownObject(id))?;
        if !record.has_behaviour(behaviour) {
            return Err(WorldError::UnknownBehaviour(id, behaviour).into());
        }
        if self.role == Role::Client && record.owner != self.local_id {
            return Err(SessionError::InvalidState("networked variables are written by the owner"));
        }
        let message_type = if full {
            MessageType::NetworkedVarUpdate
        } else {
            MessageType::NetworkedVarDelta
        };
        let frame = NetworkedVar {
            network_id: id,
            behaviour,
            data,
        }
        .to_frame(message_type, &self.wire)?;
        match self.role {
            Role::Server => self.broadcast(ChannelId::INTERNAL, &frame, None),
            Role::Client => self.send_to(PeerId::SERVER, ChannelId::INTERNAL, &frame)?,
        }
        Ok(())
    }

    // =========================================================================
    // SCENES
    // =========================================================================

    /// Server: switch every peer to `scene`
    pub fn switch_scene(&mut self, scene: SceneIndex) -> Result<SwitchHandle, SessionError> {
        self.require_role(Role::Server)?;
        let connected = self.connected_peers();
        let (handle, actions) = self.coordinator.request_switch(scene, &connected)?;
        self.run_scene_actions(actions)?;
        Ok(handle)
    }

    pub fn switch_scene_by_name(&mut self, name: &str) -> Result<SwitchHandle, SessionError> {
        let scene = self
            .config
            .scene_index(name)
            .ok_or(SessionError::InvalidState("scene name is not registered"))?;
        self.switch_scene(scene)
    }

    fn run_scene_actions(&mut self, actions: Vec<SceneAction>) -> Result<(), SessionError> {
        for action in actions {
            match action {
                SceneAction::DestroySceneObjects => {
                    for id in self.registry.scene_object_ids() {
                        self.destroy_and_broadcast(id);
                    }
                }
                SceneAction::BroadcastSwitch { scene, switch_id } => {
                    let frame = SwitchScene {
                        scene,
                        switch_id,
                        soft_sync_objects: Vec::new(),
                    }
                    .to_frame(MessageType::SwitchScene, &self.wire)?;
                    self.broadcast(ChannelId::INTERNAL, &frame, None);
                }
                SceneAction::BeginLoad { op, scene } => {
                    if let Err(e) = self.scenes.begin_load(op, scene) {
                        self.coordinator.abort_switch();
                        return Err(e.into());
                    }
                }
                SceneAction::MovePersistentObjects { scene } => {
                    self.world.scene_loaded(scene);
                    for id in self.registry.persistent_object_ids() {
                        self.world.move_to_scene(id, scene);
                    }
                }
                SceneAction::BeginUnload { op, scene } => {
                    if let Err(e) = self.scenes.begin_unload(op, scene) {
                        self.coordinator.abort_switch();
                        return Err(e.into());
                    }
                }
                SceneAction::RegisterSceneObjects { scene, switch_id } => {
                    let spawns = self.register_scene_content(scene)?;
                    if self.config.use_prefab_sync {
                        self.broadcast_spawns(&spawns)?;
                    } else {
                        let soft_sync_objects = spawns
                            .iter()
                            .filter_map(|s| match s.descriptor {
                                SpawnDescriptor::SoftSync { instance_id } => Some((instance_id, s.network_id)),
                                SpawnDescriptor::Prefab { .. } => None,
                            })
                            .collect();
                        let frame = SwitchScene {
                            scene,
                            switch_id,
                            soft_sync_objects,
                        }
                        .to_frame(MessageType::SwitchScene, &self.wire)?;
                        self.broadcast(ChannelId::INTERNAL, &frame, None);
                    }
                }
                SceneAction::ApplySoftSync { scene, lookup } => self.apply_soft_sync(scene, lookup),
                SceneAction::SendCompleted { switch_id } => {
                    let frame = SwitchSceneCompleted { switch_id }
                        .to_frame(MessageType::ClientSwitchSceneCompleted, &self.wire)?;
                    self.send_to(PeerId::SERVER, ChannelId::INTERNAL, &frame)?;
                }
            }
        }
        Ok(())
    }

    /// Client: bind scene content the server announced
    fn apply_soft_sync(&mut self, scene: SceneIndex, mut lookup: HashMap<u64, NetworkId>) {
        if self.config.use_prefab_sync {
            self.world.destroy_scene_baseline(scene);
            return;
        }
        lookup.extend(self.registry.take_deferred_soft_sync());
        let mut bindings: Vec<(u64, NetworkId)> = lookup.into_iter().collect();
        bindings.sort_by_key(|&(_, id)| id);
        for (instance_id, network_id) in bindings {
            if self.registry.contains(network_id) {
                continue;
            }
            match self.world.bind_scene_object(instance_id, network_id) {
                Ok(object) => {
                    let record = NetworkObjectRecord {
                        network_id,
                        owner: PeerId::SERVER,
                        descriptor: SpawnDescriptor::SoftSync { instance_id },
                        is_scene_object: true,
                        is_player_object: false,
                        pose: object.pose,
                        behaviour_count: object.behaviour_count,
                    };
                    if let Err(e) = self.registry.insert(record) {
                        debug!("soft sync of {}: {}", network_id, e);
                    }
                }
                Err(e) => warn!("soft sync of {} in {} failed: {}", network_id, scene, e),
            }
        }
    }

    // =========================================================================
    // RPC AND MESSAGING
    // =========================================================================

    fn rpc_call(id: NetworkId, behaviour: u16, method: &str, args: Vec<u8>) -> RpcCall {
        RpcCall {
            network_id: id,
            behaviour,
            method_hash: hashing::method_hash(method),
            args,
        }
    }

    fn send_request(
        &mut self,
        peer: PeerId,
        message_type: MessageType,
        call: RpcCall,
        expected: ResponseKind,
    ) -> Result<ResponseHandle, SessionError> {
        if !self.peers.get(&peer).is_some_and(PeerConnection::is_connected) {
            return Err(SessionError::NotConnected(peer));
        }
        let response_id = self.correlation.allocate_id();
        let handle = self.correlation.register(response_id, expected, peer)?;
        let frame = RpcRequest { call, response_id }.to_frame(message_type, &self.wire)?;
        if let Err(e) = self.send_to(peer, ChannelId::INTERNAL, &frame) {
            self.correlation.abandon(response_id);
            return Err(e);
        }
        Ok(handle)
    }

    /// Client: fire-and-forget RPC run on the server
    pub fn invoke_server_rpc(
        &mut self,
        id: NetworkId,
        behaviour: u16,
        method: &str,
        args: Vec<u8>,
    ) -> Result<(), SessionError> {
        self.require_role(Role::Client)?;
        let frame = Self::rpc_call(id, behaviour, method, args).to_frame(MessageType::ServerRpc, &self.wire)?;
        self.send_to(PeerId::SERVER, ChannelId::INTERNAL, &frame)
    }

    /// Client: RPC run on the server whose result comes back as `expected`
    pub fn request_server_rpc(
        &mut self,
        id: NetworkId,
        behaviour: u16,
        method: &str,
        args: Vec<u8>,
        expected: ResponseKind,
    ) -> Result<ResponseHandle, SessionError> {
        self.require_role(Role::Client)?;
        let call = Self::rpc_call(id, behaviour, method, args);
        self.send_request(PeerId::SERVER, MessageType::ServerRpcRequest, call, expected)
    }

    /// Server: fire-and-forget RPC run on one client
    pub fn invoke_client_rpc(
        &mut self,
        peer: PeerId,
        id: NetworkId,
        behaviour: u16,
        method: &str,
        args: Vec<u8>,
    ) -> Result<(), SessionError> {
        self.require_role(Role::Server)?;
        let frame = Self::rpc_call(id, behaviour, method, args).to_frame(MessageType::ClientRpc, &self.wire)?;
        if !self.peers.get(&peer).is_some_and(PeerConnection::is_connected) {
            return Err(SessionError::NotConnected(peer));
        }
        self.send_to(peer, ChannelId::INTERNAL, &frame)
    }

    pub fn request_client_rpc(
        &mut self,
        peer: PeerId,
        id: NetworkId,
        behaviour: u16,
        method: &str,
        args: Vec<u8>,
        expected: ResponseKind,
    ) -> Result<ResponseHandle, SessionError> {
        self.require_role(Role::Server)?;
        let call = Self::rpc_call(id, behaviour, method, args);
        self.send_request(peer, MessageType::ClientRpcRequest, call, expected)
    }

    /// Stop waiting for a response; the handle observes `Abandoned`
    pub fn abandon_request(&mut self, handle: &ResponseHandle) -> bool {
        self.correlation.abandon(handle.id())
    }

    /// Run an RPC against the local world; `None` when the target does not
    /// exist here
    fn invoke_local(&mut self, sender: PeerId, call: RpcCall) -> Result<Option<Option<RpcValue>>, SessionError> {
        match self.registry.get(call.network_id) {
            Some(record) if record.has_behaviour(call.behaviour) => {}
            Some(_) => {
                debug!("rpc for missing behaviour {} on {}", call.behaviour, call.network_id);
                return Ok(None);
            }
            None => {
                debug!("rpc for unknown object {}", call.network_id);
                return Ok(None);
            }
        }
        let invocation = RpcInvocation {
            network_id: call.network_id,
            behaviour: call.behaviour,
            method_hash: call.method_hash,
            sender,
            args: call.args,
        };
        Ok(Some(self.world.invoke_rpc(&invocation)?))
    }

    fn answer_request(
        &mut self,
        inbound: &mut Inbound<'_>,
        response_type: MessageType,
    ) -> Result<(), SessionError> {
        let request: RpcRequest = inbound.read(&self.wire)?;
        let response_id = request.response_id;
        let response = match self.invoke_local(inbound.from, request.call) {
            Ok(Some(result)) => RpcResponse::ok(response_id, result.unwrap_or(RpcValue::Unit).to_bytes()),
            Ok(None) => RpcResponse::failed(response_id, RpcStatus::MissingTarget),
            Err(e) => {
                warn!(peer = %inbound.from, "request {:?} failed: {}", response_id, e);
                RpcResponse::failed(response_id, RpcStatus::Failed)
            }
        };
        let frame = response.to_frame(response_type, &self.wire)?;
        self.send_to(inbound.from, inbound.channel, &frame)
    }

    fn accept_response(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError> {
        let response: RpcResponse = inbound.read(&self.wire)?;
        let (id, from) = (response.response_id, inbound.from);
        let outcome = match response.status {
            RpcStatus::Ok => self.correlation.resolve(id, from, &response.result),
            RpcStatus::MissingTarget => self.correlation.fail(id, from, RpcFailure::MissingTarget),
            RpcStatus::Failed => self.correlation.fail(id, from, RpcFailure::RemoteFailed),
        };
        debug!("response {:?} from {}: {:?}", response.response_id, inbound.from, outcome);
        Ok(())
    }

    /// Application message to one peer
    pub fn send_custom(&mut self, peer: PeerId, channel: ChannelId, data: Vec<u8>) -> Result<(), SessionError> {
        if !self.peers.get(&peer).is_some_and(PeerConnection::is_connected) {
            return Err(SessionError::NotConnected(peer));
        }
        let frame = CustomMessage { data }.to_frame(MessageType::CustomMessage, &self.wire)?;
        self.send_to(peer, channel, &frame)
    }

    /// Server: push our clock to every client
    pub fn send_time_sync(&mut self) -> Result<(), SessionError> {
        self.require_role(Role::Server)?;
        let frame = TimeSync {
            network_time: self.network_time(),
        }
        .to_frame(MessageType::TimeSync, &self.wire)?;
        self.broadcast(ChannelId::INTERNAL, &frame, None);
        Ok(())
    }

    fn sync_clock(&mut self, network_time: f32) {
        self.time_offset = network_time - self.start.elapsed().as_secs_f32();
    }

    fn apply_var(&mut self, inbound: &mut Inbound<'_>, full: bool) -> Result<(), SessionError> {
        let var: NetworkedVar = inbound.read(&self.wire)?;
        let Some(record) = self.registry.get(var.network_id) else {
            return Err(SessionError::Stale(var.network_id));
        };
        if !record.has_behaviour(var.behaviour) {
            debug!("variable write for missing behaviour {} on {}", var.behaviour, var.network_id);
            return Ok(());
        }
        if self.role == Role::Server && record.owner != inbound.from {
            warn!(
                "{} wrote variables on {} owned by {}; dropped",
                inbound.from, var.network_id, record.owner
            );
            return Ok(());
        }
        self.world
            .apply_variables(var.network_id, var.behaviour, inbound.from, &var.data, full)?;
        if self.role == Role::Server {
            let frame = var.to_frame(inbound.message_type, &self.wire)?;
            self.broadcast(inbound.channel, &frame, Some(inbound.from));
        }
        Ok(())
    }

    // =========================================================================
    // JOIN
    // =========================================================================

    fn spawn_player(&mut self, peer: PeerId, prefab_hash: u64, pose: Pose) -> Result<ObjectSpawn, SessionError> {
        let spawn = self.prefab_spawn(prefab_hash, peer, pose, true)?;
        self.spawn_local(&spawn, None)?;
        Ok(spawn)
    }

    /// The peer only becomes `Connected` once its player object exists and
    /// the snapshot is encoded
    fn approve(&mut self, peer: PeerId, approval: Approval) -> Result<(), SessionError> {
        let player = match approval.player_prefab {
            Some(prefab_hash) => match self.spawn_player(peer, prefab_hash, approval.pose) {
                Ok(spawn) => Some(spawn),
                Err(e) => {
                    warn!(peer = %peer, "cannot spawn player object, rejecting: {}", e);
                    self.transport.disconnect(peer);
                    self.drop_peer(peer);
                    return Ok(());
                }
            },
            None => None,
        };

        let approved = ConnectionApproved {
            assigned_id: peer,
            scene: self.coordinator.current_scene(),
            switch_id: self.coordinator.current_switch_id(),
            network_time: self.network_time(),
            objects: self.registry.snapshot(),
        };
        let frame = match approved.to_frame(MessageType::ConnectionApproved, &self.wire) {
            Ok(frame) => frame,
            Err(e) => {
                if let Some(spawn) = &player {
                    self.destroy_local(spawn.network_id);
                }
                return Err(e.into());
            }
        };
        self.set_state(peer, ConnectionState::Connected);
        self.coordinator.on_peer_connected(peer);
        self.send_to(peer, ChannelId::INTERNAL, &frame)?;

        if let Some(spawn) = player {
            let frame = AddObject { spawn, payload: None }.to_frame(MessageType::AddObject, &self.wire)?;
            self.broadcast(ChannelId::INTERNAL, &frame, Some(peer));
        }
        info!("client {} approved ({} objects)", peer, approved.objects.len());
        self.events.push_back(SessionEvent::ClientConnected(peer));
        Ok(())
    }
}

impl<T, W, S> ProtocolHandlers for NetworkSession<T, W, S>
where
    T: Transport,
    W: ObjectWorld,
    S: SceneLoader,
{
    fn on_certificate_hail(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError> {
        self.require_state(inbound.from, ConnectionState::AwaitingHail, inbound.message_type)?;
        let hail: CertificateHail = inbound.read(&self.wire)?;
        let handshake = self
            .peers
            .get_mut(&inbound.from)
            .and_then(PeerConnection::take_client_handshake)
            .ok_or(SessionError::InvalidState("no client handshake pending"))?;
        let (response, key) = handshake.on_hail(&hail)?;

        let frame = response.to_frame(MessageType::HailResponse, &self.wire)?;
        self.send_to(inbound.from, ChannelId::INTERNAL, &frame)?;
        if let Some(conn) = self.peers.get_mut(&inbound.from) {
            conn.install_key(key, SessionRole::Client).map_err(HandshakeError::from)?;
            conn.state = ConnectionState::AwaitingGreeting;
        }
        debug!("hail answered, waiting for greeting");
        Ok(())
    }

    fn on_hail_response(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError> {
        self.require_state(inbound.from, ConnectionState::AwaitingHailResponse, inbound.message_type)?;
        let response: HailResponse = inbound.read(&self.wire)?;
        let conn = self
            .peers
            .get_mut(&inbound.from)
            .ok_or(SessionError::NotConnected(inbound.from))?;
        let handshake = conn
            .take_server_handshake()
            .ok_or(SessionError::InvalidState("no server handshake pending"))?;
        let key = handshake.complete(&response)?;
        conn.install_key(key, SessionRole::Server).map_err(HandshakeError::from)?;
        conn.state = ConnectionState::PendingConnection;

        let frame = Greetings {
            timestamp: unix_millis(),
        }
        .to_frame(MessageType::Greetings, &self.wire)?;
        self.send_to(inbound.from, ChannelId::INTERNAL, &frame)?;
        debug!("session key established with {}", inbound.from);
        Ok(())
    }

    fn on_greetings(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError> {
        self.require_state(inbound.from, ConnectionState::AwaitingGreeting, inbound.message_type)?;
        let greetings: Greetings = inbound.read(&self.wire)?;
        debug!("greeted by server (clock {} ms)", greetings.timestamp);
        self.set_state(inbound.from, ConnectionState::PendingConnection);
        self.send_connection_request()
    }

    fn on_connection_request(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError> {
        self.require_state(inbound.from, ConnectionState::PendingConnection, inbound.message_type)?;
        let request: ConnectionRequest = inbound.read(&self.wire)?;
        if !self.config.compare_config(request.config_hash) {
            return Err(SessionError::ConfigMismatch(inbound.from));
        }
        let approval = if self.config.connection_approval {
            (self.approval)(inbound.from, &request.connection_data)
        } else {
            Approval {
                player_prefab: self.options.player_prefab,
                ..Approval::accept()
            }
        };
        if !approval.approved {
            info!("connection from {} rejected", inbound.from);
            self.transport.disconnect(inbound.from);
            self.drop_peer(inbound.from);
            return Ok(());
        }
        self.approve(inbound.from, approval)
    }

    fn on_connection_approved(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError> {
        self.require_state(inbound.from, ConnectionState::PendingConnection, inbound.message_type)?;
        let approved: ConnectionApproved = inbound.read(&self.wire)?;
        self.set_state(inbound.from, ConnectionState::Connected);
        self.local_id = approved.assigned_id;
        self.sync_clock(approved.network_time);

        let active = self.scenes.active_scene();
        if self.config.use_prefab_sync {
            self.world.destroy_scene_baseline(active);
        }
        for spawn in &approved.objects {
            if let SpawnDescriptor::SoftSync { instance_id } = spawn.descriptor {
                if approved.scene != active {
                    self.registry.defer_soft_sync(instance_id, spawn.network_id);
                    continue;
                }
            }
            if let Err(e) = self.materialize(spawn, None) {
                warn!("cannot materialize {}: {}", spawn.network_id, e);
            }
        }
        info!(
            "joined as {} in {} with {} objects",
            self.local_id,
            approved.scene,
            self.registry.len()
        );
        self.events.push_back(SessionEvent::Connected(self.local_id));

        let actions = self
            .coordinator
            .on_switch_instruction(approved.scene, approved.switch_id, HashMap::new(), active);
        self.run_scene_actions(actions)
    }

    fn on_add_object(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError> {
        let add: AddObject = inbound.read(&self.wire)?;
        self.materialize(&add.spawn, add.payload.as_deref())
    }

    fn on_add_objects(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError> {
        let add: AddObjects = inbound.read(&self.wire)?;
        for spawn in &add.objects {
            if let Err(e) = self.materialize(spawn, None) {
                warn!("cannot materialize {}: {}", spawn.network_id, e);
            }
        }
        Ok(())
    }

    fn on_destroy_object(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError> {
        let destroy: DestroyObject = inbound.read(&self.wire)?;
        if !self.destroy_local(destroy.network_id) {
            debug!("destroy of unknown object {}", destroy.network_id);
        }
        Ok(())
    }

    fn on_switch_scene(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError> {
        let switch: SwitchScene = inbound.read(&self.wire)?;
        let lookup = switch.soft_sync_objects.into_iter().collect();
        let active = self.scenes.active_scene();
        let actions = self
            .coordinator
            .on_switch_instruction(switch.scene, switch.switch_id, lookup, active);
        self.run_scene_actions(actions)
    }

    fn on_switch_scene_completed(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError> {
        let completed: SwitchSceneCompleted = inbound.read(&self.wire)?;
        let outcome = self.coordinator.on_ack(inbound.from, completed.switch_id);
        debug!("switch {} ack from {}: {:?}", completed.switch_id, inbound.from, outcome);
        Ok(())
    }

    fn on_change_owner(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError> {
        let change: ChangeOwner = inbound.read(&self.wire)?;
        self.apply_owner_change(change.network_id, change.owner);
        Ok(())
    }

    fn on_var_delta(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError> {
        self.apply_var(inbound, false)
    }

    fn on_var_update(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError> {
        self.apply_var(inbound, true)
    }

    fn on_server_rpc(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError> {
        let call: RpcCall = inbound.read(&self.wire)?;
        self.invoke_local(inbound.from, call)?;
        Ok(())
    }

    fn on_server_rpc_request(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError> {
        self.answer_request(inbound, MessageType::ServerRpcResponse)
    }

    fn on_server_rpc_response(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError> {
        self.accept_response(inbound)
    }

    fn on_client_rpc(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError> {
        let call: RpcCall = inbound.read(&self.wire)?;
        self.invoke_local(inbound.from, call)?;
        Ok(())
    }

    fn on_client_rpc_request(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError> {
        self.answer_request(inbound, MessageType::ClientRpcResponse)
    }

    fn on_client_rpc_response(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError> {
        self.accept_response(inbound)
    }

    fn on_custom_message(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError> {
        let message: CustomMessage = inbound.read(&self.wire)?;
        self.events.push_back(SessionEvent::CustomMessage {
            from: inbound.from,
            channel: inbound.channel,
            data: message.data,
        });
        Ok(())
    }

    fn on_time_sync(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError> {
        let sync: TimeSync = inbound.read(&self.wire)?;
        self.sync_clock(sync.network_time);
        Ok(())
    }
}

impl<T, W, S> fmt::Debug for NetworkSession<T, W, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkSession")
            .field("role", &self.role)
            .field("local_id", &self.local_id)
            .field("peers", &self.peers.len())
            .field("objects", &self.registry.len())
            .field("pending_requests", &self.correlation.pending_count())
            .finish()
    }
}
