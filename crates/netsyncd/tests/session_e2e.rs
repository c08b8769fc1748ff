//! End-to-end sessions over the loopback transport.
//!
//! A real server and real clients run in one process; where a misbehaving
//! peer is needed, a raw loopback endpoint stands in for it.

use netsync_core::{
    hashing, NetworkConfig, NetworkId, ObjectSpawn, PeerId, Pose, SceneIndex, SpawnDescriptor, SwitchId, Vec3,
};
use netsync_net::messages::{
    CertificateHail, ConnectionApproved, ConnectionRequest, DestroyObject, RpcResponse,
};
use netsync_net::{
    ChannelId, ConnectionState, KeyPair, LoopbackHub, LoopbackTransport, MessageType, ServerIdentity, Transport,
    TransportEvent, TrustAnchor, WireContext, WireMessage,
};
use netsyncd::correlation::{ResponseKind, RpcFailure, RpcValue};
use netsyncd::scene::{SceneError, SwitchOutcome};
use netsyncd::world::BehaviourEvent;
use netsyncd::{
    MemoryScenes, MemoryWorld, NetworkSession, SceneLoader, SessionError, SessionEvent, SessionOptions,
};

type Session = NetworkSession<LoopbackTransport, MemoryWorld, MemoryScenes>;

const HOST: &str = "netsync.test";

fn network(encrypted: bool) -> NetworkConfig {
    NetworkConfig {
        enable_encryption: encrypted,
        sign_key_exchange: encrypted,
        registered_scenes: vec!["Lobby".into(), "Arena".into()],
        network_prefabs: vec!["Player".into(), "Crate".into()],
        ..NetworkConfig::default()
    }
}

fn bare_world() -> MemoryWorld {
    MemoryWorld::new().with_prefab("Player", 2)
}

fn world() -> MemoryWorld {
    bare_world()
        .with_scene_object(SceneIndex(0), "Lobby", "Door", "Crate", 1)
        .with_scene_object(SceneIndex(1), "Arena", "Crate", "Crate", 1)
        .with_scene_object(SceneIndex(1), "Arena", "Barrel", "Crate", 1)
}

fn player() -> u64 {
    hashing::prefab_hash("Player")
}

fn drain(transport: &mut LoopbackTransport) -> Vec<TransportEvent> {
    std::iter::from_fn(|| transport.poll_event()).collect()
}

/// Send `message` as a plain packet from a hand-driven endpoint
fn send_raw<M: WireMessage>(
    from: &LoopbackTransport,
    to: PeerId,
    message: &M,
    message_type: MessageType,
    config: &NetworkConfig,
) {
    let packet = message
        .to_frame(message_type, &WireContext::from(config))
        .unwrap()
        .encode_packet(None)
        .unwrap();
    from.send(to, ChannelId::INTERNAL, packet).unwrap();
}

struct Mesh {
    hub: LoopbackHub,
    authority: KeyPair,
    config: NetworkConfig,
    server: Session,
    clients: Vec<Session>,
}

impl Mesh {
    fn new(config: NetworkConfig, server_world: MemoryWorld, mut options: SessionOptions) -> Self {
        let hub = LoopbackHub::new();
        let authority = KeyPair::generate();
        if config.sign_key_exchange {
            options.identity = Some(ServerIdentity::issue(&authority, HOST).unwrap());
        }
        let server = NetworkSession::server(
            config.clone(),
            hub.endpoint(PeerId::SERVER).unwrap(),
            server_world,
            MemoryScenes::new(SceneIndex(0), 2),
            options,
        )
        .unwrap();
        Self {
            hub,
            authority,
            config,
            server,
            clients: Vec::new(),
        }
    }

    fn anchor(&self) -> TrustAnchor {
        TrustAnchor {
            hostname: HOST.to_string(),
            authority_key: self.authority.public_key(),
        }
    }

    fn add_client_with(&mut self, id: u32, client_world: MemoryWorld, anchor: TrustAnchor) {
        let client = NetworkSession::client(
            self.config.clone(),
            self.hub.endpoint(PeerId(id)).unwrap(),
            client_world,
            MemoryScenes::new(SceneIndex(0), 2),
            SessionOptions {
                trust_anchor: Some(anchor),
                ..SessionOptions::default()
            },
        )
        .unwrap();
        self.clients.push(client);
        self.hub.connect(PeerId::SERVER, PeerId(id)).unwrap();
    }

    fn add_client(&mut self, id: u32, client_world: MemoryWorld) {
        let anchor = self.anchor();
        self.add_client_with(id, client_world, anchor);
    }

    fn pump(&mut self) {
        for _ in 0..64 {
            let mut processed = self.server.poll();
            for client in &mut self.clients {
                processed += client.poll();
            }
            if processed == 0 {
                return;
            }
        }
        panic!("mesh did not settle");
    }
}

// =============================================================================
// HANDSHAKE
// =============================================================================

#[test]
fn test_signed_handshake_then_encrypted_traffic() {
    let mut mesh = Mesh::new(network(true), world(), SessionOptions::default());
    mesh.add_client(1, world());
    mesh.pump();

    assert!(mesh.clients[0].is_connected());
    assert_eq!(mesh.server.connection_state(PeerId(1)), Some(ConnectionState::Connected));

    // traffic only decodes if both ends derived the same key
    mesh.clients[0]
        .send_custom(PeerId::SERVER, ChannelId(3), b"hello".to_vec())
        .unwrap();
    mesh.server.send_custom(PeerId(1), ChannelId(4), b"back".to_vec()).unwrap();
    mesh.pump();

    let server_events: Vec<_> = mesh.server.events().collect();
    assert!(server_events.contains(&SessionEvent::CustomMessage {
        from: PeerId(1),
        channel: ChannelId(3),
        data: b"hello".to_vec(),
    }));
    let client_events: Vec<_> = mesh.clients[0].events().collect();
    assert!(client_events.contains(&SessionEvent::CustomMessage {
        from: PeerId::SERVER,
        channel: ChannelId(4),
        data: b"back".to_vec(),
    }));
}

#[test]
fn test_tampered_signature_disconnects_before_key() {
    let config = network(true);
    let hub = LoopbackHub::new();
    let authority = KeyPair::generate();
    let identity = ServerIdentity::issue(&authority, HOST).unwrap();
    let mut rogue = hub.endpoint(PeerId::SERVER).unwrap();
    let mut client: Session = NetworkSession::client(
        config.clone(),
        hub.endpoint(PeerId(1)).unwrap(),
        world(),
        MemoryScenes::new(SceneIndex(0), 2),
        SessionOptions {
            trust_anchor: Some(TrustAnchor {
                hostname: HOST.to_string(),
                authority_key: authority.public_key(),
            }),
            ..SessionOptions::default()
        },
    )
    .unwrap();

    hub.connect(PeerId::SERVER, PeerId(1)).unwrap();
    client.poll();
    assert_eq!(client.connection_state(PeerId::SERVER), Some(ConnectionState::AwaitingHail));

    // genuine certificate, signature over the wrong key material
    let hail = CertificateHail {
        certificate: Some(identity.certificate.clone()),
        server_public: [7; 32],
        signature: Some(identity.signing_key.sign(b"some other key").to_vec()),
    };
    send_raw(&rogue, PeerId(1), &hail, MessageType::CertificateHail, &config);
    client.poll();

    assert!(client.connection_state(PeerId::SERVER).is_none());
    assert!(!hub.is_linked(PeerId::SERVER, PeerId(1)));
    // no hail response ever reached the rogue server
    assert_eq!(
        drain(&mut rogue),
        vec![
            TransportEvent::Connected(PeerId(1)),
            TransportEvent::Disconnected(PeerId(1)),
        ]
    );
}

#[test]
fn test_untrusted_authority_is_rejected() {
    let mut mesh = Mesh::new(network(true), world(), SessionOptions::default());
    let stranger = TrustAnchor {
        hostname: HOST.to_string(),
        authority_key: KeyPair::generate().public_key(),
    };
    mesh.add_client_with(1, world(), stranger);
    mesh.pump();

    assert!(!mesh.clients[0].is_connected());
    assert!(mesh.server.connected_peers().is_empty());
    assert_eq!(mesh.server.events().count(), 0);
}

// =============================================================================
// OBJECT SYNC
// =============================================================================

#[test]
fn test_snapshot_then_idempotent_destroy() {
    let mut mesh = Mesh::new(network(false), bare_world(), SessionOptions::default());
    let pose = Pose::at(Vec3::new(1.0, 0.0, 2.0));
    let a = mesh.server.spawn_object(player(), PeerId::SERVER, pose, None).unwrap();
    let b = mesh.server.spawn_object(player(), PeerId::SERVER, pose, None).unwrap();

    mesh.add_client(1, bare_world());
    mesh.pump();
    let client = &mesh.clients[0];
    assert_eq!(client.registry().len(), 2);
    assert_eq!(client.registry().get(b).unwrap().pose, pose);

    assert!(mesh.server.destroy_object(a).unwrap());
    mesh.pump();
    assert_eq!(mesh.clients[0].registry().len(), 1);
    assert!(mesh.clients[0].world().object(a).is_none());

    assert!(!mesh.server.destroy_object(a).unwrap());
    mesh.pump();
    assert_eq!(mesh.clients[0].registry().len(), 1);
}

#[test]
fn test_replayed_destroy_from_server_is_harmless() {
    let config = network(false);
    let hub = LoopbackHub::new();
    let mut server = hub.endpoint(PeerId::SERVER).unwrap();
    let mut client: Session = NetworkSession::client(
        config.clone(),
        hub.endpoint(PeerId(1)).unwrap(),
        bare_world(),
        MemoryScenes::new(SceneIndex(0), 2),
        SessionOptions::default(),
    )
    .unwrap();
    hub.connect(PeerId::SERVER, PeerId(1)).unwrap();
    client.poll();

    let request = drain(&mut server)
        .into_iter()
        .find_map(|event| match event {
            TransportEvent::Packet { data, .. } => Some(data),
            _ => None,
        })
        .unwrap();
    let frame = netsync_net::Frame::decode_packet(&request, None).unwrap();
    let request = ConnectionRequest::from_payload(&frame.payload, &WireContext::from(&config)).unwrap();
    assert!(config.compare_config(request.config_hash));

    let spawn = |id: u64| ObjectSpawn {
        is_player_object: false,
        network_id: NetworkId(id),
        owner: PeerId::SERVER,
        is_scene_object: false,
        descriptor: SpawnDescriptor::Prefab { prefab_hash: player() },
        pose: Pose::default(),
    };
    let approved = ConnectionApproved {
        assigned_id: PeerId(1),
        scene: SceneIndex(0),
        switch_id: SwitchId::NIL,
        network_time: 12.0,
        objects: vec![spawn(1), spawn(2)],
    };
    send_raw(&server, PeerId(1), &approved, MessageType::ConnectionApproved, &config);
    client.poll();
    assert!(client.is_connected());
    assert_eq!(client.registry().len(), 2);
    assert!(client.network_time() >= 12.0);

    for id in [1, 1, 42] {
        let destroy = DestroyObject { network_id: NetworkId(id) };
        send_raw(&server, PeerId(1), &destroy, MessageType::DestroyObject, &config);
    }
    client.poll();
    assert_eq!(client.registry().len(), 1);
    assert!(client.registry().contains(NetworkId(2)));
    assert!(client.is_connected());
}

#[test]
fn test_ownership_notifications() {
    let mut mesh = Mesh::new(network(false), bare_world(), SessionOptions::default());
    mesh.add_client(1, bare_world());
    mesh.add_client(2, bare_world());
    mesh.pump();
    let id = mesh
        .server
        .spawn_object(player(), PeerId::SERVER, Pose::default(), None)
        .unwrap();
    mesh.pump();

    mesh.server.change_ownership(id, PeerId(1)).unwrap();
    mesh.pump();
    assert_eq!(
        mesh.server.world().notifications,
        vec![(id, BehaviourEvent::OwnershipLost { owner: PeerId::SERVER })]
    );
    assert_eq!(
        mesh.clients[0].world().notifications,
        vec![(id, BehaviourEvent::OwnershipGained { owner: PeerId(1) })]
    );
    assert!(mesh.clients[1].world().notifications.is_empty());
    for client in &mesh.clients {
        assert_eq!(client.registry().get(id).unwrap().owner, PeerId(1));
    }

    mesh.server.change_ownership(id, PeerId(2)).unwrap();
    mesh.pump();
    assert_eq!(
        mesh.clients[0].world().notifications[1],
        (id, BehaviourEvent::OwnershipLost { owner: PeerId(1) })
    );
    assert_eq!(
        mesh.clients[1].world().notifications,
        vec![(id, BehaviourEvent::OwnershipGained { owner: PeerId(2) })]
    );
    assert_eq!(mesh.server.world().notifications.len(), 1);

    assert!(matches!(
        mesh.server.change_ownership(id, PeerId(9)),
        Err(SessionError::NotConnected(PeerId(9)))
    ));
}

#[test]
fn test_networked_variables_from_owner() {
    let mut mesh = Mesh::new(network(false), bare_world(), SessionOptions::default());
    mesh.add_client(1, bare_world());
    mesh.add_client(2, bare_world());
    mesh.pump();
    let id = mesh.server.spawn_object(player(), PeerId(1), Pose::default(), None).unwrap();
    mesh.pump();

    mesh.clients[0].send_networked_var(id, 1, vec![4, 2], false).unwrap();
    mesh.pump();

    let on_server = &mesh.server.world().var_log;
    assert_eq!(on_server.len(), 1);
    assert_eq!(on_server[0].sender, PeerId(1));
    assert!(!on_server[0].full);
    let relayed = &mesh.clients[1].world().var_log;
    assert_eq!(relayed.len(), 1);
    assert_eq!(relayed[0].data, vec![4, 2]);
    assert!(mesh.clients[0].world().var_log.is_empty());

    assert!(matches!(
        mesh.clients[1].send_networked_var(id, 1, vec![0], true),
        Err(SessionError::InvalidState(_))
    ));
    assert!(mesh.clients[0].send_networked_var(id, 5, vec![0], true).is_err());
}

#[test]
fn test_player_object_for_each_client() {
    let options = SessionOptions {
        player_prefab: Some(player()),
        ..SessionOptions::default()
    };
    let mut mesh = Mesh::new(network(true), world(), options);
    mesh.add_client(1, world());
    mesh.pump();
    mesh.add_client(2, world());
    mesh.pump();

    // the lobby door plus one player per client, everywhere
    assert_eq!(mesh.server.registry().len(), 3);
    for client in &mesh.clients {
        assert_eq!(client.registry().len(), 3);
        let players: Vec<PeerId> = client
            .registry()
            .iter()
            .filter(|r| r.is_player_object)
            .map(|r| r.owner)
            .collect();
        assert_eq!(players, vec![PeerId(1), PeerId(2)]);
    }

    // leaving takes the player object along
    mesh.clients.remove(0);
    mesh.pump();
    assert_eq!(mesh.server.registry().len(), 2);
    assert_eq!(mesh.clients[0].registry().len(), 2);
    assert!(mesh
        .server
        .events()
        .any(|e| e == SessionEvent::ClientDisconnected(PeerId(1))));
}

// =============================================================================
// RPC
// =============================================================================

#[test]
fn test_rpc_response_from_wrong_peer_is_discarded() {
    let config = network(false);
    let mut mesh = Mesh::new(config.clone(), bare_world(), SessionOptions::default());
    let mut client_world = bare_world();
    client_world.register_rpc("score", |_| Some(RpcValue::U32(7)));
    mesh.add_client(1, client_world);
    mesh.pump();

    // a second, hand-driven client joins
    let rogue = mesh.hub.endpoint(PeerId(2)).unwrap();
    mesh.hub.connect(PeerId::SERVER, PeerId(2)).unwrap();
    mesh.pump();
    let request = ConnectionRequest {
        config_hash: config.config_hash().unwrap(),
        connection_data: Vec::new(),
    };
    send_raw(&rogue, PeerId::SERVER, &request, MessageType::ConnectionRequest, &config);
    mesh.pump();
    assert_eq!(mesh.server.connected_peers(), vec![PeerId(1), PeerId(2)]);

    let id = mesh.server.spawn_object(player(), PeerId::SERVER, Pose::default(), None).unwrap();
    mesh.pump();

    let mut handle = mesh
        .server
        .request_client_rpc(PeerId(1), id, 0, "score", Vec::new(), ResponseKind::U32)
        .unwrap();
    let forged = RpcResponse::ok(handle.id(), RpcValue::U32(99).to_bytes());
    send_raw(&rogue, PeerId::SERVER, &forged, MessageType::ClientRpcResponse, &config);
    mesh.server.poll();
    assert!(handle.try_outcome().is_none());
    assert_eq!(mesh.server.pending_requests(), 1);
    assert!(mesh.hub.is_linked(PeerId::SERVER, PeerId(2)));

    mesh.pump();
    assert_eq!(handle.try_outcome(), Some(Ok(RpcValue::U32(7))));
    assert_eq!(mesh.server.pending_requests(), 0);
}

#[test]
fn test_server_rpc_request_and_unit_reply() {
    let mut server_world = bare_world();
    server_world.register_rpc("get_name", |call| Some(RpcValue::Text(format!("obj-{}", call.network_id.0))));
    server_world.register_rpc("poke", |_| None);
    let mut mesh = Mesh::new(network(true), server_world, SessionOptions::default());
    mesh.add_client(1, bare_world());
    mesh.pump();
    let id = mesh.server.spawn_object(player(), PeerId(1), Pose::default(), None).unwrap();
    mesh.pump();

    let client = &mut mesh.clients[0];
    let mut name = client
        .request_server_rpc(id, 0, "get_name", Vec::new(), ResponseKind::Text)
        .unwrap();
    let mut poke = client
        .request_server_rpc(id, 1, "poke", vec![1], ResponseKind::Unit)
        .unwrap();
    let mut wrong_kind = client
        .request_server_rpc(id, 0, "get_name", Vec::new(), ResponseKind::Bool)
        .unwrap();
    client.invoke_server_rpc(id, 1, "poke", vec![2]).unwrap();
    mesh.pump();

    assert_eq!(name.try_outcome(), Some(Ok(RpcValue::Text(format!("obj-{}", id.0)))));
    assert_eq!(poke.try_outcome(), Some(Ok(RpcValue::Unit)));
    assert!(matches!(wrong_kind.try_outcome(), Some(Err(RpcFailure::DecodeFailed(_)))));
    let log = &mesh.server.world().rpc_log;
    assert_eq!(log.len(), 4);
    assert!(log.iter().all(|call| call.sender == PeerId(1)));
}

#[test]
fn test_request_fails_when_responder_leaves() {
    let mut mesh = Mesh::new(network(false), bare_world(), SessionOptions::default());
    mesh.add_client(1, bare_world());
    mesh.pump();
    let id = mesh.server.spawn_object(player(), PeerId::SERVER, Pose::default(), None).unwrap();
    mesh.pump();

    // the client goes away before it can answer
    let mut handle = mesh
        .server
        .request_client_rpc(PeerId(1), id, 0, "score", Vec::new(), ResponseKind::Unit)
        .unwrap();
    assert!(handle.try_outcome().is_none());

    mesh.clients.clear();
    mesh.pump();
    assert_eq!(handle.try_outcome(), Some(Err(RpcFailure::Disconnected)));
    assert_eq!(mesh.server.pending_requests(), 0);
}

#[test]
fn test_unanswerable_request_fails_fast() {
    let mut mesh = Mesh::new(network(true), bare_world(), SessionOptions::default());
    mesh.add_client(1, bare_world());
    mesh.pump();
    let id = mesh.server.spawn_object(player(), PeerId::SERVER, Pose::default(), None).unwrap();
    mesh.pump();

    let server = &mut mesh.server;
    let mut no_method = server
        .request_client_rpc(PeerId(1), id, 0, "missing", Vec::new(), ResponseKind::Unit)
        .unwrap();
    let mut no_behaviour = server
        .request_client_rpc(PeerId(1), id, 5, "missing", Vec::new(), ResponseKind::Unit)
        .unwrap();
    let mut no_object = server
        .request_client_rpc(PeerId(1), NetworkId(999), 0, "missing", Vec::new(), ResponseKind::Unit)
        .unwrap();
    mesh.pump();

    assert_eq!(no_method.try_outcome(), Some(Err(RpcFailure::RemoteFailed)));
    assert_eq!(no_behaviour.try_outcome(), Some(Err(RpcFailure::MissingTarget)));
    assert_eq!(no_object.try_outcome(), Some(Err(RpcFailure::MissingTarget)));
    assert_eq!(mesh.server.pending_requests(), 0);
    assert_eq!(mesh.server.connected_peers(), vec![PeerId(1)]);
}

// =============================================================================
// SCENES
// =============================================================================

fn arena_instances() -> [u64; 2] {
    [
        hashing::scene_content_instance_id("Arena", "Crate"),
        hashing::scene_content_instance_id("Arena", "Barrel"),
    ]
}

#[test]
fn test_switch_resolves_after_every_ack() {
    let mut mesh = Mesh::new(network(false), world(), SessionOptions::default());
    mesh.add_client(1, world());
    mesh.add_client(2, world());
    mesh.pump();
    assert_eq!(mesh.server.coordinator().progress_count(), 0);

    mesh.clients[1].scenes_mut().set_held(true);
    let mut handle = mesh.server.switch_scene(SceneIndex(1)).unwrap();
    assert!(matches!(
        mesh.server.switch_scene(SceneIndex(0)),
        Err(SessionError::Scene(SceneError::AlreadySwitching))
    ));
    mesh.pump();

    assert!(handle.try_outcome().is_none());
    let progress = mesh.server.coordinator().progress(handle.id()).unwrap();
    assert!(progress.server_done());
    assert_eq!(progress.pending_peers(), vec![PeerId(2)]);

    mesh.clients[1].scenes_mut().set_held(false);
    mesh.pump();
    assert_eq!(handle.try_outcome(), Some(SwitchOutcome::Completed));
    assert!(mesh.server.events().any(|e| e
        == SessionEvent::SwitchResolved {
            switch_id: handle.id(),
            outcome: SwitchOutcome::Completed,
        }));

    // the lobby door is gone, the arena content kept the server's ids
    for client in &mesh.clients {
        assert_eq!(client.scenes().active_scene(), SceneIndex(1));
        assert_eq!(client.registry().len(), 2);
        for instance in arena_instances() {
            assert_eq!(client.world().bound_id(instance), mesh.server.world().bound_id(instance));
            assert!(client.world().bound_id(instance).is_some());
        }
    }
}

#[test]
fn test_switch_resolves_without_departed_peer() {
    let mut mesh = Mesh::new(network(false), world(), SessionOptions::default());
    mesh.add_client(1, world());
    mesh.add_client(2, world());
    mesh.pump();

    for client in &mut mesh.clients {
        client.scenes_mut().set_held(true);
    }
    let mut handle = mesh.server.switch_scene(SceneIndex(1)).unwrap();
    mesh.pump();

    mesh.clients.pop();
    mesh.pump();
    assert!(handle.try_outcome().is_none());
    assert_eq!(
        mesh.server.coordinator().progress(handle.id()).unwrap().pending_peers(),
        vec![PeerId(1)]
    );

    mesh.clients[0].scenes_mut().set_held(false);
    mesh.pump();
    assert_eq!(handle.try_outcome(), Some(SwitchOutcome::Completed));
}

#[test]
fn test_host_self_acknowledges() {
    let options = SessionOptions {
        host_is_client: true,
        ..SessionOptions::default()
    };
    let mut mesh = Mesh::new(network(false), world(), options);
    let mut handle = mesh.server.switch_scene(SceneIndex(1)).unwrap();
    assert!(handle.try_outcome().is_none());
    mesh.pump();
    assert_eq!(handle.try_outcome(), Some(SwitchOutcome::Completed));
    assert_eq!(mesh.server.registry().scene_object_ids().len(), 2);
}

#[test]
fn test_late_joiner_catches_up_with_scene() {
    let mut mesh = Mesh::new(network(true), world(), SessionOptions::default());
    let mut handle = mesh.server.switch_scene(SceneIndex(1)).unwrap();
    mesh.pump();
    assert_eq!(handle.try_outcome(), Some(SwitchOutcome::Completed));

    mesh.add_client(1, world());
    mesh.pump();
    let client = &mesh.clients[0];
    assert!(client.is_connected());
    assert_eq!(client.scenes().active_scene(), SceneIndex(1));
    assert_eq!(client.registry().len(), 2);
    for instance in arena_instances() {
        assert_eq!(client.world().bound_id(instance), mesh.server.world().bound_id(instance));
    }
    assert_eq!(mesh.server.coordinator().progress_count(), 0);
}

#[test]
fn test_prefab_sync_mode() {
    let mut config = network(false);
    config.use_prefab_sync = true;
    let mut mesh = Mesh::new(config, world(), SessionOptions::default());
    mesh.add_client(1, world());
    mesh.pump();

    // the snapshot replaces the local baseline
    let door = hashing::scene_content_instance_id("Lobby", "Door");
    let client = &mesh.clients[0];
    assert!(!client.world().has_content(door));
    assert_eq!(client.registry().len(), 1);
    let record = client.registry().iter().next().unwrap();
    assert!(record.is_scene_object);
    assert!(!record.descriptor.is_soft_sync());

    let mut handle = mesh.server.switch_scene(SceneIndex(1)).unwrap();
    mesh.pump();
    assert_eq!(handle.try_outcome(), Some(SwitchOutcome::Completed));

    let client = &mesh.clients[0];
    assert_eq!(client.scenes().active_scene(), SceneIndex(1));
    assert_eq!(client.registry().scene_object_ids(), mesh.server.registry().scene_object_ids());
    for instance in arena_instances() {
        assert!(!client.world().has_content(instance));
    }
}

#[test]
fn test_time_sync() {
    let mut mesh = Mesh::new(network(false), bare_world(), SessionOptions::default());
    mesh.add_client(1, bare_world());
    mesh.pump();
    mesh.server.send_time_sync().unwrap();
    mesh.pump();
    let drift = (mesh.server.network_time() - mesh.clients[0].network_time()).abs();
    assert!(drift < 1.0, "drift {drift}");
}
