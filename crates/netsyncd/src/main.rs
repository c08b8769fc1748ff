//! netsyncd - netsync loopback demo
//!
//! Runs a server and a set of clients in one process over the loopback
//! transport: signed handshake, object spawning, ownership transfer, a
//! request RPC and a scene switch.

use anyhow::Context;
use clap::Parser;
use netsync_core::{hashing, NetworkConfig, PeerId, Pose, SceneIndex, Vec3};
use netsync_net::{KeyPair, LoopbackHub, LoopbackTransport, ServerIdentity, TrustAnchor};
use netsyncd::config::{Config, Role};
use netsyncd::correlation::{ResponseKind, RpcValue};
use netsyncd::{
    MemoryScenes, MemoryWorld, NetworkSession, SceneLoader, SessionEvent, SessionOptions, SwitchOutcome,
};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

type Session = NetworkSession<LoopbackTransport, MemoryWorld, MemoryScenes>;

const HOSTNAME: &str = "netsync.local";

fn init_logging(config: &Config) {
    let level = if config.verbose {
        "netsyncd=debug,netsync_net=debug"
    } else {
        "netsyncd=info,netsync_net=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);
    if config.log_format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// Every peer runs the same scene content
fn demo_world(network: &NetworkConfig) -> MemoryWorld {
    let mut world = MemoryWorld::new().with_prefab("Player", 1).with_prefab("Crate", 2);
    for (index, scene) in network.registered_scenes.iter().enumerate() {
        let scene_index = SceneIndex(index as u32);
        world = world
            .with_scene_object(scene_index, scene, "Door", "Crate", 1)
            .with_scene_object(scene_index, scene, "Lamp", "Crate", 1);
    }
    world
}

/// Drive every session until nothing moves or `done` holds
fn pump(
    server: &mut Session,
    clients: &mut [Session],
    ticks: u32,
    mut done: impl FnMut(&mut Session, &mut [Session]) -> bool,
) -> bool {
    for _ in 0..ticks {
        let mut processed = server.poll();
        for client in clients.iter_mut() {
            processed += client.poll();
        }
        if done(server, clients) {
            return true;
        }
        if processed == 0 {
            break;
        }
    }
    done(server, clients)
}

async fn run(config: Config) -> anyhow::Result<()> {
    let network = config.load_network_config()?;
    let scene_count = network.registered_scenes.len() as u32;
    let target = network
        .scene_index(&config.target_scene)
        .context("target scene vanished")?;

    let authority = KeyPair::generate();
    let identity = ServerIdentity::issue(&authority, HOSTNAME)?;
    let anchor = TrustAnchor {
        hostname: HOSTNAME.to_string(),
        authority_key: authority.public_key(),
    };

    let hub = LoopbackHub::new();
    let mut server_world = demo_world(&network);
    server_world.register_rpc("inspect", |call| {
        Some(RpcValue::Text(format!("{} inspected by {}", call.network_id, call.sender)))
    });
    let mut server = NetworkSession::server(
        network.clone(),
        hub.endpoint(PeerId::SERVER)?,
        server_world,
        MemoryScenes::new(SceneIndex(0), scene_count),
        SessionOptions {
            host_is_client: config.role == Role::Host,
            identity: Some(identity),
            player_prefab: Some(hashing::prefab_hash("Player")),
            ..SessionOptions::default()
        },
    )?;

    let mut clients = Vec::new();
    for n in 1..=config.clients {
        let id = PeerId(n);
        let client = NetworkSession::client(
            network.clone(),
            hub.endpoint(id)?,
            demo_world(&network),
            MemoryScenes::new(SceneIndex(0), scene_count),
            SessionOptions {
                trust_anchor: Some(anchor.clone()),
                ..SessionOptions::default()
            },
        )?;
        clients.push(client);
        hub.connect(PeerId::SERVER, id)?;
    }

    let joined = pump(&mut server, &mut clients, config.ticks, |_, clients| {
        clients.iter().all(Session::is_connected)
    });
    if !joined {
        anyhow::bail!("clients failed to join");
    }
    info!(
        "{} clients joined; server tracks {} objects",
        clients.len(),
        server.registry().len()
    );

    // one crate per client, handed over to it
    let crate_prefab = hashing::prefab_hash("Crate");
    let requests: Vec<_> = clients
        .iter()
        .map(|c| (crate_prefab, PeerId::SERVER, Pose::at(Vec3::new(c.local_id().0 as f32, 0.0, 0.0))))
        .collect();
    let crates = server.spawn_objects(&requests)?;
    for (crate_id, client) in crates.iter().zip(&clients) {
        server.change_ownership(*crate_id, client.local_id())?;
    }
    pump(&mut server, &mut clients, config.ticks, |_, _| false);

    let first = clients.first_mut().context("no clients")?;
    let mut inspect = first.request_server_rpc(crates[0], 0, "inspect", Vec::new(), ResponseKind::Text)?;

    let mut switch = server.switch_scene(target)?;
    info!("switching to {} (switch {})", config.target_scene, switch.id());
    let resolved = pump(&mut server, &mut clients, config.ticks, |_, _| switch.try_outcome().is_some());

    match inspect.try_outcome() {
        Some(Ok(value)) => info!("inspect answered: {:?}", value),
        Some(Err(e)) => warn!("inspect failed: {}", e),
        None => warn!("inspect still pending"),
    }

    for event in server.events() {
        if let SessionEvent::SwitchResolved { switch_id, outcome } = event {
            info!("switch {} resolved: {:?}", switch_id, outcome);
        }
    }
    if !resolved {
        anyhow::bail!("switch {} did not resolve within {} ticks", switch.id(), config.ticks);
    }
    let outcome = switch.wait().await;
    for client in &clients {
        info!(
            "client {}: scene {}, {} objects",
            client.local_id(),
            client.scenes().active_scene(),
            client.registry().len()
        );
    }
    if outcome != SwitchOutcome::Completed {
        anyhow::bail!("scene switch ended as {:?}", outcome);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();
    init_logging(&config);

    info!("netsyncd v{} - netsync loopback demo", env!("CARGO_PKG_VERSION"));

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Demo failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
