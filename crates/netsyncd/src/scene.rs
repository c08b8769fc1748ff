//! Scene switch coordination
//!
//! The coordinator is a pure state machine: it performs no I/O and returns
//! [`SceneAction`]s that the session executes. Loading and unloading are the
//! only multi-turn steps; the loader reports completion by operation id and
//! the session feeds that back through
//! [`SceneCoordinator::on_operation_complete`].
//!
//! Server sequence:
//! destroy tracked scene objects → record progress → (prefab sync) broadcast
//! the switch → load → move persistent objects → unload old → register the
//! new scene's objects → self-acknowledge when host → idle.
//!
//! Client sequence:
//! load → move persistent objects → unload old → apply soft-sync bindings →
//! acknowledge → idle (then start a queued instruction, if any).

use netsync_core::{NetworkId, PeerId, SceneIndex, SwitchId};
use std::collections::{BTreeSet, HashMap, VecDeque};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Loader operation identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneOpId(pub u64);

/// Scene errors (caller misuse)
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SceneError {
    #[error("a scene switch is already in progress")]
    AlreadySwitching,
    #[error("scene {0} is not registered")]
    UnknownScene(SceneIndex),
    #[error("scene {0} is already active")]
    AlreadyActive(SceneIndex),
    #[error("only the server can start a scene switch")]
    NotServer,
}

/// How a switch progress record ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// Server finished and every required peer acknowledged
    Completed,
    /// A newer switch started before this one resolved
    Superseded,
    /// The server's loader failed
    Aborted,
}

/// Work for the session to carry out
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SceneAction {
    /// Destroy (and broadcast the destruction of) every tracked scene object
    DestroySceneObjects,
    /// Tell clients to switch now (prefab sync)
    BroadcastSwitch { scene: SceneIndex, switch_id: SwitchId },
    BeginLoad { op: SceneOpId, scene: SceneIndex },
    /// Move every persistent object into the newly loaded scene
    MovePersistentObjects { scene: SceneIndex },
    BeginUnload { op: SceneOpId, scene: SceneIndex },
    /// Server: register the new scene's objects and announce them
    RegisterSceneObjects { scene: SceneIndex, switch_id: SwitchId },
    /// Client: bind soft-sync objects (prefab sync: drop the scene baseline)
    ApplySoftSync {
        scene: SceneIndex,
        lookup: HashMap<u64, NetworkId>,
    },
    /// Client: acknowledge the switch to the server
    SendCompleted { switch_id: SwitchId },
}

/// Result of a client acknowledgement
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckOutcome {
    /// The initial-scene sentinel; never tracked
    NilIgnored,
    /// No such record (never created, or already resolved)
    Unknown,
    Recorded,
    Resolved,
}

/// Server-side record of one scene transition
#[derive(Debug)]
pub struct SwitchProgress {
    pub switch_id: SwitchId,
    pub scene: SceneIndex,
    required: BTreeSet<PeerId>,
    completed: BTreeSet<PeerId>,
    server_done: bool,
    completion: Option<oneshot::Sender<SwitchOutcome>>,
}

impl SwitchProgress {
    fn is_resolved(&self) -> bool {
        self.server_done && self.required.is_subset(&self.completed)
    }

    fn finish(&mut self, outcome: SwitchOutcome) {
        if let Some(tx) = self.completion.take() {
            let _ = tx.send(outcome);
        }
    }

    /// Peers that still have to acknowledge
    pub fn pending_peers(&self) -> Vec<PeerId> {
        self.required.difference(&self.completed).copied().collect()
    }

    pub fn server_done(&self) -> bool {
        self.server_done
    }
}

/// Caller's view of a switch started with
/// [`SceneCoordinator::request_switch`]
#[derive(Debug)]
pub struct SwitchHandle {
    id: SwitchId,
    rx: oneshot::Receiver<SwitchOutcome>,
    outcome: Option<SwitchOutcome>,
}

impl SwitchHandle {
    pub fn id(&self) -> SwitchId {
        self.id
    }

    pub fn try_outcome(&mut self) -> Option<SwitchOutcome> {
        if self.outcome.is_none() {
            self.outcome = match self.rx.try_recv() {
                Ok(outcome) => Some(outcome),
                Err(oneshot::error::TryRecvError::Empty) => None,
                Err(oneshot::error::TryRecvError::Closed) => Some(SwitchOutcome::Superseded),
            };
        }
        self.outcome
    }

    pub async fn wait(self) -> SwitchOutcome {
        match self.outcome {
            Some(outcome) => outcome,
            None => self.rx.await.unwrap_or(SwitchOutcome::Superseded),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Loading(SceneOpId),
    Unloading(SceneOpId),
}

#[derive(Debug)]
struct SwitchPlan {
    switch_id: SwitchId,
    target: SceneIndex,
    previous: SceneIndex,
    previous_switch: SwitchId,
    stage: Stage,
    lookup: HashMap<u64, NetworkId>,
}

#[derive(Debug)]
enum State {
    Idle,
    Switching(SwitchPlan),
}

#[derive(Clone, Copy, Debug)]
enum Role {
    Server {
        host_is_client: bool,
        use_prefab_sync: bool,
    },
    Client,
}

#[derive(Debug)]
struct QueuedSwitch {
    target: SceneIndex,
    switch_id: SwitchId,
    lookup: HashMap<u64, NetworkId>,
}

/// Scene transition state machine for one peer
#[derive(Debug)]
pub struct SceneCoordinator {
    role: Role,
    state: State,
    scene_count: u32,
    /// Server: scene clients should be in. Client: last scene switched to
    current_scene: SceneIndex,
    current_switch: SwitchId,
    next_op: u64,
    progresses: HashMap<SwitchId, SwitchProgress>,
    queued: VecDeque<QueuedSwitch>,
    resolved: Vec<(SwitchId, SwitchOutcome)>,
    /// Client: last switch acknowledged to the server
    last_completed: SwitchId,
}

impl SceneCoordinator {
    fn new(role: Role, initial: SceneIndex, scene_count: u32) -> Self {
        Self {
            role,
            state: State::Idle,
            scene_count,
            current_scene: initial,
            current_switch: SwitchId::NIL,
            next_op: 1,
            progresses: HashMap::new(),
            queued: VecDeque::new(),
            resolved: Vec::new(),
            last_completed: SwitchId::NIL,
        }
    }

    pub fn server(initial: SceneIndex, scene_count: u32, host_is_client: bool, use_prefab_sync: bool) -> Self {
        Self::new(
            Role::Server {
                host_is_client,
                use_prefab_sync,
            },
            initial,
            scene_count,
        )
    }

    pub fn client(initial: SceneIndex, scene_count: u32) -> Self {
        Self::new(Role::Client, initial, scene_count)
    }

    pub fn is_switching(&self) -> bool {
        matches!(self.state, State::Switching(_))
    }

    /// Scene announced to joining clients
    pub fn current_scene(&self) -> SceneIndex {
        self.current_scene
    }

    /// Progress id announced to joining clients (NIL for the initial scene)
    pub fn current_switch_id(&self) -> SwitchId {
        self.current_switch
    }

    pub fn progress(&self, id: SwitchId) -> Option<&SwitchProgress> {
        self.progresses.get(&id)
    }

    pub fn progress_count(&self) -> usize {
        self.progresses.len()
    }

    /// Drain records resolved since the last call
    pub fn take_resolved(&mut self) -> Vec<(SwitchId, SwitchOutcome)> {
        std::mem::take(&mut self.resolved)
    }

    fn alloc_op(&mut self) -> SceneOpId {
        let op = SceneOpId(self.next_op);
        self.next_op += 1;
        op
    }

    /// Server: start switching every peer to `target`
    pub fn request_switch(
        &mut self,
        target: SceneIndex,
        connected: &[PeerId],
    ) -> Result<(SwitchHandle, Vec<SceneAction>), SceneError> {
        let Role::Server {
            host_is_client,
            use_prefab_sync,
        } = self.role
        else {
            return Err(SceneError::NotServer);
        };
        if self.is_switching() {
            return Err(SceneError::AlreadySwitching);
        }
        if target.0 >= self.scene_count {
            return Err(SceneError::UnknownScene(target));
        }
        if target == self.current_scene {
            return Err(SceneError::AlreadyActive(target));
        }

        for (id, mut progress) in self.progresses.drain() {
            debug!("scene switch {} superseded", id);
            progress.finish(SwitchOutcome::Superseded);
            self.resolved.push((id, SwitchOutcome::Superseded));
        }

        let switch_id = SwitchId::generate();
        let mut required: BTreeSet<PeerId> =
            connected.iter().copied().filter(|p| !p.is_server()).collect();
        if host_is_client {
            required.insert(PeerId::SERVER);
        }
        let (tx, rx) = oneshot::channel();
        self.progresses.insert(
            switch_id,
            SwitchProgress {
                switch_id,
                scene: target,
                required,
                completed: BTreeSet::new(),
                server_done: false,
                completion: Some(tx),
            },
        );

        let mut actions = vec![SceneAction::DestroySceneObjects];
        if use_prefab_sync {
            actions.push(SceneAction::BroadcastSwitch {
                scene: target,
                switch_id,
            });
        }
        let op = self.alloc_op();
        actions.push(SceneAction::BeginLoad { op, scene: target });

        info!("switching to {} (switch {})", target, switch_id);
        self.state = State::Switching(SwitchPlan {
            switch_id,
            target,
            previous: self.current_scene,
            previous_switch: self.current_switch,
            stage: Stage::Loading(op),
            lookup: HashMap::new(),
        });
        self.current_scene = target;
        self.current_switch = switch_id;

        Ok((
            SwitchHandle {
                id: switch_id,
                rx,
                outcome: None,
            },
            actions,
        ))
    }

    /// Client: the server asked us to switch
    pub fn on_switch_instruction(
        &mut self,
        target: SceneIndex,
        switch_id: SwitchId,
        lookup: HashMap<u64, NetworkId>,
        active_scene: SceneIndex,
    ) -> Vec<SceneAction> {
        if !matches!(self.role, Role::Client) {
            warn!("switch instruction received by the server");
            return Vec::new();
        }
        if target.0 >= self.scene_count {
            warn!("server requested a switch to unregistered {}", target);
            return Vec::new();
        }
        if self.is_switching() {
            debug!("queueing switch to {} behind the current one", target);
            self.queued.push_back(QueuedSwitch {
                target,
                switch_id,
                lookup,
            });
            return Vec::new();
        }
        self.start_client_switch(target, switch_id, lookup, active_scene)
    }

    fn start_client_switch(
        &mut self,
        target: SceneIndex,
        switch_id: SwitchId,
        lookup: HashMap<u64, NetworkId>,
        active_scene: SceneIndex,
    ) -> Vec<SceneAction> {
        if target == active_scene {
            // already there: bind anything new and acknowledge
            let mut actions = Vec::new();
            if !lookup.is_empty() {
                actions.push(SceneAction::ApplySoftSync {
                    scene: target,
                    lookup,
                });
            }
            if !switch_id.is_nil() && switch_id != self.last_completed {
                self.last_completed = switch_id;
                actions.push(SceneAction::SendCompleted { switch_id });
            }
            self.current_scene = target;
            return actions;
        }

        let op = self.alloc_op();
        self.state = State::Switching(SwitchPlan {
            switch_id,
            target,
            previous: active_scene,
            previous_switch: self.current_switch,
            stage: Stage::Loading(op),
            lookup,
        });
        vec![SceneAction::BeginLoad { op, scene: target }]
    }

    /// A loader operation finished
    pub fn on_operation_complete(&mut self, op: SceneOpId) -> Vec<SceneAction> {
        let stage = match &self.state {
            State::Switching(plan) if plan.stage == Stage::Loading(op) || plan.stage == Stage::Unloading(op) => {
                plan.stage
            }
            _ => {
                debug!("ignoring stale scene operation {:?}", op);
                return Vec::new();
            }
        };

        match stage {
            Stage::Loading(_) => {
                let unload = self.alloc_op();
                let State::Switching(plan) = &mut self.state else {
                    return Vec::new();
                };
                plan.stage = Stage::Unloading(unload);
                vec![
                    SceneAction::MovePersistentObjects { scene: plan.target },
                    SceneAction::BeginUnload {
                        op: unload,
                        scene: plan.previous,
                    },
                ]
            }
            Stage::Unloading(_) => {
                let State::Switching(plan) = std::mem::replace(&mut self.state, State::Idle) else {
                    return Vec::new();
                };
                match self.role {
                    Role::Server { host_is_client, .. } => self.finish_server_switch(plan, host_is_client),
                    Role::Client => self.finish_client_switch(plan),
                }
            }
        }
    }

    fn finish_server_switch(&mut self, plan: SwitchPlan, host_is_client: bool) -> Vec<SceneAction> {
        info!("server finished switching to {}", plan.target);
        if let Some(progress) = self.progresses.get_mut(&plan.switch_id) {
            progress.server_done = true;
            if host_is_client {
                progress.completed.insert(PeerId::SERVER);
            }
        }
        self.resolve_ready();
        vec![SceneAction::RegisterSceneObjects {
            scene: plan.target,
            switch_id: plan.switch_id,
        }]
    }

    fn finish_client_switch(&mut self, plan: SwitchPlan) -> Vec<SceneAction> {
        info!("client finished switching to {}", plan.target);
        self.current_scene = plan.target;
        let mut actions = vec![SceneAction::ApplySoftSync {
            scene: plan.target,
            lookup: plan.lookup,
        }];
        if !plan.switch_id.is_nil() {
            self.last_completed = plan.switch_id;
            actions.push(SceneAction::SendCompleted {
                switch_id: plan.switch_id,
            });
        }
        if let Some(next) = self.queued.pop_front() {
            let active = self.current_scene;
            actions.extend(self.start_client_switch(next.target, next.switch_id, next.lookup, active));
        }
        actions
    }

    /// Abandon the running switch after a loader failure.
    ///
    /// A switch that never finished loading puts the previous scene and
    /// switch id back. Its progress record ends as [`SwitchOutcome::Aborted`].
    pub fn abort_switch(&mut self) {
        if let State::Switching(plan) = std::mem::replace(&mut self.state, State::Idle) {
            warn!("scene switch {} aborted", plan.switch_id);
            if matches!(plan.stage, Stage::Loading(_)) {
                self.current_scene = plan.previous;
                self.current_switch = plan.previous_switch;
            }
            if let Some(mut progress) = self.progresses.remove(&plan.switch_id) {
                progress.finish(SwitchOutcome::Aborted);
                self.resolved.push((plan.switch_id, SwitchOutcome::Aborted));
            }
        }
        self.queued.clear();
    }

    /// Server: a client reported it finished switching
    pub fn on_ack(&mut self, peer: PeerId, switch_id: SwitchId) -> AckOutcome {
        if switch_id.is_nil() {
            return AckOutcome::NilIgnored;
        }
        let Some(progress) = self.progresses.get_mut(&switch_id) else {
            debug!("ack for unknown switch {} from {}", switch_id, peer);
            return AckOutcome::Unknown;
        };
        progress.completed.insert(peer);
        if self.resolve_ready().contains(&switch_id) {
            AckOutcome::Resolved
        } else {
            AckOutcome::Recorded
        }
    }

    /// Server: a peer finished joining; it must acknowledge open switches
    pub fn on_peer_connected(&mut self, peer: PeerId) {
        for progress in self.progresses.values_mut() {
            progress.required.insert(peer);
        }
    }

    /// Server: drop a peer from every record; returns the records that
    /// resolved because of it
    pub fn on_peer_disconnected(&mut self, peer: PeerId) -> Vec<SwitchId> {
        for progress in self.progresses.values_mut() {
            progress.required.remove(&peer);
            progress.completed.remove(&peer);
        }
        self.resolve_ready()
    }

    fn resolve_ready(&mut self) -> Vec<SwitchId> {
        let ready: Vec<SwitchId> = self
            .progresses
            .values()
            .filter(|p| p.is_resolved())
            .map(|p| p.switch_id)
            .collect();
        for id in &ready {
            if let Some(mut progress) = self.progresses.remove(id) {
                info!("scene switch {} completed", id);
                progress.finish(SwitchOutcome::Completed);
                self.resolved.push((*id, SwitchOutcome::Completed));
            }
        }
        ready
    }
}
