//! Tag-indexed message dispatch
//!
//! Each role gets its own table so a message the role never accepts is
//! told apart from a tag nobody knows. Handlers run to completion on the
//! caller's thread and receive the payload as a borrowed reader.

use crate::session::SessionError;
use netsync_core::{PackedReader, PeerId};
use netsync_net::{ChannelId, Frame, MessageType, WireContext, WireMessage};
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

/// Message handler over a session context `C`
pub type Handler<C> = fn(&mut C, &mut Inbound<'_>) -> Result<(), SessionError>;

/// One inbound message, valid for the duration of the handler call
#[derive(Debug)]
pub struct Inbound<'a> {
    pub from: PeerId,
    pub channel: ChannelId,
    pub message_type: MessageType,
    pub reader: PackedReader<'a>,
}

impl Inbound<'_> {
    /// Decode the whole payload as `M`
    pub fn read<M: WireMessage>(&mut self, ctx: &WireContext) -> Result<M, SessionError> {
        let message = M::decode(&mut self.reader, ctx)?;
        self.reader.finish().map_err(netsync_core::Error::from)?;
        Ok(message)
    }
}

/// What happened to a frame
#[derive(Debug)]
pub enum DispatchOutcome {
    Handled,
    /// Tag outside the protocol
    UnknownTag(u8),
    /// Valid tag this role does not accept
    Unhandled(MessageType),
    Failed(SessionError),
}

/// Handler table
pub struct Dispatcher<C> {
    handlers: HashMap<MessageType, Handler<C>>,
}

impl<C> Dispatcher<C> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Install a handler; a second registration for a type replaces the first
    pub fn register(&mut self, message_type: MessageType, handler: Handler<C>) {
        self.handlers.insert(message_type, handler);
    }

    pub fn accepts(&self, message_type: MessageType) -> bool {
        self.handlers.contains_key(&message_type)
    }

    pub fn dispatch(&self, ctx: &mut C, from: PeerId, channel: ChannelId, frame: &Frame) -> DispatchOutcome {
        let Ok(message_type) = frame.message_type() else {
            warn!("unknown message tag {} from {}", frame.tag, from);
            return DispatchOutcome::UnknownTag(frame.tag);
        };
        let Some(handler) = self.handlers.get(&message_type) else {
            warn!("{:?} from {} is not accepted here", message_type, from);
            return DispatchOutcome::Unhandled(message_type);
        };
        let mut inbound = Inbound {
            from,
            channel,
            message_type,
            reader: PackedReader::new(&frame.payload),
        };
        match handler(ctx, &mut inbound) {
            Ok(()) => DispatchOutcome::Handled,
            Err(e) => DispatchOutcome::Failed(e),
        }
    }
}

impl<C> Default for Dispatcher<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for Dispatcher<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<MessageType> = self.handlers.keys().copied().collect();
        types.sort_by_key(|t| *t as u8);
        f.debug_struct("Dispatcher").field("accepts", &types).finish()
    }
}

/// Every protocol message a session can handle
pub trait ProtocolHandlers {
    fn on_certificate_hail(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError>;
    fn on_hail_response(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError>;
    fn on_greetings(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError>;
    fn on_connection_request(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError>;
    fn on_connection_approved(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError>;
    fn on_add_object(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError>;
    fn on_add_objects(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError>;
    fn on_destroy_object(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError>;
    fn on_switch_scene(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError>;
    fn on_switch_scene_completed(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError>;
    fn on_change_owner(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError>;
    fn on_var_delta(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError>;
    fn on_var_update(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError>;
    fn on_server_rpc(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError>;
    fn on_server_rpc_request(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError>;
    fn on_server_rpc_response(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError>;
    fn on_client_rpc(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError>;
    fn on_client_rpc_request(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError>;
    fn on_client_rpc_response(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError>;
    fn on_custom_message(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError>;
    fn on_time_sync(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError>;
}

/// Messages a server accepts from clients
pub fn server_dispatcher<C: ProtocolHandlers>() -> Dispatcher<C> {
    let mut d = Dispatcher::new();
    d.register(MessageType::HailResponse, C::on_hail_response);
    d.register(MessageType::ConnectionRequest, C::on_connection_request);
    d.register(MessageType::ClientSwitchSceneCompleted, C::on_switch_scene_completed);
    d.register(MessageType::NetworkedVarDelta, C::on_var_delta);
    d.register(MessageType::NetworkedVarUpdate, C::on_var_update);
    d.register(MessageType::ServerRpc, C::on_server_rpc);
    d.register(MessageType::ServerRpcRequest, C::on_server_rpc_request);
    d.register(MessageType::ClientRpcResponse, C::on_client_rpc_response);
    d.register(MessageType::CustomMessage, C::on_custom_message);
    d
}

/// Messages a client accepts from the server
pub fn client_dispatcher<C: ProtocolHandlers>() -> Dispatcher<C> {
    let mut d = Dispatcher::new();
    d.register(MessageType::CertificateHail, C::on_certificate_hail);
    d.register(MessageType::Greetings, C::on_greetings);
    d.register(MessageType::ConnectionApproved, C::on_connection_approved);
    d.register(MessageType::AddObject, C::on_add_object);
    d.register(MessageType::AddObjects, C::on_add_objects);
    d.register(MessageType::DestroyObject, C::on_destroy_object);
    d.register(MessageType::SwitchScene, C::on_switch_scene);
    d.register(MessageType::ChangeOwner, C::on_change_owner);
    d.register(MessageType::NetworkedVarDelta, C::on_var_delta);
    d.register(MessageType::NetworkedVarUpdate, C::on_var_update);
    d.register(MessageType::ClientRpc, C::on_client_rpc);
    d.register(MessageType::ClientRpcRequest, C::on_client_rpc_request);
    d.register(MessageType::ServerRpcResponse, C::on_server_rpc_response);
    d.register(MessageType::CustomMessage, C::on_custom_message);
    d.register(MessageType::TimeSync, C::on_time_sync);
    d
}

#[cfg(test)]
mod tests {
    use super::*;
    use netsync_net::messages::DestroyObject;
    use netsync_core::NetworkId;

    #[derive(Default)]
    struct Recorder {
        seen: Vec<(&'static str, PeerId, usize)>,
    }

    macro_rules! record {
        ($($name:ident),* $(,)?) => {
            impl ProtocolHandlers for Recorder {
                $(
                    fn $name(&mut self, inbound: &mut Inbound<'_>) -> Result<(), SessionError> {
                        self.seen.push((stringify!($name), inbound.from, inbound.reader.remaining()));
                        Ok(())
                    }
                )*
            }
        };
    }

    record!(
        on_certificate_hail,
        on_hail_response,
        on_greetings,
        on_connection_request,
        on_connection_approved,
        on_add_object,
        on_add_objects,
        on_switch_scene,
        on_switch_scene_completed,
        on_change_owner,
        on_var_delta,
        on_var_update,
        on_server_rpc,
        on_server_rpc_request,
        on_server_rpc_response,
        on_client_rpc,
        on_client_rpc_request,
        on_client_rpc_response,
        on_custom_message,
        on_time_sync,
        on_destroy_object,
    );

    #[test]
    fn test_role_tables() {
        let server = server_dispatcher::<Recorder>();
        let client = client_dispatcher::<Recorder>();
        assert!(server.accepts(MessageType::ConnectionRequest));
        assert!(!server.accepts(MessageType::ConnectionApproved));
        assert!(client.accepts(MessageType::ConnectionApproved));
        assert!(!client.accepts(MessageType::ConnectionRequest));
        for shared in [MessageType::CustomMessage, MessageType::NetworkedVarDelta] {
            assert!(server.accepts(shared) && client.accepts(shared));
        }
    }

    #[test]
    fn test_dispatch_outcomes() {
        let client = client_dispatcher::<Recorder>();
        let mut recorder = Recorder::default();

        let frame = Frame::new(MessageType::DestroyObject, vec![5]);
        assert!(matches!(
            client.dispatch(&mut recorder, PeerId::SERVER, ChannelId::INTERNAL, &frame),
            DispatchOutcome::Handled
        ));
        assert_eq!(recorder.seen, vec![("on_destroy_object", PeerId::SERVER, 1)]);

        let unknown = Frame { tag: 200, payload: vec![] };
        assert!(matches!(
            client.dispatch(&mut recorder, PeerId::SERVER, ChannelId::INTERNAL, &unknown),
            DispatchOutcome::UnknownTag(200)
        ));

        let wrong_role = Frame::new(MessageType::ConnectionRequest, vec![]);
        assert!(matches!(
            client.dispatch(&mut recorder, PeerId::SERVER, ChannelId::INTERNAL, &wrong_role),
            DispatchOutcome::Unhandled(MessageType::ConnectionRequest)
        ));
        assert_eq!(recorder.seen.len(), 1);
    }

    fn failing(_: &mut Recorder, inbound: &mut Inbound<'_>) -> Result<(), SessionError> {
        let ctx = WireContext::default();
        inbound.read::<DestroyObject>(&ctx).map(|_| ())
    }

    #[test]
    fn test_inbound_read_rejects_trailing_bytes() {
        let mut dispatcher = Dispatcher::<Recorder>::new();
        dispatcher.register(MessageType::DestroyObject, failing);
        let mut recorder = Recorder::default();

        let ok = DestroyObject {
            network_id: NetworkId(3),
        }
        .to_frame(MessageType::DestroyObject, &WireContext::default())
        .unwrap();
        assert!(matches!(
            dispatcher.dispatch(&mut recorder, PeerId(1), ChannelId::INTERNAL, &ok),
            DispatchOutcome::Handled
        ));

        let mut trailing = ok.clone();
        trailing.payload.push(0);
        assert!(matches!(
            dispatcher.dispatch(&mut recorder, PeerId(1), ChannelId::INTERNAL, &trailing),
            DispatchOutcome::Failed(SessionError::Malformed(_))
        ));
    }
}
