//! Per-connection state machine. Drives the protocol codec over one TCP
//! stream, dispatches by verb, and owns the "destination" pointer the ring
//! relinks on join/leave.
//!
//! Grounded in `original_source/tornado_server/participant.py`: the
//! OPENING/UP/CLOSING states, the HELLO/MSG/BYE dispatch table and the
//! error-funnels-to-BYE rule are the same; `bye_on_error`'s decorator
//! becomes the `run` loop's uniform "any exit path calls `bye()` first"
//! structure, the direct idiom for a scope guard in Rust.

use std::sync::atomic::{AtomicU8, Ordering as AtomicOrdering};
use std::sync::Arc;

use bytes::BytesMut;
use futures::StreamExt;
use log::{debug, info, warn};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::codec::FramedRead;

use conga_protocol::{splice_message_id, Frame, FrameCodec, RawFrame, Verb};
use conga_registry::{CongaId, MemberId, Registry, RegistryError};

use crate::conga::JoinError;
use crate::engine::{ConnectionId, Engine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ParticipantState {
    Opening = 0,
    Up = 1,
    Closing = 2,
}

fn decode_state(raw: u8) -> ParticipantState {
    match raw {
        0 => ParticipantState::Opening,
        1 => ParticipantState::Up,
        _ => ParticipantState::Closing,
    }
}

/// What gets pushed onto a participant's write-half channel.
enum Outbound {
    Frame(BytesMut),
    Close,
}

/// A cheap, cloneable reference to a participant's sender, state and
/// destination pointer. The ring stores these instead of the connection
/// task itself; relinking a neighbor's `destination` is just writing through
/// the `Arc<Mutex<..>>` that the owning task also holds a clone of.
#[derive(Clone)]
pub struct ParticipantHandle {
    member_id: MemberId,
    sender: mpsc::UnboundedSender<Outbound>,
    state: Arc<AtomicU8>,
    destination: Arc<AsyncMutex<Option<ParticipantHandle>>>,
}

impl ParticipantHandle {
    pub fn member_id(&self) -> MemberId {
        self.member_id
    }

    pub fn state(&self) -> ParticipantState {
        decode_state(self.state.load(AtomicOrdering::SeqCst))
    }

    pub async fn set_destination(&self, destination: Option<ParticipantHandle>) {
        *self.destination.lock().await = destination;
    }

    pub async fn destination_member_id(&self) -> Option<MemberId> {
        self.destination.lock().await.as_ref().map(|h| h.member_id)
    }

    /// Forwards already-framed bytes to this participant's write half.
    /// Fails if that participant's connection task is no longer reading its
    /// channel -- the channel-based analogue of the original's
    /// `StreamClosedError` on a direct synchronous write.
    fn send_frame(&self, bytes: BytesMut) -> Result<(), ()> {
        self.sender.send(Outbound::Frame(bytes)).map_err(|_| ())
    }

    /// Builds a detached handle with no backing connection, for ring-algorithm
    /// unit tests that never actually forward bytes.
    #[cfg(test)]
    pub fn detached(member_id: MemberId) -> ParticipantHandle {
        let (sender, _receiver) = mpsc::unbounded_channel();
        ParticipantHandle {
            member_id,
            sender,
            state: Arc::new(AtomicU8::new(ParticipantState::Up as u8)),
            destination: Arc::new(AsyncMutex::new(None)),
        }
    }
}

#[derive(Debug, Error)]
enum HelloError {
    #[error("missing User-ID header")]
    MissingUserId,
    #[error("User-ID {0:?} is not a valid member id")]
    InvalidUserId(String),
    #[error("member {0} has no registry entry")]
    UnknownMember(MemberId),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Join(#[from] JoinError),
}

/// One accepted connection. Lives for the lifetime of the TCP stream; `run`
/// drives it to completion and always leaves the ring and registry in a
/// consistent state before returning.
pub struct Participant {
    connection_id: ConnectionId,
    member_id: Option<MemberId>,
    conga_id: Option<CongaId>,
    sender: mpsc::UnboundedSender<Outbound>,
    state: Arc<AtomicU8>,
    destination: Arc<AsyncMutex<Option<ParticipantHandle>>>,
    engine: Engine,
    registry: Arc<dyn Registry>,
    conga: Option<crate::engine::CongaHandle>,
}

impl Participant {
    fn state(&self) -> ParticipantState {
        decode_state(self.state.load(AtomicOrdering::SeqCst))
    }

    fn set_state(&self, state: ParticipantState) {
        self.state.store(state as u8, AtomicOrdering::SeqCst);
    }

    fn handle(&self) -> ParticipantHandle {
        ParticipantHandle {
            member_id: self.member_id.expect("handle() only called once joined"),
            sender: self.sender.clone(),
            state: self.state.clone(),
            destination: self.destination.clone(),
        }
    }

    async fn handle_hello(&mut self, frame: &Frame) -> Result<(), HelloError> {
        let user_id = frame.user_id().ok_or(HelloError::MissingUserId)?.trim();
        let member_id: MemberId = user_id
            .parse()
            .map_err(|_| HelloError::InvalidUserId(user_id.to_string()))?;

        let conga_id = self
            .registry
            .lookup_conga(member_id)
            .await?
            .ok_or(HelloError::UnknownMember(member_id))?;

        self.member_id = Some(member_id);
        self.conga_id = Some(conga_id);

        let handle = self.handle();
        let conga = self.engine.get_or_create_conga(conga_id).await;
        {
            let mut guard = conga.lock().await;
            guard.join(handle).await?;
        }
        self.conga = Some(conga);
        self.set_state(ParticipantState::Up);
        info!(
            "connection {}: member {} joined conga {}",
            self.connection_id, member_id, conga_id
        );
        Ok(())
    }

    async fn handle_msg(&mut self, raw: RawFrame) {
        let destination = match self.destination.lock().await.clone() {
            Some(destination) => destination,
            None => {
                debug!("connection {}: no destination yet, dropping MSG", self.connection_id);
                return;
            }
        };

        let conga = self.conga.clone().expect("UP implies a conga was joined");
        let member_id = self.member_id.expect("UP implies member_id is set");

        let mut guard = conga.lock().await;

        let (message_id, header_bytes) = match raw.frame.message_id() {
            Some(id) => (id.to_string(), BytesMut::from(&raw.header_bytes[..])),
            None => {
                let id = guard.new_message(member_id);
                let spliced = splice_message_id(&raw.header_bytes, &id);
                (id, spliced)
            }
        };

        let stop = guard.stop_loop(&message_id, destination.member_id());
        drop(guard);
        if stop {
            debug!("connection {}: message {} completed its lap", self.connection_id, message_id);
            return;
        }

        let mut out = header_bytes;
        out.extend_from_slice(&raw.frame.body);

        if destination.send_frame(out).is_err() {
            warn!(
                "connection {}: destination {} is gone, running BYE cleanup on self",
                self.connection_id,
                destination.member_id()
            );
            self.bye().await;
        }
    }

    async fn bye(&mut self) {
        if self.state() == ParticipantState::Closing {
            return;
        }

        if let (Some(conga), Some(member_id)) = (self.conga.clone(), self.member_id) {
            if let Err(err) = conga.lock().await.leave(member_id) {
                warn!("connection {}: leave failed: {}", self.connection_id, err);
            }
        }

        if let Some(member_id) = self.member_id {
            if let Err(err) = self.registry.delete_membership(member_id).await {
                warn!("connection {}: registry delete failed: {}", self.connection_id, err);
            }
        }

        *self.destination.lock().await = None;
        let _ = self.sender.send(Outbound::Close);
        self.set_state(ParticipantState::Closing);
        info!(
            "connection {}: BYE cleanup complete (member {:?}, conga {:?})",
            self.connection_id, self.member_id, self.conga_id
        );
    }

    async fn dispatch(&mut self, raw: RawFrame) {
        match (self.state(), raw.frame.verb) {
            (ParticipantState::Opening, Verb::Hello) => {
                if let Err(err) = self.handle_hello(&raw.frame).await {
                    warn!("connection {}: HELLO rejected: {}", self.connection_id, err);
                    self.bye().await;
                }
            }
            (ParticipantState::Opening, other) => {
                warn!("connection {}: {:?} received before HELLO", self.connection_id, other);
                self.bye().await;
            }
            (ParticipantState::Up, Verb::Msg) => {
                self.handle_msg(raw).await;
            }
            (ParticipantState::Up, Verb::Bye) => {
                self.bye().await;
            }
            (ParticipantState::Up, Verb::Hello) => {
                warn!("connection {}: duplicate HELLO", self.connection_id);
                self.bye().await;
            }
            (ParticipantState::Closing, _) => {}
        }
    }
}

/// Drives one accepted TCP connection to completion: reads frames, dispatches
/// them, and runs BYE cleanup on every exit path (clean BYE, protocol error,
/// or unexpected stream close) exactly once.
pub async fn run(connection_id: ConnectionId, stream: TcpStream, engine: Engine, registry: Arc<dyn Registry>) {
    let (read_half, mut write_half) = stream.into_split();
    let (sender, mut receiver) = mpsc::unbounded_channel::<Outbound>();

    let writer_task = tokio::spawn(async move {
        while let Some(message) = receiver.recv().await {
            match message {
                Outbound::Frame(bytes) => {
                    if let Err(err) = write_half.write_all(&bytes).await {
                        debug!("connection {}: write error, closing: {}", connection_id, err);
                        break;
                    }
                }
                Outbound::Close => break,
            }
        }
        let _ = write_half.shutdown().await;
    });

    let mut participant = Participant {
        connection_id,
        member_id: None,
        conga_id: None,
        sender,
        state: Arc::new(AtomicU8::new(ParticipantState::Opening as u8)),
        destination: Arc::new(AsyncMutex::new(None)),
        engine,
        registry,
        conga: None,
    };

    let mut frames = FramedRead::new(read_half, FrameCodec::new());

    loop {
        match frames.next().await {
            Some(Ok(raw)) => {
                participant.dispatch(raw).await;
                if participant.state() == ParticipantState::Closing {
                    break;
                }
            }
            Some(Err(err)) => {
                warn!("connection {}: protocol error: {}", connection_id, err);
                participant.bye().await;
                break;
            }
            None => {
                if participant.state() != ParticipantState::Closing {
                    info!("connection {}: stream closed without BYE", connection_id);
                }
                participant.bye().await;
                break;
            }
        }
    }

    // Idempotent safety net: every break above already called bye(), but a
    // future added exit path is covered too.
    participant.bye().await;
    let _ = writer_task.await;
}
