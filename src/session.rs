//! Session registry and fan-out.
//!
//! Each connected viewer owns a [`SessionHandle`] with two receivers:
//!
//! - an ordered, bounded event queue for status, log and control messages
//! - a latest-value video slot; a slow viewer only ever sees the newest frame
//!
//! Producers never wait on viewers. A full event queue drops the message for
//! that viewer only, and a video push overwrites whatever frame the viewer has
//! not picked up yet.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Local};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::protocol::Outbound;
use crate::types::EncodedFrame;

/// Default number of queued events per session before new ones are dropped
pub const DEFAULT_QUEUE_DEPTH: usize = 256;

/// Unique identifier of a connected session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// A connected viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub connected_at: DateTime<Local>,
}

/// Receiving side of a session, held by its transport task.
#[derive(Debug)]
pub struct SessionHandle {
    pub session: Session,
    pub events: mpsc::Receiver<Outbound>,
    pub video: watch::Receiver<Option<EncodedFrame>>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.session.id
    }
}

#[derive(Debug)]
struct SessionSink {
    session: Session,
    events: mpsc::Sender<Outbound>,
    video: watch::Sender<Option<EncodedFrame>>,
}

impl SessionSink {
    fn deliver(&self, message: Outbound) -> bool {
        match self.events.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(session = %self.session.id, "Session queue full, event dropped");
                false
            }
            // The transport task already exited; unregister follows shortly
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Registry of connected sessions keyed by [`SessionId`].
///
/// Registration, removal and every broadcast take the same lock, so a removed
/// session never receives another message and a broadcast never sees a
/// half-registered one.
#[derive(Debug)]
pub struct SessionHub {
    sessions: Mutex<HashMap<SessionId, SessionSink>>,
    next_id: AtomicU64,
    queue_depth: usize,
}

impl Default for SessionHub {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_DEPTH)
    }
}

impl SessionHub {
    pub fn new(queue_depth: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            queue_depth: queue_depth.max(1),
        }
    }

    /// Register a new session and queue `initial` messages for it ahead of any
    /// broadcast.
    pub fn register(&self, initial: Vec<Outbound>) -> SessionHandle {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let session = Session { id, connected_at: Local::now() };

        let (events_tx, events_rx) = mpsc::channel(self.queue_depth.max(initial.len()));
        let (video_tx, video_rx) = watch::channel(None);
        let sink = SessionSink { session, events: events_tx, video: video_tx };

        for message in initial {
            sink.deliver(message);
        }

        self.lock().insert(id, sink);
        debug!(session = %id, "Session registered");

        SessionHandle { session, events: events_rx, video: video_rx }
    }

    /// Remove a session. Returns `None` if it was already gone.
    pub fn unregister(&self, id: SessionId) -> Option<Session> {
        let removed = self.lock().remove(&id).map(|sink| sink.session);
        if removed.is_some() {
            debug!(session = %id, "Session unregistered");
        }
        removed
    }

    /// Queue `message` for every session. Returns how many accepted it.
    pub fn broadcast(&self, message: Outbound) -> usize {
        let sessions = self.lock();
        sessions.values().filter(|sink| sink.deliver(message.clone())).count()
    }

    /// Queue `message` for one session. Returns `false` if it is gone or full.
    pub fn send_to(&self, id: SessionId, message: Outbound) -> bool {
        self.lock().get(&id).is_some_and(|sink| sink.deliver(message))
    }

    /// Replace the pending video frame of every session.
    pub fn broadcast_video(&self, frame: &EncodedFrame) -> usize {
        let sessions = self.lock();
        for sink in sessions.values() {
            sink.video.send_replace(Some(frame.clone()));
        }
        sessions.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Currently connected sessions, oldest first.
    pub fn sessions(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.lock().values().map(|sink| sink.session).collect();
        sessions.sort_by_key(|session| session.id);
        sessions
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, SessionSink>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Frame;
    use image::RgbImage;

    fn drain(handle: &mut SessionHandle) -> Vec<Outbound> {
        let mut messages = Vec::new();
        while let Ok(message) = handle.events.try_recv() {
            messages.push(message);
        }
        messages
    }

    #[test]
    fn initial_messages_come_first() {
        let hub = SessionHub::default();
        let mut handle = hub.register(vec![Outbound::LightStatus { status: true }]);
        hub.broadcast(Outbound::LightStatus { status: false });

        assert_eq!(drain(&mut handle), vec![
            Outbound::LightStatus { status: true },
            Outbound::LightStatus { status: false },
        ]);
    }

    #[test]
    fn ids_are_unique_and_ordered() {
        let hub = SessionHub::default();
        let a = hub.register(Vec::new());
        let b = hub.register(Vec::new());

        assert_ne!(a.id(), b.id());
        assert_eq!(hub.sessions().iter().map(|s| s.id).collect::<Vec<_>>(), vec![a.id(), b.id()]);
    }

    #[test]
    fn unregistered_session_receives_nothing() {
        let hub = SessionHub::default();
        let mut gone = hub.register(Vec::new());
        let mut stays = hub.register(Vec::new());

        assert!(hub.unregister(gone.id()).is_some());
        assert!(hub.unregister(gone.id()).is_none());

        assert_eq!(hub.broadcast(Outbound::LightStatus { status: true }), 1);
        assert!(!hub.send_to(gone.id(), Outbound::LightStatus { status: true }));
        assert!(drain(&mut gone).is_empty());
        assert_eq!(drain(&mut stays).len(), 1);
        assert_eq!(hub.len(), 1);
    }

    #[test]
    fn unicast_reaches_only_target() {
        let hub = SessionHub::default();
        let mut target = hub.register(Vec::new());
        let mut other = hub.register(Vec::new());

        assert!(hub.send_to(target.id(), Outbound::PhotoTaken { timestamp: "now".into() }));
        assert_eq!(drain(&mut target).len(), 1);
        assert!(drain(&mut other).is_empty());
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let hub = SessionHub::new(2);
        let mut slow = hub.register(Vec::new());

        for status in [true, false, true] {
            hub.broadcast(Outbound::LightStatus { status });
        }

        assert_eq!(drain(&mut slow).len(), 2);
    }

    #[test]
    fn video_slot_keeps_latest_frame_only() {
        let hub = SessionHub::default();
        let mut handle = hub.register(Vec::new());

        let first = Frame::captured(RgbImage::new(4, 4)).encode(50).unwrap();
        let second = Frame::captured(RgbImage::new(8, 8)).encode(50).unwrap();
        hub.broadcast_video(&first);
        hub.broadcast_video(&second);

        assert!(handle.video.has_changed().unwrap());
        assert_eq!(handle.video.borrow_and_update().as_ref(), Some(&second));
        assert!(!handle.video.has_changed().unwrap());
    }

    #[test]
    fn concurrent_connects_are_counted_once() {
        let hub = std::sync::Arc::new(SessionHub::default());

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let hub = hub.clone();
                std::thread::spawn(move || {
                    let ids: Vec<_> = (0..50).map(|_| hub.register(Vec::new()).id()).collect();
                    for id in ids.iter().step_by(2) {
                        hub.unregister(*id);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(hub.len(), 8 * 25);
    }
}
