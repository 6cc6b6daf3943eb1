use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use super::dialog::{Dialog, DialogId};
use crate::error::Result;
use crate::media::MediaSession;

/// The state of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// The INVITE arrived and has not been answered yet.
    Incoming,
    /// The 200 OK went out, the ACK is pending.
    Connecting,
    /// The ACK arrived, media is flowing.
    Confirmed,
    /// The call is over.
    Disconnected,
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallState::Incoming => "INCOMING",
            CallState::Connecting => "CONNECTING",
            CallState::Confirmed => "CONFIRMED",
            CallState::Disconnected => "DISCONNECTED",
        };
        f.write_str(name)
    }
}

/// A snapshot of a call, safe to hand out to callbacks.
#[derive(Debug, Clone)]
pub struct CallInfo {
    /// The Call-ID of the dialog.
    pub call_id: String,
    /// The state at the time of the snapshot.
    pub state: CallState,
    /// The local URI in its printed form.
    pub local_uri: String,
    /// The remote URI in its printed form.
    pub remote_uri: String,
    /// How long the call has been confirmed, zero before that.
    pub connect_duration: Duration,
}

struct Inner {
    dialog: Dialog,
    recording: PathBuf,
    state: Mutex<CallState>,
    media: Mutex<Option<MediaSession>>,
    connected_at: Mutex<Option<Instant>>,
    // Fired once the ACK arrives, stops the 200 OK
    // retransmissions.
    ack_tx: Mutex<Option<oneshot::Sender<()>>>,
}

/// An answered incoming call.
#[derive(Clone)]
pub struct Call(Arc<Inner>);

impl Call {
    pub(crate) fn new(dialog: Dialog, recording: PathBuf) -> Call {
        Call(Arc::new(Inner {
            dialog,
            recording,
            state: Mutex::new(CallState::Incoming),
            media: Mutex::new(None),
            connected_at: Mutex::new(None),
            ack_tx: Mutex::new(None),
        }))
    }

    /// Returns the dialog id of the call.
    pub fn id(&self) -> &DialogId {
        self.0.dialog.id()
    }

    /// Returns the Call-ID of the call.
    pub fn call_id(&self) -> &str {
        &self.0.dialog.id().call_id
    }

    pub(crate) fn dialog(&self) -> &Dialog {
        &self.0.dialog
    }

    /// Returns the path the inbound audio is recorded to.
    pub fn recording(&self) -> &Path {
        &self.0.recording
    }

    /// Returns the current state of the call.
    pub fn state(&self) -> CallState {
        *self.0.state.lock().expect("Lock failed")
    }

    /// Returns how long the call has been confirmed.
    pub fn connect_duration(&self) -> Duration {
        self.0
            .connected_at
            .lock()
            .expect("Lock failed")
            .map(|at| at.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    /// Takes a snapshot of the call.
    pub fn info(&self) -> CallInfo {
        CallInfo {
            call_id: self.0.dialog.id().call_id.clone(),
            state: self.state(),
            local_uri: self.0.dialog.local_uri().to_string(),
            remote_uri: self.0.dialog.remote_uri().to_string(),
            connect_duration: self.connect_duration(),
        }
    }

    /// Attaches the media session and moves to `Connecting`. The
    /// given sender is fired when the ACK arrives.
    pub(crate) fn answered(&self, media: MediaSession, ack_tx: oneshot::Sender<()>) {
        *self.0.media.lock().expect("Lock failed") = Some(media);
        *self.0.ack_tx.lock().expect("Lock failed") = Some(ack_tx);
        *self.0.state.lock().expect("Lock failed") = CallState::Connecting;
    }

    /// Handles the ACK of the 200 OK.
    ///
    /// Returns `false` when the call was not waiting for one, so
    /// that retransmitted ACKs do not fire callbacks twice.
    pub(crate) fn confirm(&self) -> bool {
        {
            let mut state = self.0.state.lock().expect("Lock failed");
            if *state != CallState::Connecting {
                return false;
            }
            *state = CallState::Confirmed;
        }
        *self.0.connected_at.lock().expect("Lock failed") = Some(Instant::now());
        if let Some(tx) = self.0.ack_tx.lock().expect("Lock failed").take() {
            let _ = tx.send(());
        }
        true
    }

    /// Moves the call to `Disconnected`.
    ///
    /// Returns `false` when it already was, so teardown runs only
    /// once no matter whether a BYE or a timeout got there first.
    pub(crate) fn disconnect(&self) -> bool {
        {
            let mut state = self.0.state.lock().expect("Lock failed");
            if *state == CallState::Disconnected {
                return false;
            }
            *state = CallState::Disconnected;
        }
        // Dropping the sender wakes a pending retransmit task.
        self.0.ack_tx.lock().expect("Lock failed").take();
        true
    }

    /// Stops the media session and finalizes the recording.
    pub(crate) async fn stop_media(&self) -> Result<()> {
        let media = self.0.media.lock().expect("Lock failed").take();
        match media {
            Some(media) => media.stop().await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("id", self.id())
            .field("state", &self.state())
            .finish()
    }
}
