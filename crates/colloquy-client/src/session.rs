//! Session controller: owns one remote live session end to end. Wires
//! microphone chunks into the socket, dispatches typed inbound events
//! into the transcript/status model and the playback scheduler, and
//! guarantees full teardown on end, error, or remote close.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::audio::{
    AudioBackend, AudioChunk, LinearResampler, PLAYBACK_SAMPLE_RATE_HZ,
};
use crate::error::{LiveError, Result};
use crate::pcm::{self, WireEnvelope};
use crate::playback::{PlaybackScheduler, PlaybackSink, ScheduledBuffer};
use crate::protocol::{ResponseModality, ServerEvent, SessionSetup};
use crate::transcript::{SessionStatus, TranscriptEntry, TurnAccumulator};
use crate::ws::{self, RemoteLink};

/// Configuration for one remote session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub url: String,
    pub api_key: String,
    /// Named voice preset for synthesized replies.
    pub voice: String,
    /// Opaque instructions forwarded to the remote service.
    pub system_prompt: String,
}

impl SessionConfig {
    fn setup(&self) -> SessionSetup {
        SessionSetup {
            response_modality: ResponseModality::Audio,
            voice: self.voice.clone(),
            system_prompt: self.system_prompt.clone(),
            request_inbound_transcription: true,
            request_outbound_transcription: true,
        }
    }
}

/// Observable change surfaced to the front-end.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionUpdate {
    Status(SessionStatus),
    Entry(TranscriptEntry),
}

/// State machine over the transcript, status, and playback cursor.
/// Pure: all I/O happens in the controller around it.
#[derive(Debug, Default)]
struct SessionEngine {
    status: SessionStatus,
    entries: Vec<TranscriptEntry>,
    turn: TurnAccumulator,
    scheduler: PlaybackScheduler,
}

impl SessionEngine {
    fn set_status(&mut self, status: SessionStatus) -> Option<SessionUpdate> {
        if self.status == status {
            return None;
        }
        self.status = status;
        Some(SessionUpdate::Status(status))
    }

    /// New sessions start with a fresh transcript.
    fn reset_for_start(&mut self) {
        self.entries.clear();
        self.turn.clear();
        self.scheduler.cancel_all();
    }

    /// Per-session accumulators only; the transcript stays for review.
    fn reset_session_state(&mut self) {
        self.turn.clear();
        self.scheduler.cancel_all();
    }

    fn on_output_fragment(&mut self, text: &str) -> Option<SessionUpdate> {
        self.turn.push_facilitator(text);
        self.set_status(SessionStatus::Speaking)
    }

    fn on_input_fragment(&mut self, text: &str) -> Option<SessionUpdate> {
        self.turn.push_user(text);
        self.set_status(SessionStatus::Listening)
    }

    fn on_turn_complete(&mut self) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();
        for entry in self.turn.finish_turn() {
            self.entries.push(entry.clone());
            updates.push(SessionUpdate::Entry(entry));
        }
        if let Some(update) = self.set_status(SessionStatus::Listening) {
            updates.push(update);
        }
        updates
    }

    fn on_audio(
        &mut self,
        envelope: &WireEnvelope,
        now: f64,
    ) -> Result<(ScheduledBuffer, AudioChunk, Option<SessionUpdate>)> {
        let chunk = pcm::decode_inbound(&envelope.payload, PLAYBACK_SAMPLE_RATE_HZ, 1)?;
        let slot = self.scheduler.schedule(chunk.duration_secs(), now);
        let update = self.set_status(SessionStatus::Speaking);
        Ok((slot, chunk, update))
    }

    fn on_playback_done(&mut self, id: u64) -> Option<SessionUpdate> {
        if self.scheduler.complete(id) && self.status == SessionStatus::Speaking {
            self.set_status(SessionStatus::Listening)
        } else {
            None
        }
    }
}

enum Step {
    Chunk(Option<AudioChunk>),
    Event(Option<ServerEvent>),
    Done(Option<u64>),
}

/// One live session at a time. All session-scoped resources hang off
/// this value; nothing outlives it.
pub struct SessionController<B: AudioBackend> {
    backend: B,
    config: SessionConfig,
    engine: SessionEngine,
    remote: Option<RemoteLink>,
    capture: Option<mpsc::Receiver<AudioChunk>>,
    playback: Option<B::Playback>,
    out_resampler: Option<LinearResampler>,
    epoch: Option<Instant>,
    done_tx: Option<mpsc::Sender<u64>>,
    done_rx: Option<mpsc::Receiver<u64>>,
    pending: VecDeque<SessionUpdate>,
}

impl<B: AudioBackend> SessionController<B> {
    pub fn new(backend: B, config: SessionConfig) -> Self {
        Self {
            backend,
            config,
            engine: SessionEngine::default(),
            remote: None,
            capture: None,
            playback: None,
            out_resampler: None,
            epoch: None,
            done_tx: None,
            done_rx: None,
            pending: VecDeque::new(),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.engine.status
    }

    /// Finalized entries so far. Retained after the session ends so the
    /// user can review them; cleared when the next session starts.
    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.engine.entries
    }

    /// Opens the devices and the remote session. A no-op unless the
    /// current status allows starting; any failure surfaces as the
    /// error status after full teardown.
    pub async fn start_session(&mut self) -> Result<()> {
        let Some(capture) = self.begin_start()? else {
            return Ok(());
        };
        match ws::connect(&self.config.url, &self.config.api_key, self.config.setup()).await {
            Ok(link) => self.finish_start(capture, link),
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Ends the session and releases everything. Idempotent; safe to
    /// call when no session exists.
    pub fn end_session(&mut self) {
        self.teardown(false);
    }

    /// Guard, transcript reset, and capture acquisition. Returns `None`
    /// when starting is not allowed from the current status.
    fn begin_start(&mut self) -> Result<Option<mpsc::Receiver<AudioChunk>>> {
        if !self.engine.status.can_start() {
            debug!(status = %self.engine.status, "start ignored");
            return Ok(None);
        }
        self.engine.reset_for_start();
        let update = self.engine.set_status(SessionStatus::Thinking);
        self.push_update(update);

        match self.backend.open_capture() {
            Ok(chunks) => Ok(Some(chunks)),
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Wires the capture stream and remote link in; the session is
    /// listening from here on.
    fn finish_start(&mut self, capture: mpsc::Receiver<AudioChunk>, link: RemoteLink) -> Result<()> {
        let sink = match self.backend.open_playback() {
            Ok(sink) => sink,
            Err(e) => {
                link.close();
                self.fail(&e);
                return Err(e);
            }
        };
        self.out_resampler = (sink.sample_rate_hz() != PLAYBACK_SAMPLE_RATE_HZ)
            .then(|| LinearResampler::new(PLAYBACK_SAMPLE_RATE_HZ, sink.sample_rate_hz()));

        let (done_tx, done_rx) = mpsc::channel(32);
        self.capture = Some(capture);
        self.remote = Some(link);
        self.playback = Some(sink);
        self.done_tx = Some(done_tx);
        self.done_rx = Some(done_rx);
        self.epoch = Some(Instant::now());

        let update = self.engine.set_status(SessionStatus::Listening);
        self.push_update(update);
        Ok(())
    }

    /// Next observable change. Internally pumps capture chunks, inbound
    /// events, and playback completions until one surfaces. Returns
    /// `None` once no session is active and no updates remain.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        loop {
            if let Some(update) = self.pending.pop_front() {
                return Some(update);
            }

            let step = {
                let (Some(capture), Some(remote), Some(done_rx)) = (
                    self.capture.as_mut(),
                    self.remote.as_mut(),
                    self.done_rx.as_mut(),
                ) else {
                    return None;
                };

                tokio::select! {
                    biased;
                    chunk = capture.recv() => Step::Chunk(chunk),
                    event = remote.events.recv() => Step::Event(event),
                    done = done_rx.recv() => Step::Done(done),
                }
            };

            match step {
                Step::Chunk(Some(chunk)) => self.send_chunk(chunk),
                Step::Chunk(None) => {
                    self.fail(&LiveError::Device("capture stream ended".to_string()));
                }
                Step::Event(Some(event)) => self.dispatch(event),
                Step::Event(None) => self.teardown(false),
                Step::Done(Some(id)) => {
                    let update = self.engine.on_playback_done(id);
                    self.push_update(update);
                }
                Step::Done(None) => {}
            }
        }
    }

    fn dispatch(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::OutputTranscription(text) => {
                let update = self.engine.on_output_fragment(&text);
                self.push_update(update);
            }
            ServerEvent::InputTranscription(text) => {
                let update = self.engine.on_input_fragment(&text);
                self.push_update(update);
            }
            ServerEvent::TurnComplete => {
                let updates = self.engine.on_turn_complete();
                self.pending.extend(updates);
            }
            ServerEvent::Audio(envelope) => {
                if let Err(e) = self.schedule_audio(&envelope) {
                    self.fail(&e);
                }
            }
            ServerEvent::TransportError(message) => {
                self.fail(&LiveError::Transport(message));
            }
            ServerEvent::Closed => {
                debug!("remote closed the session");
                self.teardown(false);
            }
        }
    }

    fn send_chunk(&mut self, chunk: AudioChunk) {
        let envelope = pcm::encode_outbound(&chunk.samples);
        let Some(remote) = self.remote.as_ref() else {
            return;
        };
        match remote.sender.try_send_media(envelope) {
            Ok(true) => {}
            Ok(false) => warn!("transport buffer full, dropping capture chunk"),
            Err(e) => self.fail(&e),
        }
    }

    fn schedule_audio(&mut self, envelope: &WireEnvelope) -> Result<()> {
        let Some(epoch) = self.epoch else {
            return Ok(());
        };
        let now = epoch.elapsed().as_secs_f64();
        let (slot, chunk, update) = self.engine.on_audio(envelope, now)?;
        self.push_update(update);

        if let Some(sink) = self.playback.as_mut() {
            match self.out_resampler.as_mut() {
                Some(resampler) => {
                    let mut resampled = Vec::new();
                    resampler.process_into(&chunk.samples, &mut resampled);
                    sink.enqueue(&resampled);
                }
                None => sink.enqueue(&chunk.samples),
            }
        }

        if let Some(done_tx) = self.done_tx.clone() {
            let deadline = epoch + Duration::from_secs_f64(slot.end_at);
            tokio::spawn(async move {
                tokio::time::sleep_until(deadline).await;
                let _ = done_tx.send(slot.id).await;
            });
        }
        Ok(())
    }

    fn fail(&mut self, err: &LiveError) {
        warn!(error = %err, "session failed");
        let update = self.engine.set_status(SessionStatus::Error);
        self.push_update(update);
        self.teardown(true);
    }

    /// Releases every acquired resource, unconditionally and exactly
    /// once each. Duplicate calls are no-ops.
    fn teardown(&mut self, keep_error: bool) {
        if let Some(remote) = self.remote.take() {
            remote.close();
        }
        self.capture = None;
        if let Some(mut sink) = self.playback.take() {
            sink.clear();
        }
        self.backend.close();
        self.engine.reset_session_state();
        self.out_resampler = None;
        self.epoch = None;
        self.done_tx = None;
        self.done_rx = None;

        let target = if keep_error {
            SessionStatus::Error
        } else {
            SessionStatus::Idle
        };
        let update = self.engine.set_status(target);
        self.push_update(update);
    }

    fn push_update(&mut self, update: Option<SessionUpdate>) {
        if let Some(update) = update {
            self.pending.push_back(update);
        }
    }
}
