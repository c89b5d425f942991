pub mod chime;

use chime::CompletionChime;

use log::warn;
use rodio::{OutputStream, Sink};
use std::sync::{
    mpsc::{self, Sender},
    Arc, Mutex,
};
use std::thread;

/// Fire-and-forget completion cue, invoked by the orchestrator when the
/// alarm gate fires while the process is in the foreground. Implementations
/// must never block or fail loudly.
pub trait CompletionCue: Send + Sync {
    fn play(&self);
}

enum AudioCommand {
    PlayChime,
    SetVolume(f32),
}

/// Plays the completion chime on a dedicated audio thread. The thread owns
/// the non-Send rodio output objects; callers talk to it over a channel.
/// If no audio device is available every command degrades to a no-op.
pub struct ChimePlayer {
    tx: Arc<Mutex<Option<Sender<AudioCommand>>>>,
}

impl ChimePlayer {
    pub fn new() -> Self {
        Self {
            tx: Arc::new(Mutex::new(None)),
        }
    }

    fn ensure_thread(&self) -> Result<Sender<AudioCommand>, String> {
        if let Some(tx) = self.tx.lock().map_err(|e| e.to_string())?.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<AudioCommand>();

        thread::Builder::new()
            .name("practice-chime".to_string())
            .spawn(move || {
                let mut _stream: Option<OutputStream> = None;
                let mut sink: Option<Sink> = None;

                fn ensure_sink(
                    stream: &mut Option<OutputStream>,
                    sink: &mut Option<Sink>,
                ) -> Result<(), String> {
                    if sink.is_none() {
                        let (s, handle) = OutputStream::try_default()
                            .map_err(|e| format!("Failed to create audio output stream: {}", e))?;
                        let new_sink = Sink::try_new(&handle)
                            .map_err(|e| format!("Failed to create audio sink: {}", e))?;
                        *stream = Some(s);
                        *sink = Some(new_sink);
                    }
                    Ok(())
                }

                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        AudioCommand::PlayChime => {
                            if let Err(e) = ensure_sink(&mut _stream, &mut sink) {
                                warn!("Completion chime unavailable: {}", e);
                                continue;
                            }
                            if let Some(ref s) = sink {
                                s.append(CompletionChime::new());
                                s.play();
                            }
                        }
                        AudioCommand::SetVolume(v) => {
                            if let Some(ref s) = sink {
                                s.set_volume(v.clamp(0.0, 1.0));
                            }
                        }
                    }
                }
            })
            .map_err(|e| e.to_string())?;

        let tx_clone = tx.clone();
        *self.tx.lock().map_err(|e| e.to_string())? = Some(tx);
        Ok(tx_clone)
    }

    pub fn set_volume(&self, volume: f32) -> Result<(), String> {
        let tx = self.ensure_thread()?;
        tx.send(AudioCommand::SetVolume(volume))
            .map_err(|e| e.to_string())
    }
}

impl Default for ChimePlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionCue for ChimePlayer {
    fn play(&self) {
        let result = self
            .ensure_thread()
            .and_then(|tx| tx.send(AudioCommand::PlayChime).map_err(|e| e.to_string()));
        if let Err(e) = result {
            warn!("Failed to queue completion chime: {}", e);
        }
    }
}
