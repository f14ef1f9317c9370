// Copyright (C) 2024 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::io;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{error, info, span, Instrument, Level};

use crate::session::Session;

pub mod keyboard;

/// Controller events that will trigger behavior in the session. Tracks are
/// given as an index or a name.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Plays the track from the start at its current rate, cutting off any
    /// voice it already has.
    Play(String),

    /// Stops the track. If it isn't playing, does nothing.
    Stop(String),

    /// Sets the rate of the track. Applies to the next play or export.
    SetRate(String, f64),

    /// Exports the track at its current rate.
    Export(String),

    /// Lists the tracks in the session.
    List,
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// Drives a session.
pub struct Controller {
    handle: JoinHandle<()>,
}

impl Controller {
    /// Creates a new controller with the given driver.
    pub fn new(session: Arc<Session>, driver: Arc<dyn Driver>) -> Controller {
        let span = span!(Level::INFO, "controller");
        Controller {
            handle: tokio::spawn(Controller::trigger_events(session, driver).instrument(span)),
        }
    }

    /// Join will block until the controller finishes.
    pub async fn join(&mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }

    /// Applies events from the driver to the session until the driver closes.
    async fn trigger_events(session: Arc<Session>, driver: Arc<dyn Driver>) {
        let (events_tx, mut events_rx) = mpsc::channel(1);
        let join_handle = driver.monitor_events(events_tx);
        let mut exports = JoinSet::new();

        info!(tracks = session.tracks().len(), "Controller started.");

        while let Some(event) = events_rx.recv().await {
            info!(event = format!("{:?}", event), "Received event.");

            let result = match event {
                Event::Play(track) => session.play(&track).map(|_| ()),
                Event::Stop(track) => session.stop(&track).map(|_| ()),
                Event::SetRate(track, value) => session.set_rate(&track, value).map(|_| ()),
                Event::Export(track) => {
                    // Exports run in the background so playback stays responsive. The
                    // rate is taken now, not when the export gets to run.
                    session.rate(&track).map(|rate| {
                        let session = session.clone();
                        exports.spawn(async move {
                            if let Err(e) = session.export_at(&track, rate).await {
                                error!(track = %track, err = %e, "Export failed");
                            }
                        });
                    })
                }
                Event::List => {
                    for track in session.tracks() {
                        let playing = session
                            .is_playing(&track.index().to_string())
                            .unwrap_or(false);
                        info!(playing, "{}", track);
                    }
                    Ok(())
                }
            };

            if let Err(e) = result {
                error!("Error talking to session: {}", e);
            }

            // Reap finished exports as we go.
            while let Some(result) = exports.try_join_next() {
                if let Err(e) = result {
                    error!("Export task failed: {}", e);
                }
            }
        }

        info!("Controller closing.");
        while let Some(result) = exports.join_next().await {
            if let Err(e) = result {
                error!("Export task failed: {}", e);
            }
        }
        match join_handle.await {
            Ok(Err(e)) => error!("Event monitor failed: {}", e),
            Err(e) => error!("Error waiting for event monitor to stop: {}", e),
            Ok(Ok(())) => {}
        }
    }
}
