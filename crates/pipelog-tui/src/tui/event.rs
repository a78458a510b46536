use std::time::Duration;

use crossterm::event::{Event as CrosstermEvent, EventStream, KeyEvent, KeyEventKind};
use futures::{FutureExt, StreamExt};
use pipelog_logs::SinkEvent;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Viewer events
#[derive(Clone, Debug)]
pub enum Event {
    /// Periodic tick
    Tick,
    /// Key press
    Key(KeyEvent),
    /// Terminal resize
    Resize(u16, u16),
    /// The sink changed
    Sink(SinkEvent),
    /// The sink published faster than we read; state must be re-read in full
    SinkLagged(u64),
    /// Terminal input failed
    Error(String),
}

/// Merges terminal input, ticks and sink notifications into one stream
pub struct EventHandler {
    receiver: mpsc::UnboundedReceiver<Event>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl EventHandler {
    /// Start reading terminal input and `sink_events`
    pub fn new(tick_rate: Duration, mut sink_events: broadcast::Receiver<SinkEvent>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let task = {
            let cancel = cancel.clone();

            tokio::spawn(async move {
                let mut reader = EventStream::new();
                let mut tick_interval = tokio::time::interval(tick_rate);
                let mut sink_open = true;

                loop {
                    let tick = tick_interval.tick();
                    let crossterm_event = reader.next().fuse();

                    tokio::select! {
                        _ = cancel.cancelled() => break,

                        _ = tick => {
                            let _ = sender.send(Event::Tick);
                        }

                        sink_event = sink_events.recv(), if sink_open => {
                            match sink_event {
                                Ok(event) => {
                                    let _ = sender.send(Event::Sink(event));
                                }
                                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                    let _ = sender.send(Event::SinkLagged(skipped));
                                }
                                Err(broadcast::error::RecvError::Closed) => {
                                    sink_open = false;
                                }
                            }
                        }

                        maybe_event = crossterm_event => {
                            match maybe_event {
                                Some(Ok(CrosstermEvent::Key(key))) => {
                                    // Filter out release events (important for Windows)
                                    if key.kind == KeyEventKind::Press {
                                        let _ = sender.send(Event::Key(key));
                                    }
                                }
                                Some(Ok(CrosstermEvent::Resize(w, h))) => {
                                    let _ = sender.send(Event::Resize(w, h));
                                }
                                Some(Ok(_)) => {}
                                Some(Err(e)) => {
                                    let _ = sender.send(Event::Error(e.to_string()));
                                }
                                None => break,
                            }
                        }
                    }
                }
                debug!("Event handler stopped");
            })
        };

        Self {
            receiver,
            cancel,
            task: Some(task),
        }
    }

    /// Receive the next event
    pub async fn next(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// Stop the reader task and wait for it
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for EventHandler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
