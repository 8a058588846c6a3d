// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Timed dispatch of scheduled notes.
//!
//! A single thread sleeps on a condition variable until the earliest
//! pending trigger is due, then fires it into the sink. Triggers are fired
//! with the queue lock held, and `cancel` takes the same lock, so a
//! cancelled trigger can never sound after `cancel` returns.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

use tracing::{debug, trace, warn};

use super::{AudioBackend, BackendError, NoteSink, NoteTrigger, TriggerId, Voice};

type SinkFactory<S> = Box<dyn FnMut() -> Result<S, BackendError> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    NoteOff,
    NoteOn,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    id: TriggerId,
    action: Action,
    trigger: NoteTrigger,
}

impl Pending {
    /// Due time, then note-offs before note-ons, then scheduling order
    fn key(&self) -> (Instant, u8, TriggerId) {
        let rank = match self.action {
            Action::NoteOff => 0,
            Action::NoteOn => 1,
        };
        (self.trigger.at, rank, self.id)
    }
}

// For BinaryHeap - we want the earliest trigger first
impl Eq for Pending {}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap behavior
        other.key().cmp(&self.key())
    }
}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Queue<S> {
    heap: BinaryHeap<Pending>,
    sink: Option<S>,
    shutdown: bool,
}

impl<S: NoteSink> Queue<S> {
    fn fire(&mut self, pending: Pending) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        let NoteTrigger {
            channel,
            note,
            velocity,
            ..
        } = pending.trigger;
        trace!(id = %pending.id, channel, note, "firing trigger");
        match pending.action {
            Action::NoteOn => sink.note_on(channel, note, velocity),
            Action::NoteOff => sink.note_off(channel, note),
        }
    }
}

struct Shared<S> {
    queue: Mutex<Queue<S>>,
    wake: Condvar,
}

/// [`AudioBackend`] that fires triggers into a [`NoteSink`] on a dispatcher thread.
///
/// The sink is built on the first successful [`acquire`](AudioBackend::acquire),
/// so constructing a backend never touches audio hardware.
pub struct TimedBackend<S: NoteSink + 'static> {
    shared: Arc<Shared<S>>,
    factory: SinkFactory<S>,
    thread: Option<JoinHandle<()>>,
    next_id: u64,
}

impl<S: NoteSink + 'static> TimedBackend<S> {
    /// Backend whose sink is created lazily by `factory`
    pub fn new<F>(factory: F) -> Self
    where
        F: FnMut() -> Result<S, BackendError> + Send + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(Queue {
                    heap: BinaryHeap::new(),
                    sink: None,
                    shutdown: false,
                }),
                wake: Condvar::new(),
            }),
            factory: Box::new(factory),
            thread: None,
            next_id: 0,
        }
    }

    /// Backend around an already constructed sink
    pub fn with_sink(sink: S) -> Self {
        let mut sink = Some(sink);
        Self::new(move || {
            sink.take()
                .ok_or_else(|| BackendError::InitFailed("sink already taken".to_string()))
        })
    }

    /// Whether [`acquire`](AudioBackend::acquire) has succeeded
    pub fn is_acquired(&self) -> bool {
        self.thread.is_some()
    }

    /// Number of triggers waiting to fire
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().map(|q| q.heap.len()).unwrap_or(0)
    }

    fn schedule(&mut self, action: Action, trigger: NoteTrigger) -> TriggerId {
        self.next_id += 1;
        let id = TriggerId(self.next_id);
        if let Ok(mut queue) = self.shared.queue.lock() {
            queue.heap.push(Pending {
                id,
                action,
                trigger,
            });
        }
        self.shared.wake.notify_one();
        id
    }
}

impl<S: NoteSink + 'static> AudioBackend for TimedBackend<S> {
    fn acquire(&mut self) -> Result<(), BackendError> {
        if self.thread.is_some() {
            return Ok(());
        }

        let sink = (self.factory)()?;
        if let Ok(mut queue) = self.shared.queue.lock() {
            queue.sink = Some(sink);
            queue.shutdown = false;
        }

        let shared = Arc::clone(&self.shared);
        let thread = std::thread::Builder::new()
            .name("note-dispatch".to_string())
            .spawn(move || run(shared))
            .map_err(|e| BackendError::Dispatcher(e.to_string()))?;
        self.thread = Some(thread);

        debug!("audio backend acquired");
        Ok(())
    }

    fn schedule_note_on(&mut self, trigger: NoteTrigger) -> TriggerId {
        self.schedule(Action::NoteOn, trigger)
    }

    fn schedule_note_off(&mut self, trigger: NoteTrigger) -> TriggerId {
        self.schedule(Action::NoteOff, trigger)
    }

    fn cancel(&mut self, ids: &[TriggerId]) {
        if ids.is_empty() {
            return;
        }
        let ids: HashSet<TriggerId> = ids.iter().copied().collect();
        if let Ok(mut queue) = self.shared.queue.lock() {
            let before = queue.heap.len();
            queue.heap.retain(|p| !ids.contains(&p.id));
            debug!(cancelled = before - queue.heap.len(), "cancelled pending triggers");
        }
        self.shared.wake.notify_one();
    }

    fn release(&mut self, voices: &[Voice]) {
        if let Ok(mut queue) = self.shared.queue.lock() {
            if let Some(sink) = queue.sink.as_mut() {
                for voice in voices {
                    sink.note_off(voice.channel, voice.note);
                }
            }
        }
    }
}

impl<S: NoteSink + 'static> Drop for TimedBackend<S> {
    fn drop(&mut self) {
        if let Ok(mut queue) = self.shared.queue.lock() {
            queue.shutdown = true;
        }
        self.shared.wake.notify_all();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("note dispatcher thread panicked");
            }
        }
    }
}

fn run<S: NoteSink>(shared: Arc<Shared<S>>) {
    let Ok(mut queue) = shared.queue.lock() else {
        return;
    };

    loop {
        if queue.shutdown {
            break;
        }

        let now = Instant::now();
        match queue.heap.peek().map(|p| p.trigger.at) {
            Some(at) if at <= now => {
                if let Some(pending) = queue.heap.pop() {
                    queue.fire(pending);
                }
            }
            Some(at) => {
                queue = match shared.wake.wait_timeout(queue, at - now) {
                    Ok((queue, _)) => queue,
                    Err(_) => return,
                };
            }
            None => {
                queue = match shared.wake.wait(queue) {
                    Ok(queue) => queue,
                    Err(_) => return,
                };
            }
        }
    }
}
