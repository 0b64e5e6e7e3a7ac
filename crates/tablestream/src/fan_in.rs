//! Serializes messages from several concurrently running parents into one transformation.
//!
//! The transformation moves onto a consumer thread that reads a bounded channel. Every parent
//! talks to it through its own [`FanInHandle`], which is itself a [`Transformation`]: each call
//! becomes a [`Message`] and blocks until the consumer has dispatched it, so a parent never has
//! more than one message in flight.

use std::collections::HashSet;
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::thread::{self, JoinHandle};

use log::{info, trace, warn};

use crate::dataset::DatasetId;
use crate::error::{Error, Result};
use crate::group_key::GroupKey;
use crate::table::Table;
use crate::time::Time;
use crate::transformation::{Message, Transformation};

struct Envelope {
    parent: DatasetId,
    message: Message,
    reply: Sender<Result<()>>,
}

/// The consumer side of a fan-in; joining it hands the transformation back.
pub struct FanIn<T> {
    consumer: JoinHandle<T>,
}

impl<T: Transformation + 'static> FanIn<T> {
    /// Start the consumer for `t` and return one handle per entry of `parents`.
    ///
    /// The consumer exits once every parent has finished, after the first finish carrying an
    /// error, after the first dispatch error, or when all handles are dropped. Calls made through
    /// a handle after that are no-ops.
    pub fn spawn(
        t: T,
        parents: Vec<DatasetId>,
        queue_depth: usize,
    ) -> Result<(Self, Vec<FanInHandle>)> {
        let (sender, receiver) = mpsc::sync_channel(queue_depth);
        let handles = parents
            .iter()
            .map(|&parent| FanInHandle {
                parent,
                sender: sender.clone(),
            })
            .collect();
        drop(sender);
        let consumer = thread::Builder::new()
            .name("tablestream-fan-in".to_string())
            .spawn(move || consume(t, receiver, parents))
            .map_err(|err| Error::Spawn(err.to_string()))?;
        Ok((Self { consumer }, handles))
    }

    /// Wait for the consumer to exit.
    pub fn join(self) -> Result<T> {
        self.consumer.join().map_err(|_| Error::Disconnected)
    }

    pub fn is_finished(&self) -> bool {
        self.consumer.is_finished()
    }
}

fn consume<T: Transformation>(mut t: T, receiver: Receiver<Envelope>, parents: Vec<DatasetId>) -> T {
    let mut remaining: HashSet<DatasetId> = parents.into_iter().collect();
    while let Ok(Envelope {
        parent,
        message,
        reply,
    }) = receiver.recv()
    {
        let finish = match &message {
            Message::Finish(err) => Some(err.is_some()),
            _ => None,
        };
        let result = message.dispatch(parent, &mut t);
        let done = match (&result, finish) {
            (Err(err), _) => {
                warn!("fan-in dispatch from {parent} failed: {err}");
                t.finish(parent, Some(err.clone()));
                true
            }
            (Ok(()), Some(failed)) => {
                remaining.remove(&parent);
                failed || remaining.is_empty()
            }
            (Ok(()), None) => false,
        };
        if reply.send(result).is_err() {
            trace!("caller from {parent} stopped waiting for its reply");
        }
        if done {
            break;
        }
    }
    info!("fan-in consumer exiting with {} parents outstanding", remaining.len());
    t
}

/// One parent's connection to a fan-in consumer.
#[derive(Clone, Debug)]
pub struct FanInHandle {
    parent: DatasetId,
    sender: SyncSender<Envelope>,
}

impl FanInHandle {
    pub fn parent(&self) -> DatasetId {
        self.parent
    }

    fn send(&self, message: Message) -> Result<()> {
        let kind = message.kind();
        let (reply, response) = mpsc::channel();
        let envelope = Envelope {
            parent: self.parent,
            message,
            reply,
        };
        if self.sender.send(envelope).is_err() {
            warn!("dropping {kind} from {}: fan-in consumer has exited", self.parent);
            return Ok(());
        }
        match response.recv() {
            Ok(result) => result,
            Err(_) => {
                warn!("dropping {kind} from {}: fan-in consumer has exited", self.parent);
                Ok(())
            }
        }
    }
}

impl Transformation for FanInHandle {
    fn process(&mut self, _parent: DatasetId, table: Box<dyn Table>) -> Result<()> {
        self.send(Message::Process(table))
    }

    fn retract_table(&mut self, _parent: DatasetId, key: GroupKey) -> Result<()> {
        self.send(Message::RetractTable(key))
    }

    fn update_watermark(&mut self, _parent: DatasetId, t: Time) -> Result<()> {
        self.send(Message::UpdateWatermark(t))
    }

    fn update_processing_time(&mut self, _parent: DatasetId, t: Time) -> Result<()> {
        self.send(Message::UpdateProcessingTime(t))
    }

    fn flush_key(&mut self, _parent: DatasetId, key: GroupKey) -> Result<()> {
        self.send(Message::FlushKey(key))
    }

    fn finish(&mut self, _parent: DatasetId, err: Option<Error>) {
        if let Err(err) = self.send(Message::Finish(err)) {
            warn!("finish from {} failed: {err}", self.parent);
        }
    }
}
