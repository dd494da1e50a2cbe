//! In-process message broker with AMQP-style channel semantics.
//!
//! ## Model
//!
//! - [`MemoryBroker`] holds named FIFO queues.
//! - [`Connection::open`] spawns one driver thread per connection. The driver
//!   owns delivery: it assigns delivery tags, enforces prefetch credit, and
//!   invokes the consumer callback.
//! - [`ChannelHandle`] is a cloneable handle to the connection's channel.
//!   `basic_ack` and `basic_nack` only succeed on the driver thread; other
//!   threads schedule them with [`ChannelHandle::add_callback_threadsafe`].
//! - Closing a connection returns every unacknowledged message to the head of
//!   its queue with `redelivered` set.

use crate::error::{QueueError, QueueResult};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};
use tracing::{debug, info, warn};

/// Consumer callback, invoked on the driver thread for every delivery.
type DeliverFn = Box<dyn FnMut(Delivery) + Send>;

/// Work scheduled onto a driver thread.
type DriverCallback = Box<dyn FnOnce() + Send>;

/// A message handed to a consumer.
#[derive(Debug)]
pub struct Delivery {
    /// Tag identifying this delivery on its channel.
    pub delivery_tag: u64,
    /// Whether the message was delivered before and not acknowledged.
    pub redelivered: bool,
    /// Queue the message came from.
    pub queue: String,
    /// Message body.
    pub body: Vec<u8>,
    /// The channel the message arrived on. Settle it through this channel.
    pub channel: ChannelHandle,
}

#[derive(Debug)]
struct Message {
    body: Vec<u8>,
    redelivered: bool,
}

#[derive(Default)]
struct BrokerState {
    queues: HashMap<String, VecDeque<Message>>,
    /// Driver event senders, woken whenever a queue gains messages.
    watchers: HashMap<u64, Sender<DriverEvent>>,
}

/// Named FIFO queues shared by every connection opened on the broker.
#[derive(Default)]
pub struct MemoryBroker {
    state: Mutex<BrokerState>,
    next_connection: AtomicU64,
}

impl MemoryBroker {
    /// Creates an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a queue. Declaring an existing queue is a no-op.
    pub fn declare_queue(&self, name: &str) {
        let mut state = self.state.lock();
        if !state.queues.contains_key(name) {
            state.queues.insert(name.to_string(), VecDeque::new());
            debug!(queue = name, "queue declared");
        }
    }

    /// Appends a message to a declared queue.
    pub fn publish(&self, queue: &str, body: Vec<u8>) -> QueueResult<()> {
        let mut state = self.state.lock();
        let Some(messages) = state.queues.get_mut(queue) else {
            return Err(QueueError::UnknownQueue(queue.to_string()));
        };
        messages.push_back(Message {
            body,
            redelivered: false,
        });
        Self::wake(&mut state);
        Ok(())
    }

    /// Number of messages ready for delivery on `queue`.
    pub fn len(&self, queue: &str) -> usize {
        self.state.lock().queues.get(queue).map_or(0, VecDeque::len)
    }

    /// Returns true if `queue` has no ready messages.
    pub fn is_empty(&self, queue: &str) -> bool {
        self.len(queue) == 0
    }

    /// Number of open connections.
    pub fn connection_count(&self) -> usize {
        self.state.lock().watchers.len()
    }

    fn pop(&self, queue: &str) -> Option<Message> {
        self.state.lock().queues.get_mut(queue)?.pop_front()
    }

    /// Puts messages back at the head of `queue`, preserving their order.
    fn requeue(&self, queue: &str, bodies: Vec<Vec<u8>>) {
        let mut state = self.state.lock();
        let messages = state.queues.entry(queue.to_string()).or_default();
        for body in bodies.into_iter().rev() {
            messages.push_front(Message {
                body,
                redelivered: true,
            });
        }
        Self::wake(&mut state);
    }

    fn register(&self, connection: u64, events: Sender<DriverEvent>) {
        self.state.lock().watchers.insert(connection, events);
    }

    fn unregister(&self, connection: u64) {
        self.state.lock().watchers.remove(&connection);
    }

    fn wake(state: &mut BrokerState) {
        state
            .watchers
            .retain(|_, events| events.send(DriverEvent::Wake).is_ok());
    }
}

impl fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryBroker")
            .field("queues", &state.queues.len())
            .field("connections", &state.watchers.len())
            .finish()
    }
}

/// Events processed by a connection's driver thread, in order.
enum DriverEvent {
    /// A queue gained messages.
    Wake,
    /// Set the prefetch count. Zero is unlimited.
    Qos(u16),
    /// Start delivering from a queue.
    Consume { queue: String, deliver: DeliverFn },
    /// Stop delivering.
    Cancel,
    /// Run a closure on the driver thread.
    Callback(DriverCallback),
    /// Requeue outstanding messages and exit.
    Close,
}

struct Unacked {
    queue: String,
    body: Vec<u8>,
}

#[derive(Default)]
struct ChannelState {
    next_tag: u64,
    unacked: BTreeMap<u64, Unacked>,
}

struct ChannelShared {
    connection: u64,
    broker: Arc<MemoryBroker>,
    events: Sender<DriverEvent>,
    open: AtomicBool,
    driver_thread: OnceLock<ThreadId>,
    state: Mutex<ChannelState>,
}

/// Thread-safe handle to a connection's channel.
#[derive(Clone)]
pub struct ChannelHandle {
    shared: Arc<ChannelShared>,
}

impl ChannelHandle {
    /// Declares a queue on the broker.
    pub fn queue_declare(&self, queue: &str) -> QueueResult<()> {
        self.ensure_open()?;
        self.shared.broker.declare_queue(queue);
        Ok(())
    }

    /// Limits unacknowledged deliveries on this channel. Zero is unlimited.
    pub fn basic_qos(&self, prefetch: u16) -> QueueResult<()> {
        self.send(DriverEvent::Qos(prefetch))
    }

    /// Starts delivering messages from `queue` to `deliver`.
    ///
    /// `deliver` runs on the driver thread and should hand work off quickly.
    /// A second consume on the same channel replaces the first.
    pub fn basic_consume<F>(&self, queue: &str, deliver: F) -> QueueResult<()>
    where
        F: FnMut(Delivery) + Send + 'static,
    {
        self.send(DriverEvent::Consume {
            queue: queue.to_string(),
            deliver: Box::new(deliver),
        })
    }

    /// Stops delivering. Outstanding deliveries can still be settled.
    pub fn basic_cancel(&self) -> QueueResult<()> {
        self.send(DriverEvent::Cancel)
    }

    /// Acknowledges a delivery. Must run on the driver thread.
    pub fn basic_ack(&self, delivery_tag: u64) -> QueueResult<()> {
        self.ensure_driver("basic_ack")?;
        self.take_unacked(delivery_tag)?;
        debug!(connection = self.shared.connection, delivery_tag, "ack");
        Ok(())
    }

    /// Rejects a delivery, optionally returning it to the head of its queue.
    /// Must run on the driver thread.
    pub fn basic_nack(&self, delivery_tag: u64, requeue: bool) -> QueueResult<()> {
        self.ensure_driver("basic_nack")?;
        // Requeue under the channel lock: the message stays visible in either
        // the queue or the unacked set.
        let mut state = self.shared.state.lock();
        let message = state
            .unacked
            .remove(&delivery_tag)
            .ok_or(QueueError::UnknownDeliveryTag(delivery_tag))?;
        if requeue {
            self.shared
                .broker
                .requeue(&message.queue, vec![message.body]);
        }
        drop(state);

        debug!(
            connection = self.shared.connection,
            delivery_tag, requeue, "nack"
        );
        Ok(())
    }

    /// Schedules `callback` to run on the driver thread.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionClosed` if the connection is closed; the callback
    /// is dropped without running.
    pub fn add_callback_threadsafe<F>(&self, callback: F) -> QueueResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.send(DriverEvent::Callback(Box::new(callback)))
    }

    /// Returns true while the connection is open.
    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }

    /// Number of delivered but unsettled messages.
    pub fn unacked_count(&self) -> usize {
        self.shared.state.lock().unacked.len()
    }

    /// Messages of `queue` that are either ready or delivered on this
    /// channel and not yet settled.
    pub fn pending(&self, queue: &str) -> usize {
        // Same lock order as delivery: channel state, then broker.
        let state = self.shared.state.lock();
        state.unacked.len() + self.shared.broker.len(queue)
    }

    /// Whether the caller is the connection's driver thread.
    pub fn on_driver_thread(&self) -> bool {
        self.shared.driver_thread.get() == Some(&thread::current().id())
    }

    fn ensure_open(&self) -> QueueResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(QueueError::ConnectionClosed)
        }
    }

    fn ensure_driver(&self, operation: &'static str) -> QueueResult<()> {
        if self.on_driver_thread() {
            Ok(())
        } else {
            Err(QueueError::WrongThread(operation))
        }
    }

    fn take_unacked(&self, delivery_tag: u64) -> QueueResult<Unacked> {
        self.shared
            .state
            .lock()
            .unacked
            .remove(&delivery_tag)
            .ok_or(QueueError::UnknownDeliveryTag(delivery_tag))
    }

    fn send(&self, event: DriverEvent) -> QueueResult<()> {
        self.ensure_open()?;
        self.shared
            .events
            .send(event)
            .map_err(|_| QueueError::ConnectionClosed)
    }
}

impl fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("connection", &self.shared.connection)
            .field("open", &self.is_open())
            .finish()
    }
}

/// A connection to a [`MemoryBroker`] with one channel and one driver thread.
///
/// Dropping the connection closes it.
pub struct Connection {
    channel: ChannelHandle,
    driver: Option<JoinHandle<()>>,
}

impl Connection {
    /// Opens a connection and starts its driver thread.
    pub fn open(broker: &Arc<MemoryBroker>) -> QueueResult<Self> {
        let id = broker.next_connection.fetch_add(1, Ordering::SeqCst);
        let (events, receiver) = mpsc::channel();

        let shared = Arc::new(ChannelShared {
            connection: id,
            broker: Arc::clone(broker),
            events: events.clone(),
            open: AtomicBool::new(true),
            driver_thread: OnceLock::new(),
            state: Mutex::new(ChannelState::default()),
        });
        broker.register(id, events);

        let driver = Driver {
            shared: Arc::clone(&shared),
            events: receiver,
            prefetch: 0,
            consumer: None,
        };
        let spawned = thread::Builder::new()
            .name(format!("claimflow-conn-{id}"))
            .spawn(move || driver.run());
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                broker.unregister(id);
                return Err(e.into());
            }
        };

        info!(connection = id, "connection opened");
        Ok(Self {
            channel: ChannelHandle { shared },
            driver: Some(handle),
        })
    }

    /// Returns the connection's channel.
    pub fn channel(&self) -> ChannelHandle {
        self.channel.clone()
    }

    /// Returns true until the connection is closed.
    pub fn is_open(&self) -> bool {
        self.channel.is_open()
    }

    /// Closes the connection and waits for the driver to exit.
    ///
    /// Callbacks scheduled before the close still run; unacknowledged
    /// messages are requeued.
    pub fn close(mut self) -> QueueResult<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> QueueResult<()> {
        let Some(driver) = self.driver.take() else {
            return Ok(());
        };
        // The driver may already be gone; joining below is enough then.
        let _ = self.channel.shared.events.send(DriverEvent::Close);
        driver.join().map_err(|_| QueueError::DriverPanicked)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "connection did not shut down cleanly");
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.channel.shared.connection)
            .field("open", &self.is_open())
            .finish()
    }
}

struct ActiveConsumer {
    queue: String,
    deliver: DeliverFn,
}

/// The connection's I/O loop. Owns delivery and runs scheduled callbacks.
struct Driver {
    shared: Arc<ChannelShared>,
    events: Receiver<DriverEvent>,
    prefetch: u16,
    consumer: Option<ActiveConsumer>,
}

impl Driver {
    fn run(mut self) {
        // Set once, before any event is handled.
        let _ = self.shared.driver_thread.set(thread::current().id());

        while let Ok(event) = self.events.recv() {
            match event {
                DriverEvent::Wake => {}
                DriverEvent::Qos(prefetch) => self.prefetch = prefetch,
                DriverEvent::Consume { queue, deliver } => {
                    debug!(connection = self.shared.connection, %queue, "consuming");
                    self.consumer = Some(ActiveConsumer { queue, deliver });
                }
                DriverEvent::Cancel => {
                    debug!(connection = self.shared.connection, "consumer cancelled");
                    self.consumer = None;
                }
                DriverEvent::Callback(callback) => callback(),
                DriverEvent::Close => break,
            }
            self.pump();
        }

        self.finish();
    }

    /// Delivers ready messages while prefetch credit remains.
    fn pump(&mut self) {
        let Some(active) = self.consumer.as_mut() else {
            return;
        };

        loop {
            let delivery = {
                let mut state = self.shared.state.lock();
                if self.prefetch > 0 && state.unacked.len() >= usize::from(self.prefetch) {
                    return;
                }
                let Some(message) = self.shared.broker.pop(&active.queue) else {
                    return;
                };
                state.next_tag += 1;
                let delivery_tag = state.next_tag;
                state.unacked.insert(
                    delivery_tag,
                    Unacked {
                        queue: active.queue.clone(),
                        body: message.body.clone(),
                    },
                );
                Delivery {
                    delivery_tag,
                    redelivered: message.redelivered,
                    queue: active.queue.clone(),
                    body: message.body,
                    channel: ChannelHandle {
                        shared: Arc::clone(&self.shared),
                    },
                }
            };
            (active.deliver)(delivery);
        }
    }

    fn finish(self) {
        self.shared.open.store(false, Ordering::SeqCst);
        self.shared.broker.unregister(self.shared.connection);

        let unacked = std::mem::take(&mut self.shared.state.lock().unacked);
        let requeued = unacked.len();
        let mut by_queue: BTreeMap<String, Vec<Vec<u8>>> = BTreeMap::new();
        for message in unacked.into_values() {
            by_queue.entry(message.queue).or_default().push(message.body);
        }
        for (queue, bodies) in by_queue {
            self.shared.broker.requeue(&queue, bodies);
        }

        info!(
            connection = self.shared.connection,
            requeued, "connection closed"
        );
    }
}
