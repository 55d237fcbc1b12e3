//! Connection handling and the synchronization loops.
//!
//! Three independently scheduled tasks share the registry: the reader loop
//! consumes the transport and feeds decoded events into a channel, the
//! dispatcher applies them one at a time (so handlers never run
//! concurrently with each other), and the two tick loops — position update
//! and command sender — run only while a session is live. Every loop stops
//! cooperatively: a flag checked at each iteration boundary, with all
//! blocking calls bounded so the check comes around promptly.

use crate::presentation::{ChatChannel, Presentation};
use crate::registry::Registry;
use log::{debug, error, info, warn};
use shared::config::GameConfig;
use shared::protocol::{self, ServerEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};

/// How long one transport read may block before the stop flag is rechecked.
const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Outcome of one bounded transport read. A timeout is not an error, just
/// an idle pass that lets the reader observe its stop flag.
enum Read {
    Data(String),
    Idle,
    Closed,
}

/// Write side of the connection, shared by every frame producer.
pub struct Transport {
    writer: Mutex<OwnedWriteHalf>,
}

impl Transport {
    fn new(writer: OwnedWriteHalf) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Sends one newline-terminated frame.
    pub async fn send_frame(&self, frame: &str) -> std::io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(frame.as_bytes()).await?;
        writer.write_all(b"\n").await
    }
}

/// A cooperatively stopped loop task.
pub struct LoopHandle {
    stop: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl LoopHandle {
    fn new(stop: Arc<AtomicBool>, task: JoinHandle<()>) -> Self {
        Self { stop, task }
    }

    /// Requests the loop to stop at its next iteration boundary.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Stops the loop and waits for the task to terminate.
    pub async fn stop_and_join(self) {
        self.stop();
        if let Err(e) = self.task.await {
            error!("Loop task failed to join cleanly: {}", e);
        }
    }
}

/// The connected client: registry, transport and the loop tasks driving
/// them.
pub struct GameClient {
    registry: Arc<Registry>,
    presentation: Arc<dyn Presentation>,
    transport: Arc<Transport>,
    reader: LoopHandle,
    dispatcher: JoinHandle<()>,
}

impl GameClient {
    /// Opens the transport, starts the reader and dispatcher, and requests
    /// the pseudonym. The tick loops start later, when the server opens the
    /// session.
    pub async fn connect(
        host: &str,
        port: u16,
        pseudonym: &str,
        config: GameConfig,
        presentation: Arc<dyn Presentation>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Connecting to {}:{}...", host, port);
        let stream = TcpStream::connect((host, port)).await?;
        let (read_half, write_half) = stream.into_split();

        let transport = Arc::new(Transport::new(write_half));
        let registry = Arc::new(Registry::new(config, pseudonym, Arc::clone(&presentation)));

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let reader = spawn_reader_loop(read_half, events_tx);
        let dispatcher = spawn_dispatcher(events_rx, Arc::clone(&registry), Arc::clone(&transport));

        transport
            .send_frame(&protocol::connect_frame(pseudonym))
            .await?;
        registry.mark_connected().await;
        info!("Connected as {}", pseudonym);

        Ok(Self {
            registry,
            presentation,
            transport,
            reader,
            dispatcher,
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Sends a public chat line, echoing it locally first.
    pub async fn send_public_chat(&self, message: &str) -> std::io::Result<()> {
        self.presentation
            .on_chat_message(&ChatChannel::Public, message, true);
        self.transport
            .send_frame(&protocol::public_chat_frame(message))
            .await
    }

    /// Sends a private chat line to one opponent, echoing it locally first.
    pub async fn send_private_chat(&self, target: &str, message: &str) -> std::io::Result<()> {
        self.presentation
            .on_chat_message(&ChatChannel::Private(target.to_string()), message, true);
        self.transport
            .send_frame(&protocol::private_chat_frame(target, message))
            .await
    }

    /// Stops and joins every loop, then tells the server we are leaving.
    ///
    /// The order matters: once every join has returned, no loop can touch
    /// the registry or the transport anymore, so the exit frame is the last
    /// thing written before the connection drops.
    pub async fn shutdown(self) {
        info!("Shutting down...");
        self.reader.stop_and_join().await;
        // The reader dropped its event sender; the dispatcher drains what is
        // left, winds down the tick loops and exits.
        if let Err(e) = self.dispatcher.await {
            error!("Dispatcher failed to join cleanly: {}", e);
        }
        let exit = protocol::exit_frame(self.registry.pseudonym());
        if let Err(e) = self.transport.send_frame(&exit).await {
            warn!("Could not send the exit frame: {}", e);
        }
        info!("Shutdown complete");
    }
}

async fn read_chunk(reader: &mut OwnedReadHalf, buffer: &mut [u8]) -> Read {
    match timeout(READ_TIMEOUT, reader.read(buffer)).await {
        Err(_) => Read::Idle,
        Ok(Ok(0)) => Read::Closed,
        Ok(Ok(received)) => Read::Data(String::from_utf8_lossy(&buffer[..received]).into_owned()),
        Ok(Err(e)) => {
            error!("Transport read failed: {}", e);
            Read::Closed
        }
    }
}

/// Spawns the network reader loop.
///
/// Events decoded from one chunk are forwarded in order; a chunk cut in the
/// middle of a message leaves a remainder that is prepended to the next
/// read. A `DENIED` message is a normal terminal signal for this loop.
fn spawn_reader_loop(mut reader: OwnedReadHalf, events: UnboundedSender<ServerEvent>) -> LoopHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    let task = tokio::spawn(async move {
        info!("Reader loop started");
        let mut buffer = vec![0u8; 1024];
        let mut carry = String::new();

        while !flag.load(Ordering::SeqCst) {
            match read_chunk(&mut reader, &mut buffer).await {
                Read::Idle => continue,
                Read::Closed => {
                    info!("Server closed the connection");
                    break;
                }
                Read::Data(data) => {
                    let chunk = if carry.is_empty() {
                        data
                    } else {
                        format!("{}{}", carry, data)
                    };
                    let decoded = protocol::parse_chunk(&chunk);
                    carry = decoded.remainder;

                    let mut denied = false;
                    for event in decoded.events {
                        if event == ServerEvent::Denied {
                            denied = true;
                        }
                        if events.send(event).is_err() {
                            // Dispatcher is gone; nothing left to feed.
                            return;
                        }
                    }
                    if denied {
                        break;
                    }
                }
            }
        }
        info!("Reader loop stopped");
    });
    LoopHandle::new(stop, task)
}

/// Spawns the dispatcher task: the single consumer of the reader's events.
///
/// It owns the two tick loops, starting them when the session opens and
/// stopping and joining them before the winner teardown drains the state
/// they work on.
fn spawn_dispatcher(
    mut events: UnboundedReceiver<ServerEvent>,
    registry: Arc<Registry>,
    transport: Arc<Transport>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut updater: Option<LoopHandle> = None;
        let mut sender: Option<LoopHandle> = None;

        while let Some(event) = events.recv().await {
            match event {
                ServerEvent::Status(phase) => registry.handle_status(phase).await,
                ServerEvent::Scores(scores) => registry.handle_scores(&scores),
                ServerEvent::Obstacles(coords) => registry.add_obstacles(&coords).await,
                ServerEvent::SessionStart { pods, objective } => {
                    registry.handle_session_start(&pods, objective).await;
                    if updater.is_none() {
                        updater = Some(spawn_update_loop(Arc::clone(&registry)));
                    }
                    if sender.is_none() {
                        sender = Some(spawn_command_loop(
                            Arc::clone(&registry),
                            Arc::clone(&transport),
                        ));
                    }
                }
                ServerEvent::PlayerJoined { pseudonym } => {
                    registry.create_opponent(&pseudonym).await
                }
                ServerEvent::PlayerLeft { pseudonym } => registry.remove_player(&pseudonym).await,
                ServerEvent::Tick(ticks) => registry.apply_tick(&ticks).await,
                ServerEvent::NewObjective { x, y } => registry.set_objective(x, y).await,
                ServerEvent::Winner(scores) => {
                    if let Some(handle) = updater.take() {
                        handle.stop_and_join().await;
                    }
                    if let Some(handle) = sender.take() {
                        handle.stop_and_join().await;
                    }
                    registry.handle_winner(&scores).await;
                }
                ServerEvent::PublicChat { text } => registry.handle_public_chat(&text),
                ServerEvent::PrivateChat { text, from } => {
                    registry.handle_private_chat(&from, &text)
                }
                ServerEvent::Denied => registry.handle_denied().await,
            }
        }

        if let Some(handle) = updater.take() {
            handle.stop_and_join().await;
        }
        if let Some(handle) = sender.take() {
            handle.stop_and_join().await;
        }
        debug!("Dispatcher finished");
    })
}

/// Spawns the position-update loop: one physics pass per refresh tick.
fn spawn_update_loop(registry: Arc<Registry>) -> LoopHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    let period = registry.config().refresh_tick();
    let task = tokio::spawn(async move {
        info!("Position update loop started ({:?} period)", period);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        while !flag.load(Ordering::SeqCst) {
            ticker.tick().await;
            registry.update_every_pod().await;
        }
        info!("Position update loop stopped");
    });
    LoopHandle::new(stop, task)
}

/// Spawns the command-sender loop: one command frame per server tick.
///
/// A contended pod guard skips the cycle; the counters keep accumulating
/// and the next cycle sends them, so nothing is lost beyond latency.
fn spawn_command_loop(registry: Arc<Registry>, transport: Arc<Transport>) -> LoopHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    let period = registry.config().server_tick();
    let task = tokio::spawn(async move {
        info!("Command sender loop started ({:?} period)", period);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        while !flag.load(Ordering::SeqCst) {
            ticker.tick().await;
            if let Some((angle, pulses)) = registry.take_command().await {
                let frame = protocol::command_frame(angle, pulses);
                if let Err(e) = transport.send_frame(&frame).await {
                    warn!("Command send failed: {}", e);
                }
            }
        }
        info!("Command sender loop stopped");
    });
    LoopHandle::new(stop, task)
}
