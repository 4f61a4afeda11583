//! Board connection management.
//!
//! One task owns each board's connection end to end: it dials with a
//! bounded timeout, runs the receive loop, and on loss retries with
//! exponential backoff until the attempt budget is spent and the board is
//! faulted. Boards never affect each other; a write path serialized per
//! board rides alongside the receive loop on the same socket.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use dashmap::DashMap;
use futures::future::join_all;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpSocket, TcpStream};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use cycler_registry::ChannelRegistry;
use cycler_wire::{decode_frame, BoardId, FrameAssembler, BOARD_COUNT};

use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::stats::GatewayStats;

/// Ceiling on the exponential reconnect backoff
pub const MAX_RECONNECT_BACKOFF: Duration = Duration::from_secs(30);

/// Connection state of one board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardState {
    /// No connection and no attempt in flight
    Disconnected,
    /// Connection attempt in flight
    Connecting,
    /// Socket is up and the receive loop is running
    Connected,
    /// Retry budget exhausted; stays down until an operator restart
    Faulted,
}

/// Events emitted by board links
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// Board connected and its receive loop started
    Connected {
        /// The board that connected
        board: BoardId,
        /// Address the board answered on
        peer: SocketAddr,
    },
    /// Board connection was lost or closed
    Disconnected {
        /// The board that disconnected
        board: BoardId,
    },
    /// Board spent its retry budget and was taken out of rotation
    Faulted {
        /// The faulted board
        board: BoardId,
    },
}

/// Why a receive loop returned
enum LoopExit {
    Shutdown,
    PeerClosed,
    Idle,
    ReadError(io::Error),
}

/// Live state of one board link
struct BoardLink {
    state: BoardState,
    writer: Option<Arc<Mutex<OwnedWriteHalf>>>,
    task: Option<JoinHandle<()>>,
}

impl BoardLink {
    fn new() -> Self {
        Self {
            state: BoardState::Disconnected,
            writer: None,
            task: None,
        }
    }
}

/// Manager for the rack's board connections.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct LinkManager {
    config: LinkConfig,
    registry: Arc<ChannelRegistry>,
    boards: Arc<DashMap<BoardId, BoardLink>>,
    event_tx: mpsc::Sender<LinkEvent>,
    stats: Arc<GatewayStats>,
    shutdown: CancellationToken,
}

impl LinkManager {
    /// Create a manager. Nothing connects until [`start`] or [`restart`].
    ///
    /// [`start`]: LinkManager::start
    /// [`restart`]: LinkManager::restart
    pub fn new(
        config: LinkConfig,
        registry: Arc<ChannelRegistry>,
        event_tx: mpsc::Sender<LinkEvent>,
    ) -> Self {
        Self {
            config,
            registry,
            boards: Arc::new(DashMap::new()),
            event_tx,
            stats: Arc::new(GatewayStats::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Launch a link task for every board and wait for the first round of
    /// connection attempts to resolve.
    ///
    /// Attempts run concurrently, each under the configured connect
    /// timeout; a board that cannot be reached never delays the others.
    /// Boards that fail here keep retrying in the background until their
    /// budget is spent.
    pub async fn start(&self) {
        info!("starting links to {} boards", BOARD_COUNT);

        let mut first_round = Vec::new();
        for board in BoardId::all() {
            let mut link = self.boards.entry(board).or_insert_with(BoardLink::new);
            if link.task.as_ref().is_some_and(|task| !task.is_finished()) {
                debug!("board {} link already running", board);
                continue;
            }
            let (ready_tx, ready_rx) = oneshot::channel();
            link.task = Some(self.spawn_board(board, Some(ready_tx)));
            first_round.push(ready_rx);
        }

        let results = join_all(first_round).await;
        let connected = results
            .into_iter()
            .filter(|result| matches!(result, Ok(true)))
            .count();
        info!(
            "initial connection round complete: {}/{} boards connected",
            connected, BOARD_COUNT
        );
    }

    /// Stop all links and wait for their tasks to exit.
    ///
    /// Idempotent; afterwards every board reads `Disconnected` and all
    /// sockets are released.
    pub async fn stop(&self) {
        info!("stopping board links");
        self.shutdown.cancel();

        let mut tasks = Vec::new();
        for mut link in self.boards.iter_mut() {
            if let Some(task) = link.task.take() {
                tasks.push(task);
            }
        }
        join_all(tasks).await;

        for mut link in self.boards.iter_mut() {
            link.state = BoardState::Disconnected;
            link.writer = None;
        }
    }

    /// Operator-triggered restart of one board with a fresh retry budget.
    ///
    /// Intended for boards that faulted out; refused while the board's link
    /// is connected or mid-attempt. A board sleeping between retries is
    /// replaced immediately.
    pub fn restart(&self, board: BoardId) -> Result<(), LinkError> {
        let mut link = self.boards.entry(board).or_insert_with(BoardLink::new);

        let live = link.task.as_ref().is_some_and(|task| !task.is_finished());
        if live && matches!(link.state, BoardState::Connected | BoardState::Connecting) {
            return Err(LinkError::Active(board));
        }

        if let Some(old) = link.task.take() {
            old.abort();
        }
        link.state = BoardState::Disconnected;
        link.writer = None;
        link.task = Some(self.spawn_board(board, None));
        info!("board {} restart requested", board);
        Ok(())
    }

    /// Write one frame to a board, serialized against other writers.
    ///
    /// Fails fast when the board is not connected. A socket error surfaces
    /// to the caller; nothing is retried.
    pub async fn send(&self, board: BoardId, frame: &[u8]) -> Result<(), LinkError> {
        let writer = self
            .boards
            .get(&board)
            .filter(|link| link.state == BoardState::Connected)
            .and_then(|link| link.writer.clone())
            .ok_or(LinkError::NotConnected(board))?;

        let mut writer = writer.lock().await;
        writer
            .write_all(frame)
            .await
            .map_err(|source| LinkError::Write { board, source })?;
        drop(writer);

        self.stats.record_sent(frame.len());
        debug!("board {} sent {} bytes", board, frame.len());
        Ok(())
    }

    /// True when the board's socket is up
    pub fn is_connected(&self, board: BoardId) -> bool {
        self.board_state(board) == BoardState::Connected
    }

    /// Current state of one board
    pub fn board_state(&self, board: BoardId) -> BoardState {
        self.boards
            .get(&board)
            .map(|link| link.state)
            .unwrap_or(BoardState::Disconnected)
    }

    /// Number of boards currently connected
    pub fn connected_count(&self) -> usize {
        self.boards
            .iter()
            .filter(|link| link.state == BoardState::Connected)
            .count()
    }

    /// Boards that spent their retry budget, in board order
    pub fn faulted_boards(&self) -> Vec<BoardId> {
        let mut faulted: Vec<BoardId> = self
            .boards
            .iter()
            .filter(|link| link.state == BoardState::Faulted)
            .map(|link| *link.key())
            .collect();
        faulted.sort_unstable();
        faulted
    }

    /// Shared throughput counters
    pub fn stats(&self) -> Arc<GatewayStats> {
        self.stats.clone()
    }

    fn spawn_board(&self, board: BoardId, ready: Option<oneshot::Sender<bool>>) -> JoinHandle<()> {
        let runner = BoardRunner {
            board,
            addr: self.config.board_addr(board),
            config: self.config.clone(),
            registry: self.registry.clone(),
            boards: self.boards.clone(),
            event_tx: self.event_tx.clone(),
            stats: self.stats.clone(),
            shutdown: self.shutdown.clone(),
        };
        tokio::spawn(runner.run(ready))
    }
}

/// Owns one board's connection lifecycle
struct BoardRunner {
    board: BoardId,
    addr: SocketAddr,
    config: LinkConfig,
    registry: Arc<ChannelRegistry>,
    boards: Arc<DashMap<BoardId, BoardLink>>,
    event_tx: mpsc::Sender<LinkEvent>,
    stats: Arc<GatewayStats>,
    shutdown: CancellationToken,
}

impl BoardRunner {
    async fn run(self, mut ready: Option<oneshot::Sender<bool>>) {
        let mut attempt: u32 = 0;
        let mut backoff = self.config.reconnect_backoff;

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            self.set_state(BoardState::Connecting);
            match self.connect().await {
                Ok(stream) => {
                    attempt = 0;
                    backoff = self.config.reconnect_backoff;

                    let (read_half, write_half) = stream.into_split();
                    self.install_writer(write_half);
                    self.set_state(BoardState::Connected);
                    if let Some(tx) = ready.take() {
                        tx.send(true).ok();
                    }
                    info!("board {} connected at {}", self.board, self.addr);
                    self.event_tx
                        .send(LinkEvent::Connected {
                            board: self.board,
                            peer: self.addr,
                        })
                        .await
                        .ok();

                    let exit = self.receive_loop(read_half).await;

                    self.clear_writer();
                    self.set_state(BoardState::Disconnected);
                    self.event_tx
                        .send(LinkEvent::Disconnected { board: self.board })
                        .await
                        .ok();

                    match exit {
                        LoopExit::Shutdown => break,
                        LoopExit::PeerClosed => {
                            info!("board {} closed the connection", self.board)
                        }
                        LoopExit::Idle => warn!(
                            "board {} silent for {:?}; recycling connection",
                            self.board, self.config.idle_timeout
                        ),
                        LoopExit::ReadError(e) => {
                            warn!("board {} read error: {}", self.board, e)
                        }
                    }
                }
                Err(e) => {
                    self.set_state(BoardState::Disconnected);
                    if let Some(tx) = ready.take() {
                        tx.send(false).ok();
                    }
                    warn!("board {} connect to {} failed: {}", self.board, self.addr, e);
                }
            }

            if self.shutdown.is_cancelled() {
                self.set_state(BoardState::Disconnected);
                break;
            }

            attempt += 1;
            if attempt > self.config.max_reconnect_attempts {
                warn!(
                    "board {} spent its {} reconnection attempts; faulted until restarted",
                    self.board, self.config.max_reconnect_attempts
                );
                self.set_state(BoardState::Faulted);
                self.event_tx
                    .send(LinkEvent::Faulted { board: self.board })
                    .await
                    .ok();
                break;
            }

            self.stats.record_reconnect();
            debug!(
                "board {} retrying in {:?} (attempt {}/{})",
                self.board, backoff, attempt, self.config.max_reconnect_attempts
            );
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(MAX_RECONNECT_BACKOFF);
        }
    }

    async fn connect(&self) -> io::Result<TcpStream> {
        let socket = TcpSocket::new_v4()?;
        socket.set_recv_buffer_size(self.config.recv_buffer_size)?;
        socket.set_send_buffer_size(self.config.send_buffer_size)?;

        match tokio::time::timeout(self.config.connect_timeout, socket.connect(self.addr)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "connection attempt timed out",
            )),
        }
    }

    /// Read, reassemble, decode, and store until the connection dies.
    ///
    /// Partial reads stay buffered; a malformed frame is dropped with a
    /// warning and the loop keeps going.
    async fn receive_loop(&self, mut reader: OwnedReadHalf) -> LoopExit {
        let mut assembler = FrameAssembler::new();
        let mut buffer = BytesMut::with_capacity(self.config.recv_buffer_size as usize);
        let mut last_activity = Instant::now();

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    return LoopExit::Shutdown;
                }

                read_result = reader.read_buf(&mut buffer) => {
                    match read_result {
                        Ok(0) => return LoopExit::PeerClosed,
                        Ok(n) => {
                            last_activity = Instant::now();
                            self.stats.record_read(n);

                            while let Some(frame) = assembler.assemble(&mut buffer) {
                                self.stats.record_frame();
                                match decode_frame(self.board, &frame) {
                                    Ok(readings) => {
                                        for reading in readings {
                                            self.registry.update(reading);
                                            self.stats.record_reading();
                                        }
                                    }
                                    Err(e) => {
                                        warn!("board {} dropped a malformed frame: {}", self.board, e);
                                        self.stats.record_dropped();
                                    }
                                }
                            }
                        }
                        Err(e) => return LoopExit::ReadError(e),
                    }
                }

                _ = tokio::time::sleep_until((last_activity + self.config.idle_timeout).into()) => {
                    return LoopExit::Idle;
                }
            }
        }
    }

    fn set_state(&self, state: BoardState) {
        self.boards
            .entry(self.board)
            .or_insert_with(BoardLink::new)
            .state = state;
    }

    fn install_writer(&self, writer: OwnedWriteHalf) {
        self.boards
            .entry(self.board)
            .or_insert_with(BoardLink::new)
            .writer = Some(Arc::new(Mutex::new(writer)));
    }

    fn clear_writer(&self) {
        if let Some(mut link) = self.boards.get_mut(&self.board) {
            link.writer = None;
        }
    }
}
