//! Core game server implementation.
//!
//! This module contains the main `GameServer` struct: listener setup, the
//! accept loops, the registry sweeper and shutdown coordination.

use crate::{
    capabilities::Capabilities,
    config::ServerConfig,
    connection::{ConnectionManager, GameServerResponseSender},
    dispatcher::Dispatcher,
    error::ServerError,
    server::handlers::handle_connection,
    stats::ServerStats,
};
use futures::stream::{FuturesUnordered, StreamExt};
use gambit_rooms::{RoomRegistry, TimeSource};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::TcpListener as StdTcpListener;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

/// The core game server structure.
///
/// `GameServer` owns the network edge. All game state lives behind the
/// [`Dispatcher`], which this struct feeds with connection lifecycle events
/// and inbound frames.
///
/// # Architecture
///
/// * **Connection Management**: WebSocket lifecycle and outbound queues
/// * **Dispatcher**: Sessions, rooms, clocks and settlement
/// * **Sweeper**: Periodic removal of abandoned and expired rooms
/// * **Multi-threaded Networking**: Configurable accept loop scaling
pub struct GameServer {
    /// Server configuration settings
    config: ServerConfig,

    /// Manager for client connections and messaging
    connection_manager: Arc<ConnectionManager>,

    /// Routes client events to rooms
    dispatcher: Arc<Dispatcher>,

    /// Channel for coordinating server shutdown
    shutdown_sender: broadcast::Sender<()>,
}

impl GameServer {
    /// Creates a new game server with the specified configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - Configuration parameters for server behavior
    /// * `capabilities` - Token verification, balance and settlement backends
    /// * `time` - Clock used by rooms, sessions and the rate limiter
    ///
    /// # Returns
    ///
    /// A new `GameServer` instance ready to be started.
    pub fn new(
        config: ServerConfig,
        capabilities: Capabilities,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        let connection_manager = Arc::new(ConnectionManager::new());
        let response_sender = Arc::new(GameServerResponseSender::new(connection_manager.clone()));
        let registry = Arc::new(RoomRegistry::new(config.rooms.clone(), time));
        let dispatcher = Arc::new(Dispatcher::new(
            &config,
            registry,
            response_sender,
            capabilities,
            Arc::new(ServerStats::default()),
        ));
        let (shutdown_sender, _) = broadcast::channel(1);

        Self {
            config,
            connection_manager,
            dispatcher,
            shutdown_sender,
        }
    }

    /// Starts the game server and begins accepting connections.
    ///
    /// # Startup Sequence
    ///
    /// 1. Start the registry sweeper
    /// 2. Create TCP listeners (one per core when `use_reuse_port` is set)
    /// 3. Run the accept loops until shutdown is requested
    /// 4. Stop every clock ticker
    ///
    /// # Returns
    ///
    /// `Ok(())` if the server started and stopped cleanly, or a `ServerError`
    /// if a listener could not be created.
    pub async fn start(&self) -> Result<(), ServerError> {
        info!("🚀 Starting game server on {}", self.config.bind_address);

        self.start_sweeper();
        info!(
            "🧹 Room sweeper started with interval: {}s",
            self.config.sweep_interval_secs
        );

        let core_count = num_cpus::get();
        let num_acceptors = if self.config.use_reuse_port {
            core_count
        } else {
            1
        };
        info!(
            "🧠 Detected {} CPU cores, using {} acceptor(s)",
            core_count, num_acceptors
        );

        let mut listeners = Vec::with_capacity(num_acceptors);
        for i in 0..num_acceptors {
            listeners.push(self.bind_listener()?);
            info!("✅ Listener {} bound on {}", i, self.config.bind_address);
        }

        let mut shutdown_receiver = self.shutdown_sender.subscribe();
        let max_connections = self.config.max_connections;

        let mut accept_futures = listeners
            .into_iter()
            .map(|listener| {
                let connection_manager = self.connection_manager.clone();
                let dispatcher = self.dispatcher.clone();

                async move {
                    loop {
                        match listener.accept().await {
                            Ok((stream, addr)) => {
                                if connection_manager.connection_count() >= max_connections {
                                    warn!(%addr, max_connections, "🚫 Connection limit reached, refusing client");
                                    continue;
                                }
                                let connection_manager = connection_manager.clone();
                                let dispatcher = dispatcher.clone();

                                tokio::spawn(async move {
                                    if let Err(e) = handle_connection(
                                        stream,
                                        addr,
                                        connection_manager,
                                        dispatcher,
                                    )
                                    .await
                                    {
                                        error!("Connection error: {}", e);
                                    }
                                });
                            }
                            Err(e) => {
                                error!("Failed to accept connection: {}", e);
                                break;
                            }
                        }
                    }
                }
            })
            .collect::<FuturesUnordered<_>>();

        tokio::select! {
            _ = accept_futures.next() => {}
            _ = shutdown_receiver.recv() => {
                info!("Shutdown signal received");
            }
        }

        info!("🧹 Performing server cleanup...");
        self.dispatcher.shutdown();
        info!(
            rooms = self.dispatcher.registry().len(),
            connections = self.connection_manager.connection_count(),
            "✅ Server stopped"
        );
        Ok(())
    }

    fn bind_listener(&self) -> Result<TcpListener, ServerError> {
        let address = self.config.bind_address;
        let socket = Socket::new(Domain::for_address(address), Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| ServerError::Network(format!("Socket creation failed: {e}")))?;
        socket.set_reuse_address(true).ok();

        if self.config.use_reuse_port {
            #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
            {
                match socket.set_reuse_port(true) {
                    Ok(()) => info!("SO_REUSEPORT enabled for load balancing across acceptor threads"),
                    Err(e) => warn!("Failed to set SO_REUSEPORT: {}", e),
                }
            }
            #[cfg(not(all(unix, not(any(target_os = "solaris", target_os = "illumos")))))]
            {
                warn!("SO_REUSEPORT is not supported on this platform. Using SO_REUSEADDR only.");
            }
        }

        socket
            .bind(&address.into())
            .map_err(|e| ServerError::Network(format!("Bind failed: {e}")))?;
        socket
            .listen(1024)
            .map_err(|e| ServerError::Network(format!("Listen failed: {e}")))?;

        let std_listener: StdTcpListener = socket.into();
        std_listener.set_nonblocking(true).ok();
        TcpListener::from_std(std_listener)
            .map_err(|e| ServerError::Network(format!("Tokio listener creation failed: {e}")))
    }

    /// Spawns the task that periodically evicts abandoned and expired
    /// rooms. It exits on shutdown.
    fn start_sweeper(&self) {
        if self.config.sweep_interval_secs == 0 {
            info!("⏸️ Room sweeper disabled (interval: 0s)");
            return;
        }
        let dispatcher = self.dispatcher.clone();
        let period = Duration::from_secs(self.config.sweep_interval_secs);
        let mut shutdown = self.shutdown_sender.subscribe();

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        dispatcher.sweep().await;
                    }
                    _ = shutdown.recv() => break,
                }
            }
        });
    }

    /// Initiates server shutdown.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the shutdown signal was sent successfully.
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        info!("🛑 Shutting down server...");
        let _ = self.shutdown_sender.send(());
        Ok(())
    }

    /// Gets a reference to the dispatcher.
    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    /// Gets the connection manager.
    pub fn connection_manager(&self) -> Arc<ConnectionManager> {
        self.connection_manager.clone()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}
