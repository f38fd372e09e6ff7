//! One monitor per task, driven by timers and a command mailbox.

use std::collections::BTreeSet;
use std::future::pending;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use crate::monitor::{MonitorError, TopologyMonitor};
use crate::observer::{SubscriptionHandle, TopologyObserver};
use crate::types::{Edge, LocalView, NodeId, OperationalEdge, TopologyKind};

use super::network::Delivery;

/// Error type for talking to a node task.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The node task is no longer running.
    #[error("Node {0} is stopped")]
    NodeStopped(NodeId),
    /// The monitor rejected the request.
    #[error(transparent)]
    Monitor(#[from] MonitorError),
}

enum Command {
    LocalView {
        kind: TopologyKind,
        reply: oneshot::Sender<LocalView>,
    },
    Neighbors {
        kind: TopologyKind,
        reply: oneshot::Sender<BTreeSet<Edge>>,
    },
    NeighborNodes {
        kind: TopologyKind,
        reply: oneshot::Sender<BTreeSet<NodeId>>,
    },
    PossibleOperations {
        kind: TopologyKind,
        reply: oneshot::Sender<Result<Vec<OperationalEdge>, MonitorError>>,
    },
    PerformOperation {
        kind: TopologyKind,
        operation: OperationalEdge,
        reply: oneshot::Sender<Result<(), MonitorError>>,
    },
    AddNeighbor {
        kind: TopologyKind,
        neighbor: NodeId,
        reply: oneshot::Sender<Result<(), MonitorError>>,
    },
    RemoveNeighbor {
        kind: TopologyKind,
        neighbor: NodeId,
        reply: oneshot::Sender<Result<(), MonitorError>>,
    },
    AddObserver {
        observer: Arc<dyn TopologyObserver>,
        reply: oneshot::Sender<SubscriptionHandle>,
    },
    RemoveObserver {
        handle: SubscriptionHandle,
        reply: oneshot::Sender<bool>,
    },
    Shutdown,
}

/// Handle to a spawned node.
#[derive(Debug)]
pub struct NodeHandle {
    node: NodeId,
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<TopologyMonitor>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::LocalView { .. } => "LocalView",
            Self::Neighbors { .. } => "Neighbors",
            Self::NeighborNodes { .. } => "NeighborNodes",
            Self::PossibleOperations { .. } => "PossibleOperations",
            Self::PerformOperation { .. } => "PerformOperation",
            Self::AddNeighbor { .. } => "AddNeighbor",
            Self::RemoveNeighbor { .. } => "RemoveNeighbor",
            Self::AddObserver { .. } => "AddObserver",
            Self::RemoveObserver { .. } => "RemoveObserver",
            Self::Shutdown => "Shutdown",
        };
        f.write_str(name)
    }
}

impl NodeHandle {
    /// Node driven by this task.
    pub fn node(&self) -> NodeId {
        self.node
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, RuntimeError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .map_err(|_| RuntimeError::NodeStopped(self.node))?;
        response.await.map_err(|_| RuntimeError::NodeStopped(self.node))
    }

    /// K-local view in the requested topology.
    pub async fn local_view(&self, kind: TopologyKind) -> Result<LocalView, RuntimeError> {
        self.request(|reply| Command::LocalView { kind, reply }).await
    }

    /// Outgoing edges of the node in the requested topology.
    pub async fn neighbors(&self, kind: TopologyKind) -> Result<BTreeSet<Edge>, RuntimeError> {
        self.request(|reply| Command::Neighbors { kind, reply }).await
    }

    /// Successor nodes of the node in the requested topology.
    pub async fn neighbor_nodes(&self, kind: TopologyKind) -> Result<BTreeSet<NodeId>, RuntimeError> {
        self.request(|reply| Command::NeighborNodes { kind, reply }).await
    }

    /// Operations the node may perform around itself.
    pub async fn possible_edge_operations(&self, kind: TopologyKind) -> Result<Vec<OperationalEdge>, RuntimeError> {
        Ok(self
            .request(|reply| Command::PossibleOperations { kind, reply })
            .await??)
    }

    /// Apply and flood an edge operation.
    pub async fn perform_operation(&self, kind: TopologyKind, operation: OperationalEdge) -> Result<(), RuntimeError> {
        Ok(self
            .request(|reply| Command::PerformOperation {
                kind,
                operation,
                reply,
            })
            .await??)
    }

    /// Disable the link to `neighbor` and tombstone it. Not flooded.
    pub async fn remove_neighbor(&self, kind: TopologyKind, neighbor: NodeId) -> Result<(), RuntimeError> {
        Ok(self
            .request(|reply| Command::RemoveNeighbor { kind, neighbor, reply })
            .await??)
    }

    /// Enable the link to `neighbor` and lift its tombstone. Not flooded.
    pub async fn add_neighbor(&self, kind: TopologyKind, neighbor: NodeId) -> Result<(), RuntimeError> {
        Ok(self
            .request(|reply| Command::AddNeighbor { kind, neighbor, reply })
            .await??)
    }

    /// Register an observer.
    pub async fn add_topology_observer(
        &self,
        observer: Arc<dyn TopologyObserver>,
    ) -> Result<SubscriptionHandle, RuntimeError> {
        self.request(|reply| Command::AddObserver { observer, reply }).await
    }

    /// Unregister an observer.
    pub async fn remove_topology_observer(&self, handle: SubscriptionHandle) -> Result<bool, RuntimeError> {
        self.request(|reply| Command::RemoveObserver { handle, reply }).await
    }

    /// Stop the task and take back the monitor.
    pub async fn shutdown(self) -> Result<TopologyMonitor, RuntimeError> {
        // The task may already be gone; joining tells us
        let _ = self.commands.send(Command::Shutdown);
        self.task.await.map_err(|_| RuntimeError::NodeStopped(self.node))
    }
}

/// Spawn a task driving `monitor` with frames from `inbox`.
///
/// The first beacon fires immediately; later ones follow the jittered delays
/// the monitor returns. The collector runs on the configured schedule.
pub fn spawn_node(monitor: TopologyMonitor, inbox: mpsc::UnboundedReceiver<Delivery>) -> NodeHandle {
    let node = monitor.local_node();
    let (commands, mailbox) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(monitor, inbox, mailbox));
    NodeHandle { node, commands, task }
}

async fn tick(collector: &mut Option<Interval>) {
    match collector {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending::<()>().await,
    }
}

async fn run(
    mut monitor: TopologyMonitor,
    mut inbox: mpsc::UnboundedReceiver<Delivery>,
    mut mailbox: mpsc::UnboundedReceiver<Command>,
) -> TopologyMonitor {
    let node = monitor.local_node();
    let beacon = time::sleep_until(Instant::now());
    tokio::pin!(beacon);

    let mut collector = monitor.config().collector.interval().map(|period| {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    tracing::info!(node = %node, "Node task started");

    loop {
        tokio::select! {
            () = &mut beacon => {
                match monitor.beacon() {
                    Some(delay) => beacon.as_mut().reset(Instant::now() + delay),
                    None => break,
                }
            }
            () = tick(&mut collector) => {
                monitor.collect_stale();
            }
            Some(delivery) = inbox.recv() => {
                // Failures are logged and counted by the monitor
                let _ = monitor.handle_frame(delivery.sender, delivery.distance, &delivery.frame);
            }
            command = mailbox.recv() => match command {
                Some(Command::Shutdown) | None => break,
                Some(command) => handle(&mut monitor, command),
            },
        }
    }

    monitor.shutdown();
    tracing::info!(node = %node, "Node task stopped");
    monitor
}

fn handle(monitor: &mut TopologyMonitor, command: Command) {
    // A dropped receiver means the caller gave up waiting
    match command {
        Command::LocalView { kind, reply } => {
            let _ = reply.send(monitor.local_view(kind));
        }
        Command::Neighbors { kind, reply } => {
            let _ = reply.send(monitor.neighbors(kind));
        }
        Command::NeighborNodes { kind, reply } => {
            let _ = reply.send(monitor.neighbor_nodes(kind));
        }
        Command::PossibleOperations { kind, reply } => {
            let _ = reply.send(monitor.possible_edge_operations(kind));
        }
        Command::PerformOperation {
            kind,
            operation,
            reply,
        } => {
            let _ = reply.send(monitor.perform_operation(kind, operation));
        }
        Command::AddNeighbor { kind, neighbor, reply } => {
            let _ = reply.send(monitor.add_neighbor(kind, neighbor));
        }
        Command::RemoveNeighbor { kind, neighbor, reply } => {
            let _ = reply.send(monitor.remove_neighbor(kind, neighbor));
        }
        Command::AddObserver { observer, reply } => {
            let _ = reply.send(monitor.add_topology_observer(observer));
        }
        Command::RemoveObserver { handle, reply } => {
            let _ = reply.send(monitor.remove_topology_observer(handle));
        }
        Command::Shutdown => {}
    }
}
