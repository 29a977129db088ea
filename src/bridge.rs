//! Thread-safe bridge between the control thread and the renderer.
//!
//! # Architecture
//!
//! - **Control thread** owns [`GraphHandle`], which implements [`AudioGraph`]
//! - **Audio thread** owns [`Renderer`] with the runtime [`Graph`]
//! - Commands travel over an MPSC channel; the sample clock comes back
//!   through an atomic
//!
//! Nodes are built and prepared on the control thread and shipped whole.
//! Removed nodes travel back the same way so that the audio thread never
//! frees them.
//!
//! # Usage
//!
//! ```ignore
//! let (mut handle, mut renderer) = create_bridge(&EngineConfig::default());
//!
//! // Control thread
//! let osc = handle.create_node(NodeKind::Oscillator)?;
//! handle.connect(osc, handle.destination())?;
//! handle.start(osc, handle.current_time())?;
//!
//! // Audio thread
//! let block = renderer.render(128);
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
    mpsc::{self, Receiver, Sender},
};

use crate::audio_graph::{AudioGraph, GraphError};
use crate::config::EngineConfig;
use crate::graph::{DESTINATION, Graph};
use crate::node::{Node, NodeId, NodeKind, ParamId};
use crate::node_factory::{NodeFactory, StandardNodes};
use crate::parameter::ParamEvent;

/// Structural and parameter changes for the renderer.
pub enum Command {
    AddNode {
        id: NodeId,
        kind: NodeKind,
        node: Box<dyn Node>,
    },
    RemoveNode {
        id: NodeId,
    },
    Connect {
        source: NodeId,
        dest: NodeId,
    },
    Disconnect {
        source: NodeId,
    },
    SetParam {
        node: NodeId,
        param: ParamId,
        value: f32,
    },
    ScheduleParam {
        node: NodeId,
        param: ParamId,
        event: ParamEvent,
    },
    Start {
        node: NodeId,
        at: f64,
    },
    Stop {
        node: NodeId,
        at: f64,
    },
}

/// Lock-free shared state for renderer -> control readback.
struct SharedReadback {
    sample_position: AtomicU64,
}

impl SharedReadback {
    fn new() -> Self {
        Self {
            sample_position: AtomicU64::new(0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlayState {
    Idle,
    Playing,
    Stopped,
}

/// Control-side record of a live node.
#[derive(Debug, Clone)]
struct NodeMirror {
    kind: NodeKind,
    play: PlayState,
    outputs: Vec<NodeId>,
}

/// Handle for the control thread.
///
/// Validates every request against a mirror of the render graph so that
/// errors surface synchronously and the renderer only sees valid commands.
pub struct GraphHandle {
    command_tx: Sender<Command>,
    retired_rx: Receiver<Box<dyn Node>>,
    readback: Arc<SharedReadback>,
    factory: Box<dyn NodeFactory>,

    mirror: Vec<Option<NodeMirror>>,
    free_ids: Vec<NodeId>,

    sample_rate: f64,
    max_block: usize,
}

/// Handle for the audio thread.
pub struct Renderer {
    graph: Graph,
    command_rx: Receiver<Command>,
    retired_tx: Sender<Box<dyn Node>>,
    readback: Arc<SharedReadback>,
    sample_pos: u64,
}

/// Create a linked control/render pair with the standard node set.
pub fn create_bridge(config: &EngineConfig) -> (GraphHandle, Renderer) {
    create_bridge_with_factory(config, Box::new(StandardNodes))
}

pub fn create_bridge_with_factory(
    config: &EngineConfig,
    factory: Box<dyn NodeFactory>,
) -> (GraphHandle, Renderer) {
    let (command_tx, command_rx) = mpsc::channel();
    let (retired_tx, retired_rx) = mpsc::channel();
    let readback = Arc::new(SharedReadback::new());

    let max_nodes = config.max_nodes.max(1);
    let max_block = config.max_block_size.max(1);

    let mut graph = Graph::new(max_nodes, max_block, config.sample_rate);
    let mut destination = factory.create(NodeKind::Destination);
    destination.prepare(config.sample_rate, max_block);
    // Slot 0 of a fresh graph is always free.
    let _ = graph.add_node(DESTINATION, NodeKind::Destination, destination);

    let mut mirror: Vec<Option<NodeMirror>> = vec![None; max_nodes];
    mirror[DESTINATION as usize] = Some(NodeMirror {
        kind: NodeKind::Destination,
        play: PlayState::Idle,
        outputs: Vec::new(),
    });

    let handle = GraphHandle {
        command_tx,
        retired_rx,
        readback: Arc::clone(&readback),
        factory,
        mirror,
        free_ids: (1..max_nodes as NodeId).rev().collect(),
        sample_rate: config.sample_rate,
        max_block,
    };

    let renderer = Renderer {
        graph,
        command_rx,
        retired_tx,
        readback,
        sample_pos: 0,
    };

    (handle, renderer)
}

// ═══════════════════════════════════════════════════════════════════
// GraphHandle - Control Thread API
// ═══════════════════════════════════════════════════════════════════

impl GraphHandle {
    fn send(&self, cmd: Command) -> Result<(), GraphError> {
        self.command_tx
            .send(cmd)
            .map_err(|_| GraphError::Disconnected)
    }

    fn live(&self, node: NodeId) -> Result<&NodeMirror, GraphError> {
        self.mirror
            .get(node as usize)
            .and_then(Option::as_ref)
            .ok_or(GraphError::UnknownNode { node })
    }

    fn live_mut(&mut self, node: NodeId) -> Result<&mut NodeMirror, GraphError> {
        self.mirror
            .get_mut(node as usize)
            .and_then(Option::as_mut)
            .ok_or(GraphError::UnknownNode { node })
    }

    /// Whether `to` can be reached from `from` along existing edges.
    fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut visited = vec![false; self.mirror.len()];
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            if std::mem::replace(&mut visited[id as usize], true) {
                continue;
            }
            if let Some(Some(node)) = self.mirror.get(id as usize) {
                stack.extend_from_slice(&node.outputs);
            }
        }
        false
    }

    /// Drop nodes the renderer has handed back.
    pub fn collect_garbage(&mut self) -> usize {
        self.retired_rx.try_iter().count()
    }

    /// Number of live nodes, destination included.
    pub fn node_count(&self) -> usize {
        self.mirror.iter().filter(|n| n.is_some()).count()
    }

    pub fn kind(&self, node: NodeId) -> Option<NodeKind> {
        self.live(node).ok().map(|n| n.kind)
    }

    pub fn is_playing(&self, node: NodeId) -> bool {
        self.live(node)
            .map(|n| n.play == PlayState::Playing)
            .unwrap_or(false)
    }

    /// Current renderer position in samples.
    pub fn sample_position(&self) -> u64 {
        self.readback.sample_position.load(Ordering::Relaxed)
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}

impl AudioGraph for GraphHandle {
    fn create_node(&mut self, kind: NodeKind) -> Result<NodeId, GraphError> {
        self.collect_garbage();

        if kind == NodeKind::Destination {
            return Err(GraphError::InvalidState {
                node: DESTINATION,
                reason: "the destination already exists",
            });
        }
        let id = self.free_ids.pop().ok_or(GraphError::CapacityExceeded {
            max: self.mirror.len(),
        })?;

        let mut node = self.factory.create(kind);
        node.prepare(self.sample_rate, self.max_block);

        if let Err(e) = self.send(Command::AddNode { id, kind, node }) {
            self.free_ids.push(id);
            return Err(e);
        }

        self.mirror[id as usize] = Some(NodeMirror {
            kind,
            play: PlayState::Idle,
            outputs: Vec::new(),
        });
        Ok(id)
    }

    fn connect(&mut self, source: NodeId, dest: NodeId) -> Result<(), GraphError> {
        self.live(source)?;
        self.live(dest)?;
        if source == dest || self.reaches(dest, source) {
            return Err(GraphError::Cycle {
                from: source,
                to: dest,
            });
        }

        self.send(Command::Connect { source, dest })?;
        let outputs = &mut self.live_mut(source)?.outputs;
        if !outputs.contains(&dest) {
            outputs.push(dest);
        }
        Ok(())
    }

    fn disconnect(&mut self, node: NodeId) -> Result<(), GraphError> {
        self.live(node)?;
        self.send(Command::Disconnect { source: node })?;
        self.live_mut(node)?.outputs.clear();
        Ok(())
    }

    fn destroy_node(&mut self, node: NodeId) -> Result<(), GraphError> {
        self.live(node)?;
        if node == DESTINATION {
            return Err(GraphError::InvalidState {
                node,
                reason: "the destination cannot be destroyed",
            });
        }

        self.send(Command::RemoveNode { id: node })?;
        self.mirror[node as usize] = None;
        for other in self.mirror.iter_mut().flatten() {
            other.outputs.retain(|&o| o != node);
        }
        self.free_ids.push(node);
        Ok(())
    }

    fn start(&mut self, node: NodeId, at: f64) -> Result<(), GraphError> {
        let mirror = self.live(node)?;
        if !mirror.kind.is_source() {
            return Err(GraphError::InvalidState {
                node,
                reason: "not a source node",
            });
        }
        if mirror.play != PlayState::Idle {
            return Err(GraphError::InvalidState {
                node,
                reason: "already started",
            });
        }

        self.send(Command::Start { node, at })?;
        self.live_mut(node)?.play = PlayState::Playing;
        Ok(())
    }

    fn stop(&mut self, node: NodeId, at: f64) -> Result<(), GraphError> {
        if self.live(node)?.play != PlayState::Playing {
            return Err(GraphError::InvalidState {
                node,
                reason: "not playing",
            });
        }

        self.send(Command::Stop { node, at })?;
        self.live_mut(node)?.play = PlayState::Stopped;
        Ok(())
    }

    fn set_param(&mut self, node: NodeId, param: ParamId, value: f32) -> Result<(), GraphError> {
        self.live(node)?;
        self.send(Command::SetParam { node, param, value })
    }

    fn schedule_param(
        &mut self,
        node: NodeId,
        param: ParamId,
        event: ParamEvent,
    ) -> Result<(), GraphError> {
        self.live(node)?;
        self.send(Command::ScheduleParam { node, param, event })
    }

    fn current_time(&self) -> f64 {
        self.sample_position() as f64 / self.sample_rate
    }

    fn destination(&self) -> NodeId {
        DESTINATION
    }
}

// ═══════════════════════════════════════════════════════════════════
// Renderer - Audio Thread API
// ═══════════════════════════════════════════════════════════════════

impl Renderer {
    /// Apply all pending commands.
    ///
    /// Call this at the start of each audio block. Returns the number of
    /// commands applied.
    pub fn process_commands(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(cmd) = self.command_rx.try_recv() {
            self.apply(cmd);
            applied += 1;
        }
        applied
    }

    #[inline]
    fn apply(&mut self, cmd: Command) {
        match cmd {
            Command::AddNode { id, kind, node } => {
                if let Err(node) = self.graph.add_node(id, kind, node) {
                    let _ = self.retired_tx.send(node);
                }
            }
            Command::RemoveNode { id } => {
                if let Some(node) = self.graph.remove_node(id) {
                    let _ = self.retired_tx.send(node);
                }
            }
            Command::Connect { source, dest } => {
                self.graph.connect(source, dest);
            }
            Command::Disconnect { source } => self.graph.disconnect(source),
            Command::SetParam { node, param, value } => self.graph.set_param(node, param, value),
            Command::ScheduleParam { node, param, event } => {
                self.graph.schedule(node, param, event)
            }
            Command::Start { node, at } => self.graph.start(node, at),
            Command::Stop { node, at } => self.graph.stop(node, at),
        }
    }

    /// Render one block (at most `max_block` frames) and return the
    /// destination output.
    pub fn render(&mut self, frames: usize) -> &[f32] {
        self.process_commands();
        let frames = frames.min(self.graph.max_block);
        self.graph.process(frames, self.sample_pos);
        self.sample_pos += frames as u64;
        self.readback
            .sample_position
            .store(self.sample_pos, Ordering::Relaxed);
        self.graph.output(frames)
    }

    /// Fill `out` completely, rendering as many blocks as needed.
    pub fn render_into(&mut self, out: &mut [f32]) {
        let max_block = self.graph.max_block;
        for chunk in out.chunks_mut(max_block) {
            let block = self.render(chunk.len());
            chunk.copy_from_slice(block);
        }
    }

    /// Render mono and duplicate into both channels.
    pub fn render_stereo(&mut self, left: &mut [f32], right: &mut [f32]) {
        self.render_into(left);
        let n = left.len().min(right.len());
        right[..n].copy_from_slice(&left[..n]);
    }

    #[inline]
    pub fn sample_position(&self) -> u64 {
        self.sample_pos
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.graph.sample_rate
    }

    /// Clear all DSP state (delay lines, filter memory).
    pub fn reset(&mut self) {
        self.graph.reset();
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }
}
