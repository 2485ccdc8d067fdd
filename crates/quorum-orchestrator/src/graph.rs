//! Dependency graph over submitted tasks.

use std::collections::{HashMap, HashSet};

use petgraph::graph::DiGraph;
use petgraph::visit::EdgeRef as _;
use petgraph::{Direction, algo};

use crate::task::{Task, TaskId};

/// Immutable dependency structure of one objective's decomposition.
///
/// Node weights are task ids only; task state lives with the orchestrator, so
/// the graph never goes stale as statuses change.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    graph: DiGraph<TaskId, ()>,
    nodes: HashMap<TaskId, petgraph::graph::NodeIndex>,
}

impl TaskGraph {
    /// Builds the graph from a decomposition. Edges point from a dependency
    /// to the task that waits on it; references to ids outside the
    /// decomposition are ignored here and rejected during submission
    /// validation.
    #[must_use]
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let mut graph = DiGraph::new();
        let mut nodes = HashMap::new();

        for task in tasks {
            let node = graph.add_node(task.id);
            nodes.insert(task.id, node);
        }

        for task in tasks {
            let task_node = nodes[&task.id];
            for dependency in &task.dependencies {
                if let Some(&dependency_node) = nodes.get(dependency) {
                    graph.add_edge(dependency_node, task_node, ());
                }
            }
        }

        Self { graph, nodes }
    }

    /// Ids whose dependencies are all in `completed` and which are not
    /// themselves completed.
    #[must_use]
    pub fn ready_tasks(&self, completed: &HashSet<TaskId>) -> Vec<TaskId> {
        self.graph
            .node_indices()
            .filter_map(|node| {
                let task_id = self.graph[node];
                if completed.contains(&task_id) {
                    return None;
                }

                let dependencies_met = self
                    .graph
                    .edges_directed(node, Direction::Incoming)
                    .all(|edge| completed.contains(&self.graph[edge.source()]));
                dependencies_met.then_some(task_id)
            })
            .collect()
    }

    /// Whether every task in the graph is completed.
    #[must_use]
    pub fn is_complete(&self, completed: &HashSet<TaskId>) -> bool {
        self.nodes.keys().all(|task_id| completed.contains(task_id))
    }

    /// Whether the decomposition contains a dependency cycle.
    #[must_use]
    pub fn has_cycles(&self) -> bool {
        algo::is_cyclic_directed(&self.graph)
    }

    /// Number of tasks in the graph.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Whether the graph tracks a task.
    #[must_use]
    pub fn contains(&self, task_id: TaskId) -> bool {
        self.nodes.contains_key(&task_id)
    }
}
