//! Dependency-graph engine: cycle detection, level assignment, ready sets,
//! critical paths.
//!
//! A [`DepGraph`] is an immutable value built from one plan's tasks and
//! edges. Building never touches the store; a build failure is fatal for
//! its plan but leaves no state behind.

use crate::error::{Result, TaskctlError};
use crate::model::TaskDependency;
use crate::types::TaskStatus;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone)]
pub struct DepGraph {
    /// Input insertion order; all iteration and tie-breaking follows it.
    order: Vec<String>,
    levels: HashMap<String, u32>,
    dependencies: HashMap<String, Vec<String>>,
    dependents: HashMap<String, Vec<String>>,
    by_level: BTreeMap<u32, Vec<String>>,
    max_level: u32,
}

/// Validate an externally supplied edge set against a task id universe:
/// every endpoint exists, no self-edges, no duplicates. Cycle detection
/// happens in [`build`].
pub fn validate_edges(task_ids: &[String], edges: &[TaskDependency]) -> Result<()> {
    let known: BTreeSet<&str> = task_ids.iter().map(String::as_str).collect();
    let mut seen: BTreeSet<(&str, &str)> = BTreeSet::new();
    for edge in edges {
        if !known.contains(edge.task_id.as_str()) {
            return Err(TaskctlError::NotFound {
                entity: "task",
                id: edge.task_id.clone(),
            });
        }
        if !known.contains(edge.depends_on_id.as_str()) {
            return Err(TaskctlError::NotFound {
                entity: "task",
                id: edge.depends_on_id.clone(),
            });
        }
        if edge.task_id == edge.depends_on_id {
            return Err(TaskctlError::Invalid(format!(
                "task {} cannot depend on itself",
                edge.task_id
            )));
        }
        if !seen.insert((edge.task_id.as_str(), edge.depends_on_id.as_str())) {
            return Err(TaskctlError::Invalid(format!(
                "duplicate dependency {} -> {}",
                edge.task_id, edge.depends_on_id
            )));
        }
    }
    Ok(())
}

/// Build the graph for one plan. Rejects unknown endpoints, self-edges,
/// duplicates, and cycles.
pub fn build(task_ids: &[String], edges: &[TaskDependency]) -> Result<DepGraph> {
    validate_edges(task_ids, edges)?;

    let mut dependencies: HashMap<String, Vec<String>> = HashMap::new();
    let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
    for id in task_ids {
        dependencies.entry(id.clone()).or_default();
        dependents.entry(id.clone()).or_default();
    }
    for edge in edges {
        dependencies
            .get_mut(&edge.task_id)
            .expect("endpoint validated")
            .push(edge.depends_on_id.clone());
        dependents
            .get_mut(&edge.depends_on_id)
            .expect("endpoint validated")
            .push(edge.task_id.clone());
    }

    let levels = assign_levels(task_ids, &dependencies)?;

    let mut by_level: BTreeMap<u32, Vec<String>> = BTreeMap::new();
    let mut max_level = 0;
    for id in task_ids {
        let level = levels[id];
        by_level.entry(level).or_default().push(id.clone());
        max_level = max_level.max(level);
    }

    Ok(DepGraph {
        order: task_ids.to_vec(),
        levels,
        dependencies,
        dependents,
        by_level,
        max_level,
    })
}

/// Depth-first traversal from every unvisited node. The visiting set is
/// per-path so diamonds traverse cleanly; a back-edge into it is a cycle,
/// reported against the first-visited node of that cycle. Post-order gives
/// `level = 1 + max(level of dependency)`, 0 for roots.
fn assign_levels(
    order: &[String],
    dependencies: &HashMap<String, Vec<String>>,
) -> Result<HashMap<String, u32>> {
    enum Frame<'a> {
        Enter(&'a str),
        Exit(&'a str),
    }

    let mut levels: HashMap<String, u32> = HashMap::new();
    let mut visiting: BTreeSet<&str> = BTreeSet::new();

    for start in order {
        if levels.contains_key(start) {
            continue;
        }
        let mut stack = vec![Frame::Enter(start.as_str())];
        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Enter(id) => {
                    if levels.contains_key(id) {
                        continue;
                    }
                    visiting.insert(id);
                    stack.push(Frame::Exit(id));
                    for dep in &dependencies[id] {
                        if visiting.contains(dep.as_str()) {
                            return Err(TaskctlError::Cycle {
                                involving: dep.clone(),
                            });
                        }
                        if !levels.contains_key(dep.as_str()) {
                            stack.push(Frame::Enter(dep));
                        }
                    }
                }
                Frame::Exit(id) => {
                    visiting.remove(id);
                    let level = dependencies[id]
                        .iter()
                        .map(|dep| levels[dep.as_str()] + 1)
                        .max()
                        .unwrap_or(0);
                    levels.insert(id.to_string(), level);
                }
            }
        }
    }
    Ok(levels)
}

impl DepGraph {
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.levels.contains_key(id)
    }

    /// Task ids in input insertion order.
    pub fn task_ids(&self) -> &[String] {
        &self.order
    }

    pub fn level(&self, id: &str) -> Option<u32> {
        self.levels.get(id).copied()
    }

    pub fn max_level(&self) -> u32 {
        self.max_level
    }

    pub fn dependencies_of(&self, id: &str) -> &[String] {
        self.dependencies.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn dependents_of(&self, id: &str) -> &[String] {
        self.dependents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn tasks_at_level(&self, level: u32) -> &[String] {
        self.by_level.get(&level).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Tasks whose status is schedulable and whose dependencies are all in
    /// `completed`. Pure and idempotent; result ordered by (level, id).
    pub fn ready_set(
        &self,
        statuses: &HashMap<String, TaskStatus>,
        completed: &BTreeSet<String>,
    ) -> Vec<String> {
        let mut ready: Vec<&String> = self
            .order
            .iter()
            .filter(|id| {
                statuses
                    .get(id.as_str())
                    .is_some_and(|s| s.is_schedulable())
            })
            .filter(|id| {
                self.dependencies[id.as_str()]
                    .iter()
                    .all(|dep| completed.contains(dep))
            })
            .collect();
        ready.sort_by_key(|id| (self.levels[id.as_str()], *id));
        ready.into_iter().cloned().collect()
    }

    /// Longest chain from a root to a max-level task, root first. Starts at
    /// the first task (insertion order) at `max_level` and repeatedly follows
    /// the dependency with the highest level, first-seen on ties.
    pub fn critical_path(&self) -> Vec<String> {
        let Some(start) = self
            .order
            .iter()
            .find(|id| self.levels[id.as_str()] == self.max_level)
        else {
            return Vec::new();
        };

        let mut path = vec![start.clone()];
        let mut current = start.as_str();
        loop {
            let next = self.dependencies[current]
                .iter()
                .max_by_key(|dep| self.levels[dep.as_str()]);
            match next {
                Some(dep) => {
                    path.push(dep.clone());
                    current = dep.as_str();
                }
                None => break,
            }
        }
        path.reverse();
        path
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn edge(task: &str, dep: &str) -> TaskDependency {
        TaskDependency {
            task_id: task.into(),
            depends_on_id: dep.into(),
        }
    }

    fn all_pending(ids: &[String]) -> HashMap<String, TaskStatus> {
        ids.iter()
            .map(|id| (id.clone(), TaskStatus::Pending))
            .collect()
    }

    #[test]
    fn empty_graph() {
        let g = build(&[], &[]).unwrap();
        assert!(g.is_empty());
        assert_eq!(g.max_level(), 0);
        assert!(g.critical_path().is_empty());
        assert!(g
            .ready_set(&HashMap::new(), &BTreeSet::new())
            .is_empty());
    }

    #[test]
    fn single_task_is_level_zero() {
        let tasks = ids(&["A"]);
        let g = build(&tasks, &[]).unwrap();
        assert_eq!(g.level("A"), Some(0));
        assert_eq!(g.critical_path(), ids(&["A"]));
    }

    #[test]
    fn linear_chain_levels_and_critical_path() {
        let tasks = ids(&["A", "B", "C", "D"]);
        let edges = vec![edge("B", "A"), edge("C", "B"), edge("D", "C")];
        let g = build(&tasks, &edges).unwrap();
        assert_eq!(g.level("A"), Some(0));
        assert_eq!(g.level("D"), Some(3));
        assert_eq!(g.max_level(), 3);
        assert_eq!(g.critical_path(), ids(&["A", "B", "C", "D"]));

        let ready = g.ready_set(&all_pending(&tasks), &BTreeSet::new());
        assert_eq!(ready, ids(&["A"]));
    }

    #[test]
    fn diamond_levels() {
        // B and C depend on A; D depends on B and C.
        let tasks = ids(&["A", "B", "C", "D"]);
        let edges = vec![
            edge("B", "A"),
            edge("C", "A"),
            edge("D", "B"),
            edge("D", "C"),
        ];
        let g = build(&tasks, &edges).unwrap();
        assert_eq!(g.level("A"), Some(0));
        assert_eq!(g.level("B"), Some(1));
        assert_eq!(g.level("C"), Some(1));
        assert_eq!(g.level("D"), Some(2));

        let completed: BTreeSet<String> = ["A".to_string()].into();
        let mut statuses = all_pending(&tasks);
        statuses.insert("A".into(), TaskStatus::Completed);
        let ready = g.ready_set(&statuses, &completed);
        assert_eq!(ready, ids(&["B", "C"]));
    }

    #[test]
    fn cycle_rejected_with_first_visited() {
        let tasks = ids(&["A", "B", "C"]);
        let edges = vec![edge("A", "B"), edge("B", "C"), edge("C", "A")];
        match build(&tasks, &edges) {
            Err(TaskctlError::Cycle { involving }) => assert_eq!(involving, "A"),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn two_node_cycle() {
        let tasks = ids(&["A", "B"]);
        let edges = vec![edge("A", "B"), edge("B", "A")];
        assert!(matches!(
            build(&tasks, &edges),
            Err(TaskctlError::Cycle { .. })
        ));
    }

    #[test]
    fn self_edge_rejected() {
        let tasks = ids(&["A"]);
        assert!(matches!(
            build(&tasks, &[edge("A", "A")]),
            Err(TaskctlError::Invalid(_))
        ));
    }

    #[test]
    fn duplicate_edge_rejected() {
        let tasks = ids(&["A", "B"]);
        assert!(matches!(
            build(&tasks, &[edge("B", "A"), edge("B", "A")]),
            Err(TaskctlError::Invalid(_))
        ));
    }

    #[test]
    fn unknown_endpoint_rejected() {
        let tasks = ids(&["A"]);
        assert!(matches!(
            build(&tasks, &[edge("A", "Z")]),
            Err(TaskctlError::NotFound { .. })
        ));
    }

    #[test]
    fn level_monotonic_along_edges() {
        let tasks = ids(&["A", "B", "C", "D", "E"]);
        let edges = vec![
            edge("B", "A"),
            edge("C", "A"),
            edge("D", "B"),
            edge("D", "C"),
            edge("E", "D"),
        ];
        let g = build(&tasks, &edges).unwrap();
        for e in &edges {
            assert!(
                g.level(&e.task_id).unwrap() > g.level(&e.depends_on_id).unwrap(),
                "{} should sit above {}",
                e.task_id,
                e.depends_on_id
            );
        }
    }

    #[test]
    fn ready_set_is_idempotent() {
        let tasks = ids(&["A", "B"]);
        let edges = vec![edge("B", "A")];
        let g = build(&tasks, &edges).unwrap();
        let statuses = all_pending(&tasks);
        let completed = BTreeSet::new();
        let first = g.ready_set(&statuses, &completed);
        let second = g.ready_set(&statuses, &completed);
        assert_eq!(first, second);
    }

    #[test]
    fn ready_set_skips_blocked_and_active() {
        let tasks = ids(&["A", "B", "C"]);
        let g = build(&tasks, &[]).unwrap();
        let mut statuses = all_pending(&tasks);
        statuses.insert("A".into(), TaskStatus::Blocked);
        statuses.insert("B".into(), TaskStatus::Assigned);
        let ready = g.ready_set(&statuses, &BTreeSet::new());
        assert_eq!(ready, ids(&["C"]));
    }

    #[test]
    fn diamond_traversal_is_not_a_false_cycle() {
        // Shared dependency reached twice along different paths.
        let tasks = ids(&["D", "B", "C", "A"]);
        let edges = vec![
            edge("D", "B"),
            edge("D", "C"),
            edge("B", "A"),
            edge("C", "A"),
        ];
        let g = build(&tasks, &edges).unwrap();
        assert_eq!(g.level("D"), Some(2));
    }

    #[test]
    fn critical_path_length_matches_levels() {
        let tasks = ids(&["A", "B", "C", "X"]);
        let edges = vec![edge("B", "A"), edge("C", "B")];
        let g = build(&tasks, &edges).unwrap();
        // X is an isolated root; the path must run through the chain.
        assert_eq!(g.critical_path(), ids(&["A", "B", "C"]));
        assert_eq!(g.critical_path().len() as u32, g.max_level() + 1);
    }
}
