use crate::geom::{axis_diff, is_orthogonal};
use crate::params::GridGraphParams;
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Vector2;
use pinhole_gauge_core::Corner;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NeighborDirection {
    Right,
    Left,
    Up,
    Down,
}

impl NeighborDirection {
    pub fn opposite(self) -> Self {
        match self {
            Self::Right => Self::Left,
            Self::Left => Self::Right,
            Self::Up => Self::Down,
            Self::Down => Self::Up,
        }
    }

    /// Grid step `(di, dj)` taken when following this direction.
    pub fn step(self) -> (i32, i32) {
        match self {
            Self::Right => (1, 0),
            Self::Left => (-1, 0),
            Self::Up => (0, -1),
            Self::Down => (0, 1),
        }
    }

    fn slot(self) -> usize {
        match self {
            Self::Right => 0,
            Self::Left => 1,
            Self::Up => 2,
            Self::Down => 3,
        }
    }
}

#[derive(Clone, Debug)]
pub struct NodeNeighbor {
    pub direction: NeighborDirection,
    pub index: usize,
    pub distance: f32,
    pub score: f32,
}

/// Classify `vec` against grid axes `u = axis`, `v = axis + π/2`.
///
/// `u` is the axis closest to image `x`, so `+u` is "right" and `+v` (image
/// `y` grows downward) is "down".
fn direction_along_axes(vec: &Vector2<f32>, axis: f32) -> NeighborDirection {
    let u = Vector2::new(axis.cos(), axis.sin());
    let v = Vector2::new(-axis.sin(), axis.cos());
    let pu = vec.dot(&u);
    let pv = vec.dot(&v);
    if pu.abs() > pv.abs() {
        if pu >= 0.0 {
            NeighborDirection::Right
        } else {
            NeighborDirection::Left
        }
    } else if pv >= 0.0 {
        NeighborDirection::Down
    } else {
        NeighborDirection::Up
    }
}

fn is_good_neighbor(
    corner: &Corner,
    neighbor: &Corner,
    neighbor_index: usize,
    params: &GridGraphParams,
    grid_axis: f32,
) -> Option<NodeNeighbor> {
    let tol = params.orientation_tolerance_deg.to_radians();

    // 1. Adjacent X-corners have swapped colours, so their diagonals are orthogonal.
    if !is_orthogonal(corner.orientation, neighbor.orientation, tol) {
        return None;
    }

    // 2. Distance between corners within expected spacing.
    let vec_to_neighbor = neighbor.position - corner.position;
    let distance = vec_to_neighbor.norm();
    if distance < params.min_spacing_pix || distance > params.max_spacing_pix {
        return None;
    }

    // 3. The connecting edge runs along a grid line, at ~45° to both diagonals.
    let edge_angle = vec_to_neighbor.y.atan2(vec_to_neighbor.x);
    let expected = std::f32::consts::FRAC_PI_4;
    let score_corner = (axis_diff(corner.orientation, edge_angle) - expected).abs();
    let score_neighbor = (axis_diff(neighbor.orientation, edge_angle) - expected).abs();
    if score_corner > tol || score_neighbor > tol {
        return None;
    }

    let score_orientation =
        (std::f32::consts::FRAC_PI_2 - axis_diff(corner.orientation, neighbor.orientation)).abs();

    Some(NodeNeighbor {
        direction: direction_along_axes(&vec_to_neighbor, grid_axis),
        index: neighbor_index,
        distance,
        score: score_corner + score_neighbor + score_orientation,
    })
}

/// Keep at most one neighbor per direction, choosing the lowest-score candidate.
fn select_neighbors(candidates: Vec<NodeNeighbor>) -> Vec<NodeNeighbor> {
    let mut best: [Option<NodeNeighbor>; 4] = [None, None, None, None];

    for candidate in candidates {
        let slot = &mut best[candidate.direction.slot()];
        let replace = match slot {
            None => true,
            Some(current) => {
                candidate.score < current.score
                    || (candidate.score == current.score && candidate.distance < current.distance)
            }
        };
        if replace {
            *slot = Some(candidate);
        }
    }

    best.into_iter().flatten().collect()
}

/// 4-connected neighbourhood graph over corner candidates.
///
/// Edges are kept only when both endpoints chose each other in opposite
/// directions, so the graph is symmetric.
pub struct GridGraph {
    pub neighbors: Vec<Vec<NodeNeighbor>>,
}

impl GridGraph {
    pub fn new(corners: &[Corner], params: &GridGraphParams, grid_axis: f32) -> Self {
        if corners.is_empty() {
            return Self {
                neighbors: Vec::new(),
            };
        }

        let coords = corners
            .iter()
            .map(|c| [c.position.x, c.position.y])
            .collect::<Vec<_>>();
        let tree: KdTree<f32, 2> = (&coords).into();
        // The query point itself is always among the results.
        let k = (params.k_neighbors + 1).min(corners.len());

        let mut directed = Vec::with_capacity(corners.len());
        for (i, corner) in corners.iter().enumerate() {
            let query_point = [corner.position.x, corner.position.y];
            let candidates = tree
                .nearest_n::<SquaredEuclidean>(&query_point, k)
                .into_iter()
                .map(|nn| nn.item as usize)
                .filter(|&j| j != i)
                .filter_map(|j| is_good_neighbor(corner, &corners[j], j, params, grid_axis))
                .collect();
            directed.push(select_neighbors(candidates));
        }

        let neighbors = directed
            .iter()
            .enumerate()
            .map(|(i, list)| {
                list.iter()
                    .filter(|n| {
                        directed[n.index]
                            .iter()
                            .any(|back| back.index == i && back.direction == n.direction.opposite())
                    })
                    .cloned()
                    .collect()
            })
            .collect();

        Self { neighbors }
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }
}

pub fn connected_components(graph: &GridGraph) -> Vec<Vec<usize>> {
    let mut visited = vec![false; graph.len()];
    let mut components = Vec::new();

    for start in 0..graph.len() {
        if visited[start] {
            continue;
        }

        let mut component = Vec::new();
        let mut stack = vec![start];

        while let Some(node) = stack.pop() {
            if visited[node] {
                continue;
            }
            visited[node] = true;
            component.push(node);

            for neighbor in &graph.neighbors[node] {
                if !visited[neighbor.index] {
                    stack.push(neighbor.index);
                }
            }
        }

        component.sort_unstable();
        components.push(component);
    }

    components
}

/// Breadth-first integer coordinates `(node, i, j)` for one component.
///
/// Returns `None` when two paths disagree about a node's coordinates or two
/// nodes land on the same cell; such components are not a clean lattice.
pub fn assign_grid_coordinates(
    graph: &GridGraph,
    component: &[usize],
) -> Option<Vec<(usize, i32, i32)>> {
    let start = *component.first()?;
    let mut assigned: HashMap<usize, (i32, i32)> = HashMap::with_capacity(component.len());
    let mut occupied: HashSet<(i32, i32)> = HashSet::with_capacity(component.len());
    let mut coords = Vec::with_capacity(component.len());
    let mut queue = VecDeque::new();

    assigned.insert(start, (0, 0));
    occupied.insert((0, 0));
    queue.push_back(start);

    while let Some(node) = queue.pop_front() {
        let (i, j) = assigned[&node];
        coords.push((node, i, j));

        for neighbor in &graph.neighbors[node] {
            let (di, dj) = neighbor.direction.step();
            let expected = (i + di, j + dj);
            match assigned.get(&neighbor.index) {
                Some(&existing) if existing != expected => return None,
                Some(_) => {}
                None => {
                    if !occupied.insert(expected) {
                        return None;
                    }
                    assigned.insert(neighbor.index, expected);
                    queue.push_back(neighbor.index);
                }
            }
        }
    }

    Some(coords)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_4;

    fn make_corner(x: f32, y: f32, orientation: f32) -> Corner {
        Corner::new(x, y, orientation, 1.0)
    }

    fn neighbor_map(neighbors: &[NodeNeighbor]) -> HashMap<NeighborDirection, &NodeNeighbor> {
        neighbors.iter().map(|n| (n.direction, n)).collect()
    }

    fn lattice(cols: usize, rows: usize, spacing: f32) -> Vec<Corner> {
        let mut corners = Vec::new();
        for j in 0..rows {
            for i in 0..cols {
                let orientation = if (i + j) % 2 == 0 {
                    FRAC_PI_4
                } else {
                    -FRAC_PI_4
                };
                corners.push(make_corner(
                    i as f32 * spacing,
                    j as f32 * spacing,
                    orientation,
                ));
            }
        }
        corners
    }

    fn params() -> GridGraphParams {
        GridGraphParams {
            min_spacing_pix: 5.0,
            max_spacing_pix: 15.0,
            ..Default::default()
        }
    }

    #[test]
    fn finds_axis_neighbors_in_regular_grid() {
        let cols = 3;
        let corners = lattice(cols, 3, 10.0);
        let graph = GridGraph::new(&corners, &params(), 0.0);

        let idx = |i: usize, j: usize| j * cols + i;

        let center = neighbor_map(&graph.neighbors[idx(1, 1)]);
        assert_eq!(4, center.len());
        assert_eq!(idx(0, 1), center[&NeighborDirection::Left].index);
        assert_eq!(idx(2, 1), center[&NeighborDirection::Right].index);
        assert_eq!(idx(1, 0), center[&NeighborDirection::Up].index);
        assert_eq!(idx(1, 2), center[&NeighborDirection::Down].index);

        let top_left = neighbor_map(&graph.neighbors[idx(0, 0)]);
        assert_eq!(2, top_left.len());
        assert!(top_left.contains_key(&NeighborDirection::Right));
        assert!(top_left.contains_key(&NeighborDirection::Down));
    }

    #[test]
    fn rejects_neighbors_when_orientation_relation_invalid() {
        let corners = vec![
            make_corner(0.0, 0.0, FRAC_PI_4),
            make_corner(10.0, 0.0, FRAC_PI_4),
        ];
        let graph = GridGraph::new(&corners, &params(), 0.0);
        assert!(graph.neighbors[0].is_empty());
        assert!(graph.neighbors[1].is_empty());
    }

    #[test]
    fn rejects_neighbors_outside_distance_window() {
        let corners = vec![
            make_corner(0.0, 0.0, FRAC_PI_4),
            make_corner(30.0, 0.0, -FRAC_PI_4),
        ];
        let graph = GridGraph::new(&corners, &params(), 0.0);
        assert!(graph.neighbors[0].is_empty());
    }

    #[test]
    fn directions_follow_rotated_grid_axes() {
        // Grid rotated by 30°: "right" follows the rotated u axis, not image x.
        let a = 30f32.to_radians();
        let (u, v) = (Vector2::new(a.cos(), a.sin()), Vector2::new(-a.sin(), a.cos()));
        let mut corners = Vec::new();
        for j in 0..3 {
            for i in 0..3 {
                let p = u * (i as f32 * 10.0) + v * (j as f32 * 10.0);
                let o = a + if (i + j) % 2 == 0 { FRAC_PI_4 } else { -FRAC_PI_4 };
                corners.push(make_corner(p.x, p.y, o));
            }
        }
        let graph = GridGraph::new(&corners, &params(), a);
        let center = neighbor_map(&graph.neighbors[4]);
        assert_eq!(5, center[&NeighborDirection::Right].index);
        assert_eq!(7, center[&NeighborDirection::Down].index);
    }

    #[test]
    fn lattice_gets_consistent_coordinates() {
        let corners = lattice(4, 3, 10.0);
        let graph = GridGraph::new(&corners, &params(), 0.0);
        let components = connected_components(&graph);
        assert_eq!(1, components.len());
        let coords = assign_grid_coordinates(&graph, &components[0]).unwrap();
        assert_eq!(12, coords.len());
        for (node, i, j) in coords {
            assert_eq!(node as i32, j * 4 + i);
        }
    }

    #[test]
    fn conflicting_coordinates_reject_component() {
        let mut graph = GridGraph {
            neighbors: vec![Vec::new(), Vec::new(), Vec::new()],
        };
        let link = |index, direction| NodeNeighbor {
            direction,
            index,
            distance: 10.0,
            score: 0.0,
        };
        // 0 -> 1 right and 1 -> 2 right, but 0 -> 2 down.
        graph.neighbors[0] = vec![link(1, NeighborDirection::Right), link(2, NeighborDirection::Down)];
        graph.neighbors[1] = vec![link(2, NeighborDirection::Right)];
        graph.neighbors[2] = vec![];
        assert!(assign_grid_coordinates(&graph, &[0, 1, 2]).is_none());
    }
}
