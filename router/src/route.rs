//! Relay route planning over drone positions
//!
//! Builds an undirected connectivity graph: the control node reaches every
//! drone within `control_range`, drones reach each other within
//! `drone_range`, edges weighted by euclidean distance. Finds the shortest
//! path by hop count, or by total distance when `weighted` is set.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Name of the synthetic control node in the graph
pub const CONTROL_NODE: &str = "__CONTROL__";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Drone {
    pub id: String,
    pub pos: Vec3,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteRequest {
    pub drones: Vec<Drone>,

    #[serde(default)]
    pub control_pos: Vec3,
    pub control_range: f64,
    pub drone_range: f64,

    pub src: String,
    pub dst: String,

    #[serde(default)]
    pub weighted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteMetrics {
    pub hops: usize,
    pub total_dist: f64,
    pub bottleneck_dist: f64,
    pub bottleneck_margin: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteResponse {
    pub ok: bool,
    pub path: Vec<String>,
    pub metrics: Option<RouteMetrics>,
    pub reason: Option<String>,
}

impl RouteResponse {
    fn failed(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            path: Vec::new(),
            metrics: None,
            reason: Some(reason.into()),
        }
    }
}

fn dist(a: &Vec3, b: &Vec3) -> f64 {
    let (dx, dy, dz) = (a.x - b.x, a.y - b.y, a.z - b.z);
    (dx * dx + dy * dy + dz * dz).sqrt()
}

fn link(adjacency: &mut HashMap<String, Vec<(String, f64)>>, a: &str, b: &str, w: f64) {
    adjacency
        .entry(a.to_string())
        .or_default()
        .push((b.to_string(), w));
    adjacency
        .entry(b.to_string())
        .or_default()
        .push((a.to_string(), w));
}

/// Connectivity graph as adjacency lists with edge lengths
struct Graph {
    adjacency: HashMap<String, Vec<(String, f64)>>,
}

impl Graph {
    fn build(req: &RouteRequest) -> Self {
        let mut adjacency: HashMap<String, Vec<(String, f64)>> = HashMap::new();

        adjacency.entry(CONTROL_NODE.to_string()).or_default();
        for d in &req.drones {
            adjacency.entry(d.id.clone()).or_default();
        }

        for d in &req.drones {
            let w = dist(&req.control_pos, &d.pos);
            if w <= req.control_range {
                link(&mut adjacency, CONTROL_NODE, &d.id, w);
            }
        }

        for (i, a) in req.drones.iter().enumerate() {
            for b in &req.drones[i + 1..] {
                let w = dist(&a.pos, &b.pos);
                if w <= req.drone_range {
                    link(&mut adjacency, &a.id, &b.id, w);
                }
            }
        }

        Self { adjacency }
    }

    fn contains(&self, node: &str) -> bool {
        self.adjacency.contains_key(node)
    }

    fn edge_weight(&self, a: &str, b: &str) -> f64 {
        self.adjacency
            .get(a)
            .and_then(|edges| edges.iter().find(|(n, _)| n == b))
            .map(|(_, w)| *w)
            .unwrap_or(0.0)
    }

    /// Fewest-hops path via breadth-first search
    fn bfs_path(&self, src: &str, dst: &str) -> Option<Vec<String>> {
        let mut prev: HashMap<String, String> = HashMap::new();
        let mut queue = VecDeque::from([src.to_string()]);
        let mut seen: HashMap<String, ()> = HashMap::from([(src.to_string(), ())]);

        while let Some(node) = queue.pop_front() {
            if node == dst {
                return Some(self.unwind(&prev, src, dst));
            }
            for (next, _) in &self.adjacency[&node] {
                if seen.insert(next.clone(), ()).is_none() {
                    prev.insert(next.clone(), node.clone());
                    queue.push_back(next.clone());
                }
            }
        }
        None
    }

    /// Shortest path by total edge length. Node counts are small, so a
    /// linear scan over unvisited nodes stands in for a priority queue.
    fn dijkstra_path(&self, src: &str, dst: &str) -> Option<Vec<String>> {
        let mut cost: HashMap<String, f64> =
            self.adjacency.keys().map(|n| (n.clone(), f64::INFINITY)).collect();
        let mut prev: HashMap<String, String> = HashMap::new();
        let mut visited: HashMap<String, ()> = HashMap::new();
        cost.insert(src.to_string(), 0.0);

        loop {
            let current = cost
                .iter()
                .filter(|(n, c)| !visited.contains_key(*n) && c.is_finite())
                .min_by(|a, b| a.1.total_cmp(b.1))
                .map(|(n, c)| (n.clone(), *c));

            let Some((node, node_cost)) = current else {
                return None; // dst unreachable
            };
            if node == dst {
                return Some(self.unwind(&prev, src, dst));
            }
            visited.insert(node.clone(), ());

            for (next, w) in &self.adjacency[&node] {
                let candidate = node_cost + w;
                if candidate < cost[next] {
                    cost.insert(next.clone(), candidate);
                    prev.insert(next.clone(), node.clone());
                }
            }
        }
    }

    fn unwind(&self, prev: &HashMap<String, String>, src: &str, dst: &str) -> Vec<String> {
        let mut node = dst.to_string();
        let mut path = vec![node.clone()];
        while node != src {
            node = prev[&node].clone();
            path.push(node.clone());
        }
        path.reverse();
        path
    }
}

fn path_metrics(path: &[String], graph: &Graph, req: &RouteRequest) -> RouteMetrics {
    let mut total = 0.0;
    let mut bottleneck: f64 = 0.0;
    let mut bottleneck_margin = f64::INFINITY;

    for pair in path.windows(2) {
        let w = graph.edge_weight(&pair[0], &pair[1]);
        total += w;
        bottleneck = bottleneck.max(w);

        // Link capacity depends on whether the control node anchors it
        let cap = if pair[0] == CONTROL_NODE || pair[1] == CONTROL_NODE {
            req.control_range
        } else {
            req.drone_range
        };
        bottleneck_margin = bottleneck_margin.min(cap - w);
    }

    // A single-node path (src == dst) has no links to constrain the margin
    if !bottleneck_margin.is_finite() {
        bottleneck_margin = 0.0;
    }

    RouteMetrics {
        hops: path.len().saturating_sub(1),
        total_dist: total,
        bottleneck_dist: bottleneck,
        bottleneck_margin,
    }
}

/// Compute a relay route for the request
pub fn plan_route(req: &RouteRequest) -> RouteResponse {
    let graph = Graph::build(req);

    if !graph.contains(&req.src) {
        return RouteResponse::failed(format!("src not found: {}", req.src));
    }
    if !graph.contains(&req.dst) {
        return RouteResponse::failed(format!("dst not found: {}", req.dst));
    }

    let path = if req.weighted {
        graph.dijkstra_path(&req.src, &req.dst)
    } else {
        graph.bfs_path(&req.src, &req.dst)
    };

    match path {
        Some(path) => {
            let metrics = path_metrics(&path, &graph, req);
            RouteResponse {
                ok: true,
                path,
                metrics: Some(metrics),
                reason: None,
            }
        }
        None => RouteResponse::failed("no path"),
    }
}
