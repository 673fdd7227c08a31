//! Static peer network: one node per entity, undirected, built once.

use crate::{rng::StageRng, types::EntityId};

#[derive(Debug, Clone, Default)]
pub struct PeerNetwork {
    adjacency:  Vec<Vec<EntityId>>,
    edge_count: usize,
}

impl PeerNetwork {
    /// Erdős–Rényi G(n, p) with p = mean_degree / n.
    ///
    /// Uses geometric skips between accepted pairs, so cost is linear in the
    /// number of edges rather than quadratic in n.
    pub fn generate(n: usize, mean_degree: f64, rng: &mut StageRng) -> Self {
        let mut network = Self::empty(n);
        if n < 2 || !(mean_degree > 0.0) {
            return network;
        }
        let p = (mean_degree / n as f64).min(1.0);

        if p >= 1.0 {
            for v in 1..n {
                for w in 0..v {
                    network.add_edge(v, w);
                }
            }
            return network;
        }

        let log_q = (1.0 - p).ln();
        // p below f64 resolution: 1 - p rounds to 1 and no edge can be drawn.
        if !(log_q < 0.0) {
            return network;
        }
        let mut v: usize = 1;
        let mut w: i64 = -1;
        while v < n {
            let r = rng.next_f64();
            w += 1 + ((1.0 - r).ln() / log_q).floor() as i64;
            while w >= v as i64 && v < n {
                w -= v as i64;
                v += 1;
            }
            if v < n {
                network.add_edge(v, w as usize);
            }
        }
        log::debug!(
            "network: {} nodes, {} edges, mean degree {:.3}",
            n,
            network.edge_count,
            network.mean_degree()
        );
        network
    }

    /// Build from an explicit edge list. Self-loops and duplicates are dropped.
    pub fn from_edges(n: usize, edges: &[(EntityId, EntityId)]) -> Self {
        let mut network = Self::empty(n);
        for &(a, b) in edges {
            if a != b && a < n && b < n && !network.adjacency[a].contains(&b) {
                network.add_edge(a, b);
            }
        }
        network
    }

    fn empty(n: usize) -> Self {
        Self { adjacency: vec![Vec::new(); n], edge_count: 0 }
    }

    fn add_edge(&mut self, a: EntityId, b: EntityId) {
        self.adjacency[a].push(b);
        self.adjacency[b].push(a);
        self.edge_count += 1;
    }

    /// Empty for ids outside the network.
    pub fn neighbors(&self, id: EntityId) -> &[EntityId] {
        self.adjacency.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn mean_degree(&self) -> f64 {
        if self.adjacency.is_empty() {
            return 0.0;
        }
        2.0 * self.edge_count as f64 / self.adjacency.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_node_per_entity_and_symmetric() {
        let mut rng = StageRng::from_seed(42);
        let net = PeerNetwork::generate(500, 4.0, &mut rng);
        assert_eq!(net.node_count(), 500);
        for v in 0..500 {
            for &w in net.neighbors(v) {
                assert_ne!(v, w, "self-loop at {v}");
                assert!(net.neighbors(w).contains(&v), "edge {v}-{w} is one-way");
            }
        }
    }

    #[test]
    fn mean_degree_is_close_to_requested() {
        let mut rng = StageRng::from_seed(8);
        let net = PeerNetwork::generate(2_000, 4.0, &mut rng);
        let degree = net.mean_degree();
        assert!(degree > 3.5 && degree < 4.5, "mean degree {degree}");
    }

    #[test]
    fn degenerate_inputs_have_no_edges() {
        let mut rng = StageRng::from_seed(1);
        assert_eq!(PeerNetwork::generate(1, 4.0, &mut rng).edge_count(), 0);
        assert_eq!(PeerNetwork::generate(100, 0.0, &mut rng).edge_count(), 0);
        assert_eq!(PeerNetwork::generate(0, 4.0, &mut rng).node_count(), 0);
        assert!(PeerNetwork::generate(10, 0.0, &mut rng).neighbors(99).is_empty());
    }

    #[test]
    fn vanishing_degree_yields_empty_network() {
        let mut rng = StageRng::from_seed(1);
        let net = PeerNetwork::generate(600, 1e-17, &mut rng);
        assert_eq!(net.node_count(), 600);
        assert_eq!(net.edge_count(), 0);
    }

    #[test]
    fn dense_request_yields_complete_graph() {
        let mut rng = StageRng::from_seed(1);
        let net = PeerNetwork::generate(6, 10.0, &mut rng);
        assert_eq!(net.edge_count(), 15);
    }

    #[test]
    fn from_edges_drops_loops_and_duplicates() {
        let net = PeerNetwork::from_edges(3, &[(0, 1), (1, 0), (2, 2), (1, 2)]);
        assert_eq!(net.edge_count(), 2);
        assert_eq!(net.neighbors(1).len(), 2);
    }
}
