//! Directed weighted multigraph backing the route planner.
//!
//! Pure container: an edge arena plus per-vertex outgoing incidence lists.
//! The search itself lives in `router`.

pub type VertexId = u32;
pub type EdgeId = u32;

#[derive(Debug, Clone)]
pub struct Edge<W> {
    pub from: VertexId,
    pub to: VertexId,
    pub weight: W,
}

#[derive(Debug)]
pub struct DirectedGraph<W> {
    edges: Vec<Edge<W>>,
    // Outgoing edge ids per vertex.
    incidence: Vec<Vec<EdgeId>>,
}

impl<W> DirectedGraph<W> {
    pub fn new(vertex_count: usize) -> Self {
        Self {
            edges: Vec::new(),
            incidence: vec![Vec::new(); vertex_count],
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.incidence.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn add_edge(&mut self, from: VertexId, to: VertexId, weight: W) -> EdgeId {
        let id = self.edges.len() as EdgeId;
        self.edges.push(Edge { from, to, weight });
        self.incidence[from as usize].push(id);
        id
    }

    pub fn edge(&self, id: EdgeId) -> &Edge<W> {
        &self.edges[id as usize]
    }

    pub fn out_edges(&self, vertex: VertexId) -> impl Iterator<Item = EdgeId> + '_ {
        self.incidence[vertex as usize].iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parallel_edges_kept() {
        let mut g: DirectedGraph<f64> = DirectedGraph::new(2);
        g.add_edge(0, 1, 1.0);
        g.add_edge(0, 1, 2.0);
        assert_eq!(g.edge_count(), 2);
        let weights: Vec<f64> = g.out_edges(0).map(|e| g.edge(e).weight).collect();
        assert_eq!(weights, [1.0, 2.0]);
        assert_eq!(g.out_edges(1).count(), 0);
    }
}
