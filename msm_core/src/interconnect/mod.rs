//! Interconnect bandwidth providers.
//!
//! An interconnect provider represents a bus fabric that consumers vote on. Each consumer holds
//! a [`Path`] through the provider's node graph and requests an average and a peak bandwidth on
//! it. Every node on the path keeps one request slot per path and aggregates them: the averages
//! are summed and the largest peak wins. The provider then aggregates its nodes and programs the
//! hardware accordingly.
//!
//! Bandwidth values are in kB/s throughout, as the interconnect framework defines them.

use snafu::{OptionExt, Snafu};

use crate::firmware::spdm;

pub mod spdm_tz;

/// Identifier of an interconnect node, unique across the system.
pub type NodeId = u16;

/// Number of paths a provider can hand out at once.
pub const MAX_PATHS: usize = 8;

/// Static description of one node.
#[derive(Debug)]
pub struct NodeDesc {
    /// Name of the node, for diagnostics.
    pub name: &'static str,
    /// System wide identifier.
    pub id: NodeId,
    /// Width of the link between this node and the bus, in bytes.
    pub buswidth: u16,
    /// The nodes reachable from this one.
    pub links: &'static [NodeId],
}

/// One consumer's bandwidth request, in kB/s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Request {
    /// Average bandwidth.
    pub avg_bw: u32,
    /// Peak bandwidth.
    pub peak_bw: u32,
}

impl Request {
    const NONE: Self = Self {
        avg_bw: 0,
        peak_bw: 0,
    };
}

/// A node together with the bandwidth currently requested on it.
#[derive(Debug, Clone, Copy)]
pub struct Node {
    /// The static description of the node.
    pub desc: &'static NodeDesc,
    /// Aggregated average bandwidth in kB/s.
    pub avg_bw: u32,
    /// Aggregated peak bandwidth in kB/s.
    pub peak_bw: u32,
    requests: [Request; MAX_PATHS],
}

impl Node {
    /// A node with no bandwidth requested.
    #[must_use]
    pub const fn new(desc: &'static NodeDesc) -> Self {
        Self {
            desc,
            avg_bw: 0,
            peak_bw: 0,
            requests: [Request::NONE; MAX_PATHS],
        }
    }

    fn aggregate(&mut self) {
        (self.avg_bw, self.peak_bw) = self
            .requests
            .iter()
            .fold((0, 0), |(avg, peak): (u32, u32), r| {
                (avg.saturating_add(r.avg_bw), peak.max(r.peak_bw))
            });
    }
}

/// Errors reported by interconnect providers.
#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum IccError {
    /// A consumer referred to a node index the provider does not have.
    #[snafu(display("node index {index} out of range"))]
    NodeOutOfRange {
        /// The index that was asked for.
        index: usize,
    },
    /// The destination cannot be reached from the source.
    #[snafu(display("no path from node {src} to node {dst}"))]
    NoPath {
        /// Source node index.
        src: usize,
        /// Destination node index.
        dst: usize,
    },
    /// Every path slot of the provider is taken.
    PathsExhausted,
    /// Programming the SPDM block failed.
    Spdm {
        /// Underlying error.
        source: spdm::Error,
    },
}

/// A consumer's handle on a route through a provider's nodes.
///
/// Handed out by [`Provider::get_path`] and given back with [`Provider::put_path`]. The handle
/// owns one request slot on every node it crosses.
#[derive(Debug, PartialEq, Eq)]
pub struct Path<const N: usize> {
    slot: usize,
    src: usize,
    dst: usize,
    nodes: [bool; N],
}

impl<const N: usize> Path<N> {
    /// Index of the first node.
    pub fn src(&self) -> usize {
        self.src
    }

    /// Index of the last node.
    pub fn dst(&self) -> usize {
        self.dst
    }

    /// Whether the path crosses node `index`.
    pub fn crosses(&self, index: usize) -> bool {
        self.nodes.get(index).copied().unwrap_or(false)
    }
}

/// The fixed node table of a provider, indexed the way its device tree binding numbers nodes.
#[derive(Debug)]
pub struct Topology<const N: usize> {
    nodes: [Node; N],
    paths: [bool; MAX_PATHS],
}

impl<const N: usize> Topology<N> {
    /// Create the nodes described by `descs`, with no bandwidth requested.
    #[must_use]
    pub fn new(descs: &[&'static NodeDesc; N]) -> Self {
        Self {
            nodes: core::array::from_fn(|i| Node::new(descs[i])),
            paths: [false; MAX_PATHS],
        }
    }

    /// Translate a one cell device tree specifier to the node it names.
    ///
    /// # Errors
    /// [`IccError::NodeOutOfRange`] if there is no node at `index`.
    pub fn xlate(&self, index: usize) -> Result<&Node, IccError> {
        self.nodes
            .get(index)
            .ok_or(IccError::NodeOutOfRange { index })
    }

    /// Mutable access to the node at `index`.
    ///
    /// # Errors
    /// [`IccError::NodeOutOfRange`] if there is no node at `index`.
    pub fn node_mut(&mut self, index: usize) -> Result<&mut Node, IccError> {
        self.nodes
            .get_mut(index)
            .ok_or(IccError::NodeOutOfRange { index })
    }

    /// Find a node by its system wide identifier.
    pub fn find(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.desc.id == id)
    }

    /// Iterate over all nodes.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// The nodes on the shortest route from `src` to `dst`, following the nodes' links.
    fn route(&self, src: usize, dst: usize) -> Result<[bool; N], IccError> {
        self.xlate(src)?;
        self.xlate(dst)?;

        let mut prev: [Option<usize>; N] = [None; N];
        let mut seen = [false; N];
        let mut queue = [0usize; N];
        let (mut head, mut tail) = (0, 1);
        queue[0] = src;
        seen[src] = true;

        while head < tail {
            let cur = queue[head];
            head += 1;

            if cur == dst {
                let mut on_path = [false; N];
                let mut at = Some(dst);
                while let Some(i) = at {
                    on_path[i] = true;
                    at = prev[i];
                }
                return Ok(on_path);
            }

            for id in self.nodes[cur].desc.links {
                let Some(next) = self.nodes.iter().position(|n| n.desc.id == *id) else {
                    continue;
                };
                if !seen[next] {
                    seen[next] = true;
                    prev[next] = Some(cur);
                    queue[tail] = next;
                    tail += 1;
                }
            }
        }

        NoPathSnafu { src, dst }.fail()
    }

    /// Reserve a request slot on the route from `src` to `dst`.
    ///
    /// # Errors
    /// - [`IccError::NodeOutOfRange`] if either index is invalid.
    /// - [`IccError::NoPath`] if `dst` cannot be reached from `src`.
    /// - [`IccError::PathsExhausted`] if every slot is taken.
    pub fn get_path(&mut self, src: usize, dst: usize) -> Result<Path<N>, IccError> {
        let nodes = self.route(src, dst)?;
        let slot = self
            .paths
            .iter()
            .position(|used| !used)
            .context(PathsExhaustedSnafu)?;
        self.paths[slot] = true;
        Ok(Path {
            slot,
            src,
            dst,
            nodes,
        })
    }

    /// Store `request` on every node of `path` and re-aggregate those nodes. Returns the
    /// request the path held before.
    pub fn set_request(&mut self, path: &Path<N>, request: Request) -> Request {
        let previous = self.nodes[path.src].requests[path.slot];
        for (node, _) in self
            .nodes
            .iter_mut()
            .zip(path.nodes)
            .filter(|(_, on_path)| *on_path)
        {
            node.requests[path.slot] = request;
            node.aggregate();
        }
        previous
    }

    /// Clear the request of `path` and free its slot.
    pub fn release(&mut self, path: Path<N>) {
        self.set_request(&path, Request::NONE);
        self.paths[path.slot] = false;
    }
}

/// The standard aggregation: the sum of the average requests and the largest peak request.
pub fn std_aggregate<'n>(nodes: impl IntoIterator<Item = &'n Node>) -> (u32, u32) {
    nodes.into_iter().fold((0, 0), |(avg, peak), n| {
        (avg.saturating_add(n.avg_bw), peak.max(n.peak_bw))
    })
}

/// Convert a bandwidth in kB/s to bytes per second.
#[must_use]
pub const fn units_to_bps(bw: u32) -> u64 {
    bw as u64 * 1000
}

/// The operations the interconnect framework invokes on a provider.
///
/// The framework serializes calls to a provider, so implementations need no locking of their
/// own.
pub trait Provider<const N: usize> {
    /// The provider's node table.
    fn topology(&self) -> &Topology<N>;

    /// Mutable access to the node table.
    fn topology_mut(&mut self) -> &mut Topology<N>;

    /// Apply the current requests on the path from node `src` to node `dst`.
    ///
    /// # Errors
    /// Returns an error if the hardware could not be programmed.
    fn set(&mut self, src: usize, dst: usize) -> Result<(), IccError>;

    /// Read back the bandwidth currently set in hardware for `node`, as `(avg, peak)`.
    fn get_bw(&self, node: usize) -> (u32, u32);

    /// Hand a consumer a path from node `src` to node `dst`, with nothing requested on it.
    ///
    /// # Errors
    /// Any error from [`Topology::get_path`].
    fn get_path(&mut self, src: usize, dst: usize) -> Result<Path<N>, IccError> {
        self.topology_mut().get_path(src, dst)
    }

    /// Replace the request of `path` and apply the new aggregate.
    ///
    /// If the hardware cannot be programmed the path keeps its previous request.
    ///
    /// # Errors
    /// Any error from [`Provider::set`].
    fn request(&mut self, path: &Path<N>, avg_bw: u32, peak_bw: u32) -> Result<(), IccError> {
        let previous = self
            .topology_mut()
            .set_request(path, Request { avg_bw, peak_bw });
        if let Err(e) = self.set(path.src, path.dst) {
            self.topology_mut().set_request(path, previous);
            return Err(e);
        }
        Ok(())
    }

    /// Drop `path`'s request, apply the result and free the path.
    ///
    /// The path is freed even if the hardware cannot be programmed.
    ///
    /// # Errors
    /// Any error from [`Provider::set`].
    fn put_path(&mut self, path: Path<N>) -> Result<(), IccError> {
        let result = self.request(&path, 0, 0);
        self.topology_mut().release(path);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::prelude::rust_2021::*;

    static A: NodeDesc = NodeDesc {
        name: "a",
        id: 10,
        buswidth: 8,
        links: &[11],
    };
    static B: NodeDesc = NodeDesc {
        name: "b",
        id: 11,
        buswidth: 8,
        links: &[],
    };

    #[test]
    fn xlate_by_index() {
        let topo = Topology::new(&[&A, &B]);
        assert_eq!(topo.xlate(0).unwrap().desc.id, 10);
        assert_eq!(topo.xlate(1).unwrap().desc.name, "b");
        assert_eq!(
            topo.xlate(2).unwrap_err(),
            IccError::NodeOutOfRange { index: 2 }
        );
        assert_eq!(topo.find(11).unwrap().desc.name, "b");
        assert!(topo.find(12).is_none());
    }

    #[test]
    fn aggregate_sums_average_and_maxes_peak() {
        let mut topo = Topology::new(&[&A, &B]);
        {
            let a = topo.node_mut(0).unwrap();
            a.avg_bw = 100;
            a.peak_bw = 700;
        }
        {
            let b = topo.node_mut(1).unwrap();
            b.avg_bw = 250;
            b.peak_bw = 300;
        }
        assert_eq!(std_aggregate(topo.iter()), (350, 700));
    }

    #[test]
    fn aggregate_of_nothing() {
        let topo = Topology::new(&[&A, &B]);
        assert_eq!(std_aggregate(topo.iter()), (0, 0));
    }

    static CPU: NodeDesc = NodeDesc {
        name: "cpu",
        id: 20,
        buswidth: 16,
        links: &[21],
    };
    static NOC: NodeDesc = NodeDesc {
        name: "noc",
        id: 21,
        buswidth: 16,
        links: &[22, 23],
    };
    static DDR: NodeDesc = NodeDesc {
        name: "ddr",
        id: 22,
        buswidth: 8,
        links: &[],
    };
    static CFG: NodeDesc = NodeDesc {
        name: "cfg",
        id: 23,
        buswidth: 4,
        links: &[],
    };

    fn fabric() -> Topology<4> {
        Topology::new(&[&CPU, &NOC, &DDR, &CFG])
    }

    fn bw(topo: &Topology<4>, index: usize) -> (u32, u32) {
        let node = topo.xlate(index).unwrap();
        (node.avg_bw, node.peak_bw)
    }

    #[test]
    fn path_follows_links() {
        let mut topo = fabric();
        let path = topo.get_path(0, 2).unwrap();
        assert_eq!((path.src(), path.dst()), (0, 2));
        assert!(path.crosses(0) && path.crosses(1) && path.crosses(2));
        assert!(!path.crosses(3));
        assert!(!path.crosses(4));

        let short = topo.get_path(1, 3).unwrap();
        assert!(!short.crosses(0) && short.crosses(1) && short.crosses(3));
    }

    #[test]
    fn path_against_links_is_refused() {
        let mut topo = fabric();
        assert_eq!(
            topo.get_path(2, 0).unwrap_err(),
            IccError::NoPath { src: 2, dst: 0 }
        );
        assert_eq!(
            topo.get_path(0, 4).unwrap_err(),
            IccError::NodeOutOfRange { index: 4 }
        );
    }

    #[test]
    fn requests_are_applied_along_the_path() {
        let mut topo = fabric();
        let path = topo.get_path(0, 2).unwrap();
        assert_eq!(
            topo.set_request(
                &path,
                Request {
                    avg_bw: 100,
                    peak_bw: 400
                }
            ),
            Request::default()
        );
        assert_eq!(bw(&topo, 0), (100, 400));
        assert_eq!(bw(&topo, 1), (100, 400));
        assert_eq!(bw(&topo, 2), (100, 400));
        assert_eq!(bw(&topo, 3), (0, 0));
    }

    #[test]
    fn nodes_aggregate_every_path() {
        let mut topo = fabric();
        let dram = topo.get_path(0, 2).unwrap();
        let config = topo.get_path(1, 3).unwrap();
        let other = topo.get_path(0, 2).unwrap();
        topo.set_request(
            &dram,
            Request {
                avg_bw: 100,
                peak_bw: 700,
            },
        );
        topo.set_request(
            &config,
            Request {
                avg_bw: 10,
                peak_bw: 20,
            },
        );
        topo.set_request(
            &other,
            Request {
                avg_bw: 250,
                peak_bw: 300,
            },
        );
        assert_eq!(bw(&topo, 0), (350, 700));
        assert_eq!(bw(&topo, 1), (360, 700));
        assert_eq!(bw(&topo, 2), (350, 700));
        assert_eq!(bw(&topo, 3), (10, 20));

        topo.release(dram);
        assert_eq!(bw(&topo, 0), (250, 300));
        assert_eq!(bw(&topo, 1), (260, 300));
        assert_eq!(bw(&topo, 3), (10, 20));
    }

    #[test]
    fn slots_are_reused_after_release() {
        let mut topo = fabric();
        let mut paths: Vec<_> = (0..MAX_PATHS)
            .map(|_| topo.get_path(0, 1).unwrap())
            .collect();
        assert_eq!(topo.get_path(0, 1).unwrap_err(), IccError::PathsExhausted);

        let freed = paths.pop().unwrap();
        topo.release(freed);
        assert!(topo.get_path(0, 1).is_ok());
    }

    #[test]
    fn bps_conversion() {
        assert_eq!(units_to_bps(0), 0);
        assert_eq!(units_to_bps(16), 16_000);
        assert_eq!(units_to_bps(u32::MAX), u64::from(u32::MAX) * 1000);
    }
}
