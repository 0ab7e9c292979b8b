//! Quadtree spatial index for broad-phase queries.
//!
//! Rebuilt from scratch every tick, so the structure favors cheap inserts
//! over balance bookkeeping: leaves split once they exceed the configured
//! element count, elements straddling a split land in every overlapping
//! child, and queries de-duplicate before returning.

use kessler_core::config::SpatialConfig;
use kessler_core::types::Aabb;

const NO_CHILD: usize = usize::MAX;

#[derive(Debug)]
struct Node {
    /// Index of the first of four contiguous children, or NO_CHILD.
    children: usize,
    /// Indices into `items`. Non-empty only for leaves.
    items: Vec<usize>,
}

impl Node {
    fn leaf() -> Self {
        Self {
            children: NO_CHILD,
            items: Vec::new(),
        }
    }
}

/// A rebuild-per-tick quadtree over opaque `u64` handles.
#[derive(Debug)]
pub struct QuadTree {
    bounds: Aabb,
    nodes: Vec<Node>,
    items: Vec<(u64, Aabb)>,
    max_elements: usize,
    max_depth: usize,
}

/// Clamp a box into `bounds`. Bodies that drift outside the world collapse
/// onto the nearest edge, so they still occupy an edge leaf instead of
/// silently dropping out of the broad phase.
fn clamp_into(aabb: &Aabb, bounds: &Aabb) -> Aabb {
    Aabb::new(
        aabb.min.clamp(bounds.min, bounds.max),
        aabb.max.clamp(bounds.min, bounds.max),
    )
}

fn child_bounds(b: &Aabb, quadrant: usize) -> Aabb {
    let c = b.center();
    match quadrant {
        0 => Aabb::new(b.min, c),
        1 => Aabb::new(
            glam::DVec2::new(c.x, b.min.y),
            glam::DVec2::new(b.max.x, c.y),
        ),
        2 => Aabb::new(
            glam::DVec2::new(b.min.x, c.y),
            glam::DVec2::new(c.x, b.max.y),
        ),
        _ => Aabb::new(c, b.max),
    }
}

impl QuadTree {
    pub fn new(bounds: Aabb, cfg: &SpatialConfig) -> Self {
        Self {
            bounds,
            nodes: vec![Node::leaf()],
            items: Vec::new(),
            max_elements: cfg.max_elements.max(1),
            max_depth: cfg.max_depth,
        }
    }

    /// Reset to an empty tree over new bounds, keeping allocations.
    pub fn clear(&mut self, bounds: Aabb) {
        self.bounds = bounds;
        self.nodes.clear();
        self.nodes.push(Node::leaf());
        self.items.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn insert(&mut self, id: u64, aabb: Aabb) {
        let item = self.items.len();
        self.items.push((id, aabb));
        // Descend with the clamped box; the stored box stays exact so the
        // final query test is true geometry.
        let clamped = clamp_into(&aabb, &self.bounds);
        self.insert_item(0, self.bounds, 0, item, clamped);
    }

    fn insert_item(&mut self, node: usize, bounds: Aabb, depth: usize, item: usize, aabb: Aabb) {
        if self.nodes[node].children == NO_CHILD {
            self.nodes[node].items.push(item);
            if self.nodes[node].items.len() > self.max_elements && depth < self.max_depth {
                self.split(node, bounds, depth);
            }
            return;
        }
        let first = self.nodes[node].children;
        for q in 0..4 {
            let cb = child_bounds(&bounds, q);
            if aabb.intersects(&cb) {
                self.insert_item(first + q, cb, depth + 1, item, aabb);
            }
        }
    }

    fn split(&mut self, node: usize, bounds: Aabb, depth: usize) {
        let first = self.nodes.len();
        for _ in 0..4 {
            self.nodes.push(Node::leaf());
        }
        self.nodes[node].children = first;
        let items = std::mem::take(&mut self.nodes[node].items);
        for item in items {
            let aabb = clamp_into(&self.items[item].1, &self.bounds);
            for q in 0..4 {
                let cb = child_bounds(&bounds, q);
                if aabb.intersects(&cb) {
                    self.insert_item(first + q, cb, depth + 1, item, aabb);
                }
            }
        }
    }

    /// Collect the ids of all items whose boxes intersect `aabb`, without
    /// duplicates. `out` is cleared first; callers reuse the buffer.
    pub fn query(&self, aabb: &Aabb, out: &mut Vec<u64>) {
        out.clear();
        let probe = clamp_into(aabb, &self.bounds);
        let mut stack = vec![(0usize, self.bounds)];
        while let Some((node, bounds)) = stack.pop() {
            if !probe.intersects(&bounds) {
                continue;
            }
            let n = &self.nodes[node];
            if n.children == NO_CHILD {
                for &item in &n.items {
                    let (id, ib) = self.items[item];
                    if aabb.intersects(&ib) {
                        out.push(id);
                    }
                }
            } else {
                for q in 0..4 {
                    stack.push((n.children + q, child_bounds(&bounds, q)));
                }
            }
        }
        out.sort_unstable();
        out.dedup();
    }
}
