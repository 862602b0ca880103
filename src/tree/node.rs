use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a node that may be reachable through more than one path.
///
/// Identity is assigned at construction and never changes when the node's
/// mutable state (inferred type, bound values) changes. Copies get fresh ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub fn next() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A node held behind `Arc` so several parents can reference it.
pub trait SharedNode: Any + Send + Sync {
    fn node_id(&self) -> NodeId;
}

/// Structural copy within one [`CopyContext`] session.
pub trait CopyNode: Sized {
    fn copy_node(&self, ctx: &mut CopyContext) -> Self;
}

impl<T: CopyNode> CopyNode for Vec<T> {
    fn copy_node(&self, ctx: &mut CopyContext) -> Self {
        self.iter().map(|node| node.copy_node(ctx)).collect()
    }
}

impl<T: CopyNode> CopyNode for Option<T> {
    fn copy_node(&self, ctx: &mut CopyContext) -> Self {
        self.as_ref().map(|node| node.copy_node(ctx))
    }
}

impl<T: CopyNode> CopyNode for Box<T> {
    fn copy_node(&self, ctx: &mut CopyContext) -> Self {
        Box::new(self.as_ref().copy_node(ctx))
    }
}

/// One graph-safe deep copy session.
///
/// Maps the identity of every shared node already copied in this session to
/// its copy, so a node reachable from two paths is copied exactly once and
/// both paths in the output observe the same new instance. A context lives
/// for a single top-level copy and is never shared between threads.
#[derive(Default)]
pub struct CopyContext {
    copies: HashMap<NodeId, Arc<dyn Any + Send + Sync>>,
}

impl CopyContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_copy<T: SharedNode>(&self, original: &T) -> Option<Arc<T>> {
        let copy = self.copies.get(&original.node_id())?;
        Arc::clone(copy).downcast::<T>().ok()
    }

    pub fn register_copy<T: SharedNode>(&mut self, original: &T, copy: Arc<T>) -> Arc<T> {
        let erased: Arc<dyn Any + Send + Sync> = copy.clone();
        self.copies.insert(original.node_id(), erased);
        copy
    }

    /// Return the session's copy of `original`, creating and registering it
    /// with `create` on first sight.
    pub fn copy_shared<T: SharedNode>(
        &mut self,
        original: &Arc<T>,
        create: impl FnOnce(&T, &mut CopyContext) -> T,
    ) -> Arc<T> {
        if let Some(copy) = self.get_copy(original.as_ref()) {
            return copy;
        }
        let copy = Arc::new(create(original.as_ref(), self));
        self.register_copy(original.as_ref(), copy)
    }

    /// Number of shared nodes copied so far.
    pub fn len(&self) -> usize {
        self.copies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.copies.is_empty()
    }
}

impl fmt::Debug for CopyContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CopyContext")
            .field("copies", &self.copies.len())
            .finish()
    }
}
