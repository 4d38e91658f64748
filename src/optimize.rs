//! The constant-folding optimizer (spec.md §4.4): a post-order walk that
//! asks each node's [`OptimizationScheme`] whether it may replace itself with
//! a literal leaf, folding by invoking the node's own `render` against a
//! real (but scratch) [`RenderCtx`].
use crate::context::Context;
use crate::node::{Node, OptimizationScheme};
use crate::value::VariableResolver;
use std::rc::Rc;

/// State available to a [`crate::node::NodeType::optimize`] implementation.
pub struct OptimizeCtx<'a> {
    pub context: &'a Context,
    pub resolver: &'a mut dyn VariableResolver,
}

impl<'a> OptimizeCtx<'a> {
    /// Fold `node` by rendering it for real against the same store
    /// (spec.md §4.4 "Folding is implemented by invoking the node's render
    /// against the *same* variable store"). Any renderer error means the
    /// node is left untouched rather than folded.
    pub fn fold(&mut self, node: &Node) -> Option<Node> {
        let mut scratch = crate::render::RenderCtx::scratch(self.context, self.resolver);
        let value = node.render(&mut scratch).ok()?;
        Some(Node::leaf(value, node.position()))
    }
}

pub struct Optimizer {
    context: Rc<Context>,
}

impl Optimizer {
    pub fn new(context: Rc<Context>) -> Self {
        Self { context }
    }

    /// Fold `node`'s tree in place, consulting `resolver` wherever a node
    /// type needs to read the store to decide foldability (e.g. a variable
    /// node folds only if it currently resolves).
    pub fn optimize(&self, node: Node, resolver: &mut dyn VariableResolver) -> Node {
        let mut ctx = OptimizeCtx {
            context: &self.context,
            resolver,
        };
        Self::optimize_node(node, &mut ctx)
    }

    fn optimize_node(node: Node, ctx: &mut OptimizeCtx) -> Node {
        let (node_type, children, position) = match node {
            Node::Leaf { .. } => return node,
            Node::Internal {
                node_type,
                children,
                position,
            } => (node_type, children, position),
        };

        if node_type.scheme() == OptimizationScheme::Shield {
            return Node::internal(node_type, children, position);
        }

        let children: Vec<Node> = children
            .into_iter()
            .map(|child| Self::optimize_node(child, ctx))
            .collect();
        let candidate = Node::internal(node_type.clone(), children, position);

        match node_type.scheme() {
            OptimizationScheme::None => candidate,
            OptimizationScheme::Full => {
                if candidate.children().iter().all(Node::is_leaf) {
                    node_type.optimize(&candidate, ctx).unwrap_or(candidate)
                } else {
                    candidate
                }
            }
            OptimizationScheme::Partial => node_type.optimize(&candidate, ctx).unwrap_or(candidate),
            OptimizationScheme::Shield => unreachable!("handled above"),
        }
    }
}
