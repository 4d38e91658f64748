//! The AST node and polymorphic node-type table (spec.md §3 "Node" /
//! "NodeType"). Every downstream stage — render, optimize, compile — walks
//! the same tree and dispatches through the same four-operation interface,
//! mirroring an `IProduction` trait-object table but keyed by a runtime
//! [`Context`](crate::context::Context) registration instead of a
//! compile-time grammar graph.
use crate::compile::Compiler;
use crate::error::{CompileError, ImplementationError, RenderError};
use crate::optimize::OptimizeCtx;
use crate::position::Position;
use crate::render::RenderCtx;
use crate::value::Value;
use std::fmt::Debug;
use std::rc::Rc;

/// The discriminant every [`NodeType`] declares (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Tag,
    Operator,
    Filter,
    DotFilter,
    Output,
    Variable,
    Arguments,
    Group,
    GroupDereference,
    ArrayLiteral,
    Concatenation,
    Contextual,
    Qualifier,
}

/// How the [`crate::optimize::Optimizer`] is allowed to treat a node
/// (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationScheme {
    /// Never fold.
    None,
    /// Fold once every child is already a literal leaf.
    Full,
    /// May fold, or rewrite itself, even with non-literal children.
    Partial,
    /// Stop descending; never touch the subtree.
    Shield,
}

/// The polymorphic per-node-type behavior table (spec.md §3 "four virtual
/// operations"). Implementations are zero-sized structs registered into a
/// [`Context`](crate::context::Context) as `Rc<dyn NodeType>` and shared by
/// every [`Node::Internal`] that references them — the Rust equivalent of
/// the source's single-inheritance `NodeType` hierarchy (spec.md §9
/// "tagged variants instead of class hierarchies").
pub trait NodeType: Debug {
    fn symbol(&self) -> &str;
    fn kind(&self) -> NodeKind;
    fn scheme(&self) -> OptimizationScheme {
        OptimizationScheme::None
    }
    fn min_children(&self) -> usize {
        0
    }
    fn max_children(&self) -> Option<usize> {
        None
    }
    /// Binary-operator precedence; higher binds tighter (spec.md §4.2
    /// "Operator precedence").
    fn priority(&self) -> u8 {
        0
    }
    /// Intermediate tags a `Tag`-kind node accepts inside its body, e.g.
    /// `if` accepts `["elsif", "else"]` (spec.md §3 "Tag types... tables
    /// of permitted intermediate tags").
    fn intermediates(&self) -> &'static [&'static str] {
        &[]
    }
    /// Qualifier keywords a `Tag`-kind node accepts in its argument list
    /// after the positional arguments, e.g. `for` accepts `["reversed",
    /// "limit", "offset"]`.
    fn qualifiers(&self) -> &'static [&'static str] {
        &[]
    }

    /// Whether this tag has a body terminated by `end<tag>` (`if`, `for`,
    /// `capture`, …) or is a single self-closing statement (`assign`,
    /// `break`, `echo`, …) that stops right after its own `%}` (spec.md
    /// §4.2 "A closing `end<tag>` pops and validates nesting" — implicitly
    /// not every tag participates in that nesting).
    fn is_block(&self) -> bool {
        true
    }

    /// Parses this tag's (or intermediate's) own argument list, up to but
    /// not including the closing `%}`. The default handles the common
    /// `expr[, expr]*` shape (`if`, `unless`, `case`, `when`, `elsif`); tags
    /// with their own grammar (`for`, `assign`, `capture`, `cycle`, …)
    /// override it (spec.md §4.2 "expects arguments until `%}`").
    fn parse_arguments(
        &self,
        parser: &mut crate::parser::Parser,
    ) -> Result<Node, crate::error::ParseError> {
        parser.parse_default_arguments()
    }

    fn render(&self, node: &Node, ctx: &mut RenderCtx) -> Result<Value, RenderError>;

    /// Attempt to fold `node` given that, for `Full`, every child is
    /// already a leaf. Returning `Some` replaces `node` in place; `None`
    /// leaves it untouched. The default never folds (`scheme() ==
    /// OptimizationScheme::None` nodes should not override this).
    fn optimize(&self, _node: &Node, _ctx: &mut OptimizeCtx) -> Option<Node> {
        None
    }

    fn compile(&self, node: &Node, compiler: &mut Compiler) -> Result<(), CompileError>;

    /// The mechanical half of `compile`'s `CALL nodeType` (spec.md §4.5):
    /// given already-evaluated argument values, compute the result. Only
    /// operator/filter/dot-filter node types — whose behavior doesn't
    /// depend on tree shape — implement this; tag node types lower their
    /// own control flow directly in `compile` instead and never reach it.
    fn call(&self, _args: &[Value]) -> Result<Value, RenderError> {
        Err(RenderError::new(
            crate::error::RenderErrorKind::UnknownFilter,
            format!("node type '{}' is not callable from bytecode", self.symbol()),
        ))
    }

    fn validate(&self, _node: &Node) -> Result<(), ImplementationError> {
        Ok(())
    }

    /// Re-render this node's canonical source form (spec.md §4.2 "Unparse").
    fn unparse(&self, node: &Node, out: &mut String);
}

/// A leaf value or an internal node with a [`NodeType`] and ordered
/// children (spec.md §3 invariant 1).
#[derive(Debug, Clone)]
pub enum Node {
    Leaf {
        value: Value,
        position: Position,
        /// Set only for a `Token::StringLit` leaf (`parser.rs`'s
        /// `parse_primary`); plain template text parses to the same
        /// `Value::Str` shape but leaves this `false`. `unparse_into` reads
        /// it to decide whether the value needs surrounding quotes to read
        /// back as the same kind of leaf.
        quoted: bool,
    },
    Internal {
        node_type: Rc<dyn NodeType>,
        children: Vec<Node>,
        position: Position,
    },
}

impl Node {
    pub fn leaf(value: Value, position: Position) -> Self {
        Node::Leaf { value, position, quoted: false }
    }

    /// A leaf built from a quoted string literal (`Token::StringLit`), as
    /// opposed to plain template text that happens to carry the same
    /// `Value::Str` payload.
    pub fn quoted_leaf(value: Value, position: Position) -> Self {
        Node::Leaf { value, position, quoted: true }
    }

    pub fn internal(node_type: Rc<dyn NodeType>, children: Vec<Node>, position: Position) -> Self {
        Node::Internal {
            node_type,
            children,
            position,
        }
    }

    pub fn position(&self) -> Position {
        match self {
            Node::Leaf { position, .. } => *position,
            Node::Internal { position, .. } => *position,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    pub fn leaf_value(&self) -> Option<&Value> {
        match self {
            Node::Leaf { value, .. } => Some(value),
            Node::Internal { .. } => None,
        }
    }

    pub fn children(&self) -> &[Node] {
        match self {
            Node::Leaf { .. } => &[],
            Node::Internal { children, .. } => children,
        }
    }

    /// Mutable access to the child list. Panics on a leaf (invariant 1);
    /// callers check [`Node::is_leaf`] first.
    pub fn children_mut(&mut self) -> &mut Vec<Node> {
        match self {
            Node::Leaf { .. } => panic!("leaf nodes have no children"),
            Node::Internal { children, .. } => children,
        }
    }

    pub fn node_type(&self) -> Option<&Rc<dyn NodeType>> {
        match self {
            Node::Leaf { .. } => None,
            Node::Internal { node_type, .. } => Some(node_type),
        }
    }

    pub fn render(&self, ctx: &mut RenderCtx) -> Result<Value, RenderError> {
        match self {
            Node::Leaf { value, .. } => Ok(value.clone()),
            Node::Internal { node_type, .. } => {
                let node_type = node_type.clone();
                node_type.render(self, ctx)
            }
        }
    }

    pub fn compile(&self, compiler: &mut Compiler) -> Result<(), CompileError> {
        match self {
            Node::Leaf { value, .. } => {
                compiler.emit_constant(value);
                Ok(())
            }
            Node::Internal { node_type, .. } => {
                let node_type = node_type.clone();
                node_type.compile(self, compiler)
            }
        }
    }

    pub fn unparse(&self) -> String {
        let mut out = String::new();
        self.unparse_into(&mut out);
        out
    }

    pub fn unparse_into(&self, out: &mut String) {
        match self {
            Node::Leaf { value, quoted: true, .. } => crate::dialect::unparse_quoted_string(value, out),
            Node::Leaf { value, quoted: false, .. } => crate::dialect::unparse_literal(value, out),
            Node::Internal { node_type, .. } => {
                let node_type = node_type.clone();
                node_type.unparse(self, out)
            }
        }
    }

    /// Debug-print the tree using `ptree`, the same crate an `ASTNode`
    /// debug view would reach for.
    pub fn print(&self) -> std::io::Result<()> {
        ptree::print_tree(&NodePrintItem(self.clone()))
    }
}

#[derive(Clone)]
struct NodePrintItem(Node);

impl ptree::TreeItem for NodePrintItem {
    type Child = Self;

    fn write_self<W: std::io::Write>(&self, f: &mut W, _: &ptree::Style) -> std::io::Result<()> {
        match &self.0 {
            Node::Leaf { value, .. } => write!(f, "{:?}", value),
            Node::Internal { node_type, .. } => write!(f, "{}", node_type.symbol()),
        }
    }

    fn children(&self) -> std::borrow::Cow<[Self::Child]> {
        std::borrow::Cow::from(
            self.0
                .children()
                .iter()
                .cloned()
                .map(NodePrintItem)
                .collect::<Vec<_>>(),
        )
    }
}
