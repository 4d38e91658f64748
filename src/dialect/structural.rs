//! The structural `NodeType`s every `Context` addresses by identity
//! (spec.md §3 "Context... Holds singleton instances of the structural node
//! types"): concatenation, argument list, output, variable, group,
//! group-dereference, array literal.
use crate::compile::{Compiler, ACCUMULATOR};
use crate::bytecode::{OpCode, Operand};
use crate::error::{CompileError, RenderError, RenderErrorKind};
use crate::node::{Node, NodeKind, NodeType, OptimizationScheme};
use crate::optimize::OptimizeCtx;
use crate::render::RenderCtx;
use crate::value::{PathSegment, Value};

/// A contiguous body of children whose rendered results concatenate in
/// order (spec.md §3 "Concatenation node"). `Partial` scheme: adjacent
/// literal children collapse into one even when the whole node can't fold.
#[derive(Debug)]
pub struct Concatenation;

impl NodeType for Concatenation {
    fn symbol(&self) -> &str {
        "concatenation"
    }
    fn kind(&self) -> NodeKind {
        NodeKind::Concatenation
    }
    fn scheme(&self) -> OptimizationScheme {
        OptimizationScheme::Partial
    }

    fn render(&self, node: &Node, ctx: &mut RenderCtx) -> Result<Value, RenderError> {
        ctx.enter()?;
        let result = (|| {
            for child in node.children() {
                ctx.check_limits()?;
                let value = child.render(ctx)?;
                if !matches!(ctx.control, crate::render::ControlSignal::None) {
                    return Ok(Value::Nil);
                }
                match value {
                    Value::Nil => {}
                    other => {
                        let text = other.to_string();
                        ctx.track_memory(text.len() as i64);
                        ctx.emit(&text);
                    }
                }
            }
            Ok(Value::Nil)
        })();
        ctx.exit();
        result
    }

    /// Merge runs of adjacent literal-string children into one (spec.md
    /// §4.4 "a concatenation collapses adjacent literal children into
    /// one").
    fn optimize(&self, node: &Node, _ctx: &mut OptimizeCtx) -> Option<Node> {
        let mut merged: Vec<Node> = Vec::new();
        let mut changed = false;
        for child in node.children() {
            let mut appended = false;
            if let Some(Value::Str(text)) = child.leaf_value() {
                if let Some(last) = merged.last_mut() {
                    if let Some(Value::Str(prev)) = last.leaf_value() {
                        let combined = format!("{}{}", prev, text);
                        let position = last.position();
                        *last = Node::leaf(Value::str(combined), position);
                        appended = true;
                    }
                }
            }
            if appended {
                changed = true;
            } else {
                merged.push(child.clone());
            }
        }
        if changed {
            Some(Node::internal(node.node_type()?.clone(), merged, node.position()))
        } else {
            None
        }
    }

    fn compile(&self, node: &Node, compiler: &mut Compiler) -> Result<(), CompileError> {
        for child in node.children() {
            match child {
                Node::Leaf { value: Value::Str(text), .. } => {
                    let offset = compiler.intern(text);
                    compiler.emit(OpCode::OutputMem, ACCUMULATOR, Operand::DataOffset(offset));
                }
                Node::Internal { node_type, .. } if node_type.kind() == NodeKind::Output => {
                    child.compile(compiler)?;
                }
                _ => {
                    child.compile(compiler)?;
                    compiler.emit(OpCode::Output, ACCUMULATOR, Operand::None);
                }
            }
        }
        Ok(())
    }

    fn unparse(&self, node: &Node, out: &mut String) {
        for child in node.children() {
            child.unparse_into(out);
        }
    }
}

/// A tag's positional actual arguments (spec.md §3 invariant 2).
#[derive(Debug)]
pub struct Arguments;

impl NodeType for Arguments {
    fn symbol(&self) -> &str {
        "arguments"
    }
    fn kind(&self) -> NodeKind {
        NodeKind::Arguments
    }
    fn render(&self, _node: &Node, _ctx: &mut RenderCtx) -> Result<Value, RenderError> {
        Ok(Value::Nil)
    }
    fn compile(&self, _node: &Node, _compiler: &mut Compiler) -> Result<(), CompileError> {
        Ok(())
    }
    fn unparse(&self, node: &Node, out: &mut String) {
        for (i, child) in node.children().iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            child.unparse_into(out);
        }
    }
}

/// `{{ expr }}` (spec.md §3 NodeKind "output"). Its `render`/`compile`
/// forward the single child's *value* rather than emitting it directly —
/// emission is `Concatenation`'s job, uniformly for literal text, output
/// expressions, and tags alike (tags emit through their own nested
/// concatenations and return `Value::Nil`).
#[derive(Debug)]
pub struct Output;

impl NodeType for Output {
    fn symbol(&self) -> &str {
        "output"
    }
    fn kind(&self) -> NodeKind {
        NodeKind::Output
    }
    fn scheme(&self) -> OptimizationScheme {
        OptimizationScheme::Full
    }
    fn min_children(&self) -> usize {
        1
    }
    fn max_children(&self) -> Option<usize> {
        Some(1)
    }

    fn render(&self, node: &Node, ctx: &mut RenderCtx) -> Result<Value, RenderError> {
        node.children()[0].render(ctx)
    }

    fn optimize(&self, node: &Node, ctx: &mut OptimizeCtx) -> Option<Node> {
        ctx.fold(node)
    }

    fn compile(&self, node: &Node, compiler: &mut Compiler) -> Result<(), CompileError> {
        node.children()[0].compile(compiler)?;
        compiler.emit(OpCode::Output, ACCUMULATOR, Operand::None);
        Ok(())
    }

    fn unparse(&self, node: &Node, out: &mut String) {
        out.push_str("{{ ");
        node.children()[0].unparse_into(out);
        out.push_str(" }}");
    }
}

/// A root name plus a chain of dereference keys (spec.md §3 invariant 4).
/// `parser.rs` extends this node's own children in place for `.key`/`[key]`
/// postfix chains rather than wrapping, since the root name lives at
/// `children()[0]`.
#[derive(Debug)]
pub struct Variable;

impl Variable {
    fn segment_value(key: Value) -> PathSegment {
        match key {
            Value::Str(s) => PathSegment::Key(s.to_string()),
            Value::Int(i) => PathSegment::Index(i),
            other => PathSegment::Key(other.to_string()),
        }
    }
}

impl NodeType for Variable {
    fn symbol(&self) -> &str {
        "variable"
    }
    fn kind(&self) -> NodeKind {
        NodeKind::Variable
    }
    fn min_children(&self) -> usize {
        1
    }

    fn render(&self, node: &Node, ctx: &mut RenderCtx) -> Result<Value, RenderError> {
        let children = node.children();
        let name = match &children[0] {
            Node::Leaf { value: Value::Str(s), .. } => s.to_string(),
            _ => return Ok(Value::Nil),
        };
        let mut current = ctx.resolve_root(&name)?;
        for key_node in &children[1..] {
            if matches!(current, Value::Nil) {
                break;
            }
            let key = key_node.render(ctx)?;
            let segment = Self::segment_value(key);
            current = ctx.resolver().get_index(&current, &segment).unwrap_or(Value::Nil);
        }
        Ok(current)
    }

    fn compile(&self, node: &Node, compiler: &mut Compiler) -> Result<(), CompileError> {
        let children = node.children();
        let name = match &children[0] {
            Node::Leaf { value: Value::Str(s), .. } => s.to_string(),
            _ => return Err(CompileError::new("variable root must be a string leaf")),
        };
        let offset = compiler.intern(&name);
        compiler.emit(OpCode::MovStr, ACCUMULATOR, Operand::DataOffset(offset));
        compiler.emit(OpCode::Resolve, ACCUMULATOR, Operand::Int(-1));
        for (depth, key_node) in children[1..].iter().enumerate() {
            // A fixed depth-indexed scratch register holds the base value
            // while the key expression (which also ends in the
            // accumulator) is computed; deeper than 7 nested derefs alias
            // registers and only the tree-walking renderer stays exact
            // past that point (see DESIGN.md).
            let base_reg = 1 + (depth % 7);
            compiler.emit(OpCode::Mov, base_reg, Operand::Register(ACCUMULATOR));
            key_node.compile(compiler)?;
            compiler.emit(OpCode::Resolve, ACCUMULATOR, Operand::Int(base_reg as i64));
        }
        Ok(())
    }

    fn call(&self, _args: &[Value]) -> Result<Value, RenderError> {
        Err(RenderError::new(RenderErrorKind::UnknownFilter, "variable is not callable"))
    }

    fn unparse(&self, node: &Node, out: &mut String) {
        let children = node.children();
        if let Node::Leaf { value: Value::Str(s), .. } = &children[0] {
            out.push_str(s);
        }
        for key_node in &children[1..] {
            if let Node::Leaf { value: Value::Str(s), .. } = key_node {
                out.push('.');
                out.push_str(s);
            } else {
                out.push('[');
                key_node.unparse_into(out);
                out.push(']');
            }
        }
    }
}

/// `(...)` grouping (spec.md §4.2 "Grouping").
#[derive(Debug)]
pub struct Group;

impl NodeType for Group {
    fn symbol(&self) -> &str {
        "group"
    }
    fn kind(&self) -> NodeKind {
        NodeKind::Group
    }
    fn scheme(&self) -> OptimizationScheme {
        OptimizationScheme::Full
    }
    fn min_children(&self) -> usize {
        1
    }
    fn max_children(&self) -> Option<usize> {
        Some(1)
    }
    fn render(&self, node: &Node, ctx: &mut RenderCtx) -> Result<Value, RenderError> {
        node.children()[0].render(ctx)
    }
    fn optimize(&self, node: &Node, ctx: &mut OptimizeCtx) -> Option<Node> {
        ctx.fold(node)
    }
    fn compile(&self, node: &Node, compiler: &mut Compiler) -> Result<(), CompileError> {
        node.children()[0].compile(compiler)
    }
    fn unparse(&self, node: &Node, out: &mut String) {
        out.push('(');
        node.children()[0].unparse_into(out);
        out.push(')');
    }
}

/// A dereference chain rooted in something other than a bare variable — a
/// parenthesized group, an array literal, or a dot-filter result — which
/// can't absorb extra children the way `Variable` does (spec.md §3
/// invariant 4, extended for non-variable bases).
#[derive(Debug)]
pub struct GroupDereference;

impl NodeType for GroupDereference {
    fn symbol(&self) -> &str {
        "group-dereference"
    }
    fn kind(&self) -> NodeKind {
        NodeKind::GroupDereference
    }
    fn min_children(&self) -> usize {
        2
    }
    fn max_children(&self) -> Option<usize> {
        Some(2)
    }
    fn render(&self, node: &Node, ctx: &mut RenderCtx) -> Result<Value, RenderError> {
        let base = node.children()[0].render(ctx)?;
        let key = node.children()[1].render(ctx)?;
        let segment = Variable::segment_value(key);
        Ok(ctx.resolver().get_index(&base, &segment).unwrap_or(Value::Nil))
    }
    fn compile(&self, node: &Node, compiler: &mut Compiler) -> Result<(), CompileError> {
        node.children()[0].compile(compiler)?;
        compiler.emit(OpCode::Mov, 1, Operand::Register(ACCUMULATOR));
        node.children()[1].compile(compiler)?;
        compiler.emit(OpCode::Resolve, ACCUMULATOR, Operand::Int(1));
        Ok(())
    }
    fn unparse(&self, node: &Node, out: &mut String) {
        node.children()[0].unparse_into(out);
        out.push('[');
        node.children()[1].unparse_into(out);
        out.push(']');
    }
}

/// `[a, b, c]` (spec.md §4.2 "Array literals").
#[derive(Debug)]
pub struct ArrayLiteral;

impl NodeType for ArrayLiteral {
    fn symbol(&self) -> &str {
        "array-literal"
    }
    fn kind(&self) -> NodeKind {
        NodeKind::ArrayLiteral
    }
    fn scheme(&self) -> OptimizationScheme {
        OptimizationScheme::Full
    }
    fn render(&self, node: &Node, ctx: &mut RenderCtx) -> Result<Value, RenderError> {
        let mut items = Vec::with_capacity(node.children().len());
        for child in node.children() {
            items.push(child.render(ctx)?);
        }
        Ok(Value::array(items))
    }
    fn optimize(&self, node: &Node, ctx: &mut OptimizeCtx) -> Option<Node> {
        ctx.fold(node)
    }
    fn compile(&self, node: &Node, compiler: &mut Compiler) -> Result<(), CompileError> {
        // No constant-pool representation for arrays (see
        // `Compiler::emit_constant`); array literals only evaluate
        // correctly through the tree-walking renderer.
        for child in node.children() {
            child.compile(compiler)?;
        }
        compiler.emit(OpCode::MovNil, ACCUMULATOR, Operand::None);
        Ok(())
    }
    fn unparse(&self, node: &Node, out: &mut String) {
        out.push('[');
        for (i, child) in node.children().iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            child.unparse_into(out);
        }
        out.push(']');
    }
}
