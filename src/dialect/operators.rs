//! Standard binary/unary operators (spec.md §6 "Operators"). Every one
//! implements `call` against already-evaluated operands so the generic
//! `CALL` opcode and the tree-walking `render` share one evaluation rule;
//! the core arithmetic/equality operators additionally compile to the VM's
//! dedicated `ADD`/`SUB`/`MUL`/`DIV`/`MOD`/`EQL` opcodes instead of `CALL`
//! (spec.md §4.5's opcode table reserves those for exactly this).
use crate::bytecode::{OpCode, Operand};
use crate::compile::{Compiler, ACCUMULATOR};
use crate::error::{CompileError, RenderError};
use crate::node::{Node, NodeKind, NodeType, OptimizationScheme};
use crate::optimize::OptimizeCtx;
use crate::render::RenderCtx;
use crate::value::Value;
use std::rc::Rc;

/// Scratch register the right operand is staged into while the left
/// operand (already in the accumulator) waits for the opcode that reads
/// both (spec.md §4.5: arithmetic opcodes read r0 and their own target).
const RHS_STAGE: usize = 1;

fn render_binary(node: &Node, ctx: &mut RenderCtx, node_type: &dyn NodeType) -> Result<Value, RenderError> {
    let children = node.children();
    let left = children[0].render(ctx)?;
    let right = children[1].render(ctx)?;
    node_type.call(&[left, right])
}

/// Stages `left` into r0, moves it to [`RHS_STAGE`], computes `right` into
/// r0, then emits `op` against [`RHS_STAGE`] — the shape every native
/// arithmetic/equality opcode expects.
fn compile_native(node: &Node, compiler: &mut Compiler, op: OpCode) -> Result<(), CompileError> {
    let children = node.children();
    children[0].compile(compiler)?;
    compiler.emit(OpCode::Mov, RHS_STAGE, Operand::Register(ACCUMULATOR));
    children[1].compile(compiler)?;
    compiler.emit(op, RHS_STAGE, Operand::None);
    Ok(())
}

/// Operators with no dedicated opcode (the four ordering comparisons) fall
/// back to the generic `CALL`, the same path user-defined operators/filters
/// would take.
fn compile_via_call(node: &Node, compiler: &mut Compiler, node_type: Rc<dyn NodeType>) -> Result<(), CompileError> {
    let children = node.children();
    compiler.compile_pushed(&children[0])?;
    compiler.compile_pushed(&children[1])?;
    compiler.emit_call(node_type, 2);
    Ok(())
}

macro_rules! native_binary {
    ($name:ident, $symbol:literal, $priority:expr, $op:expr, $call:expr) => {
        #[derive(Debug, Default)]
        pub struct $name;
        impl NodeType for $name {
            fn symbol(&self) -> &str {
                $symbol
            }
            fn kind(&self) -> NodeKind {
                NodeKind::Operator
            }
            fn priority(&self) -> u8 {
                $priority
            }
            fn scheme(&self) -> OptimizationScheme {
                OptimizationScheme::Full
            }
            fn min_children(&self) -> usize {
                2
            }
            fn max_children(&self) -> Option<usize> {
                Some(2)
            }
            fn render(&self, node: &Node, ctx: &mut RenderCtx) -> Result<Value, RenderError> {
                render_binary(node, ctx, self)
            }
            fn optimize(&self, node: &Node, ctx: &mut OptimizeCtx) -> Option<Node> {
                ctx.fold(node)
            }
            fn compile(&self, node: &Node, compiler: &mut Compiler) -> Result<(), CompileError> {
                compile_native(node, compiler, $op)
            }
            fn call(&self, args: &[Value]) -> Result<Value, RenderError> {
                $call(&args[0], &args[1])
            }
            fn unparse(&self, node: &Node, out: &mut String) {
                node.children()[0].unparse_into(out);
                out.push(' ');
                out.push_str($symbol);
                out.push(' ');
                node.children()[1].unparse_into(out);
            }
        }
    };
}

macro_rules! called_binary {
    ($name:ident, $symbol:literal, $priority:expr, $call:expr) => {
        #[derive(Debug, Default)]
        pub struct $name;
        impl NodeType for $name {
            fn symbol(&self) -> &str {
                $symbol
            }
            fn kind(&self) -> NodeKind {
                NodeKind::Operator
            }
            fn priority(&self) -> u8 {
                $priority
            }
            fn scheme(&self) -> OptimizationScheme {
                OptimizationScheme::Full
            }
            fn min_children(&self) -> usize {
                2
            }
            fn max_children(&self) -> Option<usize> {
                Some(2)
            }
            fn render(&self, node: &Node, ctx: &mut RenderCtx) -> Result<Value, RenderError> {
                render_binary(node, ctx, self)
            }
            fn optimize(&self, node: &Node, ctx: &mut OptimizeCtx) -> Option<Node> {
                ctx.fold(node)
            }
            fn compile(&self, node: &Node, compiler: &mut Compiler) -> Result<(), CompileError> {
                compile_via_call(node, compiler, Rc::new($name))
            }
            fn call(&self, args: &[Value]) -> Result<Value, RenderError> {
                $call(&args[0], &args[1])
            }
            fn unparse(&self, node: &Node, out: &mut String) {
                node.children()[0].unparse_into(out);
                out.push(' ');
                out.push_str($symbol);
                out.push(' ');
                node.children()[1].unparse_into(out);
            }
        }
    };
}

fn numeric(a: &Value, b: &Value, op: OpCode) -> Result<Value, RenderError> {
    let (af, bf) = match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => (a, b),
        _ => return Ok(Value::Nil),
    };
    let is_int = matches!((a, b), (Value::Int(_), Value::Int(_)));
    let result = match op {
        OpCode::Add => af + bf,
        OpCode::Sub => af - bf,
        OpCode::Mul => af * bf,
        OpCode::Div => af / bf,
        OpCode::Mod => af % bf,
        _ => unreachable!(),
    };
    if is_int && op != OpCode::Div {
        Ok(Value::Int(result as i64))
    } else {
        Ok(Value::Float(result))
    }
}

native_binary!(Plus, "+", 10, OpCode::Add, |a: &Value, b: &Value| numeric(a, b, OpCode::Add));
native_binary!(Minus, "-", 10, OpCode::Sub, |a: &Value, b: &Value| numeric(a, b, OpCode::Sub));
native_binary!(Times, "*", 20, OpCode::Mul, |a: &Value, b: &Value| numeric(a, b, OpCode::Mul));
native_binary!(DividedBy, "/", 20, OpCode::Div, |a: &Value, b: &Value| numeric(a, b, OpCode::Div));
native_binary!(Modulo, "%", 20, OpCode::Mod, |a: &Value, b: &Value| numeric(a, b, OpCode::Mod));
native_binary!(Equal, "==", 5, OpCode::Eql, |a: &Value, b: &Value| Ok(Value::Bool(a == b)));

called_binary!(NotEqual, "!=", 5, |a: &Value, b: &Value| Ok(Value::Bool(a != b)));
called_binary!(LessThan, "<", 5, |a: &Value, b: &Value| Ok(Value::Bool(
    a.partial_cmp(b).map(|o| o.is_lt()).unwrap_or(false)
)));
called_binary!(LessEqual, "<=", 5, |a: &Value, b: &Value| Ok(Value::Bool(
    a.partial_cmp(b).map(|o| o.is_le()).unwrap_or(false)
)));
called_binary!(GreaterThan, ">", 5, |a: &Value, b: &Value| Ok(Value::Bool(
    a.partial_cmp(b).map(|o| o.is_gt()).unwrap_or(false)
)));
called_binary!(GreaterEqual, ">=", 5, |a: &Value, b: &Value| Ok(Value::Bool(
    a.partial_cmp(b).map(|o| o.is_ge()).unwrap_or(false)
)));

/// `and`/`or` short-circuit (spec.md §6 "Falsiness policy" governs which
/// side decides); `call` can't short-circuit since both arguments already
/// arrived evaluated, so these override `render`/`compile` directly.
#[derive(Debug, Default)]
pub struct And;
impl NodeType for And {
    fn symbol(&self) -> &str {
        "and"
    }
    fn kind(&self) -> NodeKind {
        NodeKind::Operator
    }
    fn priority(&self) -> u8 {
        2
    }
    fn min_children(&self) -> usize {
        2
    }
    fn max_children(&self) -> Option<usize> {
        Some(2)
    }
    fn render(&self, node: &Node, ctx: &mut RenderCtx) -> Result<Value, RenderError> {
        let left = node.children()[0].render(ctx)?;
        if !left.is_truthy(ctx.falsiness()) {
            return Ok(Value::Bool(false));
        }
        let right = node.children()[1].render(ctx)?;
        Ok(Value::Bool(right.is_truthy(ctx.falsiness())))
    }
    fn compile(&self, node: &Node, compiler: &mut Compiler) -> Result<(), CompileError> {
        node.children()[0].compile(compiler)?;
        let skip = compiler.emit(OpCode::JmpFalse, ACCUMULATOR, Operand::None);
        node.children()[1].compile(compiler)?;
        // Coerce whatever the right side left in r0 down to a real `Bool`
        // (`Invert` applied twice: not-not is truthiness-as-bool).
        compiler.emit(OpCode::Invert, ACCUMULATOR, Operand::None);
        compiler.emit(OpCode::Invert, ACCUMULATOR, Operand::None);
        let after = compiler.emit(OpCode::Jmp, ACCUMULATOR, Operand::None);
        let false_at = compiler.here();
        compiler.emit_constant(&Value::Bool(false));
        compiler.patch(skip, Operand::CodeOffset(false_at));
        let end = compiler.here();
        compiler.patch(after, Operand::CodeOffset(end));
        Ok(())
    }
    fn unparse(&self, node: &Node, out: &mut String) {
        node.children()[0].unparse_into(out);
        out.push_str(" and ");
        node.children()[1].unparse_into(out);
    }
}

#[derive(Debug, Default)]
pub struct Or;
impl NodeType for Or {
    fn symbol(&self) -> &str {
        "or"
    }
    fn kind(&self) -> NodeKind {
        NodeKind::Operator
    }
    fn priority(&self) -> u8 {
        1
    }
    fn min_children(&self) -> usize {
        2
    }
    fn max_children(&self) -> Option<usize> {
        Some(2)
    }
    fn render(&self, node: &Node, ctx: &mut RenderCtx) -> Result<Value, RenderError> {
        let left = node.children()[0].render(ctx)?;
        if left.is_truthy(ctx.falsiness()) {
            return Ok(Value::Bool(true));
        }
        let right = node.children()[1].render(ctx)?;
        Ok(Value::Bool(right.is_truthy(ctx.falsiness())))
    }
    fn compile(&self, node: &Node, compiler: &mut Compiler) -> Result<(), CompileError> {
        node.children()[0].compile(compiler)?;
        let skip = compiler.emit(OpCode::JmpTrue, ACCUMULATOR, Operand::None);
        node.children()[1].compile(compiler)?;
        compiler.emit(OpCode::Invert, ACCUMULATOR, Operand::None);
        compiler.emit(OpCode::Invert, ACCUMULATOR, Operand::None);
        let after = compiler.emit(OpCode::Jmp, ACCUMULATOR, Operand::None);
        let true_at = compiler.here();
        compiler.emit_constant(&Value::Bool(true));
        compiler.patch(skip, Operand::CodeOffset(true_at));
        let end = compiler.here();
        compiler.patch(after, Operand::CodeOffset(end));
        Ok(())
    }
    fn unparse(&self, node: &Node, out: &mut String) {
        node.children()[0].unparse_into(out);
        out.push_str(" or ");
        node.children()[1].unparse_into(out);
    }
}

/// `a..b` (spec.md §6 "Range"): an inclusive array of integers, bounded by
/// `RenderOptions::max_range_size` (SPEC_FULL.md §5 decision 3 — above the
/// bound the range renders as `nil` rather than truncating silently).
#[derive(Debug, Default)]
pub struct Range;
impl NodeType for Range {
    fn symbol(&self) -> &str {
        ".."
    }
    fn kind(&self) -> NodeKind {
        NodeKind::Operator
    }
    fn priority(&self) -> u8 {
        3
    }
    fn scheme(&self) -> OptimizationScheme {
        OptimizationScheme::Full
    }
    fn min_children(&self) -> usize {
        2
    }
    fn max_children(&self) -> Option<usize> {
        Some(2)
    }
    fn render(&self, node: &Node, ctx: &mut RenderCtx) -> Result<Value, RenderError> {
        let children = node.children();
        let low = children[0].render(ctx)?.as_i64().unwrap_or(0);
        let high = children[1].render(ctx)?.as_i64().unwrap_or(0);
        if high < low {
            return Ok(Value::array(Vec::new()));
        }
        let span = high - low + 1;
        if span > ctx.context.render_options.max_range_size as i64 {
            return Ok(Value::Nil);
        }
        Ok(Value::array((low..=high).map(Value::Int).collect()))
    }
    fn optimize(&self, node: &Node, ctx: &mut OptimizeCtx) -> Option<Node> {
        ctx.fold(node)
    }
    fn compile(&self, _: &Node, _: &mut Compiler) -> Result<(), CompileError> {
        // A range's render materializes an array, which `emit_constant` has
        // no constant-pool representation for (`compile.rs` falls back to
        // `nil` for container values); evaluate it through the tree-walking
        // Renderer instead.
        Err(CompileError::new("'..' has no compiled-mode lowering; render via the tree-walking Renderer"))
    }
    fn unparse(&self, node: &Node, out: &mut String) {
        node.children()[0].unparse_into(out);
        out.push_str("..");
        node.children()[1].unparse_into(out);
    }
}

/// `not expr` (spec.md §6).
#[derive(Debug, Default)]
pub struct Not;
impl NodeType for Not {
    fn symbol(&self) -> &str {
        "not"
    }
    fn kind(&self) -> NodeKind {
        NodeKind::Operator
    }
    fn min_children(&self) -> usize {
        1
    }
    fn max_children(&self) -> Option<usize> {
        Some(1)
    }
    fn render(&self, node: &Node, ctx: &mut RenderCtx) -> Result<Value, RenderError> {
        let value = node.children()[0].render(ctx)?;
        Ok(Value::Bool(!value.is_truthy(ctx.falsiness())))
    }
    fn compile(&self, node: &Node, compiler: &mut Compiler) -> Result<(), CompileError> {
        node.children()[0].compile(compiler)?;
        compiler.emit(OpCode::Invert, ACCUMULATOR, Operand::None);
        Ok(())
    }
    fn unparse(&self, node: &Node, out: &mut String) {
        out.push_str("not ");
        node.children()[0].unparse_into(out);
    }
}
