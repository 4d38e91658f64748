//! The standard dialect's control tags (spec.md §6 "Tags (standard
//! dialect)"). Each is an independent, mechanical `NodeType`; the core
//! only defines the registration contract they implement.
use crate::bytecode::{OpCode, Operand};
use crate::compile::{Compiler, ACCUMULATOR};
use crate::error::{CompileError, ParseError, ParseErrorKind, RenderError};
use crate::node::{Node, NodeKind, NodeType};
use crate::parser::Parser;
use crate::render::{ControlSignal, DropScope, RenderCtx};
use crate::value::Value;

fn condition(children: &[Node], index: usize, ctx: &mut RenderCtx) -> Result<bool, RenderError> {
    let truthy = match children[index].children().first() {
        Some(expr) => expr.render(ctx)?.is_truthy(ctx.falsiness()),
        None => false,
    };
    Ok(truthy)
}

/// `{% if %}...{% elsif %}...{% else %}...{% endif %}` (spec.md §6).
#[derive(Debug)]
pub struct If;

impl NodeType for If {
    fn symbol(&self) -> &str {
        "if"
    }
    fn kind(&self) -> NodeKind {
        NodeKind::Tag
    }
    fn intermediates(&self) -> &'static [&'static str] {
        &["elsif", "else"]
    }

    fn render(&self, node: &Node, ctx: &mut RenderCtx) -> Result<Value, RenderError> {
        let children = node.children();
        if condition(children, 0, ctx)? {
            return children[1].render(ctx);
        }
        let mut index = 2;
        while index + 2 < children.len() {
            let name = children[index].leaf_value().and_then(Value::as_str_view).unwrap_or("");
            let is_else = name == "else";
            if is_else || condition(children, index + 1, ctx)? {
                return children[index + 2].render(ctx);
            }
            index += 3;
        }
        Ok(Value::Nil)
    }

    fn compile(&self, node: &Node, compiler: &mut Compiler) -> Result<(), CompileError> {
        let children = node.children();
        let mut end_jumps = Vec::new();
        compile_clause(children, 0, compiler, &mut end_jumps)?;
        let mut index = 2;
        while index + 2 < children.len() {
            let name = children[index].leaf_value().and_then(Value::as_str_view).unwrap_or("");
            if name == "else" {
                children[index + 2].compile(compiler)?;
            } else {
                compile_clause(children, index + 1, compiler, &mut end_jumps)?;
            }
            index += 3;
        }
        // Land every taken-branch's trailing jump exactly on this `MovNil`
        // (captured before emitting it) so every path — matched clause,
        // matched `else`, or no match at all — leaves the accumulator Nil,
        // mirroring `render`'s body-value-or-Nil result.
        let movnil_at = compiler.emit(OpCode::MovNil, ACCUMULATOR, Operand::None);
        for jump in end_jumps {
            compiler.patch(jump, Operand::CodeOffset(movnil_at));
        }
        Ok(())
    }

    fn unparse(&self, node: &Node, out: &mut String) {
        unparse_clauses(self.symbol(), node, out);
    }
}

/// Compiles one `if`/`elsif` clause: its condition, a `JMPFALSE` past the
/// body, the body itself, then an unconditional jump to the construct's
/// end (recorded into `end_jumps` for the caller to patch).
fn compile_clause(
    children: &[Node],
    args_index: usize,
    compiler: &mut Compiler,
    end_jumps: &mut Vec<usize>,
) -> Result<(), CompileError> {
    match children[args_index].children().first() {
        Some(expr) => expr.compile(compiler)?,
        None => compiler.emit_constant(&Value::Bool(false)),
    }
    let skip = compiler.emit(OpCode::JmpFalse, ACCUMULATOR, Operand::None);
    children[args_index + 1].compile(compiler)?;
    let jump = compiler.emit(OpCode::Jmp, ACCUMULATOR, Operand::None);
    end_jumps.push(jump);
    let here = compiler.here();
    compiler.patch(skip, Operand::CodeOffset(here));
    Ok(())
}

fn unparse_clauses(symbol: &str, node: &Node, out: &mut String) {
    let children = node.children();
    out.push_str("{% ");
    out.push_str(symbol);
    out.push(' ');
    if let Some(expr) = children[0].children().first() {
        expr.unparse_into(out);
    }
    out.push_str(" %}");
    children[1].unparse_into(out);
    let mut index = 2;
    while index + 2 < children.len() {
        let name = children[index].leaf_value().and_then(Value::as_str_view).unwrap_or("");
        out.push_str("{% ");
        out.push_str(name);
        if let Some(expr) = children[index + 1].children().first() {
            out.push(' ');
            expr.unparse_into(out);
        }
        out.push_str(" %}");
        children[index + 2].unparse_into(out);
        index += 3;
    }
    out.push_str("{% end");
    out.push_str(symbol);
    out.push_str(" %}");
}

/// `{% unless %}...{% else %}...{% endunless %}` — `if` with the root
/// condition inverted and no `elsif`.
#[derive(Debug)]
pub struct Unless;

impl NodeType for Unless {
    fn symbol(&self) -> &str {
        "unless"
    }
    fn kind(&self) -> NodeKind {
        NodeKind::Tag
    }
    fn intermediates(&self) -> &'static [&'static str] {
        &["else"]
    }

    fn render(&self, node: &Node, ctx: &mut RenderCtx) -> Result<Value, RenderError> {
        let children = node.children();
        if !condition(children, 0, ctx)? {
            return children[1].render(ctx);
        }
        if children.len() > 2 {
            return children[4].render(ctx);
        }
        Ok(Value::Nil)
    }

    fn compile(&self, node: &Node, compiler: &mut Compiler) -> Result<(), CompileError> {
        let children = node.children();
        match children[0].children().first() {
            Some(expr) => expr.compile(compiler)?,
            None => compiler.emit_constant(&Value::Bool(false)),
        }
        let skip = compiler.emit(OpCode::JmpTrue, ACCUMULATOR, Operand::None);
        children[1].compile(compiler)?;
        let after_then = compiler.emit(OpCode::Jmp, ACCUMULATOR, Operand::None);
        let else_start = compiler.here();
        compiler.patch(skip, Operand::CodeOffset(else_start));
        if children.len() > 2 {
            children[4].compile(compiler)?;
        }
        let after = compiler.here();
        compiler.patch(after_then, Operand::CodeOffset(after));
        compiler.emit(OpCode::MovNil, ACCUMULATOR, Operand::None);
        Ok(())
    }

    fn unparse(&self, node: &Node, out: &mut String) {
        unparse_clauses(self.symbol(), node, out);
    }
}

/// `{% case %}...{% when %}...{% else %}...{% endcase %}` (spec.md §6).
#[derive(Debug)]
pub struct Case;

impl NodeType for Case {
    fn symbol(&self) -> &str {
        "case"
    }
    fn kind(&self) -> NodeKind {
        NodeKind::Tag
    }
    fn intermediates(&self) -> &'static [&'static str] {
        &["when", "else"]
    }

    fn render(&self, node: &Node, ctx: &mut RenderCtx) -> Result<Value, RenderError> {
        let children = node.children();
        let subject = match children[0].children().first() {
            Some(expr) => expr.render(ctx)?,
            None => Value::Nil,
        };
        let mut index = 2;
        while index + 2 < children.len() {
            let name = children[index].leaf_value().and_then(Value::as_str_view).unwrap_or("");
            if name == "else" {
                return children[index + 2].render(ctx);
            }
            for candidate_expr in children[index + 1].children() {
                if candidate_expr.render(ctx)? == subject {
                    return children[index + 2].render(ctx);
                }
            }
            index += 3;
        }
        Ok(Value::Nil)
    }

    fn compile(&self, node: &Node, compiler: &mut Compiler) -> Result<(), CompileError> {
        // `case` has no bytecode-level representation of "compare against
        // N values, fall to the matching body" in this engine's opcode
        // set (spec.md §4.5's table has no multi-way branch); render it
        // through the tree-walking Renderer instead.
        let _ = node;
        Err(CompileError::new("'case' has no compiled-mode lowering; render via the tree-walking Renderer"))
    }

    fn unparse(&self, node: &Node, out: &mut String) {
        let children = node.children();
        out.push_str("{% case ");
        if let Some(expr) = children[0].children().first() {
            expr.unparse_into(out);
        }
        out.push_str(" %}");
        let mut index = 2;
        while index + 2 < children.len() {
            let name = children[index].leaf_value().and_then(Value::as_str_view).unwrap_or("");
            out.push_str("{% ");
            out.push_str(name);
            for (i, expr) in children[index + 1].children().iter().enumerate() {
                out.push_str(if i == 0 { " " } else { ", " });
                expr.unparse_into(out);
            }
            out.push_str(" %}");
            children[index + 2].unparse_into(out);
            index += 3;
        }
        out.push_str("{% endcase %}");
    }
}

/// `when`/`elsif`/`else` only ever surface through [`Parser::parse_tag`]'s
/// lookup of their own `parse_arguments` grammar — they never become an
/// `Internal` node themselves (the parser records them as a bare name
/// leaf), so `render`/`compile`/`unparse` are unreachable; still
/// implemented because every registered tag needs a full `NodeType`.
#[derive(Debug)]
pub struct When;

impl NodeType for When {
    fn symbol(&self) -> &str {
        "when"
    }
    fn kind(&self) -> NodeKind {
        NodeKind::Tag
    }
    fn parse_arguments(&self, parser: &mut Parser) -> Result<Node, ParseError> {
        let position = parser.peek_position()?;
        let mut exprs = vec![parser.parse_expression(0)?];
        while parser.consume_if_comma()? {
            exprs.push(parser.parse_expression(0)?);
        }
        Ok(parser.arguments_node(exprs, position))
    }
    fn render(&self, _: &Node, _: &mut RenderCtx) -> Result<Value, RenderError> {
        Ok(Value::Nil)
    }
    fn compile(&self, _: &Node, compiler: &mut Compiler) -> Result<(), CompileError> {
        compiler.emit_constant(&Value::Nil);
        Ok(())
    }
    fn unparse(&self, _: &Node, _: &mut String) {}
}

#[derive(Debug)]
pub struct Elsif;

impl NodeType for Elsif {
    fn symbol(&self) -> &str {
        "elsif"
    }
    fn kind(&self) -> NodeKind {
        NodeKind::Tag
    }
    fn render(&self, _: &Node, _: &mut RenderCtx) -> Result<Value, RenderError> {
        Ok(Value::Nil)
    }
    fn compile(&self, _: &Node, compiler: &mut Compiler) -> Result<(), CompileError> {
        compiler.emit_constant(&Value::Nil);
        Ok(())
    }
    fn unparse(&self, _: &Node, _: &mut String) {}
}

/// Shared `else` marker for `if`/`unless`/`case`/`for`: takes no arguments.
#[derive(Debug)]
pub struct Else;

impl NodeType for Else {
    fn symbol(&self) -> &str {
        "else"
    }
    fn kind(&self) -> NodeKind {
        NodeKind::Tag
    }
    fn parse_arguments(&self, parser: &mut Parser) -> Result<Node, ParseError> {
        let position = parser.peek_position()?;
        Ok(parser.arguments_node(Vec::new(), position))
    }
    fn render(&self, _: &Node, _: &mut RenderCtx) -> Result<Value, RenderError> {
        Ok(Value::Nil)
    }
    fn compile(&self, _: &Node, compiler: &mut Compiler) -> Result<(), CompileError> {
        compiler.emit_constant(&Value::Nil);
        Ok(())
    }
    fn unparse(&self, _: &Node, _: &mut String) {}
}

/// `{% for item in collection [reversed] [limit: n] [offset: n] %}...{%
/// else %}...{% endfor %}` (spec.md §6, SPEC_FULL.md §4 "`forloop` drop").
#[derive(Debug)]
pub struct For;

struct ForArgs<'n> {
    item_name: &'n str,
    collection: &'n Node,
    reversed: bool,
    limit: Option<&'n Node>,
    offset: Option<&'n Node>,
}

fn parse_for_args(args: &Node) -> ForArgs<'_> {
    let children = args.children();
    let item_name = children[0].leaf_value().and_then(Value::as_str_view).unwrap_or("");
    let mut result = ForArgs {
        item_name,
        collection: &children[1],
        reversed: false,
        limit: None,
        offset: None,
    };
    let mut index = 2;
    while index + 1 < children.len() {
        let name = children[index].leaf_value().and_then(Value::as_str_view).unwrap_or("");
        match name {
            "reversed" => result.reversed = true,
            "limit" => result.limit = Some(&children[index + 1]),
            "offset" => result.offset = Some(&children[index + 1]),
            _ => {}
        }
        index += 2;
    }
    result
}

impl NodeType for For {
    fn symbol(&self) -> &str {
        "for"
    }
    fn kind(&self) -> NodeKind {
        NodeKind::Tag
    }
    fn intermediates(&self) -> &'static [&'static str] {
        &["else"]
    }
    fn qualifiers(&self) -> &'static [&'static str] {
        &["reversed", "limit", "offset"]
    }

    fn parse_arguments(&self, parser: &mut Parser) -> Result<Node, ParseError> {
        let position = parser.peek_position()?;
        let (item_name, _) = parser.expect_identifier()?;
        if !parser.consume_identifier_if("in")? {
            return Err(parser.error(ParseErrorKind::InvalidArguments, position, vec!["for".to_string()]));
        }
        let collection = parser.parse_expression(0)?;
        let mut children = vec![Node::leaf(Value::str(item_name), position), collection];
        loop {
            if parser.consume_identifier_if("reversed")? {
                children.push(Node::leaf(Value::str("reversed"), position));
                children.push(Node::leaf(Value::Bool(true), position));
            } else if parser.consume_identifier_if("limit")? {
                parser.consume_if_colon()?;
                let value = parser.parse_expression(0)?;
                children.push(Node::leaf(Value::str("limit"), position));
                children.push(value);
            } else if parser.consume_identifier_if("offset")? {
                parser.consume_if_colon()?;
                let value = parser.parse_expression(0)?;
                children.push(Node::leaf(Value::str("offset"), position));
                children.push(value);
            } else {
                break;
            }
        }
        Ok(parser.arguments_node(children, position))
    }

    fn render(&self, node: &Node, ctx: &mut RenderCtx) -> Result<Value, RenderError> {
        let children = node.children();
        let args = parse_for_args(&children[0]);
        let collection_value = args.collection.render(ctx)?;
        let mut elements = ctx.resolver().enumerate(&collection_value).unwrap_or_default();
        if let Some(offset_expr) = args.offset {
            let n = offset_expr.render(ctx)?.as_i64().unwrap_or(0).max(0) as usize;
            if n < elements.len() {
                elements.drain(..n);
            } else {
                elements.clear();
            }
        }
        if let Some(limit_expr) = args.limit {
            let n = limit_expr.render(ctx)?.as_i64().unwrap_or(0).max(0) as usize;
            elements.truncate(n);
        }
        if args.reversed {
            elements.reverse();
        }

        if elements.is_empty() {
            return match children.len() {
                n if n > 1 && children[2].leaf_value().and_then(Value::as_str_view) == Some("else") => {
                    children[4].render(ctx)
                }
                _ => Ok(Value::Nil),
            };
        }

        let body = &children[1];
        let length = elements.len();
        for (index, element) in elements.into_iter().enumerate() {
            ctx.check_limits()?;
            let mut forloop = std::collections::BTreeMap::new();
            forloop.insert("index".to_string(), Value::Int(index as i64 + 1));
            forloop.insert("index0".to_string(), Value::Int(index as i64));
            forloop.insert("rindex".to_string(), Value::Int((length - index) as i64));
            forloop.insert("rindex0".to_string(), Value::Int((length - index - 1) as i64));
            forloop.insert("first".to_string(), Value::Bool(index == 0));
            forloop.insert("last".to_string(), Value::Bool(index + 1 == length));
            forloop.insert("length".to_string(), Value::Int(length as i64));
            ctx.push_drop(DropScope::new().set("forloop", Value::map(forloop)));
            ctx.resolver_mut().assign(args.item_name, &[], element);
            let result = body.render(ctx);
            ctx.pop_drop();
            let value = result?;
            let _ = value;
            match ctx.control {
                ControlSignal::Break => {
                    ctx.control = ControlSignal::None;
                    break;
                }
                ControlSignal::Continue => {
                    ctx.control = ControlSignal::None;
                }
                ControlSignal::Exit => return Ok(Value::Nil),
                ControlSignal::None => {}
            }
        }
        Ok(Value::Nil)
    }

    fn compile(&self, node: &Node, compiler: &mut Compiler) -> Result<(), CompileError> {
        // Qualifiers (`reversed`/`limit:`/`offset:`) and the `forloop` drop
        // need the eager `Vec<Value>` enumeration and scoped-name lookup
        // only the tree-walking Renderer's `RenderCtx` provides; the VM's
        // `ITERATE` covers the unqualified `for x in y` shape (see
        // `vm.rs`), compiled here only when no qualifiers are present.
        let children = node.children();
        let args = parse_for_args(&children[0]);
        if args.reversed || args.limit.is_some() || args.offset.is_some() {
            return Err(CompileError::new(
                "'for' with reversed/limit/offset qualifiers has no compiled-mode lowering",
            ));
        }
        args.collection.compile(compiler)?;
        let iterate_index = compiler.emit(OpCode::Iterate, ACCUMULATOR, Operand::None);
        let name_offset = compiler.intern(args.item_name);
        compiler.emit(OpCode::Assign, ACCUMULATOR, Operand::DataOffset(name_offset));
        children[1].compile(compiler)?;
        let body_end = compiler.here();
        let has_else = children.len() > 1
            && children.get(2).and_then(|n| n.leaf_value()).and_then(Value::as_str_view) == Some("else");
        if has_else {
            children[4].compile(compiler)?;
        }
        let after = compiler.here();
        compiler.patch(
            iterate_index,
            Operand::IterateTargets { else_or_body_end: body_end, after },
        );
        compiler.emit(OpCode::MovNil, ACCUMULATOR, Operand::None);
        Ok(())
    }

    fn unparse(&self, node: &Node, out: &mut String) {
        let children = node.children();
        let args = parse_for_args(&children[0]);
        out.push_str("{% for ");
        out.push_str(args.item_name);
        out.push_str(" in ");
        args.collection.unparse_into(out);
        if args.reversed {
            out.push_str(" reversed");
        }
        if let Some(limit) = args.limit {
            out.push_str(" limit: ");
            limit.unparse_into(out);
        }
        if let Some(offset) = args.offset {
            out.push_str(" offset: ");
            offset.unparse_into(out);
        }
        out.push_str(" %}");
        children[1].unparse_into(out);
        if children.len() > 2 {
            out.push_str("{% else %}");
            children[4].unparse_into(out);
        }
        out.push_str("{% endfor %}");
    }
}

/// `{% break %}` — self-closing, only meaningful inside `for` (spec.md §6,
/// §8 "`{% break %}` at depth > 1 breaks only the innermost loop").
#[derive(Debug)]
pub struct Break;

impl NodeType for Break {
    fn symbol(&self) -> &str {
        "break"
    }
    fn kind(&self) -> NodeKind {
        NodeKind::Tag
    }
    fn is_block(&self) -> bool {
        false
    }
    fn render(&self, _: &Node, ctx: &mut RenderCtx) -> Result<Value, RenderError> {
        ctx.control = ControlSignal::Break;
        Ok(Value::Nil)
    }
    fn compile(&self, _: &Node, _: &mut Compiler) -> Result<(), CompileError> {
        // `run_range`'s only way to signal early termination to its caller
        // is `OpCode::Exit`; a `Jmp` past a sub-range's end just ends that
        // range normally (spec.md §4.5's table has no dedicated
        // break/continue opcode), so a compiled `break` can't be told apart
        // from the loop body simply finishing. Tree-walker only.
        Err(CompileError::new("'break' has no compiled-mode lowering; render via the tree-walking Renderer"))
    }
    fn unparse(&self, _: &Node, out: &mut String) {
        out.push_str("{% break %}");
    }
}

/// `{% continue %}` — self-closing, only meaningful inside `for`.
#[derive(Debug)]
pub struct Continue;

impl NodeType for Continue {
    fn symbol(&self) -> &str {
        "continue"
    }
    fn kind(&self) -> NodeKind {
        NodeKind::Tag
    }
    fn is_block(&self) -> bool {
        false
    }
    fn render(&self, _: &Node, ctx: &mut RenderCtx) -> Result<Value, RenderError> {
        ctx.control = ControlSignal::Continue;
        Ok(Value::Nil)
    }
    fn compile(&self, _: &Node, _: &mut Compiler) -> Result<(), CompileError> {
        Err(CompileError::new("'continue' has no compiled-mode lowering; render via the tree-walking Renderer"))
    }
    fn unparse(&self, _: &Node, out: &mut String) {
        out.push_str("{% continue %}");
    }
}

/// `{% assign name = expr %}` (spec.md §6, "`=` (inside `assign`)").
#[derive(Debug)]
pub struct Assign;

impl NodeType for Assign {
    fn symbol(&self) -> &str {
        "assign"
    }
    fn kind(&self) -> NodeKind {
        NodeKind::Tag
    }
    fn is_block(&self) -> bool {
        false
    }

    fn parse_arguments(&self, parser: &mut Parser) -> Result<Node, ParseError> {
        let position = parser.peek_position()?;
        let (name, name_pos) = parser.expect_identifier()?;
        let (token, eq_pos) = parser.advance()?;
        if !matches!(&token, crate::lexer::Token::Symbol(s) if s == "=") {
            return Err(parser.error(ParseErrorKind::InvalidSymbol, eq_pos, vec!["=".to_string()]));
        }
        let value = parser.parse_expression(0)?;
        Ok(parser.arguments_node(vec![Node::leaf(Value::str(name), name_pos), value], position))
    }

    fn render(&self, node: &Node, ctx: &mut RenderCtx) -> Result<Value, RenderError> {
        let children = node.children()[0].children();
        let name = children[0].leaf_value().and_then(Value::as_str_view).unwrap_or("").to_string();
        let value = children[1].render(ctx)?;
        ctx.resolver_mut().assign(&name, &[], value);
        Ok(Value::Nil)
    }

    fn compile(&self, node: &Node, compiler: &mut Compiler) -> Result<(), CompileError> {
        let children = node.children()[0].children();
        let name = children[0].leaf_value().and_then(Value::as_str_view).unwrap_or("");
        children[1].compile(compiler)?;
        let offset = compiler.intern(name);
        compiler.emit(OpCode::Assign, ACCUMULATOR, Operand::DataOffset(offset));
        compiler.emit(OpCode::MovNil, ACCUMULATOR, Operand::None);
        Ok(())
    }

    fn unparse(&self, node: &Node, out: &mut String) {
        let children = node.children()[0].children();
        out.push_str("{% assign ");
        if let Some(Value::Str(s)) = children[0].leaf_value() {
            out.push_str(s);
        }
        out.push_str(" = ");
        children[1].unparse_into(out);
        out.push_str(" %}");
    }
}

/// `{% capture name %}...{% endcapture %}` (spec.md §8 scenario 5).
#[derive(Debug)]
pub struct Capture;

impl NodeType for Capture {
    fn symbol(&self) -> &str {
        "capture"
    }
    fn kind(&self) -> NodeKind {
        NodeKind::Tag
    }

    fn parse_arguments(&self, parser: &mut Parser) -> Result<Node, ParseError> {
        let position = parser.peek_position()?;
        let (name, name_pos) = parser.expect_identifier()?;
        Ok(parser.arguments_node(vec![Node::leaf(Value::str(name), name_pos)], position))
    }

    fn render(&self, node: &Node, ctx: &mut RenderCtx) -> Result<Value, RenderError> {
        let children = node.children();
        let name = children[0].children()[0]
            .leaf_value()
            .and_then(Value::as_str_view)
            .unwrap_or("")
            .to_string();
        let text = ctx.capture(&children[1])?;
        ctx.resolver_mut().assign(&name, &[], Value::str(text));
        Ok(Value::Nil)
    }

    fn compile(&self, node: &Node, compiler: &mut Compiler) -> Result<(), CompileError> {
        let children = node.children();
        let name = children[0].children()[0].leaf_value().and_then(Value::as_str_view).unwrap_or("");
        compiler.emit(OpCode::PushBuffer, ACCUMULATOR, Operand::None);
        children[1].compile(compiler)?;
        const CAPTURE_REG: usize = 1;
        compiler.emit(OpCode::PopBuffer, CAPTURE_REG, Operand::None);
        let offset = compiler.intern(name);
        compiler.emit(OpCode::Assign, CAPTURE_REG, Operand::DataOffset(offset));
        compiler.emit(OpCode::MovNil, ACCUMULATOR, Operand::None);
        Ok(())
    }

    fn unparse(&self, node: &Node, out: &mut String) {
        let children = node.children();
        out.push_str("{% capture ");
        if let Some(Value::Str(s)) = children[0].children()[0].leaf_value() {
            out.push_str(s);
        }
        out.push_str(" %}");
        children[1].unparse_into(out);
        out.push_str("{% endcapture %}");
    }
}

/// `{% increment name %}`/`{% decrement name %}` share one counter
/// namespace per variable name, independent of the store (SPEC_FULL.md
/// §3), each starting at 0.
#[derive(Debug)]
pub struct Increment;

impl NodeType for Increment {
    fn symbol(&self) -> &str {
        "increment"
    }
    fn kind(&self) -> NodeKind {
        NodeKind::Tag
    }
    fn is_block(&self) -> bool {
        false
    }
    fn parse_arguments(&self, parser: &mut Parser) -> Result<Node, ParseError> {
        let position = parser.peek_position()?;
        let (name, name_pos) = parser.expect_identifier()?;
        Ok(parser.arguments_node(vec![Node::leaf(Value::str(name), name_pos)], position))
    }
    fn render(&self, node: &Node, ctx: &mut RenderCtx) -> Result<Value, RenderError> {
        let name = node.children()[0].leaf_value().and_then(Value::as_str_view).unwrap_or("");
        Ok(Value::Int(ctx.bump_counter(name, 1)))
    }
    fn compile(&self, _: &Node, _: &mut Compiler) -> Result<(), CompileError> {
        Err(CompileError::new("'increment' has no compiled-mode lowering; render via the tree-walking Renderer"))
    }
    fn unparse(&self, node: &Node, out: &mut String) {
        out.push_str("{% increment ");
        if let Some(Value::Str(s)) = node.children()[0].leaf_value() {
            out.push_str(s);
        }
        out.push_str(" %}");
    }
}

#[derive(Debug)]
pub struct Decrement;

impl NodeType for Decrement {
    fn symbol(&self) -> &str {
        "decrement"
    }
    fn kind(&self) -> NodeKind {
        NodeKind::Tag
    }
    fn is_block(&self) -> bool {
        false
    }
    fn parse_arguments(&self, parser: &mut Parser) -> Result<Node, ParseError> {
        let position = parser.peek_position()?;
        let (name, name_pos) = parser.expect_identifier()?;
        Ok(parser.arguments_node(vec![Node::leaf(Value::str(name), name_pos)], position))
    }
    fn render(&self, node: &Node, ctx: &mut RenderCtx) -> Result<Value, RenderError> {
        let name = node.children()[0].leaf_value().and_then(Value::as_str_view).unwrap_or("");
        Ok(Value::Int(ctx.bump_counter(name, -1) - 1))
    }
    fn compile(&self, _: &Node, _: &mut Compiler) -> Result<(), CompileError> {
        Err(CompileError::new("'decrement' has no compiled-mode lowering; render via the tree-walking Renderer"))
    }
    fn unparse(&self, node: &Node, out: &mut String) {
        out.push_str("{% decrement ");
        if let Some(Value::Str(s)) = node.children()[0].leaf_value() {
            out.push_str(s);
        }
        out.push_str(" %}");
    }
}

/// `{% raw %}...{% endraw %}` (spec.md §8 scenario 7): the body was
/// captured verbatim by the lexer and is stored as a single string leaf.
#[derive(Debug)]
pub struct Raw;

impl NodeType for Raw {
    fn symbol(&self) -> &str {
        "raw"
    }
    fn kind(&self) -> NodeKind {
        NodeKind::Tag
    }
    fn scheme(&self) -> crate::node::OptimizationScheme {
        crate::node::OptimizationScheme::Shield
    }
    fn render(&self, node: &Node, ctx: &mut RenderCtx) -> Result<Value, RenderError> {
        node.children()[1].render(ctx)
    }
    fn compile(&self, node: &Node, compiler: &mut Compiler) -> Result<(), CompileError> {
        node.children()[1].compile(compiler)
    }
    fn unparse(&self, node: &Node, out: &mut String) {
        out.push_str("{% raw %}");
        if let Some(Value::Str(s)) = node.children()[1].leaf_value() {
            out.push_str(s);
        }
        out.push_str("{% endraw %}");
    }
}

/// `{% echo expr %}` — `{{ expr }}` spelled as a tag so it is usable
/// anywhere only tags are syntactically valid, e.g. `{% liquid %}` line
/// mode (SPEC_FULL.md §3).
#[derive(Debug)]
pub struct Echo;

impl NodeType for Echo {
    fn symbol(&self) -> &str {
        "echo"
    }
    fn kind(&self) -> NodeKind {
        NodeKind::Tag
    }
    fn is_block(&self) -> bool {
        false
    }
    fn render(&self, node: &Node, ctx: &mut RenderCtx) -> Result<Value, RenderError> {
        match node.children()[0].children().first() {
            Some(expr) => expr.render(ctx),
            None => Ok(Value::Nil),
        }
    }
    fn compile(&self, node: &Node, compiler: &mut Compiler) -> Result<(), CompileError> {
        match node.children()[0].children().first() {
            Some(expr) => expr.compile(compiler),
            None => {
                compiler.emit_constant(&Value::Nil);
                Ok(())
            }
        }
    }
    fn unparse(&self, node: &Node, out: &mut String) {
        out.push_str("{% echo ");
        if let Some(expr) = node.children()[0].children().first() {
            expr.unparse_into(out);
        }
        out.push_str(" %}");
    }
}

/// `{% cycle ["group":] a, b, c %}` (SPEC_FULL.md §3: named groups so
/// multiple independent cycles interleave; unnamed cycles key off their
/// rendered argument list's source text).
#[derive(Debug)]
pub struct Cycle;

impl NodeType for Cycle {
    fn symbol(&self) -> &str {
        "cycle"
    }
    fn kind(&self) -> NodeKind {
        NodeKind::Tag
    }
    fn is_block(&self) -> bool {
        false
    }

    fn parse_arguments(&self, parser: &mut Parser) -> Result<Node, ParseError> {
        let position = parser.peek_position()?;
        let mut children = Vec::new();
        if let crate::lexer::Token::StringLit(s) = parser.peek()?.clone() {
            let (_, str_pos) = parser.advance()?;
            if parser.consume_if_colon()? {
                children.push(Node::leaf(Value::str(s), str_pos));
            } else {
                parser.unread(crate::lexer::Token::StringLit(s), str_pos);
                children.push(Node::leaf(Value::Nil, position));
            }
        } else {
            children.push(Node::leaf(Value::Nil, position));
        }
        loop {
            children.push(parser.parse_expression(0)?);
            if !parser.consume_if_comma()? {
                break;
            }
        }
        Ok(parser.arguments_node(children, position))
    }

    fn render(&self, node: &Node, ctx: &mut RenderCtx) -> Result<Value, RenderError> {
        let children = node.children()[0].children();
        let values = &children[1..];
        if values.is_empty() {
            return Ok(Value::Nil);
        }
        let key = match &children[0] {
            Node::Leaf { value: Value::Str(s), .. } => s.to_string(),
            _ => {
                let mut text = String::new();
                for expr in values {
                    expr.unparse_into(&mut text);
                }
                text
            }
        };
        let index = ctx.cycle_index(&key, values.len());
        values[index].render(ctx)
    }

    fn compile(&self, _: &Node, _: &mut Compiler) -> Result<(), CompileError> {
        Err(CompileError::new("'cycle' has no compiled-mode lowering; render via the tree-walking Renderer"))
    }

    fn unparse(&self, node: &Node, out: &mut String) {
        let children = node.children()[0].children();
        out.push_str("{% cycle ");
        if let Node::Leaf { value: Value::Str(s), .. } = &children[0] {
            out.push('"');
            out.push_str(s);
            out.push_str("\": ");
        }
        for (i, expr) in children[1..].iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            expr.unparse_into(out);
        }
        out.push_str(" %}");
    }
}
