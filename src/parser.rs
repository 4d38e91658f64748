//! The token-driven AST builder (spec.md §4.2).
//!
//! The source maintains an explicit stack of in-progress nodes that lexer
//! callbacks shift/reduce. Driven from a pull [`Lexer`] instead of push
//! callbacks (see `lexer.rs`), the natural idiomatic shape is ordinary
//! recursive descent with precedence climbing for operators — it produces
//! the identical tree shape the source's tree-rotation describes (the
//! lower-priority operator ends up as the parent) without needing a
//! separate operator stack. Recorded as an Open Question decision in
//! `DESIGN.md`.
use crate::context::Context;
use crate::error::{ParseError, ParseErrorKind};
use crate::lexer::{Lexer, Token};
use crate::node::{Node, NodeType};
use crate::position::Position;
use crate::value::Value;
use std::rc::Rc;

pub struct Parser<'c, 'x> {
    lexer: Lexer<'c, 'x>,
    context: &'x Context,
    lookahead: Option<(Token, Position)>,
    depth: usize,
    pub errors: Vec<ParseError>,
    file: Option<String>,
}

/// A placeholder substituted for an unrecognized filter name (spec.md §4.2
/// "turned into an `UnknownFilter` placeholder node which renders as empty
/// and records a warning"), or a parse-time recovery point.
#[derive(Debug)]
struct UnknownFilter {
    name: String,
}

impl NodeType for UnknownFilter {
    fn symbol(&self) -> &str {
        &self.name
    }
    fn kind(&self) -> crate::node::NodeKind {
        crate::node::NodeKind::Filter
    }
    fn render(
        &self,
        node: &Node,
        ctx: &mut crate::render::RenderCtx,
    ) -> Result<Value, crate::error::RenderError> {
        ctx.warn(node.position(), format!("unknown filter '{}'", self.name));
        Ok(Value::Nil)
    }
    fn compile(&self, _: &Node, compiler: &mut crate::compile::Compiler) -> Result<(), crate::error::CompileError> {
        compiler.emit_constant(&Value::Nil);
        Ok(())
    }
    fn unparse(&self, node: &Node, out: &mut String) {
        if let Some(operand) = node.children().first() {
            operand.unparse_into(out);
        }
        out.push_str(" | ");
        out.push_str(&self.name);
    }
}

impl<'c, 'x> Parser<'c, 'x> {
    pub fn new(source: &'c str, context: &'x Context) -> Self {
        Self {
            lexer: Lexer::new(source, context),
            context,
            lookahead: None,
            depth: 0,
            errors: Vec::new(),
            file: None,
        }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn context(&self) -> &'x Context {
        self.context
    }

    fn fill(&mut self) -> Result<(), ParseError> {
        if self.lookahead.is_none() {
            self.lookahead = Some(self.lexer.next_token()?);
        }
        Ok(())
    }

    pub fn peek(&mut self) -> Result<&Token, ParseError> {
        self.fill()?;
        Ok(&self.lookahead.as_ref().unwrap().0)
    }

    pub fn peek_position(&mut self) -> Result<Position, ParseError> {
        self.fill()?;
        Ok(self.lookahead.as_ref().unwrap().1)
    }

    pub fn advance(&mut self) -> Result<(Token, Position), ParseError> {
        self.fill()?;
        Ok(self.lookahead.take().unwrap())
    }

    /// Stuffs `token` back into the single lookahead slot, for the one
    /// grammar (`cycle`'s optional `"group":` prefix) that needs to look
    /// two tokens ahead before deciding what it just saw. Only valid
    /// immediately after `advance()` emptied the slot.
    pub fn unread(&mut self, token: Token, position: Position) {
        debug_assert!(self.lookahead.is_none(), "unread: lookahead slot already occupied");
        self.lookahead = Some((token, position));
    }

    pub fn error(&self, kind: ParseErrorKind, position: Position, arguments: Vec<String>) -> ParseError {
        let err = ParseError::new(kind, position, arguments);
        match &self.file {
            Some(file) => err.with_file(file.clone()),
            None => err,
        }
    }

    fn enter(&mut self, position: Position) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > self.context.parser_options.max_parse_depth {
            return Err(self.error(ParseErrorKind::ParseDepthExceeded, position, vec![]));
        }
        Ok(())
    }

    fn exit(&mut self) {
        self.depth -= 1;
    }

    pub fn at_control_end(&mut self) -> Result<bool, ParseError> {
        Ok(matches!(self.peek()?, Token::EndControlBlock { .. }))
    }

    pub fn consume_if_comma(&mut self) -> Result<bool, ParseError> {
        if matches!(self.peek()?, Token::Comma) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn consume_if_colon(&mut self) -> Result<bool, ParseError> {
        if matches!(self.peek()?, Token::Colon) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn consume_identifier_if(&mut self, word: &str) -> Result<bool, ParseError> {
        if matches!(self.peek()?, Token::Identifier(name) if name == word) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn expect_identifier(&mut self) -> Result<(String, Position), ParseError> {
        let (token, position) = self.advance()?;
        match token {
            Token::Identifier(name) => Ok((name, position)),
            _ => Err(self.error(ParseErrorKind::InvalidSymbol, position, vec!["identifier".to_string()])),
        }
    }

    fn operator_symbol(token: &Token) -> Option<&str> {
        match token {
            Token::Symbol(s) => Some(s.as_str()),
            Token::Identifier(s) => Some(s.as_str()),
            _ => None,
        }
    }

    fn peek_binary_operator(&mut self) -> Result<Option<Rc<dyn NodeType>>, ParseError> {
        let token = self.peek()?.clone();
        match Self::operator_symbol(&token) {
            Some(symbol) => Ok(self.context.binary_operator(symbol).cloned()),
            None => Ok(None),
        }
    }

    /// Precedence-climbing equivalent of the source's tree-rotation shift
    /// (spec.md §4.2 "Operator precedence"): `min_priority` is bumped by
    /// one on the recursive call so equal-priority operators stay
    /// left-associative.
    pub fn parse_expression(&mut self, min_priority: u8) -> Result<Node, ParseError> {
        let position = self.peek_position()?;
        self.enter(position)?;
        let result = self.parse_expression_inner(min_priority);
        self.exit();
        result
    }

    fn parse_expression_inner(&mut self, min_priority: u8) -> Result<Node, ParseError> {
        let mut left = self.parse_unary()?;
        while let Some(op) = self.peek_binary_operator()? {
            if op.priority() < min_priority {
                break;
            }
            let (_, position) = self.advance()?;
            let right = self.parse_expression(op.priority() + 1)?;
            left = Node::internal(op, vec![left, right], position);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Node, ParseError> {
        let token = self.peek()?.clone();
        if let Some(symbol) = Self::operator_symbol(&token) {
            if let Some(op) = self.context.unary_operator(symbol).cloned() {
                let (_, position) = self.advance()?;
                let operand = self.parse_unary()?;
                return Ok(Node::internal(op, vec![operand], position));
            }
        }
        self.parse_operand()
    }

    fn parse_operand(&mut self) -> Result<Node, ParseError> {
        let base = self.parse_primary()?;
        let base = self.parse_deref_chain(base)?;
        self.parse_filter_chain(base)
    }

    fn parse_primary(&mut self) -> Result<Node, ParseError> {
        let (token, position) = self.advance()?;
        match token {
            Token::StringLit(s) => Ok(Node::quoted_leaf(Value::str(s), position)),
            Token::Integer(i) => Ok(Node::leaf(Value::Int(i), position)),
            Token::Floating(f) => Ok(Node::leaf(Value::Float(f), position)),
            Token::Identifier(name) => {
                if let Some(value) = self.context.literal(&name) {
                    Ok(Node::leaf(value.clone(), position))
                } else {
                    Ok(Node::internal(
                        self.context.structural.variable.clone(),
                        vec![Node::leaf(Value::str(name), position)],
                        position,
                    ))
                }
            }
            Token::OpenParen if self.context.parser_options.grouping_enabled => {
                let inner = self.parse_expression(0)?;
                self.expect_close_paren()?;
                Ok(Node::internal(self.context.structural.group.clone(), vec![inner], position))
            }
            Token::StartDeref if self.context.parser_options.array_literals_enabled => {
                let mut items = Vec::new();
                if !matches!(self.peek()?, Token::EndDeref) {
                    loop {
                        items.push(self.parse_expression(0)?);
                        if !self.consume_if_comma()? {
                            break;
                        }
                    }
                }
                self.expect_end_deref()?;
                Ok(Node::internal(self.context.structural.array_literal.clone(), items, position))
            }
            _ => Err(self.error(ParseErrorKind::UnexpectedOperand, position, vec![])),
        }
    }

    /// `.`/`[...]` dereference chain (spec.md §6 "dotted and bracketed
    /// dereference"); a `.name` that names a registered dot-filter wraps
    /// instead of appending (spec.md §3 "dot-filter").
    fn parse_deref_chain(&mut self, mut current: Node) -> Result<Node, ParseError> {
        loop {
            match self.peek()? {
                Token::Dot => {
                    let (_, position) = self.advance()?;
                    let (name, name_pos) = self.expect_identifier()?;
                    if let Some(dot_filter) = self.context.dot_filter(&name).cloned() {
                        current = Node::internal(dot_filter, vec![current], position);
                    } else {
                        current = self.append_segment(current, Node::leaf(Value::str(name), name_pos), position);
                    }
                }
                Token::StartDeref => {
                    let (_, position) = self.advance()?;
                    let key = self.parse_expression(0)?;
                    self.expect_end_deref()?;
                    current = self.append_segment(current, key, position);
                }
                _ => break,
            }
        }
        Ok(current)
    }

    fn append_segment(&self, current: Node, segment: Node, position: Position) -> Node {
        let is_variable = current
            .node_type()
            .map(|nt| std::ptr::eq(Rc::as_ptr(nt) as *const (), Rc::as_ptr(&self.context.structural.variable) as *const ()))
            .unwrap_or(false);
        if is_variable {
            let mut current = current;
            current.children_mut().push(segment);
            current
        } else {
            Node::internal(self.context.structural.group_dereference.clone(), vec![current, segment], position)
        }
    }

    /// Filter chain (spec.md §4.2 "Filters chain with `|`"). Unknown names
    /// become a warning-emitting placeholder unless `strictFilters` is set.
    fn parse_filter_chain(&mut self, mut current: Node) -> Result<Node, ParseError> {
        while matches!(self.peek()?, Token::Symbol(s) if s == "|") {
            let (_, position) = self.advance()?;
            let (name, name_pos) = self.expect_identifier()?;
            let arguments = self.parse_filter_arguments()?;
            let node_type: Rc<dyn NodeType> = match self.context.filter(&name) {
                Some(nt) => nt.clone(),
                None if self.context.parser_options.strict_filters => {
                    return Err(self.error(ParseErrorKind::UnknownFilter, name_pos, vec![name]));
                }
                None => Rc::new(UnknownFilter { name }),
            };
            current = Node::internal(node_type, vec![current, arguments], position);
        }
        Ok(current)
    }

    fn parse_filter_arguments(&mut self) -> Result<Node, ParseError> {
        let position = self.peek_position()?;
        let mut args = Vec::new();
        if self.consume_if_colon()? {
            loop {
                args.push(self.parse_expression(0)?);
                if !self.consume_if_comma()? {
                    break;
                }
            }
        }
        Ok(Node::internal(self.context.structural.arguments.clone(), args, position))
    }

    /// The default tag-argument grammar: a bare comma-separated expression
    /// list (spec.md §4.2), used by `if`/`unless`/`case`/`when`/`elsif`.
    pub fn parse_default_arguments(&mut self) -> Result<Node, ParseError> {
        let position = self.peek_position()?;
        let mut args = Vec::new();
        if !self.at_control_end()? {
            loop {
                args.push(self.parse_expression(0)?);
                if !self.consume_if_comma()? {
                    break;
                }
            }
        }
        Ok(Node::internal(self.context.structural.arguments.clone(), args, position))
    }

    pub fn arguments_node(&self, children: Vec<Node>, position: Position) -> Node {
        Node::internal(self.context.structural.arguments.clone(), children, position)
    }

    fn expect_close_paren(&mut self) -> Result<(), ParseError> {
        let (token, position) = self.advance()?;
        if matches!(token, Token::CloseParen) {
            Ok(())
        } else {
            Err(self.error(ParseErrorKind::UnbalancedGroup, position, vec![]))
        }
    }

    fn expect_end_deref(&mut self) -> Result<(), ParseError> {
        let (token, position) = self.advance()?;
        if matches!(token, Token::EndDeref) {
            Ok(())
        } else {
            Err(self.error(ParseErrorKind::InvalidSymbol, position, vec!["]".to_string()]))
        }
    }

    fn expect_end_output(&mut self) -> Result<(), ParseError> {
        let (token, position) = self.advance()?;
        if matches!(token, Token::EndOutputBlock { .. }) {
            Ok(())
        } else {
            Err(self.error(ParseErrorKind::UnexpectedEnd, position, vec![]))
        }
    }

    fn expect_end_control(&mut self) -> Result<(), ParseError> {
        let (token, position) = self.advance()?;
        if matches!(token, Token::EndControlBlock { .. }) {
            Ok(())
        } else {
            Err(self.error(ParseErrorKind::UnexpectedEnd, position, vec![]))
        }
    }

    /// Skip tokens up to and including the next block end, the suppression
    /// recovery spec.md §4.2 describes ("ignore-until-block-end").
    fn recover_to_block_end(&mut self) {
        loop {
            match self.advance() {
                Ok((Token::EndControlBlock { .. } | Token::EndOutputBlock { .. } | Token::Eof, _)) => return,
                Ok(_) => continue,
                Err(_) => return,
            }
        }
    }

    fn concat(&self, children: Vec<Node>, position: Position) -> Node {
        Node::internal(self.context.structural.concatenation.clone(), children, position)
    }

    /// Parses literal text, `{{ }}` output, and control tags until a
    /// terminator tag name in `terminators` is found (or EOF, valid only
    /// when `terminators` is empty — i.e. at the document's top level).
    /// Returns the built concatenation and which terminator matched.
    fn parse_body(&mut self, terminators: &[&str]) -> Result<(Node, String), ParseError> {
        let start_position = self.peek_position()?;
        let mut children = Vec::new();
        loop {
            let (token, position) = self.advance()?;
            match token {
                Token::Eof => {
                    if terminators.is_empty() {
                        return Ok((self.concat(children, start_position), String::new()));
                    }
                    return Err(self.error(ParseErrorKind::UnexpectedEnd, position, vec![]));
                }
                Token::Literal(text) => children.push(Node::leaf(Value::str(text), position)),
                Token::StartOutputBlock { .. } => {
                    let expr = match self.parse_expression(0) {
                        Ok(expr) => expr,
                        Err(err) => {
                            self.errors.push(err);
                            self.recover_to_block_end();
                            continue;
                        }
                    };
                    self.expect_end_output()?;
                    children.push(Node::internal(self.context.structural.output.clone(), vec![expr], position));
                }
                Token::StartControlBlock { .. } => {
                    let (name, name_pos) = match self.peek()? {
                        Token::Identifier(_) => self.expect_identifier()?,
                        _ => {
                            let err = self.error(ParseErrorKind::InvalidSymbol, position, vec![]);
                            self.errors.push(err);
                            self.recover_to_block_end();
                            continue;
                        }
                    };
                    if terminators.contains(&name.as_str()) {
                        return Ok((self.concat(children, start_position), name));
                    }
                    match self.parse_tag(name, name_pos) {
                        Ok(node) => children.push(node),
                        Err(err) => {
                            self.errors.push(err);
                            self.recover_to_block_end();
                        }
                    }
                }
                _ => unreachable!("block-internal tokens only surface inside parse_expression"),
            }
        }
    }

    /// Parses one tag invocation fully: its own argument list, every
    /// intermediate-delimited body, and the closing `end<tag>` (spec.md
    /// §4.2 "Tags").
    fn parse_tag(&mut self, name: String, position: Position) -> Result<Node, ParseError> {
        if name == "liquid" {
            return self.parse_liquid_tag(position);
        }
        let node_type = match self.context.tag(&name) {
            Some(nt) => nt.clone(),
            None => {
                self.recover_to_block_end();
                return Err(self.error(ParseErrorKind::UnknownTag, position, vec![name]));
            }
        };
        if name == "raw" {
            let args = node_type.parse_arguments(self)?;
            self.expect_end_control()?;
            let body = self.consume_raw_body()?;
            let (start_token, start_pos) = self.advance()?;
            if !matches!(start_token, Token::StartControlBlock { .. }) {
                return Err(self.error(ParseErrorKind::UnexpectedEnd, start_pos, vec!["raw".to_string()]));
            }
            self.expect_identifier()?; // "endraw"
            self.expect_end_control()?;
            return Ok(Node::internal(node_type, vec![args, body], position));
        }
        let args = node_type.parse_arguments(self)?;
        self.expect_end_control()?;
        if !node_type.is_block() {
            return Ok(Node::internal(node_type, vec![args], position));
        }

        let end_name = format!("end{}", name);
        let intermediates = node_type.intermediates();
        let mut terminators: Vec<&str> = intermediates.to_vec();
        terminators.push(end_name.as_str());

        let mut children = vec![args];
        loop {
            let (body, which) = self.parse_body(&terminators)?;
            children.push(body);
            if which == end_name {
                break;
            }
            let marker_pos = self.peek_position()?;
            // An intermediate has its own grammar (`elsif` parses an
            // expression, `else`/`break`/`continue` parse nothing), distinct
            // from the tag that opened the body — look it up by name rather
            // than reusing `node_type`.
            let marker_type = self
                .context
                .tag(&which)
                .cloned()
                .unwrap_or_else(|| node_type.clone());
            let marker_args = marker_type.parse_arguments(self)?;
            self.expect_end_control()?;
            children.push(Node::leaf(Value::str(which), marker_pos));
            children.push(marker_args);
        }
        Ok(Node::internal(node_type, children, position))
    }

    /// `{% liquid %}` line mode (SPEC_FULL.md §3): each newline-terminated
    /// statement is parsed as its own tag, sharing one trailing `%}`.
    fn parse_liquid_tag(&mut self, position: Position) -> Result<Node, ParseError> {
        self.lexer.liquid_line = true;
        let mut children = Vec::new();
        loop {
            match self.peek()? {
                Token::EndControlBlock { .. } => {
                    self.advance()?;
                    break;
                }
                Token::Identifier(_) => {
                    let (name, name_pos) = self.expect_identifier()?;
                    let node = self.parse_tag(name, name_pos)?;
                    children.push(node);
                }
                _ => {
                    let (_, bad_pos) = self.advance()?;
                    return Err(self.error(ParseErrorKind::InvalidSymbol, bad_pos, vec![]));
                }
            }
        }
        self.lexer.liquid_line = false;
        Ok(self.concat(children, position))
    }

    /// `{% raw %}…{% endraw %}` (spec.md §4.1 "Raw"): the body is captured
    /// verbatim by the lexer; this tag's `parse_arguments` override (in
    /// `dialect::tags`) calls back into here once it sees the opening
    /// `%}`.
    pub fn consume_raw_body(&mut self) -> Result<Node, ParseError> {
        let (text, position) = self.lexer.scan_raw()?;
        Ok(Node::leaf(Value::str(text), position))
    }

    /// `parseTemplate(text, file)` (spec.md §4.2).
    pub fn parse_template(mut self) -> (Node, Vec<ParseError>) {
        match self.parse_body(&[]) {
            Ok((node, _)) => (node, self.errors),
            Err(fatal) => {
                self.errors.push(fatal);
                (self.concat(Vec::new(), Position::new(1, 1)), self.errors)
            }
        }
    }

    /// `parseArgument(text)`: a single expression, as if inside `{{ }}`.
    pub fn parse_argument(mut self) -> Result<Node, ParseError> {
        self.lexer.enter_argument_mode();
        let expr = self.parse_expression(0)?;
        match self.peek()? {
            Token::Eof => Ok(expr),
            _ => {
                let position = self.peek_position()?;
                Err(self.error(ParseErrorKind::InvalidSymbol, position, vec![]))
            }
        }
    }
}

/// `parseAppropriate(text)` (spec.md §4.2): sniffs the whole buffer for a
/// `{{`/`{%` delimiter anywhere, not just a leading one — the same scan
/// `original_source/src/parser.cpp`'s `parseAppropriate` runs — and routes
/// to `parse_template` (mixed literal text and blocks) when found, or
/// `parse_argument` (a bare expression, no literal text) when not.
pub fn parse_appropriate<'c, 'x>(source: &'c str, context: &'x Context) -> Result<Node, ParseError> {
    let bytes = source.as_bytes();
    let has_braces = bytes.windows(2).any(|w| w == b"{{" || w == b"{%");
    if has_braces {
        let (node, mut errors) = Parser::new(source, context).parse_template();
        match errors.pop() {
            Some(err) if node.children().is_empty() => Err(err),
            _ => Ok(node),
        }
    } else {
        Parser::new(source, context).parse_argument()
    }
}
