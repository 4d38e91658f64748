//! The tree-walking renderer (spec.md §4.3): pre-order traversal driven by
//! each node's own `render`, with shared state for control flow, resource
//! limits, strictness, and the "drop" scopes tags like `for` install for
//! `forloop`.
use crate::context::Context;
use crate::error::{RenderError, RenderErrorKind, Warning};
use crate::node::Node;
use crate::value::{Falsiness, Value, VariableResolver};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Instant;

/// The renderer's cooperative control state (spec.md §4.3 "Control
/// signals"); loop/tag bodies check and reset it after every child render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    None,
    Break,
    Continue,
    Exit,
}

/// A scoped name→value override a tag installs for its body, such as
/// `forloop` inside `{% for %}` (spec.md §4.3 "Internal drops").
#[derive(Debug, Default)]
pub struct DropScope {
    vars: HashMap<String, Value>,
}

impl DropScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: impl Into<String>, value: Value) -> Self {
        self.vars.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }
}

/// Per-render mutable state threaded through every `NodeType::render` call.
pub struct RenderCtx<'a> {
    pub context: &'a Context,
    resolver: &'a mut dyn VariableResolver,
    pub control: ControlSignal,
    depth: usize,
    start: Instant,
    memory_used: i64,
    pub warnings: Vec<Warning>,
    drops: Vec<DropScope>,
    counters: HashMap<String, i64>,
    cycles: HashMap<String, usize>,
    sink: Box<dyn FnMut(&str) + 'a>,
}

impl<'a> RenderCtx<'a> {
    pub fn new(
        context: &'a Context,
        resolver: &'a mut dyn VariableResolver,
        sink: Box<dyn FnMut(&str) + 'a>,
    ) -> Self {
        Self {
            context,
            resolver,
            control: ControlSignal::None,
            depth: 0,
            start: Instant::now(),
            memory_used: 0,
            warnings: Vec::new(),
            drops: Vec::new(),
            counters: HashMap::new(),
            cycles: HashMap::new(),
            sink,
        }
    }

    /// An ephemeral context used by the optimizer to fold an expression via
    /// real evaluation (spec.md §4.4 "Folding is implemented by invoking the
    /// node's render"); any text it emits is discarded.
    pub fn scratch(context: &'a Context, resolver: &'a mut dyn VariableResolver) -> Self {
        Self::new(context, resolver, Box::new(|_: &str| {}))
    }

    pub fn emit(&mut self, text: &str) {
        (self.sink)(text);
    }

    pub fn falsiness(&self) -> Falsiness {
        self.context.render_options.falsiness
    }

    pub fn enter(&mut self) -> Result<(), RenderError> {
        self.depth += 1;
        if self.depth > self.context.render_options.max_rendering_depth {
            return Err(RenderError::new(
                RenderErrorKind::ExceededDepth,
                format!("rendering depth exceeded {}", self.context.render_options.max_rendering_depth),
            ));
        }
        Ok(())
    }

    pub fn exit(&mut self) {
        self.depth -= 1;
    }

    /// Checked between concatenation steps and loop iterations (spec.md
    /// §5 "Cancellation & timeouts").
    pub fn check_limits(&mut self) -> Result<(), RenderError> {
        if self.start.elapsed() > self.context.render_options.max_rendering_time {
            return Err(RenderError::new(
                RenderErrorKind::ExceededTime,
                "maximum rendering time exceeded",
            ));
        }
        if self.memory_used > self.context.render_options.max_memory_usage as i64 {
            return Err(RenderError::new(
                RenderErrorKind::ExceededMemory,
                "maximum memory usage exceeded",
            ));
        }
        Ok(())
    }

    pub fn track_memory(&mut self, delta: i64) {
        self.memory_used += delta;
        self.resolver.memory_hint(delta);
    }

    pub fn push_drop(&mut self, scope: DropScope) {
        self.drops.push(scope);
    }

    pub fn pop_drop(&mut self) {
        self.drops.pop();
    }

    pub fn drop_lookup(&self, name: &str) -> Option<&Value> {
        self.drops.iter().rev().find_map(|scope| scope.get(name))
    }

    pub fn resolve_root(&mut self, name: &str) -> Result<Value, RenderError> {
        if let Some(value) = self.drop_lookup(name) {
            return Ok(value.clone());
        }
        match self.resolver.get_root(name) {
            Some(value) => Ok(value),
            None if self.context.render_options.strict_variables => Err(RenderError::new(
                RenderErrorKind::UnknownVariable,
                format!("unknown variable '{}'", name),
            )),
            None => Ok(Value::Nil),
        }
    }

    pub fn resolver(&self) -> &dyn VariableResolver {
        self.resolver
    }

    pub fn resolver_mut(&mut self) -> &mut dyn VariableResolver {
        self.resolver
    }

    pub fn warn(&mut self, position: crate::position::Position, message: impl Into<String>) {
        self.warnings.push(Warning {
            position,
            message: message.into(),
        });
    }

    /// `increment`/`decrement`'s shared per-template counter namespace
    /// (SPEC_FULL.md §3): independent of the user's variable store. Returns
    /// the value *before* applying `delta`.
    pub fn bump_counter(&mut self, name: &str, delta: i64) -> i64 {
        let counter = self.counters.entry(name.to_string()).or_insert(0);
        let prev = *counter;
        *counter += delta;
        prev
    }

    /// `{% cycle %}`'s per-group rotating index (SPEC_FULL.md §3).
    pub fn cycle_index(&mut self, key: &str, len: usize) -> usize {
        let counter = self.cycles.entry(key.to_string()).or_insert(0);
        let index = *counter % len.max(1);
        *counter += 1;
        index
    }

    /// Renders `body` with its output redirected into an owned string
    /// instead of the active sink (spec.md §4.5 "`capture` uses
    /// `PUSHBUFFER … POPBUFFER`" — the tree-walking equivalent).
    pub fn capture(&mut self, body: &Node) -> Result<String, RenderError> {
        let buffer = Rc::new(RefCell::new(String::new()));
        let sink_buffer = buffer.clone();
        let original = std::mem::replace(
            &mut self.sink,
            Box::new(move |chunk: &str| sink_buffer.borrow_mut().push_str(chunk)),
        );
        let result = body.render(self);
        self.sink = original;
        result?;
        Ok(Rc::try_unwrap(buffer).expect("capture sink dropped by render end").into_inner())
    }
}

/// Binds a [`Context`] to render entry points (spec.md §6 "Create Renderer
/// bound to a Context").
pub struct Renderer {
    context: std::rc::Rc<Context>,
}

impl Renderer {
    pub fn new(context: std::rc::Rc<Context>) -> Self {
        Self { context }
    }

    /// Render to a single owned string (spec.md §4.3 "buffered variants").
    pub fn render(
        &self,
        root: &Node,
        resolver: &mut dyn VariableResolver,
    ) -> Result<(String, Vec<Warning>), RenderError> {
        let mut buffer = String::new();
        let warnings = {
            let mut ctx = RenderCtx::new(
                &self.context,
                resolver,
                Box::new(|chunk: &str| buffer.push_str(chunk)),
            );
            root.render(&mut ctx)?;
            ctx.warnings
        };
        Ok((buffer, warnings))
    }

    /// Stream chunks to a caller-provided sink as they are produced
    /// (spec.md §4.3 "Output").
    pub fn render_streaming<'s>(
        &self,
        root: &Node,
        resolver: &mut dyn VariableResolver,
        sink: &'s mut dyn FnMut(&str),
    ) -> Result<Vec<Warning>, RenderError> {
        let mut ctx = RenderCtx::new(&self.context, resolver, Box::new(move |chunk: &str| sink(chunk)));
        root.render(&mut ctx)?;
        Ok(ctx.warnings)
    }
}
