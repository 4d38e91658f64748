//! The immutable dialect registry (spec.md §3 "Context"): global tables for
//! tags, operators, filters, dot-filters and literals, plus the singleton
//! structural node types every parse shares by identity, and the engine's
//! parser/render configuration.
use crate::error::ImplementationError;
use crate::field_tree::FieldTree;
use crate::node::NodeType;
use crate::value::{Falsiness, Value};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

/// Parser-facing knobs (spec.md §4.2).
#[derive(Debug, Clone)]
pub struct ParserOptions {
    pub array_literals_enabled: bool,
    pub grouping_enabled: bool,
    pub strict_filters: bool,
    pub max_parse_depth: usize,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            array_literals_enabled: true,
            grouping_enabled: true,
            strict_filters: false,
            max_parse_depth: 200,
        }
    }
}

/// Renderer-facing knobs (spec.md §4.3 "Resource limits" / "Strictness").
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub strict_variables: bool,
    pub falsiness: Falsiness,
    pub max_rendering_depth: usize,
    pub max_memory_usage: usize,
    pub max_rendering_time: Duration,
    /// Upper bound on the element count of an integer `(a..b)` range
    /// literal; larger ranges evaluate to `Value::Nil` (spec.md §8).
    pub max_range_size: i64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            strict_variables: false,
            falsiness: Falsiness::default(),
            max_rendering_depth: 100,
            max_memory_usage: 64 * 1024 * 1024,
            max_rendering_time: Duration::from_secs(10),
            max_range_size: 1000,
        }
    }
}

/// The singleton structural node types every parse addresses by identity
/// (spec.md §3 "Context... Holds singleton instances of the structural node
/// types").
pub struct Structural {
    pub concatenation: Rc<dyn NodeType>,
    pub arguments: Rc<dyn NodeType>,
    pub output: Rc<dyn NodeType>,
    pub variable: Rc<dyn NodeType>,
    pub group: Rc<dyn NodeType>,
    pub group_dereference: Rc<dyn NodeType>,
    pub array_literal: Rc<dyn NodeType>,
}

pub struct Context {
    tags: HashMap<String, Rc<dyn NodeType>>,
    unary_operators: HashMap<String, Rc<dyn NodeType>>,
    binary_operators: HashMap<String, Rc<dyn NodeType>>,
    filters: HashMap<String, Rc<dyn NodeType>>,
    dot_filters: HashMap<String, Rc<dyn NodeType>>,
    literals: HashMap<String, Value>,
    sigils: FieldTree,
    pub structural: Structural,
    pub parser_options: ParserOptions,
    pub render_options: RenderOptions,
}

/// The fixed sigil set every Context registers regardless of dialect: the
/// punctuation the lexer must recognize to drive the parser's pushdown
/// machine at all (spec.md §6 "Identifiers... dotted and bracketed
/// dereference").
const BASE_SIGILS: &[&str] = &[
    ".", "..", ",", ":", "(", ")", "[", "]", "|", "=", "{{", "}}", "{%", "%}", "{{-", "-}}",
    "{%-", "-%}",
];

impl Context {
    pub fn new(structural: Structural) -> Self {
        let mut sigils = FieldTree::new();
        for s in BASE_SIGILS {
            sigils.insert(s);
        }
        let mut literals = HashMap::new();
        literals.insert("true".to_string(), Value::Bool(true));
        literals.insert("false".to_string(), Value::Bool(false));
        literals.insert("nil".to_string(), Value::Nil);
        literals.insert("null".to_string(), Value::Nil);
        literals.insert("empty".to_string(), Value::str(""));
        literals.insert("blank".to_string(), Value::str(""));

        Self {
            tags: HashMap::new(),
            unary_operators: HashMap::new(),
            binary_operators: HashMap::new(),
            filters: HashMap::new(),
            dot_filters: HashMap::new(),
            literals,
            sigils,
            structural,
            parser_options: ParserOptions::default(),
            render_options: RenderOptions::default(),
        }
    }

    pub fn register_tag(&mut self, node_type: Rc<dyn NodeType>) -> Result<(), ImplementationError> {
        let symbol = node_type.symbol().to_string();
        if self.tags.insert(symbol.clone(), node_type).is_some() {
            return Err(ImplementationError::new(
                "register_tag",
                format!("tag '{}' is already registered", symbol),
            ));
        }
        Ok(())
    }

    pub fn register_unary_operator(
        &mut self,
        node_type: Rc<dyn NodeType>,
    ) -> Result<(), ImplementationError> {
        let symbol = node_type.symbol().to_string();
        self.sigils.insert(&symbol);
        self.unary_operators.insert(symbol, node_type);
        Ok(())
    }

    pub fn register_binary_operator(
        &mut self,
        node_type: Rc<dyn NodeType>,
    ) -> Result<(), ImplementationError> {
        let symbol = node_type.symbol().to_string();
        self.sigils.insert(&symbol);
        self.binary_operators.insert(symbol, node_type);
        Ok(())
    }

    pub fn register_filter(&mut self, node_type: Rc<dyn NodeType>) -> Result<(), ImplementationError> {
        let symbol = node_type.symbol().to_string();
        self.filters.insert(symbol, node_type);
        Ok(())
    }

    pub fn register_dot_filter(
        &mut self,
        node_type: Rc<dyn NodeType>,
    ) -> Result<(), ImplementationError> {
        let symbol = node_type.symbol().to_string();
        self.dot_filters.insert(symbol, node_type);
        Ok(())
    }

    pub fn register_literal(&mut self, name: impl Into<String>, value: Value) {
        self.literals.insert(name.into(), value);
    }

    pub fn tag(&self, symbol: &str) -> Option<&Rc<dyn NodeType>> {
        self.tags.get(symbol)
    }
    pub fn unary_operator(&self, symbol: &str) -> Option<&Rc<dyn NodeType>> {
        self.unary_operators.get(symbol)
    }
    pub fn binary_operator(&self, symbol: &str) -> Option<&Rc<dyn NodeType>> {
        self.binary_operators.get(symbol)
    }
    pub fn filter(&self, symbol: &str) -> Option<&Rc<dyn NodeType>> {
        self.filters.get(symbol)
    }
    pub fn dot_filter(&self, symbol: &str) -> Option<&Rc<dyn NodeType>> {
        self.dot_filters.get(symbol)
    }
    pub fn literal(&self, name: &str) -> Option<&Value> {
        self.literals.get(name)
    }

    pub fn is_tag(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    /// The longest registered sigil that prefixes `input`, or `1` (a single
    /// byte) when nothing matches — the lexer's fallback to a
    /// single-character sigil (spec.md §4.1 "Everything else is a
    /// single-character sigil").
    pub fn match_sigil(&self, input: &[u8]) -> usize {
        match self.sigils.longest_match(input) {
            0 => 1,
            n => n,
        }
    }
}
