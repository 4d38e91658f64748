//! The standard dialect (spec.md §6): the structural node types every
//! `Context` needs regardless of dialect, plus the tags/operators/filters a
//! host registers to get full Liquid-compatible behavior. A host that wants
//! a restricted or extended dialect builds its own `Context` from
//! `structural`'s singletons and a subset (or superset) of these
//! registrations instead of calling [`standard_context`].
pub mod filters;
pub mod operators;
pub mod structural;
pub mod tags;

use crate::context::{Context, Structural};
use crate::error::ImplementationError;
use crate::value::Value;
use std::rc::Rc;

/// Re-render a leaf's [`Value`] in source form (spec.md §4.2 "Unparse").
///
/// Used for plain template text and every non-string-literal leaf
/// (numbers, booleans, `nil`, array literals); a quoted string-literal leaf
/// goes through [`unparse_quoted_string`] instead, selected by
/// `Node::Leaf`'s `quoted` flag (`parser.rs`'s `parse_primary` sets it only
/// for a `Token::StringLit`).
pub fn unparse_literal(value: &Value, out: &mut String) {
    match value {
        Value::Nil => out.push_str("nil"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Int(i) => out.push_str(&i.to_string()),
        Value::Float(f) => out.push_str(&f.to_string()),
        Value::Str(s) => out.push_str(s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                unparse_literal(item, out);
            }
            out.push(']');
        }
        // Never produced by the parser as a leaf; only here so the match is
        // exhaustive.
        Value::Map(_) => {}
    }
}

/// Re-render a `Token::StringLit` leaf wrapped in `"..."`, `\`-escaping any
/// embedded `"` or `\` so `lexer.rs`'s `scan_string` reads it back as the
/// same string (spec.md §8's round-trip law). Non-string leaves can't
/// actually occur here — `parser.rs` only ever marks a `Value::Str` leaf as
/// quoted — but fall back to [`unparse_literal`] rather than panic.
pub fn unparse_quoted_string(value: &Value, out: &mut String) {
    let s = match value {
        Value::Str(s) => s,
        other => return unparse_literal(other, out),
    };
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            _ => out.push(ch),
        }
    }
    out.push('"');
}

fn structural_singletons() -> Structural {
    Structural {
        concatenation: Rc::new(structural::Concatenation),
        arguments: Rc::new(structural::Arguments),
        output: Rc::new(structural::Output),
        variable: Rc::new(structural::Variable),
        group: Rc::new(structural::Group),
        group_dereference: Rc::new(structural::GroupDereference),
        array_literal: Rc::new(structural::ArrayLiteral),
    }
}

/// Builds a fresh [`Context`] with the structural node types and the full
/// standard dialect registered (spec.md §6 "Create a Context... register
/// the standard dialect's tags, operators and filters").
pub fn standard_context() -> Result<Context, ImplementationError> {
    let mut context = Context::new(structural_singletons());
    register_tags(&mut context)?;
    register_operators(&mut context)?;
    register_filters(&mut context)?;
    Ok(context)
}

fn register_tags(context: &mut Context) -> Result<(), ImplementationError> {
    context.register_tag(Rc::new(tags::If))?;
    context.register_tag(Rc::new(tags::Unless))?;
    context.register_tag(Rc::new(tags::Case))?;
    context.register_tag(Rc::new(tags::When))?;
    context.register_tag(Rc::new(tags::Elsif))?;
    context.register_tag(Rc::new(tags::Else))?;
    context.register_tag(Rc::new(tags::For))?;
    context.register_tag(Rc::new(tags::Break))?;
    context.register_tag(Rc::new(tags::Continue))?;
    context.register_tag(Rc::new(tags::Assign))?;
    context.register_tag(Rc::new(tags::Capture))?;
    context.register_tag(Rc::new(tags::Increment))?;
    context.register_tag(Rc::new(tags::Decrement))?;
    context.register_tag(Rc::new(tags::Raw))?;
    context.register_tag(Rc::new(tags::Echo))?;
    context.register_tag(Rc::new(tags::Cycle))?;
    Ok(())
}

fn register_operators(context: &mut Context) -> Result<(), ImplementationError> {
    context.register_binary_operator(Rc::new(operators::Plus))?;
    context.register_binary_operator(Rc::new(operators::Minus))?;
    context.register_binary_operator(Rc::new(operators::Times))?;
    context.register_binary_operator(Rc::new(operators::DividedBy))?;
    context.register_binary_operator(Rc::new(operators::Modulo))?;
    context.register_binary_operator(Rc::new(operators::Equal))?;
    context.register_binary_operator(Rc::new(operators::NotEqual))?;
    context.register_binary_operator(Rc::new(operators::LessThan))?;
    context.register_binary_operator(Rc::new(operators::LessEqual))?;
    context.register_binary_operator(Rc::new(operators::GreaterThan))?;
    context.register_binary_operator(Rc::new(operators::GreaterEqual))?;
    context.register_binary_operator(Rc::new(operators::And))?;
    context.register_binary_operator(Rc::new(operators::Or))?;
    context.register_binary_operator(Rc::new(operators::Range))?;
    context.register_unary_operator(Rc::new(operators::Not))?;
    Ok(())
}

fn register_filters(context: &mut Context) -> Result<(), ImplementationError> {
    context.register_filter(Rc::new(filters::Plus))?;
    context.register_filter(Rc::new(filters::MinusFilter))?;
    context.register_filter(Rc::new(filters::Times))?;
    context.register_filter(Rc::new(filters::DividedByFilter))?;
    context.register_filter(Rc::new(filters::ModuloFilter))?;
    context.register_filter(Rc::new(filters::Abs))?;
    context.register_filter(Rc::new(filters::Ceil))?;
    context.register_filter(Rc::new(filters::Floor))?;
    context.register_filter(Rc::new(filters::Round))?;
    context.register_filter(Rc::new(filters::AtMost))?;
    context.register_filter(Rc::new(filters::AtLeast))?;
    context.register_filter(Rc::new(filters::Append))?;
    context.register_filter(Rc::new(filters::Prepend))?;
    context.register_filter(Rc::new(filters::Capitalize))?;
    context.register_filter(Rc::new(filters::Downcase))?;
    context.register_filter(Rc::new(filters::Upcase))?;
    context.register_filter(Rc::new(filters::Strip))?;
    context.register_filter(Rc::new(filters::LStrip))?;
    context.register_filter(Rc::new(filters::RStrip))?;
    context.register_filter(Rc::new(filters::StripNewlines))?;
    context.register_filter(Rc::new(filters::NewlineToBr))?;
    context.register_filter(Rc::new(filters::Remove))?;
    context.register_filter(Rc::new(filters::RemoveFirst))?;
    context.register_filter(Rc::new(filters::Replace))?;
    context.register_filter(Rc::new(filters::ReplaceFirst))?;
    context.register_filter(Rc::new(filters::Split))?;
    context.register_filter(Rc::new(filters::Truncate))?;
    context.register_filter(Rc::new(filters::Truncatewords))?;
    context.register_filter(Rc::new(filters::SizeFilter))?;
    context.register_dot_filter(Rc::new(filters::SizeDot))?;
    context.register_filter(Rc::new(filters::Slice))?;
    context.register_filter(Rc::new(filters::DefaultFilter))?;
    context.register_filter(Rc::new(filters::Join))?;
    context.register_filter(Rc::new(filters::First))?;
    context.register_filter(Rc::new(filters::Last))?;
    context.register_filter(Rc::new(filters::Reverse))?;
    context.register_filter(Rc::new(filters::Sort))?;
    context.register_filter(Rc::new(filters::SortNatural))?;
    context.register_filter(Rc::new(filters::Uniq))?;
    context.register_filter(Rc::new(filters::Compact))?;
    context.register_filter(Rc::new(filters::MapFilter))?;
    context.register_filter(Rc::new(filters::Where))?;
    context.register_filter(Rc::new(filters::Concat))?;
    Ok(())
}
