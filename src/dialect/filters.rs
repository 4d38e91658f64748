//! The standard dialect's filters and dot-filters (spec.md §6 "Filters").
//! A pipe filter's node children are `[subject, arguments]` (`arguments`
//! being an `Arguments` node, possibly empty); a dot-filter's single child
//! is just `[subject]` (spec.md §3 "dot-filter", `parser.rs::parse_deref_chain`).
use crate::compile::Compiler;
use crate::error::RenderError;
use crate::node::{Node, NodeKind, NodeType};
use crate::render::RenderCtx;
use crate::value::Value;
use std::rc::Rc;

fn render_filter(node: &Node, ctx: &mut RenderCtx, node_type: &dyn NodeType) -> Result<Value, RenderError> {
    let children = node.children();
    let mut args = Vec::with_capacity(children.len());
    args.push(children[0].render(ctx)?);
    if let Some(arguments) = children.get(1) {
        for expr in arguments.children() {
            args.push(expr.render(ctx)?);
        }
    }
    node_type.call(&args)
}

fn compile_filter(node: &Node, compiler: &mut Compiler, node_type: Rc<dyn NodeType>) -> Result<(), crate::error::CompileError> {
    let children = node.children();
    compiler.compile_pushed(&children[0])?;
    let mut count = 1;
    if let Some(arguments) = children.get(1) {
        for expr in arguments.children() {
            compiler.compile_pushed(expr)?;
            count += 1;
        }
    }
    compiler.emit_call(node_type, count);
    Ok(())
}

fn unparse_filter(symbol: &str, node: &Node, out: &mut String) {
    node.children()[0].unparse_into(out);
    out.push_str(" | ");
    out.push_str(symbol);
    if let Some(arguments) = node.children().get(1) {
        if !arguments.children().is_empty() {
            out.push_str(": ");
            arguments.unparse_into(out);
        }
    }
}

macro_rules! filter {
    ($name:ident, $symbol:literal, $call:expr) => {
        #[derive(Debug, Default)]
        pub struct $name;
        impl NodeType for $name {
            fn symbol(&self) -> &str {
                $symbol
            }
            fn kind(&self) -> NodeKind {
                NodeKind::Filter
            }
            fn render(&self, node: &Node, ctx: &mut RenderCtx) -> Result<Value, RenderError> {
                render_filter(node, ctx, self)
            }
            fn compile(&self, node: &Node, compiler: &mut Compiler) -> Result<(), crate::error::CompileError> {
                compile_filter(node, compiler, Rc::new($name))
            }
            fn call(&self, args: &[Value]) -> Result<Value, RenderError> {
                $call(args)
            }
            fn unparse(&self, node: &Node, out: &mut String) {
                unparse_filter($symbol, node, out)
            }
        }
    };
}

/// Like the operators' `numeric` helper: non-numeric operands fall back to
/// `nil` rather than erroring, the same forgiving rule `dialect/operators.rs`
/// uses for `+`/`-`/`*`/`/`/`%`.
fn numeric_args(args: &[Value]) -> Option<(f64, f64, bool)> {
    let a = args.first()?.as_f64()?;
    let b = args.get(1)?.as_f64()?;
    let is_int = matches!((&args[0], &args[1]), (Value::Int(_), Value::Int(_)));
    Some((a, b, is_int))
}

fn pack_numeric(result: f64, is_int: bool) -> Value {
    if is_int {
        Value::Int(result as i64)
    } else {
        Value::Float(result)
    }
}

filter!(Plus, "plus", |args: &[Value]| {
    Ok(match numeric_args(args) {
        Some((a, b, is_int)) => pack_numeric(a + b, is_int),
        None => Value::Nil,
    })
});
filter!(MinusFilter, "minus", |args: &[Value]| {
    Ok(match numeric_args(args) {
        Some((a, b, is_int)) => pack_numeric(a - b, is_int),
        None => Value::Nil,
    })
});
filter!(Times, "times", |args: &[Value]| {
    Ok(match numeric_args(args) {
        Some((a, b, is_int)) => pack_numeric(a * b, is_int),
        None => Value::Nil,
    })
});
filter!(DividedByFilter, "divided_by", |args: &[Value]| {
    Ok(match numeric_args(args) {
        Some((a, b, true)) => Value::Int(a as i64 / b as i64),
        Some((a, b, false)) => Value::Float(a / b),
        None => Value::Nil,
    })
});
filter!(ModuloFilter, "modulo", |args: &[Value]| {
    Ok(match numeric_args(args) {
        Some((a, b, is_int)) => pack_numeric(a % b, is_int),
        None => Value::Nil,
    })
});
filter!(Abs, "abs", |args: &[Value]| Ok(match args.first().and_then(Value::as_f64) {
    Some(v) => match args.first() {
        Some(Value::Int(_)) => Value::Int(v.abs() as i64),
        _ => Value::Float(v.abs()),
    },
    None => Value::Nil,
}));
filter!(Ceil, "ceil", |args: &[Value]| Ok(match args.first().and_then(Value::as_f64) {
    Some(v) => Value::Int(v.ceil() as i64),
    None => Value::Nil,
}));
filter!(Floor, "floor", |args: &[Value]| Ok(match args.first().and_then(Value::as_f64) {
    Some(v) => Value::Int(v.floor() as i64),
    None => Value::Nil,
}));
filter!(Round, "round", |args: &[Value]| Ok(match args.first().and_then(Value::as_f64) {
    Some(v) => {
        let digits = args.get(1).and_then(Value::as_i64).unwrap_or(0).max(0) as i32;
        let factor = 10f64.powi(digits);
        let rounded = (v * factor).round() / factor;
        if digits == 0 {
            Value::Int(rounded as i64)
        } else {
            Value::Float(rounded)
        }
    }
    None => Value::Nil,
}));
filter!(AtMost, "at_most", |args: &[Value]| {
    Ok(match numeric_args(args) {
        Some((a, b, is_int)) => pack_numeric(a.min(b), is_int),
        None => Value::Nil,
    })
});
filter!(AtLeast, "at_least", |args: &[Value]| {
    Ok(match numeric_args(args) {
        Some((a, b, is_int)) => pack_numeric(a.max(b), is_int),
        None => Value::Nil,
    })
});

fn as_text(value: &Value) -> String {
    value.to_string()
}

filter!(Append, "append", |args: &[Value]| {
    Ok(Value::str(format!("{}{}", as_text(&args[0]), as_text(args.get(1).unwrap_or(&Value::Nil)))))
});
filter!(Prepend, "prepend", |args: &[Value]| {
    Ok(Value::str(format!("{}{}", as_text(args.get(1).unwrap_or(&Value::Nil)), as_text(&args[0]))))
});
filter!(Capitalize, "capitalize", |args: &[Value]| {
    let s = as_text(&args[0]);
    let mut chars = s.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    };
    Ok(Value::str(capitalized))
});
filter!(Downcase, "downcase", |args: &[Value]| Ok(Value::str(as_text(&args[0]).to_lowercase())));
filter!(Upcase, "upcase", |args: &[Value]| Ok(Value::str(as_text(&args[0]).to_uppercase())));
filter!(Strip, "strip", |args: &[Value]| Ok(Value::str(as_text(&args[0]).trim().to_string())));
filter!(LStrip, "lstrip", |args: &[Value]| Ok(Value::str(as_text(&args[0]).trim_start().to_string())));
filter!(RStrip, "rstrip", |args: &[Value]| Ok(Value::str(as_text(&args[0]).trim_end().to_string())));
filter!(StripNewlines, "strip_newlines", |args: &[Value]| {
    Ok(Value::str(as_text(&args[0]).chars().filter(|c| *c != '\n' && *c != '\r').collect::<String>()))
});
filter!(NewlineToBr, "newline_to_br", |args: &[Value]| {
    Ok(Value::str(as_text(&args[0]).replace('\n', "<br />\n")))
});
filter!(Remove, "remove", |args: &[Value]| {
    let needle = as_text(args.get(1).unwrap_or(&Value::Nil));
    Ok(Value::str(as_text(&args[0]).replace(&needle, "")))
});
filter!(RemoveFirst, "remove_first", |args: &[Value]| {
    let needle = as_text(args.get(1).unwrap_or(&Value::Nil));
    Ok(Value::str(replace_first(&as_text(&args[0]), &needle, "")))
});
filter!(Replace, "replace", |args: &[Value]| {
    let from = as_text(args.get(1).unwrap_or(&Value::Nil));
    let to = as_text(args.get(2).unwrap_or(&Value::Nil));
    Ok(Value::str(as_text(&args[0]).replace(&from, &to)))
});
filter!(ReplaceFirst, "replace_first", |args: &[Value]| {
    let from = as_text(args.get(1).unwrap_or(&Value::Nil));
    let to = as_text(args.get(2).unwrap_or(&Value::Nil));
    Ok(Value::str(replace_first(&as_text(&args[0]), &from, &to)))
});
filter!(Split, "split", |args: &[Value]| {
    let sep = as_text(args.get(1).unwrap_or(&Value::Nil));
    let text = as_text(&args[0]);
    let parts: Vec<Value> = if sep.is_empty() {
        text.chars().map(|c| Value::str(c.to_string())).collect()
    } else {
        text.split(sep.as_str()).map(Value::str).collect()
    };
    Ok(Value::array(parts))
});
filter!(Truncate, "truncate", |args: &[Value]| {
    let text = as_text(&args[0]);
    let length = args.get(1).and_then(Value::as_i64).unwrap_or(50).max(0) as usize;
    let ellipsis = args.get(2).map(as_text).unwrap_or_else(|| "...".to_string());
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= length {
        return Ok(Value::str(text));
    }
    let keep = length.saturating_sub(ellipsis.chars().count());
    let mut truncated: String = chars[..keep.min(chars.len())].iter().collect();
    truncated.push_str(&ellipsis);
    Ok(Value::str(truncated))
});
filter!(Truncatewords, "truncatewords", |args: &[Value]| {
    let text = as_text(&args[0]);
    let count = args.get(1).and_then(Value::as_i64).unwrap_or(15).max(0) as usize;
    let ellipsis = args.get(2).map(as_text).unwrap_or_else(|| "...".to_string());
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= count {
        return Ok(Value::str(text));
    }
    Ok(Value::str(format!("{}{}", words[..count].join(" "), ellipsis)))
});
filter!(SizeFilter, "size", |args: &[Value]| Ok(Value::Int(args[0].len().unwrap_or(0) as i64)));
filter!(Slice, "slice", |args: &[Value]| slice_value(&args[0], args.get(1), args.get(2)));
filter!(DefaultFilter, "default", |args: &[Value]| {
    Ok(match &args[0] {
        Value::Nil => args.get(1).cloned().unwrap_or(Value::Nil),
        Value::Bool(false) => args.get(1).cloned().unwrap_or(Value::Nil),
        Value::Str(s) if s.is_empty() => args.get(1).cloned().unwrap_or(Value::Nil),
        Value::Array(a) if a.is_empty() => args.get(1).cloned().unwrap_or(Value::Nil),
        other => other.clone(),
    })
});
filter!(Join, "join", |args: &[Value]| {
    let sep = args.get(1).map(as_text).unwrap_or_else(|| " ".to_string());
    match &args[0] {
        Value::Array(items) => Ok(Value::str(
            items.iter().map(as_text).collect::<Vec<_>>().join(&sep),
        )),
        other => Ok(other.clone()),
    }
});

fn replace_first(text: &str, from: &str, to: &str) -> String {
    if from.is_empty() {
        return text.to_string();
    }
    match text.find(from) {
        Some(index) => format!("{}{}{}", &text[..index], to, &text[index + from.len()..]),
        None => text.to_string(),
    }
}

fn slice_value(subject: &Value, offset: Option<&Value>, length: Option<&Value>) -> Result<Value, RenderError> {
    let offset = offset.and_then(Value::as_i64).unwrap_or(0);
    let length = length.and_then(Value::as_i64).unwrap_or(1).max(0) as usize;
    match subject {
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let len = chars.len() as i64;
            let start = if offset < 0 { (len + offset).max(0) } else { offset.min(len) } as usize;
            let end = (start + length).min(chars.len());
            Ok(Value::str(chars[start..end.max(start)].iter().collect::<String>()))
        }
        Value::Array(a) => {
            let len = a.len() as i64;
            let start = if offset < 0 { (len + offset).max(0) } else { offset.min(len) } as usize;
            let end = (start + length).min(a.len());
            Ok(Value::array(a[start..end.max(start)].to_vec()))
        }
        _ => Ok(Value::Nil),
    }
}

filter!(First, "first", |args: &[Value]| match &args[0] {
    Value::Array(a) => Ok(a.first().cloned().unwrap_or(Value::Nil)),
    _ => Ok(Value::Nil),
});
filter!(Last, "last", |args: &[Value]| match &args[0] {
    Value::Array(a) => Ok(a.last().cloned().unwrap_or(Value::Nil)),
    _ => Ok(Value::Nil),
});
filter!(Reverse, "reverse", |args: &[Value]| match &args[0] {
    Value::Array(a) => {
        let mut items = (**a).clone();
        items.reverse();
        Ok(Value::array(items))
    }
    other => Ok(other.clone()),
});
filter!(Sort, "sort", |args: &[Value]| sort_array(&args[0], args.get(1), false));
filter!(SortNatural, "sort_natural", |args: &[Value]| sort_array(&args[0], args.get(1), true));
filter!(Uniq, "uniq", |args: &[Value]| match &args[0] {
    Value::Array(a) => {
        let mut seen: Vec<Value> = Vec::new();
        for item in a.iter() {
            if !seen.iter().any(|s| s == item) {
                seen.push(item.clone());
            }
        }
        Ok(Value::array(seen))
    }
    other => Ok(other.clone()),
});
filter!(Compact, "compact", |args: &[Value]| match &args[0] {
    Value::Array(a) => Ok(Value::array(a.iter().filter(|v| !matches!(v, Value::Nil)).cloned().collect())),
    other => Ok(other.clone()),
});
filter!(MapFilter, "map", |args: &[Value]| match &args[0] {
    Value::Array(a) => {
        let key = args.get(1).map(as_text).unwrap_or_default();
        Ok(Value::array(a.iter().map(|item| property(item, &key)).collect()))
    }
    other => Ok(other.clone()),
});
filter!(Where, "where", |args: &[Value]| match &args[0] {
    Value::Array(a) => {
        let key = args.get(1).map(as_text).unwrap_or_default();
        let target = args.get(2).cloned();
        let filtered: Vec<Value> = a
            .iter()
            .filter(|item| {
                let actual = property(item, &key);
                match &target {
                    Some(expected) => actual == *expected,
                    None => actual.is_truthy(crate::value::Falsiness::permissive()),
                }
            })
            .cloned()
            .collect();
        Ok(Value::array(filtered))
    }
    other => Ok(other.clone()),
});
filter!(Concat, "concat", |args: &[Value]| match (&args[0], args.get(1)) {
    (Value::Array(a), Some(Value::Array(b))) => {
        let mut items = (**a).clone();
        items.extend(b.iter().cloned());
        Ok(Value::array(items))
    }
    (other, _) => Ok(other.clone()),
});

fn property(item: &Value, key: &str) -> Value {
    match item {
        Value::Map(m) => m.get(key).cloned().unwrap_or(Value::Nil),
        other => other.clone(),
    }
}

fn sort_array(subject: &Value, property_arg: Option<&Value>, natural: bool) -> Result<Value, RenderError> {
    match subject {
        Value::Array(a) => {
            let key = property_arg.map(as_text);
            let mut items = (**a).clone();
            items.sort_by(|x, y| {
                let (xv, yv) = match &key {
                    Some(k) => (property(x, k), property(y, k)),
                    None => (x.clone(), y.clone()),
                };
                if natural {
                    as_text(&xv).to_lowercase().cmp(&as_text(&yv).to_lowercase())
                } else {
                    xv.partial_cmp(&yv).unwrap_or(std::cmp::Ordering::Equal)
                }
            });
            Ok(Value::array(items))
        }
        other => Ok(other.clone()),
    }
}

/// `size` is also usable as `thing.size` (spec.md §6 "dot-filters"):
/// same computation, registered separately since a dot-filter's node
/// carries only `[subject]`, never an `Arguments` child.
#[derive(Debug, Default)]
pub struct SizeDot;
impl NodeType for SizeDot {
    fn symbol(&self) -> &str {
        "size"
    }
    fn kind(&self) -> NodeKind {
        NodeKind::DotFilter
    }
    fn render(&self, node: &Node, ctx: &mut RenderCtx) -> Result<Value, RenderError> {
        let subject = node.children()[0].render(ctx)?;
        Ok(Value::Int(subject.len().unwrap_or(0) as i64))
    }
    fn compile(&self, node: &Node, compiler: &mut Compiler) -> Result<(), crate::error::CompileError> {
        compiler.compile_pushed(&node.children()[0])?;
        compiler.emit_call(Rc::new(SizeDot), 1);
        Ok(())
    }
    fn call(&self, args: &[Value]) -> Result<Value, RenderError> {
        Ok(Value::Int(args[0].len().unwrap_or(0) as i64))
    }
    fn unparse(&self, node: &Node, out: &mut String) {
        node.children()[0].unparse_into(out);
        out.push_str(".size");
    }
}

