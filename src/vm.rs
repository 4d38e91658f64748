//! The register+stack bytecode interpreter (spec.md §4.5 "VM dispatch"): a
//! single dispatch loop with no threading, re-entrant only in the sense
//! that `ITERATE`'s body is run through the same [`Vm`] instance.
//!
//! The source's `ITERATE` is re-entrant through the resolver's higher-order
//! iteration callback (spec.md §4.5, §9 "Iteration callback shape"); this
//! VM instead enumerates eagerly via [`VariableResolver::enumerate`] and
//! drives the body with a plain Rust loop over the collected elements — the
//! same simplification the tree-walking `for` tag makes (see `DESIGN.md`).
use crate::bytecode::{Instruction, OpCode, Operand, Program};
use crate::error::{RenderError, RenderErrorKind};
use crate::render::ControlSignal;
use crate::value::{Falsiness, PathSegment, Value, VariableResolver};
use std::time::{Duration, Instant};

const REGISTER_COUNT: usize = 8;
/// Entry count proxy for the source's 100 KiB linear byte stack (spec.md
/// §4.5) — counting `Value` slots rather than bytes, since the VM stack
/// here is a `Vec<Value>`, not a self-describing byte buffer.
const STACK_LIMIT: usize = 100 * 1024 / 8;

pub struct Vm<'a> {
    registers: [Value; REGISTER_COUNT],
    stack: Vec<Value>,
    buffers: Vec<String>,
    resolver: &'a mut dyn VariableResolver,
    sink: Box<dyn FnMut(&str) + 'a>,
    start: Instant,
    max_time: Duration,
    falsiness: Falsiness,
}

impl<'a> Vm<'a> {
    pub fn new(
        resolver: &'a mut dyn VariableResolver,
        sink: Box<dyn FnMut(&str) + 'a>,
        max_time: Duration,
        falsiness: Falsiness,
    ) -> Self {
        Self {
            registers: std::array::from_fn(|_| Value::Nil),
            stack: Vec::new(),
            buffers: Vec::new(),
            resolver,
            sink,
            start: Instant::now(),
            max_time,
            falsiness,
        }
    }

    fn emit_text(&mut self, text: &str) {
        match self.buffers.last_mut() {
            Some(top) => top.push_str(text),
            None => (self.sink)(text),
        }
    }

    fn check_time(&self) -> Result<(), RenderError> {
        if self.start.elapsed() > self.max_time {
            return Err(RenderError::new(RenderErrorKind::ExceededTime, "maximum rendering time exceeded"));
        }
        Ok(())
    }

    fn push(&mut self, value: Value) -> Result<(), RenderError> {
        if self.stack.len() >= STACK_LIMIT {
            return Err(RenderError::new(RenderErrorKind::ExceededMemory, "VM stack exhausted"));
        }
        self.stack.push(value);
        Ok(())
    }

    fn arith(op: OpCode, a: &Value, b: &Value) -> Value {
        let (af, bf) = match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => (a, b),
            _ => return Value::Nil,
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
            Value::Int(result as i64)
        } else {
            Value::Float(result)
        }
    }

    /// Run `program.code[start..end]`, honoring jumps only within that
    /// range (a sub-range is always one `if`/`for` construct's own body,
    /// which never jumps outside itself).
    pub fn run_range(&mut self, program: &Program, start: usize, end: usize) -> Result<ControlSignal, RenderError> {
        let mut pc = start;
        while pc < end {
            self.check_time()?;
            let instr: Instruction = program.code[pc].clone();
            match instr.op {
                OpCode::Exit => return Ok(ControlSignal::Exit),
                OpCode::MovNil => {
                    self.registers[instr.target] = Value::Nil;
                    pc += 1;
                }
                OpCode::MovBool => {
                    if let Operand::Bool(b) = instr.operand {
                        self.registers[instr.target] = Value::Bool(b);
                    }
                    pc += 1;
                }
                OpCode::MovInt => {
                    if let Operand::Int(i) = instr.operand {
                        self.registers[instr.target] = Value::Int(i);
                    }
                    pc += 1;
                }
                OpCode::MovFloat => {
                    if let Operand::Float(f) = instr.operand {
                        self.registers[instr.target] = Value::Float(f);
                    }
                    pc += 1;
                }
                OpCode::MovStr => {
                    if let Operand::DataOffset(offset) = instr.operand {
                        self.registers[instr.target] = Value::str(program.data[offset].clone());
                    }
                    pc += 1;
                }
                OpCode::Mov => {
                    if let Operand::Register(src) = instr.operand {
                        self.registers[instr.target] = self.registers[src].clone();
                    }
                    pc += 1;
                }
                OpCode::Push => {
                    let value = self.registers[instr.target].clone();
                    self.push(value)?;
                    pc += 1;
                }
                OpCode::Pop => {
                    if let Operand::Int(n) = instr.operand {
                        for _ in 0..n {
                            self.stack.pop();
                        }
                    }
                    pc += 1;
                }
                OpCode::Stack => {
                    if let Operand::StackSlot(k) = instr.operand {
                        let len = self.stack.len() as i64;
                        let index = if k < 0 { len + k } else { k };
                        self.registers[instr.target] = if index >= 0 && (index as usize) < self.stack.len() {
                            self.stack[index as usize].clone()
                        } else {
                            Value::Nil
                        };
                    }
                    pc += 1;
                }
                OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Mod => {
                    let rhs = self.registers[instr.target].clone();
                    self.registers[0] = Self::arith(instr.op, &self.registers[0], &rhs);
                    pc += 1;
                }
                OpCode::Eql => {
                    let rhs = self.registers[instr.target].clone();
                    self.registers[0] = Value::Bool(self.registers[0] == rhs);
                    pc += 1;
                }
                OpCode::Length => {
                    self.registers[0] = match self.registers[instr.target].len() {
                        Some(n) => Value::Int(n as i64),
                        None => Value::Nil,
                    };
                    pc += 1;
                }
                OpCode::Invert => {
                    let truthy = self.registers[instr.target].is_truthy(self.falsiness);
                    self.registers[0] = Value::Bool(!truthy);
                    pc += 1;
                }
                OpCode::Resolve => {
                    let key = self.registers[instr.target].clone();
                    let resolved = match instr.operand {
                        Operand::Int(-1) => match &key {
                            Value::Str(name) => self.resolver.get_root(name),
                            _ => None,
                        },
                        Operand::Int(ctx) => {
                            let base = self.registers[ctx as usize].clone();
                            let segment = match &key {
                                Value::Str(s) => PathSegment::Key(s.to_string()),
                                Value::Int(i) => PathSegment::Index(*i),
                                _ => return Ok(ControlSignal::None),
                            };
                            self.resolver.get_index(&base, &segment)
                        }
                        _ => None,
                    };
                    self.registers[instr.target] = resolved.unwrap_or(Value::Nil);
                    pc += 1;
                }
                OpCode::Assign => {
                    if let Operand::DataOffset(name_offset) = instr.operand {
                        let value = self.registers[instr.target].clone();
                        self.resolver.assign(&program.data[name_offset], &[], value);
                    }
                    pc += 1;
                }
                OpCode::Call => {
                    if let Operand::Call(node_type, count) = instr.operand {
                        let start = self.stack.len().saturating_sub(count);
                        let args: Vec<Value> = self.stack.split_off(start);
                        self.registers[0] = node_type.call(&args)?;
                    }
                    pc += 1;
                }
                OpCode::Jmp => {
                    if let Operand::CodeOffset(target) = instr.operand {
                        pc = target;
                        continue;
                    }
                    pc += 1;
                }
                OpCode::JmpTrue => {
                    if let Operand::CodeOffset(target) = instr.operand {
                        if self.registers[instr.target].is_truthy(self.falsiness) {
                            pc = target;
                            continue;
                        }
                    }
                    pc += 1;
                }
                OpCode::JmpFalse => {
                    if let Operand::CodeOffset(target) = instr.operand {
                        if !self.registers[instr.target].is_truthy(self.falsiness) {
                            pc = target;
                            continue;
                        }
                    }
                    pc += 1;
                }
                OpCode::Iterate => {
                    if let Operand::IterateTargets { else_or_body_end, after } = instr.operand {
                        let iterable = self.registers[instr.target].clone();
                        let elements = self.resolver.enumerate(&iterable).unwrap_or_default();
                        if elements.is_empty() {
                            pc = else_or_body_end;
                            continue;
                        }
                        let body_start = pc + 1;
                        for element in elements {
                            self.registers[instr.target] = element;
                            match self.run_range(program, body_start, else_or_body_end)? {
                                ControlSignal::Break => break,
                                ControlSignal::Exit => return Ok(ControlSignal::Exit),
                                ControlSignal::Continue | ControlSignal::None => {}
                            }
                            self.check_time()?;
                        }
                        pc = after;
                        continue;
                    }
                    pc += 1;
                }
                OpCode::PushBuffer => {
                    self.buffers.push(String::new());
                    pc += 1;
                }
                OpCode::PopBuffer => {
                    let text = self.buffers.pop().unwrap_or_default();
                    self.registers[instr.target] = Value::str(text);
                    pc += 1;
                }
                OpCode::Output => {
                    let text = self.registers[instr.target].to_string();
                    self.emit_text(&text);
                    pc += 1;
                }
                OpCode::OutputMem => {
                    if let Operand::DataOffset(offset) = instr.operand {
                        let text = program.data[offset].clone();
                        self.emit_text(&text);
                    }
                    pc += 1;
                }
            }
        }
        Ok(ControlSignal::None)
    }

    pub fn run(&mut self, program: &Program) -> Result<(), RenderError> {
        self.run_range(program, program.entry, program.code.len())?;
        Ok(())
    }

}

/// Runs `program` against `resolver`, buffering output into an owned
/// string (spec.md §6 "runProgram(renderer, store, program) → string").
pub fn run_program(
    program: &Program,
    resolver: &mut dyn VariableResolver,
    max_time: Duration,
    falsiness: Falsiness,
) -> Result<String, RenderError> {
    let mut buffer = String::new();
    {
        let mut vm = Vm::new(resolver, Box::new(|chunk: &str| buffer.push_str(chunk)), max_time, falsiness);
        vm.run(program)?;
    }
    Ok(buffer)
}
