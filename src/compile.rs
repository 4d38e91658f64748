//! Lowers an AST to a [`Program`] (spec.md §4.5). Every node type's
//! `compile` leaves its result in register 0 — the accumulator every
//! arithmetic/`CALL` opcode already reads and writes — and expression nodes
//! that need to hand a value to their parent as an argument additionally
//! `PUSH` it, mirroring "filters and operators push children in reverse,
//! then `MOVINT count + CALL`" (spec.md §4.5).
use crate::bytecode::{Instruction, OpCode, Operand, Program, Register};
use crate::error::CompileError;
use crate::node::{Node, NodeType};
use crate::value::Value;
use std::collections::HashMap;
use std::rc::Rc;

/// Accumulator register every `compile` implementation leaves its result in.
pub const ACCUMULATOR: Register = 0;

pub struct Compiler {
    code: Vec<Instruction>,
    data: Vec<String>,
    data_index: HashMap<String, usize>,
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            code: Vec::new(),
            data: Vec::new(),
            data_index: HashMap::new(),
        }
    }

    /// String interning (spec.md §4.5 "keeps a map from string-hash to
    /// data-segment offset so identical literals share one slot").
    pub fn intern(&mut self, s: &str) -> usize {
        if let Some(offset) = self.data_index.get(s) {
            return *offset;
        }
        let offset = self.data.len();
        self.data.push(s.to_string());
        self.data_index.insert(s.to_string(), offset);
        offset
    }

    pub fn emit(&mut self, op: OpCode, target: Register, operand: Operand) -> usize {
        self.code.push(Instruction::new(op, target, operand));
        self.code.len() - 1
    }

    pub fn here(&self) -> usize {
        self.code.len()
    }

    pub fn patch(&mut self, index: usize, operand: Operand) {
        self.code[index].operand = operand;
    }

    /// A leaf's lowering: load its constant into the accumulator.
    pub fn emit_constant(&mut self, value: &Value) {
        match value {
            Value::Nil => {
                self.emit(OpCode::MovNil, ACCUMULATOR, Operand::None);
            }
            Value::Bool(b) => {
                self.emit(OpCode::MovBool, ACCUMULATOR, Operand::Bool(*b));
            }
            Value::Int(i) => {
                self.emit(OpCode::MovInt, ACCUMULATOR, Operand::Int(*i));
            }
            Value::Float(f) => {
                self.emit(OpCode::MovFloat, ACCUMULATOR, Operand::Float(*f));
            }
            Value::Str(s) => {
                let offset = self.intern(s);
                self.emit(OpCode::MovStr, ACCUMULATOR, Operand::DataOffset(offset));
            }
            // Arrays/maps have no constant-pool representation; a node
            // producing one at compile time falls back to nil. Parsed
            // templates never put these in leaf position (array literals
            // compile their elements individually), so this only affects
            // the optimizer folding a container-valued subtree, which it
            // does not do.
            Value::Array(_) | Value::Map(_) => {
                self.emit(OpCode::MovNil, ACCUMULATOR, Operand::None);
            }
        }
    }

    /// Compile `node`, then push its accumulator result onto the VM stack —
    /// the idiom every argument-collecting node type (operators, filters,
    /// array literals) uses for its children.
    pub fn compile_pushed(&mut self, node: &Node) -> Result<(), CompileError> {
        node.compile(self)?;
        self.emit(OpCode::Push, ACCUMULATOR, Operand::None);
        Ok(())
    }

    /// Emit a `CALL` against `count` already-pushed arguments.
    pub fn emit_call(&mut self, node_type: Rc<dyn NodeType>, count: usize) {
        self.emit(OpCode::Call, ACCUMULATOR, Operand::Call(node_type, count));
    }

    pub fn finish(self, entry: usize) -> Program {
        Program {
            data: self.data,
            code: self.code,
            entry,
        }
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowers `root` into a standalone [`Program`] whose entry point is its
/// first instruction, followed by an `EXIT`.
pub fn compile_program(root: &Node) -> Result<Program, CompileError> {
    let mut compiler = Compiler::new();
    root.compile(&mut compiler)?;
    compiler.emit(OpCode::Exit, ACCUMULATOR, Operand::None);
    Ok(compiler.finish(0))
}
