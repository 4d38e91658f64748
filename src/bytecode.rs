//! The compiled program shape (spec.md §4.5). The source packs a 4-byte
//! opcode+register header plus an optional 8-byte operand into a flat byte
//! stream with a separately length-prefixed data segment; here the code and
//! data segments are a `Vec<Instruction>`/`Vec<String>` instead — a
//! structured re-architecture in the spirit of spec.md §9's own
//! "arena allocation... is a legitimate and recommended re-architecture"
//! note, recorded as an Open Question decision in `DESIGN.md`. Jump/iterate
//! operands are indices into `code` rather than fixed-up byte offsets, since
//! there is no byte stream to fix up against.
use crate::node::NodeType;
use std::fmt;
use std::rc::Rc;

pub type Register = usize;

/// An operand a single instruction carries, beyond its target register.
#[derive(Clone)]
pub enum Operand {
    None,
    Register(Register),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Index into the program's data segment.
    DataOffset(usize),
    /// A relative stack slot read by `STACK k` (spec.md: "negative = from
    /// top"); stored signed per spec.md §9d's fix to the source's decoder.
    StackSlot(i64),
    /// A code-segment instruction index, for `JMP`/`JMPTRUE`/`JMPFALSE`.
    CodeOffset(usize),
    /// `ITERATE`'s pair of labels: where the loop body ends (and, when the
    /// iterable is empty, the `else` branch that runs instead), and where
    /// control resumes once the whole `for`/`else` construct is done.
    IterateTargets { else_or_body_end: usize, after: usize },
    /// A `CALL`: the node type to dispatch to and the argument count already
    /// pushed onto the stack for it.
    Call(Rc<dyn NodeType>, usize),
}

impl fmt::Debug for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => write!(f, "-"),
            Operand::Register(r) => write!(f, "r{}", r),
            Operand::Int(i) => write!(f, "{}", i),
            Operand::Float(v) => write!(f, "{}", v),
            Operand::Bool(b) => write!(f, "{}", b),
            Operand::DataOffset(o) => write!(f, "data[{}]", o),
            Operand::StackSlot(k) => write!(f, "stack[{}]", k),
            Operand::CodeOffset(o) => write!(f, "@{}", o),
            Operand::IterateTargets { else_or_body_end, after } => {
                write!(f, "else@{} after@{}", else_or_body_end, after)
            }
            Operand::Call(nt, n) => write!(f, "{}/{}", nt.symbol(), n),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    MovStr,
    MovInt,
    MovFloat,
    MovBool,
    MovNil,
    Mov,
    Push,
    Pop,
    Stack,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eql,
    Length,
    Invert,
    Resolve,
    Assign,
    Call,
    Jmp,
    JmpTrue,
    JmpFalse,
    Iterate,
    PushBuffer,
    PopBuffer,
    Output,
    OutputMem,
    Exit,
}

#[derive(Clone)]
pub struct Instruction {
    pub op: OpCode,
    /// The target register `T` every opcode table entry in spec.md §4.5
    /// names (register 0 doubles as the arithmetic accumulator).
    pub target: Register,
    pub operand: Operand,
}

impl Instruction {
    pub fn new(op: OpCode, target: Register, operand: Operand) -> Self {
        Self { op, target, operand }
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} r{} {:?}", self.op, self.target, self.operand)
    }
}

/// A compiled unit (spec.md §4.5 "Program layout"): a data segment of
/// interned strings followed by a code segment, with a fixed entry point.
#[derive(Default)]
pub struct Program {
    pub data: Vec<String>,
    pub code: Vec<Instruction>,
    pub entry: usize,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// One line per instruction plus a data-segment dump (SPEC_FULL.md §3
    /// "disassembler"), used by tests to assert compiled shape.
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        out.push_str("; data\n");
        for (offset, s) in self.data.iter().enumerate() {
            out.push_str(&format!("{:4}  {:?}\n", offset, s));
        }
        out.push_str("; code\n");
        for (offset, instr) in self.code.iter().enumerate() {
            out.push_str(&format!("{:4}  {:?}\n", offset, instr));
        }
        out
    }
}
