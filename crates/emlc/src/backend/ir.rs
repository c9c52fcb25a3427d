//! Loop-level IR produced by [`FunctionEmitter`](super::FunctionEmitter).

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Elementwise operations a target may or may not provide.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Primitive {
    Add,
    Sub,
    Mul,
    Div,
    Max,
    Min,
    Exp,
    Log,
    Neg,
    Abs,
    Sqrt,
    Tanh,
}

impl Primitive {
    /// Primitives every target must provide.
    pub const CORE: [Primitive; 5] = [
        Primitive::Max,
        Primitive::Sub,
        Primitive::Exp,
        Primitive::Add,
        Primitive::Div,
    ];

    pub const ALL: [Primitive; 12] = [
        Primitive::Add,
        Primitive::Sub,
        Primitive::Mul,
        Primitive::Div,
        Primitive::Max,
        Primitive::Min,
        Primitive::Exp,
        Primitive::Log,
        Primitive::Neg,
        Primitive::Abs,
        Primitive::Sqrt,
        Primitive::Tanh,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Primitive::Add => "add",
            Primitive::Sub => "sub",
            Primitive::Mul => "mul",
            Primitive::Div => "div",
            Primitive::Max => "max",
            Primitive::Min => "min",
            Primitive::Exp => "exp",
            Primitive::Log => "log",
            Primitive::Neg => "neg",
            Primitive::Abs => "abs",
            Primitive::Sqrt => "sqrt",
            Primitive::Tanh => "tanh",
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Exp,
    Log,
    Neg,
    Abs,
    Sqrt,
    Tanh,
}

impl UnaryOp {
    pub fn primitive(self) -> Primitive {
        match self {
            UnaryOp::Exp => Primitive::Exp,
            UnaryOp::Log => Primitive::Log,
            UnaryOp::Neg => Primitive::Neg,
            UnaryOp::Abs => Primitive::Abs,
            UnaryOp::Sqrt => Primitive::Sqrt,
            UnaryOp::Tanh => Primitive::Tanh,
        }
    }

    pub fn apply(self, x: f32) -> f32 {
        match self {
            UnaryOp::Exp => x.exp(),
            UnaryOp::Log => x.ln(),
            UnaryOp::Neg => -x,
            UnaryOp::Abs => x.abs(),
            UnaryOp::Sqrt => x.sqrt(),
            UnaryOp::Tanh => x.tanh(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Max,
    Min,
}

impl BinaryOp {
    pub fn primitive(self) -> Primitive {
        match self {
            BinaryOp::Add => Primitive::Add,
            BinaryOp::Sub => Primitive::Sub,
            BinaryOp::Mul => Primitive::Mul,
            BinaryOp::Div => Primitive::Div,
            BinaryOp::Max => Primitive::Max,
            BinaryOp::Min => Primitive::Min,
        }
    }

    pub fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Max => a.max(b),
            BinaryOp::Min => a.min(b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoopVar(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScalarVar(pub u32);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buf{}", self.0)
    }
}

impl fmt::Display for LoopVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i{}", self.0)
    }
}

impl fmt::Display for ScalarVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "acc{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BufferKind {
    /// Caller-provided, read-only.
    Input { index: usize },
    /// Caller-provided, written by the routine.
    Output { index: usize },
    /// Allocated per invocation.
    Scratch,
    /// Baked into the routine.
    Constant(Arc<[f32]>),
}

impl BufferKind {
    pub fn is_writable(&self) -> bool {
        matches!(self, BufferKind::Output { .. } | BufferKind::Scratch)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BufferDecl {
    pub id: BufferId,
    pub kind: BufferKind,
    pub len: usize,
    pub label: String,
}

/// Affine buffer offset: `constant + sum(scale * var)`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexExpr {
    constant: usize,
    terms: Vec<(LoopVar, usize)>,
}

impl IndexExpr {
    pub fn constant(value: usize) -> Self {
        Self {
            constant: value,
            terms: Vec::new(),
        }
    }

    pub fn var(var: LoopVar) -> Self {
        Self::constant(0).add_scaled(var, 1)
    }

    pub fn constant_part(&self) -> usize {
        self.constant
    }

    pub fn terms(&self) -> &[(LoopVar, usize)] {
        &self.terms
    }

    pub fn offset(&self, delta: usize) -> Self {
        Self {
            constant: self.constant + delta,
            terms: self.terms.clone(),
        }
    }

    /// Adds `scale * var`. A zero scale leaves the expression unchanged, which is how
    /// broadcast dimensions revisit the same element.
    pub fn add_scaled(&self, var: LoopVar, scale: usize) -> Self {
        let mut next = self.clone();
        if scale == 0 {
            return next;
        }
        match next.terms.iter_mut().find(|(v, _)| *v == var) {
            Some((_, existing)) => *existing += scale,
            None => next.terms.push((var, scale)),
        }
        next
    }

    pub fn evaluate(&self, loops: &[usize]) -> Option<usize> {
        let mut total = self.constant;
        for (var, scale) in &self.terms {
            total += loops.get(var.0 as usize)? * scale;
        }
        Some(total)
    }
}

impl fmt::Display for IndexExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        for (var, scale) in &self.terms {
            if *scale == 1 {
                parts.push(var.to_string());
            } else {
                parts.push(format!("{var} * {scale}"));
            }
        }
        if self.constant != 0 || parts.is_empty() {
            parts.push(self.constant.to_string());
        }
        f.write_str(&parts.join(" + "))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValueExpr {
    Literal(f32),
    Load { buffer: BufferId, index: IndexExpr },
    Scalar(ScalarVar),
    Unary(UnaryOp, Box<ValueExpr>),
    Binary(BinaryOp, Box<ValueExpr>, Box<ValueExpr>),
}

impl ValueExpr {
    pub fn load(buffer: BufferId, index: IndexExpr) -> Self {
        ValueExpr::Load { buffer, index }
    }

    pub fn unary(op: UnaryOp, value: ValueExpr) -> Self {
        ValueExpr::Unary(op, Box::new(value))
    }

    pub fn binary(op: BinaryOp, lhs: ValueExpr, rhs: ValueExpr) -> Self {
        ValueExpr::Binary(op, Box::new(lhs), Box::new(rhs))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    /// Host fills the buffer.
    Source,
    /// Host reads the buffer.
    Sink,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Loop {
        var: LoopVar,
        lower: usize,
        upper: usize,
        step: usize,
        body: Vec<Stmt>,
    },
    Store {
        buffer: BufferId,
        index: IndexExpr,
        value: ValueExpr,
    },
    DeclareScalar {
        var: ScalarVar,
        init: f32,
    },
    Accumulate {
        var: ScalarVar,
        op: BinaryOp,
        value: ValueExpr,
    },
    Callback {
        symbol: String,
        kind: CallbackKind,
        buffer: BufferId,
        len: usize,
    },
}

/// Statements emitted on behalf of one node, or one output binding.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub label: String,
    pub body: Vec<Stmt>,
}

/// A complete emitted function.
#[derive(Debug, Clone, PartialEq)]
pub struct Routine {
    pub(crate) name: String,
    pub(crate) buffers: Vec<BufferDecl>,
    pub(crate) sections: Vec<Section>,
    pub(crate) num_loop_vars: usize,
    pub(crate) num_scalar_vars: usize,
}

impl Routine {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn buffers(&self) -> &[BufferDecl] {
        &self.buffers
    }

    pub fn buffer(&self, id: BufferId) -> Option<&BufferDecl> {
        self.buffers.get(id.0 as usize)
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn num_loop_vars(&self) -> usize {
        self.num_loop_vars
    }

    pub fn num_scalar_vars(&self) -> usize {
        self.num_scalar_vars
    }

    /// Shorthand for [`verify_routine`](crate::backend::verify_routine).
    pub fn verify(&self, target: &crate::backend::Target) -> Result<(), crate::backend::BackendError> {
        crate::backend::verify_routine(self, target)
    }

    pub fn inputs(&self) -> impl Iterator<Item = &BufferDecl> {
        self.buffers
            .iter()
            .filter(|decl| matches!(decl.kind, BufferKind::Input { .. }))
    }

    pub fn outputs(&self) -> impl Iterator<Item = &BufferDecl> {
        self.buffers
            .iter()
            .filter(|decl| matches!(decl.kind, BufferKind::Output { .. }))
    }
}
