//! Host interpreter for verified routines.
//!
//! All mutable state (scratch buffers, loop counters, accumulators) lives in a
//! per-invocation [`Machine`], so one routine can be run from many threads at once.

use thiserror::Error;

use crate::backend::ir::{
    BufferId, BufferKind, CallbackKind, IndexExpr, Routine, Stmt, ValueExpr,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("expected {expected} input buffer(s), got {actual}")]
    InputCount { expected: usize, actual: usize },
    #[error("input {index} has {actual} entries, expected {expected}")]
    InputSize {
        index: usize,
        expected: usize,
        actual: usize,
    },
    #[error("expected {expected} output buffer(s), got {actual}")]
    OutputCount { expected: usize, actual: usize },
    #[error("output {index} has {actual} entries, expected {expected}")]
    OutputSize {
        index: usize,
        expected: usize,
        actual: usize,
    },
    #[error("offset {offset} is outside buffer `{buffer}`")]
    OutOfBounds { buffer: String, offset: usize },
    #[error("buffer `{0}` is read-only")]
    ReadOnly(String),
    #[error("no host callback registered for `{0}`")]
    MissingCallback(String),
}

pub type ExecResult<T> = Result<T, ExecutionError>;

/// Host functions invoked by source and sink nodes.
pub trait CallbackHandler {
    /// Fills `buffer`; returns `false` when `symbol` is unknown.
    fn source(&mut self, symbol: &str, buffer: &mut [f32]) -> bool;

    fn sink(&mut self, symbol: &str, buffer: &[f32]);
}

/// Handler for maps without callbacks. Sources fail, sinks are ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCallbacks;

impl CallbackHandler for NoCallbacks {
    fn source(&mut self, _symbol: &str, _buffer: &mut [f32]) -> bool {
        false
    }

    fn sink(&mut self, _symbol: &str, _buffer: &[f32]) {}
}

enum Slot<'a> {
    Read(&'a [f32]),
    Write(&'a mut [f32]),
    Owned(Vec<f32>),
}

impl Slot<'_> {
    fn as_slice(&self) -> &[f32] {
        match self {
            Slot::Read(data) => data,
            Slot::Write(data) => data,
            Slot::Owned(data) => data,
        }
    }

    fn as_mut_slice(&mut self) -> Option<&mut [f32]> {
        match self {
            Slot::Read(_) => None,
            Slot::Write(data) => Some(data),
            Slot::Owned(data) => Some(data),
        }
    }
}

struct Machine<'a, 'h> {
    routine: &'a Routine,
    slots: Vec<Slot<'a>>,
    loops: Vec<usize>,
    scalars: Vec<f32>,
    callbacks: &'h mut dyn CallbackHandler,
}

/// Runs `routine` over caller buffers. Inputs and outputs are matched to the routine's
/// input and output declarations by index.
pub fn execute<'a>(
    routine: &'a Routine,
    inputs: &[&'a [f32]],
    outputs: &'a mut [&mut [f32]],
    callbacks: &mut dyn CallbackHandler,
) -> ExecResult<()> {
    let expected_inputs = routine.inputs().count();
    if inputs.len() != expected_inputs {
        return Err(ExecutionError::InputCount {
            expected: expected_inputs,
            actual: inputs.len(),
        });
    }
    let expected_outputs = routine.outputs().count();
    if outputs.len() != expected_outputs {
        return Err(ExecutionError::OutputCount {
            expected: expected_outputs,
            actual: outputs.len(),
        });
    }

    let output_count = outputs.len();
    let mut pending: Vec<Option<&'a mut [f32]>> =
        outputs.iter_mut().map(|out| Some(&mut **out)).collect();
    let mut slots = Vec::with_capacity(routine.buffers().len());
    for decl in routine.buffers() {
        let slot = match &decl.kind {
            BufferKind::Input { index } => {
                let data = inputs[*index];
                if data.len() != decl.len {
                    return Err(ExecutionError::InputSize {
                        index: *index,
                        expected: decl.len,
                        actual: data.len(),
                    });
                }
                Slot::Read(data)
            }
            BufferKind::Output { index } => {
                let data = pending
                    .get_mut(*index)
                    .and_then(Option::take)
                    .ok_or(ExecutionError::OutputCount {
                        expected: expected_outputs,
                        actual: output_count,
                    })?;
                if data.len() != decl.len {
                    return Err(ExecutionError::OutputSize {
                        index: *index,
                        expected: decl.len,
                        actual: data.len(),
                    });
                }
                Slot::Write(data)
            }
            BufferKind::Scratch => Slot::Owned(vec![0.0; decl.len]),
            BufferKind::Constant(values) => Slot::Read(values),
        };
        slots.push(slot);
    }

    let mut machine = Machine {
        routine,
        slots,
        loops: vec![0; routine.num_loop_vars()],
        scalars: vec![0.0; routine.num_scalar_vars()],
        callbacks,
    };
    for section in routine.sections() {
        machine.block(&section.body)?;
    }
    Ok(())
}

impl Machine<'_, '_> {
    fn block(&mut self, stmts: &[Stmt]) -> ExecResult<()> {
        for stmt in stmts {
            self.stmt(stmt)?;
        }
        Ok(())
    }

    fn stmt(&mut self, stmt: &Stmt) -> ExecResult<()> {
        match stmt {
            Stmt::Loop {
                var,
                lower,
                upper,
                step,
                body,
            } => {
                let slot = var.0 as usize;
                let mut i = *lower;
                while i < *upper {
                    self.loops[slot] = i;
                    self.block(body)?;
                    i += step;
                }
                Ok(())
            }
            Stmt::Store {
                buffer,
                index,
                value,
            } => {
                let value = self.eval(value)?;
                let offset = self.offset(index);
                let stored = match self.slots[buffer.0 as usize]
                    .as_mut_slice()
                    .and_then(|data| data.get_mut(offset))
                {
                    Some(entry) => {
                        *entry = value;
                        true
                    }
                    None => false,
                };
                if stored {
                    Ok(())
                } else {
                    Err(ExecutionError::OutOfBounds {
                        buffer: self.label(*buffer),
                        offset,
                    })
                }
            }
            Stmt::DeclareScalar { var, init } => {
                self.scalars[var.0 as usize] = *init;
                Ok(())
            }
            Stmt::Accumulate { var, op, value } => {
                let value = self.eval(value)?;
                let acc = &mut self.scalars[var.0 as usize];
                *acc = op.apply(*acc, value);
                Ok(())
            }
            Stmt::Callback {
                symbol,
                kind,
                buffer,
                len,
            } => {
                let label = self.label(*buffer);
                match kind {
                    CallbackKind::Source => {
                        let data = self.slots[buffer.0 as usize]
                            .as_mut_slice()
                            .ok_or_else(|| ExecutionError::ReadOnly(label.clone()))?
                            .get_mut(..*len)
                            .ok_or(ExecutionError::OutOfBounds {
                                buffer: label,
                                offset: *len,
                            })?;
                        if !self.callbacks.source(symbol, data) {
                            return Err(ExecutionError::MissingCallback(symbol.clone()));
                        }
                    }
                    CallbackKind::Sink => {
                        let data = self.slots[buffer.0 as usize]
                            .as_slice()
                            .get(..*len)
                            .ok_or(ExecutionError::OutOfBounds {
                                buffer: label,
                                offset: *len,
                            })?;
                        self.callbacks.sink(symbol, data);
                    }
                }
                Ok(())
            }
        }
    }

    fn eval(&self, value: &ValueExpr) -> ExecResult<f32> {
        match value {
            ValueExpr::Literal(v) => Ok(*v),
            ValueExpr::Load { buffer, index } => {
                let offset = self.offset(index);
                self.slots[buffer.0 as usize]
                    .as_slice()
                    .get(offset)
                    .copied()
                    .ok_or_else(|| ExecutionError::OutOfBounds {
                        buffer: self.label(*buffer),
                        offset,
                    })
            }
            ValueExpr::Scalar(var) => Ok(self.scalars[var.0 as usize]),
            ValueExpr::Unary(op, inner) => Ok(op.apply(self.eval(inner)?)),
            ValueExpr::Binary(op, lhs, rhs) => Ok(op.apply(self.eval(lhs)?, self.eval(rhs)?)),
        }
    }

    fn offset(&self, index: &IndexExpr) -> usize {
        index.evaluate(&self.loops).unwrap_or(usize::MAX)
    }

    fn label(&self, buffer: BufferId) -> String {
        self.routine
            .buffer(buffer)
            .map(|decl| decl.label.clone())
            .unwrap_or_else(|| buffer.to_string())
    }
}
