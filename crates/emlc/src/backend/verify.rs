use std::collections::{HashMap, HashSet};

use crate::backend::ir::{
    BufferId, BufferKind, IndexExpr, LoopVar, Routine, ScalarVar, Stmt, ValueExpr,
};
use crate::backend::{BackendError, Target};

/// Rejects routines the target cannot run: undeclared buffers or variables, writes to
/// read-only buffers, offsets that can leave their buffer, primitives the target lacks,
/// loop nests deeper than the target allows and outputs that are never written.
pub fn verify_routine(routine: &Routine, target: &Target) -> Result<(), BackendError> {
    let mut verifier = Verifier {
        routine,
        target,
        loops: HashMap::new(),
        scalars: HashSet::new(),
        written: HashSet::new(),
        depth: 0,
    };
    for section in routine.sections() {
        verifier.scalars.clear();
        verifier
            .block(&section.body)
            .map_err(|message| BackendError::new(routine.name(), format!("{}: {message}", section.label)))?;
    }
    for decl in routine.outputs() {
        if !verifier.written.contains(&decl.id) {
            return Err(BackendError::new(
                routine.name(),
                format!("output buffer `{}` is never written", decl.label),
            ));
        }
    }
    Ok(())
}

struct Verifier<'a> {
    routine: &'a Routine,
    target: &'a Target,
    /// Largest value each open loop variable can take.
    loops: HashMap<LoopVar, usize>,
    scalars: HashSet<ScalarVar>,
    written: HashSet<BufferId>,
    depth: usize,
}

impl Verifier<'_> {
    fn block(&mut self, stmts: &[Stmt]) -> Result<(), String> {
        let outer_scalars = self.scalars.clone();
        for stmt in stmts {
            self.stmt(stmt)?;
        }
        self.scalars = outer_scalars;
        Ok(())
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<(), String> {
        match stmt {
            Stmt::Loop {
                var,
                lower,
                upper,
                step,
                body,
            } => {
                if *step == 0 {
                    return Err(format!("loop {var} has zero step"));
                }
                if lower >= upper {
                    return Err(format!("loop {var} has empty range {lower}..{upper}"));
                }
                if self.loops.contains_key(var) {
                    return Err(format!("loop variable {var} is shadowed"));
                }
                self.depth += 1;
                if self.depth > self.target.max_loop_depth {
                    return Err(format!(
                        "loop nest depth {} exceeds target limit {}",
                        self.depth, self.target.max_loop_depth
                    ));
                }
                let last = lower + ((upper - 1 - lower) / step) * step;
                self.loops.insert(*var, last);
                let result = self.block(body);
                self.loops.remove(var);
                self.depth -= 1;
                result
            }
            Stmt::Store {
                buffer,
                index,
                value,
            } => {
                let decl = self.access(*buffer, index)?;
                if !decl.is_writable() {
                    return Err(format!("store into read-only buffer {buffer}"));
                }
                self.value(value)?;
                self.written.insert(*buffer);
                Ok(())
            }
            Stmt::DeclareScalar { var, .. } => {
                self.scalars.insert(*var);
                Ok(())
            }
            Stmt::Accumulate { var, op, value } => {
                if !self.scalars.contains(var) {
                    return Err(format!("accumulator {var} used outside its scope"));
                }
                self.primitive(op.primitive())?;
                self.value(value)
            }
            Stmt::Callback {
                symbol,
                kind,
                buffer,
                len,
            } => {
                if !self.target.supports_callbacks {
                    return Err(format!(
                        "target `{}` cannot call back into `{symbol}`",
                        self.target.name
                    ));
                }
                if !is_c_identifier(symbol) {
                    return Err(format!("callback symbol `{symbol}` is not an identifier"));
                }
                let decl = self
                    .routine
                    .buffer(*buffer)
                    .ok_or_else(|| format!("undeclared buffer {buffer}"))?;
                if *len > decl.len {
                    return Err(format!(
                        "callback `{symbol}` spans {len} entries of a {}-entry buffer",
                        decl.len
                    ));
                }
                if matches!(kind, crate::backend::ir::CallbackKind::Source) {
                    if !decl.kind.is_writable() {
                        return Err(format!("source callback into read-only buffer {buffer}"));
                    }
                    self.written.insert(*buffer);
                }
                Ok(())
            }
        }
    }

    fn value(&mut self, value: &ValueExpr) -> Result<(), String> {
        match value {
            ValueExpr::Literal(_) => Ok(()),
            ValueExpr::Load { buffer, index } => self.access(*buffer, index).map(|_| ()),
            ValueExpr::Scalar(var) => {
                if self.scalars.contains(var) {
                    Ok(())
                } else {
                    Err(format!("scalar {var} read outside its scope"))
                }
            }
            ValueExpr::Unary(op, inner) => {
                self.primitive(op.primitive())?;
                self.value(inner)
            }
            ValueExpr::Binary(op, lhs, rhs) => {
                self.primitive(op.primitive())?;
                self.value(lhs)?;
                self.value(rhs)
            }
        }
    }

    fn primitive(&self, primitive: crate::backend::Primitive) -> Result<(), String> {
        if self.target.has_primitive(primitive) {
            Ok(())
        } else {
            Err(format!(
                "primitive `{primitive}` is not available on target `{}`",
                self.target.name
            ))
        }
    }

    fn access(&self, buffer: BufferId, index: &IndexExpr) -> Result<&BufferKind, String> {
        let decl = self
            .routine
            .buffer(buffer)
            .ok_or_else(|| format!("undeclared buffer {buffer}"))?;
        let mut max = index.constant_part();
        for (var, scale) in index.terms() {
            let last = self
                .loops
                .get(var)
                .ok_or_else(|| format!("loop variable {var} used outside its loop"))?;
            max += last * scale;
        }
        if max >= decl.len {
            return Err(format!(
                "offset `{index}` reaches {max} in buffer `{}` of {} entries",
                decl.label, decl.len
            ));
        }
        Ok(&decl.kind)
    }
}

fn is_c_identifier(symbol: &str) -> bool {
    let mut chars = symbol.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ir::{BinaryOp, BufferKind, CallbackKind};
    use crate::backend::FunctionEmitter;

    fn copy_routine(len: usize, out_len: usize) -> Routine {
        let mut f = FunctionEmitter::new("copy");
        let input = f.declare_buffer(BufferKind::Input { index: 0 }, len, "x");
        let output = f.declare_buffer(BufferKind::Output { index: 0 }, out_len, "y");
        f.for_loop(0, len, 1, |f, i| {
            let value = FunctionEmitter::load(input, IndexExpr::var(i));
            f.store(output, IndexExpr::var(i), value);
            Ok(())
        })
        .expect("emit");
        f.finish()
    }

    #[test]
    fn accepts_in_bounds_copy() {
        verify_routine(&copy_routine(4, 4), &Target::host()).expect("valid routine");
    }

    #[test]
    fn rejects_out_of_bounds_store() {
        let err = verify_routine(&copy_routine(4, 3), &Target::host()).expect_err("oob");
        assert!(err.to_string().contains("reaches 3"));
    }

    #[test]
    fn rejects_store_into_input() {
        let mut f = FunctionEmitter::new("bad");
        let input = f.declare_buffer(BufferKind::Input { index: 0 }, 1, "x");
        f.store(input, IndexExpr::constant(0), ValueExpr::Literal(1.0));
        let err = verify_routine(&f.finish(), &Target::host()).expect_err("read-only");
        assert!(err.to_string().contains("read-only"));
    }

    #[test]
    fn rejects_missing_primitive_and_callbacks() {
        let mut f = FunctionEmitter::new("bad");
        let out = f.declare_buffer(BufferKind::Output { index: 0 }, 1, "y");
        let acc = f.declare_accumulator(0.0);
        f.accumulate(acc, BinaryOp::Min, ValueExpr::Literal(2.0));
        f.store(out, IndexExpr::constant(0), ValueExpr::Scalar(acc));
        let routine = f.finish();
        verify_routine(&routine, &Target::host()).expect("host has min");
        assert!(verify_routine(&routine, &Target::embedded()).is_err());

        let mut f = FunctionEmitter::new("cb");
        let out = f.declare_buffer(BufferKind::Output { index: 0 }, 2, "y");
        f.callback("read_sensor", CallbackKind::Source, out, 2);
        let routine = f.finish();
        assert!(verify_routine(&routine, &Target::host()).is_err());
        verify_routine(&routine, &Target::embedded()).expect("embedded has callbacks");
    }
}
