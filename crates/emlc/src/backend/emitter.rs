use crate::backend::ir::{
    BinaryOp, BufferDecl, BufferId, BufferKind, CallbackKind, IndexExpr, LoopVar, Routine,
    ScalarVar, Section, Stmt, ValueExpr,
};
use crate::compiler::CompileResult;

/// Builds a [`Routine`] one statement at a time.
///
/// Statements land in the innermost open loop body, or in the current section when no
/// loop is open. Emission outside any explicit section goes to an implicit `body`
/// section.
#[derive(Debug)]
pub struct FunctionEmitter {
    name: String,
    buffers: Vec<BufferDecl>,
    sections: Vec<Section>,
    current: Option<String>,
    blocks: Vec<Vec<Stmt>>,
    next_loop_var: u32,
    next_scalar_var: u32,
}

impl FunctionEmitter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            buffers: Vec::new(),
            sections: Vec::new(),
            current: None,
            blocks: Vec::new(),
            next_loop_var: 0,
            next_scalar_var: 0,
        }
    }

    pub fn declare_buffer(
        &mut self,
        kind: BufferKind,
        len: usize,
        label: impl Into<String>,
    ) -> BufferId {
        let id = BufferId(self.buffers.len() as u32);
        self.buffers.push(BufferDecl {
            id,
            kind,
            len,
            label: label.into(),
        });
        id
    }

    pub fn buffer(&self, id: BufferId) -> Option<&BufferDecl> {
        self.buffers.get(id.0 as usize)
    }

    /// Opens a labelled section, closing the current one.
    pub fn begin_section(&mut self, label: impl Into<String>) {
        self.end_section();
        self.current = Some(label.into());
        self.blocks.push(Vec::new());
    }

    pub fn end_section(&mut self) {
        let Some(label) = self.current.take() else {
            return;
        };
        let mut body = Vec::new();
        // Loops close themselves, so only the section block can be left here.
        while let Some(block) = self.blocks.pop() {
            body = block;
        }
        self.sections.push(Section { label, body });
    }

    /// Emits `for (var = lower; var < upper; var += step)` with the statements produced
    /// by `body`.
    pub fn for_loop<F>(&mut self, lower: usize, upper: usize, step: usize, body: F) -> CompileResult<()>
    where
        F: FnOnce(&mut Self, LoopVar) -> CompileResult<()>,
    {
        let var = LoopVar(self.next_loop_var);
        self.next_loop_var += 1;
        self.blocks.push(Vec::new());
        let result = body(self, var);
        let stmts = self.blocks.pop().unwrap_or_default();
        result?;
        self.push(Stmt::Loop {
            var,
            lower,
            upper,
            step,
            body: stmts,
        });
        Ok(())
    }

    pub fn load(buffer: BufferId, index: IndexExpr) -> ValueExpr {
        ValueExpr::load(buffer, index)
    }

    pub fn store(&mut self, buffer: BufferId, index: IndexExpr, value: ValueExpr) {
        self.push(Stmt::Store {
            buffer,
            index,
            value,
        });
    }

    /// Declares a scalar accumulator in the current scope.
    pub fn declare_accumulator(&mut self, init: f32) -> ScalarVar {
        let var = ScalarVar(self.next_scalar_var);
        self.next_scalar_var += 1;
        self.push(Stmt::DeclareScalar { var, init });
        var
    }

    /// `acc = op(acc, value)`
    pub fn accumulate(&mut self, var: ScalarVar, op: BinaryOp, value: ValueExpr) {
        self.push(Stmt::Accumulate { var, op, value });
    }

    pub fn callback(
        &mut self,
        symbol: impl Into<String>,
        kind: CallbackKind,
        buffer: BufferId,
        len: usize,
    ) {
        self.push(Stmt::Callback {
            symbol: symbol.into(),
            kind,
            buffer,
            len,
        });
    }

    fn push(&mut self, stmt: Stmt) {
        if self.blocks.is_empty() {
            self.begin_section("body");
        }
        if let Some(block) = self.blocks.last_mut() {
            block.push(stmt);
        }
    }

    pub fn finish(mut self) -> Routine {
        self.end_section();
        Routine {
            name: self.name,
            buffers: self.buffers,
            sections: self.sections,
            num_loop_vars: self.next_loop_var as usize,
            num_scalar_vars: self.next_scalar_var as usize,
        }
    }
}
