mod utils;

use std::collections::{BTreeMap, HashMap, HashSet};

use emlc::backend::{
    BufferId, BufferKind, CallbackKind, LoopVar, Routine, ScalarVar, Stmt, ValueExpr,
};

use crate::{CodegenError, CodegenResult};

use self::utils::{
    binary_expr, comment_text, emit_value_array, format_f32, push_block, push_line,
    sanitize_symbol, unary_expr,
};

/// Renders `routine` as one C function with its constant tables and callback
/// declarations.
pub(crate) fn generate_c_module(routine: &Routine) -> CodegenResult<String> {
    let function = sanitize_symbol(routine.name());
    if function != routine.name() {
        return Err(CodegenError::InvalidIdentifier(routine.name().to_string()));
    }
    let names = buffer_names(routine);
    let writer = StmtWriter { names: &names };
    let name = |id: BufferId| writer.name(id);

    let mut module = String::new();
    push_block(
        &mut module,
        0,
        &format!(
            r#"
            /* Generated from routine `{}`. */
            #include <math.h>
            #include <stddef.h>
            "#,
            comment_text(routine.name())
        ),
    );

    let callbacks = collect_callbacks(routine)?;
    if !callbacks.is_empty() {
        module.push('\n');
    }
    for (symbol, kind) in &callbacks {
        let param = match kind {
            CallbackKind::Source => "float* buffer",
            CallbackKind::Sink => "const float* buffer",
        };
        push_line(
            &mut module,
            0,
            &format!("extern void {symbol}({param}, size_t len);"),
        );
    }

    let mut wrote_constant = false;
    for decl in routine.buffers() {
        let BufferKind::Constant(values) = &decl.kind else {
            continue;
        };
        if !wrote_constant {
            module.push('\n');
            wrote_constant = true;
        }
        push_line(
            &mut module,
            0,
            &format!(
                "static const float {}[{}] = {{ {} }};",
                name(decl.id)?,
                decl.len,
                emit_value_array(values)
            ),
        );
    }

    let mut inputs: Vec<(usize, BufferId)> = Vec::new();
    let mut outputs: Vec<(usize, BufferId)> = Vec::new();
    for decl in routine.buffers() {
        match decl.kind {
            BufferKind::Input { index } => inputs.push((index, decl.id)),
            BufferKind::Output { index } => outputs.push((index, decl.id)),
            _ => {}
        }
    }
    inputs.sort_unstable();
    outputs.sort_unstable();
    let mut params = Vec::with_capacity(inputs.len() + outputs.len());
    for (_, id) in &inputs {
        params.push(format!("const float* {}", name(*id)?));
    }
    for (_, id) in &outputs {
        params.push(format!("float* {}", name(*id)?));
    }
    let params = if params.is_empty() {
        "void".to_string()
    } else {
        params.join(", ")
    };

    module.push('\n');
    push_line(&mut module, 0, &format!("void {function}({params}) {{"));
    for decl in routine.buffers() {
        if matches!(decl.kind, BufferKind::Scratch) {
            push_line(
                &mut module,
                1,
                &format!("float {}[{}] = {{ 0 }};", name(decl.id)?, decl.len),
            );
        }
    }
    for section in routine.sections() {
        if section.body.is_empty() {
            continue;
        }
        push_line(&mut module, 1, &format!("/* {} */", comment_text(&section.label)));
        writer.block(&mut module, 1, &section.body)?;
    }
    push_line(&mut module, 0, "}");
    Ok(module)
}

/// C identifiers for every buffer. Labels are sanitized and suffixed with the buffer id
/// when they collide with each other, the function, a loop variable or an accumulator.
fn buffer_names(routine: &Routine) -> HashMap<BufferId, String> {
    let mut taken: HashSet<String> = HashSet::new();
    taken.insert(sanitize_symbol(routine.name()));
    taken.extend((0..routine.num_loop_vars()).map(|n| LoopVar(n as u32).to_string()));
    taken.extend((0..routine.num_scalar_vars()).map(|n| ScalarVar(n as u32).to_string()));
    let mut names = HashMap::new();
    for decl in routine.buffers() {
        let base = match decl.kind {
            BufferKind::Constant(_) => format!("{}_{}", routine.name(), decl.label),
            _ => decl.label.clone(),
        };
        let mut name = sanitize_symbol(&base);
        if !taken.insert(name.clone()) {
            name = format!("{name}_{}", decl.id.0);
            taken.insert(name.clone());
        }
        names.insert(decl.id, name);
    }
    names
}

/// Callback symbols in first-use order. A symbol used both as source and sink cannot
/// be declared with a single prototype.
fn collect_callbacks(routine: &Routine) -> CodegenResult<Vec<(String, CallbackKind)>> {
    fn walk(
        stmts: &[Stmt],
        seen: &mut BTreeMap<String, CallbackKind>,
        order: &mut Vec<(String, CallbackKind)>,
    ) -> CodegenResult<()> {
        for stmt in stmts {
            match stmt {
                Stmt::Loop { body, .. } => walk(body, seen, order)?,
                Stmt::Callback { symbol, kind, .. } => match seen.get(symbol) {
                    Some(existing) if existing != kind => {
                        return Err(CodegenError::ConflictingCallback(symbol.clone()));
                    }
                    Some(_) => {}
                    None => {
                        seen.insert(symbol.clone(), *kind);
                        order.push((symbol.clone(), *kind));
                    }
                },
                _ => {}
            }
        }
        Ok(())
    }

    let mut seen = BTreeMap::new();
    let mut order = Vec::new();
    for section in routine.sections() {
        walk(&section.body, &mut seen, &mut order)?;
    }
    Ok(order)
}

struct StmtWriter<'a> {
    names: &'a HashMap<BufferId, String>,
}

impl StmtWriter<'_> {
    fn name(&self, id: BufferId) -> CodegenResult<&str> {
        self.names
            .get(&id)
            .map(String::as_str)
            .ok_or(CodegenError::UnknownBuffer(id.0))
    }

    fn block(&self, module: &mut String, indent: usize, stmts: &[Stmt]) -> CodegenResult<()> {
        for stmt in stmts {
            self.stmt(module, indent, stmt)?;
        }
        Ok(())
    }

    fn stmt(&self, module: &mut String, indent: usize, stmt: &Stmt) -> CodegenResult<()> {
        match stmt {
            Stmt::Loop {
                var,
                lower,
                upper,
                step,
                body,
            } => {
                let advance = if *step == 1 {
                    format!("++{var}")
                } else {
                    format!("{var} += {step}")
                };
                push_line(
                    module,
                    indent,
                    &format!("for (size_t {var} = {lower}; {var} < {upper}; {advance}) {{"),
                );
                self.block(module, indent + 1, body)?;
                push_line(module, indent, "}");
            }
            Stmt::Store {
                buffer,
                index,
                value,
            } => {
                let value = self.value(value)?;
                push_line(
                    module,
                    indent,
                    &format!("{}[{index}] = {value};", self.name(*buffer)?),
                );
            }
            Stmt::DeclareScalar { var, init } => {
                push_line(module, indent, &format!("float {var} = {};", format_f32(*init)));
            }
            Stmt::Accumulate { var, op, value } => {
                let value = self.value(value)?;
                let updated = binary_expr(*op, &var.to_string(), &value);
                push_line(module, indent, &format!("{var} = {updated};"));
            }
            Stmt::Callback {
                symbol,
                buffer,
                len,
                ..
            } => {
                push_line(
                    module,
                    indent,
                    &format!("{symbol}({}, {len});", self.name(*buffer)?),
                );
            }
        }
        Ok(())
    }

    fn value(&self, value: &ValueExpr) -> CodegenResult<String> {
        Ok(match value {
            ValueExpr::Literal(v) => format_f32(*v),
            ValueExpr::Load { buffer, index } => format!("{}[{index}]", self.name(*buffer)?),
            ValueExpr::Scalar(var) => var.to_string(),
            ValueExpr::Unary(op, inner) => unary_expr(*op, &self.value(inner)?),
            ValueExpr::Binary(op, lhs, rhs) => {
                binary_expr(*op, &self.value(lhs)?, &self.value(rhs)?)
            }
        })
    }
}
