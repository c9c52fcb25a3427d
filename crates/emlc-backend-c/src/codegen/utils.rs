use emlc::backend::{BinaryOp, UnaryOp};

pub(super) fn format_f32(value: f32) -> String {
    if value.is_nan() {
        "NAN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_negative() {
            "-INFINITY".to_string()
        } else {
            "INFINITY".to_string()
        }
    } else {
        let base = value.to_string();
        let needs_decimal = !base.contains('.') && !base.contains('e') && !base.contains('E');
        let suffix = if needs_decimal { ".0f" } else { "f" };
        format!("{base}{suffix}")
    }
}

pub(super) fn emit_value_array(values: &[f32]) -> String {
    values
        .iter()
        .map(|value| format_f32(*value))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Maps an arbitrary label onto `[A-Za-z0-9_]`, never starting with a digit.
pub(super) fn sanitize_symbol(label: &str) -> String {
    let mut out: String = label
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect();
    if out.is_empty() || out.starts_with(|ch: char| ch.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Text that can sit inside a `/* */` comment.
pub(super) fn comment_text(text: &str) -> String {
    text.replace("*/", "* /")
}

pub(super) fn unary_expr(op: UnaryOp, value: &str) -> String {
    match op {
        UnaryOp::Exp => format!("expf({value})"),
        UnaryOp::Log => format!("logf({value})"),
        UnaryOp::Neg => format!("(-{value})"),
        UnaryOp::Abs => format!("fabsf({value})"),
        UnaryOp::Sqrt => format!("sqrtf({value})"),
        UnaryOp::Tanh => format!("tanhf({value})"),
    }
}

pub(super) fn binary_expr(op: BinaryOp, lhs: &str, rhs: &str) -> String {
    match op {
        BinaryOp::Add => format!("({lhs} + {rhs})"),
        BinaryOp::Sub => format!("({lhs} - {rhs})"),
        BinaryOp::Mul => format!("({lhs} * {rhs})"),
        BinaryOp::Div => format!("({lhs} / {rhs})"),
        BinaryOp::Max => format!("fmaxf({lhs}, {rhs})"),
        BinaryOp::Min => format!("fminf({lhs}, {rhs})"),
    }
}

pub(super) fn push_line(module: &mut String, indent: usize, line: &str) {
    push_block(module, indent, line);
}

pub(super) fn push_block(module: &mut String, indent: usize, block: &str) {
    if block.is_empty() {
        return;
    }
    let pad = "  ".repeat(indent);
    let mut lines: Vec<&str> = block.split('\n').collect();
    if matches!(lines.first(), Some(line) if line.trim().is_empty()) {
        lines.remove(0);
    }
    if matches!(lines.last(), Some(line) if line.trim().is_empty()) {
        lines.pop();
    }

    let mut min_indent = usize::MAX;
    for line in &lines {
        if line.trim().is_empty() {
            continue;
        }
        let count = line.chars().take_while(|c| *c == ' ' || *c == '\t').count();
        min_indent = min_indent.min(count);
    }
    if min_indent == usize::MAX {
        min_indent = 0;
    }

    for line in lines {
        let trimmed = if min_indent > 0 && line.len() >= min_indent {
            &line[min_indent..]
        } else {
            line
        };
        if trimmed.trim().is_empty() {
            module.push('\n');
            continue;
        }
        module.push_str(&pad);
        module.push_str(trimmed);
        module.push('\n');
    }
}
