//! Renders compiled emlc maps as freestanding C99.
//!
//! The output is a single translation unit: one function per artifact taking its
//! inputs as `const float*` and its outputs as `float*`, scratch memory as
//! function-local arrays, constants as `static const float` tables and host callbacks
//! as `extern` prototypes the embedding firmware provides.

mod codegen;

use emlc::backend::Routine;
use emlc::CompiledMap;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodegenError {
    #[error("`{0}` is not a valid C identifier")]
    InvalidIdentifier(String),
    #[error("statement refers to undeclared buffer {0}")]
    UnknownBuffer(u32),
    #[error("callback `{0}` is used both as a source and as a sink")]
    ConflictingCallback(String),
}

pub type CodegenResult<T> = Result<T, CodegenError>;

/// C source for a compiled map.
pub fn render_c_module(map: &CompiledMap) -> CodegenResult<String> {
    let module = render_routine(map.routine())?;
    debug!(
        function = map.name(),
        machine = map.target_name(),
        bytes = module.len(),
        "rendered C module"
    );
    Ok(module)
}

/// C source for a verified routine.
pub fn render_routine(routine: &Routine) -> CodegenResult<String> {
    codegen::generate_c_module(routine)
}
