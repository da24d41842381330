//! Dispatch for `INVOKE`-only natives plus the direct-opcode aliases
//! (spec §4.5: "alias natives for all direct-opcode forms").
//!
//! [`kokoki_core::NATIVE_TABLE`] is the single source of truth for which
//! names exist and in what order the compiler assigns their indices;
//! this module only has to turn an index back into a name (via
//! [`kokoki_core::entry_at`]) and a name into an implementation.

mod collections;
mod combinators;
mod io;
mod refcell;

use crate::context::Context;
use crate::error::Fault;
use crate::interp::execute_alias;

pub fn invoke_native(ctx: &mut Context, idx: u16) -> Result<(), Fault> {
    let idx = idx as usize;
    let entry = kokoki_core::natives::entry_at(idx)
        .ok_or_else(|| Fault::new(format!("invoke: native index {idx} out of range")))?;
    if let Some(op) = entry.direct_opcode {
        return execute_alias(ctx, op);
    }
    dispatch(entry.name, ctx)
}

fn dispatch(name: &str, ctx: &mut Context) -> Result<(), Fault> {
    match name {
        "slurp" => io::slurp(ctx),
        "nl" => io::nl(ctx),
        "read" => io::read(ctx),
        "dump" => io::dump(ctx),
        "eval" => io::eval_native(ctx),
        "use" => io::use_native(ctx),

        "cat" => collections::cat(ctx),
        "sort" => collections::sort(ctx),
        "compare" => collections::compare(ctx),
        "len" => collections::len(ctx),
        "aget" => collections::aget(ctx),
        "aset" => collections::aset(ctx),
        "adel" => collections::adel(ctx),
        "slice" => collections::slice(ctx),
        "reverse" => collections::reverse(ctx),
        "copy" => collections::copy(ctx),

        "?" => refcell::deref(ctx),
        "!" => refcell::assign(ctx),
        "!!" => refcell::update(ctx),
        "!?" => refcell::assign_if_unbound(ctx),

        "cond" => combinators::cond(ctx),
        "while" => combinators::while_loop(ctx),
        "times" => combinators::times(ctx),
        "each" => combinators::each(ctx),
        "fold" => combinators::fold(ctx),
        "foldi" => combinators::foldi(ctx),
        "filter" => combinators::filter(ctx),

        other => Err(Fault::new(format!("invoke: unknown native '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kokoki_core::NATIVE_TABLE;

    #[test]
    fn every_invoke_only_native_is_dispatched() {
        for entry in NATIVE_TABLE.iter().filter(|e| e.direct_opcode.is_none()) {
            let mut ctx = Context::new();
            let result = dispatch(entry.name, &mut ctx);
            assert!(
                !matches!(&result, Err(f) if f.0.contains("unknown native")),
                "native '{}' is missing from dispatch",
                entry.name
            );
        }
    }
}
