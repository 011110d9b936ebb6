//! Human-readable module dump.
//!
//! The format is LLVM-flavored but not a dialect of it; it exists for
//! debugging and test assertions. Printing never mutates the module:
//! unnamed values get position-derived placeholder names computed on the
//! fly, so two consecutive dumps of the same module are byte-equal.

use super::module::Module;
use super::value::{ConstData, ValueData, ValueId, ValueKind};
use rustc_hash::FxHashMap;
use std::fmt::Write;

type NameMap = FxHashMap<ValueId, String>;

impl Module {
    /// Render the whole module.
    pub fn dump(&self) -> String {
        let mut out = String::new();

        for &g in &self.globals {
            self.print_global(&mut out, g);
        }
        if !self.globals.is_empty() {
            out.push('\n');
        }

        let mut first = true;
        for &f in &self.funcs {
            if !first {
                out.push('\n');
            }
            first = false;
            self.print_function(&mut out, f);
        }
        out
    }

    /// Render one function.
    pub fn dump_function(&self, func: ValueId) -> String {
        let mut out = String::new();
        self.print_function(&mut out, func);
        out
    }

    fn print_global(&self, out: &mut String, g: ValueId) {
        let data = self.global(g);
        let storage = if data.is_const { "constant" } else { "global" };
        let name = self.value(g).name.as_deref().unwrap_or("?");
        let base = self.types.display(data.base);

        if data.init.len() == 1 && !self.types.kind(data.base).is_array() {
            let init = self.const_text(data.init[0]);
            let _ = writeln!(out, "@{} = {} {} {}", name, storage, base, init);
        } else {
            let elems: Vec<String> = data
                .init
                .iter()
                .map(|&c| {
                    format!(
                        "{} {}",
                        self.types.display(self.ty(c)),
                        self.const_text(c)
                    )
                })
                .collect();
            let _ = writeln!(
                out,
                "@{} = {} {} [{}]",
                name,
                storage,
                base,
                elems.join(", ")
            );
        }
    }

    fn print_function(&self, out: &mut String, func: ValueId) {
        let data = self.func(func);
        let fn_ty = self.ty(func);
        let ret = self
            .types
            .return_type(fn_ty)
            .unwrap_or_else(|| self.types.undef());
        let fname = self.value(func).name.as_deref().unwrap_or("?");

        let names = self.local_names(func);
        let params: Vec<String> = data
            .args
            .iter()
            .map(|&a| format!("{} %{}", self.types.display(self.ty(a)), names[&a]))
            .collect();

        if self.is_declaration(func) {
            let _ = writeln!(
                out,
                "declare {} @{}({})",
                self.types.display(ret),
                fname,
                params.join(", ")
            );
            return;
        }

        if !data.attrs.is_empty() {
            let attrs: Vec<&str> = data.attrs.iter_names().map(|(n, _)| n).collect();
            let _ = writeln!(out, "; attrs: {}", attrs.join(" | "));
        }

        let _ = writeln!(
            out,
            "define {} @{}({}) {{",
            self.types.display(ret),
            fname,
            params.join(", ")
        );

        let mut first = true;
        for &block in &data.blocks {
            if !first {
                out.push('\n');
            }
            first = false;
            let _ = writeln!(out, "{}:", names[&block]);
            for inst in self.insts(block) {
                out.push_str("  ");
                self.print_inst(out, inst, &names);
                out.push('\n');
            }
        }
        out.push_str("}\n");
    }

    // =========================================================================
    // Names and references
    // =========================================================================

    /// Placeholder names for everything local to `func`. Existing names
    /// win; unnamed values get position-derived ones.
    fn local_names(&self, func: ValueId) -> NameMap {
        let mut names = NameMap::default();
        let data = self.func(func);

        for (i, &arg) in data.args.iter().enumerate() {
            let name = match &self.value(arg).name {
                Some(n) => n.clone(),
                None => format!("a{}", i),
            };
            names.insert(arg, name);
        }

        let mut var_n = 0u32;
        for (bi, &block) in data.blocks.iter().enumerate() {
            let bname = match &self.value(block).name {
                Some(n) => n.clone(),
                None => format!("bb{}", bi),
            };
            names.insert(block, bname);
            for inst in self.insts(block) {
                if self.types.is_void(self.ty(inst)) {
                    continue;
                }
                let name = match &self.value(inst).name {
                    Some(n) => n.clone(),
                    None => format!("t{}", var_n),
                };
                var_n += 1;
                names.insert(inst, name);
            }
        }
        names
    }

    fn const_text(&self, c: ValueId) -> String {
        match self.const_data(c) {
            Some(ConstData::Bool(b)) => b.to_string(),
            Some(ConstData::Int(v)) => v.to_string(),
            Some(ConstData::Float(bits)) => format!("{:?}", f64::from_bits(bits)),
            Some(ConstData::Undef) => "undef".into(),
            None => "?".into(),
        }
    }

    /// A bare reference: `%t0`, `5`, `@f`, `%bb1`.
    fn value_ref(&self, v: ValueId, names: &NameMap) -> String {
        match &self.value(v).data {
            ValueData::Constant(_) => self.const_text(v),
            ValueData::Global(_) | ValueData::Function(_) => {
                format!("@{}", self.value(v).name.as_deref().unwrap_or("?"))
            }
            _ => match names.get(&v) {
                Some(n) => format!("%{}", n),
                None => format!("%{}", v.raw()),
            },
        }
    }

    /// A typed reference: `i32 %t0`, `label %bb1`.
    fn typed_ref(&self, v: ValueId, names: &NameMap) -> String {
        if self.kind(v) == ValueKind::Block {
            return format!("label {}", self.value_ref(v, names));
        }
        format!(
            "{} {}",
            self.types.display(self.ty(v)),
            self.value_ref(v, names)
        )
    }

    // =========================================================================
    // Instructions
    // =========================================================================

    fn print_inst(&self, out: &mut String, inst: ValueId, names: &NameMap) {
        let kind = self.kind(inst);
        let ty = self.ty(inst);

        if !self.types.is_void(ty) {
            let _ = write!(out, "{} = ", self.value_ref(inst, names));
        }

        match kind {
            ValueKind::Ret => {
                if self.value(inst).operands.is_empty() {
                    out.push_str("ret void");
                } else {
                    let _ = write!(out, "ret {}", self.typed_ref(self.operand(inst, 0), names));
                }
            }
            ValueKind::Br => {
                let _ = write!(out, "br {}", self.typed_ref(self.operand(inst, 0), names));
            }
            ValueKind::CondBr => {
                let _ = write!(
                    out,
                    "br {}, {}, {}",
                    self.typed_ref(self.operand(inst, 0), names),
                    self.typed_ref(self.operand(inst, 1), names),
                    self.typed_ref(self.operand(inst, 2), names)
                );
            }
            ValueKind::Alloca => {
                let pointee = match self.inst(inst).extra {
                    super::inst::InstExtra::Alloca { pointee, .. } => pointee,
                    _ => self.types.undef(),
                };
                let _ = write!(out, "alloca {}", self.types.display(pointee));
            }
            ValueKind::Load => {
                let ptr = self.operand(inst, 0);
                let _ = write!(
                    out,
                    "load {}, {}",
                    self.types.display(ty),
                    self.typed_ref(ptr, names)
                );
            }
            ValueKind::Store => {
                let _ = write!(
                    out,
                    "store {}, {}",
                    self.typed_ref(self.operand(inst, 0), names),
                    self.typed_ref(self.operand(inst, 1), names)
                );
            }
            ValueKind::GetElementPtr => {
                let base_ty = match &self.inst(inst).extra {
                    super::inst::InstExtra::Gep { base_ty, .. } => *base_ty,
                    _ => self.types.undef(),
                };
                let _ = write!(
                    out,
                    "getelementptr {}, {}, {}",
                    self.types.display(base_ty),
                    self.typed_ref(self.operand(inst, 0), names),
                    self.typed_ref(self.operand(inst, 1), names)
                );
            }
            ValueKind::Memset => {
                let _ = write!(
                    out,
                    "memset {}, {}, {}",
                    self.typed_ref(self.operand(inst, 0), names),
                    self.typed_ref(self.operand(inst, 1), names),
                    self.typed_ref(self.operand(inst, 2), names)
                );
            }
            ValueKind::Call => {
                let callee = self.callee_of(inst);
                let args: Vec<String> = self
                    .call_args(inst)
                    .iter()
                    .map(|&a| self.typed_ref(a, names))
                    .collect();
                let _ = write!(
                    out,
                    "call {} {}({})",
                    self.types.display(ty),
                    self.value_ref(callee, names),
                    args.join(", ")
                );
            }
            ValueKind::Phi => {
                let pairs: Vec<String> = self
                    .phi_incoming(inst)
                    .iter()
                    .map(|&(v, b)| {
                        format!("[ {}, {} ]", self.value_ref(v, names), self.value_ref(b, names))
                    })
                    .collect();
                let _ = write!(out, "phi {} {}", self.types.display(ty), pairs.join(", "));
            }
            k if k.is_cmp() => {
                let lhs = self.operand(inst, 0);
                let _ = write!(
                    out,
                    "{} {} {}, {}",
                    k.mnemonic(),
                    self.types.display(self.ty(lhs)),
                    self.value_ref(lhs, names),
                    self.value_ref(self.operand(inst, 1), names)
                );
            }
            k if k.is_binary() => {
                let _ = write!(
                    out,
                    "{} {} {}, {}",
                    k.mnemonic(),
                    self.types.display(ty),
                    self.value_ref(self.operand(inst, 0), names),
                    self.value_ref(self.operand(inst, 1), names)
                );
            }
            ValueKind::FNeg => {
                let _ = write!(
                    out,
                    "fneg {}",
                    self.typed_ref(self.operand(inst, 0), names)
                );
            }
            k if k.is_cast() => {
                let _ = write!(
                    out,
                    "{} {} to {}",
                    k.mnemonic(),
                    self.typed_ref(self.operand(inst, 0), names),
                    self.types.display(ty)
                );
            }
            _ => {
                let _ = write!(out, "{} <?>", kind.mnemonic());
            }
        }

        if let Some(comment) = &self.value(inst).comment {
            let _ = write!(out, " ; {}", comment);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::super::builder::Builder;
    use super::*;

    fn sample() -> Module {
        let mut m = Module::new();
        let i32_ty = m.types.int32();
        let c5 = m.const_int(i32_ty, 5);
        m.new_global(i32_ty, "g", vec![c5], false);

        let fn_ty = m.types.function(i32_ty, vec![i32_ty]);
        let f = m.new_function(fn_ty, "twice");
        let arg = m.add_arg(f, i32_ty, None);
        let entry = m.new_entry_block(f);

        let mut b = Builder::new(&mut m);
        b.set_pos_end(entry);
        let sum = b.make_binary(ValueKind::Add, arg, arg);
        b.make_return(Some(sum));
        m
    }

    #[test]
    fn test_dump_shape() {
        let m = sample();
        let text = m.dump();
        assert!(text.contains("@g = global i32 5"));
        assert!(text.contains("define i32 @twice(i32 %a0) {"));
        assert!(text.contains("%t0 = add i32 %a0, %a0"));
        assert!(text.contains("ret i32 %t0"));
    }

    #[test]
    fn test_dump_deterministic() {
        let m = sample();
        assert_eq!(m.dump(), m.dump());
    }

    #[test]
    fn test_declaration_dump() {
        let mut m = Module::new();
        let i32_ty = m.types.int32();
        let fn_ty = m.types.function(i32_ty, vec![]);
        m.new_function(fn_ty, "getint");
        assert!(m.dump().contains("declare i32 @getint()"));
    }
}
