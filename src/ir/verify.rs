//! IR verifier.
//!
//! Construction-time APIs accept anything; this is where invariants are
//! enforced. The verifier never stops at the first problem — it walks the
//! whole module and accumulates every diagnostic, so one run shows the
//! complete damage.
//!
//! Checked invariants:
//! 1. operand types match each instruction's requirements
//! 2. SSA: single placement per instruction, every use reachable from its
//!    def, phi incoming blocks equal the predecessor set
//! 3. every block in a definition ends in exactly one terminator
//! 4. operand slots and use records form a bijection
//! 5. functions: argument list matches the signature, definitions have an
//!    entry block with no predecessors
//! 6. module-level name uniqueness
//!
//! Unreachable blocks are reported as warnings, not errors.

use super::arena::DenseBitSet;
use super::module::Module;
use super::types::TypeKind;
use super::value::{Use, ValueId, ValueKind};
use rustc_hash::{FxHashMap, FxHashSet};

// =============================================================================
// Report
// =============================================================================

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// One verifier finding.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

/// Everything the verifier found in one run.
#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    pub diagnostics: Vec<Diagnostic>,
}

impl VerifyReport {
    /// True when no errors were found (warnings do not fail a module).
    pub fn passed(&self) -> bool {
        !self
            .diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Error messages only.
    pub fn errors(&self) -> impl Iterator<Item = &str> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .map(|d| d.message.as_str())
    }

    fn error(&mut self, message: String) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Error,
            message,
        });
    }

    fn warning(&mut self, message: String) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            message,
        });
    }
}

/// Verify a whole module.
pub fn verify_module(m: &Module) -> VerifyReport {
    let mut report = VerifyReport::default();
    check_module_names(m, &mut report);
    for &f in m.functions() {
        check_function(m, f, &mut report);
    }
    report
}

// =============================================================================
// Module level
// =============================================================================

fn check_module_names(m: &Module, report: &mut VerifyReport) {
    let mut seen: FxHashSet<&str> = FxHashSet::default();
    for &f in m.functions() {
        let name = m.value(f).name.as_deref().unwrap_or("");
        if !seen.insert(name) {
            report.error(format!("duplicate function name '{}'", name));
        }
    }
    let mut seen: FxHashSet<&str> = FxHashSet::default();
    for &g in m.global_vars() {
        let name = m.value(g).name.as_deref().unwrap_or("");
        if !seen.insert(name) {
            report.error(format!("duplicate global name '{}'", name));
        }
    }
}

// =============================================================================
// Function level
// =============================================================================

fn fname(m: &Module, f: ValueId) -> String {
    m.value(f).name.clone().unwrap_or_else(|| format!("{:?}", f))
}

fn check_function(m: &Module, f: ValueId, report: &mut VerifyReport) {
    let data = m.func(f);
    let name = fname(m, f);

    let params = m.types.param_types(m.ty(f)).unwrap_or(&[]);
    if params.len() != data.args.len() {
        report.error(format!(
            "function '{}': {} arguments but signature has {} parameters",
            name,
            data.args.len(),
            params.len()
        ));
    } else {
        for (i, (&arg, &pty)) in data.args.iter().zip(params.iter()).enumerate() {
            if m.ty(arg) != pty {
                report.error(format!(
                    "function '{}': argument {} type mismatch",
                    name, i
                ));
            }
        }
    }

    if m.is_declaration(f) {
        return;
    }

    let entry = match m.entry_block(f) {
        Some(e) => e,
        None => {
            report.error(format!("function '{}': definition has no entry block", name));
            return;
        }
    };
    if !m.predecessors(entry).is_empty() {
        report.error(format!(
            "function '{}': entry block has predecessors",
            name
        ));
    }

    // Block structure and instruction placement.
    let mut placed: FxHashSet<ValueId> = FxHashSet::default();
    for &block in &data.blocks {
        check_block(m, f, block, &mut placed, report);
    }

    // Reachability: warn on dead blocks, and gate use-before-def checks.
    let reach = reachable_from(m, entry);
    for &block in &data.blocks {
        if !reach.contains(block.idx()) {
            report.warning(format!(
                "function '{}': block {:?} is unreachable",
                name, block
            ));
        }
    }

    // Per-instruction checks.
    let mut reach_cache: FxHashMap<ValueId, DenseBitSet> = FxHashMap::default();
    reach_cache.insert(entry, reach);
    for &block in &data.blocks {
        for inst in m.insts(block) {
            check_use_lists(m, inst, report);
            check_inst_types(m, f, inst, report);
            check_ssa_uses(m, inst, &mut reach_cache, report);
        }
    }
    // Blocks and arguments are values too; their use records must hold.
    for &block in &data.blocks {
        check_use_records(m, block, report);
    }
    for &arg in &data.args {
        check_use_records(m, arg, report);
    }
}

fn check_block(
    m: &Module,
    f: ValueId,
    block: ValueId,
    placed: &mut FxHashSet<ValueId>,
    report: &mut VerifyReport,
) {
    let name = fname(m, f);
    let mut saw_terminator = false;
    let mut last = ValueId::INVALID;

    for inst in m.insts(block) {
        if !placed.insert(inst) {
            report.error(format!(
                "function '{}': instruction {:?} placed more than once",
                name, inst
            ));
        }
        if m.inst(inst).block != block {
            report.error(format!(
                "function '{}': instruction {:?} has stale block link",
                name, inst
            ));
        }
        if saw_terminator {
            report.error(format!(
                "function '{}': block {:?} has instructions after its terminator",
                name, block
            ));
        }
        if m.kind(inst).is_terminator() {
            saw_terminator = true;
        }
        last = inst;
    }

    if !last.is_valid() || !m.kind(last).is_terminator() {
        report.error(format!(
            "function '{}': block {:?} has no terminator",
            name, block
        ));
    }
}

// =============================================================================
// Use lists
// =============================================================================

/// Slot → use direction: every valid operand has a matching use record.
fn check_use_lists(m: &Module, user: ValueId, report: &mut VerifyReport) {
    for (i, &op) in m.operands(user).iter().enumerate() {
        if !op.is_valid() {
            report.error(format!("{:?}: operand {} is null", user, i));
            continue;
        }
        let found = m
            .value(op)
            .uses
            .iter()
            .any(|u| u.user == user && u.index == i as u32);
        if !found {
            report.error(format!(
                "{:?}: operand {} has no matching use record on {:?}",
                user, i, op
            ));
        }
    }
    check_use_records(m, user, report);
}

/// Use → slot direction: every recorded use points at a slot holding us.
fn check_use_records(m: &Module, value: ValueId, report: &mut VerifyReport) {
    for &Use { user, index } in &m.value(value).uses {
        let ops = m.operands(user);
        if index as usize >= ops.len() || ops[index as usize] != value {
            report.error(format!(
                "{:?}: use record (user {:?}, index {}) does not match operand slot",
                value, user, index
            ));
        }
    }
}

// =============================================================================
// SSA
// =============================================================================

fn reachable_from(m: &Module, start: ValueId) -> DenseBitSet {
    let mut seen = DenseBitSet::new();
    let mut work = vec![start];
    seen.insert(start.idx());
    while let Some(b) = work.pop() {
        for succ in m.successors(b) {
            if seen.insert(succ.idx()) {
                work.push(succ);
            }
        }
    }
    seen
}

/// Every use of an instruction's result must sit in a block reachable from
/// the defining block; phi uses are checked against the incoming edge.
fn check_ssa_uses(
    m: &Module,
    inst: ValueId,
    reach_cache: &mut FxHashMap<ValueId, DenseBitSet>,
    report: &mut VerifyReport,
) {
    let def_block = match m.inst_block(inst) {
        Some(b) => b,
        None => return,
    };
    if m.value(inst).uses.is_empty() {
        return;
    }
    if !reach_cache.contains_key(&def_block) {
        let r = reachable_from(m, def_block);
        reach_cache.insert(def_block, r);
    }

    let uses = m.uses_of(inst);
    for u in uses {
        if !m.is_inst(u.user) {
            continue;
        }
        let use_block = if m.kind(u.user) == ValueKind::Phi {
            // The value must be available on the incoming edge: index of
            // the paired block operand is index + 1.
            let ops = m.operands(u.user);
            let bi = u.index as usize + 1;
            if bi < ops.len() && m.is_block(ops[bi]) {
                ops[bi]
            } else {
                continue;
            }
        } else {
            match m.inst_block(u.user) {
                Some(b) => b,
                None => continue,
            }
        };
        let reach = &reach_cache[&def_block];
        if !reach.contains(use_block.idx()) {
            report.error(format!(
                "{:?}: used in {:?} which is not reachable from its defining block {:?}",
                inst, u.user, use_block
            ));
        }
    }
}

// =============================================================================
// Types
// =============================================================================

fn check_inst_types(m: &Module, f: ValueId, inst: ValueId, report: &mut VerifyReport) {
    let kind = m.kind(inst);
    let ty = m.ty(inst);
    let ops = m.operands(inst);
    let any_null = ops.iter().any(|o| !o.is_valid());
    if any_null {
        // Already reported by the use-list check; type checks would only
        // cascade.
        return;
    }

    match kind {
        k if k.is_binary() => {
            if ops.len() != 2 {
                report.error(format!("{:?}: binary op needs 2 operands", inst));
                return;
            }
            let (l, r) = (m.ty(ops[0]), m.ty(ops[1]));
            if l != r || l != ty {
                report.error(format!("{:?}: binary operand/result type mismatch", inst));
            }
            let want_float = k.is_float_op();
            if want_float != m.types.is_float(l) {
                report.error(format!("{:?}: operand domain does not match opcode", inst));
            }
        }
        k if k.is_icmp() => {
            if !m.types.is_bool(ty) {
                report.error(format!("{:?}: comparison must produce i1", inst));
            }
            if ops.len() != 2 {
                report.error(format!("{:?}: icmp needs 2 operands", inst));
                return;
            }
            let (l, r) = (m.ty(ops[0]), m.ty(ops[1]));
            if l != r || !m.types.is_int(l) {
                report.error(format!("{:?}: icmp needs matching integer operands", inst));
            }
        }
        k if k.is_fcmp() => {
            if !m.types.is_bool(ty) {
                report.error(format!("{:?}: comparison must produce i1", inst));
            }
            if ops.len() != 2 {
                report.error(format!("{:?}: fcmp needs 2 operands", inst));
                return;
            }
            let (l, r) = (m.ty(ops[0]), m.ty(ops[1]));
            if l != r || !m.types.is_float(l) {
                report.error(format!("{:?}: fcmp needs matching float operands", inst));
            }
        }
        ValueKind::FNeg => {
            if ops.len() != 1 {
                report.error(format!("{:?}: fneg needs 1 operand", inst));
                return;
            }
            if m.ty(ops[0]) != ty || !m.types.is_float(ty) {
                report.error(format!("{:?}: fneg operand/result mismatch", inst));
            }
        }
        k if k.is_cast() => {
            if ops.len() != 1 {
                report.error(format!("{:?}: cast needs 1 operand", inst));
            }
        }
        ValueKind::Load => {
            if ops.len() != 1 {
                report.error(format!("{:?}: load needs 1 operand", inst));
                return;
            }
            match m.types.pointee(m.ty(ops[0])) {
                Some(p) if p == ty => {}
                _ => report.error(format!("{:?}: load type does not match pointer", inst)),
            }
        }
        ValueKind::Store => {
            if ops.len() != 2 {
                report.error(format!("{:?}: store needs 2 operands", inst));
                return;
            }
            match m.types.pointee(m.ty(ops[1])) {
                Some(p) if p == m.ty(ops[0]) => {}
                _ => report.error(format!("{:?}: store type does not match pointer", inst)),
            }
        }
        ValueKind::GetElementPtr => {
            if ops.len() != 2 {
                report.error(format!("{:?}: gep needs 2 operands", inst));
                return;
            }
            if !m.types.is_pointer(m.ty(ops[0])) {
                report.error(format!("{:?}: gep base is not a pointer", inst));
            }
            if !m.types.is_int(m.ty(ops[1])) {
                report.error(format!("{:?}: gep index is not an integer", inst));
            }
        }
        ValueKind::Memset => {
            if ops.len() != 3 {
                report.error(format!("{:?}: memset needs 3 operands", inst));
                return;
            }
            if !m.types.is_pointer(m.ty(ops[0])) {
                report.error(format!("{:?}: memset target is not a pointer", inst));
            }
        }
        ValueKind::Br => {
            if ops.len() != 1 || !m.is_block(ops[0]) {
                report.error(format!("{:?}: br target is not a block", inst));
            }
        }
        ValueKind::CondBr => {
            if ops.len() != 3 {
                report.error(format!("{:?}: conditional br needs 3 operands", inst));
            } else {
                if !m.types.is_bool(m.ty(ops[0])) {
                    report.error(format!("{:?}: branch condition is not i1", inst));
                }
                if !m.is_block(ops[1]) || !m.is_block(ops[2]) {
                    report.error(format!("{:?}: branch target is not a block", inst));
                }
            }
        }
        ValueKind::Ret => {
            let ret_ty = m.func_return_type(f);
            if m.types.is_void(ret_ty) {
                if !ops.is_empty() {
                    report.error(format!("{:?}: void function returns a value", inst));
                }
            } else if ops.len() != 1 || m.ty(ops[0]) != ret_ty {
                report.error(format!("{:?}: return value type mismatch", inst));
            }
        }
        ValueKind::Call => {
            if ops.is_empty() {
                report.error(format!("{:?}: call has no callee", inst));
                return;
            }
            let callee = ops[0];
            if m.kind(callee) != ValueKind::Function {
                report.error(format!("{:?}: callee is not a function", inst));
                return;
            }
            let params = m.types.param_types(m.ty(callee)).unwrap_or(&[]);
            let args = &ops[1..];
            if params.len() != args.len() {
                report.error(format!(
                    "{:?}: call passes {} arguments, callee takes {}",
                    inst,
                    args.len(),
                    params.len()
                ));
            } else {
                for (i, (&a, &p)) in args.iter().zip(params.iter()).enumerate() {
                    if m.ty(a) != p {
                        report.error(format!("{:?}: call argument {} type mismatch", inst, i));
                    }
                }
            }
        }
        ValueKind::Phi => check_phi(m, inst, report),
        ValueKind::Alloca => {
            let ok = matches!(
                m.types.kind(ty),
                TypeKind::Pointer { .. }
            );
            if !ok {
                report.error(format!("{:?}: alloca must produce a pointer", inst));
            }
        }
        _ => {}
    }
}

fn check_phi(m: &Module, phi: ValueId, report: &mut VerifyReport) {
    let ops = m.operands(phi);
    if ops.len() % 2 != 0 {
        report.error(format!("{:?}: phi operand list is not in pairs", phi));
        return;
    }
    let ty = m.ty(phi);
    let block = match m.inst_block(phi) {
        Some(b) => b,
        None => return,
    };

    let mut incoming: FxHashSet<ValueId> = FxHashSet::default();
    for pair in ops.chunks_exact(2) {
        let (v, b) = (pair[0], pair[1]);
        if !m.is_block(b) {
            report.error(format!("{:?}: phi incoming {:?} is not a block", phi, b));
            continue;
        }
        incoming.insert(b);
        if m.ty(v) != ty {
            report.error(format!("{:?}: phi incoming value type mismatch", phi));
        }
    }

    let preds: FxHashSet<ValueId> = m.predecessors(block).into_iter().collect();
    if incoming != preds {
        report.error(format!(
            "{:?}: phi incoming blocks do not match predecessors of {:?}",
            phi, block
        ));
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::super::builder::Builder;
    use super::*;

    fn empty_main() -> Module {
        let mut m = Module::new();
        let i32_ty = m.types.int32();
        let fn_ty = m.types.function(i32_ty, vec![]);
        let f = m.new_function(fn_ty, "main");
        let entry = m.new_entry_block(f);
        let zero = m.const_int(i32_ty, 0);
        let mut b = Builder::new(&mut m);
        b.set_pos_end(entry);
        b.make_return(Some(zero));
        m
    }

    #[test]
    fn test_empty_main_passes() {
        let m = empty_main();
        let report = verify_module(&m);
        assert!(report.passed(), "{:?}", report.diagnostics);
    }

    #[test]
    fn test_missing_terminator() {
        let mut m = Module::new();
        let i32_ty = m.types.int32();
        let fn_ty = m.types.function(i32_ty, vec![]);
        let f = m.new_function(fn_ty, "f");
        m.new_entry_block(f);

        let report = verify_module(&m);
        assert!(!report.passed());
        assert!(report.errors().any(|e| e.contains("no terminator")));
    }

    #[test]
    fn test_return_type_mismatch() {
        let mut m = Module::new();
        let i32_ty = m.types.int32();
        let f32_ty = m.types.float32();
        let fn_ty = m.types.function(i32_ty, vec![]);
        let f = m.new_function(fn_ty, "f");
        let entry = m.new_entry_block(f);
        let bad = m.const_float(f32_ty, 1.0);
        let mut b = Builder::new(&mut m);
        b.set_pos_end(entry);
        b.make_return(Some(bad));

        let report = verify_module(&m);
        assert!(report.errors().any(|e| e.contains("return value type")));
    }

    #[test]
    fn test_binary_type_mismatch() {
        let mut m = Module::new();
        let i32_ty = m.types.int32();
        let i64_ty = m.types.int64();
        let fn_ty = m.types.function(i32_ty, vec![]);
        let f = m.new_function(fn_ty, "f");
        let entry = m.new_entry_block(f);
        let a = m.const_int(i32_ty, 1);
        let b64 = m.const_int(i64_ty, 2);

        let mut b = Builder::new(&mut m);
        b.set_pos_end(entry);
        let bad = b.make_binary(ValueKind::Add, a, b64);
        b.make_return(Some(bad));

        let report = verify_module(&m);
        assert!(report.errors().any(|e| e.contains("binary operand")));
    }

    #[test]
    fn test_duplicate_function_names() {
        let mut m = Module::new();
        let i32_ty = m.types.int32();
        let fn_ty = m.types.function(i32_ty, vec![]);
        m.new_function(fn_ty, "f");
        m.new_function(fn_ty, "f");

        let report = verify_module(&m);
        assert!(report.errors().any(|e| e.contains("duplicate function")));
    }

    #[test]
    fn test_unreachable_block_warns() {
        let mut m = empty_main();
        let f = m.main_function().unwrap();
        let dead = m.new_block(f);
        let i32_ty = m.types.int32();
        let zero = m.const_int(i32_ty, 0);
        let mut b = Builder::new(&mut m);
        b.set_pos_end(dead);
        b.make_return(Some(zero));

        let report = verify_module(&m);
        assert!(report.passed());
        assert!(report
            .diagnostics
            .iter()
            .any(|d| d.severity == Severity::Warning && d.message.contains("unreachable")));
    }

    #[test]
    fn test_null_operand_rejected() {
        let mut m = empty_main();
        let f = m.main_function().unwrap();
        let entry = m.entry_block(f).unwrap();
        let i32_ty = m.types.int32();
        let user = m.new_orphan_inst(ValueKind::Add, i32_ty);
        let c = m.const_int(i32_ty, 1);
        m.add_operand(user, c);
        m.add_operand(user, c);
        let term = m.terminator(entry).unwrap();
        m.insert_inst_before(term, user);
        m.unuse_all(user);

        let report = verify_module(&m);
        assert!(report.errors().any(|e| e.contains("null")));
    }

    /// Build `kind` with the given operands and splice it in front of
    /// `main`'s terminator, the way a buggy pass would.
    fn plant_inst(
        m: &mut Module,
        kind: ValueKind,
        ty: crate::ir::types::TypeId,
        operands: &[ValueId],
    ) -> ValueId {
        let f = m.main_function().unwrap();
        let entry = m.entry_block(f).unwrap();
        let inst = m.new_orphan_inst(kind, ty);
        for &op in operands {
            m.add_operand(inst, op);
        }
        let term = m.terminator(entry).unwrap();
        m.insert_inst_before(term, inst);
        inst
    }

    #[test]
    fn test_icmp_wrong_arity() {
        let mut m = empty_main();
        let i32_ty = m.types.int32();
        let bool_ty = m.types.bool();
        let one = m.const_int(i32_ty, 1);
        plant_inst(&mut m, ValueKind::IcmpEq, bool_ty, &[one]);

        let report = verify_module(&m);
        assert!(report.errors().any(|e| e.contains("icmp needs 2 operands")));
    }

    #[test]
    fn test_fcmp_wrong_arity() {
        let mut m = empty_main();
        let f32_ty = m.types.float32();
        let bool_ty = m.types.bool();
        let x = m.const_float(f32_ty, 1.0);
        plant_inst(&mut m, ValueKind::FcmpOlt, bool_ty, &[x]);

        let report = verify_module(&m);
        assert!(report.errors().any(|e| e.contains("fcmp needs 2 operands")));
    }

    #[test]
    fn test_fneg_wrong_arity() {
        let mut m = empty_main();
        let f32_ty = m.types.float32();
        let x = m.const_float(f32_ty, 1.0);
        plant_inst(&mut m, ValueKind::FNeg, f32_ty, &[x, x]);

        let report = verify_module(&m);
        assert!(report.errors().any(|e| e.contains("fneg needs 1 operand")));
    }

    #[test]
    fn test_load_wrong_arity() {
        let mut m = empty_main();
        let i32_ty = m.types.int32();
        plant_inst(&mut m, ValueKind::Load, i32_ty, &[]);

        let report = verify_module(&m);
        assert!(report.errors().any(|e| e.contains("load needs 1 operand")));
    }

    #[test]
    fn test_store_wrong_arity() {
        let mut m = empty_main();
        let i32_ty = m.types.int32();
        let void_ty = m.types.void();
        let one = m.const_int(i32_ty, 1);
        plant_inst(&mut m, ValueKind::Store, void_ty, &[one]);

        let report = verify_module(&m);
        assert!(report.errors().any(|e| e.contains("store needs 2 operands")));
    }

    #[test]
    fn test_gep_wrong_arity() {
        let mut m = empty_main();
        let i32_ty = m.types.int32();
        let ptr_ty = m.types.pointer_to(i32_ty);
        let init = m.const_int(i32_ty, 0);
        let g = m.new_global(i32_ty, "g", vec![init], false);
        plant_inst(&mut m, ValueKind::GetElementPtr, ptr_ty, &[g]);

        let report = verify_module(&m);
        assert!(report.errors().any(|e| e.contains("gep needs 2 operands")));
    }

    #[test]
    fn test_memset_wrong_arity() {
        let mut m = empty_main();
        let i32_ty = m.types.int32();
        let void_ty = m.types.void();
        let init = m.const_int(i32_ty, 0);
        let g = m.new_global(i32_ty, "g", vec![init], false);
        let byte = m.const_int(i32_ty, 0);
        plant_inst(&mut m, ValueKind::Memset, void_ty, &[g, byte]);

        let report = verify_module(&m);
        assert!(report.errors().any(|e| e.contains("memset needs 3 operands")));
    }

    #[test]
    fn test_phi_pred_mismatch() {
        let mut m = Module::new();
        let i32_ty = m.types.int32();
        let fn_ty = m.types.function(i32_ty, vec![]);
        let f = m.new_function(fn_ty, "f");
        let entry = m.new_entry_block(f);
        let join = m.new_block(f);
        let one = m.const_int(i32_ty, 1);

        let mut b = Builder::new(&mut m);
        b.set_pos_end(entry);
        b.make_br(join);
        b.set_pos_end(join);
        // Claims an incoming edge from `join` itself, which is not a pred.
        let phi = b.make_phi(i32_ty, &[(one, join)]);
        b.make_return(Some(phi));

        let report = verify_module(&m);
        assert!(report
            .errors()
            .any(|e| e.contains("do not match predecessors")));
    }
}
