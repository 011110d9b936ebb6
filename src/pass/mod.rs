//! Pass framework.
//!
//! A pass has a stable name, a unit kind (module / function / basic
//! block), and a `run` that receives the unit and the analysis cache.
//! The manager keeps a name registry; `run_passes` takes an ordered list
//! of names and dispatches each by kind — module passes run once,
//! function passes iterate non-declaration functions in module order,
//! block passes iterate every block of every such function.
//!
//! Unknown names are a hard error. Passes that mutate the CFG or call
//! structure must notify the [`AnalysisManager`]; the framework cannot
//! detect a missed notification.
//!
//! With `verify_after_each` set, the verifier runs after every pass and
//! a failure is returned with the offending pass's name — the debug hook
//! for "a pass that produces invalid IR is the pass's bug".

use crate::analysis::AnalysisManager;
use crate::ir::module::Module;
use crate::ir::value::ValueId;
use crate::ir::verify::verify_module;
use rustc_hash::FxHashMap;

// =============================================================================
// Errors
// =============================================================================

/// Pass-manager failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassError {
    /// A requested pass name is not registered.
    UnknownPass(String),
    /// A pass left the module in a state the verifier rejects
    /// (only with `verify_after_each`).
    VerifyFailed { pass: String, first_error: String },
}

impl std::fmt::Display for PassError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PassError::UnknownPass(name) => write!(f, "unknown pass '{}'", name),
            PassError::VerifyFailed { pass, first_error } => {
                write!(f, "pass '{}' produced invalid IR: {}", pass, first_error)
            }
        }
    }
}

impl std::error::Error for PassError {}

pub type PassResult<T> = Result<T, PassError>;

// =============================================================================
// Pass traits
// =============================================================================

/// A pass over the whole module.
pub trait ModulePass {
    fn name(&self) -> &'static str;
    fn run(&mut self, module: &mut Module, am: &mut AnalysisManager);
}

/// A pass over one function; invoked per non-declaration function.
pub trait FunctionPass {
    fn name(&self) -> &'static str;
    fn run(&mut self, module: &mut Module, func: ValueId, am: &mut AnalysisManager);
}

/// A pass over one basic block; invoked per block per function.
pub trait BlockPass {
    fn name(&self) -> &'static str;
    fn run(&mut self, module: &mut Module, func: ValueId, block: ValueId, am: &mut AnalysisManager);
}

/// A registered pass of any unit kind.
pub enum AnyPass {
    Module(Box<dyn ModulePass>),
    Function(Box<dyn FunctionPass>),
    Block(Box<dyn BlockPass>),
}

impl AnyPass {
    fn name(&self) -> &'static str {
        match self {
            AnyPass::Module(p) => p.name(),
            AnyPass::Function(p) => p.name(),
            AnyPass::Block(p) => p.name(),
        }
    }
}

// =============================================================================
// Pass manager
// =============================================================================

/// Name registry plus dispatch.
#[derive(Default)]
pub struct PassManager {
    registry: FxHashMap<&'static str, AnyPass>,
    /// Run the verifier after every pass; debug-build hook.
    pub verify_after_each: bool,
}

impl PassManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module pass under its own name.
    pub fn register_module_pass<P: ModulePass + 'static>(&mut self, pass: P) {
        self.registry.insert(pass.name(), AnyPass::Module(Box::new(pass)));
    }

    /// Register a function pass under its own name.
    pub fn register_function_pass<P: FunctionPass + 'static>(&mut self, pass: P) {
        self.registry.insert(pass.name(), AnyPass::Function(Box::new(pass)));
    }

    /// Register a block pass under its own name.
    pub fn register_block_pass<P: BlockPass + 'static>(&mut self, pass: P) {
        self.registry.insert(pass.name(), AnyPass::Block(Box::new(pass)));
    }

    /// Whether a pass name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.registry.contains_key(name)
    }

    /// Run the named passes in order.
    pub fn run_passes(
        &mut self,
        module: &mut Module,
        am: &mut AnalysisManager,
        names: &[&str],
    ) -> PassResult<()> {
        // Reject unknown names before running anything.
        for &name in names {
            if !self.registry.contains_key(name) {
                return Err(PassError::UnknownPass(name.to_string()));
            }
        }

        for &name in names {
            let pass = self.registry.get_mut(name).expect("checked above");
            Self::dispatch(pass, module, am);

            if self.verify_after_each {
                let report = verify_module(module);
                if !report.passed() {
                    let first = report.errors().next().unwrap_or("").to_string();
                    return Err(PassError::VerifyFailed {
                        pass: pass.name().to_string(),
                        first_error: first,
                    });
                }
            }
        }
        Ok(())
    }

    fn dispatch(pass: &mut AnyPass, module: &mut Module, am: &mut AnalysisManager) {
        match pass {
            AnyPass::Module(p) => p.run(module, am),
            AnyPass::Function(p) => {
                let funcs: Vec<ValueId> = module
                    .functions()
                    .iter()
                    .copied()
                    .filter(|&f| !module.is_declaration(f))
                    .collect();
                for f in funcs {
                    p.run(module, f, am);
                }
            }
            AnyPass::Block(p) => {
                let funcs: Vec<ValueId> = module
                    .functions()
                    .iter()
                    .copied()
                    .filter(|&f| !module.is_declaration(f))
                    .collect();
                for f in funcs {
                    let blocks = module.func(f).blocks.clone();
                    for b in blocks {
                        p.run(module, f, b, am);
                    }
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::Builder;
    use crate::ir::value::ValueKind;

    fn two_function_module() -> Module {
        let mut m = Module::new();
        let i32_ty = m.types.int32();
        let fn_ty = m.types.function(i32_ty, vec![]);

        // One declaration, two definitions.
        m.new_function(fn_ty, "getint");
        for name in ["f", "main"] {
            let f = m.new_function(fn_ty, name);
            let entry = m.new_entry_block(f);
            let zero = m.const_int(i32_ty, 0);
            let mut b = Builder::new(&mut m);
            b.set_pos_end(entry);
            b.make_return(Some(zero));
        }
        m
    }

    struct CountFunctions {
        seen: std::rc::Rc<std::cell::RefCell<Vec<String>>>,
    }

    impl FunctionPass for CountFunctions {
        fn name(&self) -> &'static str {
            "count-functions"
        }
        fn run(&mut self, module: &mut Module, func: ValueId, _am: &mut AnalysisManager) {
            let name = module.value(func).name.clone().unwrap_or_default();
            self.seen.borrow_mut().push(name);
        }
    }

    struct CountBlocks {
        count: std::rc::Rc<std::cell::Cell<usize>>,
    }

    impl BlockPass for CountBlocks {
        fn name(&self) -> &'static str {
            "count-blocks"
        }
        fn run(
            &mut self,
            _module: &mut Module,
            _func: ValueId,
            _block: ValueId,
            _am: &mut AnalysisManager,
        ) {
            self.count.set(self.count.get() + 1);
        }
    }

    #[test]
    fn test_function_pass_skips_declarations() {
        let mut m = two_function_module();
        let mut am = AnalysisManager::new();
        let mut pm = PassManager::new();

        let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        pm.register_function_pass(CountFunctions { seen: seen.clone() });
        pm.run_passes(&mut m, &mut am, &["count-functions"]).unwrap();

        // Module order, declaration excluded.
        assert_eq!(*seen.borrow(), vec!["f".to_string(), "main".to_string()]);
    }

    #[test]
    fn test_block_pass_visits_all_blocks() {
        let mut m = two_function_module();
        let mut am = AnalysisManager::new();
        let mut pm = PassManager::new();

        let count = std::rc::Rc::new(std::cell::Cell::new(0));
        pm.register_block_pass(CountBlocks { count: count.clone() });
        pm.run_passes(&mut m, &mut am, &["count-blocks"]).unwrap();
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn test_unknown_pass_is_hard_error() {
        let mut m = two_function_module();
        let mut am = AnalysisManager::new();
        let mut pm = PassManager::new();

        let err = pm
            .run_passes(&mut m, &mut am, &["no-such-pass"])
            .unwrap_err();
        assert_eq!(err, PassError::UnknownPass("no-such-pass".to_string()));
    }

    struct BreakTerminator;

    impl FunctionPass for BreakTerminator {
        fn name(&self) -> &'static str {
            "break-terminator"
        }
        fn run(&mut self, module: &mut Module, func: ValueId, _am: &mut AnalysisManager) {
            let entry = module.entry_block(func).unwrap();
            let term = module.terminator(entry).unwrap();
            module.detach_inst(term);
        }
    }

    #[test]
    fn test_verify_hook_catches_bad_pass() {
        let mut m = two_function_module();
        let mut am = AnalysisManager::new();
        let mut pm = PassManager::new();
        pm.verify_after_each = true;
        pm.register_function_pass(BreakTerminator);

        let err = pm
            .run_passes(&mut m, &mut am, &["break-terminator"])
            .unwrap_err();
        match err {
            PassError::VerifyFailed { pass, .. } => assert_eq!(pass, "break-terminator"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    struct StrengthReduce;

    impl BlockPass for StrengthReduce {
        fn name(&self) -> &'static str {
            "mul2-to-add"
        }
        fn run(
            &mut self,
            module: &mut Module,
            _func: ValueId,
            block: ValueId,
            _am: &mut AnalysisManager,
        ) {
            // mul x, 2  =>  add x, x
            let insts: Vec<ValueId> = module.insts(block).collect();
            for inst in insts {
                if module.kind(inst) != ValueKind::Mul {
                    continue;
                }
                let (lhs, rhs) = (module.operand(inst, 0), module.operand(inst, 1));
                let is_two = module
                    .const_data(rhs)
                    .and_then(|c| c.as_int())
                    .map(|v| v == 2)
                    .unwrap_or(false);
                if !is_two {
                    continue;
                }
                let add = module.new_orphan_inst(ValueKind::Add, module.ty(inst));
                module.add_operand(add, lhs);
                module.add_operand(add, lhs);
                module.insert_inst_before(inst, add);
                module.replace_all_uses_with(inst, add);
                module.unuse_all(inst);
                module.detach_inst(inst);
            }
        }
    }

    #[test]
    fn test_mutating_block_pass() {
        let mut m = Module::new();
        let i32_ty = m.types.int32();
        let fn_ty = m.types.function(i32_ty, vec![i32_ty]);
        let f = m.new_function(fn_ty, "double");
        let x = m.add_arg(f, i32_ty, None);
        let entry = m.new_entry_block(f);
        let two = m.const_int(i32_ty, 2);
        let mut b = Builder::new(&mut m);
        b.set_pos_end(entry);
        let mul = b.make_binary(ValueKind::Mul, x, two);
        b.make_return(Some(mul));

        let mut am = AnalysisManager::new();
        let mut pm = PassManager::new();
        pm.verify_after_each = true;
        pm.register_block_pass(StrengthReduce);
        pm.run_passes(&mut m, &mut am, &["mul2-to-add"]).unwrap();

        let insts: Vec<ValueId> = m.insts(entry).collect();
        assert_eq!(insts.len(), 2);
        assert_eq!(m.kind(insts[0]), ValueKind::Add);
        assert_eq!(m.num_uses(mul), 0);
    }
}
