/// Hands out fresh temporary names and label prefixes for one compilation
/// run. Every pass that introduces new names borrows the same allocator so
/// that names never collide across passes.
#[derive(Debug, Default)]
pub struct OptimizationResourceAllocator {
    next_cse_hoisting_temporary: usize,
    next_inlining_prefix: usize,
}

impl OptimizationResourceAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate_cse_hoisting_temporary(&mut self) -> String {
        let name = format!("_CSE_HOISTING_{}_", self.next_cse_hoisting_temporary);
        self.next_cse_hoisting_temporary += 1;
        name
    }

    /// Returns the `(label prefix, temporary prefix)` pair for one inlined
    /// call site.
    pub fn allocate_inlining_prefixes(&mut self) -> (String, String) {
        let id = self.next_inlining_prefix;
        self.next_inlining_prefix += 1;

        (
            format!("_INLINING_{id}_LABEL_"),
            format!("_INLINING_{id}_TEMP_"),
        )
    }
}
