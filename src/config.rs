/// Construction-time parameters for a [`crate::graph::Dag`], mirroring the
/// keyword arguments `DAG.__init__` takes in the source workflow engine:
/// which rules/files to force, which to prioritise, and how to treat
/// producer ambiguity.
#[derive(Debug, Default, Clone)]
pub struct DagConfig<F> {
    /// Re-run every rule regardless of up-to-date status.
    pub forceall: bool,
    /// Force every target rule/file (but not their dependencies).
    pub forcetargets: bool,
    /// Rule names to force, by whatever key the caller's `Rule` impl
    /// resolves (passed through as rule indices once rules are loaded).
    pub forcerules: Vec<usize>,
    /// Files to force even if up-to-date.
    pub forcefiles: Vec<F>,
    /// Rules whose upstream jobs should be scheduled at highest priority.
    pub priorityrules: Vec<usize>,
    pub priorityfiles: Vec<F>,
    /// If set, ambiguous producers are resolved by taking the first
    /// candidate without raising `AmbiguousRule`.
    pub ignore_ambiguity: bool,
    /// Resolver recursion depth before giving up with `RecursionLimit`.
    pub recursion_limit: u32,
}

impl<F> DagConfig<F> {
    pub fn new() -> Self {
        DagConfig {
            forceall: false,
            forcetargets: false,
            forcerules: Vec::new(),
            forcefiles: Vec::new(),
            priorityrules: Vec::new(),
            priorityfiles: Vec::new(),
            ignore_ambiguity: false,
            recursion_limit: 1000,
        }
    }
}
