use crate::{config::DagConfig, error::DagError, file::IoFile, graph::Dag, persistence::NeverIncomplete, rule::Rule, wildcards::Wildcards};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// An in-memory filesystem standing in for the real one, so tests don't
/// touch disk. `clock` is a logical counter used as a file's mtime: later
/// writes get a strictly greater value.
#[derive(Default)]
struct FakeFs {
    files: HashMap<String, u64>,
    clock: u64,
}

impl FakeFs {
    fn write(&mut self, name: &str) {
        self.clock += 1;
        self.files.insert(name.to_string(), self.clock);
    }
}

type SharedFs = Rc<RefCell<FakeFs>>;

#[derive(Clone)]
struct TestFile {
    fs: SharedFs,
    name: String,
}

impl TestFile {
    fn new(fs: &SharedFs, name: &str) -> Self {
        TestFile {
            fs: Rc::clone(fs),
            name: name.to_string(),
        }
    }

    fn write(&self) {
        self.fs.borrow_mut().write(&self.name);
    }
}

impl fmt::Debug for TestFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TestFile({})", self.name)
    }
}
impl fmt::Display for TestFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
impl PartialEq for TestFile {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}
impl Eq for TestFile {}
impl std::hash::Hash for TestFile {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}
impl PartialOrd for TestFile {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for TestFile {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name.cmp(&other.name)
    }
}

impl IoFile for TestFile {
    fn exists(&self) -> bool {
        self.fs.borrow().files.contains_key(&self.name)
    }

    fn mtime(&self) -> Option<SystemTime> {
        self.fs
            .borrow()
            .files
            .get(&self.name)
            .map(|&t| UNIX_EPOCH + Duration::from_secs(t))
    }

    fn protect(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn remove(&self) -> anyhow::Result<()> {
        self.fs.borrow_mut().files.remove(&self.name);
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct TestRule {
    name: &'static str,
    order: u32,
    priority_class: i64,
    inputs: Vec<String>,
    outputs: Vec<String>,
    temp_outputs: Vec<String>,
}

impl TestRule {
    fn new(name: &'static str, order: u32, inputs: &[&str], outputs: &[&str]) -> Self {
        TestRule {
            name,
            order,
            priority_class: 0,
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            temp_outputs: Vec::new(),
        }
    }

    fn with_temp(mut self, temp: &[&str]) -> Self {
        self.temp_outputs = temp.iter().map(|s| s.to_string()).collect();
        self
    }

    fn with_priority_class(mut self, p: i64) -> Self {
        self.priority_class = p;
        self
    }
}

impl Rule for TestRule {
    type File = TestFile;

    fn name(&self) -> &str {
        self.name
    }

    fn definition_order(&self) -> u32 {
        self.order
    }

    fn priority_class(&self) -> i64 {
        self.priority_class
    }

    fn is_producer(&self, file: &TestFile) -> bool {
        self.outputs.iter().any(|o| *o == file.name)
    }

    fn wildcards_for(&self, file: &TestFile) -> Option<Wildcards> {
        self.is_producer(file).then(Wildcards::new)
    }

    fn expand_input(&self, _wildcards: &Wildcards) -> Vec<TestFile> {
        // `TestRule` has no filesystem handle of its own; `BoundRule` below
        // is the `Rule` impl actually used to build a `Dag` in these tests.
        Vec::new()
    }

    fn expand_output(&self, _wildcards: &Wildcards) -> Vec<TestFile> {
        Vec::new()
    }

    fn temp_output_files(&self, _wildcards: &Wildcards) -> Vec<TestFile> {
        Vec::new()
    }

    fn dynamic_branch_output(&self, _dynamic_wildcards: &Wildcards) -> (Self, Wildcards) {
        (self.clone(), Wildcards::new())
    }

    fn dynamic_branch_input(&self, _dynamic_wildcards: &Wildcards) -> Option<Self> {
        None
    }
}

// `TestRule::expand_input`/`expand_output` can't carry a filesystem handle
// (the trait method takes `&self` only), so jobs are built through a small
// wrapper that closes over the shared `FakeFs` instead of through the raw
// `TestRule` the fixture's public API implies. This mirrors how a real rule
// language would close over its own file-resolution context.
#[derive(Debug, Clone)]
struct BoundRule {
    rule: TestRule,
    fs: SharedFs,
}

impl Rule for BoundRule {
    type File = TestFile;

    fn name(&self) -> &str {
        self.rule.name()
    }
    fn definition_order(&self) -> u32 {
        self.rule.definition_order()
    }
    fn priority_class(&self) -> i64 {
        self.rule.priority_class()
    }
    fn is_producer(&self, file: &TestFile) -> bool {
        self.rule.is_producer(file)
    }
    fn wildcards_for(&self, file: &TestFile) -> Option<Wildcards> {
        self.rule.wildcards_for(file)
    }
    fn expand_input(&self, _wildcards: &Wildcards) -> Vec<TestFile> {
        self.rule.inputs.iter().map(|n| TestFile::new(&self.fs, n)).collect()
    }
    fn expand_output(&self, _wildcards: &Wildcards) -> Vec<TestFile> {
        self.rule.outputs.iter().map(|n| TestFile::new(&self.fs, n)).collect()
    }
    fn temp_output_files(&self, _wildcards: &Wildcards) -> Vec<TestFile> {
        self.rule
            .temp_outputs
            .iter()
            .map(|n| TestFile::new(&self.fs, n))
            .collect()
    }
    fn dynamic_branch_output(&self, dynamic_wildcards: &Wildcards) -> (Self, Wildcards) {
        let (rule, wc) = self.rule.dynamic_branch_output(dynamic_wildcards);
        (BoundRule { rule, fs: Rc::clone(&self.fs) }, wc)
    }
    fn dynamic_branch_input(&self, dynamic_wildcards: &Wildcards) -> Option<Self> {
        self.rule
            .dynamic_branch_input(dynamic_wildcards)
            .map(|rule| BoundRule { rule, fs: Rc::clone(&self.fs) })
    }
}

fn bind(fs: &SharedFs, rules: Vec<TestRule>) -> Vec<BoundRule> {
    rules
        .into_iter()
        .map(|rule| BoundRule { rule, fs: Rc::clone(fs) })
        .collect()
}

type TestDag = Dag<BoundRule, NeverIncomplete>;

fn new_dag(fs: &SharedFs, rules: Vec<TestRule>, targetfiles: &[&str]) -> TestDag {
    let targetfiles = targetfiles.iter().map(|n| TestFile::new(fs, n)).collect();
    Dag::new(bind(fs, rules), vec![], targetfiles, DagConfig::new(), NeverIncomplete)
}

fn fs() -> SharedFs {
    Rc::new(RefCell::new(FakeFs::default()))
}

#[test]
fn linear_chain_resolves_and_needs_run_when_source_is_missing_output() {
    let fs = fs();
    let rules = vec![
        TestRule::new("compile", 0, &["main.c"], &["main.o"]),
        TestRule::new("link", 1, &["main.o"], &["main"]),
    ];
    fs.borrow_mut().write("main.c");
    let mut dag = new_dag(&fs, rules, &["main"]);
    dag.init().unwrap();

    assert_eq!(dag.jobs().len(), 2);
    assert_eq!(dag.len(), 2, "neither output exists yet, both must run");
    let ready: Vec<_> = dag.ready_jobs().collect();
    assert_eq!(ready.len(), 1);
    assert_eq!(dag.rule(dag.job(ready[0]).rule).name(), "compile");
}

#[test]
fn up_to_date_output_does_not_need_to_run() {
    let fs = fs();
    let rules = vec![TestRule::new("compile", 0, &["main.c"], &["main.o"])];
    fs.borrow_mut().write("main.c");
    fs.borrow_mut().write("main.o");
    let mut dag = new_dag(&fs, rules, &["main.o"]);
    dag.init().unwrap();

    assert!(dag.is_empty(), "output newer than source, nothing to run");
}

#[test]
fn stale_output_triggers_rerun() {
    let fs = fs();
    let rules = vec![TestRule::new("compile", 0, &["main.c"], &["main.o"])];
    fs.borrow_mut().write("main.o");
    fs.borrow_mut().write("main.c"); // source written after output: stale
    let mut dag = new_dag(&fs, rules, &["main.o"]);
    dag.init().unwrap();

    assert_eq!(dag.len(), 1);
}

#[test]
fn missing_input_with_no_producer_is_an_error() {
    let fs = fs();
    let rules = vec![TestRule::new("link", 0, &["main.o"], &["main"])];
    let mut dag = new_dag(&fs, rules, &["main"]);
    let err = dag.init().unwrap_err();
    match err {
        DagError::Combined(failures) => {
            assert_eq!(failures.len(), 1);
            assert!(matches!(failures[0].1, DagError::MissingInput { .. }));
        }
        other => panic!("expected Combined(MissingInput), got {other:?}"),
    }
}

#[test]
fn two_equally_preferred_producers_are_ambiguous() {
    let fs = fs();
    // Same declaration order and priority class: a genuine tie, not merely
    // "declared later".
    let rules = vec![
        TestRule::new("rule_a", 0, &[], &["out"]),
        TestRule::new("rule_b", 0, &[], &["out"]),
    ];
    let mut dag = new_dag(&fs, rules, &["out"]);
    let err = dag.init().unwrap_err();
    match err {
        DagError::Combined(failures) => {
            assert!(matches!(failures[0].1, DagError::AmbiguousRule { .. }));
        }
        other => panic!("expected Combined(AmbiguousRule), got {other:?}"),
    }
}

#[test]
fn earlier_declared_rule_wins_over_a_later_one() {
    let fs = fs();
    let rules = vec![
        TestRule::new("preferred", 0, &[], &["out"]),
        TestRule::new("fallback", 1, &[], &["out"]),
    ];
    let mut dag = new_dag(&fs, rules, &["out"]);
    dag.init().unwrap();
    let job = dag.target_jobs().next().unwrap();
    assert_eq!(dag.rule(dag.job(job).rule).name(), "preferred");
}

#[test]
fn higher_priority_class_wins_regardless_of_declaration_order() {
    let fs = fs();
    let rules = vec![
        TestRule::new("declared_first", 0, &[], &["out"]),
        TestRule::new("higher_priority", 1, &[], &["out"]).with_priority_class(10),
    ];
    let mut dag = new_dag(&fs, rules, &["out"]);
    dag.init().unwrap();
    let job = dag.target_jobs().next().unwrap();
    assert_eq!(dag.rule(dag.job(job).rule).name(), "higher_priority");
}

#[test]
fn self_referential_rule_is_cyclic() {
    let fs = fs();
    let rules = vec![TestRule::new("loopy", 0, &["out"], &["out"])];
    let mut dag = new_dag(&fs, rules, &["out"]);
    let err = dag.init().unwrap_err();
    match err {
        DagError::Combined(failures) => {
            assert!(matches!(failures[0].1, DagError::Cyclic { .. }));
        }
        other => panic!("expected Combined(Cyclic), got {other:?}"),
    }
}

#[test]
fn finish_drives_the_ready_frontier_forward() {
    let fs = fs();
    let rules = vec![
        TestRule::new("compile", 0, &["main.c"], &["main.o"]),
        TestRule::new("link", 1, &["main.o"], &["main"]),
    ];
    fs.borrow_mut().write("main.c");
    let mut dag = new_dag(&fs, rules, &["main"]);
    dag.init().unwrap();

    let ready: Vec<_> = dag.ready_jobs().collect();
    assert_eq!(ready.len(), 1);
    let compile_job = ready[0];
    assert_eq!(dag.rule(dag.job(compile_job).rule).name(), "compile");

    for file in dag.job(compile_job).output.clone() {
        file.write();
    }
    dag.finish(compile_job, true).unwrap();

    let ready: Vec<_> = dag.ready_jobs().collect();
    assert_eq!(ready.len(), 1);
    assert_eq!(dag.rule(dag.job(ready[0]).rule).name(), "link");
}

#[test]
fn temp_output_is_removed_once_every_consumer_has_run() {
    let fs = fs();
    let rules = vec![
        TestRule::new("compile", 0, &["main.c"], &["main.o"]).with_temp(&["main.o"]),
        TestRule::new("link", 1, &["main.o"], &["main"]),
    ];
    fs.borrow_mut().write("main.c");
    let mut dag = new_dag(&fs, rules, &["main"]);
    dag.init().unwrap();

    let compile_job = dag.ready_jobs().next().unwrap();
    let obj = TestFile::new(&fs, "main.o");
    obj.write();
    dag.finish(compile_job, true).unwrap();
    assert!(obj.exists(), "link hasn't run yet, temp must survive");

    let link_job = dag.ready_jobs().next().unwrap();
    for file in dag.job(link_job).output.clone() {
        file.write();
    }
    dag.finish(link_job, true).unwrap();
    dag.handle_temp(compile_job);
    assert!(!obj.exists(), "last consumer finished, temp must be swept");
}

#[test]
fn postprocess_is_idempotent_without_intervening_changes() {
    let fs = fs();
    let rules = vec![TestRule::new("compile", 0, &["main.c"], &["main.o"])];
    fs.borrow_mut().write("main.c");
    let mut dag = new_dag(&fs, rules, &["main.o"]);
    dag.init().unwrap();

    let before: Vec<_> = dag.needrun_jobs();
    dag.postprocess();
    let after: Vec<_> = dag.needrun_jobs();
    assert_eq!(before, after);
}

#[test]
fn forced_rule_reruns_even_though_output_is_up_to_date() {
    let fs = fs();
    let rules = vec![TestRule::new("compile", 0, &["main.c"], &["main.o"])];
    fs.borrow_mut().write("main.c");
    fs.borrow_mut().write("main.o");
    let mut config = DagConfig::new();
    config.forceall = true;
    let targetfiles = vec![TestFile::new(&fs, "main.o")];
    let mut dag = Dag::new(bind(&fs, rules), vec![], targetfiles, config, NeverIncomplete);
    dag.init().unwrap();

    assert_eq!(dag.len(), 1);
    assert!(dag.reason(dag.target_jobs().next().unwrap()).forced);
}

#[test]
fn default_dynamic_discovery_is_a_no_op() {
    // A rule that declares no dynamic output never triggers re-expansion;
    // `update_dynamic` must be a harmless no-op in that case.
    let fs = fs();
    let rules = vec![TestRule::new("compile", 0, &["main.c"], &["main.o"])];
    fs.borrow_mut().write("main.c");
    let mut dag = new_dag(&fs, rules, &["main.o"]);
    dag.init().unwrap();
    let job = dag.ready_jobs().next().unwrap();
    for file in dag.job(job).output.clone() {
        file.write();
    }
    dag.finish(job, true).unwrap();
    assert!(dag.is_empty());
}
