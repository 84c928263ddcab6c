use anyhow::Context;
use bpaf::Bpaf;
use dagcore::{Dag, DagConfig, IoFile, NeverIncomplete, Rule, Wildcards};
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

/// Run a small built-in two-rule build (a "compile" rule producing one file
/// from a source, and a phony "all" that depends on it) to exercise the DAG
/// core end to end.
#[derive(Bpaf)]
#[bpaf(options)]
struct Opts {
    /// Print the resolved graph as Graphviz DOT instead of running it
    #[bpaf(long)]
    dot: bool,
    /// Directory to build in (created if missing)
    #[bpaf(long, argument("PATH"), fallback(default_workspace()))]
    workspace: PathBuf,
}

fn default_workspace() -> PathBuf {
    std::env::temp_dir().join("dagcore-demo")
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct DemoFile(PathBuf);

impl fmt::Display for DemoFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl IoFile for DemoFile {
    fn exists(&self) -> bool {
        self.0.exists()
    }

    fn mtime(&self) -> Option<SystemTime> {
        self.0.metadata().ok()?.modified().ok()
    }

    fn protect(&self) -> anyhow::Result<()> {
        let mut perms = self.0.metadata()?.permissions();
        perms.set_readonly(true);
        std::fs::set_permissions(&self.0, perms)
            .with_context(|| format!("protecting {}", self.0.display()))
    }

    fn remove(&self) -> anyhow::Result<()> {
        match std::fs::remove_file(&self.0) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing {}", self.0.display())),
        }
    }
}

#[derive(Debug, Clone)]
struct DemoRule {
    name: &'static str,
    order: u32,
    inputs: Vec<PathBuf>,
    outputs: Vec<PathBuf>,
}

impl Rule for DemoRule {
    type File = DemoFile;

    fn name(&self) -> &str {
        self.name
    }

    fn definition_order(&self) -> u32 {
        self.order
    }

    fn is_producer(&self, file: &DemoFile) -> bool {
        self.outputs.contains(&file.0)
    }

    fn wildcards_for(&self, file: &DemoFile) -> Option<Wildcards> {
        self.is_producer(file).then(Wildcards::new)
    }

    fn expand_input(&self, _wildcards: &Wildcards) -> Vec<DemoFile> {
        self.inputs.iter().cloned().map(DemoFile).collect()
    }

    fn expand_output(&self, _wildcards: &Wildcards) -> Vec<DemoFile> {
        self.outputs.iter().cloned().map(DemoFile).collect()
    }

    fn dynamic_branch_output(&self, _dynamic_wildcards: &Wildcards) -> (Self, Wildcards) {
        (self.clone(), Wildcards::new())
    }

    fn dynamic_branch_input(&self, _dynamic_wildcards: &Wildcards) -> Option<Self> {
        None
    }
}

fn main() -> anyhow::Result<()> {
    let opts = opts().run();
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    std::fs::create_dir_all(opts.workspace.join("src"))?;
    std::fs::create_dir_all(opts.workspace.join("build"))?;
    let source = opts.workspace.join("src/input.txt");
    if !source.exists() {
        std::fs::write(&source, "demo input\n")?;
    }

    let compile = DemoRule {
        name: "compile",
        order: 0,
        inputs: vec![source.clone()],
        outputs: vec![opts.workspace.join("build/output.bin")],
    };
    let all = DemoRule {
        name: "all",
        order: 1,
        inputs: vec![opts.workspace.join("build/output.bin")],
        outputs: vec![],
    };

    let mut dag = Dag::new(
        vec![compile, all],
        vec![1],
        vec![],
        DagConfig::new(),
        NeverIncomplete,
    );
    dag.init()?;

    if opts.dot {
        println!("{}", dag.dot(true));
        return Ok(());
    }

    loop {
        let ready: Vec<_> = dag.ready_jobs().collect();
        if ready.is_empty() {
            break;
        }
        for job in ready {
            let rule_name = dag.rule(dag.job(job).rule).name().to_owned();
            info!(rule = %rule_name, "running");
            for file in dag.job(job).output.clone() {
                std::fs::write(&file.0, format!("built by {rule_name}\n"))?;
            }
            dag.check_output(job, Duration::from_millis(200))?;
            dag.handle_protected(job);
            let producers = dag.producers(job);
            dag.finish(job, true)?;
            for producer in producers {
                dag.handle_temp(producer);
            }
        }
    }

    info!(remaining = dag.len(), "build complete");
    Ok(())
}
