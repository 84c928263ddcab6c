use crate::{file::IoFile, wildcards::Wildcards};
use std::fmt;

/// A named template producing output files from input files.
///
/// The rule language itself (pattern syntax, wildcard matching) is an
/// external collaborator; this trait is the seam the DAG core uses to ask a
/// rule everything it needs to resolve, expand, and re-expand jobs.
pub trait Rule: fmt::Debug + Sized {
    type File: IoFile;

    fn name(&self) -> &str;

    /// Source location, for diagnostics. `None` if not applicable (e.g. a
    /// rule synthesized by dynamic re-expansion).
    fn lineno(&self) -> Option<u32> {
        None
    }
    fn snakefile(&self) -> Option<&str> {
        None
    }

    /// Higher values are scheduled first by [`crate::ready::update_priority`].
    fn priority_class(&self) -> i64 {
        0
    }

    /// Order in which the rule was declared. Used to break ties between
    /// candidates of otherwise-equal specificity; earlier-declared rules win.
    fn definition_order(&self) -> u32 {
        0
    }

    /// Whether a concrete filename matches one of this rule's output
    /// patterns.
    fn is_producer(&self, file: &Self::File) -> bool;

    /// The wildcard values implied by matching `file` against this rule's
    /// output pattern(s). `None` if the rule does not in fact match (should
    /// not happen if `is_producer` returned true for the same file).
    fn wildcards_for(&self, file: &Self::File) -> Option<Wildcards>;

    /// Concrete input files for a given wildcard binding, in declaration
    /// order.
    fn expand_input(&self, wildcards: &Wildcards) -> Vec<Self::File>;

    /// Concrete output files for a given wildcard binding.
    fn expand_output(&self, wildcards: &Wildcards) -> Vec<Self::File>;

    /// The subset of `expand_input` whose wildcard values are not known
    /// until a producing job with dynamic output has run.
    fn dynamic_input_files(&self, _wildcards: &Wildcards) -> Vec<Self::File> {
        Vec::new()
    }

    /// The subset of `expand_output` whose wildcard values are only
    /// discoverable after this job runs.
    fn dynamic_output_files(&self, _wildcards: &Wildcards) -> Vec<Self::File> {
        Vec::new()
    }

    /// Outputs to delete once no unfinished consumer still needs them.
    fn temp_output_files(&self, _wildcards: &Wildcards) -> Vec<Self::File> {
        Vec::new()
    }

    /// Outputs to write-protect after production.
    fn protected_output_files(&self, _wildcards: &Wildcards) -> Vec<Self::File> {
        Vec::new()
    }

    /// Concretise this rule's *output* wildcards given bindings discovered
    /// after the job ran (`input = false` in the snakemake source). Returns
    /// the concretised rule plus the wildcards that remain to be bound for
    /// the job itself (the non-dynamic ones).
    fn dynamic_branch_output(&self, dynamic_wildcards: &Wildcards) -> (Self, Wildcards);

    /// Concretise this rule's *input* wildcards given bindings discovered on
    /// a producer's completion (`input = true`, the default, in the
    /// snakemake source). `None` if this rule doesn't actually depend on the
    /// discovered wildcards.
    fn dynamic_branch_input(&self, dynamic_wildcards: &Wildcards) -> Option<Self>;

    /// After a job with dynamic output has run, the concrete wildcard
    /// bindings actually produced on disk (one map per produced file, each
    /// binding at least this rule's dynamic wildcard names). Discovering
    /// these requires globbing the filesystem against the dynamic output
    /// pattern, which only the rule-language collaborator knows how to do.
    /// Empty if nothing was produced (or this rule has no dynamic output).
    fn discover_dynamic_wildcards(&self, _wildcards: &Wildcards) -> Vec<Wildcards> {
        Vec::new()
    }
}
