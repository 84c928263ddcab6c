/// Errors raised while resolving, expanding, or checking the build DAG.
///
/// Each variant carries enough context (offending rule and/or file) to be
/// reported directly to the user; source locations are folded into the rule
/// name when available (see [`crate::rule::Rule::lineno`]).
#[derive(Debug, thiserror::Error)]
pub enum DagError {
    /// No rule matches this filename.
    #[error("no rule produces '{file}'")]
    MissingRule { file: String },

    /// A job's inputs cannot be produced nor found on disk.
    #[error("rule '{rule}' is missing input file(s): {}", .files.join(", "))]
    MissingInput {
        rule: String,
        files: Vec<String>,
        causes: Vec<DagError>,
    },

    /// Two producers tie under the job ordering and `ignore_ambiguity` is
    /// off.
    #[error("ambiguous rule for '{file}': both '{rule_a}' and '{rule_b}' can produce it")]
    AmbiguousRule {
        file: String,
        rule_a: String,
        rule_b: String,
    },

    /// Expanding a producer revisits a job already on the current
    /// resolution path, or every candidate for a file cycles.
    #[error("cyclic dependency: rule '{rule}' (transitively) depends on its own output '{file}'")]
    Cyclic { rule: String, file: String },

    /// After a job finished, a declared output is not on disk.
    #[error("rule '{rule}' did not produce declared output file '{file}'")]
    MissingOutput { rule: String, file: String },

    /// Resolver recursion overflowed.
    #[error(
        "recursion limit exceeded while resolving '{file}' via rule '{rule}'; \
         check for an infinitely expanding wildcard"
    )]
    RecursionLimit { file: String, rule: String },

    /// Aggregate of per-targetfile [`DagError::MissingRule`] errors collected
    /// during `init`.
    #[error("failed to resolve {} target file(s)", .0.len())]
    Combined(Vec<(String, DagError)>),
}
