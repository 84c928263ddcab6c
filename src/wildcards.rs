use std::collections::BTreeMap;

/// A wildcard binding: named holes in a file pattern, bound by matching a
/// concrete target filename. Ordered so that two bindings with the same
/// entries always compare and hash equal regardless of insertion order.
pub type Wildcards = BTreeMap<String, String>;
