// JSON wire format: `{className: {attributes: {...}, children: [...]}}`.

mod emit;
mod ingest;

pub use emit::{emit, emit_relation};
pub use ingest::{IngestOptions, IngestReport, ingest, ingest_flat, Item};

/// Tag wrapper class on the wire.
pub const TAG_CLASS: &str = "tagInst";

/// Attributes the controller maintains itself; dropped in config-only mode.
pub const RUNTIME_ATTRIBUTES: &[&str] = &[
    "childAction",
    "configIssues",
    "configSt",
    "extMngdBy",
    "lcOwn",
    "modTs",
    "monPolDn",
    "pcTag",
    "seg",
    "triggerSt",
    "txId",
    "uid",
    "userdom",
];

/// Attributes never stored on an object; they are derived from the graph.
pub(crate) const DERIVED_ATTRIBUTES: &[&str] = &["dn", "rn", "status"];
