//! # Geograph Doctor
//!
//! Staged integrity checking over the geograph kernel. One run loads every
//! source document, validates schema, references and topology, scores the
//! catalog, and writes a JSON and a text report. Optional side outputs are
//! a score explanation, a graph-edge export, a repaired proximity snapshot
//! and a cluster split suggestion.

pub mod doctor;
pub mod export;
pub mod report;

pub use doctor::{
    DEFAULT_REPORT_DIR, DoctorError, DoctorOptions, DoctorRun, REPORT_JSON_FILE,
    REPORT_TEXT_FILE, Stage, run_doctor,
};
pub use export::{Explanation, GraphEdge, GraphExport, GraphNode, explain, graph_export};
pub use report::{
    DOCTOR_REPORT_KIND, DOCTOR_REPORT_SCHEMA, DoctorReport, FileState, FileStatus,
    HistogramBucket, ReportCounts, ReportIssues, ReportMode, SnapshotSummary,
};
