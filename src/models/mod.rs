// src/models/mod.rs
//! Domain entities for one news-to-short production.

pub mod binary;
pub mod task;
pub mod workflow;

pub use binary::{sniff_image_mime, BinaryRef};
pub use task::{TaskState, TaskStatus, Ticket};
pub use workflow::{
    IdeationOption, NewsItem, ReferenceCandidate, ReferenceOrigin, ScriptPackage, Segment,
    SelectedReference, Stage, WorkflowAggregate,
};
