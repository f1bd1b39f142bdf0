//! orgtask-core: Text model, ordering and update protocol for org task lists.
//!
//! This crate provides:
//! - `Entry`: One task parsed from an org fragment, keeping its exact text
//! - Line, drawer and checkbox editors that splice text without reformatting
//! - `parse_document`: Splitting a multi-task document with dense renumbering
//! - `reorder_task`: Priority moves that rewrite only the affected tasks
//! - `TaskUpdate`: The tagged intents clients send, and `apply_update`
//! - `Collection`: The id-keyed, hash-versioned set both sides of a sync hold

pub mod checkbox;
pub mod date;
pub mod drawer;
pub mod entry;
pub mod error;
pub mod hash;
pub mod lines;
pub mod parser;
pub mod reorder;
pub mod update;
pub mod wire;

pub use checkbox::{
    checkbox_status, checkbox_text, make_list_item, set_checkbox_status, CheckboxStatus,
};
pub use date::{format_datetime, is_valid_date, parse_date_input, parse_datetime};
pub use entry::{new_id, Entry, TodoStatus, ID_PROPERTY, PRIORITY_PROPERTY};
pub use error::{CoreError, Result};
pub use hash::{hash_text, ContentHasher, Sha256Hasher};
pub use lines::Lines;
pub use parser::{join_fragments, parse_document, renumber_priorities, split_fragments};
pub use reorder::{back_priority, front_priority, reorder_task, swap_priorities, PriorityOp};
pub use update::{apply_update, TaskUpdate};
pub use wire::{
    now_millis, Collection, Mutation, Resolution, TasksResponse, UpsertOutcome, WireEntry,
    WireEntrySummary,
};
