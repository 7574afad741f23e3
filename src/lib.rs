//! shelllab-sync: a resumable, concurrent mirror of the Turtle WoW database.
//!
//! For each entity kind (NPCs, items, spells, quests) the engine walks the
//! remote ID space, fetches every ID through a bounded worker pool, merges
//! the result into a local SQLite database without clobbering hand-curated
//! fields, and records a gap-free cursor so an interrupted run resumes
//! exactly where it stopped.
//!
//! The entry point is [`sync::SyncCoordinator`].

#![warn(clippy::all)]

pub mod fetch;
pub mod merge;
pub mod record;
pub mod retry;
pub mod state;
pub mod sync;
pub mod types;
