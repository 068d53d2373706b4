pub mod filter;
pub mod group;
pub mod job;

pub use filter::{JobOrder, Match, Predicate, PredicateValue, SortDirection};
pub use group::JobGroup;
pub use job::{JobRecord, JobState};
