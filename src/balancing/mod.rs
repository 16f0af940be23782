pub mod counter;
pub mod policies;
pub mod registry;
