//! Per-control stores composed into every control kind

mod actions;
mod feedbacks;

pub use actions::FragmentActions;
pub use feedbacks::FragmentFeedbacks;
