//! Data types shared by the classifier and the event stream.

pub mod event;
pub mod span;
