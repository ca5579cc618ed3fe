pub mod actor;
pub mod classify;
pub mod common;
pub mod sys;
