//! Domain entity modules.

pub mod action;
pub mod client;
pub mod message;
pub mod project;
pub mod setting;
pub mod task;
pub mod transition;
