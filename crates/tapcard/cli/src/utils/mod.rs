//! Helpers shared by the tapcard commands

pub mod listener;
pub mod reader;
pub mod session;
