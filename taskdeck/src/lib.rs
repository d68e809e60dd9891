//! `TaskDeck`: synchronized tasks, habits and a Pomodoro timer.
//!
//! The stores keep per-user collections consistent with a remote document
//! store that pushes full snapshots; views are pure functions over those
//! collections. Device-local state (timer, theme) lives in [`storage`].

pub mod cli;
pub mod config;
pub mod habits;
pub mod identity;
pub mod pomodoro;
pub mod remote;
pub mod storage;
pub mod sync;
pub mod tasks;
pub mod theme;
