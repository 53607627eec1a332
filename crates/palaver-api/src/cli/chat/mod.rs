//! Interactive CLI chat.
//!
//! Streams replies as they are assembled, supports slash commands, and
//! cancels an in-flight reply on Ctrl-C. Entry point: `loop_runner::run_chat_loop`.

pub mod banner;
pub mod commands;
pub mod input;
pub mod loop_runner;
pub mod renderer;
