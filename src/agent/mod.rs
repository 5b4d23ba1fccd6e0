//! Agent module - the reason/act loop that writes the blog document.
//!
//! The agent alternates between two states:
//! 1. `reason`: pick a tool call or produce the final document
//! 2. `act`: run the tool and record the observation
//!
//! It stops when the model produces a valid document, or is forced to
//! finish once the step or iteration limit is reached.

mod agent_loop;
mod expand;
mod parse;
mod prompt;
mod state;

pub use agent_loop::{Agent, AgentLimits};
pub use expand::{enforce_length, min_words, LENGTH_TOLERANCE};
pub use parse::{parse_model_output, ParseError};
pub use prompt::{scratchpad, truncate_observation};
pub use state::{AgentAction, AgentOutcome, AgentState, Finish, Step};
