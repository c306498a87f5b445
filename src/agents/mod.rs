//! Agent personas for multi-agent discussions and sequential analysis.

mod persona;

pub use persona::{analysis_team, moderator, select_participants, AgentPersona};
