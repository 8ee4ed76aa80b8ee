//! HTTP surface for wavetap-ap
//!
//! A thin transport over the command router:
//! - `GET /health`
//! - `POST /api/v1/command/:method` with a JSON object of named arguments
//! - `GET /api/v1/events` (SSE stream of session events)

pub mod commands;
pub mod handlers;
pub mod server;
pub mod sse;

pub use commands::{CommandArgs, CommandReply, CommandRouter};
pub use server::{create_router, AppContext};
