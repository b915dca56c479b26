//! Core types for the Timeless generation service.
//!
//! This crate provides the foundational types used throughout the platform:
//!
//! - **Identifiers**: `UserId`, `GenerationId`, `TransactionId`, `BatchId`, `TicketId`
//! - **Profiles**: `Profile`, `SubscriptionStatus`
//! - **Credits**: `CreditTransaction`, `TransactionType`
//! - **Generations**: `Generation`, `GenerationStatus`, `JobOutcome`, `BatchStatus`
//! - **Tickets**: `SupportTicket`, `TicketStatus`
//! - **Tools**: the table-driven tool catalog (`ToolSpec`, `lookup_tool`)
//!
//! # Credits
//!
//! **1 credit = the unit debited per tool invocation.**
//!
//! - `upscale` costs 3 credits, `lip-sync` costs 20
//! - Subscribed users are not debited; their generations record `credits_used = 0`
//! - Stored as `i64` so refund arithmetic never leaves the integer domain

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod credits;
pub mod generation;
pub mod ids;
pub mod profile;
pub mod ticket;
pub mod tools;

pub use credits::{CreditTransaction, TransactionType};
pub use generation::{
    BatchStatus, Generation, GenerationKind, GenerationStatus, JobOutcome,
};
pub use ids::{BatchId, GenerationId, IdError, TicketId, TransactionId, UserId};
pub use profile::{Profile, SubscriptionStatus};
pub use ticket::{SupportTicket, TicketStatus};
pub use tools::{
    lookup_tool, lookup_tool_by_name, DispatchMode, Provider, ToolFamily, ToolSpec,
    DEFAULT_TOOL_COST, TOOLS,
};
