//! Timeless Client SDK.
//!
//! This crate provides a client library for backends to interact with the
//! timeless API.
//!
//! # Example
//!
//! ```no_run
//! use timeless_client::{TimelessClient, ToolDispatchRequest};
//! use timeless_core::ToolFamily;
//!
//! # async fn example() -> Result<(), timeless_client::ClientError> {
//! let client = TimelessClient::new(
//!     "http://timeless.generation.svc:8080",
//!     "your-service-api-key",
//! );
//!
//! // Provision a profile on signup
//! let profile = client.create_profile("user-uuid", None).await?;
//! println!("Provisioned with {} credits", profile.credits);
//!
//! // Dispatch a tool on behalf of a signed-in user
//! let response = client
//!     .dispatch_tool(
//!         "user-jwt",
//!         ToolFamily::Image,
//!         ToolDispatchRequest {
//!             tool: "upscale".to_string(),
//!             image_url: Some("https://cdn.example/in.png".to_string()),
//!             ..ToolDispatchRequest::default()
//!         },
//!     )
//!     .await?;
//! println!("Used {} credits", response.credits_used);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod client;
mod error;
mod types;

pub use client::{ClientOptions, TimelessClient};
pub use error::ClientError;
pub use types::*;
