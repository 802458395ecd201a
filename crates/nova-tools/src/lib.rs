// SPDX-License-Identifier: Apache-2.0
//! `Tool` contract, registry, the built-in hybrid-recall tools, and
//! multi-instance aggregation (§4.5, §4.6).

pub mod aggregation;
pub mod conversation_get;
pub mod conversation_search;
pub mod discovery;
mod error;
pub mod registry;
pub mod tool;

pub use aggregation::{group_for_aggregation, resolve_selector, selector_prompt_block, AggregatedInstance, AggregationSpec, SelectorResolution};
pub use conversation_get::ConversationGetTool;
pub use discovery::{order_for_discovery, ToolBinding, ToolOwner};
pub use conversation_search::ConversationSearchTool;
pub use error::ToolError;
pub use registry::ToolRegistry;
pub use tool::{OutputCategory, Tool, ToolCall, ToolOutput};
