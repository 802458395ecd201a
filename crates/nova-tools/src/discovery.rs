// SPDX-License-Identifier: Apache-2.0
//! Tool discovery ordering (§4.6): "user discovery preference: user-owned
//! first, then system, then (for credential-requiring tools) only if a
//! credential row with any populated field exists for that user."

use nova_store::entities::ToolCredential;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolOwner {
    User,
    System,
}

#[derive(Debug, Clone)]
pub struct ToolBinding {
    pub tool_ref: String,
    pub owner: ToolOwner,
    pub requires_credential: bool,
}

/// Orders `bindings` user-owned first, then system, dropping any
/// credential-requiring binding for which `credentials` has no row with
/// `has_any_field`. Ties within a tier keep their input order.
pub fn order_for_discovery(bindings: &[ToolBinding], credentials: &[ToolCredential]) -> Vec<ToolBinding> {
    let has_credential = |tool_ref: &str| credentials.iter().any(|c| c.tool_ref == tool_ref && c.has_any_field);

    let eligible = bindings.iter().filter(|b| !b.requires_credential || has_credential(&b.tool_ref));

    let mut user_owned: Vec<ToolBinding> = Vec::new();
    let mut system: Vec<ToolBinding> = Vec::new();
    for binding in eligible.cloned() {
        match binding.owner {
            ToolOwner::User => user_owned.push(binding),
            ToolOwner::System => system.push(binding),
        }
    }

    user_owned.extend(system);
    user_owned
}
