// SPDX-License-Identifier: Apache-2.0
//! Multi-instance aggregation (§4.6): when several tool instances of the
//! same subtype are bound to one agent (e.g. two CalDAV accounts), they are
//! folded into a single function surface disambiguated by a selector field
//! rather than exposed as separate tools the model has to pick between.

use std::sync::Arc;

use crate::tool::Tool;

#[derive(Debug, Clone)]
pub struct AggregationSpec {
    pub subtype: String,
    pub selector_field: String,
    pub min_instances: usize,
}

#[derive(Clone)]
pub struct AggregatedInstance {
    pub selector_value: String,
    pub tool: Arc<dyn Tool>,
}

impl std::fmt::Debug for AggregatedInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregatedInstance")
            .field("selector_value", &self.selector_value)
            .field("tool", &self.tool.name())
            .finish()
    }
}

pub enum SelectorResolution {
    Missing { available: Vec<String> },
    Resolved(Arc<dyn Tool>),
    Ambiguous { candidates: Vec<String> },
}

impl std::fmt::Debug for SelectorResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing { available } => {
                f.debug_struct("Missing").field("available", available).finish()
            }
            Self::Resolved(tool) => f.debug_tuple("Resolved").field(&tool.name()).finish(),
            Self::Ambiguous { candidates } => {
                f.debug_struct("Ambiguous").field("candidates", candidates).finish()
            }
        }
    }
}

/// Groups instances by subtype and returns only the groups that meet
/// `spec.min_instances` — singleton subtypes are exposed directly, not
/// wrapped in a selector.
pub fn group_for_aggregation<'a>(
    spec: &AggregationSpec,
    instances: &'a [AggregatedInstance],
) -> Option<&'a [AggregatedInstance]> {
    if instances.len() >= spec.min_instances {
        Some(instances)
    } else {
        None
    }
}

pub fn resolve_selector(instances: &[AggregatedInstance], selector: Option<&str>) -> SelectorResolution {
    match selector {
        None => SelectorResolution::Missing {
            available: instances.iter().map(|i| i.selector_value.clone()).collect(),
        },
        Some(value) => {
            let matches: Vec<&AggregatedInstance> =
                instances.iter().filter(|i| i.selector_value == value).collect();
            match matches.as_slice() {
                [] => SelectorResolution::Missing {
                    available: instances.iter().map(|i| i.selector_value.clone()).collect(),
                },
                [one] => SelectorResolution::Resolved(one.tool.clone()),
                many => SelectorResolution::Ambiguous {
                    candidates: many.iter().map(|i| i.selector_value.clone()).collect(),
                },
            }
        }
    }
}

/// System-prompt instruction block enumerating the available selectors for
/// an aggregated subtype, appended to the agent's system prompt.
pub fn selector_prompt_block(spec: &AggregationSpec, instances: &[AggregatedInstance]) -> String {
    let options = instances
        .iter()
        .map(|i| i.selector_value.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Multiple {} accounts are configured. Pass `{}` with one of: {}.",
        spec.subtype, spec.selector_field, options
    )
}
