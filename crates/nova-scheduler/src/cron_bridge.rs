// SPDX-License-Identifier: Apache-2.0
//! Cron binding (§4.7): "On save, if and only if schedule-defining fields
//! changed, create/update the external scheduler binding... On delete,
//! remove the binding." The bridge tracks one `cron::Schedule` per active
//! cron-triggered TaskDefinition and reports which are due at a given
//! instant; it does not itself run a background loop — the caller (the
//! worker's tick) decides the polling cadence.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use nova_store::entities::{TaskDefinition, TaskDefinitionId, TriggerKind};

struct Binding {
    schedule: cron::Schedule,
    tz: chrono_tz::Tz,
    last_fired: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct CronBridge {
    bindings: Mutex<HashMap<TaskDefinitionId, Binding>>,
}

/// `cron` expects a leading seconds field; task definitions store plain
/// 5-field unix-cron expressions (§8 invariant 8 depends on that shape).
fn to_six_field(expr: &str) -> String {
    format!("0 {expr}")
}

impl CronBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// (Re)creates the binding for a cron-triggered, active definition;
    /// removes any binding for everything else. Idempotent, so callers can
    /// invoke it unconditionally on every save rather than diffing fields
    /// themselves.
    pub fn sync(&self, def: &TaskDefinition) -> anyhow::Result<()> {
        if def.trigger != TriggerKind::Cron || !def.is_active {
            self.remove(def.id);
            return Ok(());
        }
        let expr = def
            .cron_expression
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("cron task definition {} has no cron_expression", def.id))?;
        let schedule = cron::Schedule::from_str(&to_six_field(expr))?;
        let tz: chrono_tz::Tz = def
            .cron_tz
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid timezone {}", def.cron_tz))?;
        tracing::debug!(task_definition = %def.id, cron = %expr, tz = %def.cron_tz, "cron binding synced");
        self.bindings.lock().unwrap().insert(def.id, Binding { schedule, tz, last_fired: None });
        Ok(())
    }

    pub fn remove(&self, id: TaskDefinitionId) {
        self.bindings.lock().unwrap().remove(&id);
    }

    /// Definitions whose schedule has exactly one fire time due at or before
    /// `now` since they last fired (or since a minute before `now`, for a
    /// binding that has never fired).
    pub fn due(&self, now: DateTime<Utc>) -> Vec<TaskDefinitionId> {
        let mut bindings = self.bindings.lock().unwrap();
        let mut due = Vec::new();
        for (id, binding) in bindings.iter_mut() {
            let local_now = now.with_timezone(&binding.tz);
            let since = binding
                .last_fired
                .map(|t| t.with_timezone(&binding.tz))
                .unwrap_or(local_now - chrono::Duration::minutes(1));
            if let Some(next) = binding.schedule.after(&since).next() {
                if next <= local_now {
                    binding.last_fired = Some(now);
                    due.push(*id);
                }
            }
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nova_store::entities::{RunMode, TaskDefinitionKind};
    use uuid::Uuid;

    fn def(cron_expression: &str) -> TaskDefinition {
        TaskDefinition {
            id: Uuid::new_v4(),
            user: Uuid::new_v4(),
            name: "daily digest".into(),
            kind: TaskDefinitionKind::Agent,
            trigger: TriggerKind::Cron,
            cron_expression: Some(cron_expression.into()),
            cron_tz: "UTC".into(),
            prompt_template: "summarize the day".into(),
            run_mode: RunMode::Ephemeral,
            agent_ref: Some(Uuid::new_v4()),
            email_tool_ref: None,
            poll_interval_minutes: None,
            runtime_state: serde_json::Value::Null,
            is_active: true,
        }
    }

    #[test]
    fn a_wildcard_minute_schedule_is_always_due() {
        let bridge = CronBridge::new();
        let d = def("* * * * *");
        bridge.sync(&d).unwrap();
        let due = bridge.due(Utc::now());
        assert_eq!(due, vec![d.id]);
    }

    #[test]
    fn once_fired_the_same_minute_is_not_reported_twice() {
        let bridge = CronBridge::new();
        let d = def("* * * * *");
        bridge.sync(&d).unwrap();
        let now = Utc::now();
        assert_eq!(bridge.due(now).len(), 1);
        assert!(bridge.due(now).is_empty());
    }

    #[test]
    fn removing_a_binding_drops_it_from_future_due_checks() {
        let bridge = CronBridge::new();
        let d = def("* * * * *");
        bridge.sync(&d).unwrap();
        bridge.remove(d.id);
        assert!(bridge.due(Utc::now()).is_empty());
    }

    #[test]
    fn deactivating_a_definition_removes_its_binding_on_resync() {
        let bridge = CronBridge::new();
        let mut d = def("* * * * *");
        bridge.sync(&d).unwrap();
        d.is_active = false;
        bridge.sync(&d).unwrap();
        assert!(bridge.due(Utc::now()).is_empty());
    }

    #[test]
    fn invalid_cron_expression_is_rejected() {
        let bridge = CronBridge::new();
        let d = def("not a cron expression");
        assert!(bridge.sync(&d).is_err());
    }
}
