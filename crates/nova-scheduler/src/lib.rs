// SPDX-License-Identifier: Apache-2.0
//! Task Definitions & Scheduler Bridge (§4.7): prompt-template rendering,
//! the cron binding, the email-poll cursor algorithm, and the per-firing
//! execution path that hands off into `nova-core::TaskExecutor`.

pub mod cron_bridge;
pub mod mailbox;
pub mod runner;
pub mod template;

pub use cron_bridge::CronBridge;
pub use mailbox::{poll_mailbox, EmailEnvelope, FakeMailboxPoller, MailboxPoller, PollOutcome};
pub use runner::{fire_due_task_definition, TaskDefinitionRunner};
pub use template::render_template;
