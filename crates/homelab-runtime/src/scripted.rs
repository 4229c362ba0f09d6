//! Recording runner with scripted responses
//!
//! Nothing is executed. Every command is rendered to its shell form and
//! appended to a call log; the first rule whose pattern is a substring of the
//! rendered command supplies the response. Unmatched commands succeed with
//! empty output, which makes this runner double as a dry-run backend.

use async_trait::async_trait;
use homelab_core::LabResult;
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tracing::info;

use crate::command::{CommandOutput, CommandSpec};
use crate::traits::CommandRunner;

struct Rule {
    pattern: String,
    /// Responses consumed front to back; the last one repeats
    responses: VecDeque<CommandOutput>,
}

/// Runner that records commands instead of executing them
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<String>>,
    programs: Mutex<HashSet<String>>,
    all_programs: bool,
    log_calls: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dry-run flavour: every program exists and each call is logged
    pub fn dry_run() -> Self {
        Self {
            all_programs: true,
            log_calls: true,
            ..Self::default()
        }
    }

    /// Succeed with `stdout` for commands containing `pattern`
    pub fn respond(self, pattern: impl Into<String>, stdout: impl Into<String>) -> Self {
        self.rule(pattern, vec![CommandOutput::ok(stdout)])
    }

    /// Succeed with each output in turn for commands containing `pattern`;
    /// the last output repeats once the sequence is exhausted
    pub fn respond_seq<I, S>(self, pattern: impl Into<String>, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let responses = outputs.into_iter().map(CommandOutput::ok).collect();
        self.rule(pattern, responses)
    }

    /// Answer commands containing `pattern` with a complete output
    pub fn respond_output(self, pattern: impl Into<String>, output: CommandOutput) -> Self {
        self.rule(pattern, vec![output])
    }

    /// Fail with `code` for commands containing `pattern`
    pub fn fail(self, pattern: impl Into<String>, code: i32, stderr: impl Into<String>) -> Self {
        self.rule(pattern, vec![CommandOutput::failed(code, stderr)])
    }

    /// Report `program` as installed
    pub fn with_program(self, program: impl Into<String>) -> Self {
        lock(&self.programs).insert(program.into());
        self
    }

    fn rule(self, pattern: impl Into<String>, responses: Vec<CommandOutput>) -> Self {
        lock(&self.rules).push(Rule {
            pattern: pattern.into(),
            responses: responses.into(),
        });
        self
    }

    /// Every command executed so far, in order
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Number of recorded commands containing `pattern`
    pub fn count(&self, pattern: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| call.contains(pattern))
            .count()
    }

    /// Index of the first recorded command containing `pattern`
    pub fn position(&self, pattern: &str) -> Option<usize> {
        lock(&self.calls)
            .iter()
            .position(|call| call.contains(pattern))
    }

    fn respond_to(&self, rendered: &str) -> CommandOutput {
        let mut rules = lock(&self.rules);
        let Some(rule) = rules.iter_mut().find(|r| rendered.contains(&r.pattern)) else {
            return CommandOutput::ok("");
        };
        if rule.responses.len() > 1 {
            rule.responses.pop_front().unwrap_or_default()
        } else {
            rule.responses.front().cloned().unwrap_or_default()
        }
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn exec(&self, cmd: &CommandSpec) -> LabResult<CommandOutput> {
        let rendered = cmd.to_string();
        if self.log_calls {
            info!(command = %rendered, "dry-run");
        }
        let output = self.respond_to(&rendered);
        lock(&self.calls).push(rendered);
        Ok(output)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn program_exists(&self, program: &str) -> bool {
        self.all_programs || lock(&self.programs).contains(program)
    }
}
