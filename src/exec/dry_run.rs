// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{CommandOutput, CommandRunner, CommandSpec};
use crate::error::Result;

/// Runner that executes queries but only records mutating commands.
pub struct DryRunRunner {
    inner: Arc<dyn CommandRunner>,
    planned: Mutex<Vec<CommandSpec>>,
}

impl DryRunRunner {
    pub fn new(inner: Arc<dyn CommandRunner>) -> Self {
        Self {
            inner,
            planned: Mutex::new(Vec::new()),
        }
    }

    /// Mutating commands that would have run, in order.
    pub fn planned(&self) -> Vec<CommandSpec> {
        self.planned
            .lock()
            .map(|planned| planned.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CommandRunner for DryRunRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput> {
        if !command.is_mutating() {
            return self.inner.run(command).await;
        }

        tracing::info!("[dry-run] would run: {}", command);
        if let Ok(mut planned) = self.planned.lock() {
            planned.push(command.clone());
        }
        Ok(CommandOutput::ok(""))
    }
}
