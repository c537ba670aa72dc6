// coati is a version control tool for data science projects
// Copyright (C) 2025  The coati authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use anyhow::{Context, Result};

use crate::ui;

/// One staged unit of work inside a [`Plan`]: a description shown in
/// verbose mode, an optional precheck that must not mutate user state, the
/// execute closure, and an optional compensator run when a later action
/// fails.
pub struct Action<'a> {
    description: String,
    precheck: Option<Box<dyn FnMut() -> Result<()> + 'a>>,
    execute: Box<dyn FnMut() -> Result<()> + 'a>,
    compensate: Option<Box<dyn FnMut() + 'a>>,
}

impl<'a> Action<'a> {
    pub fn new(description: impl Into<String>, execute: impl FnMut() -> Result<()> + 'a) -> Self {
        Self {
            description: description.into(),
            precheck: None,
            execute: Box::new(execute),
            compensate: None,
        }
    }

    pub fn with_precheck(mut self, precheck: impl FnMut() -> Result<()> + 'a) -> Self {
        self.precheck = Some(Box::new(precheck));
        self
    }

    pub fn with_compensator(mut self, compensate: impl FnMut() + 'a) -> Self {
        self.compensate = Some(Box::new(compensate));
        self
    }
}

/// Outcome of a plan run in partial-acceptance mode.
pub struct PartialOutcome {
    /// Descriptions of the actions that completed.
    pub completed: Vec<String>,
    /// The first failure, if any, with the failing action's description.
    pub failure: Option<(String, anyhow::Error)>,
}

/// An ordered two-phase pipeline: every precheck runs before the first
/// execute, so a failing precondition aborts with no side effects.
pub struct Plan<'a> {
    name: &'static str,
    actions: Vec<Action<'a>>,
}

impl<'a> Plan<'a> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            actions: Vec::new(),
        }
    }

    pub fn add(&mut self, action: Action<'a>) {
        self.actions.push(action);
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    fn echo(&self) {
        ui::cli::verbose!("{} plan:", self.name);
        for action in &self.actions {
            ui::cli::verbose!("  - {}", action.description);
        }
    }

    fn run_prechecks(&mut self) -> Result<()> {
        for action in &mut self.actions {
            if let Some(precheck) = &mut action.precheck {
                precheck().with_context(|| format!("precheck failed: {}", action.description))?;
            }
        }
        Ok(())
    }

    /// Run prechecks, then execute in order. On a failed execute the
    /// compensators of already-executed actions run in reverse order and
    /// the error is returned.
    pub fn run(mut self) -> Result<()> {
        self.echo();
        self.run_prechecks()?;

        let mut executed: Vec<usize> = Vec::new();
        for index in 0..self.actions.len() {
            let action = &mut self.actions[index];
            ui::cli::verbose!("{}: {}", self.name, action.description);
            if let Err(err) = (action.execute)() {
                let failed_description = action.description.clone();
                for &done in executed.iter().rev() {
                    if let Some(compensate) = &mut self.actions[done].compensate {
                        compensate();
                    }
                }
                return Err(err).with_context(|| failed_description);
            }
            executed.push(index);
        }
        Ok(())
    }

    /// Run prechecks, then execute in order, stopping at the first failure
    /// without compensating. Used where undoing completed work is not
    /// possible and partial completion must be surfaced instead.
    pub fn run_accept_partial(mut self) -> Result<PartialOutcome> {
        self.echo();
        self.run_prechecks()?;

        let mut completed = Vec::new();
        for action in &mut self.actions {
            ui::cli::verbose!("{}: {}", self.name, action.description);
            match (action.execute)() {
                Ok(()) => completed.push(action.description.clone()),
                Err(err) => {
                    return Ok(PartialOutcome {
                        completed,
                        failure: Some((action.description.clone(), err)),
                    });
                }
            }
        }
        Ok(PartialOutcome {
            completed,
            failure: None,
        })
    }
}
