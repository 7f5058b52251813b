// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::config::MglockConfig;
use crate::error::{LockError, Result};
use crate::scenario::{self, ReplayReport, Scenario, StepStatus};
use colored::*;
use comfy_table::{Cell, Color, Table};
use std::path::Path;

pub struct ReplayCommand<'a> {
    config: &'a MglockConfig,
}

impl<'a> ReplayCommand<'a> {
    pub fn new(config: &'a MglockConfig) -> Result<Self> {
        Ok(Self { config })
    }

    pub fn execute(&self, path: &Path, json: bool) -> Result<()> {
        let scenario = Scenario::load(path)?;
        let report = scenario::replay(&scenario, self.config)?;

        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print!("{}", render_report(&report));
        }

        if !report.stuck.is_empty() {
            let ids: Vec<String> = report.stuck.iter().map(|id| format!("T{id}")).collect();
            return Err(LockError::Runner(format!(
                "replay finished with blocked transactions: {}",
                ids.join(", ")
            )));
        }
        Ok(())
    }
}

fn status_cell(status: &StepStatus) -> Cell {
    match status {
        StepStatus::Ok => Cell::new(status).fg(Color::Green),
        StepStatus::Blocked => Cell::new(status).fg(Color::Yellow),
        StepStatus::Error { .. } => Cell::new(status).fg(Color::Red),
    }
}

pub fn render_report(report: &ReplayReport) -> String {
    let mut out = String::new();

    let mut steps = Table::new();
    steps.load_preset(comfy_table::presets::UTF8_BORDERS_ONLY);
    steps.set_header(vec![
        Cell::new("#"),
        Cell::new("Step"),
        Cell::new("Result"),
        Cell::new("Resumed"),
    ]);
    for step in &report.steps {
        let resumed: Vec<String> = step
            .resumed
            .iter()
            .map(|resumed| format!("T{} {}", resumed.transaction, resumed.status))
            .collect();
        steps.add_row(vec![
            Cell::new(step.step),
            Cell::new(&step.description),
            status_cell(&step.status),
            Cell::new(resumed.join(", ")),
        ]);
    }
    out.push_str(&format!("{}\n{steps}\n", "Steps".bold()));

    out.push_str(&format!("\n{}\n", "Lock table".bold()));
    if report.locks.is_empty() {
        out.push_str("  (no locks held)\n");
    } else {
        let mut locks = Table::new();
        locks.load_preset(comfy_table::presets::UTF8_BORDERS_ONLY);
        locks.set_header(vec![
            Cell::new("Transaction"),
            Cell::new("Resource"),
            Cell::new("Lock"),
        ]);
        for lock in &report.locks {
            locks.add_row(vec![
                Cell::new(format!("T{}", lock.transaction)),
                Cell::new(&lock.name),
                Cell::new(lock.lock_type),
            ]);
        }
        out.push_str(&format!("{locks}\n"));
    }

    if !report.queues.is_empty() {
        out.push_str(&format!("\n{}\n", "Waiting".bold()));
        for queue in &report.queues {
            out.push_str(&format!("  {}: {} request(s)\n", queue.resource, queue.waiting));
        }
    }

    if let Some(events) = &report.events {
        out.push_str(&format!("\n{}\n", "Events".bold()));
        for event in events {
            out.push_str(&format!("  {event}\n"));
        }
    }

    if !report.stuck.is_empty() {
        let ids: Vec<String> = report.stuck.iter().map(|id| format!("T{id}")).collect();
        out.push_str(&format!(
            "\n{} still blocked: {}\n",
            "Warning".yellow().bold(),
            ids.join(", ")
        ));
    }

    out
}
