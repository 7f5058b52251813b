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

use crate::error::Result;
use crate::locking::LockType;
use colored::*;
use comfy_table::{Cell, CellAlignment, Color, Table};

pub struct MatrixCommand;

impl MatrixCommand {
    pub fn new() -> Result<Self> {
        Ok(Self)
    }

    pub fn execute(&self) -> Result<()> {
        print!("{}", render_matrices());
        Ok(())
    }
}

fn matrix_table(relation: impl Fn(LockType, LockType) -> bool) -> Table {
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_BORDERS_ONLY);

    let mut header = vec![Cell::new("")];
    header.extend(LockType::ALL.iter().map(Cell::new));
    table.set_header(header);

    for row in LockType::ALL {
        let mut cells = vec![Cell::new(row)];
        for column in LockType::ALL {
            let cell = if relation(row, column) {
                Cell::new("yes").fg(Color::Green)
            } else {
                Cell::new("no").fg(Color::DarkGrey)
            };
            cells.push(cell.set_alignment(CellAlignment::Center));
        }
        table.add_row(cells);
    }
    table
}

/// Compatibility, substitutability and parent-lock tables for every lock type.
pub fn render_matrices() -> String {
    let mut parents = Table::new();
    parents.load_preset(comfy_table::presets::UTF8_BORDERS_ONLY);
    parents.set_header(vec![Cell::new("Lock"), Cell::new("Parent needs")]);
    for lock_type in LockType::ALL {
        parents.add_row(vec![Cell::new(lock_type), Cell::new(lock_type.parent_lock())]);
    }

    format!(
        "{}\n{}\n\n{}\n{}\n\n{}\n{}\n",
        "Compatibility (row held, column requested)".bold(),
        matrix_table(LockType::compatible),
        "Substitutability (row may stand in for column)".bold(),
        matrix_table(LockType::substitutable),
        "Parent locks".bold(),
        parents
    )
}
