//! Console rendering of command results.
//!
//! Diagnostics print first, exactly as the target produced them, then the
//! command's own output. Tabular results go through `comfy-table`; source
//! listings are line numbered so breakpoint lines can be read off directly.

use colored::Colorize;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{ContentArrangement, Table};
use rdbg_engine::{CommandOutput, CommandTable, DispatchResult, Routine};

pub fn render(commands: &CommandTable, result: DispatchResult) {
    for notice in &result.notices {
        println!("{}", notice.trim_end().yellow());
    }
    match result.output {
        CommandOutput::None => {}
        CommandOutput::Breakpoint(stop) => {
            println!("{} {stop}", "stopped at".green());
        }
        CommandOutput::Variables(vars) => {
            let mut table = new_table(&["name", "class", "line", "type", "value"]);
            for var in vars {
                table.add_row(vec![
                    var.name,
                    var.var_class,
                    var.line.to_string(),
                    var.declared_type,
                    var.value,
                ]);
            }
            println!("{table}");
        }
        CommandOutput::Frames(frames) => {
            let mut table = new_table(&["depth", "routine", "line", "args"]);
            for frame in frames {
                table.add_row(vec![
                    frame.depth.to_string(),
                    frame.label,
                    frame.line.to_string(),
                    frame.args,
                ]);
            }
            println!("{table}");
        }
        CommandOutput::Breakpoints(points) => {
            let mut table = new_table(&["routine", "line"]);
            for point in points {
                table.add_row(vec![point.signature, point.line.to_string()]);
            }
            println!("{table}");
        }
        CommandOutput::Source(text) => print!("{}", render_source(&text)),
        CommandOutput::Routines(routines) => print!("{}", render_routines(&routines)),
        CommandOutput::Help => print!("{}", render_help(commands)),
    }
}

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.to_vec());
    table
}

fn render_source(text: &str) -> String {
    let mut out = String::new();
    for (idx, line) in text.lines().enumerate() {
        // Pad before coloring; escape codes would throw the width off.
        let number = format!("{:>4}", idx + 1);
        out.push_str(&format!("{}: {line}\n", number.dimmed()));
    }
    out
}

fn render_routines(routines: &[Routine]) -> String {
    let mut table = new_table(&["signature", "id"]);
    for routine in routines {
        table.add_row(vec![routine.signature.clone(), routine.id.to_string()]);
    }
    format!("{table}\n")
}

fn render_help(commands: &CommandTable) -> String {
    let mut entries: Vec<_> = commands.entries().collect();
    entries.sort_by_key(|(name, _)| *name);

    let mut out = String::new();
    for (name, spec) in entries {
        let name = format!("{name:<10}");
        out.push_str(&format!("  {} {}\n", name.bold(), spec.help));
    }
    out.push_str("  aliases: quit and abort behave like stop\n");
    out
}
