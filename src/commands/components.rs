//! `components` - list registered unit types

use anyhow::Result;
use colored::Colorize;
use declarative::{Registry, UnitDescriptor};

use crate::Context;
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    let descriptors = Registry::builtin().descriptors();

    if ctx.quiet {
        for descriptor in &descriptors {
            println!("{}", descriptor.name);
        }
        return Ok(());
    }

    ui::header("Unit Types");
    println!("  {:<12} {:>8}  {}", "NAME".dimmed(), "PRIORITY".dimmed(), "FLAGS".dimmed());
    for descriptor in &descriptors {
        println!(
            "  {:<12} {:>8}  {}",
            descriptor.name.bold(),
            descriptor.priority,
            flags(descriptor).dimmed()
        );
    }
    println!();
    ui::dim("Provisioning runs top to bottom, destroying bottom to top");
    Ok(())
}

fn flags(descriptor: &UnitDescriptor) -> String {
    let mut flags = Vec::new();
    if descriptor.parallel {
        flags.push("parallel");
    }
    if descriptor.skip_run {
        flags.push("no-run");
    }
    if descriptor.skip_describe {
        flags.push("no-export");
    }
    flags.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags() {
        let descriptor = UnitDescriptor {
            name: "run".to_string(),
            priority: 50,
            skip_run: false,
            skip_describe: true,
            parallel: true,
        };
        assert_eq!(flags(&descriptor), "parallel, no-export");

        let descriptor = UnitDescriptor {
            parallel: false,
            skip_describe: false,
            ..descriptor
        };
        assert_eq!(flags(&descriptor), "");
    }
}
