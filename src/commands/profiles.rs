//! `profiles` - list profile documents under the configured roots

use anyhow::Result;
use declarative::ProfileSource;

use super::Environment;
use crate::Context;
use crate::ui;

pub fn run(ctx: &Context, env: &Environment) -> Result<()> {
    let source = env.source()?;
    let names = source.list()?;

    if names.is_empty() {
        ui::info("No profiles found.");
        for root in source.roots() {
            ui::dim(&format!("searched {}", root.display()));
        }
        return Ok(());
    }

    if ctx.quiet {
        for name in &names {
            println!("{name}");
        }
        return Ok(());
    }

    ui::header("Profiles");
    for name in &names {
        println!("  {name}");
    }
    println!();
    ui::dim(&format!("{} profile(s)", names.len()));
    Ok(())
}
