//! `apply`, `destroy` and `show`

use anyhow::{Context as _, Result};
use colored::Colorize;
use declarative::{
    AutoConfirm, ConfirmCallback, ErrorCategory, Mode, Orchestrator, Profile, Report,
};
use serde_json::Value;
use std::sync::Arc;

use super::{Environment, render};
use crate::Context;
use crate::cli::{ApplyArgs, DestroyArgs, OutputFormat};
use crate::progress::BarProgress;
use crate::ui;

pub fn apply(ctx: &Context, env: &Environment, args: &ApplyArgs) -> Result<()> {
    run(ctx, env, args, None)
}

pub fn destroy(ctx: &Context, env: &Environment, args: &DestroyArgs) -> Result<()> {
    let mut confirm: Box<dyn ConfirmCallback> = if args.yes {
        Box::new(AutoConfirm)
    } else {
        Box::new(ui::PromptConfirm)
    };
    run(ctx, env, &args.apply, Some(confirm.as_mut()))
}

pub fn show(env: &Environment, name: &str, ignore_missing: bool, format: OutputFormat) -> Result<()> {
    let source = env.source()?;
    let profile = Profile::load(&source, name, ignore_missing)
        .with_context(|| format!("Could not load profile '{name}'"))?;

    log::info!("Profile chain: {}", profile.chain().join(" -> "));
    print!("{}", render(profile.document(), format)?);
    Ok(())
}

fn run(
    ctx: &Context,
    env: &Environment,
    args: &ApplyArgs,
    confirm: Option<&mut dyn ConfirmCallback>,
) -> Result<()> {
    let mode = if confirm.is_some() {
        Mode::Destroying
    } else {
        Mode::Provisioning
    };
    let title = match mode {
        Mode::Provisioning => "Applying Profile",
        Mode::Destroying => "Destroying Profile",
    };
    if !ctx.quiet {
        ui::header(&format!("{title}: {}", args.profile));
    }
    if args.display_only {
        ui::warn("Display only - no commands will be executed");
    }

    let source = env.source()?;
    let profile = Profile::load(&source, &args.profile, args.ignore_missing)
        .with_context(|| format!("Could not load profile '{}'", args.profile))?;
    if !ctx.quiet && profile.chain().len() > 1 {
        ui::kv("Layers", &profile.chain().join(" → "));
    }

    let opts = env.apply_options(args);
    let variables = Arc::new(env.variables(&args.set));
    let orchestrator = Orchestrator::new(env.boundary(args.display_only)?)
        .with_variables(Arc::clone(&variables))
        .with_executor(env.executor(opts.jobs)?);
    let mut progress = BarProgress::new(ctx.quiet || args.display_only);

    let execute = || match confirm {
        Some(confirm) => orchestrator.destroy(&profile, &opts, &mut progress, confirm),
        None => orchestrator.provision(&profile, &opts, &mut progress),
    };
    let report = if args.display_only {
        execute()?
    } else {
        let lock = format!("profile-{}", profile.name());
        orchestrator
            .executor()
            .run_exclusive(&lock, opts.lock_timeout, execute)?
    };

    if args.display_only {
        ui::section("Commands");
        print!("{}", render(&report.dispatches, OutputFormat::Yaml)?);
    }

    if args.dump_vars {
        ui::section("Runtime variables");
        let vars: serde_json::Map<String, Value> = variables.dump().into_iter().collect();
        print!("{}", render(&vars, OutputFormat::Yaml)?);
    }

    if report.cancelled {
        ui::info("Cancelled, nothing was changed");
        return Ok(());
    }

    print_report(ctx, &report);

    if !report.is_success() {
        anyhow::bail!(
            "{} of profile '{}' failed with {} error(s)",
            report.mode,
            report.profile,
            report.failures.len()
        );
    }
    Ok(())
}

fn print_report(ctx: &Context, report: &Report) {
    if !ctx.quiet && !report.units.is_empty() {
        ui::section("Units");
        for unit in &report.units {
            let s = &unit.summary;
            let mut parts = Vec::new();
            if s.applied > 0 {
                parts.push(format!("{} applied", s.applied).green().to_string());
            }
            if s.removed > 0 {
                parts.push(format!("{} removed", s.removed).red().to_string());
            }
            if s.no_change > 0 {
                parts.push(format!("{} unchanged", s.no_change).dimmed().to_string());
            }
            if s.skipped > 0 {
                parts.push(format!("{} skipped", s.skipped).yellow().to_string());
            }
            if s.failed > 0 {
                parts.push(format!("{} failed", s.failed).red().bold().to_string());
            }
            if parts.is_empty() {
                parts.push("nothing declared".dimmed().to_string());
            }
            println!("  {:<14} {}", unit.unit, parts.join(", "));
        }
    }

    if ctx.verbose > 0 && !report.display_only && !report.dispatches.is_empty() {
        ui::section("Commands");
        for record in &report.dispatches {
            let options = serde_json::to_string(&record.options).unwrap_or_default();
            let marker = if record.success { "✓".green() } else { "✗".red() };
            println!(
                "  {} {} {}",
                marker,
                record.command,
                ui::truncate(&options, 60).dimmed()
            );
        }
    }

    for skipped in &report.skipped {
        ui::dim(&format!("skipped {skipped}"));
    }

    if !report.failures.is_empty() {
        ui::section("Failures");
        for failure in &report.failures {
            let target = if failure.instance.is_empty() {
                failure.unit.clone()
            } else {
                format!("{} '{}'", failure.unit, failure.instance)
            };
            ui::error(&format!("[{}] {}: {}", failure.category, target.bold(), failure.message));
        }

        let mut categories: Vec<ErrorCategory> = Vec::new();
        for failure in &report.failures {
            if !categories.contains(&failure.category) {
                categories.push(failure.category);
            }
        }
        for category in categories {
            ui::dim(category.advice());
        }
    }

    if let Some(reason) = &report.aborted {
        ui::error(&format!("Stopped early: {reason}"));
    }

    println!();
    let totals = report.totals();
    let duration = ui::format_duration(report.duration());
    if report.is_success() {
        ui::success(&format!(
            "{} {} change(s) in {}",
            if report.display_only { "Previewed" } else { "Made" },
            totals.total_changes(),
            duration
        ));
    } else {
        ui::warn(&format!(
            "{} change(s), {} failure(s) in {}",
            totals.total_changes(),
            report.failures.len(),
            duration
        ));
    }
}
