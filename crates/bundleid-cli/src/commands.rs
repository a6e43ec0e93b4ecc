//! Subcommand implementations.

use crate::cli::{
    ApplyArchiveArgs, ApplyBundleArgs, OutputArgs, PlanArgs, ResolveArgs, ValidateArgs,
};
use bundleid::{Error, Outcome, Overrides, Resolver, Result};
use serde::Serialize;
use std::fs;

const COLLISION_FREE: i32 = 0;
const RESIDUAL_COLLISIONS: i32 = 1;

pub fn resolve(args: ResolveArgs) -> Result<i32> {
    let resolver = resolver(&args.plan)?;
    let outcome = resolver.resolve(&args.descriptor)?;
    finish(&outcome, &args.plan.output)
}

pub fn apply_bundle(args: ApplyBundleArgs) -> Result<i32> {
    let mut resolver = resolver(&args.plan)?;
    if let Some(descriptor) = &args.descriptor {
        resolver = resolver.descriptor(descriptor);
    }
    let outcome = resolver.apply_bundle(&args.bundle_dir)?;
    finish(&outcome, &args.plan.output)
}

pub fn apply_archive(args: ApplyArchiveArgs) -> Result<i32> {
    let mut resolver = resolver(&args.plan)?;
    if let Some(descriptor) = &args.descriptor {
        resolver = resolver.descriptor(descriptor);
    }
    let outcome = resolver.apply_archive(&args.archive)?;
    finish(&outcome, &args.plan.output)
}

pub fn validate(args: ValidateArgs) -> Result<i32> {
    let report = bundleid::validate_path(&args.target)?;
    emit(&report, &args.output, || print!("{report}"))?;
    Ok(exit_status(report.collision_free))
}

fn resolver(plan: &PlanArgs) -> Result<Resolver> {
    let overrides = match &plan.overrides {
        Some(path) => Overrides::load(path)?,
        None => Overrides::default(),
    };
    let resolver = Resolver::new(&plan.base_id)
        .overrides(overrides)
        .dry_run(plan.dry_run);
    resolver.validate()?;
    Ok(resolver)
}

fn finish(outcome: &Outcome, output: &OutputArgs) -> Result<i32> {
    emit(outcome, output, || {
        print!("{}", outcome.summary);
        for collision in &outcome.assignment.residual {
            println!("residual collision: {collision}");
        }
        print!("{}", outcome.report);
    })?;
    Ok(exit_status(outcome.is_collision_free()))
}

/// Print `value` as JSON or through `human`, and write the JSON report file
/// when one was requested.
fn emit<T: Serialize>(value: &T, output: &OutputArgs, human: impl FnOnce()) -> Result<()> {
    let json = || {
        serde_json::to_string_pretty(value)
            .map_err(|e| Error::Config(format!("cannot serialize report: {e}")))
    };
    if output.json {
        println!("{}", json()?);
    } else {
        human();
    }
    if let Some(path) = &output.report {
        fs::write(path, json()? + "\n").map_err(|e| Error::IoAt {
            path: path.clone(),
            source: e,
        })?;
        tracing::info!(report = %path.display(), "report written");
    }
    Ok(())
}

fn exit_status(collision_free: bool) -> i32 {
    if collision_free {
        COLLISION_FREE
    } else {
        RESIDUAL_COLLISIONS
    }
}
