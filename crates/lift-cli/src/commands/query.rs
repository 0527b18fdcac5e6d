//! Evidence diff and single-state ranking commands

use anyhow::{Context as _, Result};
use lift_core::insight::{query_model_with_evidence, InsightStats, RankedInsight};

use super::{format_shift, parse_evidence, parse_target, print_json, truncate, Context};

pub fn cmd_diff(ctx: &Context, base: &[String], evidence: &[String]) -> Result<()> {
    let base = parse_evidence(base)?;
    let new = parse_evidence(evidence)?;

    let insight = ctx.insight()?;
    let model = insight.train_model().context("Failed to train model")?;
    let shared = (!base.is_empty()).then_some(&base);
    let diff = query_model_with_evidence(model.as_ref(), shared, Some(&new))?;

    if ctx.json {
        return print_json(&diff);
    }

    println!();
    println!("📊 Evidence Diff ({})", evidence.join(", "));
    println!("   ─────────────────────────────────────────────────────────────");
    println!(
        "   {:<32} {:>8} {:>8} {:>10}",
        "State", "Before", "After", "Shift"
    );
    for row in diff.discrete.iter() {
        println!(
            "   {:<32} {:>8.4} {:>8.4} {:>10}",
            truncate(&row.variable_state, 32),
            row.base_probability,
            row.value,
            format_shift(row.difference)
        );
    }

    if !diff.continuous.is_empty() {
        println!();
        println!(
            "   {:<32} {:>12} {:>12}",
            "Variable", "Mean before", "Mean after"
        );
        for row in diff.continuous.iter() {
            println!(
                "   {:<32} {:>12.3} {:>12.3}",
                truncate(&row.variable, 32),
                row.base_mean,
                row.mean
            );
        }
    }

    Ok(())
}

pub fn cmd_exclusive(
    ctx: &Context,
    target: &str,
    times: Option<usize>,
    top: Option<usize>,
) -> Result<()> {
    let assignment = parse_target(target)?;
    let search = &ctx.config.search;
    let ranked = ctx.insight()?.query_exclusive_states(
        &assignment,
        None,
        times.unwrap_or(search.times),
        top.unwrap_or(search.top),
    )?;

    if ctx.json {
        return print_json(&ranked);
    }

    println!();
    println!("🔎 Exclusive states for {}", target);
    print_ranked(&ranked);
    Ok(())
}

pub fn cmd_bivariate(
    ctx: &Context,
    target: &str,
    times: Option<usize>,
    top: Option<usize>,
) -> Result<()> {
    let assignment = parse_target(target)?;
    let search = &ctx.config.search;
    let ranked = ctx.insight()?.query_bivariate_combinations(
        &assignment,
        None,
        times.unwrap_or(search.times),
        top.unwrap_or(search.top),
    )?;

    if ctx.json {
        return print_json(&ranked);
    }

    println!();
    println!("📈 States lifting {}", target);
    print_ranked(&ranked);
    Ok(())
}

fn print_ranked(ranked: &[RankedInsight]) {
    println!("   ─────────────────────────────────────────────────────────────");
    if ranked.is_empty() {
        println!("   No states passed the filters.");
        return;
    }

    for (i, entry) in ranked.iter().enumerate() {
        let detail = match &entry.stats {
            InsightStats::Cluster { mean, variance, .. } => {
                format!("mean {:.3}, variance {:.3}", mean, variance)
            }
            InsightStats::Discrete {
                base_probability,
                target_probability,
                ..
            } => format!("{:.4} → {:.4}", base_probability, target_probability),
        };
        println!(
            "   {:>3}. {:<32} {:>10}   {}",
            i + 1,
            truncate(&entry.token, 32),
            format_shift(entry.stats.sum_difference()),
            detail
        );
    }
}
