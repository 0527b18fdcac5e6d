//! Combination search commands

use anyhow::Result;
use lift_core::insight::combination_rows;
use lift_core::rationalise;
use serde_json::json;

use super::{format_shift, parse_target, print_json, truncate, Context};

/// Optional overrides for the convergent search
#[derive(Debug, Clone, Copy, Default)]
pub struct ConvergeArgs {
    pub conditioned: Option<usize>,
    pub limit: Option<usize>,
    pub dp: Option<u32>,
    /// `Some(None)` ranks with the configured `rationalise_num`
    pub rationalise: Option<Option<usize>>,
}

pub fn cmd_combinations(
    ctx: &Context,
    target: &str,
    times: Option<usize>,
    top: Option<usize>,
) -> Result<()> {
    let assignment = parse_target(target)?;
    let search = &ctx.config.search;
    let (combinations, _) = ctx.insight()?.query_top_variable_combinations(
        &assignment,
        None,
        times.unwrap_or(search.combination_times),
        top.unwrap_or(search.combination_top),
    )?;

    if ctx.json {
        return print_json(&combinations);
    }

    println!();
    println!("🧩 Evidence combinations for {}", target);
    for (i, combination) in combinations.iter().enumerate() {
        println!("   ─────────────────────────────────────────────────────────────");
        println!(
            "   Run {} (max probability {:.4})",
            i + 1,
            combination.max_probability
        );
        for row in combination_rows(combination)? {
            let moments = match (row.mean, row.variance) {
                (Some(mean), Some(variance)) => {
                    format!("   mean {:.3}, variance {:.3}", mean, variance)
                }
                _ => String::new(),
            };
            println!(
                "     {:<32} {:>10}  from {:.4}{}",
                truncate(&format!("{}$${}", row.variable, row.state), 32),
                format_shift(row.difference),
                row.probability,
                moments
            );
        }
    }

    Ok(())
}

pub fn cmd_converge(ctx: &Context, target: &str, args: ConvergeArgs) -> Result<()> {
    let assignment = parse_target(target)?;
    let search = &ctx.config.search;
    let runs = ctx.insight()?.query_variable_combinations(
        &assignment,
        args.conditioned.unwrap_or(search.conditioned),
        args.limit.unwrap_or(search.total_iterations_limit),
        args.dp.unwrap_or(search.diff_convergence_dp),
    )?;
    let ranked = args
        .rationalise
        .map(|num| rationalise(&runs, num.unwrap_or(search.rationalise_num)));

    if ctx.json {
        return match &ranked {
            Some(ranked) => {
                let tokens: Vec<_> = ranked
                    .iter()
                    .map(|(token, weight)| json!({ "token": token, "weight": weight }))
                    .collect();
                print_json(&json!({ "runs": runs, "rationalised": tokens }))
            }
            None => print_json(&runs),
        };
    }

    println!();
    println!("🎯 Convergent runs for {}", target);
    println!("   ─────────────────────────────────────────────────────────────");
    for (i, run) in runs.iter().enumerate() {
        let marker = if run.over_limit { "▲" } else { " " };
        let unsettled = if run.converged { "" } else { "  (unsettled)" };
        println!(
            "   {:>3}. {} p={:.4}  {}{}",
            i + 1,
            marker,
            run.probability,
            run.evidence.join(" + "),
            unsettled
        );
    }

    if let Some(ranked) = ranked {
        println!();
        println!("   Most frequent evidence (weighted by run probability)");
        for (token, weight) in ranked {
            println!("     {:<32} {:>8.4}", truncate(&token, 32), weight);
        }
    }

    Ok(())
}
