//! Prediction scan command

use anyhow::{Context as _, Result};
use lift_core::model::{predict, PredictionOutcome, TargetPrediction};

use super::{print_json, Context};

pub fn cmd_predict(ctx: &Context, targets: &[String], limit: Option<usize>) -> Result<()> {
    let insight = ctx.insight()?;
    let model = insight.train_model().context("Failed to train model")?;

    let mut rows = ctx.data.row_indexes();
    if let Some(limit) = limit {
        rows.truncate(limit);
    }
    let predictions = predict(model.as_ref(), &ctx.data, &rows, targets)?;

    if ctx.json {
        return print_json(&predictions);
    }

    println!();
    println!("🔮 Predictions for {}", targets.join(", "));
    println!("   ─────────────────────────────────────────────────────────────");
    for prediction in &predictions {
        let line = match &prediction.outcome {
            PredictionOutcome::Predicted(values) => values
                .iter()
                .map(|value| match value {
                    TargetPrediction::Discrete {
                        variable,
                        state,
                        probability,
                        ..
                    } => format!("{}={} ({:.3})", variable, state, probability),
                    TargetPrediction::Continuous { variable, mean, .. } => {
                        format!("{}≈{:.3}", variable, mean)
                    }
                })
                .collect::<Vec<_>>()
                .join("  "),
            PredictionOutcome::Failed(message) => format!("⚠️  failed: {}", message),
        };
        println!("   {:>6}  {}", prediction.row, line);
    }

    let failed = predictions.iter().filter(|p| p.is_failed()).count();
    if failed > 0 {
        println!();
        println!("⚠️  {} of {} rows could not be predicted", failed, predictions.len());
    }

    Ok(())
}
