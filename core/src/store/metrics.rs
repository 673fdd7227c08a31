use super::SimStore;
use crate::{
    error::SimResult,
    metrics::{RunSummary, StepMetrics},
};
use rusqlite::{params, OptionalExtension};

impl SimStore {
    // ── Step metrics ───────────────────────────────────────────

    pub fn save_metrics(&self, run_id: &str, metrics: &StepMetrics) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO step_metrics (
                run_id, step, overall_mean, audited_fraction,
                tax_gap_rate, total_cost, metrics_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(run_id, step) DO UPDATE SET
                overall_mean     = excluded.overall_mean,
                audited_fraction = excluded.audited_fraction,
                tax_gap_rate     = excluded.tax_gap_rate,
                total_cost       = excluded.total_cost,
                metrics_json     = excluded.metrics_json",
            params![
                run_id,
                metrics.step as i64,
                metrics.overall_mean,
                metrics.audited_fraction,
                metrics.tax_gap_rate,
                metrics.total_cost,
                serde_json::to_string(metrics)?,
            ],
        )?;
        Ok(())
    }

    /// All stored steps of a run, in step order.
    pub fn metrics_for_run(&self, run_id: &str) -> SimResult<Vec<StepMetrics>> {
        let mut stmt = self.conn.prepare(
            "SELECT metrics_json FROM step_metrics
             WHERE run_id = ?1 ORDER BY step ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        let mut metrics = Vec::with_capacity(rows.len());
        for json in rows {
            metrics.push(serde_json::from_str(&json)?);
        }
        Ok(metrics)
    }

    // ── Run summary ────────────────────────────────────────────

    pub fn save_summary(&self, run_id: &str, summary: &RunSummary) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO run_summary (
                run_id, tax_gap_reduction, total_cost, net_benefit, roi_ratio
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(run_id) DO UPDATE SET
                tax_gap_reduction = excluded.tax_gap_reduction,
                total_cost        = excluded.total_cost,
                net_benefit       = excluded.net_benefit,
                roi_ratio         = excluded.roi_ratio",
            params![
                run_id,
                summary.tax_gap_reduction,
                summary.total_cost,
                summary.net_benefit,
                summary.roi_ratio,
            ],
        )?;
        Ok(())
    }

    pub fn load_summary(&self, run_id: &str) -> SimResult<Option<RunSummary>> {
        let summary = self
            .conn
            .query_row(
                "SELECT tax_gap_reduction, total_cost, net_benefit, roi_ratio
                 FROM run_summary WHERE run_id = ?1",
                params![run_id],
                |row| {
                    Ok(RunSummary {
                        tax_gap_reduction: row.get(0)?,
                        total_cost:        row.get(1)?,
                        net_benefit:       row.get(2)?,
                        roi_ratio:         row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(summary)
    }
}
