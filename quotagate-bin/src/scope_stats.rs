use quotagate_lib::ratelimit::{ScopeStats, ScopeStatsMap};
use std::fmt::{self, Display};

/// Per-scope statistics as a table, busiest scope first
pub(crate) struct ScopeStatsTable {
    rows: Vec<(String, ScopeStats)>,
}

impl ScopeStatsTable {
    pub(crate) fn new(stats: &ScopeStatsMap) -> Self {
        Self {
            rows: stats.sorted(),
        }
    }
}

impl Display for ScopeStatsTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rows.is_empty() {
            return Ok(());
        }

        let width = self
            .rows
            .iter()
            .map(|(scope, _)| scope.len())
            .max()
            .unwrap_or(0)
            .max(10);

        writeln!(f)?;
        writeln!(f, "Per-scope statistics")?;
        writeln!(f, "{}", "-".repeat(60))?;
        for (scope, stats) in &self.rows {
            writeln!(
                f,
                "{scope:<width$} | {:>6} reqs | {:>5.1}% success | {:>4} rate limited | {:>3} blocks",
                stats.total_requests,
                stats.success_rate() * 100.0,
                stats.rate_limited,
                stats.blocks,
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;
    use quotagate_lib::ratelimit::{ScopeStats, ScopeStatsMap};
    use std::collections::HashMap;

    use super::ScopeStatsTable;

    #[test]
    fn test_empty_table() {
        let table = ScopeStatsTable::new(&ScopeStatsMap::default());
        assert_eq!(table.to_string(), "");
    }

    #[test]
    fn test_busiest_scope_first() {
        let mut busy = ScopeStats::default();
        busy.record_response(StatusCode::OK);
        busy.record_response(StatusCode::TOO_MANY_REQUESTS);
        let mut quiet = ScopeStats::default();
        quiet.record_response(StatusCode::OK);

        let stats = ScopeStatsMap::from(HashMap::from([
            ("euw1".to_string(), quiet),
            ("na1".to_string(), busy),
        ]));
        let output = ScopeStatsTable::new(&stats).to_string();

        let na1 = output.find("na1").unwrap();
        let euw1 = output.find("euw1").unwrap();
        assert!(na1 < euw1);
        assert!(output.contains(" 50.0% success"));
        assert!(output.contains("   1 rate limited"));
    }
}
