/// Descriptive statistics over a sleep table, one block per column
use serde_json::Value;
use std::fmt;

use crate::models::sleep::{cell_text, SleepTable};

#[derive(Debug, Clone, PartialEq)]
pub struct NumericStats {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalStats {
    pub count: usize,
    pub unique: usize,
    pub top: Option<String>,
    pub freq: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnStats {
    Numeric(NumericStats),
    Categorical(CategoricalStats),
}

impl ColumnStats {
    pub fn count(&self) -> usize {
        match self {
            ColumnStats::Numeric(s) => s.count,
            ColumnStats::Categorical(s) => s.count,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SleepSummary {
    pub rows: usize,
    pub columns: Vec<(String, ColumnStats)>,
}

impl SleepSummary {
    pub fn describe(table: &SleepTable) -> Self {
        let columns = table
            .columns
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let values: Vec<&Value> = table.column(idx).filter(|v| !v.is_null()).collect();
                (name.clone(), describe_column(&values))
            })
            .collect();

        Self {
            rows: table.row_count(),
            columns,
        }
    }

    #[cfg(test)]
    pub fn column(&self, name: &str) -> Option<&ColumnStats> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, stats)| stats)
    }
}

fn describe_column(values: &[&Value]) -> ColumnStats {
    let numbers: Option<Vec<f64>> = values.iter().map(|v| v.as_f64()).collect();
    match numbers {
        Some(numbers) if !numbers.is_empty() => ColumnStats::Numeric(numeric_stats(numbers)),
        _ => ColumnStats::Categorical(categorical_stats(values)),
    }
}

fn numeric_stats(mut numbers: Vec<f64>) -> NumericStats {
    numbers.sort_by(|a, b| a.total_cmp(b));
    let count = numbers.len();
    let mean = numbers.iter().sum::<f64>() / count as f64;
    // Sample standard deviation, undefined below two observations
    let std = if count < 2 {
        f64::NAN
    } else {
        let var = numbers.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
        var.sqrt()
    };

    NumericStats {
        count,
        mean,
        std,
        min: numbers[0],
        q25: quantile(&numbers, 0.25),
        median: quantile(&numbers, 0.5),
        q75: quantile(&numbers, 0.75),
        max: numbers[count - 1],
    }
}

/// Linear interpolation between closest ranks; `sorted` must be non-empty
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

fn categorical_stats(values: &[&Value]) -> CategoricalStats {
    // (text, frequency) in first-seen order so ties resolve to the earliest value
    let mut seen: Vec<(String, usize)> = Vec::new();
    for value in values {
        let text = cell_text(value);
        match seen.iter_mut().find(|(t, _)| *t == text) {
            Some((_, n)) => *n += 1,
            None => seen.push((text, 1)),
        }
    }

    let mut top: Option<&(String, usize)> = None;
    for entry in &seen {
        if top.map_or(true, |t| entry.1 > t.1) {
            top = Some(entry);
        }
    }

    CategoricalStats {
        count: values.len(),
        unique: seen.len(),
        top: top.map(|(t, _)| t.clone()),
        freq: top.map_or(0, |(_, n)| *n),
    }
}

const NAN: &str = "NaN";

fn fmt_float(v: f64) -> String {
    if v.is_nan() {
        NAN.to_string()
    } else {
        format!("{:.6}", v)
    }
}

impl fmt::Display for SleepSummary {
    /// Statistic names down the left, one column per metric
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.columns.is_empty() {
            return write!(f, "Empty table: {} rows, no columns", self.rows);
        }

        let has_categorical = self
            .columns
            .iter()
            .any(|(_, s)| matches!(s, ColumnStats::Categorical(_)));
        let has_numeric = self
            .columns
            .iter()
            .any(|(_, s)| matches!(s, ColumnStats::Numeric(_)));

        let mut labels = vec!["count"];
        if has_categorical {
            labels.extend(["unique", "top", "freq"]);
        }
        if has_numeric {
            labels.extend(["mean", "std", "min", "25%", "50%", "75%", "max"]);
        }

        let cells: Vec<Vec<String>> = self
            .columns
            .iter()
            .map(|(_, stats)| labels.iter().map(|l| stat_cell(stats, l)).collect())
            .collect();

        let label_width = labels.iter().map(|l| l.len()).max().unwrap_or(0);
        let widths: Vec<usize> = self
            .columns
            .iter()
            .zip(&cells)
            .map(|((name, _), col)| {
                col.iter()
                    .map(|c| c.chars().count())
                    .chain(std::iter::once(name.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        write!(f, "{:label_width$}", "")?;
        for ((name, _), width) in self.columns.iter().zip(&widths) {
            write!(f, "  {:>width$}", name, width = *width)?;
        }
        writeln!(f)?;

        for (row, label) in labels.iter().enumerate() {
            write!(f, "{:<label_width$}", label)?;
            for (col, width) in cells.iter().zip(&widths) {
                write!(f, "  {:>width$}", col[row], width = *width)?;
            }
            writeln!(f)?;
        }

        Ok(())
    }
}

fn stat_cell(stats: &ColumnStats, label: &str) -> String {
    match (stats, label) {
        (_, "count") => stats.count().to_string(),
        (ColumnStats::Categorical(s), "unique") => s.unique.to_string(),
        (ColumnStats::Categorical(s), "top") => s.top.clone().unwrap_or_else(|| NAN.to_string()),
        (ColumnStats::Categorical(s), "freq") if s.top.is_some() => s.freq.to_string(),
        (ColumnStats::Numeric(s), "mean") => fmt_float(s.mean),
        (ColumnStats::Numeric(s), "std") => fmt_float(s.std),
        (ColumnStats::Numeric(s), "min") => fmt_float(s.min),
        (ColumnStats::Numeric(s), "25%") => fmt_float(s.q25),
        (ColumnStats::Numeric(s), "50%") => fmt_float(s.median),
        (ColumnStats::Numeric(s), "75%") => fmt_float(s.q75),
        (ColumnStats::Numeric(s), "max") => fmt_float(s.max),
        _ => NAN.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary_of(body: &str) -> SleepSummary {
        SleepSummary::describe(&SleepTable::from_payload(body).unwrap())
    }

    #[test]
    fn test_sample_counts() {
        let summary = summary_of(
            r#"{"sleep": [{"date":"2020-01-01","score":80},{"date":"2020-01-02","score":null}]}"#,
        );

        assert_eq!(summary.rows, 2);
        assert_eq!(summary.column("date").unwrap().count(), 2);
        match summary.column("score").unwrap() {
            ColumnStats::Numeric(s) => {
                assert_eq!(s.count, 1);
                assert_eq!(s.mean, 80.0);
                assert!(s.std.is_nan());
                assert_eq!(s.max, 80.0);
            }
            other => panic!("score should be numeric, got {:?}", other),
        }
    }

    #[test]
    fn test_quartiles_interpolate() {
        let summary = summary_of(r#"{"sleep": [{"v":1},{"v":2},{"v":3},{"v":4}]}"#);
        let ColumnStats::Numeric(s) = summary.column("v").unwrap() else {
            panic!("numeric expected");
        };
        assert_eq!(s.min, 1.0);
        assert_eq!(s.q25, 1.75);
        assert_eq!(s.median, 2.5);
        assert_eq!(s.q75, 3.25);
        assert_eq!(s.max, 4.0);
        assert!((s.std - 1.2909944487358056).abs() < 1e-12);
    }

    #[test]
    fn test_categorical_top_prefers_first_seen_on_tie() {
        let summary = summary_of(
            r#"{"sleep": [{"d":"b"},{"d":"a"},{"d":"a"},{"d":"b"},{"d":"c"}]}"#,
        );
        let ColumnStats::Categorical(s) = summary.column("d").unwrap() else {
            panic!("categorical expected");
        };
        assert_eq!(s.count, 5);
        assert_eq!(s.unique, 3);
        assert_eq!(s.top.as_deref(), Some("b"));
        assert_eq!(s.freq, 2);
    }

    #[test]
    fn test_mixed_column_is_categorical() {
        let summary = summary_of(r#"{"sleep": [{"x":1},{"x":"two"}]}"#);
        assert!(matches!(
            summary.column("x").unwrap(),
            ColumnStats::Categorical(_)
        ));
    }

    #[test]
    fn test_all_null_column() {
        let summary = summary_of(r#"{"sleep": [{"x":null},{"x":null}]}"#);
        let stats = summary.column("x").unwrap();
        assert_eq!(stats.count(), 0);
        assert!(matches!(stats, ColumnStats::Categorical(s) if s.top.is_none()));
    }

    #[test]
    fn test_render_lists_every_column() {
        let rendered = summary_of(
            r#"{"sleep": [{"date":"2020-01-01","score":80},{"date":"2020-01-02","score":null}]}"#,
        )
        .to_string();

        let lines: Vec<&str> = rendered.lines().collect();
        assert!(lines[0].contains("date") && lines[0].contains("score"));
        let count_line = lines.iter().find(|l| l.starts_with("count")).unwrap();
        assert_eq!(
            count_line.split_whitespace().collect::<Vec<_>>(),
            vec!["count", "2", "1"]
        );
        assert!(rendered.contains("80.000000"));
    }
}
