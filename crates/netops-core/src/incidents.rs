//! Keyword-based incident extraction from syslog text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Most lines the heuristic summary will report.
const SUMMARY_LIMIT: usize = 5;

static CATEGORIES: Lazy<[(&str, Regex); 4]> = Lazy::new(|| {
    [
        ("critical_errors", Regex::new(r"CRIT.*").expect("critical regex should be valid")),
        ("errors", Regex::new(r"ERROR.*").expect("error regex should be valid")),
        ("alarms", Regex::new(r"ALARM.*").expect("alarm regex should be valid")),
        ("warnings", Regex::new(r"WARN.*").expect("warning regex should be valid")),
    ]
});

static FLAGGED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(ERROR|CRIT|ALARM).+").expect("flagged regex should be valid"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentReport {
    pub summary: String,
    pub incident_counts: BTreeMap<String, usize>,
    /// Matched text per category, from the keyword to the end of the line.
    pub top_incidents: BTreeMap<String, Vec<String>>,
}

/// Whether `name` has an extension accepted for log analysis.
pub fn is_log_file(name: &Path) -> bool {
    name.extension().and_then(|e| e.to_str()).is_some_and(|e| e == "log" || e == "txt")
}

pub fn extract_incidents(text: &str) -> IncidentReport {
    let mut incident_counts = BTreeMap::new();
    let mut top_incidents = BTreeMap::new();
    for (name, pattern) in CATEGORIES.iter() {
        let matches: Vec<String> = pattern.find_iter(text).map(|m| m.as_str().to_string()).collect();
        incident_counts.insert((*name).to_string(), matches.len());
        top_incidents.insert((*name).to_string(), matches);
    }
    IncidentReport { summary: summarize(text), incident_counts, top_incidents }
}

fn summarize(text: &str) -> String {
    let flagged = FLAGGED.find_iter(text).count();
    format!("Top incidents (heuristic): {} lines flagged.", flagged.min(SUMMARY_LIMIT))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SYSLOG: &str = "\
Mar 01 10:00:01 enb-12 CRIT cell 3 radio link failure
Mar 01 10:00:05 enb-12 ERROR S1 setup timeout
Mar 01 10:01:00 enb-07 WARN high PRB utilisation
Mar 01 10:02:00 enb-07 ALARM VSWR threshold exceeded
Mar 01 10:03:00 enb-07 INFO heartbeat
";

    #[test]
    fn test_counts_per_category() {
        let report = extract_incidents(SYSLOG);
        assert_eq!(report.incident_counts["critical_errors"], 1);
        assert_eq!(report.incident_counts["errors"], 1);
        assert_eq!(report.incident_counts["alarms"], 1);
        assert_eq!(report.incident_counts["warnings"], 1);
        assert_eq!(report.top_incidents["errors"], vec!["ERROR S1 setup timeout".to_string()]);
        assert_eq!(report.summary, "Top incidents (heuristic): 3 lines flagged.");
    }

    #[test]
    fn test_summary_caps_at_five() {
        let text = "ERROR a\n".repeat(12);
        let report = extract_incidents(&text);
        assert_eq!(report.incident_counts["errors"], 12);
        assert_eq!(report.summary, "Top incidents (heuristic): 5 lines flagged.");
    }

    #[test]
    fn test_empty_text() {
        let report = extract_incidents("");
        assert!(report.incident_counts.values().all(|n| *n == 0));
        assert_eq!(report.summary, "Top incidents (heuristic): 0 lines flagged.");
    }

    #[test]
    fn test_log_file_extensions() {
        assert!(is_log_file(Path::new("syslog.log")));
        assert!(is_log_file(Path::new("dump.txt")));
        assert!(!is_log_file(Path::new("kpi.csv")));
        assert!(!is_log_file(Path::new("noext")));
    }
}
