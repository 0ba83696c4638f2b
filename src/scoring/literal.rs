// src/scoring/literal.rs

//! Literal-match scoring: element-wise string equality.

use crate::errors::{KernelgateError, Result};

/// Compare `submitted` against `reference` position by position.
///
/// A different number of answers is malformed input, not a wrong answer.
pub fn score_literal(submitted: &[String], reference: &[String]) -> Result<Vec<bool>> {
    if submitted.len() != reference.len() {
        return Err(KernelgateError::InvalidSubmission(format!(
            "expected {} answers, got {}",
            reference.len(),
            submitted.len()
        )));
    }

    Ok(submitted
        .iter()
        .zip(reference)
        .map(|(given, expected)| given == expected)
        .collect())
}

/// One `[i] o` / `[i] x` line per answer, numbered from 1.
pub fn render_results(results: &[bool]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, ok)| format!("[{}] {}", i + 1, if *ok { "o" } else { "x" }))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn per_item_results_and_rendering() {
        let results = score_literal(&strings(&["x", "q"]), &strings(&["x", "y"])).unwrap();
        assert_eq!(results, vec![true, false]);
        assert_eq!(render_results(&results), "[1] o\n[2] x");
    }

    #[test]
    fn comparison_is_exact() {
        let results = score_literal(&strings(&["x "]), &strings(&["x"])).unwrap();
        assert_eq!(results, vec![false]);
    }

    #[test]
    fn length_mismatch_is_invalid_submission() {
        let err = score_literal(&strings(&["x"]), &strings(&["x", "y"])).unwrap_err();
        assert!(matches!(err, KernelgateError::InvalidSubmission(_)));
    }
}
