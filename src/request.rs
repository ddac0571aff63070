//! Parses comma-separated `group.column` feature request tokens (spec.md §6).

use crate::error::{PitError, Result};
use crate::types::{FeatureRef, RANK_SENTINEL};

/// `group` is the last segment before the final `.`; `column` is everything
/// after. Unknown columns are not validated here (the backend validates at
/// execution time); only malformed tokens (no `.`, an empty group/column, or
/// a `column_name` equal to the reserved rank sentinel, spec.md §3) fail.
pub fn parse_feature_ref(token: &str) -> Result<FeatureRef> {
    let token = token.trim();
    match token.rsplit_once('.') {
        Some((group_name, column_name)) if !group_name.is_empty() && !column_name.is_empty() => {
            if column_name == RANK_SENTINEL {
                return Err(PitError::InvalidFeatureToken(token.to_string()));
            }
            Ok(FeatureRef {
                group_name: group_name.to_string(),
                column_name: column_name.to_string(),
            })
        }
        _ => Err(PitError::InvalidFeatureToken(token.to_string())),
    }
}

/// Parses a comma-separated feature request, preserving request order.
pub fn parse_feature_list(features: &str) -> Result<Vec<FeatureRef>> {
    features
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_feature_ref)
        .collect()
}
