//! Tenant-scoped routing rules and the predicate that matches them against
//! parsed event documents.
//!
//! Matching is pure: no I/O, no mutation of the document, and malformed
//! paths or operands are non-matches rather than errors.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison operation a rule applies to extracted document values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Comparator {
    /// Exact match; numeric when both sides parse as numbers.
    Equal,
    /// Unanchored substring match.
    Contains,
    /// Whole-value match with `*` as a multi-character wildcard.
    Like,
    GreaterThan,
    LessThan,
    /// Inclusive range; the operand is a two-element array `[low, high]`.
    Range,
}

/// Rules are soft-deleted: a DELETED rule never matches again but its id
/// stays referenced in audit history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleStatus {
    Active,
    Deleted,
}

/// A persisted routing rule as served by the rule service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingRule {
    pub id: i64,
    pub organization_id: String,
    /// Dotted path into the event document, e.g. `epcisBody.eventList.epcList`.
    pub data_field: String,
    /// When set, only candidate values carrying this prefix are considered,
    /// and the prefix is removed before comparison.
    #[serde(default)]
    pub value_prefix: Option<String>,
    pub comparator: Comparator,
    /// Comparator operand. A scalar for most comparators, a two-element
    /// array for `Range`.
    pub value: Value,
    pub destinations: Vec<String>,
    /// Evaluation priority, ascending. Values need not be contiguous.
    pub order: i32,
    pub status: RuleStatus,
}

impl RoutingRule {
    /// Evaluate this rule against a parsed event document.
    ///
    /// The rule matches if any value extracted at `data_field` satisfies the
    /// comparator. Absence of the field is a non-match.
    pub fn matches(&self, document: &Value) -> bool {
        if self.status != RuleStatus::Active {
            return false;
        }

        let segments: Vec<&str> = self.data_field.split('.').collect();
        let mut candidates = Vec::new();
        collect_values(document, &segments, &mut candidates);

        if let Some(prefix) = &self.value_prefix {
            candidates = candidates
                .into_iter()
                .filter_map(|candidate| {
                    candidate
                        .strip_prefix(prefix.as_str())
                        .map(|stripped| stripped.to_owned())
                })
                .collect();
        }

        candidates
            .iter()
            .any(|candidate| self.comparator_matches(candidate))
    }

    fn comparator_matches(&self, candidate: &str) -> bool {
        match self.comparator {
            Comparator::Equal => {
                scalar_as_string(&self.value).is_some_and(|operand| compare(candidate, &operand).is_eq())
            }
            Comparator::Contains => {
                scalar_as_string(&self.value).is_some_and(|operand| candidate.contains(&operand))
            }
            Comparator::Like => {
                scalar_as_string(&self.value).is_some_and(|pattern| wildcard_match(&pattern, candidate))
            }
            Comparator::GreaterThan => {
                scalar_as_string(&self.value).is_some_and(|operand| compare(candidate, &operand).is_gt())
            }
            Comparator::LessThan => {
                scalar_as_string(&self.value).is_some_and(|operand| compare(candidate, &operand).is_lt())
            }
            Comparator::Range => {
                let Value::Array(bounds) = &self.value else {
                    return false;
                };
                let [low, high] = bounds.as_slice() else {
                    return false;
                };
                match (scalar_as_string(low), scalar_as_string(high)) {
                    (Some(low), Some(high)) => {
                        compare(candidate, &low).is_ge() && compare(candidate, &high).is_le()
                    }
                    _ => false,
                }
            }
        }
    }
}

/// Walk `value` along `segments`, fanning out over arrays at any depth, and
/// collect the scalar leaves reached by the full path.
fn collect_values(value: &Value, segments: &[&str], out: &mut Vec<String>) {
    if let Value::Array(items) = value {
        for item in items {
            collect_values(item, segments, out);
        }
        return;
    }

    match segments.split_first() {
        None => {
            if let Some(scalar) = scalar_as_string(value) {
                out.push(scalar);
            }
        }
        Some((head, rest)) => {
            if let Value::Object(map) = value {
                if let Some(child) = map.get(*head) {
                    collect_values(child, rest, out);
                }
            }
        }
    }
}

fn scalar_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Numeric comparison when both sides parse as numbers, lexicographic
/// otherwise.
fn compare(candidate: &str, operand: &str) -> std::cmp::Ordering {
    match (candidate.parse::<f64>(), operand.parse::<f64>()) {
        (Ok(a), Ok(b)) => a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal),
        _ => candidate.cmp(operand),
    }
}

/// Whole-value wildcard match, `*` matching any run of characters.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == text;
    }

    let parts: Vec<&str> = pattern.split('*').collect();
    let first = parts[0];
    let last = parts[parts.len() - 1];

    let Some(mut rest) = text.strip_prefix(first) else {
        return false;
    };

    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match rest.find(part) {
            Some(at) => rest = &rest[at + part.len()..],
            None => return false,
        }
    }

    rest.ends_with(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(data_field: &str, comparator: Comparator, value: Value) -> RoutingRule {
        RoutingRule {
            id: 1,
            organization_id: "7".to_owned(),
            data_field: data_field.to_owned(),
            value_prefix: None,
            comparator,
            value,
            destinations: vec!["adapter-a".to_owned()],
            order: 10,
            status: RuleStatus::Active,
        }
    }

    fn epcis_document() -> Value {
        json!({
            "epcisBody": {
                "eventList": [
                    {
                        "type": "ObjectEvent",
                        "action": "OBSERVE",
                        "bizStep": "shipping",
                        "quantity": 12,
                        "epcList": [
                            "urn:epc:id:sgtin:0614141.107346.2017",
                            "urn:epc:id:sgtin:0614141.107346.2018"
                        ]
                    }
                ]
            }
        })
    }

    #[test]
    fn test_equal_on_nested_field() {
        let rule = rule(
            "epcisBody.eventList.bizStep",
            Comparator::Equal,
            json!("shipping"),
        );
        assert!(rule.matches(&epcis_document()));
    }

    #[test]
    fn test_matching_is_deterministic_and_pure() {
        let rule = rule(
            "epcisBody.eventList.action",
            Comparator::Equal,
            json!("OBSERVE"),
        );
        let document = epcis_document();
        let before = document.clone();
        let first = rule.matches(&document);
        let second = rule.matches(&document);
        assert_eq!(first, second);
        assert!(first);
        assert_eq!(document, before);
    }

    #[test]
    fn test_any_candidate_in_array_matches() {
        let rule = rule(
            "epcisBody.eventList.epcList",
            Comparator::Equal,
            json!("urn:epc:id:sgtin:0614141.107346.2018"),
        );
        assert!(rule.matches(&epcis_document()));
    }

    #[test]
    fn test_prefix_is_stripped_before_comparison() {
        let mut rule = rule(
            "epcisBody.eventList.epcList",
            Comparator::Equal,
            json!("0614141.107346.2017"),
        );
        rule.value_prefix = Some("urn:epc:id:sgtin:".to_owned());
        assert!(rule.matches(&epcis_document()));
    }

    #[test]
    fn test_candidates_without_prefix_are_discarded() {
        let mut rule = rule(
            "epcisBody.eventList.epcList",
            Comparator::Contains,
            json!("sgtin"),
        );
        rule.value_prefix = Some("urn:epc:id:sscc:".to_owned());
        assert!(!rule.matches(&epcis_document()));
    }

    #[test]
    fn test_missing_field_is_a_non_match() {
        let rule = rule(
            "epcisBody.eventList.readPoint.id",
            Comparator::Equal,
            json!("anything"),
        );
        assert!(!rule.matches(&epcis_document()));
    }

    #[test]
    fn test_deleted_rule_never_matches() {
        let mut rule = rule(
            "epcisBody.eventList.bizStep",
            Comparator::Equal,
            json!("shipping"),
        );
        rule.status = RuleStatus::Deleted;
        assert!(!rule.matches(&epcis_document()));
    }

    #[test]
    fn test_contains_is_unanchored() {
        let rule = rule(
            "epcisBody.eventList.epcList",
            Comparator::Contains,
            json!("107346"),
        );
        assert!(rule.matches(&epcis_document()));
    }

    #[test]
    fn test_like_wildcard_is_anchored() {
        let matching = rule(
            "epcisBody.eventList.epcList",
            Comparator::Like,
            json!("urn:epc:id:sgtin:*.2017"),
        );
        assert!(matching.matches(&epcis_document()));

        // Without a trailing wildcard the pattern must cover the whole value.
        let partial = rule(
            "epcisBody.eventList.epcList",
            Comparator::Like,
            json!("urn:epc:id:*"),
        );
        assert!(partial.matches(&epcis_document()));

        let anchored = rule(
            "epcisBody.eventList.epcList",
            Comparator::Like,
            json!("epc:id:sgtin:*"),
        );
        assert!(!anchored.matches(&epcis_document()));
    }

    #[test]
    fn test_numeric_comparisons() {
        let document = epcis_document();
        assert!(rule(
            "epcisBody.eventList.quantity",
            Comparator::GreaterThan,
            json!(10)
        )
        .matches(&document));
        assert!(rule(
            "epcisBody.eventList.quantity",
            Comparator::LessThan,
            json!(20)
        )
        .matches(&document));
        assert!(!rule(
            "epcisBody.eventList.quantity",
            Comparator::GreaterThan,
            json!(12)
        )
        .matches(&document));
    }

    #[test]
    fn test_range_is_inclusive() {
        let document = epcis_document();
        assert!(rule(
            "epcisBody.eventList.quantity",
            Comparator::Range,
            json!([12, 20])
        )
        .matches(&document));
        assert!(rule(
            "epcisBody.eventList.quantity",
            Comparator::Range,
            json!([1, 12])
        )
        .matches(&document));
        assert!(!rule(
            "epcisBody.eventList.quantity",
            Comparator::Range,
            json!([13, 20])
        )
        .matches(&document));
    }

    #[test]
    fn test_malformed_range_operand_is_a_non_match() {
        let document = epcis_document();
        assert!(!rule(
            "epcisBody.eventList.quantity",
            Comparator::Range,
            json!([1])
        )
        .matches(&document));
        assert!(!rule(
            "epcisBody.eventList.quantity",
            Comparator::Range,
            json!("1..20")
        )
        .matches(&document));
    }

    #[test]
    fn test_rule_deserializes_from_service_json() {
        let raw = r#"{
            "id": 42,
            "organizationId": "7",
            "dataField": "epcisBody.eventList.epcList",
            "valuePrefix": "urn:epc:id:sgtin:",
            "comparator": "LIKE",
            "value": "0614141.*",
            "destinations": ["mock-adapter", "audit-adapter"],
            "order": 5,
            "status": "ACTIVE"
        }"#;
        let rule: RoutingRule = serde_json::from_str(raw).expect("rule should deserialize");
        assert_eq!(rule.comparator, Comparator::Like);
        assert_eq!(rule.status, RuleStatus::Active);
        assert_eq!(rule.destinations.len(), 2);
        assert!(rule.matches(&epcis_document()));
    }
}
