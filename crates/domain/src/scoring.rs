//! 评分引擎
//!
//! 纯函数，无 I/O，不持有状态。

use std::collections::HashMap;

use crate::entities::{CheckResult, ServiceStatus};

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// 单次检查结果的得分
pub fn check_result_score(result: &CheckResult) -> f64 {
    match result.status {
        ServiceStatus::Up => 100.0,
        ServiceStatus::Down => 0.0,
        ServiceStatus::Degraded => match result.latency_ms {
            None => 60.0,
            Some(latency) if latency <= 500 => 80.0,
            Some(latency) if latency <= 1000 => 65.0,
            Some(_) => 45.0,
        },
    }
}

/// 按检查权重加权的服务得分
///
/// 没有任何结果时返回 100.0（无失败证据即视为健康）；
/// 权重缺省为 1.0，负权重按 0 处理；总权重为 0 时返回 0.0。
pub fn weighted_service_score(results: &[CheckResult], weights: &HashMap<String, f64>) -> f64 {
    if results.is_empty() {
        return 100.0;
    }

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for result in results {
        let weight = weights
            .get(&result.check_key)
            .copied()
            .unwrap_or(1.0)
            .max(0.0);

        numerator += check_result_score(result) * weight;
        denominator += weight;
    }

    if denominator == 0.0 {
        return 0.0;
    }
    round2(numerator / denominator)
}

/// 得分到状态的映射，区间下界包含
pub fn status_from_score(score: f64) -> ServiceStatus {
    if score >= 95.0 {
        return ServiceStatus::Up;
    }
    if score >= 70.0 {
        return ServiceStatus::Degraded;
    }
    ServiceStatus::Down
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn result_with(status: ServiceStatus, check_key: &str, latency_ms: Option<i64>) -> CheckResult {
        CheckResult {
            check_key: check_key.to_string(),
            status,
            observed_at: Utc::now(),
            latency_ms,
            http_status: None,
            error_code: None,
            error_message: None,
            metadata: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_check_result_score_values() {
        assert_eq!(
            check_result_score(&result_with(ServiceStatus::Up, "a", None)),
            100.0
        );
        assert_eq!(
            check_result_score(&result_with(ServiceStatus::Down, "a", None)),
            0.0
        );
        assert_eq!(
            check_result_score(&result_with(ServiceStatus::Degraded, "a", None)),
            60.0
        );
        assert_eq!(
            check_result_score(&result_with(ServiceStatus::Degraded, "a", Some(400))),
            80.0
        );
        assert_eq!(
            check_result_score(&result_with(ServiceStatus::Degraded, "a", Some(900))),
            65.0
        );
        assert_eq!(
            check_result_score(&result_with(ServiceStatus::Degraded, "a", Some(1900))),
            45.0
        );
    }

    #[test]
    fn test_degraded_latency_boundaries_inclusive() {
        assert_eq!(
            check_result_score(&result_with(ServiceStatus::Degraded, "a", Some(500))),
            80.0
        );
        assert_eq!(
            check_result_score(&result_with(ServiceStatus::Degraded, "a", Some(1000))),
            65.0
        );
    }

    #[test]
    fn test_weighted_service_score() {
        let results = vec![
            result_with(ServiceStatus::Up, "primary", None),
            result_with(ServiceStatus::Down, "secondary", None),
        ];
        let weights = HashMap::from([
            ("primary".to_string(), 3.0),
            ("secondary".to_string(), 1.0),
        ]);
        assert_eq!(weighted_service_score(&results, &weights), 75.0);
    }

    #[test]
    fn test_weighted_service_score_defaults_missing_weight() {
        let results = vec![
            result_with(ServiceStatus::Up, "a", None),
            result_with(ServiceStatus::Down, "b", None),
        ];
        assert_eq!(weighted_service_score(&results, &HashMap::new()), 50.0);
    }

    #[test]
    fn test_weighted_service_score_empty_results() {
        let weights = HashMap::from([("anything".to_string(), 0.0)]);
        assert_eq!(weighted_service_score(&[], &weights), 100.0);
        assert_eq!(weighted_service_score(&[], &HashMap::new()), 100.0);
    }

    #[test]
    fn test_weighted_service_score_zero_total_weight() {
        let results = vec![result_with(ServiceStatus::Up, "a", None)];
        let weights = HashMap::from([("a".to_string(), 0.0)]);
        assert_eq!(weighted_service_score(&results, &weights), 0.0);
    }

    #[test]
    fn test_negative_weight_clamped_to_zero() {
        let results = vec![
            result_with(ServiceStatus::Up, "a", None),
            result_with(ServiceStatus::Down, "b", None),
        ];
        let weights = HashMap::from([("b".to_string(), -5.0)]);
        // b 的权重被压为 0，只剩 a 生效
        assert_eq!(weighted_service_score(&results, &weights), 100.0);
    }

    #[test]
    fn test_status_from_score_thresholds() {
        assert_eq!(status_from_score(95.0), ServiceStatus::Up);
        assert_eq!(status_from_score(100.0), ServiceStatus::Up);
        assert_eq!(status_from_score(94.99), ServiceStatus::Degraded);
        assert_eq!(status_from_score(90.0), ServiceStatus::Degraded);
        assert_eq!(status_from_score(70.0), ServiceStatus::Degraded);
        assert_eq!(status_from_score(69.99), ServiceStatus::Down);
        assert_eq!(status_from_score(0.0), ServiceStatus::Down);
    }
}
