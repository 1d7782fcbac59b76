//! 服务状态合成
//!
//! 把最近的检查结果与依赖信号合成为一次完整的服务评分视图。

use std::collections::HashMap;

use crate::attribution::attribute_dependency;
use crate::entities::{CheckResult, DependencySignal, ServiceScoreResult};
use crate::scoring::{status_from_score, weighted_service_score};

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// 合成服务评分
///
/// 若归因判定受依赖影响，则按置信度比例部分豁免自身得分：
/// effective = raw + (100 - raw) * confidence。
pub fn compose_score(
    results: &[CheckResult],
    weights: &HashMap<String, f64>,
    dependency_signals: &[DependencySignal],
) -> ServiceScoreResult {
    let raw_score = weighted_service_score(results, weights);
    let own_status = status_from_score(raw_score);

    let attribution = attribute_dependency(own_status, dependency_signals);

    let (effective_score, status) = if attribution.dependency_impacted {
        let effective = round2(
            raw_score + (100.0 - raw_score) * attribution.attribution_confidence,
        );
        (effective, status_from_score(effective))
    } else {
        (raw_score, own_status)
    };

    ServiceScoreResult {
        raw_score,
        effective_score,
        status,
        dependency_impacted: attribution.dependency_impacted,
        attribution_confidence: attribution.attribution_confidence,
        probable_root_service_id: attribution.probable_root_service_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{DependencyKind, ServiceStatus};
    use chrono::Utc;

    fn result(check_key: &str, status: ServiceStatus) -> CheckResult {
        CheckResult {
            check_key: check_key.to_string(),
            status,
            observed_at: Utc::now(),
            latency_ms: None,
            http_status: None,
            error_code: None,
            error_message: None,
            metadata: serde_json::Value::Null,
        }
    }

    fn down_dependency(id: i64) -> DependencySignal {
        DependencySignal {
            dependency_service_id: id,
            dependency_status: ServiceStatus::Down,
            kind: DependencyKind::Hard,
            weight: 1.0,
        }
    }

    #[test]
    fn test_healthy_service_passes_through() {
        let results = vec![result("a", ServiceStatus::Up)];
        let score = compose_score(&results, &HashMap::new(), &[down_dependency(9)]);
        assert_eq!(score.raw_score, 100.0);
        assert_eq!(score.effective_score, 100.0);
        assert_eq!(score.status, ServiceStatus::Up);
        assert!(!score.dependency_impacted);
        assert_eq!(score.attribution_confidence, 0.0);
        assert_eq!(score.probable_root_service_id, None);
    }

    #[test]
    fn test_no_results_scores_full() {
        let score = compose_score(&[], &HashMap::new(), &[]);
        assert_eq!(score.raw_score, 100.0);
        assert_eq!(score.status, ServiceStatus::Up);
    }

    #[test]
    fn test_impacted_service_partially_exonerated() {
        let results = vec![result("a", ServiceStatus::Down)];
        let score = compose_score(&results, &HashMap::new(), &[down_dependency(9)]);
        assert_eq!(score.raw_score, 0.0);
        assert!(score.dependency_impacted);
        assert_eq!(score.probable_root_service_id, Some(9));
        // effective = 0 + 100 * confidence = 100 * 0.5 = 50
        assert_eq!(score.effective_score, 50.0);
        assert_eq!(score.status, ServiceStatus::Down);
    }

    #[test]
    fn test_effective_score_bounded_by_100() {
        let results = vec![result("a", ServiceStatus::Degraded)];
        let score = compose_score(
            &results,
            &HashMap::new(),
            &[
                down_dependency(1),
                down_dependency(2),
                down_dependency(3),
                down_dependency(4),
            ],
        );
        assert!(score.effective_score <= 100.0);
        assert!(score.effective_score >= score.raw_score);
    }

    #[test]
    fn test_unimpacted_failure_keeps_raw_score() {
        let results = vec![result("a", ServiceStatus::Down)];
        let score = compose_score(&results, &HashMap::new(), &[]);
        assert_eq!(score.raw_score, 0.0);
        assert_eq!(score.effective_score, 0.0);
        assert_eq!(score.status, ServiceStatus::Down);
        assert!(!score.dependency_impacted);
    }

    #[test]
    fn test_exoneration_can_lift_status_band() {
        // raw 60（degraded 无延迟）→ down 以下？60 < 70 为 down；
        // 强依赖信号把 effective 拉回 degraded 区间
        let results = vec![result("a", ServiceStatus::Degraded)];
        let weights = HashMap::new();
        let signals = vec![
            DependencySignal {
                dependency_service_id: 1,
                dependency_status: ServiceStatus::Down,
                kind: DependencyKind::Hard,
                weight: 2.0,
            },
        ];
        let score = compose_score(&results, &weights, &signals);
        assert_eq!(score.raw_score, 60.0);
        // confidence = 2/3 ≈ 0.667 → effective = 60 + 40*0.667 ≈ 86.68
        assert_eq!(score.status, ServiceStatus::Degraded);
        assert!(score.effective_score > 70.0);
    }
}
