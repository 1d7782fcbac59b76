//! 归因引擎
//!
//! 根据服务自身状态与依赖信号推断最可能的根因依赖。
//! 纯函数，输入不可变。

use crate::entities::{AttributionResult, DependencyKind, DependencySignal, ServiceStatus};

fn severity(status: ServiceStatus) -> f64 {
    match status {
        ServiceStatus::Down => 1.0,
        ServiceStatus::Degraded => 0.5,
        ServiceStatus::Up => 0.0,
    }
}

fn type_factor(kind: DependencyKind) -> f64 {
    match kind {
        DependencyKind::Hard => 1.0,
        DependencyKind::Soft => 0.5,
    }
}

fn signal_strength(signal: &DependencySignal) -> f64 {
    signal.weight.max(0.0) * severity(signal.dependency_status) * type_factor(signal.kind)
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// 依赖归因
///
/// 健康的服务永远不被归因为受依赖影响；置信度随总信号强度单调上升，
/// 饱和于 0.95 以下，表达从相关性推断因果的固有不确定性。
pub fn attribute_dependency(
    service_status: ServiceStatus,
    dependency_signals: &[DependencySignal],
) -> AttributionResult {
    if service_status == ServiceStatus::Up {
        return AttributionResult::not_impacted();
    }

    let mut total_strength = 0.0;
    let mut root: Option<(i64, f64)> = None;

    for signal in dependency_signals {
        let strength = signal_strength(signal);
        if strength <= 0.0 {
            continue;
        }

        total_strength += strength;
        let replace = match root {
            None => true,
            // 强度相同按服务ID取小，保证确定性
            Some((best_id, best_strength)) => {
                strength > best_strength
                    || (strength == best_strength && signal.dependency_service_id < best_id)
            }
        };
        if replace {
            root = Some((signal.dependency_service_id, strength));
        }
    }

    let Some((root_service_id, _)) = root else {
        return AttributionResult::not_impacted();
    };

    let confidence = (total_strength / (total_strength + 1.0)).min(0.95);

    AttributionResult {
        dependency_impacted: true,
        probable_root_service_id: Some(root_service_id),
        attribution_confidence: round3(confidence),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(id: i64, status: ServiceStatus, kind: DependencyKind, weight: f64) -> DependencySignal {
        DependencySignal {
            dependency_service_id: id,
            dependency_status: status,
            kind,
            weight,
        }
    }

    #[test]
    fn test_healthy_service_never_impacted() {
        let signals = vec![signal(10, ServiceStatus::Down, DependencyKind::Hard, 1.0)];
        let result = attribute_dependency(ServiceStatus::Up, &signals);
        assert!(!result.dependency_impacted);
        assert_eq!(result.probable_root_service_id, None);
        assert_eq!(result.attribution_confidence, 0.0);
    }

    #[test]
    fn test_no_signals_means_no_attribution() {
        let result = attribute_dependency(ServiceStatus::Down, &[]);
        assert!(!result.dependency_impacted);
        assert_eq!(result.attribution_confidence, 0.0);
    }

    #[test]
    fn test_zero_strength_signals_ignored() {
        let signals = vec![
            signal(10, ServiceStatus::Up, DependencyKind::Hard, 1.0),
            signal(11, ServiceStatus::Down, DependencyKind::Hard, 0.0),
        ];
        let result = attribute_dependency(ServiceStatus::Down, &signals);
        assert!(!result.dependency_impacted);
        assert_eq!(result.probable_root_service_id, None);
        assert_eq!(result.attribution_confidence, 0.0);
    }

    #[test]
    fn test_strongest_signal_wins() {
        let signals = vec![
            signal(10, ServiceStatus::Degraded, DependencyKind::Soft, 0.6),
            signal(11, ServiceStatus::Down, DependencyKind::Hard, 0.8),
        ];
        let result = attribute_dependency(ServiceStatus::Down, &signals);
        assert!(result.dependency_impacted);
        assert_eq!(result.probable_root_service_id, Some(11));
        assert!(result.attribution_confidence >= 0.35);
        assert!(result.attribution_confidence <= 0.95);
    }

    #[test]
    fn test_tie_breaks_by_smallest_service_id() {
        let signals = vec![
            signal(20, ServiceStatus::Down, DependencyKind::Hard, 1.0),
            signal(5, ServiceStatus::Down, DependencyKind::Hard, 1.0),
            signal(12, ServiceStatus::Down, DependencyKind::Hard, 1.0),
        ];
        let result = attribute_dependency(ServiceStatus::Degraded, &signals);
        assert_eq!(result.probable_root_service_id, Some(5));
    }

    #[test]
    fn test_confidence_monotone_and_saturating() {
        let weak = attribute_dependency(
            ServiceStatus::Down,
            &[signal(1, ServiceStatus::Degraded, DependencyKind::Soft, 0.2)],
        );
        let strong = attribute_dependency(
            ServiceStatus::Down,
            &[
                signal(1, ServiceStatus::Down, DependencyKind::Hard, 5.0),
                signal(2, ServiceStatus::Down, DependencyKind::Hard, 5.0),
            ],
        );
        assert!(weak.attribution_confidence < strong.attribution_confidence);
        assert!(strong.attribution_confidence <= 0.95);

        let saturated = attribute_dependency(
            ServiceStatus::Down,
            &[signal(1, ServiceStatus::Down, DependencyKind::Hard, 1000.0)],
        );
        assert_eq!(saturated.attribution_confidence, 0.95);
    }

    #[test]
    fn test_soft_dependency_counts_half() {
        let hard = attribute_dependency(
            ServiceStatus::Down,
            &[signal(1, ServiceStatus::Down, DependencyKind::Hard, 1.0)],
        );
        let soft = attribute_dependency(
            ServiceStatus::Down,
            &[signal(1, ServiceStatus::Down, DependencyKind::Soft, 1.0)],
        );
        assert!(soft.attribution_confidence < hard.attribution_confidence);
    }
}
